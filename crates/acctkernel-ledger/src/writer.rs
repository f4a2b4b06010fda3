//! Journal Writer — turns an `AccountingIntent` into posted `JournalEntry`
//! rows, one per `LedgerIntent` (§4.8).
//!
//! The assembly and balance logic here is pure; seq assignment and
//! idempotency dedup require a transactional session, so they're expressed
//! through the [`PostingSession`] trait and implemented against Postgres in
//! the database crate.

use std::collections::HashMap;

use acctkernel_intent::AccountingIntent;
use acctkernel_types::{AccountCode, KernelError, Result, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::journal::{JournalEntry, JournalEntryStatus, JournalLine};
use crate::registry::LedgerRegistry;
use crate::role_resolver::RoleResolver;

/// The impure shell the writer delegates persistence to. One call per
/// ledger intent; the caller is responsible for wrapping all calls in a
/// single transaction per §4.9/§5.
pub trait PostingSession {
    fn find_by_idempotency_key(&mut self, key: &str) -> Result<Option<JournalEntry>>;
    fn insert_draft(&mut self, entry: &JournalEntry) -> Result<()>;
    /// Assigns the next ledger-scoped seq under a row lock; implementations
    /// must serialize concurrent callers for the same `ledger_id`.
    fn next_seq(&mut self, ledger_id: &str) -> Result<i64>;
    fn mark_posted(&mut self, entry_id: Uuid, seq: i64, posted_at: DateTime<Utc>) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedEntry {
    pub entry: JournalEntry,
    /// `true` when this was a short-circuit return of an entry that was
    /// already posted under the same idempotency key — no new row, no new
    /// seq, no audit event beyond the original post.
    pub idempotent_replay: bool,
}

pub struct JournalWriter;

impl JournalWriter {
    pub fn write(
        intent: &AccountingIntent,
        roles: &RoleResolver,
        ledgers: &LedgerRegistry,
        session: &mut dyn PostingSession,
        now: DateTime<Utc>,
    ) -> Result<Vec<PostedEntry>> {
        let mut posted = Vec::with_capacity(intent.ledger_intents.len());
        for ledger_intent in &intent.ledger_intents {
            posted.push(Self::write_one(intent, ledger_intent, roles, ledgers, session, now)?);
        }
        Ok(posted)
    }

    fn write_one(
        intent: &AccountingIntent,
        ledger_intent: &acctkernel_intent::LedgerIntent,
        roles: &RoleResolver,
        ledgers: &LedgerRegistry,
        session: &mut dyn PostingSession,
        now: DateTime<Utc>,
    ) -> Result<PostedEntry> {
        let idempotency_key =
            JournalEntry::idempotency_key(intent.source_event_id, &ledger_intent.ledger_id, intent.profile_version);

        if let Some(existing) = session.find_by_idempotency_key(&idempotency_key)? {
            return Ok(PostedEntry { entry: existing, idempotent_replay: true });
        }

        let mut lines = Vec::with_capacity(ledger_intent.lines.len());
        for (idx, line) in ledger_intent.lines.iter().enumerate() {
            let resolved = roles
                .resolve(&ledger_intent.ledger_id, &line.role, intent.effective_date)
                .ok_or_else(|| KernelError::UnresolvableRole {
                    role: line.role.clone(),
                    ledger_id: ledger_intent.ledger_id.clone(),
                })?;
            lines.push(JournalLine {
                line_seq: idx as u32,
                role: line.role.clone(),
                account_code: resolved.account_code,
                side: line.side,
                amount: line.amount,
                currency: line.currency.clone(),
                is_rounding: false,
                dimensions: HashMap::new(),
            });
        }

        let mut entry = JournalEntry {
            id: Uuid::new_v4(),
            seq: None,
            source_event_id: intent.source_event_id,
            ledger_id: ledger_intent.ledger_id.clone(),
            status: JournalEntryStatus::Draft,
            idempotency_key: idempotency_key.clone(),
            effective_date: intent.effective_date,
            posted_at: None,
            reversal_of_id: None,
            lines,
        };

        balance_entry(&mut entry, ledgers.rounding_tolerance(&ledger_intent.ledger_id))?;

        session.insert_draft(&entry)?;

        let seq = session.next_seq(&ledger_intent.ledger_id)?;
        session.mark_posted(entry.id, seq, now)?;
        entry.seq = Some(seq);
        entry.status = JournalEntryStatus::Posted;
        entry.posted_at = Some(now);

        Ok(PostedEntry { entry, idempotent_replay: false })
    }
}

/// Checks Σdebit = Σcredit per currency; inserts a rounding line when the
/// imbalance is within tolerance, fails when it isn't (§4.8 step 4).
fn balance_entry(entry: &mut JournalEntry, tolerance: Decimal) -> Result<()> {
    for (currency, imbalance) in entry.imbalance_by_currency() {
        if imbalance.is_zero() {
            continue;
        }
        let magnitude = imbalance.abs();
        if magnitude > tolerance {
            if tolerance.is_zero() {
                let (debits, credits) = debit_credit_totals(entry, &currency);
                return Err(KernelError::Unbalanced {
                    ledger_id: entry.ledger_id.clone(),
                    debits: debits.to_string(),
                    credits: credits.to_string(),
                });
            }
            return Err(KernelError::RoundingAboveThreshold {
                ledger_id: entry.ledger_id.clone(),
                difference: magnitude.to_string(),
                tolerance: tolerance.to_string(),
            });
        }
        // imbalance = Σdebit − Σcredit; a positive imbalance means debits
        // exceed credits, so the rounding line lands on the credit side.
        let side = if imbalance.is_sign_positive() { Side::Credit } else { Side::Debit };
        let line_seq = entry.lines.len() as u32;
        entry.lines.push(JournalLine {
            line_seq,
            role: "RoundingDifference".to_string(),
            account_code: AccountCode::new("ROUNDING"),
            side,
            amount: magnitude,
            currency,
            is_rounding: true,
            dimensions: HashMap::new(),
        });
    }
    Ok(())
}

fn debit_credit_totals(entry: &JournalEntry, currency: &str) -> (Decimal, Decimal) {
    let mut debits = Decimal::ZERO;
    let mut credits = Decimal::ZERO;
    for line in entry.lines.iter().filter(|l| l.currency == currency) {
        match line.side {
            Side::Debit => debits += line.amount,
            Side::Credit => credits += line.amount,
        }
    }
    (debits, credits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LedgerRequirementSet;
    use crate::role_resolver::RoleBinding;
    use acctkernel_intent::{IntentLine, LedgerIntent};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::collections::HashMap as StdHashMap;

    #[derive(Default)]
    struct InMemorySession {
        by_key: StdHashMap<String, JournalEntry>,
        seqs: StdHashMap<String, i64>,
    }

    impl PostingSession for InMemorySession {
        fn find_by_idempotency_key(&mut self, key: &str) -> Result<Option<JournalEntry>> {
            Ok(self.by_key.get(key).cloned())
        }
        fn insert_draft(&mut self, entry: &JournalEntry) -> Result<()> {
            self.by_key.insert(entry.idempotency_key.clone(), entry.clone());
            Ok(())
        }
        fn next_seq(&mut self, ledger_id: &str) -> Result<i64> {
            let seq = self.seqs.entry(ledger_id.to_string()).or_insert(0);
            *seq += 1;
            Ok(*seq)
        }
        fn mark_posted(&mut self, entry_id: Uuid, seq: i64, posted_at: DateTime<Utc>) -> Result<()> {
            if let Some(entry) = self.by_key.values_mut().find(|e| e.id == entry_id) {
                entry.seq = Some(seq);
                entry.status = JournalEntryStatus::Posted;
                entry.posted_at = Some(posted_at);
            }
            Ok(())
        }
    }

    fn resolver() -> RoleResolver {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        RoleResolver::new()
            .bind(RoleBinding { ledger_id: "GL".into(), role: "InventoryAsset".into(), account_code: AccountCode::new("1200"), effective_from: from, effective_to: None, config_version: "v1".into() })
            .bind(RoleBinding { ledger_id: "GL".into(), role: "GRNI".into(), account_code: AccountCode::new("2100"), effective_from: from, effective_to: None, config_version: "v1".into() })
    }

    fn registry() -> LedgerRegistry {
        let mut registry = LedgerRegistry::new();
        registry.register("GL", LedgerRequirementSet::new(dec!(0.01)));
        registry
    }

    fn intent(amount: Decimal) -> AccountingIntent {
        let mut li = LedgerIntent::new("GL");
        li.lines.push(IntentLine { role: "InventoryAsset".into(), side: Side::Debit, amount, currency: "USD".into() });
        li.lines.push(IntentLine { role: "GRNI".into(), side: Side::Credit, amount, currency: "USD".into() });
        AccountingIntent {
            econ_event_id: Uuid::new_v4(),
            source_event_id: Uuid::new_v4(),
            profile_id: "ap_invoice_standard".into(),
            profile_version: 1,
            effective_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            ledger_intents: vec![li],
        }
    }

    #[test]
    fn balanced_intent_posts_with_matching_debit_credit() {
        let mut session = InMemorySession::default();
        let posted = JournalWriter::write(&intent(dec!(1234.56)), &resolver(), &registry(), &mut session, Utc::now()).unwrap();
        assert_eq!(posted.len(), 1);
        let entry = &posted[0].entry;
        assert_eq!(entry.status, JournalEntryStatus::Posted);
        assert_eq!(entry.seq, Some(1));
        assert!(entry.imbalance_by_currency().values().all(|v| v.is_zero()));
    }

    #[test]
    fn unresolvable_role_fails_posting() {
        let mut session = InMemorySession::default();
        let resolver = RoleResolver::new();
        let err = JournalWriter::write(&intent(dec!(100)), &resolver, &registry(), &mut session, Utc::now()).unwrap_err();
        assert_eq!(err.error_code(), "UNRESOLVABLE_ROLE");
    }

    #[test]
    fn reposting_same_event_is_idempotent() {
        let mut session = InMemorySession::default();
        let ev = intent(dec!(500));
        let first = JournalWriter::write(&ev, &resolver(), &registry(), &mut session, Utc::now()).unwrap();
        let second = JournalWriter::write(&ev, &resolver(), &registry(), &mut session, Utc::now()).unwrap();
        assert!(!first[0].idempotent_replay);
        assert!(second[0].idempotent_replay);
        assert_eq!(first[0].entry.id, second[0].entry.id);
    }

    #[test]
    fn small_imbalance_within_tolerance_inserts_rounding_line() {
        let mut session = InMemorySession::default();
        let mut ev = intent(dec!(100));
        ev.ledger_intents[0].lines[1].amount = dec!(99.995);
        let posted = JournalWriter::write(&ev, &resolver(), &registry(), &mut session, Utc::now()).unwrap();
        let entry = &posted[0].entry;
        assert!(entry.lines.iter().any(|l| l.is_rounding));
        assert!(entry.imbalance_by_currency().values().all(|v| v.is_zero()));
    }

    #[test]
    fn imbalance_above_tolerance_fails() {
        let mut session = InMemorySession::default();
        let mut ev = intent(dec!(100));
        ev.ledger_intents[0].lines[1].amount = dec!(90);
        let err = JournalWriter::write(&ev, &resolver(), &registry(), &mut session, Utc::now()).unwrap_err();
        assert_eq!(err.error_code(), "ROUNDING_ABOVE_THRESHOLD");
    }

    #[test]
    fn imbalance_with_zero_tolerance_is_unbalanced_not_rounding() {
        let mut session = InMemorySession::default();
        let mut registry = LedgerRegistry::new();
        registry.register("GL", LedgerRequirementSet::new(Decimal::ZERO));
        let mut ev = intent(dec!(100));
        ev.ledger_intents[0].lines[1].amount = dec!(90);
        let err = JournalWriter::write(&ev, &resolver(), &registry, &mut session, Utc::now()).unwrap_err();
        assert_eq!(err.error_code(), "JOURNAL_UNBALANCED");
    }
}
