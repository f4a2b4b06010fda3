//! Journal promoter (§4.11 "For journal promotion specifically…"): the
//! `EntityPromoter` for `entity_type = "journal"`. Assembles an event from
//! `{effective_date, document_number, party_name, lines[]}`, derives a
//! deterministic `event_id` (UUIDv5 over the canonicalized content, so
//! re-promoting the same staged row is idempotent), and dispatches through
//! [`InterpretationCoordinator::interpret_imported_journal`] as though it
//! were a live event.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use uuid::Uuid;

use acctkernel_audit::AuditSink;
use acctkernel_coordinator::{InterpretationCoordinator, OutcomeStatus, PeriodChecker};
use acctkernel_intent::ImportedLine;
use acctkernel_ledger::{LedgerRegistry, PostingSession, RoleResolver};

use crate::promotion::{EntityPromoter, PromoteOutcome, PromotionError};

/// `Uuid::new_v5` namespace for imported-journal event ids. Arbitrary but
/// fixed, so the same `(document_number, effective_date, party_name)`
/// triple always derives the same `event_id` across processes and runs.
const JOURNAL_IMPORT_NAMESPACE: Uuid = Uuid::from_bytes([
    0x7b, 0x4b, 0x6b, 0x0e, 0x9a, 0x2e, 0x4b, 0x7e, 0x9f, 0x5d, 0x2a, 0x1e, 0x6c, 0x8d, 0x3f, 0x01,
]);

/// Derives the deterministic `event_id` for one imported journal row.
pub fn deterministic_event_id(document_number: &str, effective_date: NaiveDate, party_name: &str) -> Uuid {
    let canonical = serde_json::json!({
        "document_number": document_number,
        "effective_date": effective_date,
        "party_name": party_name,
    });
    let bytes = serde_json::to_vec(&canonical).expect("Value serialization never fails");
    Uuid::new_v5(&JOURNAL_IMPORT_NAMESPACE, &bytes)
}

fn parse_decimal_field(obj: &Map<String, Value>, key: &str) -> Result<Option<Decimal>, String> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Decimal::from_str(s.trim()).map(Some).map_err(|e| format!("invalid decimal in '{key}': {e}")),
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string()).map(Some).map_err(|e| format!("invalid decimal in '{key}': {e}")),
        Some(other) => Err(format!("field '{key}' is not a decimal-compatible value: {other}")),
    }
}

fn parse_lines(obj: &Map<String, Value>) -> Result<Vec<ImportedLine>, String> {
    let raw_lines = match obj.get("lines") {
        Some(Value::Array(items)) => items,
        _ => return Err("payload.lines must be a non-empty array".to_string()),
    };
    if raw_lines.is_empty() {
        return Err("payload.lines must be a non-empty array".to_string());
    }
    let mut lines = Vec::with_capacity(raw_lines.len());
    for (idx, raw) in raw_lines.iter().enumerate() {
        let Value::Object(line_obj) = raw else {
            return Err(format!("payload.lines[{idx}] is not an object"));
        };
        let account_key = line_obj
            .get("account")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("payload.lines[{idx}].account is missing"))?
            .to_string();
        let debit = parse_decimal_field(line_obj, "debit").map_err(|e| format!("line[{idx}]: {e}"))?;
        let credit = parse_decimal_field(line_obj, "credit").map_err(|e| format!("line[{idx}]: {e}"))?;
        let currency = line_obj.get("currency").and_then(Value::as_str).unwrap_or("USD").to_string();
        lines.push(ImportedLine { account_key, debit, credit, currency });
    }
    Ok(lines)
}

/// Promotes staged `entity_type = "journal"` records. Holds the collaborators
/// [`InterpretationCoordinator::interpret_imported_journal`] needs for the
/// duration of one batch; constructed fresh per `PromotionService::promote_batch`
/// call, same as any other [`EntityPromoter`].
pub struct JournalPromoter<'a> {
    pub ledger_id: String,
    pub profile_id: String,
    pub profile_version: u32,
    pub resolve_role: Box<dyn Fn(&str) -> Option<String> + 'a>,
    pub roles: &'a RoleResolver,
    pub ledgers: &'a LedgerRegistry,
    pub period_checker: &'a dyn PeriodChecker,
    pub session: &'a mut dyn PostingSession,
    pub audit: &'a mut dyn AuditSink,
}

impl<'a> JournalPromoter<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger_id: impl Into<String>,
        profile_id: impl Into<String>,
        profile_version: u32,
        resolve_role: impl Fn(&str) -> Option<String> + 'a,
        roles: &'a RoleResolver,
        ledgers: &'a LedgerRegistry,
        period_checker: &'a dyn PeriodChecker,
        session: &'a mut dyn PostingSession,
        audit: &'a mut dyn AuditSink,
    ) -> Self {
        Self {
            ledger_id: ledger_id.into(),
            profile_id: profile_id.into(),
            profile_version,
            resolve_role: Box::new(resolve_role),
            roles,
            ledgers,
            period_checker,
            session,
            audit,
        }
    }
}

impl<'a> EntityPromoter for JournalPromoter<'a> {
    /// Idempotency is enforced one layer down, at `JournalEntry.idempotency_key`
    /// (§4.8 step 2) — a re-promotion short-circuits to the existing entry
    /// rather than being skipped here, so the batch counters still reflect a
    /// "promoted" record rather than a silently-dropped one.
    fn check_duplicate(&mut self, _mapped: &Map<String, Value>) -> Result<bool, PromotionError> {
        Ok(false)
    }

    fn promote(&mut self, mapped: &Map<String, Value>, _actor_id: Uuid, now: DateTime<Utc>) -> Result<PromoteOutcome, PromotionError> {
        let document_number = match mapped.get("document_number").and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => s.to_string(),
            _ => return Ok(PromoteOutcome::failure("document_number is missing")),
        };
        let party_name = mapped.get("party_name").and_then(Value::as_str).unwrap_or("").to_string();
        let effective_date = match mapped.get("effective_date").and_then(Value::as_str).and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()) {
            Some(d) => d,
            None => return Ok(PromoteOutcome::failure("effective_date is missing or not YYYY-MM-DD")),
        };
        let lines = match parse_lines(mapped) {
            Ok(l) => l,
            Err(message) => return Ok(PromoteOutcome::failure(message)),
        };

        let source_event_id = deterministic_event_id(&document_number, effective_date, &party_name);
        let payload_fingerprint = source_event_id.to_string();

        let outcome = InterpretationCoordinator::interpret_imported_journal(
            source_event_id,
            &payload_fingerprint,
            &self.ledger_id,
            &self.profile_id,
            self.profile_version,
            effective_date,
            &lines,
            |key: &str| (self.resolve_role)(key),
            self.roles,
            self.ledgers,
            self.period_checker,
            self.session,
            self.audit,
            now,
        );

        match outcome.status {
            OutcomeStatus::Posted => match outcome.journal_entry_ids.first() {
                Some(id) => Ok(PromoteOutcome::success(*id)),
                None => Ok(PromoteOutcome::failure("coordinator reported POSTED with no journal entries")),
            },
            _ => Ok(PromoteOutcome::failure(outcome.reason_detail.unwrap_or_else(|| "imported journal interpretation did not post".to_string()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acctkernel_ledger::{JournalEntry, LedgerRequirementSet, RoleBinding};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::collections::HashMap;

    struct AlwaysOpen;
    impl PeriodChecker for AlwaysOpen {
        fn is_open(&self, _date: NaiveDate) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct InMemorySession {
        by_key: HashMap<String, JournalEntry>,
        seqs: HashMap<String, i64>,
    }
    impl PostingSession for InMemorySession {
        fn find_by_idempotency_key(&mut self, key: &str) -> acctkernel_types::Result<Option<JournalEntry>> {
            Ok(self.by_key.get(key).cloned())
        }
        fn insert_draft(&mut self, entry: &JournalEntry) -> acctkernel_types::Result<()> {
            self.by_key.insert(entry.idempotency_key.clone(), entry.clone());
            Ok(())
        }
        fn next_seq(&mut self, ledger_id: &str) -> acctkernel_types::Result<i64> {
            let seq = self.seqs.entry(ledger_id.to_string()).or_insert(0);
            *seq += 1;
            Ok(*seq)
        }
        fn mark_posted(&mut self, entry_id: Uuid, seq: i64, posted_at: DateTime<Utc>) -> acctkernel_types::Result<()> {
            if let Some(entry) = self.by_key.values_mut().find(|e| e.id == entry_id) {
                entry.seq = Some(seq);
                entry.posted_at = Some(posted_at);
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct NoopAuditSink;
    impl AuditSink for NoopAuditSink {
        fn append(&mut self, draft: acctkernel_audit::AuditDraft) -> acctkernel_types::Result<acctkernel_audit::AuditEvent> {
            Ok(draft.seal(1, None))
        }
    }

    fn roles() -> RoleResolver {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        RoleResolver::new()
            .bind(RoleBinding { ledger_id: "GL".into(), role: "Inventory".into(), account_code: acctkernel_types::AccountCode::new("1200"), effective_from: from, effective_to: None, config_version: "v1".into() })
            .bind(RoleBinding { ledger_id: "GL".into(), role: "AccountsPayable".into(), account_code: acctkernel_types::AccountCode::new("2000"), effective_from: from, effective_to: None, config_version: "v1".into() })
    }

    fn ledgers() -> LedgerRegistry {
        let mut registry = LedgerRegistry::new();
        registry.register("GL", LedgerRequirementSet::new(dec!(0.01)));
        registry
    }

    fn mapped_row() -> Map<String, Value> {
        let json!({
            "document_number": "JE-1001",
            "party_name": "Acme Corp",
            "effective_date": "2026-03-01",
            "lines": [
                {"account": "1200", "debit": "500.00", "currency": "USD"},
                {"account": "2000", "credit": "500.00", "currency": "USD"},
            ],
        }) .as_object().cloned().unwrap()
    }

    #[test]
    fn deterministic_event_id_is_stable() {
        let a = deterministic_event_id("JE-1001", NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(), "Acme Corp");
        let b = deterministic_event_id("JE-1001", NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(), "Acme Corp");
        assert_eq!(a, b);
        let c = deterministic_event_id("JE-1002", NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(), "Acme Corp");
        assert_ne!(a, c);
    }

    #[test]
    fn promotes_balanced_journal_row() {
        let role_resolver = roles();
        let ledger_registry = ledgers();
        let open = AlwaysOpen;
        let mut session = InMemorySession::default();
        let mut audit = NoopAuditSink;

        let resolve_role = |key: &str| match key {
            "1200" => Some("Inventory".to_string()),
            "2000" => Some("AccountsPayable".to_string()),
            _ => None,
        };

        let mut promoter = JournalPromoter::new("GL", "import.historical_journal", 1, resolve_role, &role_resolver, &ledger_registry, &open, &mut session, &mut audit);

        let outcome = promoter.promote(&mapped_row(), Uuid::new_v4(), Utc::now()).unwrap();
        assert!(outcome.success);
        assert!(outcome.entity_id.is_some());
    }

    #[test]
    fn unresolvable_account_key_fails_without_erroring() {
        let role_resolver = roles();
        let ledger_registry = ledgers();
        let open = AlwaysOpen;
        let mut session = InMemorySession::default();
        let mut audit = NoopAuditSink;

        let mut promoter = JournalPromoter::new("GL", "import.historical_journal", 1, |_: &str| None, &role_resolver, &ledger_registry, &open, &mut session, &mut audit);

        let outcome = promoter.promote(&mapped_row(), Uuid::new_v4(), Utc::now()).unwrap();
        assert!(!outcome.success);
    }

    #[test]
    fn reposting_same_document_is_idempotent() {
        let role_resolver = roles();
        let ledger_registry = ledgers();
        let open = AlwaysOpen;
        let mut session = InMemorySession::default();
        let mut audit = NoopAuditSink;
        let resolve_role = |key: &str| match key {
            "1200" => Some("Inventory".to_string()),
            "2000" => Some("AccountsPayable".to_string()),
            _ => None,
        };
        let mut promoter = JournalPromoter::new("GL", "import.historical_journal", 1, resolve_role, &role_resolver, &ledger_registry, &open, &mut session, &mut audit);

        let first = promoter.promote(&mapped_row(), Uuid::new_v4(), Utc::now()).unwrap();
        let second = promoter.promote(&mapped_row(), Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(first.entity_id, second.entity_id);
    }
}
