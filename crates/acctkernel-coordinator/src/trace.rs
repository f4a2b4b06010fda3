//! Trace Selector — reconstructs the full decision journal for one event
//! (§4.12). Pure read-side: no mutation, no I/O of its own. The actual data
//! access is delegated through [`TraceDataSource`] to whatever persistence
//! backend holds events, journal entries, outcomes, and audit events.

use acctkernel_audit::{verify_chain, AuditEvent};
use acctkernel_ledger::JournalEntry;
use acctkernel_types::{Event, KernelError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::outcome::InterpretationOutcome;

/// The impure shell a [`TraceSelector`] reads through. One implementation
/// per storage backend; the database crate provides a Postgres-backed one.
pub trait TraceDataSource {
    fn find_event(&self, source_event_id: Uuid) -> Result<Option<Event>>;
    fn find_outcome(&self, source_event_id: Uuid) -> Result<Option<InterpretationOutcome>>;
    fn find_journal_entries(&self, source_event_id: Uuid) -> Result<Vec<JournalEntry>>;
    /// All audit events whose `entity_id` is the event, any of its journal
    /// entries, or the outcome itself — already ordered by `seq`.
    fn find_related_audit_events(&self, source_event_id: Uuid, journal_entry_ids: &[Uuid]) -> Result<Vec<AuditEvent>>;
    /// The full global audit chain segment spanning the related events'
    /// `seq` range, used to verify chain continuity rather than just the
    /// related events' internal self-consistency.
    fn audit_chain_segment(&self, from_seq: i64, to_seq: i64) -> Result<Vec<AuditEvent>>;
}

/// Integrity checks a trace bundle carries alongside the raw records, so a
/// caller (CLI, TUI) never has to recompute them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceIntegrity {
    /// `event.payload_hash()` matches the hash recorded on the EVENT_INGESTED
    /// audit event's payload_hash, if one was found.
    pub payload_hash_verified: bool,
    /// Every posted journal entry balances per `(currency)` exactly, after
    /// rounding lines.
    pub balance_verified: bool,
    /// The segment of the audit chain covering this trace's events links up
    /// internally; does not imply the *entire* global chain is unbroken.
    pub audit_chain_segment_valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceBundle {
    pub source_event_id: Uuid,
    pub event: Option<Event>,
    pub outcome: Option<InterpretationOutcome>,
    pub journal_entries: Vec<JournalEntry>,
    pub audit_events: Vec<AuditEvent>,
    pub integrity: TraceIntegrity,
}

pub struct TraceSelector;

impl TraceSelector {
    /// Reconstructs a [`TraceBundle`] for `source_event_id`. Never mutates
    /// anything; a missing event/outcome is reflected as `None`/empty
    /// fields rather than an error, since a caller may legitimately trace
    /// an event_id that was never ingested (e.g. a typo) and wants to see
    /// that clearly rather than get a generic failure.
    pub fn trace(source_event_id: Uuid, source: &dyn TraceDataSource) -> Result<TraceBundle> {
        let event = source.find_event(source_event_id)?;
        let outcome = source.find_outcome(source_event_id)?;
        let journal_entries = source.find_journal_entries(source_event_id)?;
        let journal_entry_ids: Vec<Uuid> = journal_entries.iter().map(|e| e.id).collect();
        let audit_events = source.find_related_audit_events(source_event_id, &journal_entry_ids)?;

        let payload_hash_verified = match (&event, audit_events.iter().find(|a| a.entity_id == source_event_id.to_string())) {
            (Some(ev), Some(ingested)) => ingested.payload_hash == ev.payload_hash(),
            (Some(_), None) => false,
            (None, _) => false,
        };

        let balance_verified = journal_entries
            .iter()
            .all(|entry| entry.imbalance_by_currency().values().all(|v| v.is_zero()));

        let audit_chain_segment_valid = if audit_events.is_empty() {
            true
        } else {
            let from_seq = audit_events.iter().map(|e| e.seq).min().unwrap();
            let to_seq = audit_events.iter().map(|e| e.seq).max().unwrap();
            let segment = source.audit_chain_segment(from_seq, to_seq)?;
            verify_chain(&segment).is_ok()
        };

        Ok(TraceBundle {
            source_event_id,
            event,
            outcome,
            journal_entries,
            audit_events,
            integrity: TraceIntegrity { payload_hash_verified, balance_verified, audit_chain_segment_valid },
        })
    }

    /// Resolves a journal_entry_id back to its owning event and delegates
    /// to [`Self::trace`]. Errors rather than returning an empty bundle
    /// when the entry genuinely doesn't exist — unlike a bare event_id, a
    /// caller who has a journal_entry_id got it from a real posted entry,
    /// so a miss here is a data-integrity surprise worth surfacing.
    pub fn trace_by_entry(journal_entry_id: Uuid, source: &dyn TraceDataSource, lookup_event: impl Fn(Uuid) -> Result<Option<Uuid>>) -> Result<TraceBundle> {
        let source_event_id = lookup_event(journal_entry_id)?.ok_or_else(|| {
            KernelError::Internal(format!("no journal entry found with id {journal_entry_id}"))
        })?;
        Self::trace(source_event_id, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::OutcomeStatus;
    use acctkernel_audit::{AuditAction, AuditDraft};
    use acctkernel_ledger::{JournalEntryStatus, JournalLine};
    use acctkernel_types::{AccountCode, EventId, Side};
    use chrono::{NaiveDate, Utc};
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeSource {
        event: Option<Event>,
        outcome: Option<InterpretationOutcome>,
        entries: Vec<JournalEntry>,
        audits: Vec<AuditEvent>,
    }

    impl TraceDataSource for FakeSource {
        fn find_event(&self, source_event_id: Uuid) -> Result<Option<Event>> {
            Ok(self.event.clone().filter(|e| *e.event_id.as_uuid() == source_event_id))
        }
        fn find_outcome(&self, source_event_id: Uuid) -> Result<Option<InterpretationOutcome>> {
            Ok(self.outcome.clone().filter(|o| o.source_event_id == source_event_id))
        }
        fn find_journal_entries(&self, source_event_id: Uuid) -> Result<Vec<JournalEntry>> {
            Ok(self.entries.iter().filter(|e| e.source_event_id == source_event_id).cloned().collect())
        }
        fn find_related_audit_events(&self, _source_event_id: Uuid, _journal_entry_ids: &[Uuid]) -> Result<Vec<AuditEvent>> {
            Ok(self.audits.clone())
        }
        fn audit_chain_segment(&self, from_seq: i64, to_seq: i64) -> Result<Vec<AuditEvent>> {
            Ok(self.audits.iter().filter(|a| a.seq >= from_seq && a.seq <= to_seq).cloned().collect())
        }
    }

    fn sample_event() -> Event {
        Event {
            event_id: EventId::new(),
            event_type: "ap.invoice_received".into(),
            schema_version: 1,
            occurred_at: Utc::now(),
            effective_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            actor_id: "actor-1".into(),
            producer: "erp".into(),
            payload: json!({"amount": "1234.56"}),
            ingested_at: Utc::now(),
        }
    }

    fn balanced_entry(source_event_id: Uuid) -> JournalEntry {
        JournalEntry {
            id: Uuid::new_v4(),
            seq: Some(1),
            source_event_id,
            ledger_id: "GL".into(),
            status: JournalEntryStatus::Posted,
            idempotency_key: format!("{source_event_id}:GL:1"),
            effective_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            posted_at: Some(Utc::now()),
            reversal_of_id: None,
            lines: vec![
                JournalLine { line_seq: 0, role: "Inventory".into(), account_code: AccountCode::new("1200"), side: Side::Debit, amount: rust_decimal_macros::dec!(1234.56), currency: "USD".into(), is_rounding: false, dimensions: HashMap::new() },
                JournalLine { line_seq: 1, role: "GRNI".into(), account_code: AccountCode::new("2100"), side: Side::Credit, amount: rust_decimal_macros::dec!(1234.56), currency: "USD".into(), is_rounding: false, dimensions: HashMap::new() },
            ],
        }
    }

    #[test]
    fn trace_bundle_verifies_payload_hash_and_balance() {
        let event = sample_event();
        let source_event_id = *event.event_id.as_uuid();
        let entry = balanced_entry(source_event_id);
        let mut outcome = InterpretationOutcome::new(source_event_id, "fp1");
        outcome.status = OutcomeStatus::Posted;
        outcome.journal_entry_ids.push(entry.id);

        let ingested_draft = AuditDraft::new(AuditAction::EventIngested, "event", source_event_id.to_string(), Utc::now(), event.payload.clone());
        let ingested = ingested_draft.seal(1, None);

        let source = FakeSource {
            event: Some(event),
            outcome: Some(outcome),
            entries: vec![entry],
            audits: vec![ingested],
        };

        let bundle = TraceSelector::trace(source_event_id, &source).unwrap();
        assert!(bundle.event.is_some());
        assert!(bundle.outcome.is_some());
        assert_eq!(bundle.journal_entries.len(), 1);
        assert!(bundle.integrity.payload_hash_verified);
        assert!(bundle.integrity.balance_verified);
        assert!(bundle.integrity.audit_chain_segment_valid);
    }

    #[test]
    fn missing_event_yields_empty_bundle_not_an_error() {
        let source = FakeSource::default();
        let bundle = TraceSelector::trace(Uuid::new_v4(), &source).unwrap();
        assert!(bundle.event.is_none());
        assert!(bundle.outcome.is_none());
        assert!(!bundle.integrity.payload_hash_verified);
    }

    #[test]
    fn unbalanced_entry_fails_balance_check() {
        let event = sample_event();
        let source_event_id = *event.event_id.as_uuid();
        let mut entry = balanced_entry(source_event_id);
        entry.lines[1].amount = rust_decimal_macros::dec!(1000.00);

        let source = FakeSource { event: Some(event), outcome: None, entries: vec![entry], audits: vec![] };
        let bundle = TraceSelector::trace(source_event_id, &source).unwrap();
        assert!(!bundle.integrity.balance_verified);
    }

    #[test]
    fn broken_chain_segment_is_detected() {
        let event = sample_event();
        let source_event_id = *event.event_id.as_uuid();
        let d1 = AuditDraft::new(AuditAction::EventIngested, "event", source_event_id.to_string(), Utc::now(), event.payload.clone());
        let mut e1 = d1.seal(1, None);
        let d2 = AuditDraft::new(AuditAction::OutcomeRecorded, "interpretation_outcome", source_event_id.to_string(), Utc::now(), json!({}));
        let e2 = d2.seal(2, Some(e1.hash.clone()));
        e1.payload = json!({"tampered": true});

        let source = FakeSource { event: Some(event), outcome: None, entries: vec![], audits: vec![e1, e2] };
        let bundle = TraceSelector::trace(source_event_id, &source).unwrap();
        assert!(!bundle.integrity.audit_chain_segment_valid);
    }
}
