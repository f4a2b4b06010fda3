//! Interpretation Coordinator — the single entry point that turns one
//! [`Event`] into one [`InterpretationOutcome`] (§4.9).
//!
//! All nine steps run logically inside one transaction; this crate stays
//! pure and leaves the transaction boundary, fiscal-period lookup, seq
//! assignment, and persistence to the collaborators passed in
//! ([`PeriodChecker`], [`PostingSession`], [`AuditSink`]).

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;

use acctkernel_audit::{AuditAction, AuditDraft, AuditSink};
use acctkernel_intent::{ImportedLine, IntentBuilder};
use acctkernel_ledger::{JournalWriter, LedgerRegistry, PostingSession, RoleResolver};
use acctkernel_meaning::{GuardOutcome, MeaningBuilder, ValuationModelRegistry, ValuationResolver};
use acctkernel_policy::PolicySelector;
use acctkernel_schema::{validate_payload, SchemaRegistry};
use acctkernel_types::{Event, ReferenceSnapshot};

use crate::outcome::{DecisionLogEntry, FailureType, InterpretationOutcome, OutcomeStatus};

/// Whether the fiscal period covering `effective_date` is open for posting.
/// A real implementation is backed by the `fiscal_period` table.
pub trait PeriodChecker {
    fn is_open(&self, effective_date: NaiveDate) -> bool;
}

pub struct CoordinatorContext<'a> {
    pub schemas: &'a SchemaRegistry,
    pub selector: &'a PolicySelector,
    pub ledgers: &'a LedgerRegistry,
    pub roles: &'a RoleResolver,
    pub valuations: &'a ValuationModelRegistry,
    pub period_checker: &'a dyn PeriodChecker,
    pub snapshot: ReferenceSnapshot,
}

pub struct InterpretationCoordinator;

impl InterpretationCoordinator {
    /// Interprets `event` against `scope`, producing a fully-formed outcome.
    /// Every control-flow exit (guard rejection, schema failure, posting
    /// failure, …) writes its terminal status before returning — the
    /// returned outcome is always the authoritative record, never a
    /// partial one.
    pub fn interpret(
        event: &Event,
        scope: &str,
        ctx: &CoordinatorContext,
        session: &mut dyn PostingSession,
        audit: &mut dyn AuditSink,
        now: DateTime<Utc>,
        trace_id: Uuid,
    ) -> InterpretationOutcome {
        let source_event_id = *event.event_id.as_uuid();
        let mut outcome = InterpretationOutcome::new(source_event_id, event.payload_hash());

        let _ = audit.append(AuditDraft::new(
            AuditAction::EventIngested,
            "event",
            event.event_id.to_string(),
            now,
            event.payload.clone(),
        ));

        // 1. Period check.
        if !ctx.period_checker.is_open(event.effective_date) {
            outcome.log(DecisionLogEntry::new(
                "period_check",
                "effective_date falls in a closed or nonexistent fiscal period",
                now,
                json!({"effective_date": event.effective_date}),
            ));
            return Self::finish(outcome, OutcomeStatus::Blocked, "PERIOD_CLOSED", "fiscal period is closed", None, audit, now);
        }

        // 2. Schema validation.
        if let Some(schema) = ctx.schemas.get(&event.event_type, event.schema_version) {
            let errors = validate_payload(&event.payload, schema);
            if !errors.is_empty() {
                outcome.log(DecisionLogEntry::new(
                    "schema_validation",
                    format!("{} validation error(s)", errors.len()),
                    now,
                    json!({"errors": errors.iter().map(|e| e.code).collect::<Vec<_>>()}),
                ));
                return Self::finish(
                    outcome,
                    OutcomeStatus::Rejected,
                    errors[0].code,
                    &errors[0].message,
                    None,
                    audit,
                    now,
                );
            }
        } else {
            outcome.log(DecisionLogEntry::new("schema_validation", "no schema registered for event type", now, json!({})));
            return Self::finish(
                outcome,
                OutcomeStatus::Rejected,
                "UNSUPPORTED_SCHEMA",
                "no schema registered for this event type/version",
                None,
                audit,
                now,
            );
        }

        // 3. Policy selection.
        let policy = match ctx.selector.select(&event.event_type, &event.payload, event.effective_date, scope) {
            Ok(p) => p,
            Err(e) => {
                outcome.log(DecisionLogEntry::new("policy_selection", e.to_string(), now, json!({})));
                return Self::finish(outcome, OutcomeStatus::Rejected, "POLICY_NOT_FOUND", &e.to_string(), None, audit, now);
            }
        };
        outcome.log(DecisionLogEntry::new("policy_selection", format!("selected {}", policy.policy_key()), now, json!({})));

        // 4. Reference snapshot capture — already frozen in `ctx.snapshot`.
        outcome.log(DecisionLogEntry::new("snapshot_capture", "reference snapshot frozen", now, serde_json::to_value(&ctx.snapshot).unwrap_or_default()));

        // 5. Meaning build.
        let profile_hash = policy_hash(policy);
        let meaning = MeaningBuilder::build(
            policy,
            &event.event_type,
            source_event_id,
            event.effective_date,
            &event.payload,
            &profile_hash,
            ctx.snapshot.clone(),
            now,
            trace_id,
            None,
        );
        match &meaning.guard_result {
            GuardOutcome::Rejected { reason_code, detail } => {
                outcome.log(DecisionLogEntry::new("guard_evaluation", format!("REJECT: {reason_code}"), now, json!({"detail": detail})));
                return Self::finish(outcome, OutcomeStatus::Rejected, reason_code, detail, None, audit, now);
            }
            GuardOutcome::Blocked { reason_code, detail } => {
                outcome.log(DecisionLogEntry::new("guard_evaluation", format!("BLOCK: {reason_code}"), now, json!({"detail": detail})));
                return Self::finish(outcome, OutcomeStatus::Blocked, reason_code, detail, None, audit, now);
            }
            GuardOutcome::Passed => {}
        }
        if !meaning.success {
            let detail = meaning.validation_errors.first().map(|v| v.message.clone()).unwrap_or_default();
            outcome.log(DecisionLogEntry::new("authority_check", "policy authority violation", now, json!({"detail": detail})));
            return Self::finish(outcome, OutcomeStatus::Failed, "AUTHORITY_VIOLATION", &detail, Some(FailureType::Authority), audit, now);
        }
        let economic_event = meaning.economic_event.expect("success implies economic_event");
        outcome.log(DecisionLogEntry::new("meaning_build", format!("economic_type={}", economic_event.economic_type), now, json!({})));

        // Valuation, feeding the intent builder's amount/currency.
        let (amount, currency) = match &policy.valuation_model {
            Some(model_id) => {
                let resolver = ValuationResolver::new(ctx.valuations);
                match resolver.resolve(model_id, &event.payload, None) {
                    Ok(result) => (result.value, result.currency.to_string()),
                    Err(e) => {
                        outcome.log(DecisionLogEntry::new("valuation", e.to_string(), now, json!({})));
                        return Self::finish(outcome, OutcomeStatus::Failed, "VALUATION_FAILED", &e.to_string(), Some(FailureType::Engine), audit, now);
                    }
                }
            }
            None => {
                outcome.log(DecisionLogEntry::new("valuation", "no valuation model declared; economic event carries no amount", now, json!({})));
                (economic_event.quantity.unwrap_or_default(), "USD".to_string())
            }
        };

        // 6. Intent build.
        let intent = match IntentBuilder::build(policy, source_event_id, source_event_id, event.effective_date, &event.payload, amount, &currency) {
            Ok(i) => i,
            Err(e) => {
                outcome.log(DecisionLogEntry::new("intent_build", e.to_string(), now, json!({})));
                return Self::finish(outcome, OutcomeStatus::Failed, "INTENT_BUILD_FAILED", &e.to_string(), Some(FailureType::Engine), audit, now);
            }
        };

        // 7. Journal write.
        let posted = match JournalWriter::write(&intent, ctx.roles, ctx.ledgers, session, now) {
            Ok(p) => p,
            Err(e) => {
                outcome.log(DecisionLogEntry::new("journal_write", e.to_string(), now, json!({})));
                let failure_type = match e.error_code() {
                    "UNRESOLVABLE_ROLE" => FailureType::Engine,
                    "JOURNAL_UNBALANCED" | "ROUNDING_ABOVE_THRESHOLD" => FailureType::Reconciliation,
                    _ => FailureType::System,
                };
                return Self::finish(outcome, OutcomeStatus::Failed, e.error_code(), &e.to_string(), Some(failure_type), audit, now);
            }
        };

        for posted_entry in &posted {
            outcome.journal_entry_ids.push(posted_entry.entry.id);
            if !posted_entry.idempotent_replay {
                let _ = audit.append(AuditDraft::new(
                    AuditAction::JournalPosted,
                    "journal_entry",
                    posted_entry.entry.id.to_string(),
                    now,
                    json!({"ledger_id": posted_entry.entry.ledger_id, "seq": posted_entry.entry.seq}),
                ));
            }
        }
        outcome.log(DecisionLogEntry::new(
            "journal_write",
            format!("{} entr(y/ies) posted", posted.len()),
            now,
            json!({"entry_ids": outcome.journal_entry_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>()}),
        ));

        Self::log_dimension_gaps(&mut outcome, &posted, ctx.ledgers, now);

        // 8 & 9. Outcome + audit.
        Self::finish(outcome, OutcomeStatus::Posted, "POSTED", "interpretation completed", None, audit, now)
    }

    /// Dimension completeness (L1/L3 — SPEC_FULL Open Question 3): hinted
    /// but not fully enforced in the source material, so a line missing a
    /// ledger's required dimension is logged, never rejected or blocked.
    fn log_dimension_gaps(outcome: &mut InterpretationOutcome, posted: &[acctkernel_ledger::PostedEntry], ledgers: &LedgerRegistry, now: DateTime<Utc>) {
        for posted_entry in posted {
            let required = ledgers.dimension_requirements(&posted_entry.entry.ledger_id);
            if required.is_empty() {
                continue;
            }
            for line in &posted_entry.entry.lines {
                let missing: Vec<&String> = required.iter().filter(|d| !line.dimensions.contains_key(d.as_str())).collect();
                if !missing.is_empty() {
                    outcome.log(DecisionLogEntry::new(
                        "dimension_completeness_warning",
                        format!("line {} missing required dimension(s)", line.line_seq),
                        now,
                        json!({"ledger_id": posted_entry.entry.ledger_id, "line_seq": line.line_seq, "missing": missing}),
                    ));
                }
            }
        }
    }

    /// Alternate entry point for `import.historical_journal` (§4.11): the
    /// promoter has already assembled `lines` (account_key + debit/credit)
    /// from a staged row rather than a policy's ledger effects, so intent
    /// building goes through [`IntentBuilder::from_payload_lines`] instead
    /// of step 6's policy-driven path. Steps 1 (period check) and 7-9
    /// (journal write, outcome, audit) are unchanged; schema validation and
    /// policy selection don't apply to an already-resolved line set.
    #[allow(clippy::too_many_arguments)]
    pub fn interpret_imported_journal(
        source_event_id: Uuid,
        payload_fingerprint: &str,
        ledger_id: &str,
        profile_id: &str,
        profile_version: u32,
        effective_date: NaiveDate,
        lines: &[ImportedLine],
        resolve_role: impl Fn(&str) -> Option<String>,
        roles: &RoleResolver,
        ledgers: &LedgerRegistry,
        period_checker: &dyn PeriodChecker,
        session: &mut dyn PostingSession,
        audit: &mut dyn AuditSink,
        now: DateTime<Utc>,
    ) -> InterpretationOutcome {
        let mut outcome = InterpretationOutcome::new(source_event_id, payload_fingerprint);

        if !period_checker.is_open(effective_date) {
            outcome.log(DecisionLogEntry::new(
                "period_check",
                "effective_date falls in a closed or nonexistent fiscal period",
                now,
                json!({"effective_date": effective_date}),
            ));
            return Self::finish(outcome, OutcomeStatus::Blocked, "PERIOD_CLOSED", "fiscal period is closed", None, audit, now);
        }

        let intent = match IntentBuilder::from_payload_lines(
            source_event_id,
            source_event_id,
            profile_id,
            profile_version,
            effective_date,
            ledger_id,
            lines,
            resolve_role,
        ) {
            Ok(i) => i,
            Err(e) => {
                outcome.log(DecisionLogEntry::new("intent_build", e.to_string(), now, json!({})));
                let reason_code = match e {
                    acctkernel_intent::IntentBuildError::UnresolvableAccountKey(_) => "UNRESOLVABLE_ACCOUNT_KEY",
                    _ => "INTENT_BUILD_FAILED",
                };
                return Self::finish(outcome, OutcomeStatus::Failed, reason_code, &e.to_string(), Some(FailureType::Engine), audit, now);
            }
        };

        let posted = match JournalWriter::write(&intent, roles, ledgers, session, now) {
            Ok(p) => p,
            Err(e) => {
                outcome.log(DecisionLogEntry::new("journal_write", e.to_string(), now, json!({})));
                let failure_type = match e.error_code() {
                    "UNRESOLVABLE_ROLE" => FailureType::Engine,
                    "JOURNAL_UNBALANCED" | "ROUNDING_ABOVE_THRESHOLD" => FailureType::Reconciliation,
                    _ => FailureType::System,
                };
                return Self::finish(outcome, OutcomeStatus::Failed, e.error_code(), &e.to_string(), Some(failure_type), audit, now);
            }
        };

        for posted_entry in &posted {
            outcome.journal_entry_ids.push(posted_entry.entry.id);
            if !posted_entry.idempotent_replay {
                let _ = audit.append(AuditDraft::new(
                    AuditAction::JournalPosted,
                    "journal_entry",
                    posted_entry.entry.id.to_string(),
                    now,
                    json!({"ledger_id": posted_entry.entry.ledger_id, "seq": posted_entry.entry.seq}),
                ));
            }
        }
        outcome.log(DecisionLogEntry::new(
            "journal_write",
            format!("{} entr(y/ies) posted", posted.len()),
            now,
            json!({"entry_ids": outcome.journal_entry_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>()}),
        ));

        Self::finish(outcome, OutcomeStatus::Posted, "POSTED", "interpretation completed", None, audit, now)
    }

    fn finish(
        mut outcome: InterpretationOutcome,
        status: OutcomeStatus,
        reason_code: &str,
        reason_detail: &str,
        failure_type: Option<FailureType>,
        audit: &mut dyn AuditSink,
        now: DateTime<Utc>,
    ) -> InterpretationOutcome {
        // The freshly-constructed outcome starts life as `Failed` (see
        // `InterpretationOutcome::new`) purely as a sentinel; the very
        // first real transition always legally reaches any status.
        outcome.status = status;
        outcome.reason_code = Some(reason_code.to_string());
        outcome.reason_detail = Some(reason_detail.to_string());
        outcome.failure_type = failure_type;
        let _ = audit.append(AuditDraft::new(
            AuditAction::OutcomeRecorded,
            "interpretation_outcome",
            outcome.source_event_id.to_string(),
            now,
            json!({"status": status.as_str(), "reason_code": reason_code}),
        ));
        outcome
    }
}

fn policy_hash(policy: &acctkernel_policy::AccountingPolicy) -> String {
    use sha2::{Digest, Sha256};
    let canonical = serde_json::to_vec(policy).unwrap_or_default();
    hex::encode(Sha256::digest(canonical))
}

#[cfg(test)]
mod tests {
    use super::*;
    use acctkernel_audit::AuditEvent;
    use acctkernel_ledger::{JournalEntry, RoleBinding};
    use acctkernel_policy::{AccountingPolicy, GuardCondition, GuardType, LedgerEffect, PolicyMeaning, PolicyPrecedence, PolicyTrigger};
    use acctkernel_schema::{EventSchema, FieldSchema, FieldType};
    use acctkernel_types::{AccountCode, EventId};
    use serde_json::json;
    use std::collections::HashMap;

    struct AlwaysOpen;
    impl PeriodChecker for AlwaysOpen {
        fn is_open(&self, _date: NaiveDate) -> bool {
            true
        }
    }
    struct AlwaysClosed;
    impl PeriodChecker for AlwaysClosed {
        fn is_open(&self, _date: NaiveDate) -> bool {
            false
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
    struct RecordingAuditSink {
        events: Vec<AuditEvent>,
    }
    impl AuditSink for RecordingAuditSink {
        fn append(&mut self, draft: AuditDraft) -> acctkernel_types::Result<AuditEvent> {
            let seq = self.events.len() as i64 + 1;
            let prev = self.events.last().map(|e| e.hash.clone());
            let sealed = draft.seal(seq, prev);
            self.events.push(sealed.clone());
            Ok(sealed)
        }
    }

    fn schema() -> EventSchema {
        EventSchema {
            event_type: "ap.invoice_received".into(),
            version: 1,
            fields: vec![
                FieldSchema::scalar("amount", FieldType::Decimal, true),
                FieldSchema::scalar("currency", FieldType::Currency, true),
                FieldSchema::scalar("po_number", FieldType::String, false),
            ],
        }
    }

    fn policy() -> AccountingPolicy {
        AccountingPolicy {
            name: "ap_invoice_standard".into(),
            version: 1,
            trigger: PolicyTrigger::new("ap.invoice_received"),
            meaning: PolicyMeaning { economic_type: "APLiability".into(), quantity_field: Some("amount".into()), dimensions: vec![] },
            ledger_effects: vec![LedgerEffect { ledger: "GL".into(), debit_role: "Inventory".into(), credit_role: "AccountsPayable".into() }],
            effective_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            effective_to: None,
            scope: "*".into(),
            precedence: PolicyPrecedence::default(),
            valuation_model: Some("fixed_amount_v1".into()),
            guards: vec![GuardCondition {
                guard_type: GuardType::Reject,
                expression: "amount <= 0".into(),
                reason_code: "INVALID_AMOUNT".into(),
                message: "amount must be positive".into(),
            }],
            line_mappings: vec![],
            intent_source: None,
            description: String::new(),
        }
    }

    fn event(amount: &str) -> Event {
        Event {
            event_id: EventId::new(),
            event_type: "ap.invoice_received".into(),
            schema_version: 1,
            occurred_at: Utc::now(),
            effective_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            actor_id: "actor-1".into(),
            producer: "erp".into(),
            payload: json!({"amount": amount, "currency": "USD", "po_number": "PO-100"}),
            ingested_at: Utc::now(),
        }
    }

    fn context<'a>(
        schemas: &'a SchemaRegistry,
        selector: &'a PolicySelector,
        ledgers: &'a LedgerRegistry,
        roles: &'a RoleResolver,
        valuations: &'a ValuationModelRegistry,
        period_checker: &'a dyn PeriodChecker,
    ) -> CoordinatorContext<'a> {
        CoordinatorContext {
            schemas,
            selector,
            ledgers,
            roles,
            valuations,
            period_checker,
            snapshot: ReferenceSnapshot::new("cfg1", "coa1", "dim1", "cur1", "fx1"),
        }
    }

    fn roles() -> RoleResolver {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        RoleResolver::new()
            .bind(RoleBinding { ledger_id: "GL".into(), role: "Inventory".into(), account_code: AccountCode::new("1200"), effective_from: from, effective_to: None, config_version: "v1".into() })
            .bind(RoleBinding { ledger_id: "GL".into(), role: "AccountsPayable".into(), account_code: AccountCode::new("2000"), effective_from: from, effective_to: None, config_version: "v1".into() })
    }

    #[test]
    fn simple_ap_invoice_posts() {
        let mut schemas = SchemaRegistry::new();
        schemas.register(schema()).unwrap();
        let mut selector = PolicySelector::new();
        selector.register(policy());
        let ledgers = LedgerRegistry::new().with_default_gl();
        let role_resolver = roles();
        let valuations = ValuationModelRegistry::with_standard_models();
        let open = AlwaysOpen;
        let ctx = context(&schemas, &selector, &ledgers, &role_resolver, &valuations, &open);

        let mut session = InMemorySession::default();
        let mut audit = RecordingAuditSink::default();

        let outcome = InterpretationCoordinator::interpret(&event("1234.56"), "*", &ctx, &mut session, &mut audit, Utc::now(), Uuid::new_v4());

        assert_eq!(outcome.status, OutcomeStatus::Posted);
        assert_eq!(outcome.journal_entry_ids.len(), 1);
        assert!(audit.events.iter().any(|e| e.action == AuditAction::JournalPosted));
    }

    #[test]
    fn zero_amount_guard_rejects_with_no_journal_entries() {
        let mut schemas = SchemaRegistry::new();
        schemas.register(schema()).unwrap();
        let mut selector = PolicySelector::new();
        selector.register(policy());
        let ledgers = LedgerRegistry::new().with_default_gl();
        let role_resolver = roles();
        let valuations = ValuationModelRegistry::with_standard_models();
        let open = AlwaysOpen;
        let ctx = context(&schemas, &selector, &ledgers, &role_resolver, &valuations, &open);

        let mut session = InMemorySession::default();
        let mut audit = RecordingAuditSink::default();

        let outcome = InterpretationCoordinator::interpret(&event("0"), "*", &ctx, &mut session, &mut audit, Utc::now(), Uuid::new_v4());

        assert_eq!(outcome.status, OutcomeStatus::Rejected);
        assert_eq!(outcome.reason_code.as_deref(), Some("INVALID_AMOUNT"));
        assert!(outcome.journal_entry_ids.is_empty());
    }

    #[test]
    fn closed_period_blocks_before_any_posting() {
        let mut schemas = SchemaRegistry::new();
        schemas.register(schema()).unwrap();
        let mut selector = PolicySelector::new();
        selector.register(policy());
        let ledgers = LedgerRegistry::new().with_default_gl();
        let role_resolver = roles();
        let valuations = ValuationModelRegistry::with_standard_models();
        let closed = AlwaysClosed;
        let ctx = context(&schemas, &selector, &ledgers, &role_resolver, &valuations, &closed);

        let mut session = InMemorySession::default();
        let mut audit = RecordingAuditSink::default();

        let outcome = InterpretationCoordinator::interpret(&event("1234.56"), "*", &ctx, &mut session, &mut audit, Utc::now(), Uuid::new_v4());

        assert_eq!(outcome.status, OutcomeStatus::Blocked);
        assert_eq!(outcome.reason_code.as_deref(), Some("PERIOD_CLOSED"));
        assert!(outcome.journal_entry_ids.is_empty());
    }

    #[test]
    fn reposting_same_event_id_is_idempotent() {
        let mut schemas = SchemaRegistry::new();
        schemas.register(schema()).unwrap();
        let mut selector = PolicySelector::new();
        selector.register(policy());
        let ledgers = LedgerRegistry::new().with_default_gl();
        let role_resolver = roles();
        let valuations = ValuationModelRegistry::with_standard_models();
        let open = AlwaysOpen;
        let ctx = context(&schemas, &selector, &ledgers, &role_resolver, &valuations, &open);

        let mut session = InMemorySession::default();
        let mut audit = RecordingAuditSink::default();
        let ev = event("500.00");

        let first = InterpretationCoordinator::interpret(&ev, "*", &ctx, &mut session, &mut audit, Utc::now(), Uuid::new_v4());
        let second = InterpretationCoordinator::interpret(&ev, "*", &ctx, &mut session, &mut audit, Utc::now(), Uuid::new_v4());

        assert_eq!(first.journal_entry_ids, second.journal_entry_ids);
        let posted_count = audit.events.iter().filter(|e| e.action == AuditAction::JournalPosted).count();
        assert_eq!(posted_count, 1);
    }

    #[test]
    fn missing_required_dimension_logs_warning_without_blocking_post() {
        let mut schemas = SchemaRegistry::new();
        schemas.register(schema()).unwrap();
        let mut selector = PolicySelector::new();
        selector.register(policy());
        let mut ledgers = LedgerRegistry::new().with_default_gl();
        ledgers.register(
            "GL",
            acctkernel_ledger::LedgerRequirementSet::new(rust_decimal_macros::dec!(0.01)).with_dimensions(vec!["cost_center"]),
        );
        let role_resolver = roles();
        let valuations = ValuationModelRegistry::with_standard_models();
        let open = AlwaysOpen;
        let ctx = context(&schemas, &selector, &ledgers, &role_resolver, &valuations, &open);

        let mut session = InMemorySession::default();
        let mut audit = RecordingAuditSink::default();

        let outcome = InterpretationCoordinator::interpret(&event("1234.56"), "*", &ctx, &mut session, &mut audit, Utc::now(), Uuid::new_v4());

        assert_eq!(outcome.status, OutcomeStatus::Posted);
        assert!(outcome.decision_log.iter().any(|e| e.step == "dimension_completeness_warning"));
    }

    #[test]
    fn imported_journal_posts_via_account_key_to_role() {
        let ledgers = LedgerRegistry::new().with_default_gl();
        let role_resolver = roles();
        let open = AlwaysOpen;
        let mut session = InMemorySession::default();
        let mut audit = RecordingAuditSink::default();

        let lines = vec![
            ImportedLine { account_key: "1200".into(), debit: Some(rust_decimal_macros::dec!(500.00)), credit: None, currency: "USD".into() },
            ImportedLine { account_key: "2000".into(), debit: None, credit: Some(rust_decimal_macros::dec!(500.00)), currency: "USD".into() },
        ];
        let resolve_role = |key: &str| match key {
            "1200" => Some("Inventory".to_string()),
            "2000" => Some("AccountsPayable".to_string()),
            _ => None,
        };

        let outcome = InterpretationCoordinator::interpret_imported_journal(
            Uuid::new_v4(),
            "fp1",
            "GL",
            "import.historical_journal",
            1,
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            &lines,
            resolve_role,
            &role_resolver,
            &ledgers,
            &open,
            &mut session,
            &mut audit,
            Utc::now(),
        );

        assert_eq!(outcome.status, OutcomeStatus::Posted);
        assert_eq!(outcome.journal_entry_ids.len(), 1);
    }

    #[test]
    fn imported_journal_fails_on_unresolvable_account_key() {
        let ledgers = LedgerRegistry::new().with_default_gl();
        let role_resolver = roles();
        let open = AlwaysOpen;
        let mut session = InMemorySession::default();
        let mut audit = RecordingAuditSink::default();

        let lines = vec![ImportedLine { account_key: "9999".into(), debit: Some(rust_decimal_macros::dec!(500.00)), credit: None, currency: "USD".into() }];

        let outcome = InterpretationCoordinator::interpret_imported_journal(
            Uuid::new_v4(),
            "fp1",
            "GL",
            "import.historical_journal",
            1,
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            &lines,
            |_: &str| None,
            &role_resolver,
            &ledgers,
            &open,
            &mut session,
            &mut audit,
            Utc::now(),
        );

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.reason_code.as_deref(), Some("UNRESOLVABLE_ACCOUNT_KEY"));
    }
}
