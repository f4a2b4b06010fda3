//! Promotion service: stage -> live (IM-15). Promotes `VALID` staged
//! records to live entities through a per-`entity_type` [`EntityPromoter`],
//! with per-record isolation so one bad row never poisons the rest of the
//! batch.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use acctkernel_audit::{AuditAction, AuditDraft, AuditSink};

use crate::service::{ImportError, ImportStore};
use crate::staging::{ImportBatch, ImportBatchStatus, ImportRecord, ImportRecordStatus};
use crate::validate::ValidationError;

/// Outcome of one [`EntityPromoter::promote`] call. `entity_id` is required
/// whenever `success` is `true`.
#[derive(Debug, Clone)]
pub struct PromoteOutcome {
    pub success: bool,
    pub entity_id: Option<Uuid>,
    pub error: Option<String>,
}

impl PromoteOutcome {
    pub fn success(entity_id: Uuid) -> Self {
        Self { success: true, entity_id: Some(entity_id), error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, entity_id: None, error: Some(error.into()) }
    }
}

/// Implemented once per `entity_type` a mapping can promote to (e.g.
/// `"vendor"`, `"account"`, `"journal"`). Lives in the impure shell: it is
/// the only place a staged, validated record is written into its live
/// table.
pub trait EntityPromoter {
    /// True when `mapped` already exists live and should be skipped rather
    /// than promoted again.
    fn check_duplicate(&mut self, mapped: &Map<String, Value>) -> Result<bool>;
    fn promote(&mut self, mapped: &Map<String, Value>, actor_id: Uuid, now: DateTime<Utc>) -> Result<PromoteOutcome>;
}

#[derive(Debug, Error)]
pub enum PromotionError {
    #[error("batch not found: {0}")]
    BatchNotFound(Uuid),
    #[error("record not found: {0}")]
    RecordNotFound(Uuid),
    #[error("record {0} is not VALID")]
    RecordNotValid(Uuid),
    #[error("no promoter registered for entity_type {0:?}")]
    NoPromoterForEntityType(String),
    #[error(transparent)]
    Store(#[from] ImportError),
    #[error("audit sink error: {0}")]
    Audit(String),
}

pub type Result<T> = std::result::Result<T, PromotionError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionFailure {
    pub record_id: Uuid,
    pub source_row: u32,
    pub error_code: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct PromotionResult {
    pub batch_id: Uuid,
    pub total_attempted: u32,
    pub promoted: u32,
    pub failed: u32,
    pub skipped: u32,
    pub errors: Vec<PromotionFailure>,
}

/// Dependency graph over a batch's `VALID` records: ready to promote vs
/// blocked on an unresolved reference. v1 never resolves references, so
/// every valid record is ready and `blocked_count` is always 0 — kept as
/// its own type so a later referential-integrity pass can populate
/// `blockers` without changing [`PromotionService::promote_batch`]'s shape.
#[derive(Debug, Clone)]
pub struct PreflightBlocker {
    pub missing_entity_type: String,
    pub missing_key: String,
    pub blocked_records: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct PreflightGraph {
    pub batch_id: Uuid,
    pub ready_count: u32,
    pub blocked_count: u32,
    pub blockers: Vec<PreflightBlocker>,
}

fn promotion_failure_errors(message: &str) -> Vec<ValidationError> {
    vec![ValidationError::new("PROMOTION_FAILED", message, "")]
}

pub struct PromotionService<'a> {
    promoters: HashMap<String, &'a mut dyn EntityPromoter>,
}

impl<'a> PromotionService<'a> {
    pub fn new(promoters: HashMap<String, &'a mut dyn EntityPromoter>) -> Self {
        Self { promoters }
    }

    /// v1: every `VALID` record in the batch is ready; nothing is ever
    /// blocked, since no referential resolution exists yet (IM-15 Open
    /// Question, resolved in favor of the simplest correct v1).
    pub fn compute_preflight_graph(&self, store: &dyn ImportStore, batch_id: Uuid) -> Result<PreflightGraph> {
        store.get_batch(batch_id)?.ok_or(PromotionError::BatchNotFound(batch_id))?;
        let valid_count = store.list_records(batch_id)?.into_iter().filter(|r| r.status == ImportRecordStatus::Valid).count() as u32;
        Ok(PreflightGraph { batch_id, ready_count: valid_count, blocked_count: 0, blockers: Vec::new() })
    }

    /// Promotes every `VALID` record in source-row order inside one outer
    /// transaction (`store.begin_batch`). Each record runs in its own
    /// `SAVEPOINT` (`store.with_record_savepoint`, around `promote_one`): a
    /// failure inside one promoter call rolls back only that savepoint,
    /// marks the record `PROMOTION_FAILED`, and moves on rather than
    /// aborting the batch, while every sibling record's write stays intact
    /// until the outer transaction commits at the end (IM-15). Stores with
    /// no real transaction (the in-memory test double) run every record
    /// directly with no rollback semantics, since there's nothing to
    /// savepoint over.
    pub fn promote_batch(&mut self, store: &mut dyn ImportStore, audit: &mut dyn AuditSink, batch_id: Uuid, actor_id: Uuid, now: DateTime<Utc>) -> Result<PromotionResult> {
        store.begin_batch()?;
        match self.promote_batch_inner(store, audit, batch_id, actor_id, now) {
            Ok(result) => {
                store.commit_batch()?;
                Ok(result)
            }
            Err(e) => {
                store.rollback_batch()?;
                Err(e)
            }
        }
    }

    fn promote_batch_inner(&mut self, store: &mut dyn ImportStore, audit: &mut dyn AuditSink, batch_id: Uuid, actor_id: Uuid, now: DateTime<Utc>) -> Result<PromotionResult> {
        let mut batch = store.get_batch(batch_id)?.ok_or(PromotionError::BatchNotFound(batch_id))?;
        let graph = self.compute_preflight_graph(store, batch_id)?;

        let mut valid_records: Vec<ImportRecord> = store.list_records(batch_id)?.into_iter().filter(|r| r.status == ImportRecordStatus::Valid).collect();
        valid_records.sort_by_key(|r| r.source_row);
        let ready = if graph.ready_count > 0 { valid_records } else { Vec::new() };

        let (mut promoted, mut failed, mut skipped) = (0u32, 0u32, batch.skipped_records);
        let mut errors = Vec::new();
        let mut updated = Vec::with_capacity(ready.len());

        for mut rec in ready.clone() {
            match self.promote_one(store, &rec, actor_id, now) {
                PromoteStep::Skipped => {
                    rec.status = ImportRecordStatus::Skipped;
                    skipped += 1;
                }
                PromoteStep::Promoted(entity_id) => {
                    rec.status = ImportRecordStatus::Promoted;
                    rec.promoted_entity_id = Some(entity_id);
                    rec.promoted_at = Some(now);
                    promoted += 1;
                    audit
                        .append(
                            AuditDraft::new(
                                AuditAction::ImportRecordPromoted,
                                rec.entity_type.clone(),
                                entity_id.to_string(),
                                now,
                                serde_json::json!({
                                    "import_record_id": rec.id,
                                    "batch_id": rec.batch_id,
                                    "source_row": rec.source_row,
                                }),
                            )
                            .with_actor(actor_id.to_string()),
                        )
                        .map_err(|e| PromotionError::Audit(e.to_string()))?;
                }
                PromoteStep::Failed(message) => {
                    rec.status = ImportRecordStatus::PromotionFailed;
                    rec.validation_errors = promotion_failure_errors(&message);
                    failed += 1;
                    errors.push(PromotionFailure { record_id: rec.id, source_row: rec.source_row, error_code: "PROMOTION_FAILED".to_string(), message });
                }
            }
            updated.push(rec);
        }
        store.update_records(&updated)?;

        batch.promoted_records += promoted;
        batch.failed_records += failed;
        batch.skipped_records = skipped;
        batch.completed_at = Some(now);
        batch.status = ImportBatchStatus::Completed;
        store.update_batch(&batch)?;

        audit
            .append(
                AuditDraft::new(
                    AuditAction::ImportBatchCompleted,
                    "import_batch",
                    batch.id.to_string(),
                    now,
                    serde_json::json!({"promoted": promoted, "failed": failed, "skipped": skipped}),
                )
                .with_actor(actor_id.to_string()),
            )
            .map_err(|e| PromotionError::Audit(e.to_string()))?;

        Ok(PromotionResult { batch_id, total_attempted: updated.len() as u32, promoted, failed, skipped, errors })
    }

    /// Promotes one record in isolation, inside its own savepoint nested in
    /// its own outer transaction. The record must already be `VALID`; a
    /// batch-completion audit event is not written here, since a lone
    /// record promotion is not a batch lifecycle event.
    pub fn promote_record(&mut self, store: &mut dyn ImportStore, audit: &mut dyn AuditSink, record_id: Uuid, actor_id: Uuid, now: DateTime<Utc>) -> Result<ImportRecord> {
        store.begin_batch()?;
        match self.promote_record_inner(store, audit, record_id, actor_id, now) {
            Ok(rec) => {
                store.commit_batch()?;
                Ok(rec)
            }
            Err(e) => {
                store.rollback_batch()?;
                Err(e)
            }
        }
    }

    fn promote_record_inner(&mut self, store: &mut dyn ImportStore, audit: &mut dyn AuditSink, record_id: Uuid, actor_id: Uuid, now: DateTime<Utc>) -> Result<ImportRecord> {
        let mut rec = store.get_record(record_id)?.ok_or(PromotionError::RecordNotFound(record_id))?;
        if rec.status != ImportRecordStatus::Valid {
            return Err(PromotionError::RecordNotValid(record_id));
        }

        match self.promote_one(store, &rec, actor_id, now) {
            PromoteStep::Skipped => rec.status = ImportRecordStatus::Skipped,
            PromoteStep::Promoted(entity_id) => {
                rec.status = ImportRecordStatus::Promoted;
                rec.promoted_entity_id = Some(entity_id);
                rec.promoted_at = Some(now);
                audit
                    .append(
                        AuditDraft::new(
                            AuditAction::ImportRecordPromoted,
                            rec.entity_type.clone(),
                            entity_id.to_string(),
                            now,
                            serde_json::json!({"import_record_id": rec.id, "batch_id": rec.batch_id, "source_row": rec.source_row}),
                        )
                        .with_actor(actor_id.to_string()),
                    )
                    .map_err(|e| PromotionError::Audit(e.to_string()))?;
            }
            PromoteStep::Failed(message) => {
                rec.status = ImportRecordStatus::PromotionFailed;
                rec.validation_errors = promotion_failure_errors(&message);
            }
        }

        store.update_records(std::slice::from_ref(&rec))?;
        Ok(rec)
    }

    /// Runs one record's duplicate-check and promote call inside
    /// `store.with_record_savepoint` (IM-15): the promoter's writes commit
    /// to the outer transaction only if this returns anything but `Failed`,
    /// and roll back to the record's savepoint otherwise.
    fn promote_one(&mut self, store: &mut dyn ImportStore, rec: &ImportRecord, actor_id: Uuid, now: DateTime<Utc>) -> PromoteStep {
        let Some(promoter) = self.promoters.get_mut(&rec.entity_type) else {
            return PromoteStep::Failed(format!("No promoter for entity_type {:?}", rec.entity_type));
        };
        let mapped = match &rec.mapped_data {
            Some(Value::Object(m)) => m.clone(),
            _ => Map::new(),
        };

        let mut step = PromoteStep::Skipped;
        let savepoint_result = store.with_record_savepoint(&mut || {
            match promoter.check_duplicate(&mapped) {
                Ok(true) => {
                    step = PromoteStep::Skipped;
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => {
                    let message = e.to_string();
                    step = PromoteStep::Failed(message.clone());
                    return Err(message);
                }
            }
            match promoter.promote(&mapped, actor_id, now) {
                Ok(outcome) if outcome.success => match outcome.entity_id {
                    Some(id) => {
                        step = PromoteStep::Promoted(id);
                        Ok(())
                    }
                    None => {
                        let message = "promoter reported success with no entity_id".to_string();
                        step = PromoteStep::Failed(message.clone());
                        Err(message)
                    }
                },
                Ok(outcome) => {
                    let message = outcome.error.unwrap_or_else(|| "unknown error".to_string());
                    step = PromoteStep::Failed(message.clone());
                    Err(message)
                }
                Err(e) => {
                    let message = e.to_string();
                    step = PromoteStep::Failed(message.clone());
                    Err(message)
                }
            }
        });

        if let Err(e) = savepoint_result {
            return PromoteStep::Failed(e.to_string());
        }
        step
    }
}

enum PromoteStep {
    Skipped,
    Promoted(Uuid),
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    #[derive(Default)]
    struct InMemoryStore {
        batches: StdHashMap<Uuid, ImportBatch>,
        records: StdHashMap<Uuid, ImportRecord>,
    }

    impl ImportStore for InMemoryStore {
        fn insert_batch(&mut self, batch: &ImportBatch) -> std::result::Result<(), ImportError> {
            self.batches.insert(batch.id, batch.clone());
            Ok(())
        }
        fn get_batch(&self, batch_id: Uuid) -> std::result::Result<Option<ImportBatch>, ImportError> {
            Ok(self.batches.get(&batch_id).cloned())
        }
        fn update_batch(&mut self, batch: &ImportBatch) -> std::result::Result<(), ImportError> {
            self.batches.insert(batch.id, batch.clone());
            Ok(())
        }
        fn insert_records(&mut self, records: &[ImportRecord]) -> std::result::Result<(), ImportError> {
            for r in records {
                self.records.insert(r.id, r.clone());
            }
            Ok(())
        }
        fn list_records(&self, batch_id: Uuid) -> std::result::Result<Vec<ImportRecord>, ImportError> {
            Ok(self.records.values().filter(|r| r.batch_id == batch_id).cloned().collect())
        }
        fn update_records(&mut self, records: &[ImportRecord]) -> std::result::Result<(), ImportError> {
            for r in records {
                self.records.insert(r.id, r.clone());
            }
            Ok(())
        }
        fn get_record(&self, record_id: Uuid) -> std::result::Result<Option<ImportRecord>, ImportError> {
            Ok(self.records.get(&record_id).cloned())
        }
    }

    struct FakeAudit {
        events: Vec<AuditDraft>,
    }

    impl AuditSink for FakeAudit {
        fn append(&mut self, draft: AuditDraft) -> acctkernel_audit::Result<acctkernel_audit::AuditEvent> {
            self.events.push(draft.clone());
            Ok(acctkernel_audit::AuditEvent::seal(draft, 1, None))
        }
    }

    struct StubPromoter {
        seen_codes: Vec<String>,
        fail_next: bool,
    }

    impl EntityPromoter for StubPromoter {
        fn check_duplicate(&mut self, mapped: &Map<String, Value>) -> Result<bool> {
            let code = mapped.get("code").and_then(Value::as_str).unwrap_or_default().to_string();
            Ok(self.seen_codes.contains(&code))
        }

        fn promote(&mut self, mapped: &Map<String, Value>, _actor_id: Uuid, _now: DateTime<Utc>) -> Result<PromoteOutcome> {
            if self.fail_next {
                return Ok(PromoteOutcome::failure("simulated failure"));
            }
            let code = mapped.get("code").and_then(Value::as_str).unwrap_or_default().to_string();
            self.seen_codes.push(code);
            Ok(PromoteOutcome::success(Uuid::new_v4()))
        }
    }

    fn seed(store: &mut InMemoryStore, batch_id: Uuid, rows: &[(&str, ImportRecordStatus)]) {
        for (i, (code, status)) in rows.iter().enumerate() {
            let mut rec = ImportRecord::new(batch_id, (i + 1) as u32, "vendor", serde_json::json!({}), Some(serde_json::json!({"code": code})), vec![]);
            rec.status = *status;
            store.records.insert(rec.id, rec);
        }
    }

    #[test]
    fn promote_batch_promotes_valid_records_and_skips_duplicates() {
        let mut store = InMemoryStore::default();
        let batch = ImportBatch::new("qb_vendors", 1, "vendor", "vendors.csv", Utc::now());
        let batch_id = batch.id;
        store.batches.insert(batch_id, batch.clone());
        seed(&mut store, batch_id, &[("V1", ImportRecordStatus::Valid), ("V2", ImportRecordStatus::Valid), ("V3", ImportRecordStatus::Invalid)]);

        let mut promoter = StubPromoter { seen_codes: vec!["V2".to_string()], fail_next: false };
        let mut promoters: HashMap<String, &mut dyn EntityPromoter> = HashMap::new();
        promoters.insert("vendor".to_string(), &mut promoter);
        let mut service = PromotionService::new(promoters);
        let mut audit = FakeAudit { events: Vec::new() };

        let result = service.promote_batch(&mut store, &mut audit, batch_id, Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(result.promoted, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.failed, 0);
        assert_eq!(audit.events.len(), 2); // 1 promoted + 1 batch completed

        let updated = store.get_batch(batch_id).unwrap().unwrap();
        assert_eq!(updated.status, ImportBatchStatus::Completed);
        assert_eq!(updated.promoted_records, 1);
    }

    #[test]
    fn promote_batch_one_failure_does_not_block_siblings() {
        let mut store = InMemoryStore::default();
        let batch = ImportBatch::new("qb_vendors", 1, "vendor", "vendors.csv", Utc::now());
        let batch_id = batch.id;
        store.batches.insert(batch_id, batch.clone());
        seed(&mut store, batch_id, &[("V1", ImportRecordStatus::Valid), ("V2", ImportRecordStatus::Valid)]);

        let mut promoter = StubPromoter { seen_codes: vec![], fail_next: true };
        let mut promoters: HashMap<String, &mut dyn EntityPromoter> = HashMap::new();
        promoters.insert("vendor".to_string(), &mut promoter);
        let mut service = PromotionService::new(promoters);
        let mut audit = FakeAudit { events: Vec::new() };

        let result = service.promote_batch(&mut store, &mut audit, batch_id, Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(result.failed, 2);
        assert_eq!(result.promoted, 0);
        assert_eq!(result.errors.len(), 2);

        let updated = store.get_batch(batch_id).unwrap().unwrap();
        assert_eq!(updated.status, ImportBatchStatus::Completed);
        assert_eq!(updated.failed_records, 2);
    }

    #[test]
    fn promote_record_rejects_non_valid_status() {
        let mut store = InMemoryStore::default();
        let batch = ImportBatch::new("qb_vendors", 1, "vendor", "vendors.csv", Utc::now());
        store.batches.insert(batch.id, batch.clone());
        let rec = ImportRecord::new(batch.id, 1, "vendor", serde_json::json!({}), None, vec![]);
        let record_id = rec.id;
        store.records.insert(record_id, rec);

        let mut promoter = StubPromoter { seen_codes: vec![], fail_next: false };
        let mut promoters: HashMap<String, &mut dyn EntityPromoter> = HashMap::new();
        promoters.insert("vendor".to_string(), &mut promoter);
        let mut service = PromotionService::new(promoters);
        let mut audit = FakeAudit { events: Vec::new() };

        let err = service.promote_record(&mut store, &mut audit, record_id, Uuid::new_v4(), Utc::now()).unwrap_err();
        assert!(matches!(err, PromotionError::RecordNotValid(_)));
    }
}
