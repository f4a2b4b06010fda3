//! Postgres implementations of the ingestion pipeline's impure-shell traits
//! (§4.11): [`ImportStore`] (staging persistence), [`MappingRegistry`]
//! (named mapping profiles), and [`EntityPromoter`] (master-data writers
//! for the entity types that don't need the coordinator).
//!
//! Journal promotion has its own `EntityPromoter` (`acctkernel_ingest::JournalPromoter`)
//! that dispatches through the coordinator instead of writing a row
//! directly; it isn't duplicated here.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use tokio::runtime::Handle;
use uuid::Uuid;

use acctkernel_ingest::{
    EntityPromoter, ImportBatch, ImportBatchStatus, ImportError, ImportMapping, ImportRecord,
    ImportRecordStatus, ImportStore, MappingRegistry, PromoteOutcome, PromotionError,
};

use crate::conn::{self, PgConn, SharedConn};

fn batch_status_to_str(status: ImportBatchStatus) -> &'static str {
    match status {
        ImportBatchStatus::Loading => "LOADING",
        ImportBatchStatus::Staged => "STAGED",
        ImportBatchStatus::Validated => "VALIDATED",
        ImportBatchStatus::Completed => "COMPLETED",
        ImportBatchStatus::Failed => "FAILED",
    }
}

fn batch_status_from_str(s: &str) -> ImportBatchStatus {
    match s {
        "STAGED" => ImportBatchStatus::Staged,
        "VALIDATED" => ImportBatchStatus::Validated,
        "COMPLETED" => ImportBatchStatus::Completed,
        "FAILED" => ImportBatchStatus::Failed,
        _ => ImportBatchStatus::Loading,
    }
}

fn record_status_to_str(status: ImportRecordStatus) -> &'static str {
    match status {
        ImportRecordStatus::Staged => "STAGED",
        ImportRecordStatus::Valid => "VALID",
        ImportRecordStatus::Invalid => "INVALID",
        ImportRecordStatus::Promoted => "PROMOTED",
        ImportRecordStatus::PromotionFailed => "PROMOTION_FAILED",
        ImportRecordStatus::Skipped => "SKIPPED",
    }
}

fn record_status_from_str(s: &str) -> ImportRecordStatus {
    match s {
        "VALID" => ImportRecordStatus::Valid,
        "INVALID" => ImportRecordStatus::Invalid,
        "PROMOTED" => ImportRecordStatus::Promoted,
        "PROMOTION_FAILED" => ImportRecordStatus::PromotionFailed,
        "SKIPPED" => ImportRecordStatus::Skipped,
        _ => ImportRecordStatus::Staged,
    }
}

fn batch_from_row(row: sqlx::postgres::PgRow) -> ImportBatch {
    ImportBatch {
        id: row.get("id"),
        mapping_name: row.get("mapping_name"),
        mapping_version: row.get::<i32, _>("mapping_version") as u32,
        mapping_hash: row.get("mapping_hash"),
        entity_type: row.get("entity_type"),
        source_filename: row.get("source_filename"),
        status: batch_status_from_str(row.get::<&str, _>("status")),
        total_records: row.get::<i32, _>("total_records") as u32,
        valid_records: row.get::<i32, _>("valid_records") as u32,
        invalid_records: row.get::<i32, _>("invalid_records") as u32,
        promoted_records: row.get::<i32, _>("promoted_records") as u32,
        skipped_records: row.get::<i32, _>("skipped_records") as u32,
        failed_records: row.get::<i32, _>("failed_records") as u32,
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
    }
}

fn record_from_row(row: sqlx::postgres::PgRow) -> ImportRecord {
    let validation_errors = serde_json::from_value(row.get::<Value, _>("validation_errors")).unwrap_or_default();
    ImportRecord {
        id: row.get("id"),
        batch_id: row.get("batch_id"),
        source_row: row.get::<i32, _>("source_row") as u32,
        entity_type: row.get("entity_type"),
        status: record_status_from_str(row.get::<&str, _>("status")),
        raw_data: row.get("raw_data"),
        mapped_data: row.get("mapped_data"),
        validation_errors,
        promoted_entity_id: row.get("promoted_entity_id"),
        promoted_at: row.get("promoted_at"),
    }
}

fn store_err(e: sqlx::Error) -> ImportError {
    ImportError::Store(e.to_string())
}

/// Staging persistence against `import_batches`/`import_records`. Mirrors
/// `PgStore`'s sync-over-async bridge (see the crate-level docs) since
/// `ImportService`/`PromotionService` are as synchronous as the rest of the
/// kernel core.
pub struct PgImportStore {
    pool: PgPool,
    rt: Handle,
    /// Set by [`ImportStore::begin_batch`]; every query below runs against
    /// this connection instead of the pool while it's `Some`, so a
    /// [`ImportStore::with_record_savepoint`] issued against the same
    /// connection actually covers these writes too (IM-15).
    batch: Option<SharedConn>,
}

impl PgImportStore {
    pub fn new(pool: PgPool, rt: Handle) -> Self {
        Self { pool, rt, batch: None }
    }

    fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        self.rt.block_on(fut)
    }

    fn conn(&self) -> PgConn {
        match &self.batch {
            Some(shared) => PgConn::Shared(shared.clone()),
            None => PgConn::Pool(self.pool.clone()),
        }
    }

    /// The connection this store is writing through while a batch is open,
    /// so the caller can build the entity promoters and `PostingSession`/
    /// `AuditSink` the batch's journal-entry promotion needs on the same
    /// connection. `None` outside a batch.
    pub fn batch_connection(&self) -> Option<SharedConn> {
        self.batch.clone()
    }
}

impl ImportStore for PgImportStore {
    fn insert_batch(&mut self, batch: &ImportBatch) -> Result<(), ImportError> {
        let conn = self.conn();
        let batch = batch.clone();
        self.block_on(conn.with(|c| async move {
            sqlx::query(
                "INSERT INTO import_batches (id, mapping_name, mapping_version, mapping_hash, entity_type, source_filename, status, total_records, valid_records, invalid_records, promoted_records, skipped_records, failed_records, error_message, created_at, completed_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
            )
            .bind(batch.id)
            .bind(&batch.mapping_name)
            .bind(batch.mapping_version as i32)
            .bind(&batch.mapping_hash)
            .bind(&batch.entity_type)
            .bind(&batch.source_filename)
            .bind(batch_status_to_str(batch.status))
            .bind(batch.total_records as i32)
            .bind(batch.valid_records as i32)
            .bind(batch.invalid_records as i32)
            .bind(batch.promoted_records as i32)
            .bind(batch.skipped_records as i32)
            .bind(batch.failed_records as i32)
            .bind(&batch.error_message)
            .bind(batch.created_at)
            .bind(batch.completed_at)
            .execute(c)
            .await
            .map(|_| ())
        }))
        .map_err(store_err)?;
        Ok(())
    }

    fn get_batch(&self, batch_id: Uuid) -> Result<Option<ImportBatch>, ImportError> {
        let conn = self.conn();
        self.block_on(conn.with(|c| async move { sqlx::query("SELECT * FROM import_batches WHERE id = $1").bind(batch_id).fetch_optional(c).await }))
            .map_err(store_err)
            .map(|row| row.map(batch_from_row))
    }

    fn update_batch(&mut self, batch: &ImportBatch) -> Result<(), ImportError> {
        let conn = self.conn();
        let batch = batch.clone();
        self.block_on(conn.with(|c| async move {
            sqlx::query(
                "UPDATE import_batches SET status = $2, total_records = $3, valid_records = $4, invalid_records = $5, promoted_records = $6, skipped_records = $7, failed_records = $8, error_message = $9, completed_at = $10 WHERE id = $1",
            )
            .bind(batch.id)
            .bind(batch_status_to_str(batch.status))
            .bind(batch.total_records as i32)
            .bind(batch.valid_records as i32)
            .bind(batch.invalid_records as i32)
            .bind(batch.promoted_records as i32)
            .bind(batch.skipped_records as i32)
            .bind(batch.failed_records as i32)
            .bind(&batch.error_message)
            .bind(batch.completed_at)
            .execute(c)
            .await
            .map(|_| ())
        }))
        .map_err(store_err)?;
        Ok(())
    }

    fn insert_records(&mut self, records: &[ImportRecord]) -> Result<(), ImportError> {
        let conn = self.conn();
        let records = records.to_vec();
        self.block_on(conn.with_tx(|c| async move {
            for rec in &records {
                sqlx::query(
                    "INSERT INTO import_records (id, batch_id, source_row, entity_type, status, raw_data, mapped_data, validation_errors, promoted_entity_id, promoted_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                )
                .bind(rec.id)
                .bind(rec.batch_id)
                .bind(rec.source_row as i32)
                .bind(&rec.entity_type)
                .bind(record_status_to_str(rec.status))
                .bind(&rec.raw_data)
                .bind(&rec.mapped_data)
                .bind(serde_json::to_value(&rec.validation_errors).unwrap_or(Value::Array(vec![])))
                .bind(rec.promoted_entity_id)
                .bind(rec.promoted_at)
                .execute(&mut *c)
                .await?;
            }
            Ok(())
        }))
        .map_err(store_err)?;
        Ok(())
    }

    fn list_records(&self, batch_id: Uuid) -> Result<Vec<ImportRecord>, ImportError> {
        let conn = self.conn();
        self.block_on(conn.with(|c| async move { sqlx::query("SELECT * FROM import_records WHERE batch_id = $1 ORDER BY source_row").bind(batch_id).fetch_all(c).await }))
            .map_err(store_err)
            .map(|rows| rows.into_iter().map(record_from_row).collect())
    }

    fn update_records(&mut self, records: &[ImportRecord]) -> Result<(), ImportError> {
        let conn = self.conn();
        let records = records.to_vec();
        self.block_on(conn.with_tx(|c| async move {
            for rec in &records {
                sqlx::query(
                    "UPDATE import_records SET status = $2, raw_data = $3, mapped_data = $4, validation_errors = $5, promoted_entity_id = $6, promoted_at = $7 WHERE id = $1",
                )
                .bind(rec.id)
                .bind(record_status_to_str(rec.status))
                .bind(&rec.raw_data)
                .bind(&rec.mapped_data)
                .bind(serde_json::to_value(&rec.validation_errors).unwrap_or(Value::Array(vec![])))
                .bind(rec.promoted_entity_id)
                .bind(rec.promoted_at)
                .execute(&mut *c)
                .await?;
            }
            Ok(())
        }))
        .map_err(store_err)?;
        Ok(())
    }

    fn get_record(&self, record_id: Uuid) -> Result<Option<ImportRecord>, ImportError> {
        let conn = self.conn();
        self.block_on(conn.with(|c| async move { sqlx::query("SELECT * FROM import_records WHERE id = $1").bind(record_id).fetch_optional(c).await }))
            .map_err(store_err)
            .map(|row| row.map(record_from_row))
    }

    /// Idempotent: a caller that needs the batch connection before calling
    /// `promote_batch` (to build promoters sharing it) can open it early;
    /// `promote_batch`'s own `begin_batch` then finds one already open and
    /// leaves it alone.
    fn begin_batch(&mut self) -> Result<(), ImportError> {
        if self.batch.is_some() {
            return Ok(());
        }
        let pool = self.pool.clone();
        let shared = self.block_on(conn::begin_transaction(&pool)).map_err(store_err)?;
        self.batch = Some(shared);
        Ok(())
    }

    fn commit_batch(&mut self) -> Result<(), ImportError> {
        let Some(shared) = self.batch.take() else { return Ok(()) };
        self.block_on(conn::commit_transaction(&shared)).map_err(store_err)
    }

    fn rollback_batch(&mut self) -> Result<(), ImportError> {
        let Some(shared) = self.batch.take() else { return Ok(()) };
        self.block_on(conn::rollback_transaction(&shared)).map_err(store_err)
    }

    fn with_record_savepoint(&mut self, body: &mut dyn FnMut() -> std::result::Result<(), String>) -> Result<std::result::Result<(), String>, ImportError> {
        let Some(shared) = self.batch.clone() else {
            return Ok(body());
        };
        self.block_on(conn::savepoint(&shared, "import_record")).map_err(store_err)?;
        let result = body();
        let outcome = if result.is_ok() { self.block_on(conn::release_savepoint(&shared, "import_record")) } else { self.block_on(conn::rollback_to_savepoint(&shared, "import_record")) };
        outcome.map_err(store_err)?;
        Ok(result)
    }
}

/// Resolves a named mapping profile against the `import_mappings` table
/// (§6 "Import mapping definition" compiled into the config pack). Picks
/// the highest registered `version` for a name, the same "latest wins"
/// policy `acctkernel_schema::SchemaRegistry::latest` uses.
pub struct PgMappingRegistry {
    pool: PgPool,
    rt: Handle,
}

impl PgMappingRegistry {
    pub fn new(pool: PgPool, rt: Handle) -> Self {
        Self { pool, rt }
    }
}

impl MappingRegistry for PgMappingRegistry {
    fn get(&self, name: &str) -> Option<ImportMapping> {
        let pool = self.pool.clone();
        let name = name.to_string();
        let row = self
            .rt
            .block_on(async move { sqlx::query("SELECT definition FROM import_mappings WHERE name = $1 ORDER BY version DESC LIMIT 1").bind(&name).fetch_optional(&pool).await })
            .ok()
            .flatten()?;
        let definition: Value = row.get("definition");
        match serde_json::from_value(definition) {
            Ok(mapping) => Some(mapping),
            Err(e) => {
                tracing::warn!(mapping = %name, error = %e, "stored import mapping definition failed to deserialize");
                None
            }
        }
    }
}

/// `EntityPromoter` for the master-data entity types a staged record can
/// promote straight to a live table without going through the
/// interpretation coordinator (`"vendor"`, `"account"`) (§4.11
/// "EntityPromoter"). Journal promotion is handled separately by
/// `acctkernel_ingest::JournalPromoter`.
pub struct MasterDataPromoter {
    conn: PgConn,
    rt: Handle,
    entity_type: String,
}

impl MasterDataPromoter {
    pub fn new(pool: PgPool, rt: Handle, entity_type: impl Into<String>) -> Self {
        Self { conn: PgConn::Pool(pool), rt, entity_type: entity_type.into() }
    }

    /// Writes through a promotion batch's shared connection instead of a
    /// pool of its own, so this promoter's inserts land inside the same
    /// outer transaction (and, per record, the same `SAVEPOINT`) as the
    /// `ImportStore` that drives it.
    pub fn new_shared(conn: SharedConn, rt: Handle, entity_type: impl Into<String>) -> Self {
        Self { conn: PgConn::Shared(conn), rt, entity_type: entity_type.into() }
    }

    fn table(&self) -> Result<&'static str, PromotionError> {
        match self.entity_type.as_str() {
            "vendor" => Ok("vendors"),
            "account" => Ok("accounts"),
            other => Err(PromotionError::NoPromoterForEntityType(other.to_string())),
        }
    }
}

impl EntityPromoter for MasterDataPromoter {
    fn check_duplicate(&mut self, mapped: &serde_json::Map<String, Value>) -> Result<bool, PromotionError> {
        let table = self.table()?;
        let code = mapped.get("code").and_then(Value::as_str).map(str::to_string);
        let Some(code) = code else { return Ok(false) };
        let conn = self.conn.clone();
        let query = format!("SELECT 1 FROM {table} WHERE code = $1");
        let exists = self
            .rt
            .block_on(conn.with(|c| async move { sqlx::query(&query).bind(&code).fetch_optional(c).await }))
            .map_err(|e| PromotionError::Store(ImportError::Store(e.to_string())))?
            .is_some();
        Ok(exists)
    }

    fn promote(&mut self, mapped: &serde_json::Map<String, Value>, _actor_id: Uuid, now: DateTime<Utc>) -> Result<PromoteOutcome, PromotionError> {
        let table = self.table()?;
        let Some(code) = mapped.get("code").and_then(Value::as_str) else {
            return Ok(PromoteOutcome::failure("mapped record has no 'code' field"));
        };
        let Some(name) = mapped.get("name").and_then(Value::as_str) else {
            return Ok(PromoteOutcome::failure("mapped record has no 'name' field"));
        };

        let id = Uuid::new_v4();
        let code = code.to_string();
        let name = name.to_string();
        let mut attributes = mapped.clone();
        attributes.remove("code");
        attributes.remove("name");

        let conn = self.conn.clone();
        let result = if table == "vendors" {
            let currency = mapped.get("currency").and_then(Value::as_str).map(str::to_string);
            attributes.remove("currency");
            let attrs = Value::Object(attributes);
            self.rt
                .block_on(conn.with(|c| async move {
                    sqlx::query("INSERT INTO vendors (id, code, name, currency, attributes, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
                        .bind(id)
                        .bind(&code)
                        .bind(&name)
                        .bind(&currency)
                        .bind(&attrs)
                        .bind(now)
                        .execute(c)
                        .await
                }))
                .map(|_| ())
        } else {
            let account_type = mapped.get("account_type").and_then(Value::as_str).unwrap_or("unknown").to_string();
            attributes.remove("account_type");
            let attrs = Value::Object(attributes);
            self.rt
                .block_on(conn.with(|c| async move {
                    sqlx::query("INSERT INTO accounts (id, code, name, account_type, attributes, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
                        .bind(id)
                        .bind(&code)
                        .bind(&name)
                        .bind(&account_type)
                        .bind(&attrs)
                        .bind(now)
                        .execute(c)
                        .await
                }))
                .map(|_| ())
        };

        match result {
            Ok(()) => Ok(PromoteOutcome::success(id)),
            Err(e) => Ok(PromoteOutcome::failure(e.to_string())),
        }
    }
}
