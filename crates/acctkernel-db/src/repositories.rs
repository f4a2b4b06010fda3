//! `PgStore`: the Postgres-backed implementation of every synchronous
//! collaborator trait the pure core crates define ([`PostingSession`],
//! [`AuditSink`], [`PeriodChecker`], [`TraceDataSource`]).

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{PgPool, Row};
use tokio::runtime::Handle;
use uuid::Uuid;

use acctkernel_audit::{AuditAction, AuditDraft, AuditEvent, AuditSink};
use acctkernel_coordinator::{trace::TraceDataSource, PeriodChecker};
use acctkernel_ledger::{JournalEntry, JournalEntryStatus, JournalLine, PostingSession};
use acctkernel_types::{AccountCode, Event, EventId, KernelError, Result, Side};

use crate::conn::PgConn;
use crate::error::DbError;

fn status_to_str(status: JournalEntryStatus) -> &'static str {
    match status {
        JournalEntryStatus::Draft => "draft",
        JournalEntryStatus::Posted => "posted",
        JournalEntryStatus::Reversed => "reversed",
    }
}

fn status_from_str(s: &str) -> JournalEntryStatus {
    match s {
        "posted" => JournalEntryStatus::Posted,
        "reversed" => JournalEntryStatus::Reversed,
        _ => JournalEntryStatus::Draft,
    }
}

fn side_to_str(side: Side) -> &'static str {
    match side {
        Side::Debit => "debit",
        Side::Credit => "credit",
    }
}

fn side_from_str(s: &str) -> Side {
    if s == "credit" {
        Side::Credit
    } else {
        Side::Debit
    }
}

/// A connected pool plus the runtime handle synchronous trait methods block
/// on. See the crate-level docs for why this bridge exists. `Clone` is cheap
/// (`PgPool` and `Handle` are both reference-counted handles), which lets a
/// caller that needs two independent `&mut dyn Trait` views -- e.g. one as
/// `PostingSession`, one as `AuditSink` -- hold two clones of the same
/// logical store instead of fighting the borrow checker over one value.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    rt: Handle,
    /// `PostingSession`/`AuditSink` writes route through this instead of
    /// `pool` when set, so a `PgStore` handed to `JournalPromoter` during
    /// import promotion lands its journal entry and audit event on the same
    /// connection (and inside the same per-record `SAVEPOINT`) as the
    /// `ImportStore` driving the batch. `None` outside a promotion batch.
    conn: Option<PgConn>,
}

impl PgStore {
    pub fn new(pool: PgPool, rt: Handle) -> Self {
        Self { pool, rt, conn: None }
    }

    /// A `PgStore` whose `PostingSession`/`AuditSink` methods write through
    /// `conn` (a promotion batch's shared connection) rather than opening
    /// their own transaction against `pool`. Every other trait impl on this
    /// value still reads through `pool` -- `PeriodChecker` and
    /// `TraceDataSource` are read paths the batch's isolation doesn't need
    /// to cover.
    pub fn new_shared(pool: PgPool, rt: Handle, conn: PgConn) -> Self {
        Self { pool, rt, conn: Some(conn) }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        self.rt.block_on(fut)
    }

    fn conn(&self) -> PgConn {
        self.conn.clone().unwrap_or_else(|| PgConn::Pool(self.pool.clone()))
    }

    async fn load_lines(conn: &mut sqlx::PgConnection, entry_id: Uuid) -> sqlx::Result<Vec<JournalLine>> {
        let rows = sqlx::query("SELECT line_seq, role, account_code, side, amount, currency, is_rounding, dimensions FROM journal_lines WHERE journal_entry_id = $1 ORDER BY line_seq")
            .bind(entry_id)
            .fetch_all(conn)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| JournalLine {
                line_seq: row.get::<i32, _>("line_seq") as u32,
                role: row.get("role"),
                account_code: AccountCode::new(row.get::<String, _>("account_code")),
                side: side_from_str(row.get::<&str, _>("side")),
                amount: row.get::<Decimal, _>("amount"),
                currency: row.get("currency"),
                is_rounding: row.get("is_rounding"),
                dimensions: serde_json::from_value(row.get::<Value, _>("dimensions")).unwrap_or_default(),
            })
            .collect())
    }

    async fn load_entry(conn: &mut sqlx::PgConnection, entry_id: Uuid) -> sqlx::Result<Option<JournalEntry>> {
        let Some(row) = sqlx::query("SELECT id, seq, source_event_id, ledger_id, status, idempotency_key, effective_date, posted_at, reversal_of_id FROM journal_entries WHERE id = $1")
            .bind(entry_id)
            .fetch_optional(&mut *conn)
            .await?
        else {
            return Ok(None);
        };
        let lines = Self::load_lines(conn, entry_id).await?;
        Ok(Some(JournalEntry {
            id: row.get("id"),
            seq: row.get::<Option<i64>, _>("seq"),
            source_event_id: row.get("source_event_id"),
            ledger_id: row.get("ledger_id"),
            status: status_from_str(row.get::<&str, _>("status")),
            idempotency_key: row.get("idempotency_key"),
            effective_date: row.get("effective_date"),
            posted_at: row.get("posted_at"),
            reversal_of_id: row.get("reversal_of_id"),
            lines,
        }))
    }

    async fn load_entry_by_idempotency_key(conn: &mut sqlx::PgConnection, key: &str) -> sqlx::Result<Option<JournalEntry>> {
        let Some(row) = sqlx::query("SELECT id FROM journal_entries WHERE idempotency_key = $1").bind(key).fetch_optional(&mut *conn).await? else {
            return Ok(None);
        };
        Self::load_entry(conn, row.get("id")).await
    }

    /// Inserts the entry and its lines. No transaction of its own -- callers
    /// run this through [`PgConn::with_tx`], which opens one for `Pool` and
    /// runs it against the batch's existing transaction for `Shared`.
    async fn insert_entry_async(conn: &mut sqlx::PgConnection, entry: &JournalEntry) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO journal_entries (id, seq, source_event_id, ledger_id, status, idempotency_key, effective_date, posted_at, reversal_of_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(entry.id)
        .bind(entry.seq)
        .bind(entry.source_event_id)
        .bind(&entry.ledger_id)
        .bind(status_to_str(entry.status))
        .bind(&entry.idempotency_key)
        .bind(entry.effective_date)
        .bind(entry.posted_at)
        .bind(entry.reversal_of_id)
        .execute(&mut *conn)
        .await?;

        for line in &entry.lines {
            sqlx::query(
                "INSERT INTO journal_lines (journal_entry_id, line_seq, role, account_code, side, amount, currency, is_rounding, dimensions)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(entry.id)
            .bind(line.line_seq as i32)
            .bind(&line.role)
            .bind(line.account_code.0.clone())
            .bind(side_to_str(line.side))
            .bind(line.amount)
            .bind(&line.currency)
            .bind(line.is_rounding)
            .bind(serde_json::to_value(&line.dimensions).unwrap_or(Value::Null))
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// One row per ledger under an advisory xact lock, serializing concurrent
    /// callers the way a single global lock would but scoped per ledger. Also
    /// run through [`PgConn::with_tx`] -- the lock only holds for the life of
    /// a transaction, so on `Shared` it holds for the rest of the batch's
    /// outer transaction rather than just this call, which is the same
    /// "promotion is single-threaded" assumption [`PgConn`] already leans on.
    async fn next_seq_async(conn: &mut sqlx::PgConnection, ledger_id: &str) -> sqlx::Result<i64> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))").bind(ledger_id).execute(&mut *conn).await?;
        let row = sqlx::query("SELECT COALESCE(MAX(seq), 0) + 1 AS next_seq FROM journal_entries WHERE ledger_id = $1").bind(ledger_id).fetch_one(&mut *conn).await?;
        let next_seq: i64 = row.get("next_seq");
        Ok(next_seq)
    }

    async fn mark_posted_async(conn: &mut sqlx::PgConnection, entry_id: Uuid, seq: i64, posted_at: DateTime<Utc>) -> sqlx::Result<()> {
        sqlx::query("UPDATE journal_entries SET seq = $1, status = 'posted', posted_at = $2 WHERE id = $3").bind(seq).bind(posted_at).bind(entry_id).execute(conn).await?;
        Ok(())
    }
}

impl PostingSession for PgStore {
    fn find_by_idempotency_key(&mut self, key: &str) -> Result<Option<JournalEntry>> {
        let conn = self.conn();
        let key = key.to_string();
        self.block_on(conn.with(|c| async move { Self::load_entry_by_idempotency_key(c, &key).await })).map_err(|e| DbError::Query(e).into())
    }

    fn insert_draft(&mut self, entry: &JournalEntry) -> Result<()> {
        let conn = self.conn();
        let entry = entry.clone();
        self.block_on(conn.with_tx(|c| async move { Self::insert_entry_async(c, &entry).await })).map_err(|e| DbError::Query(e).into())
    }

    fn next_seq(&mut self, ledger_id: &str) -> Result<i64> {
        let conn = self.conn();
        let ledger_id = ledger_id.to_string();
        self.block_on(conn.with_tx(|c| async move { Self::next_seq_async(c, &ledger_id).await })).map_err(|e| DbError::Query(e).into())
    }

    fn mark_posted(&mut self, entry_id: Uuid, seq: i64, posted_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn();
        self.block_on(conn.with(|c| async move { Self::mark_posted_async(c, entry_id, seq, posted_at).await })).map_err(|e| DbError::Query(e).into())
    }
}

impl AuditSink for PgStore {
    fn append(&mut self, draft: AuditDraft) -> Result<AuditEvent> {
        let conn = self.conn();
        self.block_on(conn.with_tx(|c| async move {
            sqlx::query("LOCK TABLE audit_events IN EXCLUSIVE MODE").execute(&mut *c).await?;
            let row = sqlx::query("SELECT hash FROM audit_events ORDER BY seq DESC LIMIT 1").fetch_optional(&mut *c).await?;
            let prev_hash: Option<String> = row.map(|r| r.get("hash"));
            let next_seq_row = sqlx::query("SELECT COALESCE(MAX(seq), 0) + 1 AS next_seq FROM audit_events").fetch_one(&mut *c).await?;
            let seq: i64 = next_seq_row.get("next_seq");

            let event = draft.seal(seq, prev_hash);

            sqlx::query(
                "INSERT INTO audit_events (seq, action, entity_type, entity_id, actor_id, occurred_at, payload, payload_hash, hash, prev_hash)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(event.seq)
            .bind(event.action.as_str())
            .bind(&event.entity_type)
            .bind(&event.entity_id)
            .bind(&event.actor_id)
            .bind(event.occurred_at)
            .bind(&event.payload)
            .bind(&event.payload_hash)
            .bind(&event.hash)
            .bind(&event.prev_hash)
            .execute(&mut *c)
            .await?;

            Ok(event)
        }))
        .map_err(|e: sqlx::Error| KernelError::from(DbError::Query(e)))
    }
}

impl PeriodChecker for PgStore {
    fn is_open(&self, effective_date: NaiveDate) -> bool {
        let pool = self.pool.clone();
        self.rt
            .block_on(async move {
                sqlx::query("SELECT is_open FROM fiscal_periods WHERE period_start <= $1 AND period_end >= $1")
                    .bind(effective_date)
                    .fetch_optional(&pool)
                    .await
            })
            .ok()
            .flatten()
            .map(|row| row.get::<bool, _>("is_open"))
            .unwrap_or(false)
    }
}

fn action_from_str(s: &str) -> AuditAction {
    match s {
        "EVENT_INGESTED" => AuditAction::EventIngested,
        "JOURNAL_POSTED" => AuditAction::JournalPosted,
        "OUTCOME_RECORDED" => AuditAction::OutcomeRecorded,
        "IMPORT_RECORD_PROMOTED" => AuditAction::ImportRecordPromoted,
        "IMPORT_BATCH_COMPLETED" => AuditAction::ImportBatchCompleted,
        other => AuditAction::Custom(other.to_string()),
    }
}

fn audit_event_from_row(row: sqlx::postgres::PgRow) -> AuditEvent {
    AuditEvent {
        seq: row.get("seq"),
        action: action_from_str(row.get::<&str, _>("action")),
        entity_type: row.get("entity_type"),
        entity_id: row.get("entity_id"),
        actor_id: row.get("actor_id"),
        occurred_at: row.get("occurred_at"),
        payload: row.get("payload"),
        payload_hash: row.get("payload_hash"),
        hash: row.get("hash"),
        prev_hash: row.get("prev_hash"),
    }
}

impl TraceDataSource for PgStore {
    fn find_event(&self, source_event_id: Uuid) -> Result<Option<Event>> {
        let pool = self.pool.clone();
        self.rt
            .block_on(async move {
                sqlx::query("SELECT event_id, event_type, schema_version, occurred_at, effective_date, actor_id, producer, payload, ingested_at FROM events WHERE event_id = $1")
                    .bind(source_event_id)
                    .fetch_optional(&pool)
                    .await
            })
            .map_err(|e| KernelError::from(DbError::Query(e)))
            .map(|maybe_row| {
                maybe_row.map(|row| Event {
                    event_id: EventId::from_uuid(row.get("event_id")),
                    event_type: row.get("event_type"),
                    schema_version: row.get::<i32, _>("schema_version") as u32,
                    occurred_at: row.get("occurred_at"),
                    effective_date: row.get("effective_date"),
                    actor_id: row.get("actor_id"),
                    producer: row.get("producer"),
                    payload: row.get("payload"),
                    ingested_at: row.get("ingested_at"),
                })
            })
    }

    fn find_outcome(&self, source_event_id: Uuid) -> Result<Option<acctkernel_coordinator::InterpretationOutcome>> {
        use acctkernel_coordinator::outcome::{DecisionLogEntry, FailureType, InterpretationOutcome, OutcomeStatus};

        fn status_from_db(s: &str) -> OutcomeStatus {
            match s {
                "POSTED" => OutcomeStatus::Posted,
                "BLOCKED" => OutcomeStatus::Blocked,
                "REJECTED" => OutcomeStatus::Rejected,
                "PROVISIONAL" => OutcomeStatus::Provisional,
                "NON_POSTING" => OutcomeStatus::NonPosting,
                "RETRYING" => OutcomeStatus::Retrying,
                "ABANDONED" => OutcomeStatus::Abandoned,
                _ => OutcomeStatus::Failed,
            }
        }

        fn failure_type_from_db(s: &str) -> FailureType {
            match s {
                "Engine" => FailureType::Engine,
                "Reconciliation" => FailureType::Reconciliation,
                "Snapshot" => FailureType::Snapshot,
                "Authority" => FailureType::Authority,
                "Contract" => FailureType::Contract,
                "System" => FailureType::System,
                _ => FailureType::Guard,
            }
        }

        let pool = self.pool.clone();
        let row = self
            .rt
            .block_on(async move {
                sqlx::query(
                    "SELECT status, reason_code, reason_detail, decision_log, journal_entry_ids, failure_type, payload_fingerprint, retry_count
                     FROM interpretation_outcomes WHERE source_event_id = $1",
                )
                .bind(source_event_id)
                .fetch_optional(&pool)
                .await
            })
            .map_err(|e| KernelError::from(DbError::Query(e)))?;

        let Some(row) = row else { return Ok(None) };
        let decision_log: Vec<DecisionLogEntry> = serde_json::from_value(row.get::<Value, _>("decision_log")).unwrap_or_default();
        Ok(Some(InterpretationOutcome {
            source_event_id,
            status: status_from_db(row.get::<&str, _>("status")),
            reason_code: row.get("reason_code"),
            reason_detail: row.get("reason_detail"),
            decision_log,
            journal_entry_ids: row.get("journal_entry_ids"),
            failure_type: row.get::<Option<&str>, _>("failure_type").map(failure_type_from_db),
            payload_fingerprint: row.get("payload_fingerprint"),
            retry_count: row.get::<i32, _>("retry_count") as u32,
        }))
    }

    fn find_journal_entries(&self, source_event_id: Uuid) -> Result<Vec<JournalEntry>> {
        let pool = self.pool.clone();
        let ids: Vec<Uuid> = self
            .rt
            .block_on(async move {
                let rows = sqlx::query("SELECT id FROM journal_entries WHERE source_event_id = $1").bind(source_event_id).fetch_all(&pool).await?;
                sqlx::Result::Ok(rows.into_iter().map(|r| r.get("id")).collect())
            })
            .map_err(|e| KernelError::from(DbError::Query(e)))?;

        let pool = self.pool.clone();
        self.rt
            .block_on(async move {
                let mut conn = pool.acquire().await?;
                let mut out = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(entry) = Self::load_entry(&mut conn, id).await? {
                        out.push(entry);
                    }
                }
                sqlx::Result::Ok(out)
            })
            .map_err(|e| KernelError::from(DbError::Query(e)))
    }

    fn find_related_audit_events(&self, source_event_id: Uuid, journal_entry_ids: &[Uuid]) -> Result<Vec<AuditEvent>> {
        let mut entity_ids = vec![source_event_id.to_string()];
        entity_ids.extend(journal_entry_ids.iter().map(Uuid::to_string));
        let pool = self.pool.clone();
        self.rt
            .block_on(async move {
                let rows = sqlx::query("SELECT * FROM audit_events WHERE entity_id = ANY($1) ORDER BY seq").bind(&entity_ids).fetch_all(&pool).await?;
                sqlx::Result::Ok(rows.into_iter().map(audit_event_from_row).collect())
            })
            .map_err(|e| KernelError::from(DbError::Query(e)))
    }

    fn audit_chain_segment(&self, from_seq: i64, to_seq: i64) -> Result<Vec<AuditEvent>> {
        let pool = self.pool.clone();
        self.rt
            .block_on(async move {
                let rows = sqlx::query("SELECT * FROM audit_events WHERE seq BETWEEN $1 AND $2 ORDER BY seq").bind(from_seq).bind(to_seq).fetch_all(&pool).await?;
                sqlx::Result::Ok(rows.into_iter().map(audit_event_from_row).collect())
            })
            .map_err(|e| KernelError::from(DbError::Query(e)))
    }
}

fn failure_type_to_str(ft: acctkernel_coordinator::outcome::FailureType) -> &'static str {
    use acctkernel_coordinator::outcome::FailureType;
    match ft {
        FailureType::Guard => "GUARD",
        FailureType::Engine => "ENGINE",
        FailureType::Reconciliation => "RECONCILIATION",
        FailureType::Snapshot => "SNAPSHOT",
        FailureType::Authority => "AUTHORITY",
        FailureType::Contract => "CONTRACT",
        FailureType::System => "SYSTEM",
    }
}

fn failure_type_from_db(s: &str) -> acctkernel_coordinator::outcome::FailureType {
    use acctkernel_coordinator::outcome::FailureType;
    match s {
        "ENGINE" => FailureType::Engine,
        "RECONCILIATION" => FailureType::Reconciliation,
        "SNAPSHOT" => FailureType::Snapshot,
        "AUTHORITY" => FailureType::Authority,
        "CONTRACT" => FailureType::Contract,
        "SYSTEM" => FailureType::System,
        _ => FailureType::Guard,
    }
}

impl PgStore {
    /// Persists a raw event ahead of interpretation. Not part of any
    /// kernel trait -- the coordinator only ever reads events back through
    /// [`TraceDataSource`], never writes them, so callers (the CLI,
    /// ingest promotion) insert directly through this.
    pub fn save_event(&self, event: &Event) -> crate::error::DbResult<()> {
        let pool = self.pool.clone();
        let event = event.clone();
        self.block_on(async move {
            sqlx::query(
                "INSERT INTO events (event_id, event_type, schema_version, occurred_at, effective_date, actor_id, producer, payload, payload_hash, ingested_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                 ON CONFLICT (event_id) DO NOTHING",
            )
            .bind(event.event_id.as_uuid())
            .bind(&event.event_type)
            .bind(event.schema_version as i32)
            .bind(event.occurred_at)
            .bind(event.effective_date)
            .bind(&event.actor_id)
            .bind(&event.producer)
            .bind(&event.payload)
            .bind(event.payload_hash())
            .bind(event.ingested_at)
            .execute(&pool)
            .await
        })
        .map_err(DbError::Query)?;
        Ok(())
    }

    /// Upserts the terminal record `InterpretationCoordinator::interpret`
    /// returned. Like [`Self::save_event`], this has no trait -- the
    /// coordinator never persists its own return value.
    pub fn save_outcome(&self, outcome: &acctkernel_coordinator::InterpretationOutcome) -> crate::error::DbResult<()> {
        let pool = self.pool.clone();
        let status = outcome.status.as_str();
        let decision_log = serde_json::to_value(&outcome.decision_log).unwrap_or(Value::Array(vec![]));
        let failure_type = outcome.failure_type.map(failure_type_to_str);
        let journal_entry_ids = outcome.journal_entry_ids.clone();
        let source_event_id = outcome.source_event_id;
        let reason_code = outcome.reason_code.clone();
        let reason_detail = outcome.reason_detail.clone();
        let payload_fingerprint = outcome.payload_fingerprint.clone();
        let retry_count = outcome.retry_count as i32;
        self.block_on(async move {
            sqlx::query(
                "INSERT INTO interpretation_outcomes (source_event_id, status, reason_code, reason_detail, decision_log, journal_entry_ids, failure_type, payload_fingerprint, retry_count, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
                 ON CONFLICT (source_event_id) DO UPDATE SET
                     status = EXCLUDED.status,
                     reason_code = EXCLUDED.reason_code,
                     reason_detail = EXCLUDED.reason_detail,
                     decision_log = EXCLUDED.decision_log,
                     journal_entry_ids = EXCLUDED.journal_entry_ids,
                     failure_type = EXCLUDED.failure_type,
                     retry_count = EXCLUDED.retry_count,
                     updated_at = now()",
            )
            .bind(source_event_id)
            .bind(status)
            .bind(&reason_code)
            .bind(&reason_detail)
            .bind(&decision_log)
            .bind(&journal_entry_ids)
            .bind(failure_type)
            .bind(&payload_fingerprint)
            .bind(retry_count)
            .execute(&pool)
            .await
        })
        .map_err(DbError::Query)?;
        Ok(())
    }

    /// Resolves a journal_entry_id back to its `source_event_id`, for
    /// `TraceSelector::trace_by_entry`'s `lookup_event` callback.
    pub fn event_id_for_journal_entry(&self, entry_id: Uuid) -> crate::error::DbResult<Option<Uuid>> {
        let pool = self.pool.clone();
        self.block_on(async move { sqlx::query("SELECT source_event_id FROM journal_entries WHERE id = $1").bind(entry_id).fetch_optional(&pool).await })
            .map_err(DbError::Query)
            .map(|row| row.map(|r| r.get::<Uuid, _>("source_event_id")))
    }

    /// Lists journal entries ordered by ledger seq, newest last. Backs the
    /// CLI's `trace --list`, which has no other way to enumerate what it
    /// could trace.
    pub fn list_journal_entries(&self, limit: i64) -> crate::error::DbResult<Vec<JournalEntry>> {
        let pool = self.pool.clone();
        let ids: Vec<Uuid> = self
            .block_on(async move {
                let rows = sqlx::query("SELECT id FROM journal_entries ORDER BY seq NULLS LAST LIMIT $1").bind(limit).fetch_all(&pool).await?;
                sqlx::Result::Ok(rows.into_iter().map(|r| r.get("id")).collect())
            })
            .map_err(DbError::Query)?;

        let pool = self.pool.clone();
        self.block_on(async move {
            let mut conn = pool.acquire().await?;
            let mut out = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(entry) = Self::load_entry(&mut conn, id).await? {
                    out.push(entry);
                }
            }
            sqlx::Result::Ok(out)
        })
        .map_err(DbError::Query)
    }

    /// Maps account_code -> name for every registered account. Used to
    /// label journal lines in the CLI's trace rendering; not needed by any
    /// kernel pipeline, which only ever carries the code.
    pub fn account_names(&self) -> crate::error::DbResult<HashMap<String, String>> {
        let pool = self.pool.clone();
        let rows = self.block_on(async move { sqlx::query("SELECT code, name FROM accounts").fetch_all(&pool).await }).map_err(DbError::Query)?;
        Ok(rows.into_iter().map(|r| (r.get("code"), r.get("name"))).collect())
    }

    /// Loads every row of `role_bindings` into a [`RoleResolver`], for
    /// CLI paths that need account-code resolution outside a config-pack
    /// load (import promotion has no sealed pack to read bindings from).
    pub fn load_role_bindings(&self) -> crate::error::DbResult<acctkernel_ledger::RoleResolver> {
        use acctkernel_ledger::{RoleBinding, RoleResolver};

        let pool = self.pool.clone();
        let rows = self
            .block_on(async move {
                sqlx::query("SELECT ledger_id, role, account_code, effective_from, effective_to, config_version FROM role_bindings").fetch_all(&pool).await
            })
            .map_err(DbError::Query)?;

        let mut resolver = RoleResolver::new();
        for row in rows {
            resolver = resolver.bind(RoleBinding {
                ledger_id: row.get("ledger_id"),
                role: row.get("role"),
                account_code: AccountCode::new(row.get::<String, _>("account_code")),
                effective_from: row.get("effective_from"),
                effective_to: row.get("effective_to"),
                config_version: row.get("config_version"),
            });
        }
        Ok(resolver)
    }
}
