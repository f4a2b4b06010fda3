//! Installs and removes the storage-layer immutability triggers (R10 layer
//! 2/2, §6 "Database"): the Postgres-side twin of the invariants
//! `acctkernel-ledger` and `acctkernel-audit` already enforce in Rust.
//!
//! Mirrors the ordered-file-load shape of a typical SQLAlchemy trigger
//! installer: numbered files execute in order so a later trigger can
//! reference an earlier one's table, and `99_drop_all.sql` tears every one
//! of them back down for test isolation.

use sqlx::PgPool;
use tracing::info;

use crate::error::{DbError, DbResult};

const TRIGGER_FILES: &[(&str, &str)] = &[
    ("01_journal_entry.sql", include_str!("../sql/triggers/01_journal_entry.sql")),
    ("02_journal_line.sql", include_str!("../sql/triggers/02_journal_line.sql")),
    ("03_audit_event.sql", include_str!("../sql/triggers/03_audit_event.sql")),
    ("04_account.sql", include_str!("../sql/triggers/04_account.sql")),
    ("05_fiscal_period.sql", include_str!("../sql/triggers/05_fiscal_period.sql")),
    ("06_rounding.sql", include_str!("../sql/triggers/06_rounding.sql")),
    ("07_dimension.sql", include_str!("../sql/triggers/07_dimension.sql")),
    ("08_exchange_rate.sql", include_str!("../sql/triggers/08_exchange_rate.sql")),
    ("09_event_immutability.sql", include_str!("../sql/triggers/09_event_immutability.sql")),
    ("10_balance_enforcement.sql", include_str!("../sql/triggers/10_balance_enforcement.sql")),
];

const DROP_ALL_SQL: &str = include_str!("../sql/triggers/99_drop_all.sql");

pub struct TriggerInstaller;

impl TriggerInstaller {
    /// Runs `migrations/` then installs every numbered trigger file in
    /// order. Safe to call repeatedly: every `CREATE OR REPLACE FUNCTION`
    /// and `DROP TRIGGER IF EXISTS .. CREATE TRIGGER` pair is idempotent.
    pub async fn create_tables(pool: &PgPool) -> DbResult<()> {
        sqlx::migrate!("./migrations").run(pool).await.map_err(|e| DbError::Migration(e.to_string()))?;
        Self::install_immutability_triggers(pool).await
    }

    pub async fn install_immutability_triggers(pool: &PgPool) -> DbResult<()> {
        for (name, sql) in TRIGGER_FILES {
            sqlx::raw_sql(sql).execute(pool).await.map_err(|e| DbError::Migration(format!("{name}: {e}")))?;
            info!(file = name, "trigger_file_installed");
        }
        Ok(())
    }

    /// Drops every trigger this installer created, leaving tables and
    /// functions intact. Used by test fixtures that want to exercise a raw
    /// insert/update without the trigger layer in the way.
    pub async fn uninstall_immutability_triggers(pool: &PgPool) -> DbResult<()> {
        sqlx::raw_sql(DROP_ALL_SQL).execute(pool).await.map_err(|e| DbError::Migration(e.to_string()))?;
        Ok(())
    }
}
