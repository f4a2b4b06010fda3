//! Database error types

use acctkernel_types::KernelError;
use thiserror::Error;

/// Database operation errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transaction error: {0}")]
    Transaction(String),
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}

/// Every kernel trait this crate implements (`PostingSession`, `AuditSink`, …)
/// returns `acctkernel_types::Result`, not `DbResult` -- this is the seam
/// where a storage failure becomes the kernel's own `Database` variant, which
/// `KernelError::is_retriable()` always treats as transient.
impl From<DbError> for KernelError {
    fn from(e: DbError) -> Self {
        KernelError::Database(e.to_string())
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;
