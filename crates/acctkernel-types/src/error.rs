//! Kernel-wide error taxonomy.
//!
//! Every stage of the interpretation pipeline fails with a typed
//! [`KernelError`] rather than a bare string; `error_code()` gives the stable
//! SCREAMING_SNAKE_CASE code callers can match on, `is_retriable()` tells
//! the coordinator whether a FAILED outcome may transition to RETRYING.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KernelError>;

#[derive(Debug, Clone, Error)]
pub enum KernelError {
    #[error("no schema registered for event type {event_type}")]
    UnsupportedSchema { event_type: String },

    #[error("event payload failed schema validation: {reason}")]
    SchemaValidation { reason: String },

    #[error("policy {a} and {b} have overlapping scope/priority with no explicit precedence")]
    ProfileOverlap { a: String, b: String },

    #[error("no accounting policy matched event type {event_type} in scope {scope}")]
    NoPolicyMatched { event_type: String, scope: String },

    #[error("guard '{guard}' rejected the event: {reason}")]
    GuardRejected { guard: String, reason: String },

    #[error("guard '{guard}' blocked the event pending review: {reason}")]
    GuardBlocked { guard: String, reason: String },

    #[error("valuation model {model} version {version} is not registered")]
    UnknownValuationModel { model: String, version: u32 },

    #[error("valuation model {model} could not price the event: {reason}")]
    ValuationFailed { model: String, reason: String },

    #[error("role '{role}' could not be resolved to an account in ledger {ledger_id}")]
    UnresolvableRole { role: String, ledger_id: String },

    #[error("journal entry does not balance: debits {debits}, credits {credits}, ledger {ledger_id}")]
    Unbalanced {
        ledger_id: String,
        debits: String,
        credits: String,
    },

    #[error("idempotency key {key} already bound to journal entry {existing_entry_id}")]
    DuplicateIdempotencyKey { key: String, existing_entry_id: String },

    #[error("rounding difference {difference} exceeds tolerance {tolerance} for ledger {ledger_id}")]
    RoundingAboveThreshold {
        ledger_id: String,
        difference: String,
        tolerance: String,
    },

    #[error("hash chain broken at seq {seq}: expected prev_hash {expected}, found {found}")]
    HashChainBroken { seq: i64, expected: String, found: String },

    #[error("illegal outcome transition from {from} to {to}")]
    IllegalOutcomeTransition { from: String, to: String },

    #[error("mapping error on column '{column}': {reason}")]
    MappingError { column: String, reason: String },

    #[error("import record {record_id} failed validation: {reason}")]
    ValidationFailed { record_id: String, reason: String },

    #[error("promotion of record {record_id} failed: {reason}")]
    PromotionFailed { record_id: String, reason: String },

    #[error("configuration checksum mismatch: expected {expected}, computed {computed}")]
    ConfigDrift { expected: String, computed: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl KernelError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnsupportedSchema { .. } => "UNSUPPORTED_SCHEMA",
            Self::SchemaValidation { .. } => "SCHEMA_VALIDATION_FAILED",
            Self::ProfileOverlap { .. } => "PROFILE_OVERLAP",
            Self::NoPolicyMatched { .. } => "NO_POLICY_MATCHED",
            Self::GuardRejected { .. } => "GUARD_REJECTED",
            Self::GuardBlocked { .. } => "GUARD_BLOCKED",
            Self::UnknownValuationModel { .. } => "UNKNOWN_VALUATION_MODEL",
            Self::ValuationFailed { .. } => "VALUATION_FAILED",
            Self::UnresolvableRole { .. } => "UNRESOLVABLE_ROLE",
            Self::Unbalanced { .. } => "JOURNAL_UNBALANCED",
            Self::DuplicateIdempotencyKey { .. } => "DUPLICATE_IDEMPOTENCY_KEY",
            Self::RoundingAboveThreshold { .. } => "ROUNDING_ABOVE_THRESHOLD",
            Self::HashChainBroken { .. } => "HASH_CHAIN_BROKEN",
            Self::IllegalOutcomeTransition { .. } => "ILLEGAL_OUTCOME_TRANSITION",
            Self::MappingError { .. } => "MAPPING_ERROR",
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::PromotionFailed { .. } => "PROMOTION_FAILED",
            Self::ConfigDrift { .. } => "CONFIG_DRIFT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a FAILED outcome carrying this error may legally transition to
    /// RETRYING. System/database errors are transient; everything the guard,
    /// policy, or validation layers reject on purpose is not.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Internal(_))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
