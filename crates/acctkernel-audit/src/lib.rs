//! Hash-chained, append-only audit log (§4.10).
//!
//! Every consequential action produces an [`event::AuditDraft`] that
//! whatever holds the sequence lock seals into an [`event::AuditEvent`].
//! [`chain::verify_chain`] recomputes the whole chain for integrity checks
//! (used by the trace selector and by tests).

pub mod chain;
pub mod event;

pub use chain::{verify_chain, AuditSink};
pub use event::{compute_hash, hash_payload, AuditAction, AuditDraft, AuditEvent};
