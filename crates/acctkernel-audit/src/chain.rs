//! Chain verification and the append sink abstraction (§4.10).

use acctkernel_types::{KernelError, Result};

use crate::event::{AuditDraft, AuditEvent};

/// The impure shell: assigns `seq` under the global row lock described in
/// §5 ("Audit seq: monotonic, gap-free globally") and persists the sealed
/// event. Implemented against Postgres in the database crate.
pub trait AuditSink {
    fn append(&mut self, draft: AuditDraft) -> Result<AuditEvent>;
}

/// Walks `events` ordered by `seq` and recomputes every link, matching the
/// hash-chain invariant (R11): `hash(n) = sha256(seq(n)||action(n)||entity_id(n)||payload_hash(n)||prev_hash(n))`
/// and `prev_hash(n+1) = hash(n)`.
pub fn verify_chain(events: &[AuditEvent]) -> Result<()> {
    let mut prev: Option<&AuditEvent> = None;
    for event in events {
        if !event.verify_self() {
            return Err(KernelError::HashChainBroken {
                seq: event.seq,
                expected: prev.map(|p| p.hash.clone()).unwrap_or_default(),
                found: event.hash.clone(),
            });
        }
        let expected_prev_hash = prev.map(|p| p.hash.clone());
        if event.prev_hash != expected_prev_hash {
            return Err(KernelError::HashChainBroken {
                seq: event.seq,
                expected: expected_prev_hash.unwrap_or_default(),
                found: event.prev_hash.clone().unwrap_or_default(),
            });
        }
        prev = Some(event);
    }
    Ok(())
}
