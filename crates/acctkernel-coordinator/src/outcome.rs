//! `InterpretationOutcome` — the terminal per-event record, and its legal
//! state transitions (§3, §8 determinism/idempotency properties).

use acctkernel_types::{KernelError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Posted,
    Blocked,
    Rejected,
    Provisional,
    NonPosting,
    Failed,
    Retrying,
    Abandoned,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posted => "POSTED",
            Self::Blocked => "BLOCKED",
            Self::Rejected => "REJECTED",
            Self::Provisional => "PROVISIONAL",
            Self::NonPosting => "NON_POSTING",
            Self::Failed => "FAILED",
            Self::Retrying => "RETRYING",
            Self::Abandoned => "ABANDONED",
        }
    }

    /// Whether `to` is a legal next state from `self` (§3's transition table).
    /// Terminal states (POSTED, REJECTED, NON_POSTING, ABANDONED) admit no
    /// outgoing transitions.
    pub fn can_transition_to(&self, to: OutcomeStatus) -> bool {
        matches!(
            (self, to),
            (Self::Blocked, Self::Posted)
                | (Self::Blocked, Self::Rejected)
                | (Self::Blocked, Self::Failed)
                | (Self::Provisional, Self::Posted)
                | (Self::Provisional, Self::Rejected)
                | (Self::Failed, Self::Retrying)
                | (Self::Failed, Self::Abandoned)
                | (Self::Retrying, Self::Posted)
                | (Self::Retrying, Self::Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureType {
    Guard,
    Engine,
    Reconciliation,
    Snapshot,
    Authority,
    Contract,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionLogEntry {
    pub step: String,
    pub detail: String,
    pub at: DateTime<Utc>,
    pub context: serde_json::Value,
}

impl DecisionLogEntry {
    pub fn new(step: impl Into<String>, detail: impl Into<String>, at: DateTime<Utc>, context: serde_json::Value) -> Self {
        Self { step: step.into(), detail: detail.into(), at, context }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretationOutcome {
    pub source_event_id: Uuid,
    pub status: OutcomeStatus,
    pub reason_code: Option<String>,
    pub reason_detail: Option<String>,
    pub decision_log: Vec<DecisionLogEntry>,
    pub journal_entry_ids: Vec<Uuid>,
    pub failure_type: Option<FailureType>,
    /// Stable across retries — lets a FAILED->RETRYING->FAILED chain be
    /// recognized as the same underlying attempt.
    pub payload_fingerprint: String,
    pub retry_count: u32,
}

impl InterpretationOutcome {
    pub fn new(source_event_id: Uuid, payload_fingerprint: impl Into<String>) -> Self {
        Self {
            source_event_id,
            status: OutcomeStatus::Failed,
            reason_code: None,
            reason_detail: None,
            decision_log: Vec::new(),
            journal_entry_ids: Vec::new(),
            failure_type: None,
            payload_fingerprint: payload_fingerprint.into(),
            retry_count: 0,
        }
    }

    pub fn log(&mut self, entry: DecisionLogEntry) {
        self.decision_log.push(entry);
    }

    /// External resolution of a PROVISIONAL outcome (SPEC_FULL Open
    /// Question 2). No subsystem inside this crate produces PROVISIONAL or
    /// calls this — it exists for a caller outside the coordinator that
    /// observes the external signal the source material never specifies.
    pub fn resolve_provisional(&mut self, to: OutcomeStatus, reason_code: impl Into<String>, reason_detail: impl Into<String>) -> Result<()> {
        if self.status != OutcomeStatus::Provisional {
            return Err(KernelError::IllegalOutcomeTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        self.transition(to, Some(reason_code.into()), Some(reason_detail.into()))
    }

    /// Applies a transition, rejecting illegal ones per the §3 state
    /// machine. `new_in` is for the outcome's very first write (no prior
    /// status to validate against).
    pub fn transition(&mut self, to: OutcomeStatus, reason_code: Option<String>, reason_detail: Option<String>) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(KernelError::IllegalOutcomeTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        self.status = to;
        self.reason_code = reason_code;
        self.reason_detail = reason_detail;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posted_is_terminal() {
        assert!(!OutcomeStatus::Posted.can_transition_to(OutcomeStatus::Rejected));
        assert!(!OutcomeStatus::Posted.can_transition_to(OutcomeStatus::Retrying));
    }

    #[test]
    fn blocked_can_resolve_to_posted_rejected_or_failed() {
        assert!(OutcomeStatus::Blocked.can_transition_to(OutcomeStatus::Posted));
        assert!(OutcomeStatus::Blocked.can_transition_to(OutcomeStatus::Rejected));
        assert!(OutcomeStatus::Blocked.can_transition_to(OutcomeStatus::Failed));
        assert!(!OutcomeStatus::Blocked.can_transition_to(OutcomeStatus::Provisional));
    }

    #[test]
    fn failed_retrying_cycle_is_legal() {
        let mut outcome = InterpretationOutcome::new(Uuid::new_v4(), "fp1");
        outcome.status = OutcomeStatus::Failed;
        outcome.transition(OutcomeStatus::Retrying, None, None).unwrap();
        outcome.transition(OutcomeStatus::Failed, None, None).unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Failed);
    }

    #[test]
    fn resolve_provisional_rejects_when_not_provisional() {
        let mut outcome = InterpretationOutcome::new(Uuid::new_v4(), "fp1");
        outcome.status = OutcomeStatus::Blocked;
        assert!(outcome.resolve_provisional(OutcomeStatus::Posted, "x", "y").is_err());
    }

    #[test]
    fn resolve_provisional_posts_on_external_confirmation() {
        let mut outcome = InterpretationOutcome::new(Uuid::new_v4(), "fp1");
        outcome.status = OutcomeStatus::Provisional;
        outcome.resolve_provisional(OutcomeStatus::Posted, "CONFIRMED", "external confirmation received").unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Posted);
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut outcome = InterpretationOutcome::new(Uuid::new_v4(), "fp1");
        outcome.status = OutcomeStatus::Rejected;
        let err = outcome.transition(OutcomeStatus::Posted, None, None).unwrap_err();
        assert_eq!(err.error_code(), "ILLEGAL_OUTCOME_TRANSITION");
    }
}
