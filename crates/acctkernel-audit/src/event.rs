//! `AuditEvent` — one hash-chained log record per consequential action
//! (§3, §4.10).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The fixed action vocabulary the interpretation coordinator and the
/// ingestion pipeline emit. `Custom` is an escape hatch for callers that
/// need a domain-specific action not yet promoted into this enum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    EventIngested,
    JournalPosted,
    OutcomeRecorded,
    ImportRecordPromoted,
    ImportBatchCompleted,
    Custom(String),
}

impl AuditAction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::EventIngested => "EVENT_INGESTED",
            Self::JournalPosted => "JOURNAL_POSTED",
            Self::OutcomeRecorded => "OUTCOME_RECORDED",
            Self::ImportRecordPromoted => "IMPORT_RECORD_PROMOTED",
            Self::ImportBatchCompleted => "IMPORT_BATCH_COMPLETED",
            Self::Custom(s) => s,
        }
    }
}

/// An audit event not yet assigned a `seq`/`prev_hash` — produced by
/// application code, sealed by whatever holds the row lock on the
/// sequence counter (§4.10, §5 "Audit seq").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditDraft {
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub actor_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl AuditDraft {
    pub fn new(
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        occurred_at: DateTime<Utc>,
        payload: serde_json::Value,
    ) -> Self {
        Self { action, entity_type: entity_type.into(), entity_id: entity_id.into(), actor_id: None, occurred_at, payload }
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// Assigns `seq`/`prev_hash` and computes `payload_hash`/`hash`,
    /// producing the immutable [`AuditEvent`] to be persisted.
    pub fn seal(self, seq: i64, prev_hash: Option<String>) -> AuditEvent {
        let payload_hash = hash_payload(&self.payload);
        let hash = compute_hash(seq, self.action.as_str(), &self.entity_id, &payload_hash, prev_hash.as_deref());
        AuditEvent {
            seq,
            action: self.action,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            actor_id: self.actor_id,
            occurred_at: self.occurred_at,
            payload: self.payload,
            payload_hash,
            hash,
            prev_hash,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub seq: i64,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub actor_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub payload_hash: String,
    pub hash: String,
    pub prev_hash: Option<String>,
}

impl AuditEvent {
    /// Recomputes this event's hash from its own fields and compares
    /// against the stored `hash`, catching both tampering and a
    /// stale/incorrectly-sealed row.
    pub fn verify_self(&self) -> bool {
        let expected_payload_hash = hash_payload(&self.payload);
        if expected_payload_hash != self.payload_hash {
            return false;
        }
        let expected_hash =
            compute_hash(self.seq, self.action.as_str(), &self.entity_id, &self.payload_hash, self.prev_hash.as_deref());
        expected_hash == self.hash
    }
}

/// Canonical sha-256 of `payload`. `serde_json::Value`'s default `Map` is a
/// `BTreeMap`, so `to_vec` already yields sorted-key, whitespace-free JSON.
pub fn hash_payload(payload: &serde_json::Value) -> String {
    let canonical = serde_json::to_vec(payload).expect("Value serialization never fails");
    hex::encode(Sha256::digest(canonical))
}

pub fn compute_hash(seq: i64, action: &str, entity_id: &str, payload_hash: &str, prev_hash: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seq.to_string().as_bytes());
    hasher.update(action.as_bytes());
    hasher.update(entity_id.as_bytes());
    hasher.update(payload_hash.as_bytes());
    hasher.update(prev_hash.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_event_has_no_prev_hash_and_verifies() {
        let draft = AuditDraft::new(AuditAction::EventIngested, "event", "evt_1", Utc::now(), json!({"a": 1}));
        let event = draft.seal(1, None);
        assert!(event.prev_hash.is_none());
        assert!(event.verify_self());
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let draft = AuditDraft::new(AuditAction::JournalPosted, "journal_entry", "je_1", Utc::now(), json!({"amount": "100"}));
        let mut event = draft.seal(2, Some("priorhash".into()));
        event.payload = json!({"amount": "999999"});
        assert!(!event.verify_self());
    }

    #[test]
    fn action_as_str_matches_spec_vocabulary() {
        assert_eq!(AuditAction::EventIngested.as_str(), "EVENT_INGESTED");
        assert_eq!(AuditAction::ImportBatchCompleted.as_str(), "IMPORT_BATCH_COMPLETED");
        assert_eq!(AuditAction::Custom("FOO".into()).as_str(), "FOO");
    }
}
