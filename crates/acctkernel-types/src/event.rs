//! The immutable ingress event (§3 "Event"): created by ingestion, never
//! mutated or deleted thereafter.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::identity::EventId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Caller-supplied, used for idempotency; never regenerated on replay.
    pub event_id: EventId,
    /// Namespaced dotted string, e.g. `"ap.invoice_received"`.
    pub event_type: String,
    pub schema_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub effective_date: NaiveDate,
    pub actor_id: String,
    pub producer: String,
    pub payload: serde_json::Value,
    pub ingested_at: DateTime<Utc>,
}

impl Event {
    /// Sha-256 of the payload's canonical (sorted-key, whitespace-free)
    /// serialization, matching the audit log's `payload_hash` convention.
    pub fn payload_hash(&self) -> String {
        let canonical = serde_json::to_vec(&self.payload).expect("Value serialization never fails");
        hex::encode(Sha256::digest(canonical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Event {
        Event {
            event_id: EventId::new(),
            event_type: "ap.invoice_received".into(),
            schema_version: 1,
            occurred_at: Utc::now(),
            effective_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            actor_id: "actor-1".into(),
            producer: "erp".into(),
            payload: json!({"amount": "1234.56"}),
            ingested_at: Utc::now(),
        }
    }

    #[test]
    fn payload_hash_is_stable_for_identical_payload() {
        let a = sample();
        let mut b = sample();
        b.event_id = a.event_id;
        b.occurred_at = a.occurred_at;
        b.ingested_at = a.ingested_at;
        assert_eq!(a.payload_hash(), b.payload_hash());
    }

    #[test]
    fn payload_hash_changes_with_payload() {
        let mut a = sample();
        let b = sample();
        a.payload = json!({"amount": "1.00"});
        assert_ne!(a.payload_hash(), b.payload_hash());
    }
}
