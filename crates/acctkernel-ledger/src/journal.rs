//! Journal entry/line domain types — the durable, immutable output of
//! posting (§3).

use acctkernel_types::{AccountCode, Side};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalEntryStatus {
    Draft,
    Posted,
    Reversed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    pub line_seq: u32,
    pub role: String,
    pub account_code: AccountCode,
    pub side: Side,
    pub amount: Decimal,
    pub currency: String,
    pub is_rounding: bool,
    pub dimensions: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    pub seq: Option<i64>,
    pub source_event_id: Uuid,
    pub ledger_id: String,
    pub status: JournalEntryStatus,
    pub idempotency_key: String,
    pub effective_date: NaiveDate,
    pub posted_at: Option<DateTime<Utc>>,
    pub reversal_of_id: Option<Uuid>,
    pub lines: Vec<JournalLine>,
}

impl JournalEntry {
    pub fn idempotency_key(event_id: Uuid, ledger_id: &str, version: u32) -> String {
        format!("{event_id}:{ledger_id}:{version}")
    }

    /// Σ debit − Σ credit per currency, zero means balanced. Multiple
    /// currencies on one entry are checked independently.
    pub fn imbalance_by_currency(&self) -> HashMap<String, Decimal> {
        let mut totals: HashMap<String, Decimal> = HashMap::new();
        for line in &self.lines {
            let entry = totals.entry(line.currency.clone()).or_insert(Decimal::ZERO);
            *entry += Decimal::from(line.side.sign()) * line.amount;
        }
        totals
    }
}
