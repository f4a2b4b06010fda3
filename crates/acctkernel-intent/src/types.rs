//! `AccountingIntent` — the desired journal effect in role terms, before
//! account codes are resolved (§3, §4.6).

use acctkernel_types::Side;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentLine {
    pub role: String,
    pub side: Side,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerIntent {
    pub ledger_id: String,
    pub lines: Vec<IntentLine>,
}

impl LedgerIntent {
    pub fn new(ledger_id: impl Into<String>) -> Self {
        Self { ledger_id: ledger_id.into(), lines: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountingIntent {
    pub econ_event_id: uuid::Uuid,
    pub source_event_id: uuid::Uuid,
    pub profile_id: String,
    pub profile_version: u32,
    pub effective_date: NaiveDate,
    pub ledger_intents: Vec<LedgerIntent>,
}

impl AccountingIntent {
    /// Every `LedgerIntent` must carry at least one line — this is an
    /// outcome-level invariant (§4.6 "outcome"), checked explicitly rather
    /// than by construction since the builder assembles lines
    /// incrementally.
    pub fn well_formed(&self) -> bool {
        !self.ledger_intents.is_empty() && self.ledger_intents.iter().all(|li| !li.lines.is_empty())
    }
}
