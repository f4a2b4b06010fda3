//! Accounting intent: the desired journal effect in role terms, before
//! account codes are resolved (§4.6).

pub mod builder;
pub mod types;

pub use builder::{ImportedLine, IntentBuildError, IntentBuilder};
pub use types::{AccountingIntent, IntentLine, LedgerIntent};
