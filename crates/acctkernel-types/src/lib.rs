//! Canonical value types for the interpretation kernel — zero dependencies
//! on other `acctkernel-*` crates.
//!
//! - Identity newtypes (`EventId`, `PolicyId`, `JournalEntryId`, …)
//! - [`currency::Currency`] and [`money::Money`] (arbitrary-precision amounts)
//! - Chart-of-accounts value objects (`AccountCode`, `AccountRole`, `Side`)
//! - The shared [`error::KernelError`] taxonomy

pub mod account;
pub mod currency;
pub mod error;
pub mod event;
pub mod identity;
pub mod money;
pub mod snapshot;

pub use account::*;
pub use currency::*;
pub use error::*;
pub use event::*;
pub use identity::*;
pub use money::*;
pub use snapshot::*;
