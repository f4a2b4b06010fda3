//! Ledger registry, role resolution, and journal writing (§4.7, §4.8).
//!
//! Pure core: [`registry::LedgerRegistry`] and [`role_resolver::RoleResolver`]
//! are plain data structures built once from the compiled config pack.
//! [`writer::JournalWriter`] assembles and balances entries in memory; seq
//! assignment and persistence are delegated through [`writer::PostingSession`]
//! to the database crate.

pub mod journal;
pub mod registry;
pub mod role_resolver;
pub mod writer;

pub use journal::{JournalEntry, JournalEntryStatus, JournalLine};
pub use registry::{LedgerRegistry, LedgerRequirementSet};
pub use role_resolver::{ResolvedRole, RoleBinding, RoleResolver};
pub use writer::{JournalWriter, PostedEntry, PostingSession};
