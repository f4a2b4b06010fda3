//! Identity types for the interpretation kernel.
//!
//! All identifiers are strongly typed wrappers around UUIDs to prevent
//! accidental mixing of different entity kinds (an `EventId` can never be
//! passed where a `JournalEntryId` is expected).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Macro to generate ID types with common implementations
macro_rules! define_id_type {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from a string (with or without prefix)
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                let s = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the inner UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Convert to prefixed string
            pub fn to_prefixed_string(&self) -> String {
                format!("{}_{}", $prefix, self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }
    };
}

define_id_type!(EventId, "evt", "Identifier of a raw event submitted for interpretation.");
define_id_type!(PolicyId, "pol", "Identifier of a compiled accounting policy.");
define_id_type!(JournalEntryId, "je", "Identifier of a posted or draft journal entry.");
define_id_type!(InterpretationId, "interp", "Identifier of one interpretation run / outcome record.");
define_id_type!(LedgerId, "ldg", "Identifier of a ledger: a distinct set of accounts and balancing rules.");
define_id_type!(ImportBatchId, "batch", "Identifier of a staged import batch.");
define_id_type!(ImportRecordId, "rec", "Identifier of a single staged import record within a batch.");
define_id_type!(AuditSeqId, "audit", "Identifier of one row in the hash-chained audit log.");
define_id_type!(AccountId, "acct", "Identifier of a chart-of-accounts entry.");
