//! The reference snapshot: the versioned fingerprint of all reference data
//! consulted while deciding an event's meaning (§3 "reference snapshot").
//! Frozen at decision time and carried forward into the economic event,
//! intent, and outcome so a later replay can detect configuration drift.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSnapshot {
    pub config_version: String,
    pub coa_version: String,
    pub dimension_schema_version: String,
    pub currency_registry_version: String,
    pub fx_policy_version: String,
}

impl ReferenceSnapshot {
    pub fn new(
        config_version: impl Into<String>,
        coa_version: impl Into<String>,
        dimension_schema_version: impl Into<String>,
        currency_registry_version: impl Into<String>,
        fx_policy_version: impl Into<String>,
    ) -> Self {
        Self {
            config_version: config_version.into(),
            coa_version: coa_version.into(),
            dimension_schema_version: dimension_schema_version.into(),
            currency_registry_version: currency_registry_version.into(),
            fx_policy_version: fx_policy_version.into(),
        }
    }
}
