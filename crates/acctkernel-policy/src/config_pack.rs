//! `CompiledConfigPack` — the startup-time bundle produced by the (out of
//! kernel) configuration assembler: YAML packs in, one checksummed bundle
//! out (§6 "Configuration pack"). The kernel never assembles a pack; it
//! only verifies one and hands its contents to the registries that are
//! built once at process start (§5 "Registries as startup-time state").

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::types::AccountingPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigPackScope {
    pub legal_entity: String,
    pub jurisdiction: String,
    pub regulatory_regime: String,
    pub currency: String,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
}

/// One chart-of-accounts binding: role -> account_code for a ledger, dated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleBindingDef {
    pub ledger_id: String,
    pub role: String,
    pub account_code: String,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
}

/// The compiled bundle §6 describes: schemas, policies, chart-of-accounts
/// bindings, ledger requirements, valuation models and import mappings are
/// all named there, but only the pieces the kernel itself interprets
/// (policies, role bindings) are modeled as data here — the rest are
/// registered directly into their own registries by whatever process loads
/// the pack, the same way `acctkernel-schema::SchemaRegistry` and
/// `acctkernel-ledger::LedgerRegistry` are populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledConfigPack {
    pub config_id: String,
    pub config_version: u32,
    /// Recomputed on load and compared against this value; any mismatch is
    /// a fatal `ConfigPackError::ChecksumMismatch` (§6: "drift is fatal").
    pub checksum: String,
    pub canonical_fingerprint: String,
    pub scope: ConfigPackScope,
    pub policies: Vec<AccountingPolicy>,
    pub chart_of_accounts_bindings: Vec<RoleBindingDef>,
    pub import_mapping_names: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigPackError {
    #[error("config pack checksum mismatch: recorded {recorded}, recomputed {recomputed}")]
    ChecksumMismatch { recorded: String, recomputed: String },
}

impl CompiledConfigPack {
    /// Builds a pack and stamps `checksum`/`canonical_fingerprint` from its
    /// own content, so a freshly-assembled pack is always internally
    /// consistent. The assembler is a collaborator outside the kernel; this
    /// constructor exists so the kernel's own tests (and the CLI's
    /// `--dry-run` path) can build a pack without reimplementing the hash.
    pub fn sealed(
        config_id: impl Into<String>,
        config_version: u32,
        scope: ConfigPackScope,
        policies: Vec<AccountingPolicy>,
        chart_of_accounts_bindings: Vec<RoleBindingDef>,
        import_mapping_names: Vec<String>,
    ) -> Self {
        let mut pack = Self {
            config_id: config_id.into(),
            config_version,
            checksum: String::new(),
            canonical_fingerprint: String::new(),
            scope,
            policies,
            chart_of_accounts_bindings,
            import_mapping_names,
        };
        let fingerprint = pack.compute_checksum();
        pack.canonical_fingerprint = fingerprint.clone();
        pack.checksum = fingerprint;
        pack
    }

    /// sha-256 over every field except `checksum`/`canonical_fingerprint`
    /// themselves, serialized with serde_json's default sorted-key `Map`
    /// (the same canonicalization `acctkernel_audit::hash_payload` relies on).
    pub fn compute_checksum(&self) -> String {
        #[derive(Serialize)]
        struct Fingerprint<'a> {
            config_id: &'a str,
            config_version: u32,
            scope: &'a ConfigPackScope,
            policies: &'a [AccountingPolicy],
            chart_of_accounts_bindings: &'a [RoleBindingDef],
            import_mapping_names: &'a [String],
        }
        let fp = Fingerprint {
            config_id: &self.config_id,
            config_version: self.config_version,
            scope: &self.scope,
            policies: &self.policies,
            chart_of_accounts_bindings: &self.chart_of_accounts_bindings,
            import_mapping_names: &self.import_mapping_names,
        };
        let canonical = serde_json::to_vec(&fp).expect("Value serialization never fails");
        hex::encode(Sha256::digest(canonical))
    }

    /// §6: "the kernel verifies `pack.checksum == recomputed_checksum` on
    /// load; drift is fatal."
    pub fn verify(&self) -> Result<(), ConfigPackError> {
        let recomputed = self.compute_checksum();
        if recomputed != self.checksum {
            return Err(ConfigPackError::ChecksumMismatch { recorded: self.checksum.clone(), recomputed });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn scope() -> ConfigPackScope {
        ConfigPackScope {
            legal_entity: "ACME-US".into(),
            jurisdiction: "US".into(),
            regulatory_regime: "GAAP".into(),
            currency: "USD".into(),
            effective_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            effective_to: None,
        }
    }

    #[test]
    fn freshly_sealed_pack_verifies() {
        let pack = CompiledConfigPack::sealed("default", 1, scope(), vec![], vec![], vec!["qb_vendors".into()]);
        assert!(pack.verify().is_ok());
    }

    #[test]
    fn tampered_pack_fails_checksum() {
        let mut pack = CompiledConfigPack::sealed("default", 1, scope(), vec![], vec![], vec![]);
        pack.config_version = 2;
        assert_eq!(
            pack.verify().unwrap_err(),
            ConfigPackError::ChecksumMismatch { recorded: pack.checksum.clone(), recomputed: pack.compute_checksum() }
        );
    }

    #[test]
    fn checksum_is_stable_across_runs_for_identical_input() {
        let a = CompiledConfigPack::sealed("default", 1, scope(), vec![], vec![], vec![]);
        let b = CompiledConfigPack::sealed("default", 1, scope(), vec![], vec![], vec![]);
        assert_eq!(a.checksum, b.checksum);
    }
}
