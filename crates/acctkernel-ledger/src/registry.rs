//! `LedgerRegistry` — the set of ledgers the kernel knows about, and what
//! each one demands of a policy before it is allowed to post to it (§4.7).

use std::collections::HashMap;

use acctkernel_policy::LedgerRequirements;

/// A ledger's posting requirements: which roles are mandatory per economic
/// type, which dimensions lines posting to it must carry, and the
/// tolerance under which an unbalanced entry is patched with a rounding
/// line rather than rejected (Open Question #1 — a per-ledger config
/// value, not a universal constant).
#[derive(Debug, Clone)]
pub struct LedgerRequirementSet {
    /// economic_type -> roles every posting must cover across its ledger effects.
    pub required_roles: HashMap<String, Vec<String>>,
    pub dimension_requirements: Vec<String>,
    pub rounding_tolerance: rust_decimal::Decimal,
}

impl LedgerRequirementSet {
    pub fn new(rounding_tolerance: rust_decimal::Decimal) -> Self {
        Self {
            required_roles: HashMap::new(),
            dimension_requirements: Vec::new(),
            rounding_tolerance,
        }
    }

    pub fn require(mut self, economic_type: impl Into<String>, roles: Vec<impl Into<String>>) -> Self {
        self.required_roles.insert(economic_type.into(), roles.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_dimensions(mut self, dims: Vec<impl Into<String>>) -> Self {
        self.dimension_requirements = dims.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct LedgerRegistry {
    ledgers: HashMap<String, LedgerRequirementSet>,
}

impl LedgerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a default general ledger with the canonical economic-type to
    /// role mappings a basic chart of accounts needs.
    pub fn with_default_gl(mut self) -> Self {
        use rust_decimal_macros::dec;
        let gl = LedgerRequirementSet::new(dec!(0.01))
            .require("InventoryIncrease", vec!["InventoryAsset", "GRNI"])
            .require("Revenue", vec!["AccountsReceivable", "Revenue"])
            .require("APLiability", vec!["Inventory", "AccountsPayable"])
            .require("CashReceipt", vec!["Cash", "AccountsReceivable"])
            .require("CashDisbursement", vec!["AccountsPayable", "Cash"]);
        self.ledgers.insert("GL".to_string(), gl);
        self
    }

    pub fn register(&mut self, ledger_id: impl Into<String>, requirements: LedgerRequirementSet) {
        self.ledgers.insert(ledger_id.into(), requirements);
    }

    pub fn get(&self, ledger_id: &str) -> Option<&LedgerRequirementSet> {
        self.ledgers.get(ledger_id)
    }

    pub fn rounding_tolerance(&self, ledger_id: &str) -> rust_decimal::Decimal {
        self.ledgers
            .get(ledger_id)
            .map(|r| r.rounding_tolerance)
            .unwrap_or(rust_decimal::Decimal::ZERO)
    }

    /// Dimensions every line posting to `ledger_id` is expected to carry
    /// (L1/L3 — hinted but not enforced, per SPEC_FULL Open Question 3: a
    /// missing dimension produces a decision-log warning, never a reject).
    pub fn dimension_requirements(&self, ledger_id: &str) -> &[String] {
        self.ledgers.get(ledger_id).map(|r| r.dimension_requirements.as_slice()).unwrap_or(&[])
    }
}

impl LedgerRequirements for LedgerRegistry {
    fn has_ledger(&self, ledger_id: &str) -> bool {
        self.ledgers.contains_key(ledger_id)
    }

    fn required_roles(&self, ledger_id: &str, economic_type: &str) -> Vec<String> {
        self.ledgers
            .get(ledger_id)
            .and_then(|r| r.required_roles.get(economic_type))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gl_covers_inventory_increase() {
        let registry = LedgerRegistry::new().with_default_gl();
        assert!(registry.has_ledger("GL"));
        let roles = registry.required_roles("GL", "InventoryIncrease");
        assert_eq!(roles, vec!["InventoryAsset".to_string(), "GRNI".to_string()]);
    }

    #[test]
    fn unknown_ledger_has_no_required_roles() {
        let registry = LedgerRegistry::new().with_default_gl();
        assert!(registry.required_roles("SUBLEDGER", "Revenue").is_empty());
        assert!(!registry.has_ledger("SUBLEDGER"));
    }

    #[test]
    fn rounding_tolerance_defaults_to_zero_for_unregistered_ledger() {
        let registry = LedgerRegistry::new();
        assert_eq!(registry.rounding_tolerance("GL"), rust_decimal::Decimal::ZERO);
    }
}
