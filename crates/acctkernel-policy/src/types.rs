//! AccountingPolicy — the declarative interpretation law.
//!
//! A policy declares which events it applies to (trigger), what economic
//! meaning it derives (meaning), what ledger roles it posts to
//! (ledger_effects), and what guard conditions can reject or block
//! processing. Exactly one policy must match any given event; overlap
//! between two policies is only legal when precedence can resolve it
//! (explicit override, differing scope specificity, differing priority, or
//! differing precedence mode) — see [`crate::compiler::PolicyCompiler`].

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrecedenceMode {
    Normal,
    Override,
}

impl Default for PrecedenceMode {
    fn default() -> Self {
        Self::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardType {
    /// Terminal — the event represents invalid economic reality.
    Reject,
    /// Resumable — the system cannot safely process yet but may retry.
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTrigger {
    pub event_type: String,
    pub schema_version: u32,
    /// Field-path -> expected-value conditions narrowing dispatch.
    pub where_conditions: Vec<(String, serde_json::Value)>,
}

impl PolicyTrigger {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            schema_version: 1,
            where_conditions: Vec::new(),
        }
    }

    pub fn matches_event_type(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyMeaning {
    pub economic_type: String,
    pub quantity_field: Option<String>,
    pub dimensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEffect {
    pub ledger: String,
    pub debit_role: String,
    pub credit_role: String,
}

/// One entry in a policy's `line_mappings`: an explicit expansion rule the
/// intent builder uses instead of the two-line debit/credit default. At
/// most one of `foreach`/`from_context` may be set (§4.6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMapping {
    pub role: String,
    pub side: LineSide,
    pub ledger: String,
    /// `foreach <path>`: resolve `payload[path]` as a collection and emit
    /// one line per item.
    pub foreach: Option<String>,
    /// `from_context <path>`: resolve `payload[path]` as a signed decimal;
    /// negative values flip to the opposite side.
    pub from_context: Option<String>,
}

impl LineMapping {
    pub fn plain(role: impl Into<String>, side: LineSide, ledger: impl Into<String>) -> Self {
        Self { role: role.into(), side, ledger: ledger.into(), foreach: None, from_context: None }
    }
}

/// The side a [`LineMapping`] declares before sign-flipping is applied. A
/// separate type from [`acctkernel_types::Side`] because a policy author
/// writes this declaratively; the intent builder is what turns it into an
/// actual posted side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineSide {
    Debit,
    Credit,
}

impl LineSide {
    pub fn flip(self) -> Self {
        match self {
            Self::Debit => Self::Credit,
            Self::Credit => Self::Debit,
        }
    }

    pub fn as_account_side(self) -> acctkernel_types::Side {
        match self {
            Self::Debit => acctkernel_types::Side::Debit,
            Self::Credit => acctkernel_types::Side::Credit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardCondition {
    pub guard_type: GuardType,
    pub expression: String,
    pub reason_code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PolicyPrecedence {
    pub mode: PrecedenceMode,
    pub priority: i32,
    pub overrides: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingPolicy {
    pub name: String,
    pub version: u32,
    pub trigger: PolicyTrigger,
    pub meaning: PolicyMeaning,
    pub ledger_effects: Vec<LedgerEffect>,

    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,

    pub scope: String,
    pub precedence: PolicyPrecedence,

    pub valuation_model: Option<String>,
    pub guards: Vec<GuardCondition>,

    /// Explicit line expansion rules (§4.6). Empty means the intent
    /// builder falls back to the two-line debit/credit default for each
    /// ledger effect.
    #[serde(default)]
    pub line_mappings: Vec<LineMapping>,

    pub intent_source: Option<String>,
    pub description: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyBuildError {
    #[error("policy name is required")]
    MissingName,
    #[error("policy version must be >= 1")]
    InvalidVersion,
    #[error("trigger event_type is required")]
    MissingEventType,
    #[error("meaning economic_type is required")]
    MissingEconomicType,
    #[error("policy must have at least one ledger effect")]
    NoLedgerEffects,
    #[error("effective_to must be >= effective_from")]
    InvalidEffectiveRange,
}

impl AccountingPolicy {
    /// Validate the minimal structural invariants a policy must satisfy to
    /// exist at all (distinct from [`crate::compiler::PolicyCompiler`]'s
    /// richer cross-policy checks).
    pub fn validate_structure(&self) -> Result<(), PolicyBuildError> {
        if self.name.is_empty() {
            return Err(PolicyBuildError::MissingName);
        }
        if self.version < 1 {
            return Err(PolicyBuildError::InvalidVersion);
        }
        if self.trigger.event_type.is_empty() {
            return Err(PolicyBuildError::MissingEventType);
        }
        if self.meaning.economic_type.is_empty() {
            return Err(PolicyBuildError::MissingEconomicType);
        }
        if self.ledger_effects.is_empty() {
            return Err(PolicyBuildError::NoLedgerEffects);
        }
        if let Some(to) = self.effective_to {
            if to < self.effective_from {
                return Err(PolicyBuildError::InvalidEffectiveRange);
            }
        }
        Ok(())
    }

    pub fn policy_key(&self) -> String {
        format!("{}:v{}", self.name, self.version)
    }

    pub fn is_effective_on(&self, check_date: NaiveDate) -> bool {
        if check_date < self.effective_from {
            return false;
        }
        if let Some(to) = self.effective_to {
            if check_date > to {
                return false;
            }
        }
        true
    }

    /// Wildcard scope matching: `"*"` matches everything, `"prefix:*"`
    /// matches anything starting with `"prefix:"`, otherwise exact match.
    pub fn matches_scope(&self, scope_value: &str) -> bool {
        scope_matches(&self.scope, scope_value)
    }

    /// Every `(path, expected_value)` pair in the trigger's where-clauses
    /// must hold against `payload` (dot-path traversal, optional `payload.`
    /// prefix) for this policy to be a candidate (§4.2 step 2).
    pub fn matches_where_conditions(&self, payload: &serde_json::Value) -> bool {
        self.trigger
            .where_conditions
            .iter()
            .all(|(path, expected)| payload_field(payload, path) == Some(expected))
    }

    /// Every field path this policy references, for `validate_field_references`
    /// to check against the event schema's declared paths. The schema never
    /// carries the `payload.` prefix `matches_where_conditions` accepts, so
    /// paths are normalized the same way `payload_field` does before being
    /// collected here.
    pub fn get_field_references(&self) -> BTreeSet<String> {
        let mut fields = BTreeSet::new();
        for (path, _) in &self.trigger.where_conditions {
            fields.insert(strip_payload_prefix(path));
        }
        if let Some(qf) = &self.meaning.quantity_field {
            fields.insert(strip_payload_prefix(qf));
        }
        for dim in &self.meaning.dimensions {
            if dim.contains('.') {
                fields.insert(strip_payload_prefix(dim));
            }
        }
        for mapping in &self.line_mappings {
            if let Some(path) = &mapping.foreach {
                fields.insert(strip_payload_prefix(path));
            }
            if let Some(path) = &mapping.from_context {
                fields.insert(strip_payload_prefix(path));
            }
        }
        fields
    }

    pub fn reject_guards(&self) -> impl Iterator<Item = &GuardCondition> {
        self.guards.iter().filter(|g| g.guard_type == GuardType::Reject)
    }

    pub fn block_guards(&self) -> impl Iterator<Item = &GuardCondition> {
        self.guards.iter().filter(|g| g.guard_type == GuardType::Block)
    }
}

fn payload_field<'a>(payload: &'a serde_json::Value, field_path: &str) -> Option<&'a serde_json::Value> {
    let field_path = field_path.strip_prefix("payload.").unwrap_or(field_path);
    let mut current = payload;
    for part in field_path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn strip_payload_prefix(field_path: &str) -> String {
    field_path.strip_prefix("payload.").unwrap_or(field_path).to_string()
}

pub(crate) fn scope_matches(scope: &str, scope_value: &str) -> bool {
    if scope == "*" {
        return true;
    }
    if let Some(prefix) = scope.strip_suffix('*') {
        return scope_value.starts_with(prefix);
    }
    scope == scope_value
}

/// Specificity score used both for overlap-precedence resolution and for
/// runtime policy selection: exact scopes win over prefixes, prefixes win
/// over the wildcard.
pub fn scope_specificity(scope: &str) -> i64 {
    if scope == "*" {
        0
    } else if scope.ends_with(":*") {
        (scope.len() - 1) as i64
    } else {
        scope.len() as i64 + 100
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_policy() -> AccountingPolicy {
        AccountingPolicy {
            name: "inventory_receipt_standard".into(),
            version: 1,
            trigger: PolicyTrigger::new("inventory.receipt"),
            meaning: PolicyMeaning {
                economic_type: "InventoryIncrease".into(),
                quantity_field: Some("payload.quantity".into()),
                dimensions: vec![],
            },
            ledger_effects: vec![LedgerEffect {
                ledger: "GL".into(),
                debit_role: "inventory".into(),
                credit_role: "accounts_payable".into(),
            }],
            effective_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            effective_to: None,
            scope: "*".into(),
            precedence: PolicyPrecedence::default(),
            valuation_model: Some("standard_receipt_v1".into()),
            guards: vec![],
            line_mappings: vec![],
            intent_source: None,
            description: String::new(),
        }
    }

    #[test]
    fn rejects_missing_ledger_effects() {
        let mut p = base_policy();
        p.ledger_effects.clear();
        assert!(matches!(p.validate_structure(), Err(PolicyBuildError::NoLedgerEffects)));
    }

    #[test]
    fn scope_wildcard_matches_everything() {
        assert!(scope_matches("*", "anything"));
    }

    #[test]
    fn scope_prefix_matches_by_prefix() {
        assert!(scope_matches("sku:*", "sku:ABC"));
        assert!(!scope_matches("sku:*", "project:ABC"));
    }

    #[test]
    fn specificity_orders_exact_over_prefix_over_wildcard() {
        assert!(scope_specificity("sku:ABC123") > scope_specificity("sku:*"));
        assert!(scope_specificity("sku:*") > scope_specificity("*"));
    }

    #[test]
    fn effective_range_excludes_before_and_after() {
        let p = base_policy();
        assert!(!p.is_effective_on(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()));
        assert!(p.is_effective_on(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()));
    }

    #[test]
    fn field_references_strip_payload_prefix() {
        let mut p = base_policy();
        p.trigger.where_conditions.push(("payload.status".into(), serde_json::json!("approved")));
        p.meaning.dimensions = vec!["payload.warehouse_code".into()];

        let refs = p.get_field_references();
        assert!(refs.contains("quantity"));
        assert!(refs.contains("status"));
        assert!(refs.contains("warehouse_code"));
        assert!(!refs.iter().any(|r| r.starts_with("payload.")));
    }
}
