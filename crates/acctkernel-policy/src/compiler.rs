//! PolicyCompiler — validates a policy before it is registered.
//!
//! Enforces that adding a policy never creates an ambiguous dispatch: any
//! two policies that could both match the same event, ledger, and date must
//! be resolvable by precedence (explicit override, differing scope
//! specificity, differing priority, or differing precedence mode).

use chrono::NaiveDate;

use acctkernel_schema::SchemaRegistry;

use crate::types::{AccountingPolicy, scope_specificity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub code: &'static str,
    pub message: String,
    pub field: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct CompilationResult {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl CompilationResult {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Required debit/credit roles a ledger demands for a given economic type.
/// Supplied by `acctkernel-ledger::LedgerRegistry`; kept as a plain trait
/// here so the policy crate has no dependency on the ledger crate.
pub trait LedgerRequirements {
    fn has_ledger(&self, ledger_id: &str) -> bool;
    fn required_roles(&self, ledger_id: &str, economic_type: &str) -> Vec<String>;
}

pub struct PolicyCompiler {
    pub check_overlaps: bool,
    pub check_ledger: bool,
    pub check_field_references: bool,
}

impl Default for PolicyCompiler {
    fn default() -> Self {
        Self { check_overlaps: true, check_ledger: true, check_field_references: true }
    }
}

impl PolicyCompiler {
    pub fn compile(
        &self,
        candidate: &AccountingPolicy,
        existing: &[AccountingPolicy],
        ledger: &dyn LedgerRequirements,
        schemas: &SchemaRegistry,
    ) -> CompilationResult {
        let mut result = CompilationResult::default();

        if let Err(e) = candidate.validate_structure() {
            result.errors.push(ValidationIssue {
                code: "INVALID_STRUCTURE",
                message: e.to_string(),
                field: "policy",
            });
        }

        if self.check_overlaps {
            for other in existing {
                if other.name == candidate.name {
                    continue;
                }
                if !profiles_overlap(candidate, other) {
                    continue;
                }
                if !precedence_resolves(candidate, other) {
                    result.errors.push(ValidationIssue {
                        code: "PROFILE_OVERLAP",
                        message: format!(
                            "policy '{}' overlaps with '{}' and cannot be resolved by precedence rules",
                            candidate.name, other.name
                        ),
                        field: "trigger",
                    });
                }
            }
        }

        if self.check_ledger {
            for effect in &candidate.ledger_effects {
                if !ledger.has_ledger(&effect.ledger) {
                    continue;
                }
                let required = ledger.required_roles(&effect.ledger, &candidate.meaning.economic_type);
                if required.is_empty() {
                    continue;
                }
                let provided = [effect.debit_role.as_str(), effect.credit_role.as_str()];
                let missing: Vec<&String> = required
                    .iter()
                    .filter(|r| !provided.contains(&r.as_str()))
                    .collect();
                if !missing.is_empty() {
                    result.errors.push(ValidationIssue {
                        code: "MISSING_REQUIRED_ROLES",
                        message: format!(
                            "policy '{}' is missing required roles for {} on {}: {:?}",
                            candidate.name, candidate.meaning.economic_type, effect.ledger, missing
                        ),
                        field: "ledger_effects",
                    });
                }
            }
        }

        if self.check_field_references {
            match schemas.get(&candidate.trigger.event_type, candidate.trigger.schema_version) {
                Some(schema) => {
                    let refs = candidate.get_field_references();
                    for err in acctkernel_schema::validate_field_references(&refs, schema) {
                        result.errors.push(ValidationIssue {
                            code: "INVALID_FIELD_REFERENCE",
                            message: err.message,
                            field: "trigger",
                        });
                    }
                }
                None => {
                    result.warnings.push(ValidationIssue {
                        code: "UNCOMPILED_POLICY",
                        message: format!(
                            "no schema registered for {}:v{}; field references were not checked",
                            candidate.trigger.event_type, candidate.trigger.schema_version
                        ),
                        field: "trigger",
                    });
                }
            }
        }

        result
    }
}

fn profiles_overlap(a: &AccountingPolicy, b: &AccountingPolicy) -> bool {
    if a.trigger.event_type != b.trigger.event_type {
        return false;
    }
    if !date_ranges_overlap(a.effective_from, a.effective_to, b.effective_from, b.effective_to) {
        return false;
    }
    scopes_overlap(&a.scope, &b.scope)
}

fn date_ranges_overlap(
    start1: NaiveDate,
    end1: Option<NaiveDate>,
    start2: NaiveDate,
    end2: Option<NaiveDate>,
) -> bool {
    let end1 = end1.unwrap_or(NaiveDate::MAX);
    let end2 = end2.unwrap_or(NaiveDate::MAX);
    start1 <= end2 && start2 <= end1
}

fn scopes_overlap(scope1: &str, scope2: &str) -> bool {
    if scope1 == "*" || scope2 == "*" {
        return true;
    }
    let p1 = scope1.strip_suffix('*');
    let p2 = scope2.strip_suffix('*');
    match (p1, p2) {
        (Some(p1), Some(p2)) => p1.starts_with(p2) || p2.starts_with(p1),
        (Some(p1), None) => scope2.starts_with(p1),
        (None, Some(p2)) => scope1.starts_with(p2),
        (None, None) => scope1 == scope2,
    }
}

fn precedence_resolves(a: &AccountingPolicy, b: &AccountingPolicy) -> bool {
    if a.precedence.overrides.iter().any(|n| n == &b.name) || b.precedence.overrides.iter().any(|n| n == &a.name) {
        return true;
    }
    if scope_specificity(&a.scope) != scope_specificity(&b.scope) {
        return true;
    }
    if a.precedence.priority != b.precedence.priority {
        return true;
    }
    a.precedence.mode != b.precedence.mode
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LedgerEffect, PolicyMeaning, PolicyPrecedence, PolicyTrigger};

    struct NoLedgers;
    impl LedgerRequirements for NoLedgers {
        fn has_ledger(&self, _ledger_id: &str) -> bool {
            false
        }
        fn required_roles(&self, _ledger_id: &str, _economic_type: &str) -> Vec<String> {
            vec![]
        }
    }

    fn policy(name: &str, scope: &str) -> AccountingPolicy {
        AccountingPolicy {
            name: name.into(),
            version: 1,
            trigger: PolicyTrigger::new("inventory.receipt"),
            meaning: PolicyMeaning { economic_type: "InventoryIncrease".into(), quantity_field: None, dimensions: vec![] },
            ledger_effects: vec![LedgerEffect { ledger: "GL".into(), debit_role: "inventory".into(), credit_role: "accounts_payable".into() }],
            effective_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            effective_to: None,
            scope: scope.into(),
            precedence: PolicyPrecedence::default(),
            valuation_model: None,
            guards: vec![],
            line_mappings: vec![],
            intent_source: None,
            description: String::new(),
        }
    }

    #[test]
    fn identical_scope_same_priority_overlaps_unresolved() {
        let compiler = PolicyCompiler::default();
        let a = policy("a", "*");
        let b = policy("b", "*");
        let result = compiler.compile(&a, &[b], &NoLedgers, &acctkernel_schema::SchemaRegistry::new());
        assert!(!result.success());
        assert_eq!(result.errors[0].code, "PROFILE_OVERLAP");
    }

    #[test]
    fn differing_scope_specificity_resolves_overlap() {
        let compiler = PolicyCompiler::default();
        let a = policy("a", "*");
        let b = policy("b", "sku:WIDGET");
        let result = compiler.compile(&a, &[b], &NoLedgers, &acctkernel_schema::SchemaRegistry::new());
        assert!(result.success());
    }

    #[test]
    fn payload_prefixed_quantity_field_passes_schema_check() {
        use acctkernel_schema::{EventSchema, FieldSchema, FieldType, SchemaRegistry};

        let mut p = policy("a", "*");
        p.trigger.schema_version = 1;
        p.meaning.quantity_field = Some("payload.quantity".into());

        let schema = EventSchema::new("inventory.receipt", 1, vec![FieldSchema::scalar("quantity", FieldType::Decimal, true)]);
        let mut registry = SchemaRegistry::new();
        registry.register(schema).unwrap();

        let compiler = PolicyCompiler::default();
        let result = compiler.compile(&p, &[], &NoLedgers, &registry);
        assert!(result.success(), "unexpected errors: {:?}", result.errors);
    }

    #[test]
    fn explicit_override_resolves_overlap() {
        let compiler = PolicyCompiler::default();
        let mut a = policy("a", "*");
        a.precedence.overrides.push("b".into());
        let b = policy("b", "*");
        let result = compiler.compile(&a, &[b], &NoLedgers, &acctkernel_schema::SchemaRegistry::new());
        assert!(result.success());
    }
}
