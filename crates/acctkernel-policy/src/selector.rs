//! PolicySelector — chooses which registered policy applies to an event at
//! interpretation time (§4.2).
//!
//! Candidate policies are those whose trigger matches the event type, whose
//! where-clauses hold against the payload, whose effective date range
//! covers the event date, and whose scope matches the event's scope value.
//! When more than one candidate remains, precedence is resolved in order:
//! explicit override, then scope specificity, then priority, then
//! OVERRIDE-before-NORMAL mode; if that still leaves a tie, selection fails
//! rather than guessing.

use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;

use crate::types::{scope_specificity, AccountingPolicy, PrecedenceMode};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectError {
    #[error("no accounting policy matched event type {event_type} in scope {scope}")]
    NotFound { event_type: String, scope: String },
    #[error("multiple policies match event type {event_type} and precedence could not resolve: {candidates:?}")]
    MultipleMatch { event_type: String, candidates: Vec<String> },
}

#[derive(Debug, Default)]
pub struct PolicySelector {
    policies: Vec<AccountingPolicy>,
}

impl PolicySelector {
    pub fn new() -> Self {
        Self { policies: Vec::new() }
    }

    pub fn register(&mut self, policy: AccountingPolicy) {
        self.policies.push(policy);
    }

    pub fn list_by_event_type(&self, event_type: &str) -> Vec<&AccountingPolicy> {
        self.policies.iter().filter(|p| p.trigger.matches_event_type(event_type)).collect()
    }

    /// Select the single policy that governs an event.
    pub fn select(
        &self,
        event_type: &str,
        payload: &Value,
        event_date: NaiveDate,
        scope_value: &str,
    ) -> Result<&AccountingPolicy, SelectError> {
        let mut candidates: Vec<&AccountingPolicy> = self
            .policies
            .iter()
            .filter(|p| {
                p.trigger.matches_event_type(event_type)
                    && p.is_effective_on(event_date)
                    && p.matches_where_conditions(payload)
                    && p.matches_scope(scope_value)
            })
            .collect();

        if candidates.is_empty() {
            return Err(SelectError::NotFound { event_type: event_type.to_string(), scope: scope_value.to_string() });
        }
        if candidates.len() == 1 {
            return Ok(candidates.pop().expect("len checked above"));
        }

        // Explicit override: a candidate naming another candidate in its
        // `precedence.overrides` wins outright.
        if let Some(winner) = candidates.iter().find(|p| {
            candidates.iter().any(|other| other.name != p.name && p.precedence.overrides.contains(&other.name))
        }) {
            return Ok(winner);
        }

        let best_rank = candidates.iter().map(|p| rank(p)).max().expect("non-empty");
        let mut top: Vec<&AccountingPolicy> = candidates.into_iter().filter(|p| rank(p) == best_rank).collect();

        if top.len() == 1 {
            return Ok(top.pop().expect("len checked above"));
        }

        Err(SelectError::MultipleMatch {
            event_type: event_type.to_string(),
            candidates: top.into_iter().map(|p| p.policy_key()).collect(),
        })
    }
}

/// A sortable precedence rank: scope specificity first, then priority, then
/// OVERRIDE mode breaking remaining ties.
fn rank(p: &AccountingPolicy) -> (i64, i32, u8) {
    let mode_rank = match p.precedence.mode {
        PrecedenceMode::Override => 1,
        PrecedenceMode::Normal => 0,
    };
    (scope_specificity(&p.scope), p.precedence.priority, mode_rank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LedgerEffect, PolicyMeaning, PolicyPrecedence, PolicyTrigger};
    use serde_json::json;

    fn policy(name: &str, scope: &str, priority: i32, mode: PrecedenceMode) -> AccountingPolicy {
        AccountingPolicy {
            name: name.into(),
            version: 1,
            trigger: PolicyTrigger::new("inventory.receipt"),
            meaning: PolicyMeaning { economic_type: "InventoryIncrease".into(), quantity_field: None, dimensions: vec![] },
            ledger_effects: vec![LedgerEffect { ledger: "GL".into(), debit_role: "inventory".into(), credit_role: "accounts_payable".into() }],
            effective_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            effective_to: None,
            scope: scope.into(),
            precedence: PolicyPrecedence { mode, priority, overrides: vec![] },
            valuation_model: None,
            guards: vec![],
            line_mappings: vec![],
            intent_source: None,
            description: String::new(),
        }
    }

    #[test]
    fn more_specific_scope_wins() {
        let mut selector = PolicySelector::new();
        selector.register(policy("generic", "*", 0, PrecedenceMode::Normal));
        selector.register(policy("specific", "sku:WIDGET", 0, PrecedenceMode::Normal));

        let chosen = selector
            .select("inventory.receipt", &json!({}), NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), "sku:WIDGET")
            .unwrap();
        assert_eq!(chosen.name, "specific");
    }

    #[test]
    fn no_match_returns_not_found() {
        let selector = PolicySelector::new();
        let err = selector
            .select("unknown.event", &json!({}), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "*")
            .unwrap_err();
        assert!(matches!(err, SelectError::NotFound { .. }));
    }

    #[test]
    fn higher_priority_wins_at_equal_specificity() {
        let mut selector = PolicySelector::new();
        selector.register(policy("low", "*", 0, PrecedenceMode::Normal));
        selector.register(policy("high", "*", 10, PrecedenceMode::Normal));

        let chosen = selector
            .select("inventory.receipt", &json!({}), NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), "any")
            .unwrap();
        assert_eq!(chosen.name, "high");
    }

    #[test]
    fn where_clause_excludes_non_matching_payload() {
        let mut generic = policy("generic", "*", 0, PrecedenceMode::Normal);
        generic.trigger.where_conditions.push(("po_number".to_string(), json!("PO-100")));
        let mut selector = PolicySelector::new();
        selector.register(generic);

        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert!(selector.select("inventory.receipt", &json!({"po_number": "PO-999"}), date, "any").is_err());
        assert!(selector.select("inventory.receipt", &json!({"po_number": "PO-100"}), date, "any").is_ok());
    }

    #[test]
    fn unresolvable_tie_is_multiple_match_error() {
        let mut selector = PolicySelector::new();
        selector.register(policy("a", "*", 0, PrecedenceMode::Normal));
        selector.register(policy("b", "*", 0, PrecedenceMode::Normal));
        let err = selector
            .select("inventory.receipt", &json!({}), NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), "any")
            .unwrap_err();
        assert!(matches!(err, SelectError::MultipleMatch { .. }));
    }

    #[test]
    fn explicit_override_wins_regardless_of_rank() {
        let mut low_override = policy("low_but_overrides", "*", 0, PrecedenceMode::Normal);
        low_override.precedence.overrides.push("high".to_string());
        let mut selector = PolicySelector::new();
        selector.register(low_override);
        selector.register(policy("high", "*", 100, PrecedenceMode::Normal));

        let chosen = selector
            .select("inventory.receipt", &json!({}), NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), "any")
            .unwrap();
        assert_eq!(chosen.name, "low_but_overrides");
    }
}
