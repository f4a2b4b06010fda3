//! MeaningBuilder — turns an event plus its matched policy into an
//! `EconomicEventData`, subject to guard evaluation and an optional
//! policy-authority check (§4.4).

use std::collections::HashMap;

use acctkernel_policy::{AccountingPolicy, GuardType};
use acctkernel_types::ReferenceSnapshot;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use crate::field_path::get_field_value;
use crate::guard::GuardExpr;

#[derive(Debug, Clone, PartialEq)]
pub enum GuardOutcome {
    Passed,
    Rejected { reason_code: String, detail: String },
    Blocked { reason_code: String, detail: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorityViolation {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EconomicEventData {
    pub source_event_id: Uuid,
    pub economic_type: String,
    pub effective_date: NaiveDate,
    pub profile_id: String,
    pub profile_version: u32,
    pub profile_hash: String,
    pub quantity: Option<Decimal>,
    pub dimensions: HashMap<String, Value>,
    pub reference_snapshot: ReferenceSnapshot,
    pub trace_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeaningBuilderResult {
    pub success: bool,
    pub economic_event: Option<EconomicEventData>,
    pub guard_result: GuardOutcome,
    pub validation_errors: Vec<AuthorityViolation>,
}

/// Caller-supplied authorization check (§4.4 "optional policy authority").
/// A real implementation is backed by the compiled config pack's module
/// bindings; the kernel only depends on the trait so `acctkernel-meaning`
/// stays free of config-pack concerns.
pub trait PolicyAuthority {
    fn is_authorized(&self, economic_type: &str, module_type: &str, target_ledgers: &[String]) -> bool;
}

pub struct MeaningBuilder;

impl MeaningBuilder {
    /// Build the economic meaning of `event_type`/`payload` under
    /// `policy`. `clock` supplies `created_at`/`trace_id` so callers can
    /// inject determinism in tests.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        policy: &AccountingPolicy,
        event_type: &str,
        source_event_id: Uuid,
        effective_date: NaiveDate,
        payload: &Value,
        profile_hash: &str,
        snapshot: ReferenceSnapshot,
        now: DateTime<Utc>,
        trace_id: Uuid,
        authority: Option<(&dyn PolicyAuthority, &str, &[String])>,
    ) -> MeaningBuilderResult {
        if policy.trigger.event_type != event_type {
            return MeaningBuilderResult {
                success: false,
                economic_event: None,
                guard_result: GuardOutcome::Rejected {
                    reason_code: "PROFILE_EVENT_MISMATCH".into(),
                    detail: format!(
                        "policy '{}' trigger event_type '{}' does not match event '{}'",
                        policy.name, policy.trigger.event_type, event_type
                    ),
                },
                validation_errors: vec![],
            };
        }

        for guard in &policy.guards {
            let expr = GuardExpr::compile(&guard.expression);
            if expr.evaluate(payload) {
                let outcome = match guard.guard_type {
                    GuardType::Reject => {
                        GuardOutcome::Rejected { reason_code: guard.reason_code.clone(), detail: guard.message.clone() }
                    }
                    GuardType::Block => {
                        GuardOutcome::Blocked { reason_code: guard.reason_code.clone(), detail: guard.message.clone() }
                    }
                };
                return MeaningBuilderResult { success: false, economic_event: None, guard_result: outcome, validation_errors: vec![] };
            }
        }

        let mut validation_errors = Vec::new();
        if let Some((authority, module_type, target_ledgers)) = authority {
            if !authority.is_authorized(&policy.meaning.economic_type, module_type, target_ledgers) {
                validation_errors.push(AuthorityViolation {
                    code: "AUTHORITY_VIOLATION",
                    message: format!(
                        "economic type '{}' is not authorized for module '{module_type}' on ledgers {target_ledgers:?}",
                        policy.meaning.economic_type
                    ),
                });
            }
        }
        if !validation_errors.is_empty() {
            return MeaningBuilderResult { success: false, economic_event: None, guard_result: GuardOutcome::Passed, validation_errors };
        }

        let quantity = policy
            .meaning
            .quantity_field
            .as_deref()
            .and_then(|path| get_field_value(payload, path))
            .and_then(json_to_decimal);

        let mut dimensions = HashMap::new();
        for dim_path in &policy.meaning.dimensions {
            if let Some(value) = get_field_value(payload, dim_path) {
                let key = dim_path.rsplit('.').next().unwrap_or(dim_path).to_string();
                dimensions.insert(key, value.clone());
            }
        }

        MeaningBuilderResult {
            success: true,
            economic_event: Some(EconomicEventData {
                source_event_id,
                economic_type: policy.meaning.economic_type.clone(),
                effective_date,
                profile_id: policy.name.clone(),
                profile_version: policy.version,
                profile_hash: profile_hash.to_string(),
                quantity,
                dimensions,
                reference_snapshot: snapshot,
                trace_id,
                created_at: now,
            }),
            guard_result: GuardOutcome::Passed,
            validation_errors: vec![],
        }
    }
}

fn json_to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acctkernel_policy::{GuardCondition, LedgerEffect, PolicyMeaning, PolicyPrecedence, PolicyTrigger};
    use serde_json::json;

    fn policy_with_guards(guards: Vec<GuardCondition>) -> AccountingPolicy {
        AccountingPolicy {
            name: "ap_invoice_standard".into(),
            version: 1,
            trigger: PolicyTrigger::new("ap.invoice_received"),
            meaning: PolicyMeaning {
                economic_type: "APLiability".into(),
                quantity_field: Some("payload.amount".into()),
                dimensions: vec!["payload.po_number".into()],
            },
            ledger_effects: vec![LedgerEffect { ledger: "GL".into(), debit_role: "inventory".into(), credit_role: "grni".into() }],
            effective_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            effective_to: None,
            scope: "*".into(),
            precedence: PolicyPrecedence::default(),
            valuation_model: Some("fixed_amount_v1".into()),
            guards,
            line_mappings: vec![],
            intent_source: None,
            description: String::new(),
        }
    }

    fn snapshot() -> ReferenceSnapshot {
        ReferenceSnapshot::new("cfg1", "coa1", "dim1", "cur1", "fx1")
    }

    #[test]
    fn mismatched_event_type_rejects() {
        let policy = policy_with_guards(vec![]);
        let result = MeaningBuilder::build(
            &policy,
            "ap.payment_made",
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            &json!({}),
            "hash",
            snapshot(),
            Utc::now(),
            Uuid::new_v4(),
            None,
        );
        assert!(!result.success);
        assert!(matches!(result.guard_result, GuardOutcome::Rejected { reason_code, .. } if reason_code == "PROFILE_EVENT_MISMATCH"));
    }

    #[test]
    fn zero_amount_guard_rejects() {
        let guard = GuardCondition {
            guard_type: GuardType::Reject,
            expression: "payload.amount <= 0".into(),
            reason_code: "INVALID_AMOUNT".into(),
            message: "amount must be positive".into(),
        };
        let policy = policy_with_guards(vec![guard]);
        let payload = json!({"amount": "0"});
        let result = MeaningBuilder::build(
            &policy,
            "ap.invoice_received",
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            &payload,
            "hash",
            snapshot(),
            Utc::now(),
            Uuid::new_v4(),
            None,
        );
        assert!(!result.success);
        assert!(matches!(result.guard_result, GuardOutcome::Rejected { reason_code, .. } if reason_code == "INVALID_AMOUNT"));
    }

    #[test]
    fn passing_guard_extracts_quantity_and_dimensions() {
        let policy = policy_with_guards(vec![]);
        let payload = json!({"amount": "1234.56", "po_number": "PO-100"});
        let result = MeaningBuilder::build(
            &policy,
            "ap.invoice_received",
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            &payload,
            "hash",
            snapshot(),
            Utc::now(),
            Uuid::new_v4(),
            None,
        );
        assert!(result.success);
        let econ = result.economic_event.unwrap();
        assert_eq!(econ.quantity.unwrap().to_string(), "1234.56");
        assert_eq!(econ.dimensions.get("po_number").unwrap(), "PO-100");
    }

    struct DenyAll;
    impl PolicyAuthority for DenyAll {
        fn is_authorized(&self, _economic_type: &str, _module_type: &str, _target_ledgers: &[String]) -> bool {
            false
        }
    }

    #[test]
    fn authority_violation_is_a_validation_error_not_a_guard_rejection() {
        let policy = policy_with_guards(vec![]);
        let payload = json!({"amount": "100"});
        let deny = DenyAll;
        let result = MeaningBuilder::build(
            &policy,
            "ap.invoice_received",
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            &payload,
            "hash",
            snapshot(),
            Utc::now(),
            Uuid::new_v4(),
            Some((&deny, "ap", &["GL".to_string()])),
        );
        assert!(!result.success);
        assert_eq!(result.guard_result, GuardOutcome::Passed);
        assert_eq!(result.validation_errors.len(), 1);
    }
}
