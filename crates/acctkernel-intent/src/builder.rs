//! Intent builder — expands a policy's ledger effects (and optional
//! `line_mappings`) into an [`AccountingIntent`] (§4.6).

use acctkernel_policy::{AccountingPolicy, LineMapping, LineSide};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{AccountingIntent, IntentLine, LedgerIntent};

const AMOUNT_PROBE_KEYS: &[&str] = &["amount", "total", "line_amount", "value", "extended_cost"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntentBuildError {
    #[error("field path '{0}' could not be resolved to a decimal amount")]
    UnresolvableAmount(String),
    #[error("imported journal line references unknown account key '{0}'")]
    UnresolvableAccountKey(String),
    #[error("imported journal line for '{0}' carries both a debit and a credit amount")]
    BothSidesNonZero(String),
}

pub struct IntentBuilder;

impl IntentBuilder {
    /// Build an intent from a policy's `ledger_effects`/`line_mappings`
    /// against the already-valuated `amount`/`currency` for this event.
    pub fn build(
        policy: &AccountingPolicy,
        source_event_id: Uuid,
        econ_event_id: Uuid,
        effective_date: NaiveDate,
        payload: &Value,
        amount: Decimal,
        currency: &str,
    ) -> Result<AccountingIntent, IntentBuildError> {
        let mut ledger_intents: Vec<LedgerIntent> = Vec::new();

        for effect in &policy.ledger_effects {
            let mappings: Vec<&LineMapping> =
                policy.line_mappings.iter().filter(|m| m.ledger == effect.ledger).collect();

            let mut intent = LedgerIntent::new(effect.ledger.clone());

            if mappings.is_empty() {
                intent.lines.push(IntentLine {
                    role: effect.debit_role.clone(),
                    side: acctkernel_types::Side::Debit,
                    amount,
                    currency: currency.to_string(),
                });
                intent.lines.push(IntentLine {
                    role: effect.credit_role.clone(),
                    side: acctkernel_types::Side::Credit,
                    amount,
                    currency: currency.to_string(),
                });
            } else {
                for mapping in mappings {
                    expand_mapping(mapping, payload, amount, currency, &mut intent.lines)?;
                }
            }

            ledger_intents.push(intent);
        }

        Ok(AccountingIntent {
            econ_event_id,
            source_event_id,
            profile_id: policy.name.clone(),
            profile_version: policy.version,
            effective_date,
            ledger_intents,
        })
    }

    /// Alternate constructor for imported historical journals: each entry
    /// in `payload.lines` carries an `account_key` plus a debit or credit
    /// amount. `resolve_role` maps an account key to the role it should
    /// post to (e.g. via a chart-of-accounts lookup).
    pub fn from_payload_lines(
        source_event_id: Uuid,
        econ_event_id: Uuid,
        profile_id: impl Into<String>,
        profile_version: u32,
        effective_date: NaiveDate,
        ledger_id: impl Into<String>,
        lines: &[ImportedLine],
        resolve_role: impl Fn(&str) -> Option<String>,
    ) -> Result<AccountingIntent, IntentBuildError> {
        let mut intent = LedgerIntent::new(ledger_id);

        for line in lines {
            let debit_nonzero = line.debit.map(|d| !d.is_zero()).unwrap_or(false);
            let credit_nonzero = line.credit.map(|c| !c.is_zero()).unwrap_or(false);
            if debit_nonzero && credit_nonzero {
                return Err(IntentBuildError::BothSidesNonZero(line.account_key.clone()));
            }

            let role = resolve_role(&line.account_key)
                .ok_or_else(|| IntentBuildError::UnresolvableAccountKey(line.account_key.clone()))?;

            if debit_nonzero {
                intent.lines.push(IntentLine {
                    role,
                    side: acctkernel_types::Side::Debit,
                    amount: line.debit.unwrap(),
                    currency: line.currency.clone(),
                });
            } else if credit_nonzero {
                intent.lines.push(IntentLine {
                    role,
                    side: acctkernel_types::Side::Credit,
                    amount: line.credit.unwrap(),
                    currency: line.currency.clone(),
                });
            }
        }

        Ok(AccountingIntent {
            econ_event_id,
            source_event_id,
            profile_id: profile_id.into(),
            profile_version,
            effective_date,
            ledger_intents: vec![intent],
        })
    }
}

#[derive(Debug, Clone)]
pub struct ImportedLine {
    pub account_key: String,
    pub debit: Option<Decimal>,
    pub credit: Option<Decimal>,
    pub currency: String,
}

fn expand_mapping(
    mapping: &LineMapping,
    payload: &Value,
    default_amount: Decimal,
    currency: &str,
    out: &mut Vec<IntentLine>,
) -> Result<(), IntentBuildError> {
    if let Some(path) = &mapping.foreach {
        let items = resolve_path(payload, path).and_then(|v| v.as_array()).cloned().unwrap_or_default();
        if items.is_empty() {
            out.push(IntentLine {
                role: mapping.role.clone(),
                side: mapping.side.as_account_side(),
                amount: default_amount,
                currency: currency.to_string(),
            });
            return Ok(());
        }
        for item in &items {
            let amount = probe_amount(item).unwrap_or(default_amount);
            out.push(IntentLine {
                role: mapping.role.clone(),
                side: mapping.side.as_account_side(),
                amount,
                currency: currency.to_string(),
            });
        }
        return Ok(());
    }

    if let Some(path) = &mapping.from_context {
        let value = resolve_path(payload, path)
            .and_then(json_to_decimal)
            .ok_or_else(|| IntentBuildError::UnresolvableAmount(path.clone()))?;
        if value.is_zero() {
            return Ok(());
        }
        let (side, amount) = if value.is_sign_positive() {
            (mapping.side, value)
        } else {
            (mapping.side.flip(), value.abs())
        };
        out.push(IntentLine { role: mapping.role.clone(), side: side.as_account_side(), amount, currency: currency.to_string() });
        return Ok(());
    }

    // Plain mapping: single line on the declared side for the full amount.
    out.push(IntentLine {
        role: mapping.role.clone(),
        side: mapping.side.as_account_side(),
        amount: default_amount,
        currency: currency.to_string(),
    });
    Ok(())
}

fn probe_amount(item: &Value) -> Option<Decimal> {
    if let Value::Object(_) = item {
        for key in AMOUNT_PROBE_KEYS {
            if let Some(v) = item.get(key) {
                if let Some(d) = json_to_decimal(v) {
                    return Some(d);
                }
            }
        }
        None
    } else {
        json_to_decimal(item)
    }
}

fn resolve_path<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix("payload.").unwrap_or(path);
    let mut current = payload;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn json_to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
