//! Pure, zero-I/O validators for staged import records. Mirrors the
//! validator shape of `acctkernel_schema::validator` but operates on mapped
//! `serde_json::Value` records rather than event payloads, since a single
//! import record can be checked before any event ever exists.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use acctkernel_types::Currency;

use crate::mapping::FieldMapping;

/// Kernel amounts are `NUMERIC(38, 9)`; a mapped value that would not fit
/// is rejected at import time rather than truncated silently at post time.
const MAX_DECIMAL_DIGITS: u32 = 38;
const MAX_DECIMAL_PLACES: u32 = 9;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: String,
    pub message: String,
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ValidationError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, field: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into(), field: field.into(), details: None }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

pub fn validate_required_fields(record: &Value, mappings: &[FieldMapping]) -> Vec<ValidationError> {
    mappings
        .iter()
        .filter(|fm| fm.required)
        .filter(|fm| record.get(&fm.target).is_none())
        .map(|fm| ValidationError::new("MISSING_REQUIRED_FIELD", format!("Required field {:?} is missing", fm.target), fm.target.clone()))
        .collect()
}

pub fn validate_currency_codes(record: &Value, currency_fields: &[&str]) -> Vec<ValidationError> {
    currency_fields
        .iter()
        .filter_map(|field| {
            let value = record.get(*field)?;
            let s = value.as_str()?.trim();
            if s.is_empty() || Currency::parse(s).is_some() {
                return None;
            }
            Some(ValidationError::new("INVALID_CURRENCY", format!("Invalid ISO 4217 currency code at {field}: {s}"), *field))
        })
        .collect()
}

pub fn validate_decimal_precision(record: &Value, decimal_fields: &[&str]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for field in decimal_fields {
        let Some(value) = record.get(*field) else { continue };
        let Some(d) = decimal_from_value(value) else { continue };
        let total_digits = digit_count(&d);
        let scale = d.scale();
        if scale > MAX_DECIMAL_PLACES {
            errors.push(ValidationError::new("DECIMAL_SCALE_EXCEEDED", format!("Value at {field} exceeds {MAX_DECIMAL_PLACES} decimal places"), *field));
        }
        if total_digits > MAX_DECIMAL_DIGITS {
            errors.push(ValidationError::new("DECIMAL_PRECISION_EXCEEDED", format!("Value at {field} exceeds {MAX_DECIMAL_DIGITS} digits"), *field));
        }
    }
    errors
}

fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}

fn digit_count(d: &Decimal) -> u32 {
    let mantissa = d.mantissa().unsigned_abs();
    if mantissa == 0 {
        1
    } else {
        mantissa.to_string().len() as u32
    }
}

pub fn validate_date_ranges(record: &Value, date_fields: &[&str], min_date: Option<NaiveDate>, max_date: Option<NaiveDate>) -> Vec<ValidationError> {
    let min_date = min_date.unwrap_or_else(|| NaiveDate::from_ymd_opt(1900, 1, 1).unwrap());
    let max_date = max_date.unwrap_or_else(|| NaiveDate::from_ymd_opt(2100, 12, 31).unwrap());
    let mut errors = Vec::new();
    for field in date_fields {
        let Some(value) = record.get(*field) else { continue };
        let Some(s) = value.as_str() else { continue };
        let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") else { continue };
        if d < min_date || d > max_date {
            errors.push(
                ValidationError::new("DATE_OUT_OF_RANGE", format!("Date at {field} is outside allowed range {min_date} to {max_date}"), *field)
                    .with_details(serde_json::json!({"value": d.to_string(), "min": min_date.to_string(), "max": max_date.to_string()})),
            );
        }
    }
    errors
}

/// Cross-record check over an entire staged batch: any field whose value
/// repeats across rows is flagged on every row that shares it (IM-14).
pub fn validate_batch_uniqueness(records: &[Value], fields: &[&str]) -> HashMap<usize, Vec<ValidationError>> {
    let mut result: HashMap<usize, Vec<ValidationError>> = HashMap::new();
    for field in fields {
        let mut value_to_indices: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, rec) in records.iter().enumerate() {
            let key = rec.get(*field).map(|v| v.to_string()).unwrap_or_default();
            value_to_indices.entry(key).or_default().push(i);
        }
        for (value, indices) in value_to_indices {
            if indices.len() > 1 {
                for i in &indices {
                    result.entry(*i).or_default().push(
                        ValidationError::new("DUPLICATE_VALUE_IN_BATCH", format!("Duplicate value for {field:?} in batch"), *field)
                            .with_details(serde_json::json!({"value": value, "row_indices": indices})),
                    );
                }
            }
        }
    }
    result
}

pub fn validate_party_code(record: &Value) -> Vec<ValidationError> {
    match record.get("code").and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => vec![],
        _ => vec![ValidationError::new("MISSING_REQUIRED_FIELD", "Party code is required", "code")],
    }
}

const ALLOWED_PARTY_TYPES: &[&str] = &["customer", "supplier", "employee", "intercompany", "vendor"];

pub fn validate_party_type(record: &Value) -> Vec<ValidationError> {
    let t = record.get("party_type").or_else(|| record.get("type")).and_then(Value::as_str);
    match t {
        Some(s) if !ALLOWED_PARTY_TYPES.contains(&s.to_lowercase().as_str()) => {
            vec![ValidationError::new("INVALID_PARTY_TYPE", format!("Party type must be one of {ALLOWED_PARTY_TYPES:?}"), "party_type")]
        }
        _ => vec![],
    }
}

pub fn validate_account_code_format(record: &Value) -> Vec<ValidationError> {
    match record.get("code").and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => vec![],
        _ => vec![ValidationError::new("MISSING_REQUIRED_FIELD", "Account code is required", "code")],
    }
}

/// Runs the pre-packaged validator profile for `entity_type` against one
/// mapped record. Entity types with purely referential checks (e.g.
/// `vendor_party_exists`) are not represented here; those require a live
/// lookup and belong in [`crate::promotion`] instead.
pub fn validate_entity(entity_type: &str, record: &Value) -> Vec<ValidationError> {
    match entity_type {
        "party" | "employee" => [validate_party_code(record), validate_party_type(record)].concat(),
        "vendor" | "customer" => [validate_party_code(record), validate_party_type(record)].concat(),
        "account" => validate_account_code_format(record),
        "item" => match record.get("code").and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => vec![],
            _ => vec![ValidationError::new("MISSING_REQUIRED_FIELD", "Item code is required", "code")],
        },
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_required_field_is_reported() {
        let mappings = vec![FieldMapping::required("Vendor Name", "name", acctkernel_schema::FieldType::String)];
        let errors = validate_required_fields(&json!({}), &mappings);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "MISSING_REQUIRED_FIELD");
    }

    #[test]
    fn invalid_currency_code_is_rejected() {
        let errors = validate_currency_codes(&json!({"currency": "ZZZ"}), &["currency"]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "INVALID_CURRENCY");
    }

    #[test]
    fn valid_currency_code_passes() {
        let errors = validate_currency_codes(&json!({"currency": "USD"}), &["currency"]);
        assert!(errors.is_empty());
    }

    #[test]
    fn excess_decimal_scale_is_rejected() {
        let errors = validate_decimal_precision(&json!({"amount": "1.1234567890"}), &["amount"]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "DECIMAL_SCALE_EXCEEDED");
    }

    #[test]
    fn date_outside_range_is_rejected() {
        let errors = validate_date_ranges(&json!({"effective_date": "1850-01-01"}), &["effective_date"], None, None);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "DATE_OUT_OF_RANGE");
    }

    #[test]
    fn duplicate_values_flag_every_sharing_row() {
        let records = vec![json!({"invoice_number": "INV-1"}), json!({"invoice_number": "INV-1"}), json!({"invoice_number": "INV-2"})];
        let result = validate_batch_uniqueness(&records, &["invoice_number"]);
        assert_eq!(result.len(), 2);
        assert!(result.contains_key(&0));
        assert!(result.contains_key(&1));
        assert!(!result.contains_key(&2));
    }
}
