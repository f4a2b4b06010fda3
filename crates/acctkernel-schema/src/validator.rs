//! Payload validation against an [`EventSchema`], and the field-reference
//! check the policy compiler uses to enforce P10 (every profile field
//! reference must exist in the registered schema).

use std::collections::BTreeSet;

use acctkernel_types::Currency;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::field::{FieldConstraints, FieldSchema, FieldType};
use crate::schema::EventSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
    pub field_path: String,
    pub details: Option<String>,
}

use serde::Serialize;

impl ValidationError {
    fn new(code: &'static str, field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), field_path: field_path.into(), details: None }
    }
}

/// Validate an entire payload against a schema, returning every violation
/// found (not just the first).
pub fn validate_payload(payload: &Value, schema: &EventSchema) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for field in &schema.fields {
        validate_field(payload, field, &field.name, &mut errors);
    }
    errors
}

fn validate_field(parent: &Value, field: &FieldSchema, path: &str, errors: &mut Vec<ValidationError>) {
    let value = parent.get(&field.name);

    let is_missing = matches!(value, None) || matches!(value, Some(Value::Null));
    if is_missing {
        if field.required && !field.nullable {
            errors.push(ValidationError::new("MISSING_REQUIRED_FIELD", path, format!("field '{path}' is required")));
        }
        return;
    }
    let value = value.expect("checked non-missing above");

    if !type_matches(value, field.field_type) {
        errors.push(ValidationError::new(
            "INVALID_TYPE",
            path,
            format!("field '{path}' expected type {:?}, found {}", field.field_type, value),
        ));
        return;
    }

    validate_constraints(value, &field.constraints, field.field_type, path, errors);

    match field.field_type {
        FieldType::Object => {
            for nested in &field.nested_fields {
                let nested_path = format!("{path}.{}", nested.name);
                validate_field(value, nested, &nested_path, errors);
            }
        }
        FieldType::Array => {
            if let (Some(item_schema), Value::Array(items)) = (&field.item_schema, value) {
                for (idx, item) in items.iter().enumerate() {
                    let item_path = format!("{path}[{idx}]");
                    let wrapper = serde_json::json!({ item_schema.name.clone(): item });
                    validate_field(&wrapper, item_schema, &item_path, errors);
                }
            }
        }
        FieldType::Currency => {
            if let Some(code) = value.as_str() {
                if Currency::parse(code).is_none() {
                    errors.push(ValidationError::new(
                        "INVALID_CURRENCY",
                        path,
                        format!("'{code}' is not a recognized ISO 4217 currency code"),
                    ));
                }
            }
        }
        _ => {}
    }
}

fn type_matches(value: &Value, field_type: FieldType) -> bool {
    match field_type {
        FieldType::String | FieldType::Currency | FieldType::Uuid | FieldType::Date | FieldType::DateTime => {
            value.is_string()
        }
        FieldType::Integer => value.is_i64() || value.is_u64(),
        FieldType::Decimal => value.is_number() || value.as_str().map(|s| s.parse::<Decimal>().is_ok()).unwrap_or(false),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Object => value.is_object(),
        FieldType::Array => value.is_array(),
    }
}

fn validate_constraints(
    value: &Value,
    constraints: &FieldConstraints,
    field_type: FieldType,
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    if let Some(allowed) = &constraints.allowed_values {
        if !allowed.contains(value) {
            errors.push(ValidationError::new(
                "VALUE_NOT_ALLOWED",
                path,
                format!("'{value}' is not among the allowed values for '{path}'"),
            ));
        }
    }

    match field_type {
        FieldType::Integer | FieldType::Decimal => {
            if let Some(actual) = to_decimal(value) {
                if let Some(min) = constraints.min_value {
                    if actual < min {
                        errors.push(ValidationError::new("VALUE_TOO_SMALL", path, format!("'{path}' must be >= {min}")));
                    }
                }
                if let Some(max) = constraints.max_value {
                    if actual > max {
                        errors.push(ValidationError::new("VALUE_TOO_LARGE", path, format!("'{path}' must be <= {max}")));
                    }
                }
                if field_type == FieldType::Decimal {
                    let scale = actual.scale();
                    let digits = actual.mantissa().unsigned_abs().to_string().len() as u32;
                    if digits > 38 {
                        errors.push(ValidationError::new(
                            "DECIMAL_PRECISION_EXCEEDED",
                            path,
                            format!("'{path}' exceeds 38 total digits"),
                        ));
                    }
                    if scale > 9 {
                        errors.push(ValidationError::new(
                            "DECIMAL_SCALE_EXCEEDED",
                            path,
                            format!("'{path}' exceeds 9 fractional digits"),
                        ));
                    }
                }
            }
        }
        FieldType::String => {
            if let Some(s) = value.as_str() {
                if let Some(min) = constraints.min_length {
                    if s.len() < min {
                        errors.push(ValidationError::new(
                            "VALUE_TOO_SMALL",
                            path,
                            format!("'{path}' must be at least {min} characters"),
                        ));
                    }
                }
                if let Some(max) = constraints.max_length {
                    if s.len() > max {
                        errors.push(ValidationError::new(
                            "VALUE_TOO_LARGE",
                            path,
                            format!("'{path}' must be at most {max} characters"),
                        ));
                    }
                }
                if let Some(pattern) = &constraints.pattern {
                    match Regex::new(pattern) {
                        Ok(re) if !re.is_match(s) => {
                            errors.push(ValidationError::new(
                                "PATTERN_MISMATCH",
                                path,
                                format!("'{path}' does not match pattern {pattern}"),
                            ));
                        }
                        Ok(_) => {}
                        Err(e) => errors.push(ValidationError::new(
                            "PATTERN_MISMATCH",
                            path,
                            format!("invalid pattern for '{path}': {e}"),
                        )),
                    }
                }
            }
        }
        _ => {}
    }
}

fn to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Check that every path in `paths` exists in `schema.all_field_paths()`
/// (array-item paths are matched against their `[*]` declaration).
/// This is the mechanism by which the policy compiler enforces P10: every
/// profile field reference must name a field the event schema declares.
pub fn validate_field_references(paths: &BTreeSet<String>, schema: &EventSchema) -> Vec<ValidationError> {
    let declared = schema.all_field_paths();
    paths
        .iter()
        .filter(|p| !declared.contains(p.as_str()))
        .map(|p| ValidationError::new("INVALID_FIELD_REFERENCE", p, format!("field reference '{p}' is not declared in schema {}:v{}", schema.event_type, schema.version)))
        .collect()
}
