//! Mapping engine: pure transformation from a raw source row to a typed
//! mapped record. Zero I/O. A CSV/XLSX row arrives as strings; this module
//! turns those strings into the typed values the coordinator expects.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use acctkernel_schema::FieldType;

use crate::validate::ValidationError;

/// One column-to-field rule within a named mapping profile (e.g.
/// `"qb_vendors"`). `source` names the raw column key (already
/// lowercased/trimmed by the adapter); `target` is the dot-path the mapped
/// record exposes that value under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source: String,
    pub target: String,
    pub field_type: FieldType,
    pub required: bool,
    pub default: Option<Value>,
    pub transform: Option<String>,
    /// Format hint for `Date` coercion, e.g. `"%m/%d/%Y"`. Tried before the
    /// standard fallback formats.
    pub format: Option<String>,
}

/// A batch-scoped uniqueness/cross-record rule declared on an
/// [`ImportMapping`]. `rule_type` is currently only `"unique"`, scoped to
/// `"batch"`; other rule types (referential, expression) are left for a
/// future extension and are simply ignored by [`crate::service::ImportService`]
/// today.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportValidationRule {
    pub rule_type: String,
    pub fields: Vec<String>,
    pub scope: String,
    pub reference_entity: Option<String>,
    pub expression: Option<String>,
    pub message: Option<String>,
}

/// A named, versioned import profile: which adapter reads the file, how
/// each column maps to a typed field, and what batch-level rules apply.
/// Frozen at batch-creation time via [`crate::staging::mapping_hash`] so a
/// later edit to the profile never silently reinterprets an already-staged
/// batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportMapping {
    pub name: String,
    pub version: u32,
    pub entity_type: String,
    pub source_format: String,
    #[serde(default)]
    pub source_options: crate::adapter::AdapterOptions,
    pub field_mappings: Vec<FieldMapping>,
    #[serde(default)]
    pub validations: Vec<ImportValidationRule>,
    pub dependency_tier: u32,
}

impl ImportMapping {
    pub fn currency_fields(&self) -> Vec<&str> {
        self.field_mappings.iter().filter(|fm| fm.field_type == FieldType::Currency).map(|fm| fm.target.as_str()).collect()
    }

    pub fn decimal_fields(&self) -> Vec<&str> {
        self.field_mappings.iter().filter(|fm| fm.field_type == FieldType::Decimal).map(|fm| fm.target.as_str()).collect()
    }

    pub fn date_fields(&self) -> Vec<&str> {
        self.field_mappings.iter().filter(|fm| matches!(fm.field_type, FieldType::Date | FieldType::DateTime)).map(|fm| fm.target.as_str()).collect()
    }

    pub fn batch_unique_fields(&self) -> Vec<&str> {
        self.validations.iter().filter(|r| r.rule_type == "unique" && r.scope == "batch").flat_map(|r| r.fields.iter().map(String::as_str)).collect()
    }
}

impl FieldMapping {
    pub fn required(source: impl Into<String>, target: impl Into<String>, field_type: FieldType) -> Self {
        Self { source: source.into(), target: target.into(), field_type, required: true, default: None, transform: None, format: None }
    }

    pub fn optional(source: impl Into<String>, target: impl Into<String>, field_type: FieldType) -> Self {
        Self { source: source.into(), target: target.into(), field_type, required: false, default: None, transform: None, format: None }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_transform(mut self, transform: impl Into<String>) -> Self {
        self.transform = Some(transform.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct MappingResult {
    pub mapped_data: serde_json::Map<String, Value>,
    pub errors: Vec<ValidationError>,
}

impl MappingResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CoercionResult {
    pub value: Option<Value>,
    pub error: Option<ValidationError>,
}

impl CoercionResult {
    fn ok(value: Value) -> Self {
        Self { value: Some(value), error: None }
    }

    fn err(error: ValidationError) -> Self {
        Self { value: None, error: Some(error) }
    }
}

/// Apply a named, order-independent transform ahead of type coercion. An
/// unrecognized transform name is a no-op rather than an error — a mapping
/// profile author shouldn't be able to break ingestion with a typo in a
/// cosmetic transform.
pub fn apply_transform(value: &Value, transform: &str) -> Value {
    let t = transform.trim().to_lowercase();
    match t.as_str() {
        "strip" | "trim" => match value.as_str() {
            Some(s) => Value::String(s.trim().to_string()),
            None => value.clone(),
        },
        "upper" => match value.as_str() {
            Some(s) => Value::String(s.to_uppercase()),
            None => value.clone(),
        },
        "lower" => match value.as_str() {
            Some(s) => Value::String(s.to_lowercase()),
            None => value.clone(),
        },
        "to_decimal" => match value {
            Value::Number(n) => Value::String(n.to_string()),
            Value::String(s) => match s.trim().parse::<Decimal>() {
                Ok(d) => Value::String(d.to_string()),
                Err(_) => value.clone(),
            },
            _ => value.clone(),
        },
        "normalize_date" => match value.as_str() {
            Some(s) => match parse_date_any_format(s, None) {
                Some(d) => Value::String(d.format("%Y-%m-%d").to_string()),
                None => value.clone(),
            },
            None => value.clone(),
        },
        _ => value.clone(),
    }
}

const FALLBACK_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y"];

fn parse_date_any_format(s: &str, preferred: Option<&str>) -> Option<NaiveDate> {
    let s = s.trim();
    let mut formats = Vec::with_capacity(FALLBACK_DATE_FORMATS.len() + 1);
    if let Some(fmt) = preferred {
        formats.push(fmt);
    }
    formats.extend_from_slice(FALLBACK_DATE_FORMATS);
    formats.into_iter().find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Coerce a raw string into `field_type`. Only called when the transformed
/// value is still a string and the target type is not itself `String`.
pub fn coerce_from_string(value: &str, field_type: FieldType, format: Option<&str>) -> CoercionResult {
    let s = value.trim();
    if s.is_empty() && field_type != FieldType::String {
        return CoercionResult::err(ValidationError::new("MISSING_VALUE", "Empty value cannot be coerced to non-string type", ""));
    }

    match field_type {
        FieldType::String => CoercionResult::ok(Value::String(s.to_string())),
        FieldType::Integer => match s.parse::<Decimal>().ok().and_then(|d| d.trunc().to_string().parse::<i64>().ok()) {
            Some(i) => CoercionResult::ok(Value::from(i)),
            None => CoercionResult::err(ValidationError::new("INVALID_INTEGER", format!("Cannot coerce to integer: {s:?}"), "")),
        },
        FieldType::Decimal => match s.parse::<Decimal>() {
            Ok(d) => CoercionResult::ok(Value::String(d.to_string())),
            Err(_) => CoercionResult::err(ValidationError::new("INVALID_DECIMAL", format!("Cannot coerce to decimal: {s:?}"), "")),
        },
        FieldType::Boolean => {
            let low = s.to_lowercase();
            if ["true", "yes", "1", "on"].contains(&low.as_str()) {
                CoercionResult::ok(Value::Bool(true))
            } else if ["false", "no", "0", "off", ""].contains(&low.as_str()) {
                CoercionResult::ok(Value::Bool(false))
            } else {
                CoercionResult::err(ValidationError::new("INVALID_BOOLEAN", format!("Cannot coerce to boolean: {s:?}"), ""))
            }
        }
        FieldType::Date => match parse_date_any_format(s, format) {
            Some(d) => CoercionResult::ok(Value::String(d.format("%Y-%m-%d").to_string())),
            None => CoercionResult::err(ValidationError::new("INVALID_DATE_FORMAT", format!("Cannot parse date: {s:?}"), "")),
        },
        FieldType::DateTime => match chrono::DateTime::parse_from_rfc3339(&s.replace('Z', "+00:00")) {
            Ok(dt) => CoercionResult::ok(Value::String(dt.to_rfc3339())),
            Err(_) => CoercionResult::err(ValidationError::new("INVALID_DATETIME_FORMAT", format!("Cannot parse datetime: {s:?}"), "")),
        },
        FieldType::Uuid => match uuid::Uuid::parse_str(s) {
            Ok(u) => CoercionResult::ok(Value::String(u.to_string())),
            Err(_) => CoercionResult::err(ValidationError::new("INVALID_UUID_FORMAT", format!("Invalid UUID: {s:?}"), "")),
        },
        FieldType::Currency => CoercionResult::ok(Value::String(s.to_string())),
        FieldType::Object => match serde_json::from_str::<Value>(s) {
            Ok(v @ Value::Object(_)) => CoercionResult::ok(v),
            _ => CoercionResult::err(ValidationError::new("INVALID_JSON", format!("Cannot parse object from: {:?}", truncate(s)), "")),
        },
        FieldType::Array => match serde_json::from_str::<Value>(s) {
            Ok(v @ Value::Array(_)) => CoercionResult::ok(v),
            _ => CoercionResult::err(ValidationError::new("INVALID_JSON_ARRAY", format!("Cannot parse array from: {:?}", truncate(s)), "")),
        },
    }
}

fn truncate(s: &str) -> &str {
    &s[..s.len().min(50)]
}

/// Apply every mapping in `field_mappings` to one raw source row. A
/// required field that is missing or blank is an error; an optional field
/// falls back to its declared default, or is simply omitted.
pub fn apply_mapping(raw_data: &Value, field_mappings: &[FieldMapping]) -> MappingResult {
    let mut mapped = serde_json::Map::new();
    let mut errors = Vec::new();

    for fm in field_mappings {
        let raw_value = raw_data.get(&fm.source);
        let is_blank = match raw_value {
            None => true,
            Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            _ => false,
        };

        if is_blank {
            if fm.required {
                errors.push(ValidationError::new("MISSING_REQUIRED_FIELD", format!("Required field {:?} is missing", fm.source), fm.target.clone()));
            } else if let Some(default) = &fm.default {
                mapped.insert(fm.target.clone(), default.clone());
            }
            continue;
        }
        let raw_value = raw_value.expect("checked non-missing above");

        let mut value = match &fm.transform {
            Some(t) => apply_transform(raw_value, t),
            None => raw_value.clone(),
        };

        if fm.field_type == FieldType::String {
            if let Value::Number(n) = &value {
                value = Value::String(n.to_string());
            }
        }

        if let Value::String(s) = &value {
            if fm.field_type != FieldType::String {
                let coerced = coerce_from_string(s, fm.field_type, fm.format.as_deref());
                match coerced.value {
                    Some(v) => value = v,
                    None => {
                        errors.push(coerced.error.expect("coercion failure carries an error"));
                        continue;
                    }
                }
            }
        }

        mapped.insert(fm.target.clone(), value);
    }

    MappingResult { mapped_data: mapped, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mappings() -> Vec<FieldMapping> {
        vec![
            FieldMapping::required("vendor name", "name", FieldType::String).with_transform("strip"),
            FieldMapping::required("amount", "amount", FieldType::Decimal),
            FieldMapping::optional("active", "is_active", FieldType::Boolean).with_default(json!(true)),
            FieldMapping::optional("invoice date", "invoice_date", FieldType::Date).with_format("%m/%d/%Y"),
        ]
    }

    #[test]
    fn maps_and_coerces_typed_values() {
        let raw = json!({"vendor name": "  Acme Corp  ", "amount": "1234.5600", "invoice date": "03/15/2026"});
        let result = apply_mapping(&raw, &mappings());
        assert!(result.is_success(), "{:?}", result.errors);
        assert_eq!(result.mapped_data["name"], json!("Acme Corp"));
        assert_eq!(result.mapped_data["amount"], json!("1234.5600"));
        assert_eq!(result.mapped_data["invoice_date"], json!("2026-03-15"));
        assert_eq!(result.mapped_data["is_active"], json!(true));
    }

    #[test]
    fn missing_required_field_is_reported_and_skipped() {
        let raw = json!({"amount": "10.00"});
        let result = apply_mapping(&raw, &mappings());
        assert!(!result.is_success());
        assert!(result.errors.iter().any(|e| e.code == "MISSING_REQUIRED_FIELD" && e.field == "name"));
        assert!(!result.mapped_data.contains_key("name"));
    }

    #[test]
    fn invalid_decimal_string_produces_coercion_error() {
        let raw = json!({"vendor name": "Acme", "amount": "not-a-number"});
        let result = apply_mapping(&raw, &mappings());
        assert!(result.errors.iter().any(|e| e.code == "INVALID_DECIMAL"));
    }

    #[test]
    fn boolean_coercion_recognizes_common_spellings() {
        assert_eq!(coerce_from_string("yes", FieldType::Boolean, None).value, Some(json!(true)));
        assert_eq!(coerce_from_string("0", FieldType::Boolean, None).value, Some(json!(false)));
        assert!(coerce_from_string("maybe", FieldType::Boolean, None).error.is_some());
    }

    #[test]
    fn normalize_date_transform_handles_multiple_source_formats() {
        assert_eq!(apply_transform(&json!("03/15/2026"), "normalize_date"), json!("2026-03-15"));
        assert_eq!(apply_transform(&json!("2026/03/15"), "normalize_date"), json!("2026-03-15"));
    }
}
