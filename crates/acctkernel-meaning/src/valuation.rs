//! Versioned valuation models and resolver.
//!
//! A valuation model is a named, versioned, pure function from payload to
//! amount — never an inline expression on the policy itself, so that two
//! policies referencing `"standard_receipt_v1"` are guaranteed to price
//! identically.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::field_path::get_field_value;
use acctkernel_types::Currency;

#[derive(Debug, Clone, PartialEq)]
pub struct ValuationResult {
    pub value: Decimal,
    pub currency: Currency,
    pub model_id: String,
    pub model_version: u32,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValuationError {
    #[error("valuation model not found: {model_id} (version {version:?})")]
    ModelNotFound { model_id: String, version: Option<u32> },
    #[error("currency field '{currency_field}' not found or unrecognized in payload")]
    CurrencyMissing { currency_field: String },
    #[error("valuation computation returned no value")]
    ComputationNull,
}

pub type ComputeFn = fn(&Value) -> Option<Decimal>;

#[derive(Clone)]
pub struct ValuationModel {
    pub model_id: &'static str,
    pub version: u32,
    pub description: &'static str,
    pub currency_field: &'static str,
    pub uses_fields: &'static [&'static str],
    pub compute: ComputeFn,
}

impl ValuationModel {
    pub fn model_key(&self) -> String {
        format!("{}:v{}", self.model_id, self.version)
    }
}

#[derive(Default)]
pub struct ValuationModelRegistry {
    models: HashMap<&'static str, HashMap<u32, ValuationModel>>,
}

impl ValuationModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-seeded with the kernel's standard models.
    pub fn with_standard_models() -> Self {
        let mut registry = Self::new();
        registry.register(STANDARD_RECEIPT_V1);
        registry.register(FIXED_AMOUNT_V1);
        registry
    }

    pub fn register(&mut self, model: ValuationModel) {
        self.models.entry(model.model_id).or_default().insert(model.version, model);
    }

    pub fn get(&self, model_id: &str, version: Option<u32>) -> Result<&ValuationModel, ValuationError> {
        let versions = self
            .models
            .get(model_id)
            .ok_or_else(|| ValuationError::ModelNotFound { model_id: model_id.to_string(), version })?;
        match version {
            Some(v) => versions
                .get(&v)
                .ok_or_else(|| ValuationError::ModelNotFound { model_id: model_id.to_string(), version }),
            None => {
                let latest = versions.keys().max().copied().ok_or_else(|| ValuationError::ModelNotFound {
                    model_id: model_id.to_string(),
                    version: None,
                })?;
                Ok(&versions[&latest])
            }
        }
    }

    pub fn has_model(&self, model_id: &str, version: Option<u32>) -> bool {
        match self.models.get(model_id) {
            None => false,
            Some(versions) => match version {
                Some(v) => versions.contains_key(&v),
                None => !versions.is_empty(),
            },
        }
    }
}

pub struct ValuationResolver<'r> {
    registry: &'r ValuationModelRegistry,
}

impl<'r> ValuationResolver<'r> {
    pub fn new(registry: &'r ValuationModelRegistry) -> Self {
        Self { registry }
    }

    pub fn resolve(
        &self,
        model_id: &str,
        payload: &Value,
        model_version: Option<u32>,
    ) -> Result<ValuationResult, ValuationError> {
        let model = self.registry.get(model_id, model_version)?;

        let currency_value = get_field_value(payload, model.currency_field)
            .ok_or_else(|| ValuationError::CurrencyMissing { currency_field: model.currency_field.to_string() })?;
        let currency_code = currency_value.as_str().unwrap_or_default();
        let currency = Currency::parse(currency_code)
            .ok_or_else(|| ValuationError::CurrencyMissing { currency_field: model.currency_field.to_string() })?;

        let value = (model.compute)(payload).ok_or(ValuationError::ComputationNull)?;

        Ok(ValuationResult {
            value,
            currency,
            model_id: model.model_id.to_string(),
            model_version: model.version,
        })
    }
}

fn quantity_times_unit_price(payload: &Value) -> Option<Decimal> {
    let quantity = get_field_value(payload, "quantity")?;
    let unit_price = get_field_value(payload, "unit_price")?;
    let quantity: Decimal = json_to_decimal(quantity)?;
    let unit_price: Decimal = json_to_decimal(unit_price)?;
    Some(quantity * unit_price)
}

fn fixed_amount(payload: &Value) -> Option<Decimal> {
    let amount = get_field_value(payload, "amount")?;
    json_to_decimal(amount)
}

fn json_to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub const STANDARD_RECEIPT_V1: ValuationModel = ValuationModel {
    model_id: "standard_receipt_v1",
    version: 1,
    description: "Standard receipt valuation: quantity * unit_price",
    currency_field: "currency",
    uses_fields: &["quantity", "unit_price", "currency"],
    compute: quantity_times_unit_price,
};

pub const FIXED_AMOUNT_V1: ValuationModel = ValuationModel {
    model_id: "fixed_amount_v1",
    version: 1,
    description: "Fixed amount taken directly from the payload",
    currency_field: "currency",
    uses_fields: &["amount", "currency"],
    compute: fixed_amount,
};

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn standard_receipt_multiplies_quantity_by_price() {
        let registry = ValuationModelRegistry::with_standard_models();
        let resolver = ValuationResolver::new(&registry);
        let payload = json!({"quantity": 3, "unit_price": "19.99", "currency": "USD"});
        let result = resolver.resolve("standard_receipt_v1", &payload, None).unwrap();
        assert_eq!(result.value, dec!(59.97));
        assert_eq!(result.currency, Currency::USD);
    }

    #[test]
    fn missing_model_is_an_error() {
        let registry = ValuationModelRegistry::with_standard_models();
        let resolver = ValuationResolver::new(&registry);
        let err = resolver.resolve("nonexistent", &json!({}), None).unwrap_err();
        assert!(matches!(err, ValuationError::ModelNotFound { .. }));
    }

    #[test]
    fn missing_currency_field_is_an_error() {
        let registry = ValuationModelRegistry::with_standard_models();
        let resolver = ValuationResolver::new(&registry);
        let payload = json!({"amount": 10});
        let err = resolver.resolve("fixed_amount_v1", &payload, None).unwrap_err();
        assert!(matches!(err, ValuationError::CurrencyMissing { .. }));
    }

    #[test]
    fn fixed_amount_reads_amount_field() {
        let registry = ValuationModelRegistry::with_standard_models();
        let resolver = ValuationResolver::new(&registry);
        let payload = json!({"amount": "250.00", "currency": "EUR"});
        let result = resolver.resolve("fixed_amount_v1", &payload, None).unwrap();
        assert_eq!(result.value, dec!(250.00));
    }
}
