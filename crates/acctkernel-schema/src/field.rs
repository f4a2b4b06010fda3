//! Field-level type contracts for an [`crate::EventSchema`].
//!
//! A field is either a scalar (with optional numeric/string/enum
//! constraints), an object with its own nested fields, or an array whose
//! items are validated against an item [`FieldSchema`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    DateTime,
    Uuid,
    Currency,
    Object,
    Array,
}

/// Constraints narrowing a scalar field beyond its [`FieldType`]. Which
/// members are consulted depends on the field's type: numeric bounds for
/// `Integer`/`Decimal`, length/pattern for `String`, `allowed_values` for
/// any scalar.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldConstraints {
    pub min_value: Option<rust_decimal::Decimal>,
    pub max_value: Option<rust_decimal::Decimal>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
    pub allowed_values: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub nullable: bool,
    #[serde(default)]
    pub constraints: FieldConstraints,
    /// Populated when `field_type == Object`.
    #[serde(default)]
    pub nested_fields: Vec<FieldSchema>,
    /// Populated when `field_type == Array`; describes one array item.
    pub item_schema: Option<Box<FieldSchema>>,
}

impl FieldSchema {
    pub fn scalar(name: impl Into<String>, field_type: FieldType, required: bool) -> Self {
        Self {
            name: name.into(),
            field_type,
            required,
            nullable: false,
            constraints: FieldConstraints::default(),
            nested_fields: Vec::new(),
            item_schema: None,
        }
    }

    pub fn with_constraints(mut self, constraints: FieldConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}
