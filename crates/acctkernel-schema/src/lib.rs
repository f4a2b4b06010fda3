//! Event schema registry and validator (§4.1).
//!
//! - [`field::FieldSchema`]/[`field::FieldType`] describe one payload field,
//!   scalar, nested object, or array.
//! - [`schema::EventSchema`] is the typed contract for one
//!   `(event_type, version)` pair.
//! - [`registry::SchemaRegistry`] is the startup-populated, read-only lookup
//!   table.
//! - [`validator`] walks a payload against a schema and validates that
//!   policy field references exist in a schema (P10).

pub mod field;
pub mod registry;
pub mod schema;
pub mod validator;

pub use field::{FieldConstraints, FieldSchema, FieldType};
pub use registry::{SchemaRegistry, SchemaRegistryError};
pub use schema::EventSchema;
pub use validator::{validate_field_references, validate_payload, ValidationError};
