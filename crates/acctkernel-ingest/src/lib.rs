//! Ingestion pipeline (§4.11): source adapters -> mapping engine -> staging
//! -> validators -> promotion. Pure core (mapping, validators) with I/O
//! confined to [`adapter::SourceAdapter`] and the [`service::ImportStore`] /
//! [`promotion::EntityPromoter`] impure-shell traits the database crate
//! implements.

pub mod adapter;
pub mod journal_promotion;
pub mod mapping;
pub mod promotion;
pub mod service;
pub mod staging;
pub mod validate;

pub use adapter::{AdapterError, AdapterOptions, CsvAdapter, JsonAdapter, SourceAdapter, SourceProbe, XlsxAdapter};
pub use journal_promotion::{deterministic_event_id, JournalPromoter};
pub use mapping::{apply_mapping, apply_transform, coerce_from_string, CoercionResult, FieldMapping, ImportMapping, ImportValidationRule, MappingResult};
pub use promotion::{EntityPromoter, PreflightGraph, PromoteOutcome, PromotionError, PromotionFailure, PromotionResult, PromotionService};
pub use service::{ImportError, ImportService, ImportStore, MappingRegistry};
pub use staging::{mapping_hash, ImportBatch, ImportBatchStatus, ImportRecord, ImportRecordStatus};
pub use validate::{
    validate_account_code_format, validate_batch_uniqueness, validate_currency_codes, validate_date_ranges,
    validate_decimal_precision, validate_entity, validate_party_code, validate_party_type, validate_required_fields,
    ValidationError,
};
