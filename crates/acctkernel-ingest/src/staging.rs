//! Staging types (§3 "ImportBatch" / "ImportRecord"): the durable
//! representation of a source file between adapter read and promotion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validate::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportBatchStatus {
    Loading,
    Staged,
    Validated,
    Completed,
    Failed,
}

impl ImportBatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "LOADING",
            Self::Staged => "STAGED",
            Self::Validated => "VALIDATED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportRecordStatus {
    Staged,
    Valid,
    Invalid,
    Promoted,
    PromotionFailed,
    Skipped,
}

impl ImportRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staged => "STAGED",
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
            Self::Promoted => "PROMOTED",
            Self::PromotionFailed => "PROMOTION_FAILED",
            Self::Skipped => "SKIPPED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatch {
    pub id: Uuid,
    pub mapping_name: String,
    pub mapping_version: u32,
    /// sha-256 (truncated to 64 hex chars, i.e. the full digest) of
    /// `"{name}:{version}"`, frozen at creation so a later mapping edit
    /// cannot silently change how an already-staged batch is interpreted.
    pub mapping_hash: String,
    pub entity_type: String,
    pub source_filename: String,
    pub status: ImportBatchStatus,
    pub total_records: u32,
    pub valid_records: u32,
    pub invalid_records: u32,
    pub promoted_records: u32,
    pub skipped_records: u32,
    pub failed_records: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportBatch {
    pub fn new(mapping_name: impl Into<String>, mapping_version: u32, entity_type: impl Into<String>, source_filename: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mapping_name = mapping_name.into();
        Self {
            id: Uuid::new_v4(),
            mapping_hash: mapping_hash(&mapping_name, mapping_version),
            mapping_name,
            mapping_version,
            entity_type: entity_type.into(),
            source_filename: source_filename.into(),
            status: ImportBatchStatus::Loading,
            total_records: 0,
            valid_records: 0,
            invalid_records: 0,
            promoted_records: 0,
            skipped_records: 0,
            failed_records: 0,
            error_message: None,
            created_at: now,
            completed_at: None,
        }
    }
}

pub fn mapping_hash(name: &str, version: u32) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(format!("{name}:{version}").as_bytes()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRecord {
    pub id: Uuid,
    pub batch_id: Uuid,
    /// 1-based, preserves the source row's original position in the file.
    pub source_row: u32,
    pub entity_type: String,
    pub status: ImportRecordStatus,
    /// Unmodified source dict (IM-9: preserved regardless of mapping outcome).
    pub raw_data: serde_json::Value,
    pub mapped_data: Option<serde_json::Value>,
    pub validation_errors: Vec<ValidationError>,
    pub promoted_entity_id: Option<Uuid>,
    pub promoted_at: Option<DateTime<Utc>>,
}

impl ImportRecord {
    pub fn new(batch_id: Uuid, source_row: u32, entity_type: impl Into<String>, raw_data: serde_json::Value, mapped_data: Option<serde_json::Value>, validation_errors: Vec<ValidationError>) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id,
            source_row,
            entity_type: entity_type.into(),
            status: ImportRecordStatus::Staged,
            raw_data,
            mapped_data,
            validation_errors,
            promoted_entity_id: None,
            promoted_at: None,
        }
    }
}
