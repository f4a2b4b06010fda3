//! Import service: load -> stage -> validate (§4.11). Orchestrates source
//! adapters, the mapping engine, and record validators against an
//! [`ImportStore`] impure shell.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::adapter::{AdapterError, SourceAdapter, SourceProbe};
use crate::mapping::{apply_mapping, ImportMapping};
use crate::staging::{ImportBatch, ImportBatchStatus, ImportRecord, ImportRecordStatus};
use crate::validate::{validate_batch_uniqueness, validate_currency_codes, validate_date_ranges, validate_decimal_precision, validate_entity, validate_required_fields, ValidationError};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("batch not found: {0}")]
    BatchNotFound(Uuid),
    #[error("record not found: {0}")]
    RecordNotFound(Uuid),
    #[error("no adapter registered for source format {0:?}")]
    NoAdapterForFormat(String),
    #[error("mapping not found: {0}")]
    MappingNotFound(String),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, ImportError>;

/// The impure shell an [`ImportService`] persists batches and records
/// through. One implementation per storage backend.
pub trait ImportStore {
    fn insert_batch(&mut self, batch: &ImportBatch) -> Result<()>;
    fn get_batch(&self, batch_id: Uuid) -> Result<Option<ImportBatch>>;
    fn update_batch(&mut self, batch: &ImportBatch) -> Result<()>;
    fn insert_records(&mut self, records: &[ImportRecord]) -> Result<()>;
    fn list_records(&self, batch_id: Uuid) -> Result<Vec<ImportRecord>>;
    fn update_records(&mut self, records: &[ImportRecord]) -> Result<()>;
    fn get_record(&self, record_id: Uuid) -> Result<Option<ImportRecord>>;

    /// Opens the outer transaction a promotion batch's writes run inside
    /// (IM-15: "nest[ed] inside the outer transaction"). The default is a
    /// no-op for stores with no real transaction to open (the in-memory
    /// test double).
    fn begin_batch(&mut self) -> Result<()> {
        Ok(())
    }

    /// Commits the transaction [`Self::begin_batch`] opened.
    fn commit_batch(&mut self) -> Result<()> {
        Ok(())
    }

    /// Rolls back the transaction [`Self::begin_batch`] opened, for when
    /// the batch itself cannot proceed (e.g. the batch row never loaded).
    fn rollback_batch(&mut self) -> Result<()> {
        Ok(())
    }

    /// Runs `body` -- one record's duplicate-check and promote call --
    /// inside a `SAVEPOINT` nested in the batch's outer transaction (IM-15).
    /// A `body` that returns `Err` has its savepoint rolled back, undoing
    /// only that record's writes; `Ok` releases the savepoint. Neither
    /// outcome touches the outer transaction or any sibling record already
    /// released into it. The default runs `body` directly and passes its
    /// result through, since a store with no real transaction has nothing
    /// to roll back.
    fn with_record_savepoint(&mut self, body: &mut dyn FnMut() -> std::result::Result<(), String>) -> Result<std::result::Result<(), String>> {
        Ok(body())
    }
}

/// Resolves a named mapping profile. Implemented against a config file, a
/// database table, or (in tests) a plain `HashMap`.
pub trait MappingRegistry {
    fn get(&self, name: &str) -> Option<ImportMapping>;
}

impl MappingRegistry for HashMap<String, ImportMapping> {
    fn get(&self, name: &str) -> Option<ImportMapping> {
        HashMap::get(self, name).cloned()
    }
}

pub struct ImportService {
    adapters: HashMap<String, Box<dyn SourceAdapter>>,
}

impl Default for ImportService {
    fn default() -> Self {
        let mut adapters: HashMap<String, Box<dyn SourceAdapter>> = HashMap::new();
        adapters.insert("csv".to_string(), Box::new(crate::adapter::CsvAdapter));
        adapters.insert("json".to_string(), Box::new(crate::adapter::JsonAdapter));
        adapters.insert("xlsx".to_string(), Box::new(crate::adapter::XlsxAdapter));
        Self { adapters }
    }
}

impl ImportService {
    pub fn new() -> Self {
        Self::default()
    }

    fn adapter_for(&self, format: &str) -> Result<&dyn SourceAdapter> {
        self.adapters.get(format).map(|b| b.as_ref()).ok_or_else(|| ImportError::NoAdapterForFormat(format.to_string()))
    }

    pub fn probe_source(&self, source_path: &std::path::Path, mapping: &ImportMapping) -> Result<SourceProbe> {
        Ok(self.adapter_for(&mapping.source_format)?.probe(source_path, &mapping.source_options)?)
    }

    /// Reads the source file through its adapter, maps every row, and
    /// stages the batch and its records (IM-3, IM-9, IM-11). The batch
    /// status lands on `Staged` regardless of per-row mapping failures —
    /// those surface as `INVALID`-bound records once [`Self::validate_batch`]
    /// runs, not as a hard stop here.
    pub fn load_batch(&self, store: &mut dyn ImportStore, source_path: &std::path::Path, mapping: &ImportMapping, now: DateTime<Utc>) -> Result<ImportBatch> {
        let adapter = self.adapter_for(&mapping.source_format)?;
        let source_filename = source_path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

        let mut batch = ImportBatch::new(mapping.name.clone(), mapping.version, mapping.entity_type.clone(), source_filename, now);
        let raw_rows = adapter.read(source_path, &mapping.source_options)?;

        let mut records = Vec::with_capacity(raw_rows.len());
        for (i, raw_row) in raw_rows.into_iter().enumerate() {
            let raw_value = Value::Object(raw_row.clone());
            let mapping_result = apply_mapping(&raw_value, &mapping.field_mappings);
            let mapped_data = mapping_result.is_success().then(|| Value::Object(mapping_result.mapped_data));
            records.push(ImportRecord::new(batch.id, (i + 1) as u32, mapping.entity_type.clone(), raw_value, mapped_data, mapping_result.errors));
        }

        batch.total_records = records.len() as u32;
        batch.status = ImportBatchStatus::Staged;

        store.insert_batch(&batch)?;
        store.insert_records(&records)?;
        Ok(batch)
    }

    /// Runs the full record-level and batch-level validator set over every
    /// staged record, updates each record's status and the batch's tallies.
    pub fn validate_batch(&self, store: &mut dyn ImportStore, registry: &dyn MappingRegistry, batch_id: Uuid, min_date: Option<chrono::NaiveDate>, max_date: Option<chrono::NaiveDate>) -> Result<ImportBatch> {
        let mut batch = store.get_batch(batch_id)?.ok_or(ImportError::BatchNotFound(batch_id))?;
        let Some(mapping) = registry.get(&batch.mapping_name) else {
            batch.error_message = Some(format!("Mapping not found: {}", batch.mapping_name));
            store.update_batch(&batch)?;
            return Ok(batch);
        };

        let mut records = store.list_records(batch_id)?;
        records.sort_by_key(|r| r.source_row);

        let unique_fields = mapping.batch_unique_fields();
        let batch_errors_by_index = if unique_fields.is_empty() {
            HashMap::new()
        } else {
            let mapped: Vec<Value> = records.iter().map(|r| r.mapped_data.clone().unwrap_or(Value::Object(Default::default()))).collect();
            validate_batch_uniqueness(&mapped, &unique_fields)
        };

        let (mut valid_count, mut invalid_count) = (0u32, 0u32);
        for (idx, rec) in records.iter_mut().enumerate() {
            let mapped = rec.mapped_data.clone().unwrap_or(Value::Object(Default::default()));
            let mut errors: Vec<ValidationError> = Vec::new();
            errors.extend(validate_required_fields(&mapped, &mapping.field_mappings));
            let currency_fields = mapping.currency_fields();
            if !currency_fields.is_empty() {
                errors.extend(validate_currency_codes(&mapped, &currency_fields));
            }
            let decimal_fields = mapping.decimal_fields();
            if !decimal_fields.is_empty() {
                errors.extend(validate_decimal_precision(&mapped, &decimal_fields));
            }
            let date_fields = mapping.date_fields();
            if !date_fields.is_empty() {
                errors.extend(validate_date_ranges(&mapped, &date_fields, min_date, max_date));
            }
            errors.extend(validate_entity(&mapping.entity_type, &mapped));
            if let Some(batch_errors) = batch_errors_by_index.get(&idx) {
                errors.extend(batch_errors.clone());
            }

            rec.validation_errors = errors;
            if rec.validation_errors.is_empty() {
                rec.status = ImportRecordStatus::Valid;
                valid_count += 1;
            } else {
                rec.status = ImportRecordStatus::Invalid;
                invalid_count += 1;
            }
        }

        store.update_records(&records)?;

        batch.valid_records = valid_count;
        batch.invalid_records = invalid_count;
        batch.status = ImportBatchStatus::Validated;
        store.update_batch(&batch)?;
        Ok(batch)
    }

    /// Re-stages one record with corrected raw data and re-runs mapping and
    /// validation against it, without touching any sibling record or the
    /// batch-level uniqueness check (IM-16: a retry is scoped to the one
    /// record the caller is fixing).
    pub fn retry_record(&self, store: &mut dyn ImportStore, registry: &dyn MappingRegistry, record_id: Uuid, corrected_data: serde_json::Map<String, Value>, min_date: Option<chrono::NaiveDate>, max_date: Option<chrono::NaiveDate>) -> Result<ImportRecord> {
        let mut rec = store.get_record(record_id)?.ok_or(ImportError::RecordNotFound(record_id))?;
        let batch = store.get_batch(rec.batch_id)?.ok_or(ImportError::BatchNotFound(rec.batch_id))?;
        let mapping = registry.get(&batch.mapping_name).ok_or_else(|| ImportError::MappingNotFound(batch.mapping_name.clone()))?;

        rec.raw_data = Value::Object(corrected_data);
        let mapping_result = apply_mapping(&rec.raw_data, &mapping.field_mappings);

        if !mapping_result.is_success() {
            rec.mapped_data = None;
            rec.validation_errors = mapping_result.errors;
            rec.status = ImportRecordStatus::Invalid;
            store.update_records(std::slice::from_ref(&rec))?;
            return Ok(rec);
        }

        let mapped = Value::Object(mapping_result.mapped_data);
        rec.mapped_data = Some(mapped.clone());

        let mut errors: Vec<ValidationError> = Vec::new();
        errors.extend(validate_required_fields(&mapped, &mapping.field_mappings));
        let currency_fields = mapping.currency_fields();
        if !currency_fields.is_empty() {
            errors.extend(validate_currency_codes(&mapped, &currency_fields));
        }
        let decimal_fields = mapping.decimal_fields();
        if !decimal_fields.is_empty() {
            errors.extend(validate_decimal_precision(&mapped, &decimal_fields));
        }
        let date_fields = mapping.date_fields();
        if !date_fields.is_empty() {
            errors.extend(validate_date_ranges(&mapped, &date_fields, min_date, max_date));
        }
        errors.extend(validate_entity(&mapping.entity_type, &mapped));

        rec.status = if errors.is_empty() { ImportRecordStatus::Valid } else { ImportRecordStatus::Invalid };
        rec.validation_errors = errors;
        store.update_records(std::slice::from_ref(&rec))?;
        Ok(rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acctkernel_schema::FieldType;
    use crate::mapping::FieldMapping;
    use std::collections::HashMap as StdHashMap;
    use std::io::Write;

    #[derive(Default)]
    struct InMemoryStore {
        batches: StdHashMap<Uuid, ImportBatch>,
        records: StdHashMap<Uuid, ImportRecord>,
    }

    impl ImportStore for InMemoryStore {
        fn insert_batch(&mut self, batch: &ImportBatch) -> Result<()> {
            self.batches.insert(batch.id, batch.clone());
            Ok(())
        }
        fn get_batch(&self, batch_id: Uuid) -> Result<Option<ImportBatch>> {
            Ok(self.batches.get(&batch_id).cloned())
        }
        fn update_batch(&mut self, batch: &ImportBatch) -> Result<()> {
            self.batches.insert(batch.id, batch.clone());
            Ok(())
        }
        fn insert_records(&mut self, records: &[ImportRecord]) -> Result<()> {
            for r in records {
                self.records.insert(r.id, r.clone());
            }
            Ok(())
        }
        fn list_records(&self, batch_id: Uuid) -> Result<Vec<ImportRecord>> {
            Ok(self.records.values().filter(|r| r.batch_id == batch_id).cloned().collect())
        }
        fn update_records(&mut self, records: &[ImportRecord]) -> Result<()> {
            for r in records {
                self.records.insert(r.id, r.clone());
            }
            Ok(())
        }
        fn get_record(&self, record_id: Uuid) -> Result<Option<ImportRecord>> {
            Ok(self.records.get(&record_id).cloned())
        }
    }

    fn vendor_mapping() -> ImportMapping {
        ImportMapping {
            name: "qb_vendors".into(),
            version: 1,
            entity_type: "vendor".into(),
            source_format: "csv".into(),
            source_options: Default::default(),
            field_mappings: vec![
                FieldMapping::required("name", "name", FieldType::String),
                FieldMapping::required("code", "code", FieldType::String),
                FieldMapping::optional("currency", "currency", FieldType::Currency),
            ],
            validations: vec![crate::mapping::ImportValidationRule {
                rule_type: "unique".into(),
                fields: vec!["code".into()],
                scope: "batch".into(),
                reference_entity: None,
                expression: None,
                message: None,
            }],
            dependency_tier: 0,
        }
    }

    fn write_csv(contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("acctkernel-ingest-service-test-{}.csv", Uuid::new_v4()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn load_then_validate_flags_duplicate_codes_and_missing_fields() {
        let path = write_csv("name,code,currency\nAcme,V1,USD\nGlobex,V1,USD\n,V2,ZZZ\n");
        let service = ImportService::new();
        let mapping = vendor_mapping();
        let mut store = InMemoryStore::default();
        let mut registry = StdHashMap::new();
        registry.insert(mapping.name.clone(), mapping.clone());

        let batch = service.load_batch(&mut store, &path, &mapping, Utc::now()).unwrap();
        assert_eq!(batch.total_records, 3);

        let validated = service.validate_batch(&mut store, &registry, batch.id, None, None).unwrap();
        assert_eq!(validated.valid_records, 0);
        assert_eq!(validated.invalid_records, 3);

        let records = store.list_records(batch.id).unwrap();
        let row1 = records.iter().find(|r| r.source_row == 1).unwrap();
        assert!(row1.validation_errors.iter().any(|e| e.code == "DUPLICATE_VALUE_IN_BATCH"));
        let row3 = records.iter().find(|r| r.source_row == 3).unwrap();
        assert!(row3.validation_errors.iter().any(|e| e.code == "MISSING_REQUIRED_FIELD"));
        assert!(row3.validation_errors.iter().any(|e| e.code == "INVALID_CURRENCY"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn retry_record_reruns_mapping_and_validation_in_isolation() {
        let path = write_csv("name,code,currency\nAcme,V1,ZZZ\n");
        let service = ImportService::new();
        let mapping = vendor_mapping();
        let mut store = InMemoryStore::default();
        let mut registry = StdHashMap::new();
        registry.insert(mapping.name.clone(), mapping.clone());

        let batch = service.load_batch(&mut store, &path, &mapping, Utc::now()).unwrap();
        service.validate_batch(&mut store, &registry, batch.id, None, None).unwrap();
        let rec = store.list_records(batch.id).unwrap().into_iter().next().unwrap();
        assert_eq!(rec.status, ImportRecordStatus::Invalid);

        let mut corrected = serde_json::Map::new();
        corrected.insert("name".into(), Value::String("Acme".into()));
        corrected.insert("code".into(), Value::String("V1".into()));
        corrected.insert("currency".into(), Value::String("USD".into()));
        let fixed = service.retry_record(&mut store, &registry, rec.id, corrected, None, None).unwrap();
        assert_eq!(fixed.status, ImportRecordStatus::Valid);

        std::fs::remove_file(&path).ok();
    }
}
