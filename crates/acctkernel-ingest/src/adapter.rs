//! Source adapters (§3 "SourceAdapter"): turn a file on disk into a stream
//! of raw row dicts. File I/O only — no kernel or policy imports, no
//! validation, no mapping. Options are a loose JSON object so new adapters
//! can add their own knobs without touching a shared struct.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub type AdapterOptions = serde_json::Map<String, Value>;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("failed to read {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("unsupported source format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, AdapterError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceProbe {
    pub row_count: usize,
    pub columns: Vec<String>,
    /// First 5 rows; callers must not assume this is the whole file.
    pub sample_rows: Vec<serde_json::Map<String, Value>>,
    pub encoding: Option<String>,
    pub detected_delimiter: Option<String>,
}

const SAMPLE_SIZE: usize = 5;

pub trait SourceAdapter {
    fn read(&self, source_path: &Path, options: &AdapterOptions) -> Result<Vec<serde_json::Map<String, Value>>>;
    fn probe(&self, source_path: &Path, options: &AdapterOptions) -> Result<SourceProbe>;
}

fn opt_str<'a>(options: &'a AdapterOptions, key: &str, default: &'a str) -> &'a str {
    options.get(key).and_then(Value::as_str).unwrap_or(default)
}

fn opt_u64(options: &AdapterOptions, key: &str, default: u64) -> u64 {
    options.get(key).and_then(Value::as_u64).unwrap_or(default)
}

fn opt_bool(options: &AdapterOptions, key: &str, default: bool) -> bool {
    options.get(key).and_then(Value::as_bool).unwrap_or(default)
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Reads delimited text files via `csv::Reader`. Handles a UTF-8 BOM,
/// configurable delimiter, optional header row, and rows-to-skip before the
/// header.
pub struct CsvAdapter;

impl CsvAdapter {
    fn build_reader(&self, source_path: &Path, options: &AdapterOptions) -> Result<(csv::Reader<BufReader<File>>, bool, char)> {
        let delimiter = opt_str(options, "delimiter", ",").as_bytes().first().copied().unwrap_or(b',');
        let has_header = opt_bool(options, "has_header", true);
        let skip_rows = opt_u64(options, "skip_rows", 0);

        let file = File::open(source_path).map_err(|e| AdapterError::Io { path: source_path.display().to_string(), source: e })?;
        let mut reader = BufReader::new(file);
        strip_bom(&mut reader)?;
        for _ in 0..skip_rows {
            let mut discard = String::new();
            reader.read_line(&mut discard).map_err(|e| AdapterError::Io { path: source_path.display().to_string(), source: e })?;
        }

        let csv_reader = csv::ReaderBuilder::new().delimiter(delimiter).has_headers(has_header).flexible(true).from_reader(reader);
        Ok((csv_reader, has_header, delimiter as char))
    }
}

fn strip_bom(reader: &mut BufReader<File>) -> Result<()> {
    let buf = reader.fill_buf().map_err(|e| AdapterError::Io { path: String::new(), source: e })?;
    if buf.starts_with(&[0xEF, 0xBB, 0xBF]) {
        reader.consume(3);
    }
    Ok(())
}

fn record_to_map(headers: &[String], record: &csv::StringRecord) -> serde_json::Map<String, Value> {
    let mut map = serde_json::Map::new();
    for (i, field) in record.iter().enumerate() {
        let key = headers.get(i).cloned().unwrap_or_else(|| format!("field_{i}"));
        map.insert(key, Value::String(field.to_string()));
    }
    map
}

impl SourceAdapter for CsvAdapter {
    fn read(&self, source_path: &Path, options: &AdapterOptions) -> Result<Vec<serde_json::Map<String, Value>>> {
        let (mut reader, has_header, _) = self.build_reader(source_path, options)?;
        let path_str = source_path.display().to_string();

        let mut rows = Vec::new();
        if has_header {
            let headers: Vec<String> = reader.headers().map_err(|e| AdapterError::Parse { path: path_str.clone(), message: e.to_string() })?.iter().map(str::to_string).collect();
            for result in reader.into_records() {
                let record = result.map_err(|e| AdapterError::Parse { path: path_str.clone(), message: e.to_string() })?;
                rows.push(record_to_map(&headers, &record));
            }
        } else {
            let mut headers: Option<Vec<String>> = options.get("columns").and_then(Value::as_array).map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect());
            for result in reader.into_records() {
                let record = result.map_err(|e| AdapterError::Parse { path: path_str.clone(), message: e.to_string() })?;
                let headers = headers.get_or_insert_with(|| (0..record.len()).map(|i| format!("field_{i}")).collect());
                rows.push(record_to_map(headers, &record));
            }
        }
        Ok(rows)
    }

    fn probe(&self, source_path: &Path, options: &AdapterOptions) -> Result<SourceProbe> {
        let encoding = opt_str(options, "encoding", "utf-8").to_string();
        let delimiter = opt_str(options, "delimiter", ",").to_string();
        let (mut reader, has_header, _) = self.build_reader(source_path, options)?;
        let path_str = source_path.display().to_string();

        let mut headers: Option<Vec<String>> = if has_header {
            Some(reader.headers().map_err(|e| AdapterError::Parse { path: path_str.clone(), message: e.to_string() })?.iter().map(str::to_string).collect())
        } else {
            options.get("columns").and_then(Value::as_array).map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
        };

        let mut sample = Vec::new();
        let mut count = 0usize;
        for result in reader.into_records() {
            let record = result.map_err(|e| AdapterError::Parse { path: path_str.clone(), message: e.to_string() })?;
            let hdrs = headers.get_or_insert_with(|| (0..record.len()).map(|i| format!("field_{i}")).collect());
            if sample.len() < SAMPLE_SIZE {
                sample.push(record_to_map(hdrs, &record));
            }
            count += 1;
        }

        Ok(SourceProbe {
            row_count: count,
            columns: headers.unwrap_or_default(),
            sample_rows: sample,
            encoding: Some(encoding),
            detected_delimiter: Some(delimiter),
        })
    }
}

// ---------------------------------------------------------------------------
// JSON / JSONL
// ---------------------------------------------------------------------------

/// Reads either a JSON array of objects (optionally nested via `json_path`,
/// a dot path) or newline-delimited JSON objects, selected by the
/// `"format"` option (`"array"` default, or `"jsonl"`).
pub struct JsonAdapter;

impl JsonAdapter {
    fn get_nested<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
        if path.trim().is_empty() {
            return Some(data);
        }
        let mut current = data;
        for key in path.split('.') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            current = match current {
                Value::Array(arr) => key.parse::<usize>().ok().and_then(|i| arr.get(i))?,
                Value::Object(obj) => obj.get(key)?,
                _ => return None,
            };
        }
        Some(current)
    }

    fn normalize_row(item: &serde_json::Map<String, Value>) -> serde_json::Map<String, Value> {
        item.iter().map(|(k, v)| (k.trim().to_lowercase(), v.clone())).collect()
    }

    fn has_required_keys(row: &serde_json::Map<String, Value>, required_keys: &[String]) -> bool {
        required_keys.iter().all(|key| match row.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(_) => true,
        })
    }

    fn required_keys(options: &AdapterOptions) -> Vec<String> {
        options.get("required_keys").and_then(Value::as_array).map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect()).unwrap_or_default()
    }

    fn read_array(&self, source_path: &Path, options: &AdapterOptions) -> Result<Vec<serde_json::Map<String, Value>>> {
        let text = std::fs::read_to_string(source_path).map_err(|e| AdapterError::Io { path: source_path.display().to_string(), source: e })?;
        let data: Value = serde_json::from_str(&text).map_err(|e| AdapterError::Parse { path: source_path.display().to_string(), message: e.to_string() })?;
        let json_path = options.get("json_path").and_then(Value::as_str);
        let root = match json_path {
            Some(p) => Self::get_nested(&data, p).cloned().unwrap_or(Value::Null),
            None => data,
        };
        let Value::Array(items) = root else { return Ok(Vec::new()) };
        let required = Self::required_keys(options);
        Ok(items
            .into_iter()
            .filter_map(|item| item.as_object().cloned())
            .map(|item| Self::normalize_row(&item))
            .filter(|row| required.is_empty() || Self::has_required_keys(row, &required))
            .collect())
    }

    fn read_jsonl(&self, source_path: &Path, options: &AdapterOptions) -> Result<Vec<serde_json::Map<String, Value>>> {
        let file = File::open(source_path).map_err(|e| AdapterError::Io { path: source_path.display().to_string(), source: e })?;
        let required = Self::required_keys(options);
        let mut rows = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| AdapterError::Io { path: source_path.display().to_string(), source: e })?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(Value::Object(item)) = serde_json::from_str::<Value>(line) else { continue };
            let row = Self::normalize_row(&item);
            if required.is_empty() || Self::has_required_keys(&row, &required) {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

impl SourceAdapter for JsonAdapter {
    fn read(&self, source_path: &Path, options: &AdapterOptions) -> Result<Vec<serde_json::Map<String, Value>>> {
        match opt_str(options, "format", "array") {
            "jsonl" => self.read_jsonl(source_path, options),
            "array" => self.read_array(source_path, options),
            other => Err(AdapterError::UnsupportedFormat(other.to_string())),
        }
    }

    fn probe(&self, source_path: &Path, options: &AdapterOptions) -> Result<SourceProbe> {
        let rows = self.read(source_path, options)?;
        let columns = all_keys(&rows);
        Ok(SourceProbe {
            row_count: rows.len(),
            columns,
            sample_rows: rows.into_iter().take(SAMPLE_SIZE).collect(),
            encoding: Some(opt_str(options, "encoding", "utf-8").to_string()),
            detected_delimiter: None,
        })
    }
}

fn all_keys(rows: &[serde_json::Map<String, Value>]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    for row in rows.iter().take(SAMPLE_SIZE) {
        seen.extend(row.keys().cloned());
    }
    seen.into_iter().collect()
}

// ---------------------------------------------------------------------------
// XLSX
// ---------------------------------------------------------------------------

const HEADER_KEYWORDS: &[&str] = &[
    "date", "transaction date", "trans date", "post date", "journal date",
    "account", "account name", "account number", "account code", "name", "account type",
    "debit", "credits", "credit", "amount", "balance",
    "description", "memo", "reference", "details", "notes",
    "type", "detail type", "full name",
];

/// Reads `.xlsx` exports (e.g. a QuickBooks journal export) via `calamine`.
/// Header detection scans the first 15 rows for one containing at least 2
/// journal-like column names, since exported layouts vary in how many
/// banner/title rows precede the real header.
pub struct XlsxAdapter;

impl XlsxAdapter {
    fn load_sheet(&self, source_path: &Path, options: &AdapterOptions) -> Result<Vec<Vec<calamine::DataType>>> {
        use calamine::{open_workbook_auto, Reader};
        let mut workbook = open_workbook_auto(source_path).map_err(|e| AdapterError::Parse { path: source_path.display().to_string(), message: e.to_string() })?;
        let sheet_name = match options.get("sheet") {
            Some(Value::String(name)) => name.clone(),
            Some(Value::Number(n)) => workbook
                .sheet_names()
                .get(n.as_u64().unwrap_or(0) as usize)
                .cloned()
                .ok_or_else(|| AdapterError::Parse { path: source_path.display().to_string(), message: "sheet index out of range".into() })?,
            _ => workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| AdapterError::Parse { path: source_path.display().to_string(), message: "workbook has no sheets".into() })?,
        };
        let range = workbook
            .worksheet_range(&sheet_name)
            .ok_or_else(|| AdapterError::Parse { path: source_path.display().to_string(), message: format!("sheet {sheet_name:?} not found") })?
            .map_err(|e| AdapterError::Parse { path: source_path.display().to_string(), message: e.to_string() })?;

        let skip_rows = opt_u64(options, "skip_rows", 0) as usize;
        Ok(range.rows().skip(skip_rows).map(|r| r.to_vec()).collect())
    }

    fn cell_keywords(row: &[calamine::DataType]) -> BTreeSet<String> {
        let mut keywords = BTreeSet::new();
        for cell in row {
            let v = cell_to_string(cell).to_lowercase();
            if v.is_empty() {
                continue;
            }
            for kw in HEADER_KEYWORDS {
                if v.contains(kw) || kw.contains(v.as_str()) {
                    keywords.insert((*kw).to_string());
                }
            }
        }
        keywords
    }

    fn detect_header_row(rows: &[Vec<calamine::DataType>]) -> usize {
        rows.iter().take(15).position(|row| Self::cell_keywords(row).len() >= 2).unwrap_or(0)
    }

    fn header_index(rows: &[Vec<calamine::DataType>], options: &AdapterOptions) -> usize {
        let auto_detect = opt_bool(options, "auto_detect_header", true);
        match (options.get("header_row").and_then(Value::as_u64), auto_detect) {
            (Some(idx), false) => idx as usize,
            (_, true) => Self::detect_header_row(rows),
            (None, false) => 0,
        }
    }

    fn column_count(row: &[calamine::DataType]) -> usize {
        row.iter().enumerate().filter(|(_, c)| !cell_to_string(c).is_empty()).map(|(i, _)| i + 1).max().unwrap_or(1)
    }

    fn headers_for(row: &[calamine::DataType]) -> Vec<String> {
        let ncols = Self::column_count(row);
        let mut headers = Vec::with_capacity(ncols);
        for c in 0..ncols {
            let base = normalize_header_cell(row.get(c)).unwrap_or_else(|| format!("Column_{}", c + 1));
            let mut key = base.clone();
            let mut n = 0;
            while headers.contains(&key) {
                n += 1;
                key = format!("{base}_{n}");
            }
            headers.push(key);
        }
        headers
    }

    fn row_to_map(headers: &[String], row: &[calamine::DataType]) -> serde_json::Map<String, Value> {
        headers.iter().enumerate().map(|(i, h)| (h.clone(), row.get(i).map(cell_to_json).unwrap_or(Value::String(String::new())))).collect()
    }
}

fn cell_to_string(cell: &calamine::DataType) -> String {
    match cell {
        calamine::DataType::Empty => String::new(),
        calamine::DataType::String(s) => s.trim().to_string(),
        calamine::DataType::Float(f) if f.fract() == 0.0 => (*f as i64).to_string(),
        calamine::DataType::Float(f) => f.to_string(),
        calamine::DataType::Int(i) => i.to_string(),
        calamine::DataType::Bool(b) => b.to_string(),
        calamine::DataType::DateTime(d) => d.to_string(),
        calamine::DataType::Error(e) => format!("{e:?}"),
        calamine::DataType::Duration(d) => d.to_string(),
        calamine::DataType::DateTimeIso(s) | calamine::DataType::DurationIso(s) => s.clone(),
    }
}

fn cell_to_json(cell: &calamine::DataType) -> Value {
    match cell {
        calamine::DataType::Empty => Value::String(String::new()),
        calamine::DataType::Int(i) => Value::from(*i),
        calamine::DataType::Float(f) if f.fract() == 0.0 => Value::from(*f as i64),
        calamine::DataType::Float(f) => Value::from(*f),
        calamine::DataType::Bool(b) => Value::Bool(*b),
        _ => Value::String(cell_to_string(cell)),
    }
}

fn normalize_header_cell(cell: Option<&calamine::DataType>) -> Option<String> {
    let s = cell.map(cell_to_string).unwrap_or_default();
    let s = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

impl SourceAdapter for XlsxAdapter {
    fn read(&self, source_path: &Path, options: &AdapterOptions) -> Result<Vec<serde_json::Map<String, Value>>> {
        let rows = self.load_sheet(source_path, options)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let header_idx = Self::header_index(&rows, options);
        let headers = Self::headers_for(&rows[header_idx]);
        Ok(rows[header_idx + 1..]
            .iter()
            .filter(|row| row.iter().any(|c| !cell_to_string(c).is_empty()))
            .map(|row| Self::row_to_map(&headers, row))
            .collect())
    }

    fn probe(&self, source_path: &Path, options: &AdapterOptions) -> Result<SourceProbe> {
        let rows = self.load_sheet(source_path, options)?;
        if rows.is_empty() {
            return Ok(SourceProbe::default());
        }
        let header_idx = Self::header_index(&rows, options);
        let headers = Self::headers_for(&rows[header_idx]);
        let data_rows: Vec<&Vec<calamine::DataType>> = rows[header_idx + 1..].iter().filter(|row| row.iter().any(|c| !cell_to_string(c).is_empty())).collect();
        Ok(SourceProbe {
            row_count: data_rows.len(),
            columns: headers.clone(),
            sample_rows: data_rows.iter().take(SAMPLE_SIZE).map(|row| Self::row_to_map(&headers, row)).collect(),
            encoding: None,
            detected_delimiter: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_temp(contents: &str, suffix: &str) -> tempfile_path::TempPath {
        tempfile_path::write(contents, suffix)
    }

    mod tempfile_path {
        use std::io::Write;
        pub struct TempPath(pub std::path::PathBuf);
        impl Drop for TempPath {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.0);
            }
        }
        impl std::ops::Deref for TempPath {
            type Target = std::path::Path;
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }
        pub fn write(contents: &str, suffix: &str) -> TempPath {
            let mut path = std::env::temp_dir();
            path.push(format!("acctkernel-ingest-test-{}{}", uuid::Uuid::new_v4(), suffix));
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(contents.as_bytes()).unwrap();
            TempPath(path)
        }
    }

    #[test]
    fn csv_adapter_reads_header_rows() {
        let path = write_temp("name,amount\nAcme Corp,1234.56\nGlobex,500.00\n", ".csv");
        let rows = CsvAdapter.read(&path, &AdapterOptions::new()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], json!("Acme Corp"));
        assert_eq!(rows[1]["amount"], json!("500.00"));
    }

    #[test]
    fn csv_adapter_strips_bom() {
        let mut contents = String::from("\u{feff}");
        contents.push_str("name\nAcme\n");
        let path = write_temp(&contents, ".csv");
        let rows = CsvAdapter.read(&path, &AdapterOptions::new()).unwrap();
        assert!(rows[0].contains_key("name"));
    }

    #[test]
    fn csv_probe_reports_full_row_count_beyond_sample() {
        let mut contents = String::from("id\n");
        for i in 0..20 {
            contents.push_str(&format!("{i}\n"));
        }
        let path = write_temp(&contents, ".csv");
        let probe = CsvAdapter.probe(&path, &AdapterOptions::new()).unwrap();
        assert_eq!(probe.row_count, 20);
        assert_eq!(probe.sample_rows.len(), 5);
    }

    #[test]
    fn json_adapter_reads_array_with_nested_path() {
        let path = write_temp(r#"{"data":{"records":[{"Name":"Acme"},{"Name":"Globex"}]}}"#, ".json");
        let mut options = AdapterOptions::new();
        options.insert("json_path".into(), json!("data.records"));
        let rows = JsonAdapter.read(&path, &options).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], json!("Acme"));
    }

    #[test]
    fn json_adapter_jsonl_filters_missing_required_keys() {
        let path = write_temp("{\"date\":\"01/01/2026\",\"lines\":[1]}\n{\"date\":\"\"}\n", ".jsonl");
        let mut options = AdapterOptions::new();
        options.insert("format".into(), json!("jsonl"));
        options.insert("required_keys".into(), json!(["date", "lines"]));
        let rows = JsonAdapter.read(&path, &options).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
