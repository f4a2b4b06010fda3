//! `EventSchema` — the typed contract for one `(event_type, version)` pair.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::field::FieldSchema;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSchema {
    pub event_type: String,
    pub version: u32,
    pub fields: Vec<FieldSchema>,
}

impl EventSchema {
    pub fn new(event_type: impl Into<String>, version: u32, fields: Vec<FieldSchema>) -> Self {
        Self { event_type: event_type.into(), version, fields }
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// All dotted field paths declared by this schema, including nested
    /// object fields and `[*]`-suffixed array item paths. Used by
    /// [`crate::validate_field_references`] to enforce that every policy
    /// field reference names a field the schema actually declares.
    pub fn all_field_paths(&self) -> BTreeSet<String> {
        let mut paths = BTreeSet::new();
        for field in &self.fields {
            collect_paths(field, None, &mut paths);
        }
        paths
    }
}

fn collect_paths(field: &FieldSchema, prefix: Option<&str>, paths: &mut BTreeSet<String>) {
    let path = match prefix {
        Some(p) => format!("{p}.{}", field.name),
        None => field.name.clone(),
    };
    paths.insert(path.clone());

    for nested in &field.nested_fields {
        collect_paths(nested, Some(&path), paths);
    }
    if let Some(item) = &field.item_schema {
        let item_path = format!("{path}[*]");
        paths.insert(item_path.clone());
        for nested in &item.nested_fields {
            collect_paths(nested, Some(&item_path), paths);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;

    #[test]
    fn nested_and_array_paths_use_bracket_suffix() {
        let schema = EventSchema::new(
            "ap.invoice_received",
            1,
            vec![
                FieldSchema::scalar("amount", FieldType::Decimal, true),
                FieldSchema {
                    name: "lines".into(),
                    field_type: FieldType::Array,
                    required: false,
                    nullable: false,
                    constraints: Default::default(),
                    nested_fields: vec![],
                    item_schema: Some(Box::new(FieldSchema::scalar("sku", FieldType::String, true))),
                },
            ],
        );
        let paths = schema.all_field_paths();
        assert!(paths.contains("amount"));
        assert!(paths.contains("lines"));
        assert!(paths.contains("lines[*]"));
        assert!(paths.contains("lines[*].sku"));
    }
}
