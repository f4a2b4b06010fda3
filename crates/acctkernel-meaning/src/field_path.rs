//! Dot-notation field access into a JSON payload.
//!
//! Accepts paths with or without a leading `"payload."` prefix, since
//! policies are free to write either `"quantity"` or `"payload.quantity"`.

use serde_json::Value;

pub fn get_field_value<'a>(payload: &'a Value, field_path: &str) -> Option<&'a Value> {
    let field_path = field_path.strip_prefix("payload.").unwrap_or(field_path);
    let mut current = payload;
    for part in field_path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}
