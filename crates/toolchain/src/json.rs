//! Recursive cleaning of contract model documents.
//!
//! Generated models routinely carry empty collections and nulls that
//! confuse downstream template rendering. `clean_model` drops them
//! bottom-up, so an object that becomes empty after its children are
//! cleaned is itself dropped.

use serde_json::Value;

/// Remove nulls and empty objects/arrays from a JSON tree.
///
/// Returns `None` when the value itself cleans away to nothing.
/// Scalars (including empty strings) are kept as-is.
pub fn clean_model(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let cleaned: serde_json::Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| clean_model(v).map(|v| (k, v)))
                .collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(Value::Object(cleaned))
            }
        }
        Value::Array(items) => {
            let cleaned: Vec<Value> = items.into_iter().filter_map(clean_model).collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(Value::Array(cleaned))
            }
        }
        scalar => Some(scalar),
    }
}
