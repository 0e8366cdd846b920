//! Metadata normalization for Chroma records.
//!
//! Chroma metadata fields must be scalars. Scalar values pass through
//! unchanged, lists and objects are serialized to their JSON string form,
//! nulls are dropped, and a field whose serialization fails is skipped with a
//! warning rather than failing the write.

use crate::model::DocumentChunk;
use serde_json::{Map, Value};

/// Sanitize a metadata mapping down to scalar-only entries.
pub(crate) fn sanitize_metadata(metadata: &Map<String, Value>) -> Map<String, Value> {
    let mut cleaned = Map::new();
    for (key, value) in metadata {
        match value {
            Value::Null => {}
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                cleaned.insert(key.clone(), value.clone());
            }
            Value::Array(_) | Value::Object(_) => match serde_json::to_string(value) {
                Ok(serialized) => {
                    cleaned.insert(key.clone(), Value::String(serialized));
                }
                Err(err) => {
                    tracing::warn!(
                        field = key,
                        error = %err,
                        "Skipping unserializable metadata field"
                    );
                }
            },
        }
    }
    cleaned
}

/// Build the full metadata record persisted alongside a chunk.
///
/// Identity fields are inserted after sanitization so they overwrite any
/// caller-supplied keys of the same name.
pub(crate) fn chunk_metadata_record(chunk: &DocumentChunk) -> Map<String, Value> {
    let mut record = sanitize_metadata(&chunk.metadata);
    record.insert("id".into(), Value::String(chunk.id.clone()));
    record.insert("source".into(), Value::String(chunk.source.clone()));
    record.insert("file_type".into(), Value::String(chunk.file_type.clone()));
    record.insert("chunk_index".into(), Value::from(chunk.chunk_index));
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{current_timestamp_rfc3339, generate_id};
    use serde_json::json;

    #[test]
    fn scalars_pass_through_unchanged() {
        let mut metadata = Map::new();
        metadata.insert("author".into(), json!("jane"));
        metadata.insert("pages".into(), json!(42));
        metadata.insert("draft".into(), json!(false));

        let cleaned = sanitize_metadata(&metadata);
        assert_eq!(cleaned.get("author"), Some(&json!("jane")));
        assert_eq!(cleaned.get("pages"), Some(&json!(42)));
        assert_eq!(cleaned.get("draft"), Some(&json!(false)));
    }

    #[test]
    fn nulls_are_dropped() {
        let mut metadata = Map::new();
        metadata.insert("missing".into(), Value::Null);
        let cleaned = sanitize_metadata(&metadata);
        assert!(cleaned.is_empty());
    }

    #[test]
    fn list_values_round_trip_through_strings() {
        let mut metadata = Map::new();
        metadata.insert("tags".into(), json!(["alpha", "beta"]));

        let cleaned = sanitize_metadata(&metadata);
        let serialized = cleaned
            .get("tags")
            .and_then(Value::as_str)
            .expect("stringified list");
        let parsed: Value = serde_json::from_str(serialized).expect("parse back");
        assert_eq!(parsed, json!(["alpha", "beta"]));
    }

    #[test]
    fn object_values_are_stringified() {
        let mut metadata = Map::new();
        metadata.insert("nested".into(), json!({ "a": 1 }));

        let cleaned = sanitize_metadata(&metadata);
        let serialized = cleaned.get("nested").and_then(Value::as_str).unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(serialized).unwrap(),
            json!({ "a": 1 })
        );
    }

    #[test]
    fn record_carries_identity_fields() {
        let mut metadata = Map::new();
        metadata.insert("sheet".into(), json!("Q1"));
        // A caller-supplied "id" must not shadow the chunk identifier.
        metadata.insert("id".into(), json!("spoofed"));

        let chunk = DocumentChunk {
            id: generate_id(),
            content: "cell data".into(),
            metadata,
            embedding: None,
            source: "book.xlsx".into(),
            file_type: "spreadsheet".into(),
            chunk_index: 3,
            created_at: current_timestamp_rfc3339(),
            updated_at: current_timestamp_rfc3339(),
        };

        let record = chunk_metadata_record(&chunk);
        assert_eq!(record.get("id"), Some(&Value::String(chunk.id.clone())));
        assert_eq!(record.get("source"), Some(&json!("book.xlsx")));
        assert_eq!(record.get("file_type"), Some(&json!("spreadsheet")));
        assert_eq!(record.get("chunk_index"), Some(&json!(3)));
        assert_eq!(record.get("sheet"), Some(&json!("Q1")));
    }
}
