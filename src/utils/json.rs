use bson::Document;

use crate::errors::DbError;

/// Convert a JSON value that must be an object into a `bson::Document`.
///
/// # Errors
/// Returns `DbError::Validation` for non-objects or values BSON cannot hold.
pub fn json_value_to_document(val: serde_json::Value) -> Result<Document, DbError> {
    let serde_json::Value::Object(obj) = val else {
        return Err(DbError::validation("expected JSON object"));
    };
    Document::try_from(obj).map_err(|e| DbError::validation(e.to_string()))
}

/// Parse a JSON string into a `bson::Document`. The JSON must be a top-level object.
///
/// # Errors
/// Malformed JSON yields `DbError::Json`; a non-object yields `DbError::Validation`.
pub fn parse_json_document(json: &str) -> Result<Document, DbError> {
    let val: serde_json::Value = serde_json::from_str(json)?;
    json_value_to_document(val)
}

/// Parse a JSON array of objects, e.g. an aggregation pipeline.
///
/// # Errors
/// See [`parse_json_document`].
pub fn parse_json_documents(json: &str) -> Result<Vec<Document>, DbError> {
    let val: serde_json::Value = serde_json::from_str(json)?;
    let serde_json::Value::Array(items) = val else {
        return Err(DbError::validation("expected JSON array"));
    };
    items.into_iter().map(json_value_to_document).collect()
}
