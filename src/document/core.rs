use bson::{Bson, Document};

use crate::errors::DbError;

/// Checks the top-level field names of a document about to be stored.
///
/// # Errors
/// Returns `DbError::Validation` for empty, `$`-prefixed, or dotted names.
pub fn validate_keys(doc: &Document) -> Result<(), DbError> {
    for key in doc.keys() {
        if key.is_empty() {
            return Err(DbError::validation("field names must not be empty"));
        }
        if key.starts_with('$') {
            return Err(DbError::validation(format!("field name '{key}' must not start with '$'")));
        }
        if key.contains('.') {
            return Err(DbError::validation(format!("field name '{key}' must not contain '.'")));
        }
    }
    Ok(())
}

/// Checks that a value may serve as a document id.
///
/// # Errors
/// Arrays and regular expressions are rejected.
pub fn validate_id(id: &Bson) -> Result<(), DbError> {
    match id {
        Bson::Array(_) => Err(DbError::validation("can't use an array for _id")),
        Bson::RegularExpression(_) => Err(DbError::validation("can't use a regex for _id")),
        _ => Ok(()),
    }
}

/// Rebuilds `doc` with `_id` as its first field.
#[must_use]
pub fn with_id(doc: Document, id: Bson) -> Document {
    let mut out = Document::new();
    out.insert("_id", id);
    for (k, v) in doc {
        if k != "_id" {
            out.insert(k, v);
        }
    }
    out
}
