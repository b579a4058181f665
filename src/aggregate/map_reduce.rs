use bson::{Bson, Document, doc};

use super::exec::partition_by_key;
use crate::errors::DbError;

/// Script host for map-reduce. Bodies are opaque to the engine.
pub trait MapReduce {
    /// Emits `(key, value)` pairs for one document.
    ///
    /// # Errors
    /// Script failures propagate unchanged.
    fn map(&self, doc: &Document) -> Result<Vec<(Bson, Bson)>, DbError>;

    /// Folds every value emitted for `key`. Not called for keys with a single value.
    ///
    /// # Errors
    /// Script failures propagate unchanged.
    fn reduce(&self, key: &Bson, values: Vec<Bson>) -> Result<Bson, DbError>;

    /// # Errors
    /// Script failures propagate unchanged.
    fn finalize(&self, _key: &Bson, value: Bson) -> Result<Bson, DbError> {
        Ok(value)
    }
}

/// Runs `script` over `docs`, producing `{_id: key, value}` documents in key order.
///
/// # Errors
/// Propagates errors raised by the script.
pub fn run_map_reduce<'a>(
    docs: impl IntoIterator<Item = &'a Document>,
    script: &dyn MapReduce,
) -> Result<Vec<Document>, DbError> {
    let mut emitted = Vec::new();
    for d in docs {
        emitted.extend(script.map(d)?);
    }
    partition_by_key(emitted)
        .into_iter()
        .map(|(key, mut values)| {
            let value = if values.len() == 1 {
                values.pop().unwrap_or(Bson::Null)
            } else {
                script.reduce(&key, values)?
            };
            let value = script.finalize(&key, value)?;
            Ok(doc! {"_id": key, "value": value})
        })
        .collect()
}
