use bson::{Bson, Document, doc};

use super::core::Collection;
use crate::errors::DbError;
use crate::query::{as_f64, check_path};

const ID_INDEX: &str = "_id_";

impl Collection {
    // --- Index admin helpers ---
    // Indexes are recorded and reported but never consulted or enforced.

    /// Records an index over `keys` (`{field: 1 | -1 | "text" | "hashed"}`) and returns its name.
    ///
    /// # Errors
    /// Returns `DbError::Validation` for an empty or malformed key document.
    pub fn create_index(&mut self, keys: &Document, unique: bool) -> Result<String, DbError> {
        if keys.is_empty() {
            return Err(DbError::validation("index keys must not be empty"));
        }
        let mut parts = Vec::with_capacity(keys.len());
        for (field, dir) in keys {
            check_path(field)?;
            let dir = match dir {
                Bson::String(kind) if kind == "text" || kind == "hashed" => kind.clone(),
                other => match as_f64(other) {
                    Some(d) if d == 1.0 => "1".to_string(),
                    Some(d) if d == -1.0 => "-1".to_string(),
                    _ => {
                        return Err(DbError::validation(format!(
                            "invalid index direction for '{field}'"
                        )));
                    }
                },
            };
            parts.push(format!("{field}_{dir}"));
        }
        if keys.len() == 1 && keys.contains_key("_id") {
            return Ok(ID_INDEX.to_string());
        }
        let name = parts.join("_");
        let mut info = doc! {"v": 2, "key": keys.clone(), "name": name.clone()};
        if unique {
            info.insert("unique", true);
        }
        self.indexes.insert(name.clone(), info);
        log::debug!("index '{name}' recorded on '{}'", self.name);
        Ok(name)
    }

    /// `{name: {v, key, ...}}` for every index, starting with the implicit `_id_` index.
    #[must_use]
    pub fn index_information(&self) -> Document {
        let mut out = doc! {ID_INDEX: {"v": 2, "key": {"_id": 1}}};
        for (name, info) in &self.indexes {
            let mut entry = info.clone();
            entry.remove("name");
            out.insert(name.clone(), entry);
        }
        out
    }

    /// # Errors
    /// `DbError::OperationFailure` for `_id_` or an unknown name.
    pub fn drop_index(&mut self, name: &str) -> Result<(), DbError> {
        if name == ID_INDEX {
            return Err(DbError::failure("cannot drop _id index"));
        }
        self.indexes
            .shift_remove(name)
            .map(|_| ())
            .ok_or_else(|| DbError::failure(format!("index not found with name [{name}]")))
    }

    /// Drops every index except `_id_`.
    pub fn drop_indexes(&mut self) {
        self.indexes.clear();
    }
}
