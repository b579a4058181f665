use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::collection::Collection;
use crate::config::EngineConfig;
use crate::errors::DbError;

/// A collection shared between callers; writers take the lock exclusively.
pub type SharedCollection = Arc<RwLock<Collection>>;

/// Registry of named collections.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) collections: RwLock<HashMap<String, SharedCollection>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("collections", &self.list_collection_names())
            .finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn check_name(name: &str) -> Result<(), DbError> {
    if name.is_empty() || name.contains('$') || name.contains('\0') {
        return Err(DbError::validation(format!("invalid collection name '{name}'")));
    }
    Ok(())
}

impl Engine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config, collections: RwLock::new(HashMap::new()) }
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn make(&self, name: &str) -> SharedCollection {
        Arc::new(RwLock::new(Collection::with_id_generator(name, self.config.id_generator())))
    }

    /// Create a new, empty collection.
    ///
    /// # Errors
    /// `DbError::CollectionAlreadyExists` if the name is taken, `DbError::Validation` if it is
    /// not a usable name.
    pub fn create_collection(&self, name: &str) -> Result<SharedCollection, DbError> {
        check_name(name)?;
        let mut cols = self.collections.write();
        if cols.contains_key(name) {
            return Err(DbError::CollectionAlreadyExists(name.to_string()));
        }
        let col = self.make(name);
        cols.insert(name.to_string(), Arc::clone(&col));
        drop(cols);
        crate::oplog!("create_collection", name);
        Ok(col)
    }

    /// Returns the named collection, creating it on first use.
    ///
    /// # Errors
    /// `DbError::Validation` for an unusable name.
    pub fn collection(&self, name: &str) -> Result<SharedCollection, DbError> {
        if let Some(col) = self.collections.read().get(name) {
            return Ok(Arc::clone(col));
        }
        check_name(name)?;
        let mut cols = self.collections.write();
        let col = cols.entry(name.to_string()).or_insert_with(|| {
            log::debug!("collection '{name}' created implicitly");
            self.make(name)
        });
        Ok(Arc::clone(col))
    }

    /// # Errors
    /// `DbError::NoSuchCollection` if it does not exist.
    pub fn get_collection(&self, name: &str) -> Result<SharedCollection, DbError> {
        self.collections
            .read()
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| DbError::NoSuchCollection(name.to_string()))
    }

    /// Removes the collection from the registry; outstanding handles stay usable but detached.
    /// Returns whether it existed.
    pub fn drop_collection(&self, name: &str) -> bool {
        let existed = self.collections.write().remove(name).is_some();
        if existed {
            crate::oplog!("drop_collection", name);
        }
        existed
    }

    /// Sorted names of every registered collection.
    #[must_use]
    pub fn list_collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// # Errors
    /// `DbError::NoSuchCollection` when `from` is missing, `DbError::CollectionAlreadyExists`
    /// when `to` is taken.
    pub fn rename_collection(&self, from: &str, to: &str) -> Result<(), DbError> {
        check_name(to)?;
        let mut cols = self.collections.write();
        if cols.contains_key(to) {
            return Err(DbError::CollectionAlreadyExists(to.to_string()));
        }
        let col = cols.remove(from).ok_or_else(|| DbError::NoSuchCollection(from.to_string()))?;
        col.write().set_name(to.to_string());
        cols.insert(to.to_string(), col);
        drop(cols);
        crate::oplog!("rename_collection", from, {"to": to});
        Ok(())
    }
}
