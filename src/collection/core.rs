use bson::Document;
use indexmap::IndexMap;

use crate::document::{IdGenerator, IdKey, ObjectIdGenerator};

/// A named, insertion-ordered mapping from id to document.
pub struct Collection {
    pub(crate) name: String,
    pub(crate) documents: IndexMap<IdKey, Document>,
    pub(crate) id_generator: Box<dyn IdGenerator>,
    /// Index descriptions by name. Bookkeeping only, nothing is enforced.
    pub(crate) indexes: IndexMap<String, Document>,
}

impl Collection {
    /// An empty collection that generates ObjectIds.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id_generator(name, Box::new(ObjectIdGenerator))
    }

    #[must_use]
    pub fn with_id_generator(name: impl Into<String>, id_generator: Box<dyn IdGenerator>) -> Self {
        Self {
            name: name.into(),
            documents: IndexMap::new(),
            id_generator,
            indexes: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, new_name: String) {
        self.name = new_name;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("documents", &self.documents.len())
            .field("indexes", &self.indexes.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
