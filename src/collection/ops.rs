use bson::{Bson, Document};

use super::core::Collection;
use super::report::{DeleteReport, UpdateReport};
use crate::aggregate::{MapReduce, parse_pipeline, run_map_reduce, run_pipeline};
use crate::document::{IdKey, validate_id, validate_keys, with_id};
use crate::errors::DbError;
use crate::query::{
    Condition, Cursor, Filter, FindOptions, IntoFilter, Literal, Operator, Projection, SortSpec,
    compare_docs, eval_filter,
};
use crate::update::{UpdateSpec, apply_update, set_path};
use crate::utils::num::usize_to_u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub upsert: bool,
    pub multi: bool,
}

/// Options for [`Collection::find_and_modify`]. Exactly one of `update` and `remove` is set.
#[derive(Debug, Clone, Default)]
pub struct FindAndModify {
    pub update: Option<Document>,
    pub remove: bool,
    pub upsert: bool,
    /// Return the document as it is after the update instead of before.
    pub return_new: bool,
    /// Picks which match is modified.
    pub sort: Option<Vec<SortSpec>>,
    /// Projection applied to the returned document.
    pub fields: Option<Document>,
}

impl Collection {
    /// Stores `doc`, assigning an id when it has none. Returns the id.
    ///
    /// # Errors
    /// `DbError::Validation` for illegal field names or ids; `DbError::DuplicateKey` when the id
    /// is taken.
    pub fn insert(&mut self, doc: Document) -> Result<Bson, DbError> {
        validate_keys(&doc)?;
        let (doc, id) = match doc.get("_id") {
            Some(id) => {
                validate_id(id)?;
                let id = id.clone();
                (doc, id)
            }
            None => {
                let id = self.id_generator.generate();
                (with_id(doc, id.clone()), id)
            }
        };
        let key = IdKey::from(&id);
        if self.documents.contains_key(&key) {
            return Err(DbError::DuplicateKey(id.to_string()));
        }
        self.documents.insert(key, doc);
        crate::oplog!("insert", &self.name, {"id": id.to_string()});
        Ok(id)
    }

    /// Inserts each document in turn. Stops at the first failure; earlier documents stay.
    ///
    /// # Errors
    /// See [`Collection::insert`].
    pub fn insert_many(
        &mut self,
        docs: impl IntoIterator<Item = Document>,
    ) -> Result<Vec<Bson>, DbError> {
        docs.into_iter().map(|d| self.insert(d)).collect()
    }

    /// # Errors
    /// Returns `DbError::Validation` when the query or projection does not compile.
    pub fn find(
        &self,
        query: impl IntoFilter,
        options: FindOptions,
    ) -> Result<Cursor<'_>, DbError> {
        let filter = query.into_filter()?;
        let projection = match &options.projection {
            Some(spec) => Projection::parse(spec)?,
            None => Projection::identity(),
        };
        log::debug!("find on '{}': {filter:?}", self.name);
        let mut cursor = Cursor::new(&self.documents, filter, projection);
        if let Some(sort) = options.sort {
            cursor = cursor.sort(sort);
        }
        if let Some(skip) = options.skip {
            cursor = cursor.skip(skip);
        }
        if let Some(limit) = options.limit {
            cursor = cursor.limit(limit);
        }
        Ok(cursor)
    }

    /// # Errors
    /// Returns `DbError::Validation` when the query does not compile.
    pub fn find_one(&self, query: impl IntoFilter) -> Result<Option<Document>, DbError> {
        Ok(self.find(query, FindOptions::default())?.next())
    }

    /// # Errors
    /// Returns `DbError::Validation` when the query does not compile.
    pub fn count_documents(&self, query: impl IntoFilter) -> Result<usize, DbError> {
        let filter = query.into_filter()?;
        Ok(self.documents.values().filter(|d| eval_filter(d, &filter)).count())
    }

    /// # Errors
    /// Returns `DbError::Validation` when the query does not compile.
    pub fn distinct(&self, path: &str, query: impl IntoFilter) -> Result<Vec<Bson>, DbError> {
        Ok(self.find(query, FindOptions::default())?.distinct(path))
    }

    /// Applies `update` to the first match, or to every match with `multi`.
    ///
    /// # Errors
    /// `DbError::Validation` for bad queries or updates (including `multi` with a replacement);
    /// `DbError::OperationFailure` when applying a modifier fails.
    pub fn update(
        &mut self,
        query: impl IntoFilter,
        update: &Document,
        options: UpdateOptions,
    ) -> Result<UpdateReport, DbError> {
        let filter = query.into_filter()?;
        let spec = UpdateSpec::parse(update)?;
        if options.multi && spec.is_replacement() {
            return Err(DbError::validation("multi update is not supported for replacement"));
        }
        let keys = self.matching_keys(&filter, if options.multi { usize::MAX } else { 1 });
        let mut report = UpdateReport::default();
        for key in &keys {
            if let Some(doc) = self.documents.get_mut(key) {
                report.matched += 1;
                if apply_update(doc, &spec, &filter, false)? {
                    report.modified += 1;
                }
            }
        }
        report.updated_existing = report.matched > 0;
        if keys.is_empty() && options.upsert {
            let (id, _) = self.upsert(&filter, &spec)?;
            report.upserted_id = Some(id);
        }
        crate::oplog!("update", &self.name, {
            "matched": report.matched,
            "modified": report.modified,
            "upserted": report.upserted_id.is_some(),
        });
        Ok(report)
    }

    /// # Errors
    /// See [`Collection::update`].
    pub fn update_one(
        &mut self,
        query: impl IntoFilter,
        update: &Document,
        upsert: bool,
    ) -> Result<UpdateReport, DbError> {
        self.update(query, update, UpdateOptions { upsert, multi: false })
    }

    /// # Errors
    /// See [`Collection::update`].
    pub fn update_many(
        &mut self,
        query: impl IntoFilter,
        update: &Document,
        upsert: bool,
    ) -> Result<UpdateReport, DbError> {
        self.update(query, update, UpdateOptions { upsert, multi: true })
    }

    /// Deletes every match.
    ///
    /// # Errors
    /// Returns `DbError::Validation` when the query does not compile.
    pub fn remove(&mut self, query: impl IntoFilter) -> Result<DeleteReport, DbError> {
        self.remove_up_to(query, usize::MAX)
    }

    /// Deletes the first match in store order.
    ///
    /// # Errors
    /// Returns `DbError::Validation` when the query does not compile.
    pub fn remove_one(&mut self, query: impl IntoFilter) -> Result<DeleteReport, DbError> {
        self.remove_up_to(query, 1)
    }

    /// Atomically finds one document and updates or removes it.
    ///
    /// # Errors
    /// `DbError::OperationFailure` for inconsistent options, otherwise as for
    /// [`Collection::update`].
    pub fn find_and_modify(
        &mut self,
        query: impl IntoFilter,
        options: FindAndModify,
    ) -> Result<Option<Document>, DbError> {
        match (&options.update, options.remove) {
            (Some(_), true) => {
                return Err(DbError::failure("cannot specify both update and remove"));
            }
            (None, false) => return Err(DbError::failure("must specify either update or remove")),
            _ => {}
        }
        if options.remove && options.return_new {
            return Err(DbError::failure("remove and return_new can't co-exist"));
        }
        let filter = query.into_filter()?;
        let projection = match &options.fields {
            Some(spec) => Projection::parse(spec)?,
            None => Projection::identity(),
        };
        let spec = options.update.as_ref().map(UpdateSpec::parse).transpose()?;
        let target = self.first_sorted_match(&filter, options.sort.as_deref());

        let result = match (target, spec) {
            (Some(key), None) => self.documents.shift_remove(&key),
            (Some(key), Some(spec)) => match self.documents.get_mut(&key) {
                Some(doc) => {
                    let before = doc.clone();
                    apply_update(doc, &spec, &filter, false)?;
                    Some(if options.return_new { doc.clone() } else { before })
                }
                None => None,
            },
            (None, Some(spec)) if options.upsert => {
                let (_, inserted) = self.upsert(&filter, &spec)?;
                options.return_new.then_some(inserted)
            }
            (None, _) => None,
        };
        crate::oplog!("find_and_modify", &self.name, {
            "found": result.is_some(),
            "remove": options.remove,
        });
        Ok(result.map(|d| projection.apply(&d)))
    }

    /// Inserts `doc` if it has no id, otherwise replaces (or creates) the document with its id.
    ///
    /// # Errors
    /// See [`Collection::insert`] and [`Collection::update`].
    pub fn save(&mut self, doc: Document) -> Result<Bson, DbError> {
        let Some(id) = doc.get("_id").cloned() else {
            return self.insert(doc);
        };
        validate_keys(&doc)?;
        validate_id(&id)?;
        self.update(Filter::by_id(id.clone()), &doc, UpdateOptions { upsert: true, multi: false })?;
        Ok(id)
    }

    /// Runs an aggregation pipeline over every document in store order.
    ///
    /// # Errors
    /// The whole pipeline is compiled first: unknown stages or accumulators yield
    /// `DbError::OperationFailure`, malformed ones `DbError::Validation`.
    pub fn aggregate(&self, pipeline: &[Document]) -> Result<Vec<Document>, DbError> {
        let stages = parse_pipeline(pipeline)?;
        run_pipeline(self.documents.values().cloned().collect(), &stages)
    }

    /// # Errors
    /// Returns query compilation errors and whatever the script raises.
    pub fn map_reduce(
        &self,
        script: &dyn MapReduce,
        query: impl IntoFilter,
    ) -> Result<Vec<Document>, DbError> {
        let filter = query.into_filter()?;
        run_map_reduce(self.documents.values().filter(|d| eval_filter(d, &filter)), script)
    }

    /// Removes every document and every secondary index.
    pub fn clear(&mut self) {
        self.documents.clear();
        self.indexes.clear();
        crate::oplog!("drop", &self.name);
    }

    fn matching_keys(&self, filter: &Filter, limit: usize) -> Vec<IdKey> {
        self.documents
            .iter()
            .filter(|(_, d)| eval_filter(d, filter))
            .map(|(k, _)| k.clone())
            .take(limit)
            .collect()
    }

    fn first_sorted_match(&self, filter: &Filter, sort: Option<&[SortSpec]>) -> Option<IdKey> {
        let matches = self.documents.iter().filter(|(_, d)| eval_filter(d, filter));
        match sort {
            Some(keys) if !keys.is_empty() => matches
                .reduce(|best, cur| {
                    if compare_docs(cur.1, best.1, keys).is_lt() { cur } else { best }
                })
                .map(|(k, _)| k.clone()),
            _ => matches.map(|(k, _)| k.clone()).next(),
        }
    }

    fn remove_up_to(
        &mut self,
        query: impl IntoFilter,
        limit: usize,
    ) -> Result<DeleteReport, DbError> {
        let filter = query.into_filter()?;
        let keys = self.matching_keys(&filter, limit);
        for key in &keys {
            self.documents.shift_remove(key);
        }
        let deleted = usize_to_u64(keys.len());
        crate::oplog!("remove", &self.name, {"deleted": deleted});
        Ok(DeleteReport { deleted })
    }

    /// Builds a document from the query's equality clauses, applies `spec` as an insert and
    /// stores the result.
    fn upsert(&mut self, filter: &Filter, spec: &UpdateSpec) -> Result<(Bson, Document), DbError> {
        let mut seed = Document::new();
        seed_from_filter(filter, &mut seed)?;
        apply_update(&mut seed, spec, filter, true)?;
        let id = self.insert(seed)?;
        let inserted = self.documents.get(&IdKey::from(&id)).cloned().unwrap_or_default();
        Ok((id, inserted))
    }
}

fn seed_from_filter(filter: &Filter, seed: &mut Document) -> Result<(), DbError> {
    match filter {
        Filter::And(clauses) => {
            for clause in clauses {
                seed_from_filter(clause, seed)?;
            }
        }
        Filter::Field { path, condition } => {
            let value = match condition {
                Condition::Literal(Literal::Value(v)) => Some(v),
                Condition::Operators(ops) => match ops.as_slice() {
                    [Operator::Eq(v)] => Some(v),
                    _ => None,
                },
                Condition::Literal(Literal::Pattern(_)) => None,
            };
            if let Some(v) = value {
                set_path(seed, path, v.clone())?;
            }
        }
        Filter::Or(_) | Filter::Nor(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn seed_expands_dotted_equalities() {
        let filter =
            Filter::parse(&doc! {"a.b": 1, "$and": [{"c": {"$eq": 2}}], "d": {"$gt": 3}}).unwrap();
        let mut seed = Document::new();
        seed_from_filter(&filter, &mut seed).unwrap();
        assert_eq!(seed, doc! {"a": {"b": 1}, "c": 2});
    }

    #[test]
    fn insert_places_generated_id_first() {
        let mut c = Collection::new("t");
        let id = c.insert(doc! {"a": 1}).unwrap();
        let stored = c.find_one(&id).unwrap().unwrap();
        assert_eq!(stored.keys().next().map(String::as_str), Some("_id"));
    }
}
