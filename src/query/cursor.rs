use bson::{Bson, Document};
use indexmap::IndexMap;

use super::compare::values_equal;
use super::eval::{compare_docs, eval_filter};
use super::path::resolve;
use super::projection::Projection;
use super::types::{Filter, SortSpec};
use crate::document::IdKey;

/// A lazy, windowable view over the documents of one collection matching a filter.
///
/// Nothing is evaluated until the first document is requested. Without a sort the store is
/// scanned in insertion order; with a sort the matches are collected once and stably sorted.
/// Builders reset iteration progress.
#[derive(Clone)]
pub struct Cursor<'a> {
    documents: &'a IndexMap<IdKey, Document>,
    filter: Filter,
    projection: Projection,
    sort: Option<Vec<SortSpec>>,
    skip: usize,
    limit: usize,
    sorted: Option<Vec<&'a Document>>,
    pos: usize,
    skipped: usize,
    emitted: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(
        documents: &'a IndexMap<IdKey, Document>,
        filter: Filter,
        projection: Projection,
    ) -> Self {
        Self {
            documents,
            filter,
            projection,
            sort: None,
            skip: 0,
            limit: 0,
            sorted: None,
            pos: 0,
            skipped: 0,
            emitted: 0,
        }
    }

    #[must_use]
    pub fn sort(mut self, keys: Vec<SortSpec>) -> Self {
        self.sort = (!keys.is_empty()).then_some(keys);
        self.sorted = None;
        self.rewind_in_place();
        self
    }

    #[must_use]
    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self.rewind_in_place();
        self
    }

    /// `0` means no limit.
    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = n;
        self.rewind_in_place();
        self
    }

    /// Restarts iteration from the first document of the window.
    #[must_use]
    pub fn rewind(mut self) -> Self {
        self.rewind_in_place();
        self
    }

    /// Number of matching documents, optionally restricted to the skip/limit window.
    #[must_use]
    pub fn count(self, with_limit_and_skip: bool) -> usize {
        let total = self.documents.values().filter(|d| eval_filter(d, &self.filter)).count();
        if !with_limit_and_skip {
            return total;
        }
        let windowed = total.saturating_sub(self.skip);
        if self.limit == 0 { windowed } else { windowed.min(self.limit) }
    }

    /// Distinct values of `path` over every match, ignoring the window. Arrays contribute their
    /// elements. Order is first-seen.
    #[must_use]
    pub fn distinct(&self, path: &str) -> Vec<Bson> {
        let mut out: Vec<Bson> = Vec::new();
        let mut push_unique = |v: &Bson| {
            if !out.iter().any(|seen| values_equal(seen, v)) {
                out.push(v.clone());
            }
        };
        for doc in self.all_matches() {
            for cand in resolve(doc, path) {
                match cand.value() {
                    Some(Bson::Array(items)) => items.iter().for_each(&mut push_unique),
                    Some(v) => push_unique(v),
                    None => {}
                }
            }
        }
        out
    }

    #[must_use]
    pub fn to_vec(self) -> Vec<Document> {
        self.collect()
    }

    fn rewind_in_place(&mut self) {
        self.pos = 0;
        self.skipped = 0;
        self.emitted = 0;
    }

    fn all_matches(&self) -> Vec<&'a Document> {
        let mut docs: Vec<&'a Document> =
            self.documents.values().filter(|d| eval_filter(d, &self.filter)).collect();
        if let Some(keys) = &self.sort {
            docs.sort_by(|a, b| compare_docs(a, b, keys));
        }
        docs
    }

    fn next_match(&mut self) -> Option<&'a Document> {
        if self.sort.is_some() {
            if self.sorted.is_none() {
                self.sorted = Some(self.all_matches());
            }
            let doc = self.sorted.as_ref().and_then(|docs| docs.get(self.pos).copied());
            self.pos += 1;
            return doc;
        }
        let documents = self.documents;
        while let Some((_, doc)) = documents.get_index(self.pos) {
            self.pos += 1;
            if eval_filter(doc, &self.filter) {
                return Some(doc);
            }
        }
        None
    }

    fn advance(&mut self) -> Option<Document> {
        if self.limit != 0 && self.emitted >= self.limit {
            return None;
        }
        loop {
            let doc = self.next_match()?;
            if self.skipped < self.skip {
                self.skipped += 1;
                continue;
            }
            self.emitted += 1;
            return Some(self.projection.apply(doc));
        }
    }
}

impl Iterator for Cursor<'_> {
    type Item = Document;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance()
    }
}
