use bson::{Bson, Document};
use indexmap::IndexMap;

use super::compare::{as_f64, is_truthy};
use super::parse::check_path;
use crate::errors::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Identity,
    Include,
    Exclude,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf,
    Branch(IndexMap<String, Node>),
}

/// A compiled field projection.
///
/// Either every listed path is kept or every listed path is dropped. `_id` is handled on its
/// own and kept unless switched off.
#[derive(Debug, Clone)]
pub struct Projection {
    mode: Mode,
    fields: IndexMap<String, Node>,
    keep_id: bool,
}

impl Default for Projection {
    fn default() -> Self {
        Self::identity()
    }
}

impl Projection {
    #[must_use]
    pub fn identity() -> Self {
        Self { mode: Mode::Identity, fields: IndexMap::new(), keep_id: true }
    }

    /// # Errors
    /// Mixed inclusion and exclusion, non-flag values and colliding paths are rejected.
    pub fn parse(spec: &Document) -> Result<Self, DbError> {
        let mut mode = Mode::Identity;
        let mut keep_id = None;
        let mut fields = IndexMap::new();
        for (path, flag) in spec {
            let on = projection_flag(path, flag)?;
            if path == "_id" {
                keep_id = Some(on);
                continue;
            }
            check_path(path)?;
            let wanted = if on { Mode::Include } else { Mode::Exclude };
            if mode != Mode::Identity && mode != wanted {
                return Err(DbError::validation(
                    "projection cannot mix inclusion and exclusion",
                ));
            }
            mode = wanted;
            insert_path(&mut fields, path)?;
        }
        match (mode, keep_id) {
            (Mode::Identity, Some(true)) => mode = Mode::Include,
            (Mode::Identity, Some(false)) => mode = Mode::Exclude,
            _ => {}
        }
        Ok(Self { mode, fields, keep_id: keep_id.unwrap_or(true) })
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.mode == Mode::Identity
    }

    #[must_use]
    pub fn apply(&self, doc: &Document) -> Document {
        match self.mode {
            Mode::Identity => doc.clone(),
            Mode::Include => {
                let mut out = Document::new();
                for (key, value) in doc {
                    if key == "_id" {
                        if self.keep_id {
                            out.insert(key.clone(), value.clone());
                        }
                        continue;
                    }
                    match self.fields.get(key) {
                        Some(Node::Leaf) => {
                            out.insert(key.clone(), value.clone());
                        }
                        Some(Node::Branch(sub)) => {
                            if let Some(v) = include_below(value, sub) {
                                out.insert(key.clone(), v);
                            }
                        }
                        None => {}
                    }
                }
                out
            }
            Mode::Exclude => {
                let mut out = doc.clone();
                if !self.keep_id {
                    out.remove("_id");
                }
                exclude_in(&mut out, &self.fields);
                out
            }
        }
    }
}

fn projection_flag(path: &str, flag: &Bson) -> Result<bool, DbError> {
    match flag {
        Bson::Boolean(_) | Bson::Int32(_) | Bson::Int64(_) => Ok(is_truthy(flag)),
        Bson::Double(_) | Bson::Decimal128(_) => Ok(as_f64(flag).is_some_and(|f| f != 0.0)),
        _ => Err(DbError::validation(format!("unsupported projection value for '{path}'"))),
    }
}

fn insert_path(tree: &mut IndexMap<String, Node>, path: &str) -> Result<(), DbError> {
    let mut cur = tree;
    let mut segments = path.split('.').peekable();
    while let Some(seg) = segments.next() {
        if segments.peek().is_none() {
            if cur.insert(seg.to_string(), Node::Leaf).is_some() {
                return Err(DbError::validation(format!("projection path collision at '{path}'")));
            }
            return Ok(());
        }
        let node = cur.entry(seg.to_string()).or_insert_with(|| Node::Branch(IndexMap::new()));
        cur = match node {
            Node::Branch(sub) => sub,
            Node::Leaf => {
                return Err(DbError::validation(format!("projection path collision at '{path}'")));
            }
        };
    }
    Ok(())
}

fn include_below(value: &Bson, sub: &IndexMap<String, Node>) -> Option<Bson> {
    match value {
        Bson::Document(d) => {
            let mut out = Document::new();
            for (key, v) in d {
                match sub.get(key) {
                    Some(Node::Leaf) => {
                        out.insert(key.clone(), v.clone());
                    }
                    Some(Node::Branch(deeper)) => {
                        if let Some(kept) = include_below(v, deeper) {
                            out.insert(key.clone(), kept);
                        }
                    }
                    None => {}
                }
            }
            Some(Bson::Document(out))
        }
        Bson::Array(items) => Some(Bson::Array(
            items
                .iter()
                .filter(|i| matches!(i, Bson::Document(_) | Bson::Array(_)))
                .filter_map(|i| include_below(i, sub))
                .collect(),
        )),
        _ => None,
    }
}

fn exclude_in(doc: &mut Document, tree: &IndexMap<String, Node>) {
    for (key, node) in tree {
        match node {
            Node::Leaf => {
                doc.remove(key);
            }
            Node::Branch(sub) => {
                if let Some(v) = doc.get_mut(key) {
                    exclude_below(v, sub);
                }
            }
        }
    }
}

fn exclude_below(value: &mut Bson, tree: &IndexMap<String, Node>) {
    match value {
        Bson::Document(d) => exclude_in(d, tree),
        Bson::Array(items) => items.iter_mut().for_each(|i| exclude_below(i, tree)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn project(spec: Document, d: &Document) -> Document {
        Projection::parse(&spec).unwrap().apply(d)
    }

    #[test]
    fn empty_spec_is_identity() {
        let d = doc! {"_id": 1, "a": 1};
        assert!(Projection::parse(&doc! {}).unwrap().is_identity());
        assert_eq!(project(doc! {}, &d), d);
    }

    #[test]
    fn inclusion_keeps_id_by_default() {
        let d = doc! {"_id": 1, "a": 1, "b": 2};
        assert_eq!(project(doc! {"a": 1}, &d), doc! {"_id": 1, "a": 1});
        assert_eq!(project(doc! {"a": true, "_id": 0}, &d), doc! {"a": 1});
        assert_eq!(project(doc! {"_id": 1}, &d), doc! {"_id": 1});
    }

    #[test]
    fn exclusion_drops_listed_fields() {
        let d = doc! {"_id": 1, "a": 1, "b": 2};
        assert_eq!(project(doc! {"a": 0}, &d), doc! {"_id": 1, "b": 2});
        assert_eq!(project(doc! {"_id": 0}, &d), doc! {"a": 1, "b": 2});
        assert_eq!(project(doc! {"_id": 1, "b": 0}, &d), doc! {"_id": 1, "a": 1});
    }

    #[test]
    fn mixed_modes_are_rejected() {
        assert!(matches!(
            Projection::parse(&doc! {"a": 1, "b": 0}),
            Err(DbError::Validation(_))
        ));
        assert!(Projection::parse(&doc! {"a": "x"}).is_err());
        assert!(Projection::parse(&doc! {"a": 1, "a.b": 1}).is_err());
    }

    #[test]
    fn dotted_paths_distribute_over_arrays() {
        let d = doc! {"_id": 1, "a": {"b": 1, "c": 2}, "items": [{"k": 1, "v": 2}, {"k": 3}, 7]};
        assert_eq!(
            project(doc! {"a.b": 1, "items.k": 1, "_id": 0}, &d),
            doc! {"a": {"b": 1}, "items": [{"k": 1}, {"k": 3}]}
        );
        assert_eq!(
            project(doc! {"items.k": 0, "a.c": 0}, &d),
            doc! {"_id": 1, "a": {"b": 1}, "items": [{"v": 2}, {}, 7]}
        );
    }
}
