use bson::{Bson, DateTime, Document, Timestamp};
use std::cmp::Ordering;

use super::positional::{concrete_path, resolve_positions};
use super::types::{DateKind, Modifier, ModifierOp, PopEnd, PullCriteria, PushSpec, UpdateSpec};
use crate::errors::DbError;
use crate::query::{
    Filter, MAX_ARRAY_PADDING, as_f64, compare_bson, is_numeric, parse_index, values_equal,
};

/// Applies `spec` to `doc`, returning whether anything changed.
///
/// The update runs on a working copy that replaces `doc` only when every modifier succeeded.
/// `filter` is the query that selected the document; positional paths are resolved against it.
/// `inserting` is set when the document is being created by an upsert.
///
/// # Errors
/// `DbError::OperationFailure` for type mismatches, positional misses and `_id` changes.
pub fn apply_update(
    doc: &mut Document,
    spec: &UpdateSpec,
    filter: &Filter,
    inserting: bool,
) -> Result<bool, DbError> {
    let updated = match spec {
        UpdateSpec::Replace(replacement) => replace(doc, replacement)?,
        UpdateSpec::Modify(mods) => modify(doc, mods, filter, inserting)?,
    };
    let modified = updated != *doc;
    *doc = updated;
    Ok(modified)
}

fn replace(doc: &Document, replacement: &Document) -> Result<Document, DbError> {
    let mut out = Document::new();
    match (doc.get("_id"), replacement.get("_id")) {
        (Some(old), Some(new)) if !values_equal(old, new) => {
            return Err(immutable_id());
        }
        (Some(id), _) | (None, Some(id)) => {
            out.insert("_id", id.clone());
        }
        (None, None) => {}
    }
    for (k, v) in replacement {
        if k != "_id" {
            out.insert(k.clone(), v.clone());
        }
    }
    Ok(out)
}

fn modify(
    doc: &Document,
    mods: &[Modifier],
    filter: &Filter,
    inserting: bool,
) -> Result<Document, DbError> {
    let positions = resolve_positions(doc, mods, filter)?;
    let mut work = doc.clone();
    for m in mods {
        let path = concrete_path(&m.path, &positions);
        apply_modifier(&mut work, &path, &m.op, inserting)?;
    }
    if let Some(old) = doc.get("_id")
        && !work.get("_id").is_some_and(|new| values_equal(old, new))
    {
        return Err(immutable_id());
    }
    Ok(work)
}

fn immutable_id() -> DbError {
    DbError::failure("performing an update on the path '_id' would modify the immutable field '_id'")
}

fn apply_modifier(
    doc: &mut Document,
    path: &str,
    op: &ModifierOp,
    inserting: bool,
) -> Result<(), DbError> {
    match op {
        ModifierOp::Set(v) => set_path(doc, path, v.clone()),
        ModifierOp::SetOnInsert(v) => {
            if inserting {
                set_path(doc, path, v.clone())?;
            }
            Ok(())
        }
        ModifierOp::Unset => {
            if let Some(mut slot) = Slot::find(doc, path)? {
                slot.remove();
            }
            Ok(())
        }
        ModifierOp::Inc(n) => {
            let mut slot = Slot::create(doc, path)?;
            let next = match slot.get() {
                None => n.clone(),
                Some(cur) => add_numbers(cur, n, path)?,
            };
            slot.set(next);
            Ok(())
        }
        ModifierOp::Mul(n) => {
            let mut slot = Slot::create(doc, path)?;
            let next = match slot.get() {
                None => multiply_numbers(&Bson::Int32(0), n, path)?,
                Some(cur) => multiply_numbers(cur, n, path)?,
            };
            slot.set(next);
            Ok(())
        }
        ModifierOp::Min(v) | ModifierOp::Max(v) => {
            let wanted =
                if matches!(op, ModifierOp::Min(_)) { Ordering::Less } else { Ordering::Greater };
            let mut slot = Slot::create(doc, path)?;
            if slot.get().is_none_or(|cur| compare_bson(v, cur) == wanted) {
                slot.set(v.clone());
            }
            Ok(())
        }
        ModifierOp::Rename(target) => {
            let taken = match Slot::find(doc, path)? {
                Some(mut slot) => slot.take(),
                None => None,
            };
            if let Some(v) = taken {
                set_path(doc, target, v)?;
            }
            Ok(())
        }
        ModifierOp::AddToSet(values) => {
            let items = Slot::create(doc, path)?.array_or_init(path, "$addToSet")?;
            for v in values {
                if !items.iter().any(|i| values_equal(i, v)) {
                    items.push(v.clone());
                }
            }
            Ok(())
        }
        ModifierOp::Push(push) => {
            let items = Slot::create(doc, path)?.array_or_init(path, "$push")?;
            push_into(items, push);
            Ok(())
        }
        ModifierOp::Pull(criteria) => {
            if let Some(items) = existing_array(doc, path, "$pull")? {
                items.retain(|item| match criteria {
                    PullCriteria::Equals(v) => !values_equal(item, v),
                    PullCriteria::Matching(em) => !em.matches_element(item),
                });
            }
            Ok(())
        }
        ModifierOp::PullAll(values) => {
            if let Some(items) = existing_array(doc, path, "$pullAll")? {
                items.retain(|item| !values.iter().any(|v| values_equal(item, v)));
            }
            Ok(())
        }
        ModifierOp::Pop(end) => {
            if let Some(items) = existing_array(doc, path, "$pop")?
                && !items.is_empty()
            {
                match end {
                    PopEnd::First => {
                        items.remove(0);
                    }
                    PopEnd::Last => {
                        items.pop();
                    }
                }
            }
            Ok(())
        }
        ModifierOp::CurrentDate(kind) => {
            let now = DateTime::now();
            let value = match kind {
                DateKind::Date => Bson::DateTime(now),
                DateKind::Timestamp => Bson::Timestamp(Timestamp {
                    time: u32::try_from(now.timestamp_millis() / 1000).unwrap_or(u32::MAX),
                    increment: 0,
                }),
            };
            set_path(doc, path, value)
        }
    }
}

/// Assigns `value` at `path`, creating intermediate documents and padding arrays with null.
///
/// # Errors
/// `DbError::OperationFailure` when a scalar sits in the way.
pub(crate) fn set_path(doc: &mut Document, path: &str, value: Bson) -> Result<(), DbError> {
    Slot::create(doc, path)?.set(value);
    Ok(())
}

fn existing_array<'a>(
    doc: &'a mut Document,
    path: &str,
    op: &str,
) -> Result<Option<&'a mut Vec<Bson>>, DbError> {
    let Some(slot) = Slot::find(doc, path)? else {
        return Ok(None);
    };
    match slot.into_value() {
        None => Ok(None),
        Some(Bson::Array(items)) => Ok(Some(items)),
        Some(_) => {
            Err(DbError::failure(format!("cannot apply {op} to a non-array value at '{path}'")))
        }
    }
}

fn push_into(items: &mut Vec<Bson>, push: &PushSpec) {
    let len = items.len();
    let at = match push.position {
        None => len,
        Some(p) if p >= 0 => usize::try_from(p).map_or(len, |p| p.min(len)),
        Some(p) => len.saturating_sub(usize::try_from(p.unsigned_abs()).unwrap_or(usize::MAX)),
    };
    items.splice(at..at, push.values.iter().cloned());
    if let Some(slice) = push.slice {
        let keep = usize::try_from(slice.unsigned_abs()).unwrap_or(usize::MAX);
        if slice >= 0 {
            items.truncate(keep);
        } else if items.len() > keep {
            items.drain(..items.len() - keep);
        }
    }
}

/// Sum of two numbers. `Int32` overflow widens to `Int64`; anything involving a double (or
/// decimal) is computed as a double.
fn add_numbers(cur: &Bson, n: &Bson, path: &str) -> Result<Bson, DbError> {
    arithmetic(cur, n, path, "$inc", i32::checked_add, i64::checked_add, |a, b| a + b)
}

fn multiply_numbers(cur: &Bson, n: &Bson, path: &str) -> Result<Bson, DbError> {
    arithmetic(cur, n, path, "$mul", i32::checked_mul, i64::checked_mul, |a, b| a * b)
}

fn arithmetic(
    cur: &Bson,
    n: &Bson,
    path: &str,
    op: &str,
    int32: fn(i32, i32) -> Option<i32>,
    int64: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Result<Bson, DbError> {
    if !is_numeric(cur) {
        return Err(DbError::failure(format!(
            "cannot apply {op} to a value of non-numeric type at '{path}'"
        )));
    }
    let wide = |v: &Bson| match v {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        _ => None,
    };
    if let (Bson::Int32(a), Bson::Int32(b)) = (cur, n)
        && let Some(r) = int32(*a, *b)
    {
        return Ok(Bson::Int32(r));
    }
    if let (Some(a), Some(b)) = (wide(cur), wide(n)) {
        return int64(a, b).map(Bson::Int64).ok_or_else(|| {
            DbError::failure(format!("integer overflow applying {op} at '{path}'"))
        });
    }
    match (as_f64(cur), as_f64(n)) {
        (Some(a), Some(b)) => Ok(Bson::Double(float(a, b))),
        _ => Err(DbError::failure(format!("cannot apply {op} at '{path}'"))),
    }
}

enum Container<'a> {
    Doc(&'a mut Document),
    Arr(&'a mut Vec<Bson>),
}

/// The location a modifier writes to: a field of a document or an index of an array. An index
/// equal to the array length names the slot one past the end.
enum Slot<'a> {
    Field(&'a mut Document, String),
    Index(&'a mut Vec<Bson>, usize),
}

impl<'a> Slot<'a> {
    /// Locates `path`, creating whatever is missing on the way.
    fn create(doc: &'a mut Document, path: &str) -> Result<Self, DbError> {
        Self::locate(doc, path, true)?
            .ok_or_else(|| DbError::failure(format!("cannot create field at '{path}'")))
    }

    /// Locates `path` without creating anything. `None` when it does not exist.
    fn find(doc: &'a mut Document, path: &str) -> Result<Option<Self>, DbError> {
        Self::locate(doc, path, false)
    }

    fn locate(doc: &'a mut Document, path: &str, create: bool) -> Result<Option<Self>, DbError> {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return Ok(None);
        };
        let mut cur = Container::Doc(doc);
        for seg in parents {
            let next = match cur {
                Container::Doc(d) => {
                    if !d.contains_key(*seg) {
                        if !create {
                            return Ok(None);
                        }
                        d.insert(*seg, Document::new());
                    }
                    d.get_mut(*seg)
                }
                Container::Arr(items) => {
                    let Some(idx) = parse_index(seg) else {
                        return blocked(create, path, seg);
                    };
                    if idx >= items.len() {
                        if !create {
                            return Ok(None);
                        }
                        pad(items, idx, path)?;
                        items.push(Bson::Document(Document::new()));
                    }
                    items.get_mut(idx)
                }
            };
            cur = match next {
                Some(Bson::Document(sub)) => Container::Doc(sub),
                Some(Bson::Array(items)) => Container::Arr(items),
                _ => return blocked(create, path, seg),
            };
        }
        match cur {
            Container::Doc(d) => Ok(Some(Slot::Field(d, (*last).to_string()))),
            Container::Arr(items) => {
                let Some(idx) = parse_index(last) else {
                    return blocked(create, path, last);
                };
                if idx > items.len() {
                    if !create {
                        return Ok(None);
                    }
                    pad(items, idx, path)?;
                }
                Ok(Some(Slot::Index(items, idx)))
            }
        }
    }

    fn get(&self) -> Option<&Bson> {
        match self {
            Slot::Field(d, k) => d.get(k.as_str()),
            Slot::Index(items, i) => items.get(*i),
        }
    }

    fn into_value(self) -> Option<&'a mut Bson> {
        match self {
            Slot::Field(d, k) => d.get_mut(k.as_str()),
            Slot::Index(items, i) => items.get_mut(i),
        }
    }

    fn set(&mut self, value: Bson) {
        match self {
            Slot::Field(d, k) => {
                d.insert(k.clone(), value);
            }
            Slot::Index(items, i) => {
                if *i < items.len() {
                    items[*i] = value;
                } else {
                    items.push(value);
                }
            }
        }
    }

    /// Removes the value. Array slots keep their place and become null.
    fn remove(&mut self) {
        match self {
            Slot::Field(d, k) => {
                d.remove(k.as_str());
            }
            Slot::Index(items, i) => {
                if let Some(v) = items.get_mut(*i) {
                    *v = Bson::Null;
                }
            }
        }
    }

    fn take(&mut self) -> Option<Bson> {
        match self {
            Slot::Field(d, k) => d.remove(k.as_str()),
            Slot::Index(items, i) => items.get_mut(*i).map(|v| std::mem::replace(v, Bson::Null)),
        }
    }

    /// The array at this slot, created empty when absent.
    fn array_or_init(mut self, path: &str, op: &str) -> Result<&'a mut Vec<Bson>, DbError> {
        if self.get().is_none() {
            self.set(Bson::Array(Vec::new()));
        }
        match self.into_value() {
            Some(Bson::Array(items)) => Ok(items),
            _ => Err(DbError::failure(format!("cannot apply {op} to a non-array value at '{path}'"))),
        }
    }
}

fn blocked<T>(create: bool, path: &str, seg: &str) -> Result<Option<T>, DbError> {
    if create {
        Err(DbError::failure(format!("cannot create field '{seg}' along '{path}'")))
    } else {
        Ok(None)
    }
}

fn pad(items: &mut Vec<Bson>, upto: usize, path: &str) -> Result<(), DbError> {
    if upto.saturating_sub(items.len()) > MAX_ARRAY_PADDING {
        return Err(DbError::failure(format!("refusing to pad array at '{path}' to {upto}")));
    }
    items.resize(upto.max(items.len()), Bson::Null);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn run(doc: &mut Document, update: Document) -> Result<bool, DbError> {
        run_with(doc, doc! {}, update)
    }

    fn run_with(doc: &mut Document, query: Document, update: Document) -> Result<bool, DbError> {
        let spec = UpdateSpec::parse(&update)?;
        apply_update(doc, &spec, &Filter::parse(&query)?, false)
    }

    #[test]
    fn set_creates_levels_and_pads_arrays() {
        let mut d = doc! {"_id": 1, "arr": [1]};
        run(&mut d, doc! {"$set": {"a.b.c": 1, "arr.3": 9}}).unwrap();
        assert_eq!(d, doc! {"_id": 1, "arr": [1, null, null, 9], "a": {"b": {"c": 1}}});
    }

    #[test]
    fn set_through_scalar_fails_atomically() {
        let mut d = doc! {"_id": 1, "a": 1, "n": 0};
        let before = d.clone();
        let err = run(&mut d, doc! {"$inc": {"n": 1}, "$set": {"a.b": 2}}).unwrap_err();
        assert!(matches!(err, DbError::OperationFailure(_)));
        assert_eq!(d, before);
    }

    #[test]
    fn unset_fields_and_array_slots() {
        let mut d = doc! {"_id": 1, "a": 1, "arr": [1, 2]};
        assert!(run(&mut d, doc! {"$unset": {"a": "", "arr.0": "", "nope.x": ""}}).unwrap());
        assert_eq!(d, doc! {"_id": 1, "arr": [null, 2]});
    }

    #[test]
    fn inc_widens_on_overflow() {
        let mut d = doc! {"_id": 1, "n": i32::MAX, "f": 1.5};
        run(&mut d, doc! {"$inc": {"n": 1, "f": 1, "new": 5}}).unwrap();
        assert_eq!(d.get("n"), Some(&Bson::Int64(i64::from(i32::MAX) + 1)));
        assert_eq!(d.get("f"), Some(&Bson::Double(2.5)));
        assert_eq!(d.get("new"), Some(&Bson::Int32(5)));
        assert!(run(&mut doc! {"s": "x"}, doc! {"$inc": {"s": 1}}).is_err());
    }

    #[test]
    fn mul_min_max() {
        let mut d = doc! {"_id": 1, "p": 3, "lo": 5, "hi": 5};
        run(&mut d, doc! {"$mul": {"p": 2, "q": 4}, "$min": {"lo": 2}, "$max": {"hi": 1}}).unwrap();
        assert_eq!(d, doc! {"_id": 1, "p": 6, "lo": 2, "hi": 5, "q": 0});
    }

    #[test]
    fn add_to_set_and_push() {
        let mut d = doc! {"_id": 1, "tags": ["a"]};
        run(&mut d, doc! {"$addToSet": {"tags": {"$each": ["a", "b"]}}, "$push": {"log": 1}}).unwrap();
        assert_eq!(d, doc! {"_id": 1, "tags": ["a", "b"], "log": [1]});
        run(&mut d, doc! {"$push": {"log": {"$each": [2, 3], "$position": 0, "$slice": 2}}}).unwrap();
        assert_eq!(d.get_array("log").unwrap(), &vec![Bson::Int32(2), Bson::Int32(3)]);
        assert!(run(&mut doc! {"t": 1}, doc! {"$push": {"t": 2}}).is_err());
    }

    #[test]
    fn pull_forms() {
        let mut d = doc! {"_id": 1, "s": [1, 5, 7, 5], "docs": [{"k": 1}, {"k": 2}]};
        run(&mut d, doc! {"$pull": {"s": 5, "docs": {"k": 2}}}).unwrap();
        assert_eq!(d, doc! {"_id": 1, "s": [1, 7], "docs": [{"k": 1}]});
        run(&mut d, doc! {"$pull": {"s": {"$gte": 6}}}).unwrap();
        assert_eq!(d.get_array("s").unwrap(), &vec![Bson::Int32(1)]);
        run(&mut d, doc! {"$pullAll": {"s": [1]}}).unwrap();
        assert!(d.get_array("s").unwrap().is_empty());
    }

    #[test]
    fn pop_and_rename() {
        let mut d = doc! {"_id": 1, "a": [1, 2, 3], "old": "v"};
        run(&mut d, doc! {"$pop": {"a": -1}, "$rename": {"old": "nested.new"}}).unwrap();
        assert_eq!(d, doc! {"_id": 1, "a": [2, 3], "nested": {"new": "v"}});
    }

    #[test]
    fn id_is_immutable() {
        let mut d = doc! {"_id": 1, "a": 1};
        assert!(matches!(run(&mut d, doc! {"$set": {"_id": 2}}), Err(DbError::OperationFailure(_))));
        assert!(!run(&mut d, doc! {"$set": {"_id": 1}}).unwrap());
        assert!(matches!(run(&mut d, doc! {"_id": 3, "b": 1}), Err(DbError::OperationFailure(_))));
    }

    #[test]
    fn replacement_keeps_id_first() {
        let mut d = doc! {"_id": 1, "a": 1};
        assert!(run(&mut d, doc! {"b": 2}).unwrap());
        assert_eq!(d, doc! {"_id": 1, "b": 2});
    }

    #[test]
    fn set_on_insert_only_when_inserting() {
        let spec = UpdateSpec::parse(&doc! {"$setOnInsert": {"c": 1}}).unwrap();
        let mut d = doc! {"_id": 1};
        assert!(!apply_update(&mut d, &spec, &Filter::everything(), false).unwrap());
        assert!(apply_update(&mut d, &spec, &Filter::everything(), true).unwrap());
        assert_eq!(d, doc! {"_id": 1, "c": 1});
    }

    #[test]
    fn positional_targets_resolved_once() {
        let mut d = doc! {"_id": 1, "grades": [80, 85, 90]};
        run_with(&mut d, doc! {"grades": 85}, doc! {"$set": {"grades.$": 82}}).unwrap();
        assert_eq!(d.get_array("grades").unwrap()[1], Bson::Int32(82));
        let mut d = doc! {"_id": 1, "items": [{"k": "x", "q": 1}, {"k": "y", "q": 1}]};
        run_with(
            &mut d,
            doc! {"items.k": "y"},
            doc! {"$set": {"items.$.k": "z"}, "$inc": {"items.$.q": 4}},
        )
        .unwrap();
        assert_eq!(d.get_array("items").unwrap()[1], Bson::Document(doc! {"k": "z", "q": 5}));
    }

    #[test]
    fn current_date_sets_a_date() {
        let mut d = doc! {"_id": 1};
        run(&mut d, doc! {"$currentDate": {"at": true, "ts": {"$type": "timestamp"}}}).unwrap();
        assert!(matches!(d.get("at"), Some(Bson::DateTime(_))));
        assert!(matches!(d.get("ts"), Some(Bson::Timestamp(_))));
    }
}
