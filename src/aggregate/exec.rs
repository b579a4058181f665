use bson::{Bson, Document};
use std::cmp::Ordering;

use super::types::{Accumulator, GroupSpec, Stage, UnwindSpec};
use crate::errors::DbError;
use crate::query::{compare_bson, compare_docs, eval_filter, is_numeric, lookup, values_equal};
use crate::update::set_path;
use crate::utils::num::usize_to_i64;

/// Runs compiled stages in order over `docs`.
///
/// # Errors
/// Propagates failures from stages that rewrite documents.
pub fn run_pipeline(mut docs: Vec<Document>, stages: &[Stage]) -> Result<Vec<Document>, DbError> {
    for stage in stages {
        docs = match stage {
            Stage::Match(filter) => docs.into_iter().filter(|d| eval_filter(d, filter)).collect(),
            Stage::Sort(keys) => {
                docs.sort_by(|a, b| compare_docs(a, b, keys));
                docs
            }
            Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
            Stage::Limit(n) => {
                docs.truncate(*n);
                docs
            }
            Stage::Group(spec) => group(&docs, spec),
            Stage::Project(p) => docs.iter().map(|d| p.apply(d)).collect(),
            Stage::Unwind(spec) => unwind(docs, spec)?,
            Stage::Count(field) => {
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let mut out = Document::new();
                    out.insert(field.clone(), count_value(docs.len()));
                    vec![out]
                }
            }
        };
        log::debug!("pipeline stage produced {} documents", docs.len());
    }
    Ok(docs)
}

/// Stable-sorts `(key, item)` pairs by key and yields each run of equal keys.
///
/// Document keys compare with their fields sorted by name, matching `values_equal`; each run
/// reports the key of its first item.
pub(crate) fn partition_by_key<T>(pairs: Vec<(Bson, T)>) -> Vec<(Bson, Vec<T>)> {
    let mut keyed: Vec<(Bson, Bson, T)> =
        pairs.into_iter().map(|(key, item)| (sorted_fields(&key), key, item)).collect();
    keyed.sort_by(|a, b| compare_bson(&a.0, &b.0));
    let mut runs: Vec<(Bson, Bson, Vec<T>)> = Vec::new();
    for (canon, key, item) in keyed {
        match runs.last_mut() {
            Some((c, _, items)) if compare_bson(c, &canon) == Ordering::Equal => items.push(item),
            _ => runs.push((canon, key, vec![item])),
        }
    }
    runs.into_iter().map(|(_, key, items)| (key, items)).collect()
}

fn sorted_fields(v: &Bson) -> Bson {
    match v {
        Bson::Document(d) => {
            let mut fields: Vec<(&String, &Bson)> = d.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            Bson::Document(fields.into_iter().map(|(k, v)| (k.clone(), sorted_fields(v))).collect())
        }
        Bson::Array(items) => Bson::Array(items.iter().map(sorted_fields).collect()),
        other => other.clone(),
    }
}

fn group(docs: &[Document], spec: &GroupSpec) -> Vec<Document> {
    let keyed: Vec<(Bson, &Document)> =
        docs.iter().map(|d| (spec.key.eval(d).unwrap_or(Bson::Null), d)).collect();
    partition_by_key(keyed)
        .into_iter()
        .map(|(key, members)| {
            let mut out = Document::new();
            out.insert("_id", key);
            for (name, acc) in &spec.fields {
                out.insert(name.clone(), accumulate(acc, &members));
            }
            out
        })
        .collect()
}

fn accumulate(acc: &Accumulator, members: &[&Document]) -> Bson {
    let expr = acc.expr();
    let values = members.iter().filter_map(|d| expr.eval(d));
    match acc {
        Accumulator::Sum(_) => sum(values.filter(is_numeric)),
        Accumulator::Avg(_) => {
            let nums: Vec<f64> = values.filter_map(|v| crate::query::as_f64(&v)).collect();
            if nums.is_empty() {
                Bson::Null
            } else {
                #[allow(clippy::cast_precision_loss)]
                let n = nums.len() as f64;
                Bson::Double(nums.iter().sum::<f64>() / n)
            }
        }
        Accumulator::Min(_) | Accumulator::Max(_) => {
            let want =
                if matches!(acc, Accumulator::Min(_)) { Ordering::Less } else { Ordering::Greater };
            values
                .filter(|v| !matches!(v, Bson::Null | Bson::Undefined))
                .reduce(|best, v| if compare_bson(&v, &best) == want { v } else { best })
                .unwrap_or(Bson::Null)
        }
        Accumulator::First(_) => members.first().and_then(|d| expr.eval(d)).unwrap_or(Bson::Null),
        Accumulator::Last(_) => members.last().and_then(|d| expr.eval(d)).unwrap_or(Bson::Null),
        Accumulator::Push(_) => Bson::Array(values.collect()),
        Accumulator::AddToSet(_) => {
            let mut out: Vec<Bson> = Vec::new();
            for v in values {
                if !out.iter().any(|seen| values_equal(seen, &v)) {
                    out.push(v);
                }
            }
            Bson::Array(out)
        }
    }
}

/// Integer sums stay integral (widening as needed); a double anywhere, or an `i64` overflow,
/// makes the sum a double.
fn sum(values: impl Iterator<Item = Bson>) -> Bson {
    let mut int: Option<i64> = Some(0);
    let mut float = 0.0f64;
    let mut saw_float = false;
    let mut wide = false;
    for v in values {
        let exact = match &v {
            Bson::Int32(i) => Some(i64::from(*i)),
            Bson::Int64(i) => {
                wide = true;
                Some(*i)
            }
            _ => {
                saw_float = true;
                None
            }
        };
        match (int, exact) {
            (Some(acc), Some(i)) => {
                if let Some(total) = acc.checked_add(i) {
                    int = Some(total);
                } else {
                    #[allow(clippy::cast_precision_loss)]
                    {
                        float += acc as f64 + i as f64;
                    }
                    int = None;
                }
            }
            _ => float += crate::query::as_f64(&v).unwrap_or(0.0),
        }
    }
    match int {
        Some(total) if !saw_float => match i32::try_from(total) {
            Ok(small) if !wide => Bson::Int32(small),
            _ => Bson::Int64(total),
        },
        #[allow(clippy::cast_precision_loss)]
        Some(total) => Bson::Double(total as f64 + float),
        None => Bson::Double(float),
    }
}

fn count_value(n: usize) -> Bson {
    i32::try_from(n).map_or_else(|_| Bson::Int64(usize_to_i64(n)), Bson::Int32)
}

fn unwind(docs: Vec<Document>, spec: &UnwindSpec) -> Result<Vec<Document>, DbError> {
    let segments: Vec<&str> = spec.path.split('.').collect();
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match lookup(&doc, &segments) {
            Some(Bson::Array(items)) if !items.is_empty() => {
                for item in items.clone() {
                    let mut copy = doc.clone();
                    set_path(&mut copy, &spec.path, item)?;
                    out.push(copy);
                }
            }
            Some(Bson::Array(_) | Bson::Null) | None => {
                if spec.preserve_null_and_empty {
                    out.push(doc);
                }
            }
            Some(_) => out.push(doc),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::parse_pipeline;
    use bson::doc;

    fn run(docs: Vec<Document>, pipeline: Vec<Document>) -> Vec<Document> {
        run_pipeline(docs, &parse_pipeline(&pipeline).unwrap()).unwrap()
    }

    fn sales() -> Vec<Document> {
        vec![
            doc! {"_id": 1, "city": "b", "amt": 5},
            doc! {"_id": 2, "city": "a", "amt": 1},
            doc! {"_id": 3, "city": "b", "amt": 2.5},
            doc! {"_id": 4, "amt": 7},
        ]
    }

    #[test]
    fn group_sorts_keys_and_folds() {
        let out = run(
            sales(),
            vec![doc! {"$group": {"_id": "$city", "n": {"$sum": 1}, "total": {"$sum": "$amt"}}}],
        );
        assert_eq!(
            out,
            vec![
                doc! {"_id": null, "n": 1, "total": 7},
                doc! {"_id": "a", "n": 1, "total": 1},
                doc! {"_id": "b", "n": 2, "total": 7.5},
            ]
        );
    }

    #[test]
    fn other_accumulators() {
        let out = run(
            sales(),
            vec![
                doc! {"$match": {"city": "b"}},
                doc! {"$group": {
                    "_id": null,
                    "avg": {"$avg": "$amt"},
                    "lo": {"$min": "$amt"},
                    "hi": {"$max": "$amt"},
                    "first": {"$first": "$_id"},
                    "last": {"$last": "$_id"},
                    "all": {"$push": "$city"},
                    "set": {"$addToSet": "$city"},
                }},
            ],
        );
        assert_eq!(
            out,
            vec![doc! {
                "_id": null, "avg": 3.75, "lo": 2.5, "hi": 5, "first": 1, "last": 3,
                "all": ["b", "b"], "set": ["b"],
            }]
        );
    }

    #[test]
    fn sort_skip_limit_project_count() {
        let out = run(
            sales(),
            vec![
                doc! {"$sort": {"amt": -1}},
                doc! {"$skip": 1},
                doc! {"$limit": 2},
                doc! {"$project": {"amt": 1, "_id": 0}},
            ],
        );
        assert_eq!(out, vec![doc! {"amt": 5}, doc! {"amt": 2.5}]);
        let out = run(sales(), vec![doc! {"$match": {"amt": {"$gt": 2}}}, doc! {"$count": "n"}]);
        assert_eq!(out, vec![doc! {"n": 3}]);
        assert!(run(sales(), vec![doc! {"$match": {"x": 1}}, doc! {"$count": "n"}]).is_empty());
    }

    #[test]
    fn integer_overflow_falls_back_to_double() {
        let big = Bson::Int64(i64::MAX);
        #[allow(clippy::cast_precision_loss)]
        let expected = i64::MAX as f64 * 2.0 - 5.5;
        let forward = vec![big.clone(), big.clone(), Bson::Double(-5.5)];
        assert_eq!(sum(forward.into_iter()), Bson::Double(expected));
        let backward = vec![Bson::Double(-5.5), big.clone(), big.clone()];
        assert_eq!(sum(backward.into_iter()), Bson::Double(expected));
        #[allow(clippy::cast_precision_loss)]
        let plus_one = i64::MAX as f64 + 1.0;
        assert_eq!(sum(vec![big.clone(), Bson::Int32(1)].into_iter()), Bson::Double(plus_one));
        assert_eq!(sum(vec![big, Bson::Int32(-1)].into_iter()), Bson::Int64(i64::MAX - 1));
    }

    #[test]
    fn unwind_expands_arrays() {
        let docs = vec![
            doc! {"_id": 1, "t": ["x", "y"]},
            doc! {"_id": 2, "t": []},
            doc! {"_id": 3},
            doc! {"_id": 4, "t": "z"},
        ];
        let out = run(docs.clone(), vec![doc! {"$unwind": "$t"}]);
        assert_eq!(
            out,
            vec![doc! {"_id": 1, "t": "x"}, doc! {"_id": 1, "t": "y"}, doc! {"_id": 4, "t": "z"}]
        );
        let out = run(docs, vec![doc! {"$unwind": {"path": "$t", "preserveNullAndEmptyArrays": true}}]);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn group_by_document_keys() {
        let docs = vec![
            doc! {"a": 1, "b": 1},
            doc! {"a": 1, "b": 2},
            doc! {"b": 1, "a": 1},
        ];
        let out = run(docs, vec![doc! {"$group": {"_id": {"a": "$a", "b": "$b"}, "n": {"$sum": 1}}}]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], doc! {"_id": {"a": 1, "b": 1}, "n": 2});
    }

    #[test]
    fn group_keys_ignore_field_order() {
        let docs = vec![
            doc! {"_id": 1, "k": {"x": 1, "y": 2}},
            doc! {"_id": 2, "k": {"y": 2, "x": 1}},
            doc! {"_id": 3, "k": {"x": 1, "y": 3}},
        ];
        let out = run(docs.clone(), vec![doc! {"$group": {"_id": "$k", "ids": {"$push": "$_id"}}}]);
        assert_eq!(
            out,
            vec![
                doc! {"_id": {"x": 1, "y": 2}, "ids": [1, 2]},
                doc! {"_id": {"x": 1, "y": 3}, "ids": [3]},
            ]
        );
        let matched = run(docs, vec![doc! {"$match": {"k": {"x": 1, "y": 2}}}]);
        assert_eq!(matched.len(), 2);
    }
}
