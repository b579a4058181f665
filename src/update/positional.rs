//! Resolution of the positional `$` path segment.
//!
//! The element a `field.$` path targets is the first element of `field` satisfying every
//! condition the query places on `field` itself or below it. Positions are computed against
//! the document as it was before the update.

use bson::{Bson, Document};
use std::collections::HashMap;

use super::types::Modifier;
use crate::errors::DbError;
use crate::query::{Candidate, Condition, Filter, Operator, condition_holds, lookup, resolve_value};

enum ElementTest<'f> {
    /// A condition on the array field, applied to each element.
    Whole(&'f Condition),
    /// A condition on `field.rest`, applied below each element.
    Below(&'f str, &'f Condition),
}

/// Maps each positional prefix used by `mods` to the element index it designates.
///
/// # Errors
/// `DbError::OperationFailure` when the query does not pin down an element.
pub(crate) fn resolve_positions(
    doc: &Document,
    mods: &[Modifier],
    filter: &Filter,
) -> Result<HashMap<String, usize>, DbError> {
    let mut out = HashMap::new();
    for m in mods {
        let Some(prefix) = positional_prefix(&m.path) else {
            continue;
        };
        if out.contains_key(prefix) {
            continue;
        }
        let idx = first_matching_element(doc, prefix, filter).ok_or_else(|| {
            DbError::failure(format!(
                "the positional operator did not find the match needed from the query for '{}'",
                m.path
            ))
        })?;
        out.insert(prefix.to_string(), idx);
    }
    Ok(out)
}

/// The part of `path` before its `$` segment, if it has one.
pub(crate) fn positional_prefix(path: &str) -> Option<&str> {
    if path.starts_with("$.") || path == "$" {
        return Some("");
    }
    path.find(".$")
        .filter(|&i| path[i + 2..].is_empty() || path[i + 2..].starts_with('.'))
        .map(|i| &path[..i])
}

/// Substitutes the resolved index for the `$` segment.
pub(crate) fn concrete_path(path: &str, positions: &HashMap<String, usize>) -> String {
    let Some(prefix) = positional_prefix(path) else {
        return path.to_string();
    };
    let idx = positions.get(prefix).copied().unwrap_or_default();
    path.split('.')
        .map(|s| if s == "$" { idx.to_string() } else { s.to_string() })
        .collect::<Vec<_>>()
        .join(".")
}

fn first_matching_element(doc: &Document, prefix: &str, filter: &Filter) -> Option<usize> {
    if prefix.is_empty() {
        return None;
    }
    let segments: Vec<&str> = prefix.split('.').collect();
    let Some(Bson::Array(items)) = lookup(doc, &segments) else {
        return None;
    };
    let mut tests = Vec::new();
    collect_tests(filter, prefix, &mut tests);
    if tests.is_empty() {
        return None;
    }
    items.iter().position(|item| tests.iter().all(|t| element_passes(t, item)))
}

fn collect_tests<'f>(filter: &'f Filter, prefix: &str, out: &mut Vec<ElementTest<'f>>) {
    match filter {
        Filter::And(clauses) => clauses.iter().for_each(|c| collect_tests(c, prefix, out)),
        Filter::Field { path, condition } => {
            if path == prefix {
                out.push(ElementTest::Whole(condition));
            } else if let Some(rest) = path.strip_prefix(prefix)
                && let Some(rest) = rest.strip_prefix('.')
            {
                out.push(ElementTest::Below(rest, condition));
            }
        }
        Filter::Or(_) | Filter::Nor(_) => {}
    }
}

fn element_passes(test: &ElementTest<'_>, item: &Bson) -> bool {
    match test {
        ElementTest::Whole(Condition::Operators(ops)) => ops.iter().all(|op| match op {
            Operator::ElemMatch(em) => em.matches_element(item),
            other => condition_holds(
                &Condition::Operators(vec![other.clone()]),
                &[Candidate::Value(item)],
            ),
        }),
        ElementTest::Whole(cond) => condition_holds(cond, &[Candidate::Value(item)]),
        ElementTest::Below(rest, cond) => {
            let mut cands = resolve_value(item, rest);
            if cands.is_empty() {
                cands.push(Candidate::Nothing);
            }
            condition_holds(cond, &cands)
        }
    }
}
