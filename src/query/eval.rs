use bson::{Bson, Document};
use std::cmp::Ordering;

use super::compare::{as_f64, as_i64, compare_bson, compare_for_query, values_equal};
use super::path::{Candidate, first_candidate, resolve};
use super::types::{CmpOp, Condition, ElemMatch, Filter, Literal, Operator, Order, SortSpec};

pub fn eval_filter(doc: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::And(fs) => fs.iter().all(|f| eval_filter(doc, f)),
        Filter::Or(fs) => fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Nor(fs) => !fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Field { path, condition } => condition_holds(condition, &candidates(doc, path)),
    }
}

/// Candidates of `path`; a path that dead-ends reads as absent.
pub(crate) fn candidates<'a>(doc: &'a Document, path: &str) -> Vec<Candidate<'a>> {
    let mut found = resolve(doc, path);
    if found.is_empty() {
        found.push(Candidate::Nothing);
    }
    found
}

/// Evaluates a field condition over the candidates of one path.
///
/// Each operator is satisfied independently by some candidate. `$ne` and `$nin` must hold for
/// every candidate, and `$not` negates its operand over the same candidate set.
pub(crate) fn condition_holds(cond: &Condition, cands: &[Candidate<'_>]) -> bool {
    match cond {
        Condition::Literal(lit) => cands.iter().any(|c| literal_matches(lit, *c)),
        Condition::Operators(ops) => ops.iter().all(|op| match op {
            Operator::Not(inner) => !condition_holds(inner, cands),
            Operator::Ne(_) | Operator::Nin(_) => cands.iter().all(|c| operator_holds(op, *c)),
            other => cands.iter().any(|c| operator_holds(other, *c)),
        }),
    }
}

impl ElemMatch {
    /// True when `value` is an array with at least one matching element.
    #[must_use]
    pub fn matches(&self, value: &Bson) -> bool {
        match value {
            Bson::Array(items) => items.iter().any(|item| self.matches_element(item)),
            _ => false,
        }
    }

    /// Tests a single element.
    #[must_use]
    pub fn matches_element(&self, item: &Bson) -> bool {
        match self {
            Self::Query(filter) => match item {
                Bson::Document(d) => eval_filter(d, filter),
                _ => false,
            },
            Self::Value(ops) => {
                let cands = [Candidate::Value(item)];
                ops.iter().all(|op| match op {
                    Operator::Not(inner) => !condition_holds(inner, &cands),
                    other => operator_holds(other, cands[0]),
                })
            }
        }
    }
}

fn literal_matches(lit: &Literal, cand: Candidate<'_>) -> bool {
    let Some(v) = cand.value() else {
        return false;
    };
    match lit {
        Literal::Value(operand) => equals_or_contains(v, operand),
        Literal::Pattern(p) => match v {
            Bson::Array(items) => p.is_match(v) || items.iter().any(|i| p.is_match(i)),
            _ => p.is_match(v),
        },
    }
}

fn equals_or_contains(v: &Bson, operand: &Bson) -> bool {
    if values_equal(v, operand) {
        return true;
    }
    matches!(v, Bson::Array(items) if items.iter().any(|i| values_equal(i, operand)))
}

fn operator_holds(op: &Operator, cand: Candidate<'_>) -> bool {
    match op {
        Operator::Exists(want) => *want != cand.is_nothing(),
        Operator::Ne(operand) => match cand.value() {
            None => true,
            Some(v) => !equals_or_contains(v, operand),
        },
        Operator::Nin(members) => !members.iter().any(|m| literal_matches(m, cand)),
        Operator::Not(inner) => !condition_holds(inner, &[cand]),
        _ => {
            let Some(v) = cand.value() else {
                return false;
            };
            value_operator_holds(op, v)
        }
    }
}

fn value_operator_holds(op: &Operator, v: &Bson) -> bool {
    let elements: &[Bson] = match v {
        Bson::Array(items) => items,
        _ => &[],
    };
    match op {
        Operator::Eq(operand) => equals_or_contains(v, operand),
        Operator::Cmp(cmp, operand) => {
            range_holds(*cmp, v, operand) || elements.iter().any(|e| range_holds(*cmp, e, operand))
        }
        Operator::In(members) => {
            members.iter().any(|m| literal_matches(m, Candidate::Value(v)))
        }
        Operator::All(required) => required.iter().all(|r| equals_or_contains(v, r)),
        Operator::Regex(p) => p.is_match(v) || elements.iter().any(|e| p.is_match(e)),
        Operator::ElemMatch(em) => em.matches(v),
        Operator::Size(n) => matches!(v, Bson::Array(items) if items.len() == *n),
        Operator::Mod { divisor, remainder } => {
            mod_holds(v, *divisor, *remainder)
                || elements.iter().any(|e| mod_holds(e, *divisor, *remainder))
        }
        Operator::Type(kinds) => kinds
            .iter()
            .any(|k| k.matches(v) || elements.iter().any(|e| k.matches(e))),
        Operator::Exists(_) | Operator::Ne(_) | Operator::Nin(_) | Operator::Not(_) => {
            operator_holds(op, Candidate::Value(v))
        }
    }
}

fn range_holds(cmp: CmpOp, v: &Bson, operand: &Bson) -> bool {
    let Some(ord) = compare_for_query(v, operand) else {
        return false;
    };
    match cmp {
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::Gte => ord != Ordering::Less,
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::Lte => ord != Ordering::Greater,
    }
}

fn mod_holds(v: &Bson, divisor: i64, remainder: i64) -> bool {
    #[allow(clippy::cast_possible_truncation)]
    let n = as_i64(v).or_else(|| as_f64(v).filter(|f| f.is_finite()).map(|f| f.trunc() as i64));
    n.is_some_and(|n| n.wrapping_rem(divisor) == remainder)
}

/// Orders two candidates; an absent field sorts before every value.
#[must_use]
pub fn compare_candidates(a: Candidate<'_>, b: Candidate<'_>) -> Ordering {
    match (a.value(), b.value()) {
        (Some(x), Some(y)) => compare_bson(x, y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// Compares by each sort key in turn, using the first candidate of the key's path.
#[must_use]
pub fn compare_docs(a: &Document, b: &Document, sort: &[SortSpec]) -> Ordering {
    for s in sort {
        let ord = compare_candidates(first_candidate(a, &s.field), first_candidate(b, &s.field));
        if ord != Ordering::Equal {
            return if matches!(s.order, Order::Asc) { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}
