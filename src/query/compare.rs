//! Equality and canonical ordering over BSON values.
//!
//! Equality is numeric across `Int32`/`Int64`/`Double`, element-wise for arrays and key-set
//! based for embedded documents. Ordering follows the canonical BSON type order: values of
//! different brackets compare by bracket, values in the same bracket compare by content.

use bson::{Bson, Document};
use std::cmp::Ordering;

/// Canonical sort bracket of a value. Numbers share one bracket, as do strings and symbols.
#[must_use]
pub fn type_bracket(v: &Bson) -> u8 {
    match v {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::DbPointer(_) => 12,
        Bson::JavaScriptCode(_) => 13,
        Bson::JavaScriptCodeWithScope(_) => 14,
        Bson::MaxKey => 255,
    }
}

#[must_use]
pub fn is_numeric(v: &Bson) -> bool {
    type_bracket(v) == 2
}

/// Integer view of `Int32`/`Int64` values.
#[must_use]
pub fn as_i64(v: &Bson) -> Option<i64> {
    match v {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        _ => None,
    }
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn as_f64(v: &Bson) -> Option<f64> {
    match v {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        Bson::Decimal128(d) => d.to_string().parse::<f64>().ok(),
        _ => None,
    }
}

/// Flag truthiness for `$exists` and projection values: `false`, null, undefined and numeric
/// zero are false. Everything else is true, empty strings included.
#[must_use]
pub fn is_truthy(v: &Bson) -> bool {
    match v {
        Bson::Boolean(b) => *b,
        Bson::Null | Bson::Undefined => false,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0,
        _ => true,
    }
}

#[must_use]
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    if is_numeric(a) && is_numeric(b) {
        return compare_numbers(a, b) == Ordering::Equal;
    }
    match (a, b) {
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Bson::Document(x), Bson::Document(y)) => documents_equal(x, y),
        (Bson::String(x) | Bson::Symbol(x), Bson::String(y) | Bson::Symbol(y)) => x == y,
        (Bson::Null | Bson::Undefined, Bson::Null | Bson::Undefined) => true,
        (Bson::RegularExpression(x), Bson::RegularExpression(y)) => {
            x.pattern.as_str() == y.pattern.as_str() && x.options.as_str() == y.options.as_str()
        }
        _ => a == b,
    }
}

#[must_use]
pub fn documents_equal(a: &Document, b: &Document) -> bool {
    a.len() == b.len()
        && a.iter().all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
}

/// Total order used for sorting and grouping.
#[must_use]
pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    let (ra, rb) = (type_bracket(a), type_bracket(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        _ if ra == 2 => compare_numbers(a, b),
        (Bson::String(x) | Bson::Symbol(x), Bson::String(y) | Bson::Symbol(y)) => x.cmp(y),
        (Bson::Document(x), Bson::Document(y)) => compare_documents(x, y),
        (Bson::Array(x), Bson::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let ord = compare_bson(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::Binary(x), Bson::Binary(y)) => {
            x.bytes.len().cmp(&y.bytes.len()).then_with(|| x.bytes.cmp(&y.bytes))
        }
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.timestamp_millis().cmp(&y.timestamp_millis()),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            (x.time, x.increment).cmp(&(y.time, y.increment))
        }
        (Bson::RegularExpression(x), Bson::RegularExpression(y)) => x
            .pattern
            .as_str()
            .cmp(y.pattern.as_str())
            .then_with(|| x.options.as_str().cmp(y.options.as_str())),
        (Bson::JavaScriptCode(x), Bson::JavaScriptCode(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Ordering for range operators: only values in the same type bracket are comparable.
#[must_use]
pub fn compare_for_query(a: &Bson, b: &Bson) -> Option<Ordering> {
    (type_bracket(a) == type_bracket(b)).then(|| compare_bson(a, b))
}

fn compare_documents(a: &Document, b: &Document) -> Ordering {
    for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
        let ord = type_bracket(va)
            .cmp(&type_bracket(vb))
            .then_with(|| ka.cmp(kb))
            .then_with(|| compare_bson(va, vb));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

fn compare_numbers(a: &Bson, b: &Bson) -> Ordering {
    if let (Some(x), Some(y)) = (as_i64(a), as_i64(b)) {
        return x.cmp(&y);
    }
    let x = as_f64(a).unwrap_or(f64::NAN);
    let y = as_f64(b).unwrap_or(f64::NAN);
    // NaN sorts below every other number and equals itself.
    match (x.is_nan(), y.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn numbers_compare_across_widths() {
        assert!(values_equal(&Bson::Int32(3), &Bson::Double(3.0)));
        assert!(values_equal(&Bson::Int64(3), &Bson::Int32(3)));
        assert!(!values_equal(&Bson::Int32(3), &Bson::String("3".into())));
        assert_eq!(compare_bson(&Bson::Int32(2), &Bson::Double(2.5)), Ordering::Less);
    }

    #[test]
    fn documents_ignore_field_order() {
        let a = Bson::Document(doc! {"x": 1, "y": 2});
        let b = Bson::Document(doc! {"y": 2, "x": 1.0});
        assert!(values_equal(&a, &b));
        assert!(!values_equal(&a, &Bson::Document(doc! {"x": 1})));
    }

    #[test]
    fn brackets_order_types() {
        assert_eq!(compare_bson(&Bson::Null, &Bson::Int32(0)), Ordering::Less);
        assert_eq!(compare_bson(&Bson::Int32(9), &Bson::String("a".into())), Ordering::Less);
        assert_eq!(compare_bson(&Bson::Boolean(false), &Bson::String("a".into())), Ordering::Greater);
        assert_eq!(compare_for_query(&Bson::Int32(1), &Bson::String("a".into())), None);
        assert_eq!(compare_for_query(&Bson::Int32(1), &Bson::Int64(0)), Some(Ordering::Greater));
    }

    #[test]
    fn nan_sorts_low() {
        assert_eq!(compare_bson(&Bson::Double(f64::NAN), &Bson::Int32(-5)), Ordering::Less);
        assert!(values_equal(&Bson::Double(f64::NAN), &Bson::Double(f64::NAN)));
    }

    #[test]
    fn truthiness() {
        assert!(is_truthy(&Bson::Int32(1)));
        assert!(!is_truthy(&Bson::Int32(0)));
        assert!(!is_truthy(&Bson::Null));
        assert!(is_truthy(&Bson::String(String::new())));
    }
}
