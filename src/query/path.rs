//! Dotted-path resolution with array distribution ("multikey" semantics).

use bson::{Bson, Document};

/// One value produced by resolving a path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Candidate<'a> {
    /// The path ended on a document lacking the field.
    Nothing,
    Value(&'a Bson),
}

impl<'a> Candidate<'a> {
    #[must_use]
    pub const fn value(self) -> Option<&'a Bson> {
        match self {
            Self::Nothing => None,
            Self::Value(v) => Some(v),
        }
    }

    #[must_use]
    pub const fn is_nothing(self) -> bool {
        matches!(self, Self::Nothing)
    }
}

/// Resolves `path` against a document, returning every candidate value.
///
/// Arrays met along the way are indexed by numeric segments and otherwise distributed over:
/// each element that is a document holding the next key contributes its own candidates. Dead
/// ends contribute nothing.
#[must_use]
pub fn resolve<'a>(doc: &'a Document, path: &str) -> Vec<Candidate<'a>> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    resolve_in_document(doc, &segments, &mut out);
    out
}

/// Same as [`resolve`], rooted at an arbitrary value. An empty path yields the value itself.
#[must_use]
pub fn resolve_value<'a>(value: &'a Bson, path: &str) -> Vec<Candidate<'a>> {
    let mut out = Vec::new();
    if path.is_empty() {
        out.push(Candidate::Value(value));
        return out;
    }
    let segments: Vec<&str> = path.split('.').collect();
    resolve_in_value(value, &segments, &mut out);
    out
}

/// First candidate of `path`, or `Nothing`. This is the sort and group key of a document.
#[must_use]
pub fn first_candidate<'a>(doc: &'a Document, path: &str) -> Candidate<'a> {
    resolve(doc, path).into_iter().next().unwrap_or(Candidate::Nothing)
}

/// Plain lookup without array distribution; numeric segments index arrays.
#[must_use]
pub fn lookup<'a>(doc: &'a Document, segments: &[&str]) -> Option<&'a Bson> {
    let (head, rest) = segments.split_first()?;
    let mut cur = doc.get(*head)?;
    for seg in rest {
        cur = match cur {
            Bson::Document(d) => d.get(*seg)?,
            Bson::Array(items) => items.get(parse_index(seg)?)?,
            _ => return None,
        };
    }
    Some(cur)
}

/// Parses an array index segment. Only plain decimal digits qualify.
#[must_use]
pub fn parse_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

fn resolve_in_document<'a>(doc: &'a Document, segments: &[&str], out: &mut Vec<Candidate<'a>>) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    match doc.get(*head) {
        // A missing intermediate field reads as an empty document, so the path ends in NOTHING.
        None => out.push(Candidate::Nothing),
        Some(v) if rest.is_empty() => out.push(Candidate::Value(v)),
        Some(v) => resolve_in_value(v, rest, out),
    }
}

fn resolve_in_value<'a>(value: &'a Bson, segments: &[&str], out: &mut Vec<Candidate<'a>>) {
    match value {
        Bson::Document(d) => resolve_in_document(d, segments, out),
        Bson::Array(items) => resolve_in_array(items, segments, out),
        _ => {}
    }
}

fn resolve_in_array<'a>(items: &'a [Bson], segments: &[&str], out: &mut Vec<Candidate<'a>>) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if let Some(idx) = parse_index(head) {
        if let Some(item) = items.get(idx) {
            if rest.is_empty() {
                out.push(Candidate::Value(item));
            } else {
                resolve_in_value(item, rest, out);
            }
        }
        return;
    }
    for item in items {
        if let Bson::Document(d) = item
            && d.contains_key(*head)
        {
            resolve_in_document(d, segments, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn values<'a>(c: &[Candidate<'a>]) -> Vec<Option<&'a Bson>> {
        c.iter().map(|c| c.value()).collect()
    }

    #[test]
    fn plain_and_nested_fields() {
        let d = doc! {"a": 1, "b": {"c": "x"}};
        assert_eq!(values(&resolve(&d, "a")), vec![Some(&Bson::Int32(1))]);
        assert_eq!(values(&resolve(&d, "b.c")), vec![Some(&Bson::String("x".into()))]);
    }

    #[test]
    fn missing_terminal_is_nothing() {
        let d = doc! {"a": 1, "b": {"c": 1}};
        assert_eq!(resolve(&d, "z"), vec![Candidate::Nothing]);
        assert_eq!(resolve(&d, "b.z"), vec![Candidate::Nothing]);
        assert_eq!(resolve(&d, "y.z"), vec![Candidate::Nothing]);
    }

    #[test]
    fn scalar_intermediate_is_a_dead_end() {
        let d = doc! {"a": 1};
        assert!(resolve(&d, "a.b").is_empty());
    }

    #[test]
    fn arrays_distribute_and_index() {
        let d = doc! {"tags": [{"k": "x"}, {"k": "y"}, {"other": 1}, 5]};
        let got = resolve(&d, "tags.k");
        assert_eq!(got.len(), 2);
        assert_eq!(got[1].value(), Some(&Bson::String("y".into())));
        let got = resolve(&d, "tags.1.k");
        assert_eq!(values(&got), vec![Some(&Bson::String("y".into()))]);
        assert!(resolve(&d, "tags.9").is_empty());
        assert_eq!(values(&resolve(&d, "tags.3")), vec![Some(&Bson::Int32(5))]);
    }

    #[test]
    fn nested_arrays_of_documents() {
        let d = doc! {"a": [{"b": [{"c": 1}, {"c": 2}]}, {"b": [{"c": 3}]}]};
        let got: Vec<_> = resolve(&d, "a.b.c").into_iter().filter_map(Candidate::value).collect();
        assert_eq!(got, vec![&Bson::Int32(1), &Bson::Int32(2), &Bson::Int32(3)]);
    }

    #[test]
    fn lookup_does_not_distribute() {
        let d = doc! {"a": [{"b": 1}, {"b": 2}]};
        assert_eq!(lookup(&d, &["a", "1", "b"]), Some(&Bson::Int32(2)));
        assert_eq!(lookup(&d, &["a", "b"]), None);
    }

    #[test]
    fn index_segments_are_strict() {
        assert_eq!(parse_index("12"), Some(12));
        assert_eq!(parse_index("+1"), None);
        assert_eq!(parse_index("-1"), None);
        assert_eq!(parse_index(""), None);
    }
}
