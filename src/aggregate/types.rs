use bson::{Bson, Document};

use crate::errors::DbError;
use crate::query::{Filter, Projection, SortSpec, first_candidate};

/// One compiled pipeline stage.
#[derive(Debug, Clone)]
pub enum Stage {
    Match(Filter),
    Sort(Vec<SortSpec>),
    Skip(usize),
    Limit(usize),
    Group(GroupSpec),
    Project(Projection),
    Unwind(UnwindSpec),
    /// Output field name.
    Count(String),
}

#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub key: Expr,
    pub fields: Vec<(String, Accumulator)>,
}

#[derive(Debug, Clone)]
pub struct UnwindSpec {
    pub path: String,
    pub preserve_null_and_empty: bool,
}

/// A value computed per document: a `"$path"` reference, a literal, or a document of those.
#[derive(Debug, Clone)]
pub enum Expr {
    Field(String),
    Literal(Bson),
    Object(Vec<(String, Expr)>),
}

impl Expr {
    /// # Errors
    /// Returns `DbError::Validation` for operator expressions, which are not supported.
    pub fn parse(v: &Bson) -> Result<Self, DbError> {
        match v {
            Bson::String(s) if s.starts_with('$') => {
                let path = &s[1..];
                crate::query::check_path(path)?;
                Ok(Self::Field(path.to_string()))
            }
            Bson::Document(d) => {
                if let Some(op) = d.keys().find(|k| k.starts_with('$')) {
                    return Err(DbError::validation(format!("unsupported expression operator: {op}")));
                }
                d.iter()
                    .map(|(k, v)| Ok((k.clone(), Self::parse(v)?)))
                    .collect::<Result<Vec<_>, DbError>>()
                    .map(Self::Object)
            }
            other => Ok(Self::Literal(other.clone())),
        }
    }

    /// Evaluates against `doc`; `None` when a referenced field is absent.
    #[must_use]
    pub fn eval(&self, doc: &Document) -> Option<Bson> {
        match self {
            Self::Field(path) => first_candidate(doc, path).value().cloned(),
            Self::Literal(v) => Some(v.clone()),
            Self::Object(fields) => {
                let mut out = Document::new();
                for (k, e) in fields {
                    if let Some(v) = e.eval(doc) {
                        out.insert(k.clone(), v);
                    }
                }
                Some(Bson::Document(out))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum Accumulator {
    Sum(Expr),
    Avg(Expr),
    Min(Expr),
    Max(Expr),
    First(Expr),
    Last(Expr),
    Push(Expr),
    AddToSet(Expr),
}

impl Accumulator {
    #[must_use]
    pub const fn expr(&self) -> &Expr {
        match self {
            Self::Sum(e)
            | Self::Avg(e)
            | Self::Min(e)
            | Self::Max(e)
            | Self::First(e)
            | Self::Last(e)
            | Self::Push(e)
            | Self::AddToSet(e) => e,
        }
    }
}
