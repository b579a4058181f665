use bson::{Bson, Document};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::errors::DbError;

// Guards against pathological input
pub(crate) const MAX_PATH_DEPTH: usize = 100;
pub(crate) const MAX_ARRAY_PADDING: usize = 1_500_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Desc }
    }
}

/// Options for `Collection::find`.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub projection: Option<Document>,
    pub sort: Option<Vec<SortSpec>>,
    pub skip: Option<usize>,
    /// `Some(0)` means no limit.
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

/// A compiled query.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Every clause holds. Top-level keys and `$and` both compile to this.
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Field { path: String, condition: Condition },
}

impl Filter {
    /// Matches every document.
    #[must_use]
    pub const fn everything() -> Self {
        Self::And(Vec::new())
    }

    /// `{_id: id}`.
    #[must_use]
    pub fn by_id(id: Bson) -> Self {
        Self::And(vec![Self::Field {
            path: "_id".to_string(),
            condition: Condition::Literal(Literal::Value(id)),
        }])
    }
}

/// What a single field must satisfy.
#[derive(Debug, Clone)]
pub enum Condition {
    Literal(Literal),
    /// Implicit AND across operators on one field.
    Operators(Vec<Operator>),
}

/// A value compared by equality, or a compiled pattern.
#[derive(Debug, Clone)]
pub enum Literal {
    Value(Bson),
    Pattern(Pattern),
}

#[derive(Debug, Clone)]
pub enum Operator {
    Eq(Bson),
    Ne(Bson),
    Cmp(CmpOp, Bson),
    In(Vec<Literal>),
    Nin(Vec<Literal>),
    All(Vec<Bson>),
    Exists(bool),
    Regex(Pattern),
    ElemMatch(ElemMatch),
    Not(Box<Condition>),
    Size(usize),
    Mod { divisor: i64, remainder: i64 },
    Type(Vec<BsonKind>),
}

/// Operand of `$elemMatch`, and of `$pull` when given a mapping.
#[derive(Debug, Clone)]
pub enum ElemMatch {
    /// Elements are documents matched as a query.
    Query(Box<Filter>),
    /// Elements are values tested against field operators, e.g. `{$gte: 80}`.
    Value(Vec<Operator>),
}

/// A regular expression operand with its source kept for diagnostics.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    options: String,
    regex: Regex,
}

impl Pattern {
    /// Compiles `source` with MongoDB-style option letters (`i`, `m`, `s`, `x`).
    ///
    /// # Errors
    /// Unknown options or an invalid expression yield `DbError::Validation`.
    pub fn new(source: &str, options: &str) -> Result<Self, DbError> {
        let mut builder = RegexBuilder::new(source);
        for flag in options.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'x' => builder.ignore_whitespace(true),
                other => {
                    return Err(DbError::validation(format!("invalid regex option: {other}")));
                }
            };
        }
        let regex = builder
            .build()
            .map_err(|e| DbError::validation(format!("invalid regex /{source}/: {e}")))?;
        Ok(Self { source: source.to_string(), options: options.to_string(), regex })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn options(&self) -> &str {
        &self.options
    }

    /// True for strings (and symbols) the expression matches. Other values never match.
    #[must_use]
    pub fn is_match(&self, v: &Bson) -> bool {
        match v {
            Bson::String(s) | Bson::Symbol(s) => self.regex.is_match(s),
            _ => false,
        }
    }
}

/// Type names accepted by `$type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BsonKind {
    Double,
    String,
    Object,
    Array,
    Binary,
    ObjectId,
    Bool,
    Date,
    Null,
    Regex,
    Int,
    Timestamp,
    Long,
    Decimal,
    /// Any numeric type.
    Number,
}

impl BsonKind {
    #[must_use]
    pub fn from_alias(alias: &str) -> Option<Self> {
        Some(match alias {
            "double" => Self::Double,
            "string" => Self::String,
            "object" => Self::Object,
            "array" => Self::Array,
            "binData" => Self::Binary,
            "objectId" => Self::ObjectId,
            "bool" => Self::Bool,
            "date" => Self::Date,
            "null" => Self::Null,
            "regex" => Self::Regex,
            "int" => Self::Int,
            "timestamp" => Self::Timestamp,
            "long" => Self::Long,
            "decimal" => Self::Decimal,
            "number" => Self::Number,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            1 => Self::Double,
            2 => Self::String,
            3 => Self::Object,
            4 => Self::Array,
            5 => Self::Binary,
            7 => Self::ObjectId,
            8 => Self::Bool,
            9 => Self::Date,
            10 => Self::Null,
            11 => Self::Regex,
            16 => Self::Int,
            17 => Self::Timestamp,
            18 => Self::Long,
            19 => Self::Decimal,
            _ => return None,
        })
    }

    #[must_use]
    pub fn matches(self, v: &Bson) -> bool {
        matches!(
            (self, v),
            (Self::Double | Self::Number, Bson::Double(_))
                | (Self::Int | Self::Number, Bson::Int32(_))
                | (Self::Long | Self::Number, Bson::Int64(_))
                | (Self::Decimal | Self::Number, Bson::Decimal128(_))
                | (Self::String, Bson::String(_))
                | (Self::Object, Bson::Document(_))
                | (Self::Array, Bson::Array(_))
                | (Self::Binary, Bson::Binary(_))
                | (Self::ObjectId, Bson::ObjectId(_))
                | (Self::Bool, Bson::Boolean(_))
                | (Self::Date, Bson::DateTime(_))
                | (Self::Null, Bson::Null)
                | (Self::Regex, Bson::RegularExpression(_))
                | (Self::Timestamp, Bson::Timestamp(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_options() {
        let p = Pattern::new("^ab", "i").unwrap();
        assert!(p.is_match(&Bson::String("ABc".into())));
        assert!(!p.is_match(&Bson::Int32(1)));
        assert!(Pattern::new("a", "q").is_err());
        assert!(Pattern::new("(", "").is_err());
    }

    #[test]
    fn type_aliases_and_codes_agree() {
        assert_eq!(BsonKind::from_alias("int"), BsonKind::from_code(16));
        assert!(BsonKind::Number.matches(&Bson::Int64(1)));
        assert!(!BsonKind::String.matches(&Bson::Int64(1)));
        assert_eq!(BsonKind::from_alias("nope"), None);
    }
}
