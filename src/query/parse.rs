use bson::{Bson, Document};

use super::compare::{as_f64, as_i64, is_truthy};
use super::types::{
    BsonKind, CmpOp, Condition, ElemMatch, Filter, Literal, MAX_PATH_DEPTH, Operator, Order,
    Pattern, SortSpec,
};
use crate::errors::DbError;

impl Filter {
    /// Compiles a query document.
    ///
    /// # Errors
    /// Unknown operators, malformed operands and invalid paths yield `DbError::Validation`.
    pub fn parse(spec: &Document) -> Result<Self, DbError> {
        let mut clauses = Vec::with_capacity(spec.len());
        for (key, value) in spec {
            let clause = match key.as_str() {
                "$and" => Self::And(parse_clause_list(key, value)?),
                "$or" => Self::Or(parse_clause_list(key, value)?),
                "$nor" => Self::Nor(parse_clause_list(key, value)?),
                op if op.starts_with('$') => {
                    return Err(DbError::validation(format!("unknown top level operator: {op}")));
                }
                path => {
                    check_path(path)?;
                    Self::Field { path: path.to_string(), condition: Condition::parse(value)? }
                }
            };
            clauses.push(clause);
        }
        Ok(Self::And(clauses))
    }

    /// Compiles any query value. A non-document value is shorthand for `{_id: value}`.
    ///
    /// # Errors
    /// See [`Filter::parse`].
    pub fn from_bson(spec: &Bson) -> Result<Self, DbError> {
        match spec {
            Bson::Document(d) => Self::parse(d),
            other => Ok(Self::by_id(other.clone())),
        }
    }
}

impl Condition {
    /// Compiles the value side of a `{path: value}` pair.
    ///
    /// # Errors
    /// See [`Filter::parse`].
    pub fn parse(value: &Bson) -> Result<Self, DbError> {
        match value {
            Bson::Document(d) if is_operator_document(d) => Ok(Self::Operators(parse_operators(d)?)),
            other => Ok(Self::Literal(parse_literal(other)?)),
        }
    }
}

impl ElemMatch {
    /// Decides between the value form (`{$gte: 1}`) and the query form (`{k: "x"}`).
    ///
    /// # Errors
    /// See [`Filter::parse`].
    pub fn parse(spec: &Document) -> Result<Self, DbError> {
        let value_form = !spec.is_empty()
            && spec.keys().all(|k| k.starts_with('$') && !matches!(k.as_str(), "$and" | "$or" | "$nor"));
        if value_form {
            Ok(Self::Value(parse_operators(spec)?))
        } else {
            Ok(Self::Query(Box::new(Filter::parse(spec)?)))
        }
    }
}

/// Anything a collection method accepts as a query.
pub trait IntoFilter {
    /// # Errors
    /// Returns `DbError::Validation` when the query does not compile.
    fn into_filter(self) -> Result<Filter, DbError>;
}

impl IntoFilter for Filter {
    fn into_filter(self) -> Result<Filter, DbError> {
        Ok(self)
    }
}

impl IntoFilter for &Document {
    fn into_filter(self) -> Result<Filter, DbError> {
        Filter::parse(self)
    }
}

impl IntoFilter for Document {
    fn into_filter(self) -> Result<Filter, DbError> {
        Filter::parse(&self)
    }
}

impl IntoFilter for &Bson {
    fn into_filter(self) -> Result<Filter, DbError> {
        Filter::from_bson(self)
    }
}

/// Parses a `{field: 1|-1, ...}` sort document.
///
/// # Errors
/// Directions other than `1`/`-1` are rejected.
pub fn parse_sort(spec: &Document) -> Result<Vec<SortSpec>, DbError> {
    spec.iter()
        .map(|(field, dir)| {
            check_path(field)?;
            let order = match as_f64(dir) {
                Some(d) if d == 1.0 => Order::Asc,
                Some(d) if d == -1.0 => Order::Desc,
                _ => {
                    return Err(DbError::validation(format!(
                        "sort direction for '{field}' must be 1 or -1"
                    )));
                }
            };
            Ok(SortSpec { field: field.clone(), order })
        })
        .collect()
}

/// # Errors
/// Returns an error if the JSON string is not an object or does not compile to a filter.
pub fn parse_filter_json(json: &str) -> Result<Filter, DbError> {
    let spec = crate::utils::json::parse_json_document(json)?;
    Filter::parse(&spec)
}

/// Validates a dotted field path.
///
/// # Errors
/// Empty paths, empty segments and overly deep paths are rejected.
pub fn check_path(path: &str) -> Result<(), DbError> {
    if path.is_empty() {
        return Err(DbError::validation("field path must not be empty"));
    }
    let mut depth = 0usize;
    for seg in path.split('.') {
        depth += 1;
        if seg.is_empty() {
            return Err(DbError::validation(format!("field path '{path}' has an empty segment")));
        }
    }
    if depth > MAX_PATH_DEPTH {
        return Err(DbError::validation(format!("field path '{path}' is too deep")));
    }
    Ok(())
}

fn is_operator_document(d: &Document) -> bool {
    d.keys().next().is_some_and(|k| k.starts_with('$'))
}

fn parse_clause_list(op: &str, value: &Bson) -> Result<Vec<Filter>, DbError> {
    let Bson::Array(items) = value else {
        return Err(DbError::validation(format!("{op} must be an array")));
    };
    if items.is_empty() {
        return Err(DbError::validation(format!("{op} must be a nonempty array")));
    }
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => Filter::parse(d),
            _ => Err(DbError::validation(format!("{op} entries must be documents"))),
        })
        .collect()
}

fn parse_literal(value: &Bson) -> Result<Literal, DbError> {
    match value {
        Bson::RegularExpression(re) => {
            Ok(Literal::Pattern(Pattern::new(re.pattern.as_str(), re.options.as_str())?))
        }
        other => Ok(Literal::Value(other.clone())),
    }
}

fn parse_literal_list(op: &str, value: &Bson) -> Result<Vec<Literal>, DbError> {
    let Bson::Array(items) = value else {
        return Err(DbError::validation(format!("{op} needs an array")));
    };
    items.iter().map(parse_literal).collect()
}

fn parse_operators(spec: &Document) -> Result<Vec<Operator>, DbError> {
    let options = match spec.get("$options") {
        None => None,
        Some(Bson::String(s)) => Some(s.as_str()),
        Some(_) => return Err(DbError::validation("$options has to be a string")),
    };
    let mut ops = Vec::with_capacity(spec.len());
    for (key, operand) in spec {
        let op = match key.as_str() {
            "$eq" => Operator::Eq(operand.clone()),
            "$ne" => Operator::Ne(operand.clone()),
            "$gt" => Operator::Cmp(CmpOp::Gt, operand.clone()),
            "$gte" => Operator::Cmp(CmpOp::Gte, operand.clone()),
            "$lt" => Operator::Cmp(CmpOp::Lt, operand.clone()),
            "$lte" => Operator::Cmp(CmpOp::Lte, operand.clone()),
            "$in" => Operator::In(parse_literal_list(key, operand)?),
            "$nin" => Operator::Nin(parse_literal_list(key, operand)?),
            "$all" => match operand {
                Bson::Array(items) => Operator::All(items.clone()),
                _ => return Err(DbError::validation("$all needs an array")),
            },
            "$exists" => Operator::Exists(is_truthy(operand)),
            "$regex" => Operator::Regex(parse_regex(operand, options)?),
            "$options" => {
                if !spec.contains_key("$regex") {
                    return Err(DbError::validation("$options needs a $regex"));
                }
                continue;
            }
            "$elemMatch" => match operand {
                Bson::Document(d) => Operator::ElemMatch(ElemMatch::parse(d)?),
                _ => return Err(DbError::validation("$elemMatch needs an object")),
            },
            "$not" => Operator::Not(Box::new(parse_not(operand)?)),
            "$size" => Operator::Size(parse_size(operand)?),
            "$mod" => parse_mod(operand)?,
            "$type" => Operator::Type(parse_types(operand)?),
            other => return Err(DbError::validation(format!("unknown operator: {other}"))),
        };
        ops.push(op);
    }
    Ok(ops)
}

fn parse_regex(operand: &Bson, options: Option<&str>) -> Result<Pattern, DbError> {
    match operand {
        Bson::String(s) => Pattern::new(s, options.unwrap_or("")),
        Bson::RegularExpression(re) => {
            Pattern::new(re.pattern.as_str(), options.unwrap_or(re.options.as_str()))
        }
        _ => Err(DbError::validation("$regex has to be a string")),
    }
}

fn parse_not(operand: &Bson) -> Result<Condition, DbError> {
    match operand {
        Bson::Document(d) if is_operator_document(d) => Ok(Condition::Operators(parse_operators(d)?)),
        Bson::RegularExpression(_) => Ok(Condition::Literal(parse_literal(operand)?)),
        _ => Err(DbError::validation("$not needs a regex or a document of operators")),
    }
}

fn parse_size(operand: &Bson) -> Result<usize, DbError> {
    let n = match operand {
        Bson::Double(f) if f.fract() == 0.0 => {
            #[allow(clippy::cast_possible_truncation)]
            let n = *f as i64;
            Some(n)
        }
        other => as_i64(other),
    };
    n.and_then(crate::utils::num::i64_to_usize)
        .ok_or_else(|| DbError::validation("$size needs a non-negative whole number"))
}

fn parse_mod(operand: &Bson) -> Result<Operator, DbError> {
    let parts = match operand {
        Bson::Array(items) if items.len() == 2 => items,
        _ => return Err(DbError::validation("$mod needs an array of [divisor, remainder]")),
    };
    #[allow(clippy::cast_possible_truncation)]
    let as_whole = |v: &Bson| as_i64(v).or_else(|| as_f64(v).map(|f| f.trunc() as i64));
    let (Some(divisor), Some(remainder)) = (as_whole(&parts[0]), as_whole(&parts[1])) else {
        return Err(DbError::validation("$mod arguments must be numeric"));
    };
    if divisor == 0 {
        return Err(DbError::validation("$mod divisor cannot be 0"));
    }
    Ok(Operator::Mod { divisor, remainder })
}

fn parse_types(operand: &Bson) -> Result<Vec<BsonKind>, DbError> {
    let one = |v: &Bson| -> Result<BsonKind, DbError> {
        let kind = match v {
            Bson::String(alias) => BsonKind::from_alias(alias),
            other => as_i64(other)
                .or_else(|| as_f64(other).filter(|f| f.fract() == 0.0).map(|f| {
                    #[allow(clippy::cast_possible_truncation)]
                    let code = f as i64;
                    code
                }))
                .and_then(BsonKind::from_code),
        };
        kind.ok_or_else(|| DbError::validation(format!("unknown $type: {v}")))
    };
    match operand {
        Bson::Array(items) => items.iter().map(one).collect(),
        other => Ok(vec![one(other)?]),
    }
}
