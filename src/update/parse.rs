use bson::{Bson, Document};

use super::types::{DateKind, Modifier, ModifierOp, PopEnd, PullCriteria, PushSpec, UpdateSpec};
use crate::document::validate_keys;
use crate::errors::DbError;
use crate::query::{ElemMatch, as_f64, as_i64, check_path, is_numeric};
use crate::utils::num::f64_to_i64_exact;

impl UpdateSpec {
    /// Compiles an update document.
    ///
    /// # Errors
    /// Mixed replacement and modifier keys, unknown modifiers and malformed operands yield
    /// `DbError::Validation`. Nothing is applied when this fails.
    pub fn parse(spec: &Document) -> Result<Self, DbError> {
        let modifiers = spec.keys().filter(|k| k.starts_with('$')).count();
        if modifiers == 0 {
            validate_keys(spec)?;
            return Ok(Self::Replace(spec.clone()));
        }
        if modifiers != spec.len() {
            return Err(DbError::validation("update cannot mix replacement fields and modifiers"));
        }
        let mut out = Vec::new();
        for (name, fields) in spec {
            let Bson::Document(fields) = fields else {
                return Err(DbError::validation(format!("modifier {name} expects an object")));
            };
            for (path, operand) in fields {
                check_update_path(path)?;
                let op = parse_modifier(name, path, operand)?;
                out.push(Modifier { path: path.clone(), op });
            }
        }
        Ok(Self::Modify(out))
    }
}

/// # Errors
/// Returns an error if the JSON string is not an object or does not compile to an update.
pub fn parse_update_json(json: &str) -> Result<UpdateSpec, DbError> {
    let spec = crate::utils::json::parse_json_document(json)?;
    UpdateSpec::parse(&spec)
}

fn check_update_path(path: &str) -> Result<(), DbError> {
    check_path(path)?;
    let mut positional = 0;
    for seg in path.split('.') {
        if seg == "$" {
            positional += 1;
        } else if seg.starts_with('$') {
            return Err(DbError::validation(format!("unsupported path segment '{seg}' in '{path}'")));
        }
    }
    if positional > 1 {
        return Err(DbError::validation(format!(
            "too many positional ('$') elements in '{path}'"
        )));
    }
    Ok(())
}

fn parse_modifier(name: &str, path: &str, operand: &Bson) -> Result<ModifierOp, DbError> {
    Ok(match name {
        "$set" => ModifierOp::Set(operand.clone()),
        "$setOnInsert" => ModifierOp::SetOnInsert(operand.clone()),
        "$unset" => ModifierOp::Unset,
        "$inc" => ModifierOp::Inc(numeric_operand(name, operand)?),
        "$mul" => ModifierOp::Mul(numeric_operand(name, operand)?),
        "$min" => ModifierOp::Min(operand.clone()),
        "$max" => ModifierOp::Max(operand.clone()),
        "$rename" => {
            let Bson::String(target) = operand else {
                return Err(DbError::validation("$rename target must be a string"));
            };
            check_update_path(target)?;
            if target == path || path.contains('$') || target.contains('$') {
                return Err(DbError::validation(format!("invalid $rename of '{path}' to '{target}'")));
            }
            ModifierOp::Rename(target.clone())
        }
        "$addToSet" => ModifierOp::AddToSet(match each_operand(operand)? {
            Some(values) => values,
            None => vec![operand.clone()],
        }),
        "$push" => ModifierOp::Push(parse_push(operand)?),
        "$pull" => ModifierOp::Pull(match operand {
            Bson::Document(d) if !d.is_empty() => PullCriteria::Matching(ElemMatch::parse(d)?),
            other => PullCriteria::Equals(other.clone()),
        }),
        "$pullAll" => match operand {
            Bson::Array(items) => ModifierOp::PullAll(items.clone()),
            _ => return Err(DbError::validation("$pullAll requires an array argument")),
        },
        "$pop" => match whole_number(operand) {
            Some(1) => ModifierOp::Pop(PopEnd::Last),
            Some(-1) => ModifierOp::Pop(PopEnd::First),
            _ => return Err(DbError::validation("$pop expects 1 or -1")),
        },
        "$currentDate" => ModifierOp::CurrentDate(match operand {
            Bson::Boolean(true) => DateKind::Date,
            Bson::Document(d) => match d.get("$type") {
                Some(Bson::String(t)) if t == "date" => DateKind::Date,
                Some(Bson::String(t)) if t == "timestamp" => DateKind::Timestamp,
                _ => return Err(DbError::validation("$currentDate $type must be date or timestamp")),
            },
            _ => return Err(DbError::validation("$currentDate expects true or {$type: ...}")),
        }),
        other => return Err(DbError::validation(format!("unknown update modifier: {other}"))),
    })
}

fn numeric_operand(name: &str, operand: &Bson) -> Result<Bson, DbError> {
    if is_numeric(operand) {
        Ok(operand.clone())
    } else {
        Err(DbError::validation(format!("{name} requires a numeric argument")))
    }
}

fn whole_number(v: &Bson) -> Option<i64> {
    as_i64(v).or_else(|| as_f64(v).and_then(f64_to_i64_exact))
}

/// `Some(values)` when the operand is `{$each: [...]}`.
fn each_operand(operand: &Bson) -> Result<Option<Vec<Bson>>, DbError> {
    let Bson::Document(d) = operand else {
        return Ok(None);
    };
    match d.get("$each") {
        None => Ok(None),
        Some(Bson::Array(items)) => Ok(Some(items.clone())),
        Some(_) => Err(DbError::validation("$each requires an array")),
    }
}

fn parse_push(operand: &Bson) -> Result<PushSpec, DbError> {
    let Some(values) = each_operand(operand)? else {
        return Ok(PushSpec { values: vec![operand.clone()], ..PushSpec::default() });
    };
    let mut spec = PushSpec { values, ..PushSpec::default() };
    if let Bson::Document(d) = operand {
        for (key, v) in d {
            match key.as_str() {
                "$each" => {}
                "$position" => spec.position = Some(push_int(key, v)?),
                "$slice" => spec.slice = Some(push_int(key, v)?),
                other => {
                    return Err(DbError::validation(format!("unsupported $push modifier: {other}")));
                }
            }
        }
    }
    Ok(spec)
}

fn push_int(key: &str, v: &Bson) -> Result<i64, DbError> {
    whole_number(v).ok_or_else(|| DbError::validation(format!("{key} must be a whole number")))
}
