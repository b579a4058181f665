use bson::{Bson, Document};

use super::types::{Accumulator, Expr, GroupSpec, Stage, UnwindSpec};
use crate::errors::DbError;
use crate::query::{Filter, Projection, as_f64, as_i64, check_path, parse_sort};
use crate::utils::num::{f64_to_i64_exact, i64_to_usize};

/// Compiles a whole pipeline before anything runs.
///
/// # Errors
/// Unknown stages and accumulators yield `DbError::OperationFailure`; malformed stage operands
/// yield `DbError::Validation`.
pub fn parse_pipeline(pipeline: &[Document]) -> Result<Vec<Stage>, DbError> {
    pipeline.iter().map(parse_stage).collect()
}

fn parse_stage(stage: &Document) -> Result<Stage, DbError> {
    let mut entries = stage.iter();
    let (Some((name, operand)), None) = (entries.next(), entries.next()) else {
        return Err(DbError::validation("a pipeline stage must have exactly one field"));
    };
    Ok(match name.as_str() {
        "$match" => Stage::Match(Filter::parse(stage_doc(name, operand)?)?),
        "$sort" => {
            let keys = parse_sort(stage_doc(name, operand)?)?;
            if keys.is_empty() {
                return Err(DbError::validation("$sort needs at least one key"));
            }
            Stage::Sort(keys)
        }
        "$skip" => Stage::Skip(count_operand(name, operand)?),
        "$limit" => match count_operand(name, operand)? {
            0 => return Err(DbError::validation("$limit must be positive")),
            n => Stage::Limit(n),
        },
        "$group" => Stage::Group(parse_group(stage_doc(name, operand)?)?),
        "$project" => Stage::Project(Projection::parse(stage_doc(name, operand)?)?),
        "$unwind" => Stage::Unwind(parse_unwind(operand)?),
        "$count" => match operand {
            Bson::String(field)
                if !field.is_empty() && !field.starts_with('$') && !field.contains('.') =>
            {
                Stage::Count(field.clone())
            }
            _ => return Err(DbError::validation("$count needs a plain field name")),
        },
        other => return Err(DbError::failure(format!("unsupported pipeline stage: {other}"))),
    })
}

fn stage_doc<'a>(name: &str, operand: &'a Bson) -> Result<&'a Document, DbError> {
    match operand {
        Bson::Document(d) => Ok(d),
        _ => Err(DbError::validation(format!("{name} expects an object"))),
    }
}

fn count_operand(name: &str, operand: &Bson) -> Result<usize, DbError> {
    as_i64(operand)
        .or_else(|| as_f64(operand).and_then(f64_to_i64_exact))
        .and_then(i64_to_usize)
        .ok_or_else(|| DbError::validation(format!("{name} expects a non-negative whole number")))
}

fn parse_group(spec: &Document) -> Result<GroupSpec, DbError> {
    let key = spec
        .get("_id")
        .ok_or_else(|| DbError::validation("$group needs an _id"))
        .and_then(Expr::parse)?;
    let mut fields = Vec::new();
    for (name, acc) in spec {
        if name == "_id" {
            continue;
        }
        if name.contains('.') || name.starts_with('$') {
            return Err(DbError::validation(format!("invalid $group output field '{name}'")));
        }
        let Bson::Document(acc) = acc else {
            return Err(DbError::validation(format!("$group field '{name}' must be an accumulator")));
        };
        let mut entries = acc.iter();
        let (Some((op, operand)), None) = (entries.next(), entries.next()) else {
            return Err(DbError::validation(format!(
                "$group field '{name}' must hold exactly one accumulator"
            )));
        };
        let expr = Expr::parse(operand)?;
        let acc = match op.as_str() {
            "$sum" => Accumulator::Sum(expr),
            "$avg" => Accumulator::Avg(expr),
            "$min" => Accumulator::Min(expr),
            "$max" => Accumulator::Max(expr),
            "$first" => Accumulator::First(expr),
            "$last" => Accumulator::Last(expr),
            "$push" => Accumulator::Push(expr),
            "$addToSet" => Accumulator::AddToSet(expr),
            other => return Err(DbError::failure(format!("unsupported accumulator: {other}"))),
        };
        fields.push((name.clone(), acc));
    }
    Ok(GroupSpec { key, fields })
}

fn parse_unwind(operand: &Bson) -> Result<UnwindSpec, DbError> {
    let (path, preserve) = match operand {
        Bson::String(p) => (p.as_str(), false),
        Bson::Document(d) => {
            let Some(Bson::String(p)) = d.get("path") else {
                return Err(DbError::validation("$unwind needs a path"));
            };
            let preserve = match d.get("preserveNullAndEmptyArrays") {
                None => false,
                Some(Bson::Boolean(b)) => *b,
                Some(_) => {
                    return Err(DbError::validation(
                        "preserveNullAndEmptyArrays must be a boolean",
                    ));
                }
            };
            (p.as_str(), preserve)
        }
        _ => return Err(DbError::validation("$unwind expects a path string or an object")),
    };
    let Some(path) = path.strip_prefix('$') else {
        return Err(DbError::validation("$unwind path must start with '$'"));
    };
    check_path(path)?;
    Ok(UnwindSpec { path: path.to_string(), preserve_null_and_empty: preserve })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn unknown_stage_or_accumulator_fails_before_running() {
        assert!(matches!(
            parse_pipeline(&[doc! {"$match": {}}, doc! {"$lookup": {}}]),
            Err(DbError::OperationFailure(_))
        ));
        assert!(matches!(
            parse_pipeline(&[doc! {"$group": {"_id": null, "x": {"$stdDevPop": "$a"}}}]),
            Err(DbError::OperationFailure(_))
        ));
    }

    #[test]
    fn malformed_stages() {
        assert!(parse_pipeline(&[doc! {"$skip": -1}]).is_err());
        assert!(parse_pipeline(&[doc! {"$limit": 0}]).is_err());
        assert!(parse_pipeline(&[doc! {"$group": {"n": {"$sum": 1}}}]).is_err());
        assert!(parse_pipeline(&[doc! {"$unwind": "tags"}]).is_err());
        assert!(parse_pipeline(&[doc! {"$match": {}, "$skip": 1}]).is_err());
    }

    #[test]
    fn unwind_forms() {
        let stages = parse_pipeline(&[
            doc! {"$unwind": "$tags"},
            doc! {"$unwind": {"path": "$a.b", "preserveNullAndEmptyArrays": true}},
        ])
        .unwrap();
        assert!(matches!(&stages[0], Stage::Unwind(u) if u.path == "tags" && !u.preserve_null_and_empty));
        assert!(matches!(&stages[1], Stage::Unwind(u) if u.path == "a.b" && u.preserve_null_and_empty));
    }
}
