//! Document helpers used by the in-memory engine: field lookup, filter
//! matching, projection and ordering of JSON values.

use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::error::{DbError, DbResult};

/// A stored document
pub type Document = Map<String, Value>;

/// Primary key field assigned by the engines
pub const ID_FIELD: &str = "_id";

/// Value at a dotted path, `Null` when absent
pub fn extract_field_value(doc: &Document, field_path: &str) -> Value {
    lookup(doc, field_path).cloned().unwrap_or(Value::Null)
}

/// Value at a dotted path, `None` when absent
pub fn lookup<'a>(doc: &'a Document, field_path: &str) -> Option<&'a Value> {
    let mut parts = field_path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Whether `doc` satisfies every condition of `filter`
pub fn matches(doc: &Document, filter: &Document) -> DbResult<bool> {
    for (path, condition) in filter {
        let value = lookup(doc, path);
        let satisfied = match condition {
            Value::Object(ops) if is_operator_map(ops) => {
                let mut all = true;
                for (op, operand) in ops {
                    if !apply_operator(op, operand, value)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            literal => equals(value, literal),
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn is_operator_map(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|key| key.starts_with('$'))
}

/// Literal match: deep equality, or membership when the field holds an array
fn equals(value: Option<&Value>, literal: &Value) -> bool {
    match value {
        None => literal.is_null(),
        Some(Value::Array(items)) if !literal.is_array() => items.iter().any(|item| item == literal),
        Some(value) => value == literal,
    }
}

fn apply_operator(op: &str, operand: &Value, value: Option<&Value>) -> DbResult<bool> {
    let ordered = |accept: fn(Ordering) -> bool| {
        value
            .filter(|value| same_kind(value, operand))
            .map(|value| accept(compare_values(value, operand)))
            .unwrap_or(false)
    };

    match op {
        "$eq" => Ok(equals(value, operand)),
        "$ne" => Ok(!equals(value, operand)),
        "$gt" => Ok(ordered(|o| o == Ordering::Greater)),
        "$gte" => Ok(ordered(|o| o != Ordering::Less)),
        "$lt" => Ok(ordered(|o| o == Ordering::Less)),
        "$lte" => Ok(ordered(|o| o != Ordering::Greater)),
        "$in" | "$nin" => {
            let candidates = operand.as_array().ok_or_else(|| {
                DbError::StorageError(format!("{} needs an array operand", op))
            })?;
            let found = candidates.iter().any(|candidate| equals(value, candidate));
            Ok(if op == "$in" { found } else { !found })
        }
        "$exists" => {
            let wanted = operand.as_bool().unwrap_or(true);
            Ok(value.is_some() == wanted)
        }
        other => Err(DbError::StorageError(format!(
            "unsupported query operator '{}'",
            other
        ))),
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    type_rank(a) == type_rank(b)
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array < object
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = x.as_f64().unwrap_or(f64::NAN);
                    let y = y.as_f64().unwrap_or(f64::NAN);
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
            }
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ord = compare_values(left, right);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Compare two documents by `{field: 1|-1, ...}`
pub fn compare_by(a: &Document, b: &Document, sort: &Document) -> Ordering {
    for (field, direction) in sort {
        let left = extract_field_value(a, field);
        let right = extract_field_value(b, field);
        let mut ord = compare_values(&left, &right);
        if direction.as_i64() == Some(-1) || direction.as_str() == Some("desc") {
            ord = ord.reverse();
        }
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Apply an inclusion or exclusion projection to top-level fields
pub fn project(doc: Document, projection: &Document) -> Document {
    let included = |value: &Value| match value {
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(true),
        _ => true,
    };

    let inclusive = projection
        .iter()
        .any(|(field, value)| field != ID_FIELD && included(value));
    let keep_id = projection.get(ID_FIELD).map(|value| included(value)).unwrap_or(true);

    doc.into_iter()
        .filter(|(field, _)| {
            if field == ID_FIELD {
                return keep_id;
            }
            match projection.get(field) {
                Some(value) => included(value),
                None => !inclusive,
            }
        })
        .collect()
}
