use serde_json::Value;

use super::error::FilterError;
use super::filter_where::FilterWhere;
use super::types::{FilterOp, SortDirection};

/// In-process evaluation of the same predicate grammar that
/// [`FilterWhere`](super::filter_where::FilterWhere) compiles to SQL.
/// Used by the memory datastore so tests and local development see
/// identical filter semantics to the Postgres path.
pub fn matches_where(row: &Value, where_data: &Value) -> Result<bool, FilterError> {
    let obj = match where_data {
        Value::Object(obj) => obj,
        Value::Null => return Ok(true),
        _ => {
            return Err(FilterError::InvalidWhereClause(
                "WHERE must be a JSON object".to_string(),
            ))
        }
    };

    for (key, value) in obj {
        let matched = match key.as_str() {
            "$and" => {
                let arr = value.as_array().ok_or_else(|| {
                    FilterError::InvalidOperatorData("$and requires an array".to_string())
                })?;
                let mut all = true;
                for sub in arr {
                    if !matches_where(row, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let arr = value.as_array().ok_or_else(|| {
                    FilterError::InvalidOperatorData("$or requires an array".to_string())
                })?;
                let mut any = false;
                for sub in arr {
                    if matches_where(row, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$not" => !matches_where(row, value)?,
            field if field.starts_with('$') => {
                return Err(FilterError::UnsupportedOperator(field.to_string()))
            }
            field => field_matches(row.get(field).unwrap_or(&Value::Null), value)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn field_matches(actual: &Value, condition: &Value) -> Result<bool, FilterError> {
    if let Value::Object(ops) = condition {
        for (op_key, op_val) in ops {
            let op = FilterWhere::map_operator(op_key)?;
            if !op_matches(actual, op, op_val)? {
                return Ok(false);
            }
        }
        Ok(true)
    } else {
        // Implicit equality
        Ok(actual == condition)
    }
}

fn op_matches(actual: &Value, op: FilterOp, data: &Value) -> Result<bool, FilterError> {
    Ok(match op {
        FilterOp::Eq => actual == data,
        FilterOp::Ne => actual != data,
        FilterOp::Gt => compare(actual, data) == Some(std::cmp::Ordering::Greater),
        FilterOp::Gte => matches!(
            compare(actual, data),
            Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
        ),
        FilterOp::Lt => compare(actual, data) == Some(std::cmp::Ordering::Less),
        FilterOp::Lte => matches!(
            compare(actual, data),
            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
        ),
        FilterOp::Like => like_matches(actual, data, false),
        FilterOp::ILike => like_matches(actual, data, true),
        FilterOp::In => match data {
            Value::Array(values) => values.contains(actual),
            single => actual == single,
        },
        FilterOp::NIn => match data {
            Value::Array(values) => !values.contains(actual),
            single => actual != single,
        },
        FilterOp::Null => {
            let wants_null = data.as_bool().unwrap_or(true);
            actual.is_null() == wants_null
        }
        FilterOp::Text => {
            return Err(FilterError::UnsupportedOperator("$text".to_string()));
        }
    })
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn like_matches(actual: &Value, pattern: &Value, case_insensitive: bool) -> bool {
    let (Some(actual), Some(pattern)) = (actual.as_str(), pattern.as_str()) else {
        return false;
    };
    let (actual, pattern) = if case_insensitive {
        (actual.to_lowercase(), pattern.to_lowercase())
    } else {
        (actual.to_string(), pattern.to_string())
    };
    // SQL LIKE with % wildcards only, which is all the API surface emits.
    let parts: Vec<&str> = pattern.split('%').collect();
    let mut pos = 0usize;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        match actual[pos..].find(part) {
            Some(found) => {
                let absolute = pos + found;
                if i == 0 && absolute != 0 {
                    return false;
                }
                pos = absolute + part.len();
            }
            None => return false,
        }
    }
    if let Some(last) = parts.last() {
        if !last.is_empty() && !actual.ends_with(last) {
            return false;
        }
    }
    true
}

/// Sort rows in place per an order spec (same grammar as the SQL path).
pub fn sort_rows(rows: &mut [Value], order: &Value) -> Result<(), FilterError> {
    let infos = super::filter_order::FilterOrder::validate_and_parse(order)?;
    rows.sort_by(|a, b| {
        for info in &infos {
            let av = a.get(&info.column).unwrap_or(&Value::Null);
            let bv = b.get(&info.column).unwrap_or(&Value::Null);
            let ord = compare(av, bv).unwrap_or(std::cmp::Ordering::Equal);
            let ord = match info.sort {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
    Ok(())
}
