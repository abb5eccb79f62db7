use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterOp, FilterWhereInfo};

/// Translates a structured JSON predicate into a parameterized SQL WHERE
/// clause. The grammar is a flat object of `column: value` equalities,
/// `column: {"$op": data}` comparisons, and `$and` / `$or` / `$not` groups.
pub struct FilterWhere {
    param_values: Vec<Value>,
    param_index: usize,
    conditions: Vec<FilterWhereInfo>,
}

impl FilterWhere {
    fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
            conditions: vec![],
        }
    }

    pub fn generate(
        where_data: &Value,
        starting_param_index: usize,
    ) -> Result<(String, Vec<Value>), FilterError> {
        let mut filter_where = Self::new(starting_param_index);
        filter_where.build(where_data)
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        if where_data.is_null() {
            return Ok(());
        }
        match where_data {
            Value::Object(_) => Ok(()),
            _ => Err(FilterError::InvalidWhereClause(
                "WHERE must be a JSON object".to_string(),
            )),
        }
    }

    fn build(&mut self, where_data: &Value) -> Result<(String, Vec<Value>), FilterError> {
        self.parse_where_data(where_data)?;

        let mut sql_conditions = vec![];
        let conditions_snapshot = self.conditions.clone();
        for condition in &conditions_snapshot {
            if let Some(sql) = self.build_sql_condition(condition)? {
                sql_conditions.push(sql);
            }
        }
        let where_clause = if sql_conditions.is_empty() {
            "1=1".to_string()
        } else {
            sql_conditions.join(" AND ")
        };
        Ok((where_clause, self.param_values.clone()))
    }

    fn parse_where_data(&mut self, where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Object(obj) => {
                for (key, value) in obj {
                    if key.starts_with('$') {
                        self.parse_logical_operator(key, value)?;
                    } else {
                        self.parse_field_condition(key, value)?;
                    }
                }
                Ok(())
            }
            _ => Err(FilterError::InvalidWhereClause(
                "Unsupported WHERE format".to_string(),
            )),
        }
    }

    fn parse_logical_operator(&mut self, op: &str, value: &Value) -> Result<(), FilterError> {
        match op {
            "$and" | "$or" => {
                let arr = value.as_array().ok_or_else(|| {
                    FilterError::InvalidOperatorData(format!("{} requires an array", op))
                })?;
                let mut sql_parts = Vec::new();
                for v in arr {
                    let (sql, params) = Self::generate(v, self.param_index)?;
                    self.param_values.extend(params);
                    sql_parts.push(format!("({})", sql));
                    self.param_index = self.param_values.len();
                }
                let joiner = if op == "$and" { " AND " } else { " OR " };
                let combined = sql_parts.join(joiner);
                self.conditions.push(FilterWhereInfo {
                    column: combined,
                    operator: FilterOp::Text,
                    data: Value::Null,
                });
                Ok(())
            }
            "$not" => {
                let (sql, params) = Self::generate(value, self.param_index)?;
                self.param_values.extend(params);
                self.param_index = self.param_values.len();
                self.conditions.push(FilterWhereInfo {
                    column: format!("NOT ({})", sql),
                    operator: FilterOp::Text,
                    data: Value::Null,
                });
                Ok(())
            }
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn parse_field_condition(&mut self, field: &str, value: &Value) -> Result<(), FilterError> {
        Self::validate_column_name(field)?;
        if let Value::Object(obj) = value {
            for (op_key, op_val) in obj {
                let operator = Self::map_operator(op_key)?;
                self.conditions.push(FilterWhereInfo {
                    column: field.to_string(),
                    operator,
                    data: op_val.clone(),
                });
            }
        } else {
            // Implicit equality: { field: value }
            self.conditions.push(FilterWhereInfo {
                column: field.to_string(),
                operator: FilterOp::Eq,
                data: value.clone(),
            });
        }
        Ok(())
    }

    fn validate_column_name(name: &str) -> Result<(), FilterError> {
        let mut chars = name.chars();
        let valid_head = matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_');
        if !valid_head || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(FilterError::InvalidColumn(name.to_string()));
        }
        Ok(())
    }

    pub fn map_operator(op_key: &str) -> Result<FilterOp, FilterError> {
        Ok(match op_key {
            "$eq" => FilterOp::Eq,
            "$ne" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$like" => FilterOp::Like,
            "$ilike" => FilterOp::ILike,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::NIn,
            "$null" => FilterOp::Null,
            other => return Err(FilterError::UnsupportedOperator(other.to_string())),
        })
    }

    fn build_sql_condition(
        &mut self,
        condition: &FilterWhereInfo,
    ) -> Result<Option<String>, FilterError> {
        // Pseudo conditions carry rendered SQL in the column slot.
        if matches!(condition.operator, FilterOp::Text) && condition.data.is_null() {
            return Ok(Some(condition.column.clone()));
        }

        let quoted_column = format!("\"{}\"", condition.column);
        match condition.operator {
            FilterOp::Eq => {
                if condition.data.is_null() {
                    Ok(Some(format!("{} IS NULL", quoted_column)))
                } else {
                    Ok(Some(format!(
                        "{} = {}",
                        quoted_column,
                        self.param(condition.data.clone())
                    )))
                }
            }
            FilterOp::Ne => {
                if condition.data.is_null() {
                    Ok(Some(format!("{} IS NOT NULL", quoted_column)))
                } else {
                    Ok(Some(format!(
                        "{} <> {}",
                        quoted_column,
                        self.param(condition.data.clone())
                    )))
                }
            }
            FilterOp::Gt => Ok(Some(format!(
                "{} > {}",
                quoted_column,
                self.param(condition.data.clone())
            ))),
            FilterOp::Gte => Ok(Some(format!(
                "{} >= {}",
                quoted_column,
                self.param(condition.data.clone())
            ))),
            FilterOp::Lt => Ok(Some(format!(
                "{} < {}",
                quoted_column,
                self.param(condition.data.clone())
            ))),
            FilterOp::Lte => Ok(Some(format!(
                "{} <= {}",
                quoted_column,
                self.param(condition.data.clone())
            ))),
            FilterOp::Like => Ok(Some(format!(
                "{} LIKE {}",
                quoted_column,
                self.param(condition.data.clone())
            ))),
            FilterOp::ILike => Ok(Some(format!(
                "{} ILIKE {}",
                quoted_column,
                self.param(condition.data.clone())
            ))),
            FilterOp::In | FilterOp::NIn => {
                let negated = matches!(condition.operator, FilterOp::NIn);
                if let Value::Array(values) = &condition.data {
                    if values.is_empty() {
                        return Ok(Some(if negated { "1=1" } else { "1=0" }.to_string()));
                    }
                    let params: Vec<String> =
                        values.iter().map(|v| self.param(v.clone())).collect();
                    let op = if negated { "NOT IN" } else { "IN" };
                    Ok(Some(format!(
                        "{} {} ({})",
                        quoted_column,
                        op,
                        params.join(", ")
                    )))
                } else {
                    let op = if negated { "<>" } else { "=" };
                    Ok(Some(format!(
                        "{} {} {}",
                        quoted_column,
                        op,
                        self.param(condition.data.clone())
                    )))
                }
            }
            FilterOp::Null => {
                let wants_null = condition.data.as_bool().unwrap_or(true);
                if wants_null {
                    Ok(Some(format!("{} IS NULL", quoted_column)))
                } else {
                    Ok(Some(format!("{} IS NOT NULL", quoted_column)))
                }
            }
            FilterOp::Text => Ok(None),
        }
    }

    fn param(&mut self, value: Value) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}
