//! Keyset cursors.
//!
//! A cursor token is the hex encoding of a small JSON document holding the
//! ordering columns and the values of the last row on the previous page.

use super::conditions::quote_identifier;
use crate::constants::SortOrder;
use crate::error::{QueryError, Result};
use crate::value::{Record, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorToken {
    pub fields: Vec<String>,
    pub values: Vec<serde_json::Value>,
}

impl CursorToken {
    /// Token pointing just after `record` for the given ordering
    pub fn from_record(record: &Record, orders: &[(String, SortOrder)]) -> Self {
        Self {
            fields: orders.iter().map(|(field, _)| field.clone()).collect(),
            values: orders
                .iter()
                .map(|(field, _)| field_value(record, field).cloned().unwrap_or_default())
                .collect(),
        }
    }

    pub fn encode(&self) -> String {
        // Serializing plain strings and JSON values cannot fail
        hex::encode(serde_json::to_vec(self).unwrap_or_default())
    }

    pub fn decode(token: &str) -> Result<Self> {
        let bytes = hex::decode(token).map_err(|e| QueryError::InvalidCursor(e.to_string()))?;
        let token: Self =
            serde_json::from_slice(&bytes).map_err(|e| QueryError::InvalidCursor(e.to_string()))?;
        if token.fields.len() != token.values.len() {
            return Err(QueryError::InvalidCursor(
                "field and value counts differ".to_string(),
            ));
        }
        Ok(token)
    }

    /// Keyset condition for `orders`, which must match the token's fields
    pub fn keyset(self, orders: &[(String, SortOrder)]) -> Result<Keyset> {
        let matches = self.fields.len() == orders.len()
            && self.fields.iter().zip(orders).all(|(field, (order_field, _))| field == order_field);
        if !matches {
            return Err(QueryError::InvalidCursor(format!(
                "cursor was issued for ordering ({}) but the query orders by ({})",
                self.fields.join(", "),
                orders.iter().map(|(f, _)| f.as_str()).collect::<Vec<_>>().join(", ")
            )));
        }
        Ok(Keyset {
            casts: vec![None; orders.len()],
            orders: orders.to_vec(),
            values: self.values,
        })
    }
}

/// Rows strictly after a cursor position
#[derive(Debug, Clone, PartialEq)]
pub struct Keyset {
    pub orders: Vec<(String, SortOrder)>,
    pub values: Vec<serde_json::Value>,
    /// SQL type each placeholder is cast to, per ordering column
    pub casts: Vec<Option<String>>,
}

impl Keyset {
    /// Cast placeholders of the declared columns; `table.column` resolves to `column`
    pub fn with_column_types(mut self, column_types: &BTreeMap<String, String>) -> Self {
        self.casts = self
            .orders
            .iter()
            .map(|(field, _)| {
                let column = field.rsplit('.').next().unwrap_or(field);
                column_types.get(field).or_else(|| column_types.get(column)).cloned()
            })
            .collect();
        self
    }

    /// `(a > $1) OR (a = $1 AND b < $2) ...`, respecting each column's direction.
    /// NULL sorts above every value, matching PostgreSQL's default ordering.
    pub fn to_sql(&self, bindings: &mut Vec<Value>) -> String {
        let mut branches = Vec::with_capacity(self.orders.len());
        for (index, (field, order)) in self.orders.iter().enumerate() {
            let is_null = self.values[index].is_null();
            // Nothing sorts after NULL in ascending order
            if is_null && *order == SortOrder::Ascending {
                continue;
            }
            let mut parts = Vec::with_capacity(index + 1);
            for position in 0..index {
                parts.push(self.equals_sql(position, bindings));
            }
            let column = quote_identifier(field);
            parts.push(match order {
                _ if is_null => format!("{column} IS NOT NULL"),
                SortOrder::Ascending => format!(
                    "({column} > {} OR {column} IS NULL)",
                    self.placeholder(index, bindings)
                ),
                SortOrder::Descending => format!("{column} < {}", self.placeholder(index, bindings)),
            });
            branches.push(format!("({})", parts.join(" AND ")));
        }
        if branches.is_empty() {
            return "FALSE".to_string();
        }
        format!("({})", branches.join(" OR "))
    }

    fn equals_sql(&self, position: usize, bindings: &mut Vec<Value>) -> String {
        let column = quote_identifier(&self.orders[position].0);
        if self.values[position].is_null() {
            format!("{column} IS NULL")
        } else {
            format!("{column} = {}", self.placeholder(position, bindings))
        }
    }

    fn placeholder(&self, position: usize, bindings: &mut Vec<Value>) -> String {
        bindings.push(Value::from_json(&self.values[position]));
        match self.casts.get(position).and_then(Option::as_deref) {
            Some(sql_type) => format!("${}::{sql_type}", bindings.len()),
            None => format!("${}", bindings.len()),
        }
    }

    /// Whether `record` sorts strictly after the cursor position
    pub fn is_after(&self, record: &Record) -> bool {
        for ((field, order), value) in self.orders.iter().zip(&self.values) {
            let ordering = compare_json(field_value(record, field).unwrap_or(&serde_json::Value::Null), value);
            let ordering = match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            };
            match ordering {
                Ordering::Greater => return true,
                Ordering::Less => return false,
                Ordering::Equal => continue,
            }
        }
        false
    }
}

/// Column value of a row; `table.column` resolves to `column`
pub fn field_value<'a>(record: &'a Record, field: &str) -> Option<&'a serde_json::Value> {
    let column = field.rsplit('.').next().unwrap_or(field);
    record.get(column)
}

/// Total order over JSON values: bool < number < string < array < object < null
pub fn compare_json(a: &serde_json::Value, b: &serde_json::Value) -> Ordering {
    use serde_json::Value as Json;

    fn rank(value: &Json) -> u8 {
        match value {
            Json::Bool(_) => 0,
            Json::Number(_) => 1,
            Json::String(_) => 2,
            Json::Array(_) => 3,
            Json::Object(_) => 4,
            Json::Null => 5,
        }
    }

    match (a, b) {
        (Json::Bool(x), Json::Bool(y)) => x.cmp(y),
        (Json::Number(x), Json::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Json::String(x), Json::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
