use super::conditions::{quote_identifier, WhereClause};
use super::cursor::Keyset;
use super::RelationConstraint;
use crate::constants::SortOrder;
use crate::value::{Record, Value};
use std::fmt;

/// A requested eager load, with nested loads for dotted paths
#[derive(Clone)]
pub struct EagerLoad {
    pub relation: String,
    pub constraint: Option<RelationConstraint>,
    pub nested: Vec<EagerLoad>,
}

impl EagerLoad {
    pub fn new(relation: &str) -> Self {
        Self {
            relation: relation.to_string(),
            constraint: None,
            nested: Vec::new(),
        }
    }
}

impl fmt::Debug for EagerLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EagerLoad")
            .field("relation", &self.relation)
            .field("constrained", &self.constraint.is_some())
            .field("nested", &self.nested)
            .finish()
    }
}

/// Inserts `path` into the load tree; the constraint lands on the last segment
pub(crate) fn add_eager_load(
    loads: &mut Vec<EagerLoad>,
    path: &str,
    constraint: Option<RelationConstraint>,
) {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let index = match loads.iter().position(|load| load.relation == head) {
        Some(index) => index,
        None => {
            loads.push(EagerLoad::new(head));
            loads.len() - 1
        }
    };
    match rest {
        Some(rest) => add_eager_load(&mut loads[index].nested, rest, constraint),
        None => {
            if constraint.is_some() {
                loads[index].constraint = constraint;
            }
        }
    }
}

/// Composition state shared by the builders
#[derive(Debug, Clone, Default)]
pub(crate) struct QueryState {
    pub wheres: Vec<WhereClause>,
    pub orders: Vec<(String, SortOrder)>,
    pub columns: Vec<String>,
    pub eager_loads: Vec<EagerLoad>,
}

impl QueryState {
    /// Ordering used for keyset pagination, with `primary_key` as tie-breaker
    pub fn cursor_orders(&self, primary_key: &str) -> Vec<(String, SortOrder)> {
        let mut orders = self.orders.clone();
        if !orders.iter().any(|(field, _)| field == primary_key) {
            orders.push((primary_key.to_string(), SortOrder::Ascending));
        }
        orders
    }

    pub fn select_list(&self) -> String {
        if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|column| quote_identifier(column))
                .collect::<Vec<_>>()
                .join(", ")
        }
    }

    /// ` WHERE ...`, or empty when there is nothing to filter on
    pub fn where_sql(&self, keyset: Option<&Keyset>, bindings: &mut Vec<Value>) -> String {
        let mut parts: Vec<String> = self
            .wheres
            .iter()
            .map(|clause| clause.to_sql(bindings))
            .collect();
        if let Some(keyset) = keyset {
            parts.push(keyset.to_sql(bindings));
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", parts.join(" AND "))
        }
    }

    pub fn order_sql(orders: &[(String, SortOrder)]) -> String {
        if orders.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = orders
            .iter()
            .map(|(field, order)| format!("{} {}", quote_identifier(field), order.to_sql()))
            .collect();
        format!(" ORDER BY {}", parts.join(", "))
    }

    /// Drop unselected columns, keeping eager-loaded relations
    pub fn project(&self, rows: &mut [Record]) {
        if self.columns.is_empty() {
            return;
        }
        let keep: Vec<&str> = self
            .columns
            .iter()
            .map(|column| column.rsplit('.').next().unwrap_or(column))
            .chain(self.eager_loads.iter().map(|load| load.relation.as_str()))
            .collect();
        for row in rows {
            if let Some(object) = row.as_object_mut() {
                object.retain(|key, _| keep.contains(&key.as_str()));
            }
        }
    }

    /// Plain `SELECT` used for dumps
    pub fn to_sql(&self, table: &str) -> (String, Vec<Value>) {
        let mut bindings = Vec::new();
        let mut sql = format!("SELECT {} FROM {}", self.select_list(), quote_identifier(table));
        sql.push_str(&self.where_sql(None, &mut bindings));
        sql.push_str(&Self::order_sql(&self.orders));
        (sql, bindings)
    }
}
