//! In-memory query builder.
//!
//! [`MemoryStore`] keeps JSON rows per table alongside the same [`Catalog`]
//! the SQL builder uses, and [`MemoryQueryBuilder`] evaluates composed
//! predicates, ordering, eager loads and projection directly over those rows.

use super::conditions::{like_matches, Boolean, Condition, Operator, WhereClause};
use super::cursor::{compare_json, field_value, CursorToken};
use super::pagination::LimitOffset;
use super::schema::{attach_related, join_columns, load_groups, Catalog, RelatedQuery, TableSchema};
use super::state::{add_eager_load, EagerLoad, QueryState};
use super::{
    EntityLookup, FetchQuery, QueryBuilder, QueryDump, RelationConstraint, ScopeRegistry,
};
use crate::constants::SortOrder;
use crate::error::{QueryError, Result};
use crate::result::{CursorPaginator, LengthAwarePaginator};
use crate::value::{Record, Value};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Rows per table plus their schemas
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    catalog: Catalog,
    rows: BTreeMap<String, Vec<Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, schema: TableSchema, rows: Vec<Record>) -> Self {
        self.rows.insert(schema.name.clone(), rows);
        self.catalog = self.catalog.table(schema);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn rows(&self, table: &str) -> Result<&[Record]> {
        self.rows
            .get(table)
            .map(Vec::as_slice)
            .ok_or_else(|| QueryError::not_found("table", table))
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl EntityLookup for MemoryStore {
    fn find(&self, entity: &str, key: &Value) -> Result<Option<Record>> {
        let schema = self.catalog.get(entity)?;
        let wanted = Condition::compare(&schema.primary_key, Operator::Eq, key.clone());
        Ok(self
            .rows(entity)?
            .iter()
            .find(|row| evaluate(row, &wanted))
            .cloned())
    }
}

/// Query builder evaluating against a [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct MemoryQueryBuilder {
    store: Arc<MemoryStore>,
    table: String,
    connection_name: String,
    state: QueryState,
}

impl MemoryQueryBuilder {
    pub fn new(store: Arc<MemoryStore>, table: &str) -> Result<Self> {
        store.catalog.get(table)?;
        Ok(Self {
            store,
            table: table.to_string(),
            connection_name: "memory".to_string(),
            state: QueryState::default(),
        })
    }

    pub fn connection_name(mut self, name: &str) -> Self {
        self.connection_name = name.to_string();
        self
    }

    fn schema(&self) -> Result<&TableSchema> {
        self.store.catalog.get(&self.table)
    }

    pub fn to_sql(&self) -> (String, Vec<Value>) {
        self.state.to_sql(&self.table)
    }

    fn sorted_rows(&self, orders: &[(String, SortOrder)]) -> Result<Vec<Record>> {
        let mut rows: Vec<Record> = self
            .store
            .rows(&self.table)?
            .iter()
            .filter(|row| self.state.wheres.iter().all(|clause| clause_holds(row, clause)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| compare_rows(a, b, orders));
        Ok(rows)
    }

    /// Matching rows in query order, before eager loads and projection
    fn matching_rows(&self) -> Result<Vec<Record>> {
        self.sorted_rows(&self.state.orders)
    }

    /// Eager loads then projection
    fn finish(&self, mut rows: Vec<Record>) -> Result<Vec<Record>> {
        self.load_relations(&mut rows)?;
        self.state.project(&mut rows);
        Ok(rows)
    }

    fn related_builder(&self, table: &str, load: &EagerLoad) -> Result<Self> {
        let mut related = Self::new(self.store.clone(), table)?;
        related.connection_name = self.connection_name.clone();
        related.state.eager_loads = load.nested.clone();
        Ok(related)
    }

    fn load_relations(&self, rows: &mut [Record]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let schema = self.schema()?;
        for load in &self.state.eager_loads {
            let definition = schema.relation_or_fail(&load.relation)?;
            let (related_column, parent_column) = join_columns(definition);

            for group in load_groups(definition, rows) {
                let keys = group.keys(rows, parent_column);
                let mut related = self.related_builder(&group.table, load)?;
                related.where_in(related_column, keys, Boolean::And);
                if let Some(constraint) = &load.constraint {
                    let mut query = RelatedQuery::new(definition, &self.table, &mut related);
                    constraint(&mut query)?;
                }
                let found = related.finish(related.matching_rows()?)?;
                attach_related(definition, rows, group.indexes.as_deref(), found);
            }
        }
        Ok(())
    }

    pub fn get(&self) -> Result<Vec<Record>> {
        self.finish(self.matching_rows()?)
    }

    pub fn count(&self) -> Result<u64> {
        Ok(self.matching_rows()?.len() as u64)
    }
}

impl QueryBuilder for MemoryQueryBuilder {
    fn entity(&self) -> &str {
        &self.table
    }

    fn scopes(&self) -> Arc<ScopeRegistry> {
        match self.schema() {
            Ok(schema) => schema.scopes.clone(),
            Err(_) => Arc::new(ScopeRegistry::new(&self.table)),
        }
    }

    fn add_where(&mut self, clause: WhereClause) {
        self.state.wheres.push(clause);
    }

    fn with_relation(&mut self, relation: &str, constraint: Option<RelationConstraint>) -> Result<()> {
        let head = relation.split('.').next().unwrap_or(relation);
        self.schema()?.relation_or_fail(head)?;
        add_eager_load(&mut self.state.eager_loads, relation, constraint);
        Ok(())
    }

    fn select(&mut self, fields: &[String]) {
        self.state.columns = fields.to_vec();
    }

    fn order_by(&mut self, field: &str, order: SortOrder) {
        self.state.orders.push((field.to_string(), order));
    }

    fn to_dump(&self) -> QueryDump {
        let (sql, bindings) = self.to_sql();
        QueryDump {
            connection: self.connection_name.clone(),
            sql,
            bindings,
        }
    }
}

#[async_trait]
impl FetchQuery for MemoryQueryBuilder {
    async fn fetch_all(&self) -> Result<Vec<Record>> {
        self.get()
    }

    async fn paginate(&self, per_page: u32, page: u32) -> Result<LengthAwarePaginator> {
        let rows = self.matching_rows()?;
        let total = rows.len() as u64;
        let items = self.finish(LimitOffset::new(page, per_page).slice(rows))?;
        Ok(LengthAwarePaginator::new(items, total, per_page, page))
    }

    async fn cursor_paginate(&self, per_page: u32, cursor: Option<&str>) -> Result<CursorPaginator> {
        let orders = self.state.cursor_orders(&self.schema()?.primary_key);
        let mut rows = self.sorted_rows(&orders)?;
        if let Some(token) = cursor {
            let keyset = CursorToken::decode(token)?.keyset(&orders)?;
            rows.retain(|row| keyset.is_after(row));
        }

        let has_more = rows.len() > per_page as usize;
        rows.truncate(per_page as usize);
        let next_cursor = if has_more {
            rows.last()
                .map(|last| CursorToken::from_record(last, &orders).encode())
        } else {
            None
        };

        Ok(CursorPaginator {
            items: self.finish(rows)?,
            per_page,
            cursor: cursor.map(str::to_string),
            next_cursor,
        })
    }
}

fn compare_rows(a: &Record, b: &Record, orders: &[(String, SortOrder)]) -> Ordering {
    for (field, order) in orders {
        let left = field_value(a, field).unwrap_or(&Json::Null);
        let right = field_value(b, field).unwrap_or(&Json::Null);
        let ordering = match order {
            SortOrder::Ascending => compare_json(left, right),
            SortOrder::Descending => compare_json(right, left),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn clause_holds(row: &Record, clause: &WhereClause) -> bool {
    let result = evaluate(row, &clause.condition);
    match clause.boolean {
        Boolean::And => result,
        Boolean::AndNot => !result,
    }
}

fn evaluate(row: &Record, condition: &Condition) -> bool {
    let field = field_value(row, condition.field());
    match condition {
        Condition::Compare { operator, value, .. } => {
            if value.is_null() {
                return *operator == Operator::Eq && field.map_or(true, Json::is_null);
            }
            match compare_field(field, value) {
                Some(ordering) => operator_holds(*operator, ordering),
                None => false,
            }
        }
        Condition::Like { pattern, .. } => match field {
            Some(Json::String(text)) => like_matches(text, pattern),
            Some(Json::Number(n)) => like_matches(&n.to_string(), pattern),
            _ => false,
        },
        Condition::In { values, .. } => values
            .iter()
            .any(|value| compare_field(field, value) == Some(Ordering::Equal)),
    }
}

fn operator_holds(operator: Operator, ordering: Ordering) -> bool {
    match operator {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Gte => ordering != Ordering::Less,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Lte => ordering != Ordering::Greater,
    }
}

/// Orders a stored field relative to a filter value, when comparable
fn compare_field(field: Option<&Json>, value: &Value) -> Option<Ordering> {
    let field = field?;
    match (field, value) {
        (Json::Number(n), Value::Integer(i)) => match n.as_i64() {
            Some(stored) => Some(stored.cmp(i)),
            None => n.as_f64()?.partial_cmp(&(*i as f64)),
        },
        (Json::Number(n), Value::Float(f)) => n.as_f64()?.partial_cmp(f),
        (Json::Number(n), Value::String(s)) => n.as_f64()?.partial_cmp(&s.trim().parse::<f64>().ok()?),
        (Json::String(s), Value::String(v)) => Some(s.as_str().cmp(v.as_str())),
        (Json::String(s), Value::Integer(_) | Value::Float(_)) => {
            s.trim().parse::<f64>().ok()?.partial_cmp(&value.as_f64()?)
        }
        (Json::String(s), Value::DateTime(dt)) => Some(parse_stored_datetime(s, dt.offset())?.cmp(dt)),
        (Json::Bool(b), Value::Bool(v)) => Some(b.cmp(v)),
        (Json::Bool(b), Value::Integer(i)) => Some(i64::from(*b).cmp(i)),
        (_, Value::Record(record)) => (field == record).then_some(Ordering::Equal),
        _ => None,
    }
}

fn parse_stored_datetime(stored: &str, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(stored) {
        return Some(dt);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(stored, "%Y-%m-%d %H:%M:%S") {
        return offset.from_local_datetime(&naive).single();
    }
    let date = NaiveDate::parse_from_str(stored, "%Y-%m-%d").ok()?;
    offset.from_local_datetime(&date.and_hms_opt(0, 0, 0)?).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_builder::conditions::contains_pattern;
    use crate::query_builder::schema::RelationDefinition;
    use serde_json::json;

    fn store() -> Arc<MemoryStore> {
        let foos = TableSchema::new("foos").relation(RelationDefinition::has_many("bars", "bars", "foo_id", "id"));
        let bars = TableSchema::new("bars").relation(RelationDefinition::belongs_to("foo", "foos", "foo_id", "id"));
        MemoryStore::new()
            .table(
                foos,
                vec![
                    json!({"id": 1, "name": "Carol", "size": 3, "created_at": "2024-01-10T08:00:00+00:00"}),
                    json!({"id": 2, "name": "Alice", "size": 5, "created_at": "2024-02-10T08:00:00+00:00"}),
                    json!({"id": 3, "name": "Eve", "size": 1, "created_at": "2024-03-10T08:00:00+00:00"}),
                ],
            )
            .table(
                bars,
                vec![json!({"id": 10, "foo_id": 2, "label": "x"}), json!({"id": 11, "foo_id": 2, "label": "y"})],
            )
            .into_shared()
    }

    fn names(rows: &[Record]) -> Vec<&str> {
        rows.iter().filter_map(|row| row["name"].as_str()).collect()
    }

    #[test]
    fn test_compare_and_negated_like() {
        let mut builder = MemoryQueryBuilder::new(store(), "foos").unwrap();
        builder.where_compare("size", Operator::Gte, Value::Integer(3), Boolean::And);
        builder.where_like("name", contains_pattern("Ali"), Boolean::AndNot);
        assert_eq!(names(&builder.get().unwrap()), vec!["Carol"]);
    }

    #[test]
    fn test_datetime_comparison() {
        let mut builder = MemoryQueryBuilder::new(store(), "foos").unwrap();
        let after = DateTime::parse_from_rfc3339("2024-02-01T00:00:00+01:00").unwrap();
        builder.where_compare("created_at", Operator::Gt, Value::DateTime(after), Boolean::And);
        assert_eq!(names(&builder.get().unwrap()), vec!["Alice", "Eve"]);
    }

    #[test]
    fn test_ordering_and_projection() {
        let mut builder = MemoryQueryBuilder::new(store(), "foos").unwrap();
        builder.order_by("size", SortOrder::Descending);
        builder.select(&["name".to_string()]);
        let rows = builder.get().unwrap();
        assert_eq!(rows[0], json!({"name": "Alice"}));
        assert_eq!(names(&rows), vec!["Alice", "Carol", "Eve"]);
    }

    #[test]
    fn test_eager_loads_nest() {
        let mut builder = MemoryQueryBuilder::new(store(), "foos").unwrap();
        builder.where_compare("id", Operator::Eq, Value::Integer(2), Boolean::And);
        builder.with_relation("bars.foo", None).unwrap();
        let rows = builder.get().unwrap();
        assert_eq!(rows[0]["bars"].as_array().map(Vec::len), Some(2));
        assert_eq!(rows[0]["bars"][0]["foo"]["name"], "Alice");
    }

    #[test]
    fn test_unknown_relation_is_rejected() {
        let mut builder = MemoryQueryBuilder::new(store(), "foos").unwrap();
        assert!(matches!(
            builder.with_relation("bazs", None),
            Err(QueryError::UnknownRelation { .. })
        ));
    }

    #[test]
    fn test_entity_lookup() {
        let store = store();
        let found = store.find("foos", &Value::from("2")).unwrap();
        assert_eq!(found.map(|row| row["name"].clone()), Some(json!("Alice")));
        assert_eq!(store.find("foos", &Value::Integer(99)).unwrap(), None);
    }

    #[tokio::test]
    async fn test_cursor_walks_every_row_once() {
        let mut builder = MemoryQueryBuilder::new(store(), "foos").unwrap();
        builder.order_by("name", SortOrder::Ascending);

        let first = builder.cursor_paginate(2, None).await.unwrap();
        assert_eq!(names(&first.items), vec!["Alice", "Carol"]);
        let next = first.next_cursor.unwrap();

        let second = builder.cursor_paginate(2, Some(&next)).await.unwrap();
        assert_eq!(names(&second.items), vec!["Eve"]);
        assert_eq!(second.next_cursor, None);
        assert_eq!(second.cursor.as_deref(), Some(next.as_str()));
    }

    #[tokio::test]
    async fn test_offset_pages() {
        let mut builder = MemoryQueryBuilder::new(store(), "foos").unwrap();
        builder.order_by("id", SortOrder::Ascending);
        let page = builder.paginate(2, 2).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.last_page(), 2);
        assert_eq!(names(&page.items), vec!["Eve"]);
    }
}
