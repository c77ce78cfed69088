use super::conditions::{quote_identifier, Boolean, WhereClause};
use super::cursor::{CursorToken, Keyset};
use super::pagination::LimitOffset;
use super::schema::{attach_related, join_columns, load_groups, Catalog, RelatedQuery, TableSchema};
use super::state::{add_eager_load, EagerLoad, QueryState};
use super::{FetchQuery, QueryBuilder, QueryDump, RelationConstraint, ScopeRegistry};
use crate::constants::SortOrder;
use crate::error::{QueryError, Result};
use crate::result::{CursorPaginator, LengthAwarePaginator};
use crate::value::{Record, Value};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgArguments;
use sqlx::{Arguments, PgPool};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// PostgreSQL query builder
/// Composes a single-table SELECT with positional bindings and runs it through SQLx,
/// decoding each row with `row_to_json` so results share the [`Record`] shape
#[derive(Debug, Clone)]
pub struct SqlQueryBuilder {
    catalog: Arc<Catalog>,
    table: String,
    pool: Option<PgPool>,
    connection_name: String,
    state: QueryState,
}

impl SqlQueryBuilder {
    /// Create a builder for `table`, which must be declared in `catalog`
    pub fn new(catalog: Arc<Catalog>, table: &str) -> Result<Self> {
        catalog.get(table)?;
        Ok(Self {
            catalog,
            table: table.to_string(),
            pool: None,
            connection_name: "default".to_string(),
            state: QueryState::default(),
        })
    }

    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Connection name reported in dumps
    pub fn connection_name(mut self, name: &str) -> Self {
        self.connection_name = name.to_string();
        self
    }

    fn schema(&self) -> Result<&TableSchema> {
        self.catalog.get(&self.table)
    }

    fn pool(&self) -> Result<&PgPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| QueryError::Storage(format!("no connection pool configured for `{}`", self.table)))
    }

    /// Statement and bindings as they appear in dumps
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        self.state.to_sql(&self.table)
    }

    /// Statement fetching whole rows as JSON
    pub fn build_sql(
        &self,
        keyset: Option<&Keyset>,
        orders: &[(String, SortOrder)],
        window: Option<LimitOffset>,
    ) -> (String, Vec<Value>) {
        let mut bindings = Vec::new();
        let mut sql = format!("SELECT row_to_json(t) FROM {} AS t", quote_identifier(&self.table));
        sql.push_str(&self.state.where_sql(keyset, &mut bindings));
        sql.push_str(&QueryState::order_sql(orders));
        if let Some(window) = window {
            sql.push_str(&window.to_sql());
        }
        (sql, bindings)
    }

    pub fn build_count_sql(&self) -> (String, Vec<Value>) {
        let mut bindings = Vec::new();
        let mut sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(&self.table));
        sql.push_str(&self.state.where_sql(None, &mut bindings));
        (sql, bindings)
    }

    /// Keyset for `cursor`, casting declared column types
    pub fn cursor_keyset(&self, cursor: &str, orders: &[(String, SortOrder)]) -> Result<Keyset> {
        Ok(CursorToken::decode(cursor)?
            .keyset(orders)?
            .with_column_types(&self.schema()?.column_types))
    }

    async fn fetch_rows(
        &self,
        keyset: Option<&Keyset>,
        orders: &[(String, SortOrder)],
        window: Option<LimitOffset>,
    ) -> Result<Vec<Record>> {
        let (sql, bindings) = self.build_sql(keyset, orders, window);
        debug!(table = %self.table, sql = %sql, bindings = bindings.len(), "Fetching rows");
        let arguments = bind_values(&bindings)?;
        let rows = sqlx::query_scalar_with::<sqlx::Postgres, serde_json::Value, _>(&sql, arguments)
            .fetch_all(self.pool()?)
            .await?;
        Ok(rows)
    }

    /// Number of rows matching the composed predicates
    pub async fn count(&self) -> Result<u64> {
        let (sql, bindings) = self.build_count_sql();
        let arguments = bind_values(&bindings)?;
        let count: i64 = sqlx::query_scalar_with::<sqlx::Postgres, i64, _>(&sql, arguments)
            .fetch_one(self.pool()?)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn finish(&self, mut rows: Vec<Record>) -> Result<Vec<Record>> {
        self.load_relations(&mut rows).await?;
        self.state.project(&mut rows);
        Ok(rows)
    }

    fn related_builder(&self, table: &str, load: &EagerLoad) -> Result<Self> {
        let mut related = Self::new(self.catalog.clone(), table)?;
        related.pool = self.pool.clone();
        related.connection_name = self.connection_name.clone();
        related.state.eager_loads = load.nested.clone();
        Ok(related)
    }

    fn load_relations<'a>(&'a self, rows: &'a mut [Record]) -> LoadFuture<'a> {
        Box::pin(async move {
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
                    let found = related
                        .fetch_rows(None, &related.state.orders, None)
                        .await?;
                    let found = related.finish(found).await?;
                    attach_related(definition, rows, group.indexes.as_deref(), found);
                }
            }
            Ok(())
        })
    }
}

/// Encode bindings as PostgreSQL arguments
fn bind_values(values: &[Value]) -> Result<PgArguments> {
    let mut arguments = PgArguments::default();
    for value in values {
        let added = match value {
            Value::Null => arguments.add(None::<String>),
            Value::Bool(b) => arguments.add(*b),
            Value::Integer(i) => arguments.add(*i),
            Value::Float(f) => arguments.add(*f),
            Value::String(s) => arguments.add(s.clone()),
            Value::DateTime(dt) => arguments.add(dt.with_timezone(&Utc)),
            Value::Array(_) | Value::Record(_) => arguments.add(sqlx::types::Json(value.to_json())),
        };
        added.map_err(|e| QueryError::Storage(format!("failed to bind `{value}`: {e}")))?;
    }
    Ok(arguments)
}

impl QueryBuilder for SqlQueryBuilder {
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
impl FetchQuery for SqlQueryBuilder {
    async fn fetch_all(&self) -> Result<Vec<Record>> {
        let rows = self.fetch_rows(None, &self.state.orders, None).await?;
        self.finish(rows).await
    }

    async fn paginate(&self, per_page: u32, page: u32) -> Result<LengthAwarePaginator> {
        let total = self.count().await?;
        let window = LimitOffset::new(page, per_page);
        let rows = self.fetch_rows(None, &self.state.orders, Some(window)).await?;
        let items = self.finish(rows).await?;
        Ok(LengthAwarePaginator::new(items, total, per_page, page))
    }

    async fn cursor_paginate(&self, per_page: u32, cursor: Option<&str>) -> Result<CursorPaginator> {
        let orders = self.state.cursor_orders(&self.schema()?.primary_key);
        let keyset = match cursor {
            Some(token) => Some(self.cursor_keyset(token, &orders)?),
            None => None,
        };

        let window = LimitOffset::limit_only(per_page.saturating_add(1));
        let mut rows = self.fetch_rows(keyset.as_ref(), &orders, Some(window)).await?;
        let has_more = rows.len() > per_page as usize;
        rows.truncate(per_page as usize);
        let next_cursor = if has_more {
            rows.last()
                .map(|last| CursorToken::from_record(last, &orders).encode())
        } else {
            None
        };

        Ok(CursorPaginator {
            items: self.finish(rows).await?,
            per_page,
            cursor: cursor.map(str::to_string),
            next_cursor,
        })
    }
}
