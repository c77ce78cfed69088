//! # Query Builder System
//!
//! The data-access capability query plans are applied to.
//!
//! ## Overview
//!
//! [`QueryBuilder`] is the synchronous composition surface: predicates joined
//! with AND / AND NOT, eager loads with constraint callbacks, projection,
//! ordering, named scopes and a textual dump. [`FetchQuery`] adds the three
//! asynchronous fetch operations used by pagination strategies.
//!
//! ## Key Components
//!
//! - [`builder`] - PostgreSQL builder with positional bindings, executed through SQLx
//! - [`memory`] - In-memory builder and store used for fixtures and tests
//! - [`conditions`] - WHERE clause building and `LIKE` escaping
//! - [`schema`] - Table schemas, relation definitions and eager-load helpers
//! - [`scopes`] - Named scope methods with declared parameters
//! - [`pagination`] - LIMIT/OFFSET windows and page arithmetic
//! - [`cursor`] - Opaque keyset cursor tokens
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use query_config::query_builder::{Catalog, SqlQueryBuilder, TableSchema};
//!
//! let catalog = Catalog::new().table(TableSchema::new("foos"));
//! let mut builder = SqlQueryBuilder::new(catalog.into_shared(), "foos")?.with_pool(pool);
//! builder.where_compare("size", Operator::Gte, 3.into(), Boolean::And);
//! let page = builder.paginate(10, 1).await?;
//! ```

pub mod builder;
pub mod conditions;
pub mod cursor;
pub mod memory;
pub mod pagination;
pub mod schema;
pub mod scopes;
mod state;

pub use builder::SqlQueryBuilder;
pub use conditions::{contains_pattern, escape_like, Boolean, Condition, Operator, WhereClause};
pub use cursor::{CursorToken, Keyset};
pub use memory::{MemoryQueryBuilder, MemoryStore};
pub use pagination::LimitOffset;
pub use schema::{Catalog, RelatedQuery, RelationDefinition, RelationKind, TableSchema};
pub use scopes::{
    required_argument, ParameterDescriptor, ParameterType, ScopeArguments, ScopeHandler,
    ScopeMethod, ScopeRegistry,
};
pub use state::EagerLoad;

use crate::constants::SortOrder;
use crate::error::Result;
use crate::result::{CursorPaginator, LengthAwarePaginator};
use crate::value::{Record, Value};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Callback run against the related query of an eager load
pub type RelationConstraint = Arc<dyn Fn(&mut dyn RelationQuery) -> Result<()> + Send + Sync>;

/// Textual form of a composed query, for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryDump {
    pub connection: String,
    pub sql: String,
    pub bindings: Vec<Value>,
}

/// Composition surface a query plan is applied to
pub trait QueryBuilder: Send + Sync {
    /// Entity (table) the builder queries
    fn entity(&self) -> &str;

    /// Scope methods available on [`QueryBuilder::entity`]
    fn scopes(&self) -> Arc<ScopeRegistry>;

    fn add_where(&mut self, clause: WhereClause);

    fn where_compare(&mut self, field: &str, operator: Operator, value: Value, boolean: Boolean) {
        self.add_where(WhereClause::new(Condition::compare(field, operator, value), boolean));
    }

    fn where_like(&mut self, field: &str, pattern: String, boolean: Boolean) {
        self.add_where(WhereClause::new(Condition::like(field, pattern), boolean));
    }

    fn where_in(&mut self, field: &str, values: Vec<Value>, boolean: Boolean) {
        self.add_where(WhereClause::new(Condition::in_values(field, values), boolean));
    }

    /// Eager-load `relation` (dotted paths load nested relations)
    fn with_relation(&mut self, relation: &str, constraint: Option<RelationConstraint>) -> Result<()>;

    /// Restrict the projection to `fields`
    fn select(&mut self, fields: &[String]);

    fn order_by(&mut self, field: &str, order: SortOrder);

    fn to_dump(&self) -> QueryDump;
}

/// Related query handed to eager-load constraints
pub trait RelationQuery {
    fn relation(&self) -> &str;

    /// Entity declaring the relation
    fn parent_entity(&self) -> &str;

    /// Discriminator column of a polymorphic relation
    fn morph_type(&self) -> Option<&str>;

    /// Whether `column` maps its values onto a closed set of entity types
    fn has_enum_binding(&self, column: &str) -> bool;

    fn query(&mut self) -> &mut dyn QueryBuilder;
}

/// Fetch operations backing the pagination strategies
#[async_trait]
pub trait FetchQuery: QueryBuilder {
    async fn fetch_all(&self) -> Result<Vec<Record>>;

    async fn paginate(&self, per_page: u32, page: u32) -> Result<LengthAwarePaginator>;

    async fn cursor_paginate(&self, per_page: u32, cursor: Option<&str>) -> Result<CursorPaginator>;
}

/// Resolves entity references for scope arguments
pub trait EntityLookup: Send + Sync {
    fn find(&self, entity: &str, key: &Value) -> Result<Option<Record>>;
}
