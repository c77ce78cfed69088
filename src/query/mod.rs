//! # Query Configuration Model
//!
//! Declarations made once per query type and the per-request plans built
//! from them.
//!
//! ## Overview
//!
//! A [`QueryDefinition`] names its entity, exposes the entity's scope methods
//! and fills a [`QueryConfig`] with filters, scopes, sorts, relationships and
//! pagination settings. The config is locked right after `configure()` and
//! shared between requests. Each request then produces a [`Query`]: the
//! filters, scopes, sorts and eager loads it actually asked for, plus one
//! pagination strategy.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use query_config::constants::{FilterType, SortOrder};
//! use query_config::query::{QueryConfig, QueryDefinition};
//!
//! struct FooQuery;
//!
//! impl QueryDefinition for FooQuery {
//!     fn entity(&self) -> &str {
//!         "foos"
//!     }
//!
//!     fn scopes(&self) -> Arc<ScopeRegistry> {
//!         foo_scopes()
//!     }
//!
//!     fn configure(&self, config: &mut QueryConfig) -> Result<()> {
//!         config.filter("name")?;
//!         config.filter("size")?.of_type(FilterType::Integer);
//!         config.sorts(&["id", "name"])?;
//!         config.default_sort("id", SortOrder::Ascending)?;
//!         Ok(())
//!     }
//! }
//! ```

pub mod filter;
pub mod pagination;
pub mod plan;
pub mod query_config;
pub mod relationship;
pub mod scope;
pub mod sort;

pub use filter::{Filter, FilterValue};
pub use pagination::{
    CursorPagination, NoPagination, OffsetPagination, PaginationConfig, PaginationStrategy,
    QueryPagination,
};
pub use plan::{Query, QueryContext, ScopeHandle};
pub use query_config::{
    FilterBuilder, FiltersBuilder, QueryConfig, QueryConfigCache, RelationshipBuilder,
    RelationshipsBuilder, ScopeBuilder, SortBuilder, SortsBuilder,
};
pub use relationship::{Relationship, RelationshipValue};
pub use scope::{ArgumentResolver, ArgumentTransformer, Scope, ScopeArgument, ScopeArgumentValue, ScopeValue};
pub use sort::{Sort, SortValue};

use crate::error::Result;
use crate::query_builder::ScopeRegistry;
use std::sync::Arc;

/// Entry of the shared filter/scope namespace
#[derive(Debug, Clone)]
pub enum QueryFilter {
    Filter(Arc<Filter>),
    Scope(Arc<Scope>),
}

impl QueryFilter {
    pub fn name(&self) -> &str {
        match self {
            Self::Filter(filter) => filter.name(),
            Self::Scope(scope) => scope.name(),
        }
    }

    pub fn is_scope(&self) -> bool {
        matches!(self, Self::Scope(_))
    }
}

/// A query type: its entity, scope methods and declarations
pub trait QueryDefinition: Send + Sync + 'static {
    fn entity(&self) -> &str;

    /// Scope methods available on the entity
    fn scopes(&self) -> Arc<ScopeRegistry>;

    fn configure(&self, config: &mut QueryConfig) -> Result<()>;
}
