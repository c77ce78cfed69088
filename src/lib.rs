#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Query Config
//!
//! Declarative, validated HTTP query configuration.
//!
//! ## Overview
//!
//! An API author declares, per resource, which fields may be filtered, which
//! scope methods may be called, which columns may be sorted on, which
//! relations may be eager-loaded and how results are paginated. Incoming
//! request parameters are validated against those declarations and bound
//! into a [`Query`] plan, which is then applied to a query builder and run
//! through its pagination strategy.
//!
//! ## Architecture
//!
//! ```text
//! request input ─► QueryRequest (validate + bind) ─► Query ─► QueryApplier ─► QueryResult
//!                                                               │
//!                                                     QueryBuilder / FetchQuery
//! ```
//!
//! ## Module Organization
//!
//! - [`query`] - Declarations ([`QueryConfig`]) and per-request plans ([`Query`])
//! - [`http`] - Request input decoding and the binder
//! - [`applier`] - Plan application and execution
//! - [`query_builder`] - Builder traits, the PostgreSQL builder and the in-memory builder
//! - [`validation`] - Rule sets and the request validator
//! - [`result`] - Paginated and plain result shapes
//! - [`config`] - Process settings
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use query_config::{QueryApplier, QueryRequest, RequestInput};
//!
//! let input = RequestInput::from_query_str("name[value]=Ali&sortBy=name&limit=10")?;
//! let query = QueryRequest::for_definition(&FooQuery, input)?.to_query()?;
//!
//! let mut builder = SqlQueryBuilder::new(catalog, "foos")?.with_pool(pool);
//! let response = QueryApplier::default().run(&mut builder, &query).await?;
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests
//! ```

pub mod applier;
pub mod config;
pub mod constants;
pub mod error;
pub mod http;
pub mod logging;
pub mod query;
pub mod query_builder;
pub mod result;
pub mod validation;
pub mod value;

pub use applier::{QueryApplier, QueryResponse};
pub use config::QuerySettings;
pub use constants::{FilterMode, FilterType, PaginationMode, SortOrder};
pub use error::{ConfigurationError, QueryError, Result};
pub use http::{QueryRequest, RequestInput};
pub use query::{Query, QueryConfig, QueryConfigCache, QueryContext, QueryDefinition};
pub use query_builder::{FetchQuery, MemoryQueryBuilder, MemoryStore, QueryBuilder, SqlQueryBuilder};
pub use result::{Collection, CursorPaginator, LengthAwarePaginator, QueryResult};
pub use validation::{Rule, RuleSet, ValidationErrors};
pub use value::{Record, Value};
