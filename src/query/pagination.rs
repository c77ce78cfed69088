//! Pagination settings and strategies.
//!
//! [`PaginationConfig`] is declared on a query configuration; each request
//! selects one [`PaginationStrategy`] which turns a composed builder into a
//! [`QueryResult`].

use crate::constants::PaginationMode;
use crate::error::Result;
use crate::query_builder::FetchQuery;
use crate::result::{Collection, QueryResult};
use async_trait::async_trait;
use tracing::debug;

pub const DEFAULT_LIMIT: u32 = 50;
pub const DEFAULT_MAX_LIMIT: u32 = 100;

/// Pagination modes a query accepts, with limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationConfig {
    allowed: Vec<PaginationMode>,
    default: PaginationMode,
    default_limit: u32,
    max_limit: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            allowed: vec![PaginationMode::Offset, PaginationMode::Cursor],
            default: PaginationMode::Offset,
            default_limit: DEFAULT_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
        }
    }
}

impl PaginationConfig {
    pub fn with_default_limit(&mut self, limit: u32) -> &mut Self {
        self.default_limit = limit;
        self
    }

    pub fn with_max_limit(&mut self, limit: u32) -> &mut Self {
        self.max_limit = limit;
        self
    }

    /// Also accept unpaginated requests
    pub fn allow_none(&mut self) -> &mut Self {
        if !self.allowed.contains(&PaginationMode::None) {
            self.allowed.push(PaginationMode::None);
        }
        self
    }

    /// Only ever return the full collection
    pub fn none(&mut self) -> &mut Self {
        self.allowed = vec![PaginationMode::None];
        self.default = PaginationMode::None;
        self
    }

    pub fn with_default_mode(&mut self, mode: PaginationMode) -> &mut Self {
        if mode == PaginationMode::None {
            self.allow_none();
        }
        self.default = mode;
        self
    }

    pub fn default_none(&mut self) -> &mut Self {
        self.with_default_mode(PaginationMode::None)
    }

    pub fn allowed(&self) -> &[PaginationMode] {
        &self.allowed
    }

    pub fn default_mode(&self) -> PaginationMode {
        self.default
    }

    pub fn default_limit(&self) -> u32 {
        self.default_limit
    }

    pub fn max_limit(&self) -> u32 {
        self.max_limit
    }

    /// Strategy used when a request does not choose one
    pub fn make_default(&self) -> PaginationStrategy {
        PaginationStrategy::for_mode(self.default, 1, self.default_limit, None)
    }
}

/// Turns a composed builder into a result
#[async_trait]
pub trait QueryPagination: Send + Sync {
    async fn handle(&self, builder: &dyn FetchQuery) -> Result<QueryResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetPagination {
    pub page: u32,
    pub limit: u32,
}

#[async_trait]
impl QueryPagination for OffsetPagination {
    async fn handle(&self, builder: &dyn FetchQuery) -> Result<QueryResult> {
        debug!(entity = builder.entity(), page = self.page, limit = self.limit, "Offset pagination");
        Ok(builder.paginate(self.limit, self.page).await?.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorPagination {
    pub cursor: Option<String>,
    pub limit: u32,
}

#[async_trait]
impl QueryPagination for CursorPagination {
    async fn handle(&self, builder: &dyn FetchQuery) -> Result<QueryResult> {
        debug!(
            entity = builder.entity(),
            has_cursor = self.cursor.is_some(),
            limit = self.limit,
            "Cursor pagination"
        );
        Ok(builder
            .cursor_paginate(self.limit, self.cursor.as_deref())
            .await?
            .into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoPagination;

#[async_trait]
impl QueryPagination for NoPagination {
    async fn handle(&self, builder: &dyn FetchQuery) -> Result<QueryResult> {
        debug!(entity = builder.entity(), "No pagination");
        let items = builder.fetch_all().await?;
        Ok(Collection { items }.into())
    }
}

/// The pagination a query plan carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginationStrategy {
    Offset(OffsetPagination),
    Cursor(CursorPagination),
    None(NoPagination),
}

impl PaginationStrategy {
    pub fn for_mode(mode: PaginationMode, page: u32, limit: u32, cursor: Option<String>) -> Self {
        match mode {
            PaginationMode::Offset => Self::Offset(OffsetPagination { page, limit }),
            PaginationMode::Cursor => Self::Cursor(CursorPagination { cursor, limit }),
            PaginationMode::None => Self::None(NoPagination),
        }
    }

    pub fn mode(&self) -> PaginationMode {
        match self {
            Self::Offset(_) => PaginationMode::Offset,
            Self::Cursor(_) => PaginationMode::Cursor,
            Self::None(_) => PaginationMode::None,
        }
    }
}

#[async_trait]
impl QueryPagination for PaginationStrategy {
    async fn handle(&self, builder: &dyn FetchQuery) -> Result<QueryResult> {
        match self {
            Self::Offset(pagination) => pagination.handle(builder).await,
            Self::Cursor(pagination) => pagination.handle(builder).await,
            Self::None(pagination) => pagination.handle(builder).await,
        }
    }
}

impl From<OffsetPagination> for PaginationStrategy {
    fn from(pagination: OffsetPagination) -> Self {
        Self::Offset(pagination)
    }
}

impl From<CursorPagination> for PaginationStrategy {
    fn from(pagination: CursorPagination) -> Self {
        Self::Cursor(pagination)
    }
}

impl From<NoPagination> for PaginationStrategy {
    fn from(pagination: NoPagination) -> Self {
        Self::None(pagination)
    }
}
