//! # Query Configuration
//!
//! [`QueryConfig`] is the per-definition registry of filters, scopes, sorts,
//! relationships, projection fields and pagination settings. Declarations are
//! made through short-lived builder handles while the config is open; once
//! [`QueryConfig::lock`] runs the config is frozen and shared as
//! `Arc<QueryConfig>` across requests.

use super::filter::Filter;
use super::pagination::PaginationConfig;
use super::relationship::Relationship;
use super::scope::{Scope, ScopeArgument};
use super::sort::{Sort, SortValue};
use super::{QueryDefinition, QueryFilter};
use crate::constants::{FilterType, SortOrder};
use crate::error::{ConfigurationError, QueryError, Result};
use crate::query_builder::ScopeRegistry;
use crate::value::Value;
use dashmap::DashMap;
use std::any::TypeId;
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Declarations for one query type
#[derive(Debug, Clone)]
pub struct QueryConfig {
    entity: String,
    scopes: Arc<ScopeRegistry>,
    locked: bool,
    filters: Vec<QueryFilter>,
    sorts: Vec<Arc<Sort>>,
    relationships: Vec<Arc<Relationship>>,
    fields_only: Vec<String>,
    pagination: PaginationConfig,
    default_sorts: Vec<SortValue>,
}

impl QueryConfig {
    pub fn new(entity: &str, scopes: Arc<ScopeRegistry>) -> Self {
        Self {
            entity: entity.to_string(),
            scopes,
            locked: false,
            filters: Vec::new(),
            sorts: Vec::new(),
            relationships: Vec::new(),
            fields_only: Vec::new(),
            pagination: PaginationConfig::default(),
            default_sorts: Vec::new(),
        }
    }

    /// Configure and lock a fresh config for `definition`
    pub fn build<D: QueryDefinition + ?Sized>(definition: &D) -> Result<Arc<Self>> {
        let mut config = Self::new(definition.entity(), definition.scopes());
        definition.configure(&mut config)?;
        config.lock()?;
        Ok(Arc::new(config))
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.locked {
            return Err(QueryError::ConfigLocked);
        }
        Ok(())
    }

    /// Declare a filter; chain `.scope()` to turn it into a scope filter
    pub fn filter(&mut self, name: &str) -> Result<FilterBuilder<'_>> {
        self.ensure_unlocked()?;
        self.filters.push(QueryFilter::Filter(Arc::new(Filter::new(name))));
        let index = self.filters.len() - 1;
        Ok(FilterBuilder { config: self, index })
    }

    pub fn filters(&mut self, names: &[&str]) -> Result<FiltersBuilder<'_>> {
        self.ensure_unlocked()?;
        let start = self.filters.len();
        self.filters.extend(
            names
                .iter()
                .map(|name| QueryFilter::Filter(Arc::new(Filter::new(name)))),
        );
        Ok(FiltersBuilder {
            indexes: (start..self.filters.len()).collect(),
            config: self,
        })
    }

    /// Declare an eager-loadable relationship
    pub fn with(&mut self, name: &str) -> Result<RelationshipBuilder<'_>> {
        self.ensure_unlocked()?;
        self.relationships.push(Arc::new(Relationship::new(name)));
        let index = self.relationships.len() - 1;
        Ok(RelationshipBuilder { config: self, index })
    }

    pub fn with_many(&mut self, names: &[&str]) -> Result<RelationshipsBuilder<'_>> {
        self.ensure_unlocked()?;
        let start = self.relationships.len();
        self.relationships
            .extend(names.iter().map(|name| Arc::new(Relationship::new(name))));
        Ok(RelationshipsBuilder {
            indexes: (start..self.relationships.len()).collect(),
            config: self,
        })
    }

    pub fn sort(&mut self, name: &str) -> Result<SortBuilder<'_>> {
        self.ensure_unlocked()?;
        self.sorts.push(Arc::new(Sort::new(name)));
        let index = self.sorts.len() - 1;
        Ok(SortBuilder { config: self, index })
    }

    pub fn sorts(&mut self, names: &[&str]) -> Result<SortsBuilder<'_>> {
        self.ensure_unlocked()?;
        let start = self.sorts.len();
        self.sorts.extend(names.iter().map(|name| Arc::new(Sort::new(name))));
        Ok(SortsBuilder {
            indexes: (start..self.sorts.len()).collect(),
            config: self,
        })
    }

    /// Fields a request may restrict the projection to
    pub fn only(&mut self, fields: &[&str]) -> Result<&mut Self> {
        self.ensure_unlocked()?;
        self.fields_only = fields.iter().map(|field| field.to_string()).collect();
        Ok(self)
    }

    /// Sort applied when a request names none
    pub fn default_sort(&mut self, name: &str, order: SortOrder) -> Result<&mut Self> {
        self.ensure_unlocked()?;
        let sort = self.sort_or_fail(name)?;
        self.default_sorts.push(SortValue::new(sort, order));
        Ok(self)
    }

    pub fn pagination(&mut self) -> Result<&mut PaginationConfig> {
        self.ensure_unlocked()?;
        Ok(&mut self.pagination)
    }

    /// Swap the registry entry at `index`, keeping its position
    pub fn replace(&mut self, index: usize, entry: QueryFilter) -> Result<()> {
        self.ensure_unlocked()?;
        let slot = self
            .filters
            .get_mut(index)
            .ok_or_else(|| QueryError::not_found("filter", format!("#{index}")))?;
        *slot = entry;
        Ok(())
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn scope_registry(&self) -> &Arc<ScopeRegistry> {
        &self.scopes
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Filters and scopes in declaration order
    pub fn entries(&self) -> &[QueryFilter] {
        &self.filters
    }

    pub fn relationships(&self) -> &[Arc<Relationship>] {
        &self.relationships
    }

    pub fn sort_list(&self) -> &[Arc<Sort>] {
        &self.sorts
    }

    pub fn fields_only(&self) -> &[String] {
        &self.fields_only
    }

    pub fn pagination_config(&self) -> &PaginationConfig {
        &self.pagination
    }

    pub fn default_sorts(&self) -> &[SortValue] {
        &self.default_sorts
    }

    pub fn filter_or_fail(&self, name: &str) -> Result<Arc<Filter>> {
        self.filters
            .iter()
            .find_map(|entry| match entry {
                QueryFilter::Filter(filter) if filter.name() == name => Some(filter.clone()),
                _ => None,
            })
            .ok_or_else(|| QueryError::not_found("filter", name))
    }

    pub fn scope_or_fail(&self, name: &str) -> Result<Arc<Scope>> {
        self.filters
            .iter()
            .find_map(|entry| match entry {
                QueryFilter::Scope(scope) if scope.name() == name => Some(scope.clone()),
                _ => None,
            })
            .ok_or_else(|| QueryError::not_found("scope", name))
    }

    pub fn sort_or_fail(&self, name: &str) -> Result<Arc<Sort>> {
        self.sorts
            .iter()
            .find(|sort| sort.name() == name)
            .cloned()
            .ok_or_else(|| QueryError::not_found("sort", name))
    }

    pub fn relationship(&self, name: &str) -> Option<Arc<Relationship>> {
        self.relationships
            .iter()
            .find(|relationship| relationship.name() == name)
            .cloned()
    }

    pub fn relationship_or_fail(&self, name: &str) -> Result<Arc<Relationship>> {
        self.relationship(name)
            .ok_or_else(|| QueryError::not_found("relationship", name))
    }

    /// Freeze the declarations. Idempotent.
    ///
    /// Checks name uniqueness and dotted relationship names, then resolves
    /// every scope argument against the entity's scope methods.
    pub fn lock(&mut self) -> Result<()> {
        if self.locked {
            return Ok(());
        }

        self.check_unique("filter", self.filters.iter().map(QueryFilter::name))?;
        self.check_unique("sort", self.sorts.iter().map(|sort| sort.name()))?;
        self.check_unique(
            "relationship",
            self.relationships.iter().map(|relationship| relationship.name()),
        )?;

        for relationship in &self.relationships {
            if relationship.name().split('.').any(str::is_empty) {
                return Err(ConfigurationError::invalid_relationship(
                    &self.entity,
                    relationship.name(),
                    "dotted names cannot contain empty segments",
                )
                .into());
            }
        }

        for entry in &mut self.filters {
            if let QueryFilter::Scope(scope) = entry {
                Arc::make_mut(scope).lock(&self.scopes)?;
            }
        }

        self.locked = true;
        debug!(
            entity = %self.entity,
            filters = self.filters.len(),
            sorts = self.sorts.len(),
            relationships = self.relationships.len(),
            "Query configuration locked"
        );
        Ok(())
    }

    fn check_unique<'a>(&self, kind: &'static str, names: impl Iterator<Item = &'a str>) -> Result<()> {
        let mut seen = BTreeSet::new();
        for name in names {
            if !seen.insert(name) {
                return Err(ConfigurationError::DuplicateName {
                    entity: self.entity.clone(),
                    kind,
                    name: name.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Handle on a filter being declared
pub struct FilterBuilder<'c> {
    config: &'c mut QueryConfig,
    index: usize,
}

impl<'c> FilterBuilder<'c> {
    fn update(self, apply: impl FnOnce(&mut Filter)) -> Self {
        if let Some(QueryFilter::Filter(filter)) = self.config.filters.get_mut(self.index) {
            apply(Arc::make_mut(filter));
        }
        self
    }

    /// Column to filter on, when it differs from the name
    pub fn field(self, field: &str) -> Self {
        self.update(|filter| filter.field = field.to_string())
    }

    pub fn of_type(self, filter_type: FilterType) -> Self {
        self.update(|filter| filter.filter_type = filter_type)
    }

    pub fn default(self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.update(|filter| filter.default = Some(value))
    }

    pub fn dummy(self) -> Self {
        self.update(|filter| filter.dummy = true)
    }

    /// Promote the filter to a scope filter calling `method` (defaults to the filter name)
    pub fn scope(self, method: Option<&str>) -> ScopeBuilder<'c> {
        let name = match self.config.filters.get(self.index) {
            Some(entry) => entry.name().to_string(),
            None => String::new(),
        };
        let scope = Scope::new(&name, method.unwrap_or(&name));
        if let Some(slot) = self.config.filters.get_mut(self.index) {
            *slot = QueryFilter::Scope(Arc::new(scope));
        }
        ScopeBuilder {
            config: self.config,
            index: self.index,
        }
    }
}

/// Handle on a scope filter being declared
pub struct ScopeBuilder<'c> {
    config: &'c mut QueryConfig,
    index: usize,
}

impl ScopeBuilder<'_> {
    pub fn arg(self, name: &str) -> Self {
        self.arg_with(name, |argument| argument)
    }

    /// Add an argument configured by `configure`
    pub fn arg_with(self, name: &str, configure: impl FnOnce(ScopeArgument) -> ScopeArgument) -> Self {
        if let Some(QueryFilter::Scope(scope)) = self.config.filters.get_mut(self.index) {
            Arc::make_mut(scope).push_argument(configure(ScopeArgument::new(name)));
        }
        self
    }
}

/// Handle on several filters declared together
pub struct FiltersBuilder<'c> {
    config: &'c mut QueryConfig,
    indexes: Vec<usize>,
}

impl FiltersBuilder<'_> {
    fn update(self, apply: impl Fn(&mut Filter)) -> Self {
        for &index in &self.indexes {
            if let Some(QueryFilter::Filter(filter)) = self.config.filters.get_mut(index) {
                apply(Arc::make_mut(filter));
            }
        }
        self
    }

    pub fn of_type(self, filter_type: FilterType) -> Self {
        self.update(|filter| filter.filter_type = filter_type)
    }

    pub fn default(self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.update(|filter| filter.default = Some(value.clone()))
    }

    pub fn dummy(self) -> Self {
        self.update(|filter| filter.dummy = true)
    }
}

pub struct SortBuilder<'c> {
    config: &'c mut QueryConfig,
    index: usize,
}

impl SortBuilder<'_> {
    pub fn field(self, field: &str) -> Self {
        if let Some(sort) = self.config.sorts.get_mut(self.index) {
            Arc::make_mut(sort).field = field.to_string();
        }
        self
    }

    /// Register the sort as a default with `order`
    pub fn as_default(self, order: SortOrder) -> Self {
        if let Some(sort) = self.config.sorts.get(self.index) {
            let value = SortValue::new(sort.clone(), order);
            self.config.default_sorts.push(value);
        }
        self
    }
}

pub struct SortsBuilder<'c> {
    config: &'c mut QueryConfig,
    indexes: Vec<usize>,
}

impl SortsBuilder<'_> {
    pub fn as_default(self, order: SortOrder) -> Self {
        for &index in &self.indexes {
            if let Some(sort) = self.config.sorts.get(index) {
                let value = SortValue::new(sort.clone(), order);
                self.config.default_sorts.push(value);
            }
        }
        self
    }
}

pub struct RelationshipBuilder<'c> {
    config: &'c mut QueryConfig,
    index: usize,
}

impl RelationshipBuilder<'_> {
    /// Relation loaded on the builder, when it differs from the name
    pub fn relation(self, relation: &str) -> Self {
        if let Some(relationship) = self.config.relationships.get_mut(self.index) {
            Arc::make_mut(relationship).relation = relation.to_string();
        }
        self
    }

    pub fn with_scopes(self, scopes: &[&str]) -> Self {
        if let Some(relationship) = self.config.relationships.get_mut(self.index) {
            Arc::make_mut(relationship)
                .scopes
                .extend(scopes.iter().map(|scope| scope.to_string()));
        }
        self
    }
}

pub struct RelationshipsBuilder<'c> {
    config: &'c mut QueryConfig,
    indexes: Vec<usize>,
}

impl RelationshipsBuilder<'_> {
    pub fn with_scopes(self, scopes: &[&str]) -> Self {
        for &index in &self.indexes {
            if let Some(relationship) = self.config.relationships.get_mut(index) {
                Arc::make_mut(relationship)
                    .scopes
                    .extend(scopes.iter().map(|scope| scope.to_string()));
            }
        }
        self
    }
}

/// Locked configs keyed by definition type, built on first use
#[derive(Debug, Default)]
pub struct QueryConfigCache {
    configs: DashMap<TypeId, Arc<QueryConfig>>,
}

impl QueryConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache
    pub fn global() -> &'static QueryConfigCache {
        static CACHE: OnceLock<QueryConfigCache> = OnceLock::new();
        CACHE.get_or_init(QueryConfigCache::new)
    }

    pub fn get_or_build<D: QueryDefinition>(&self, definition: &D) -> Result<Arc<QueryConfig>> {
        let key = TypeId::of::<D>();
        if let Some(config) = self.configs.get(&key) {
            return Ok(config.clone());
        }
        let config = QueryConfig::build(definition)?;
        Ok(self.configs.entry(key).or_insert(config).clone())
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn clear(&self) {
        self.configs.clear();
    }
}
