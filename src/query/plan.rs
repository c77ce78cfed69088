//! Per-request query plans.
//!
//! A [`Query`] records what one request asked for. Values are appended while
//! binding and read back by the applier; the locked [`QueryConfig`] it points
//! to is never modified.

use super::filter::FilterValue;
use super::pagination::PaginationStrategy;
use super::query_config::{QueryConfig, QueryConfigCache};
use super::relationship::RelationshipValue;
use super::scope::ScopeValue;
use super::sort::SortValue;
use super::QueryDefinition;
use crate::constants::{FilterMode, SortOrder};
use crate::error::{QueryError, Result};
use crate::query_builder::EntityLookup;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Read-only view of a plan handed to argument resolvers and transformers
#[derive(Clone, Copy)]
pub struct QueryContext<'q> {
    config: &'q QueryConfig,
    filters: &'q [FilterValue],
    entities: Option<&'q dyn EntityLookup>,
}

impl<'q> QueryContext<'q> {
    pub fn new(
        config: &'q QueryConfig,
        filters: &'q [FilterValue],
        entities: Option<&'q dyn EntityLookup>,
    ) -> Self {
        Self {
            config,
            filters,
            entities,
        }
    }

    pub fn config(&self) -> &'q QueryConfig {
        self.config
    }

    /// Filters applied so far
    pub fn filters(&self) -> &'q [FilterValue] {
        self.filters
    }

    pub fn filter_value(&self, name: &str) -> Option<&'q FilterValue> {
        self.filters.iter().find(|filter| filter.name() == name)
    }

    pub fn entities(&self) -> Option<&'q dyn EntityLookup> {
        self.entities
    }
}

/// Plan of one request
#[derive(Clone)]
pub struct Query {
    config: Arc<QueryConfig>,
    filters: Vec<FilterValue>,
    scopes: Vec<ScopeValue>,
    relationships: Vec<RelationshipValue>,
    sorts: Vec<SortValue>,
    fields_only: Vec<String>,
    pagination: PaginationStrategy,
    dump: bool,
    entities: Option<Arc<dyn EntityLookup>>,
}

impl Query {
    /// Build and lock a fresh config for `definition`
    pub fn new<D: QueryDefinition + ?Sized>(definition: &D) -> Result<Self> {
        Ok(Self::from_config(QueryConfig::build(definition)?))
    }

    /// Reuse the config built for `D` by the global cache
    pub fn cached<D: QueryDefinition>(definition: &D) -> Result<Self> {
        Ok(Self::from_config(QueryConfigCache::global().get_or_build(definition)?))
    }

    pub fn from_config(config: Arc<QueryConfig>) -> Self {
        let pagination = config.pagination_config().make_default();
        Self {
            config,
            filters: Vec::new(),
            scopes: Vec::new(),
            relationships: Vec::new(),
            sorts: Vec::new(),
            fields_only: Vec::new(),
            pagination,
            dump: false,
            entities: None,
        }
    }

    /// Source used to resolve entity-typed scope arguments
    pub fn with_entities(mut self, entities: Arc<dyn EntityLookup>) -> Self {
        self.entities = Some(entities);
        self
    }

    pub fn filter(&mut self, name: &str, mode: FilterMode, value: impl Into<Value>, not: bool) -> Result<&mut Self> {
        let filter = self.config.filter_or_fail(name)?;
        self.filters.push(FilterValue::new(filter, mode, value.into(), not));
        Ok(self)
    }

    /// Activate the scope `name` and return a handle for its arguments
    pub fn scope(&mut self, name: &str) -> Result<ScopeHandle<'_>> {
        let scope = self.config.scope_or_fail(name)?;
        let Query {
            config,
            filters,
            scopes,
            entities,
            ..
        } = self;
        let context = QueryContext::new(config, filters, entities.as_deref());
        scopes.push(ScopeValue::new(scope, &context));
        let value = scopes
            .last_mut()
            .ok_or_else(|| QueryError::not_found("scope", name))?;
        Ok(ScopeHandle { value, context })
    }

    pub fn sort_by(&mut self, name: &str, order: SortOrder) -> Result<&mut Self> {
        let sort = self.config.sort_or_fail(name)?;
        self.sorts.push(SortValue::new(sort, order));
        Ok(self)
    }

    /// Eager-load a declared relationship; loading twice is a no-op
    pub fn load(&mut self, name: &str) -> Result<&mut Self> {
        let relationship = self.config.relationship_or_fail(name)?;
        if !self.relationships.iter().any(|loaded| loaded.name() == name) {
            self.relationships.push(RelationshipValue::new(relationship));
        }
        Ok(self)
    }

    pub fn fields_only(&mut self, field: &str) -> &mut Self {
        self.fields_only.push(field.to_string());
        self
    }

    pub fn paginate(&mut self, pagination: impl Into<PaginationStrategy>) -> &mut Self {
        self.pagination = pagination.into();
        self
    }

    /// Return the composed query instead of results
    pub fn dump(&mut self) -> &mut Self {
        self.dump = true;
        self
    }

    pub fn config(&self) -> &Arc<QueryConfig> {
        &self.config
    }

    pub fn filters(&self) -> &[FilterValue] {
        &self.filters
    }

    pub fn scopes(&self) -> &[ScopeValue] {
        &self.scopes
    }

    pub fn relationships(&self) -> &[RelationshipValue] {
        &self.relationships
    }

    /// Explicit sorts, or the configured defaults when none were given
    pub fn sorts(&self) -> &[SortValue] {
        if self.sorts.is_empty() {
            self.config.default_sorts()
        } else {
            &self.sorts
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields_only
    }

    pub fn pagination(&self) -> &PaginationStrategy {
        &self.pagination
    }

    pub fn should_dump(&self) -> bool {
        self.dump
    }

    /// Whether the plan filters on `name`; fails for a name the config never declared
    pub fn has_filter(&self, name: &str) -> Result<bool> {
        self.config.filter_or_fail(name)?;
        Ok(self.filters.iter().any(|filter| filter.name() == name))
    }

    /// Whether the plan applies scope `name`; fails for a name the config never declared
    pub fn has_scope(&self, name: &str) -> Result<bool> {
        self.config.scope_or_fail(name)?;
        Ok(self.scopes.iter().any(|scope| scope.name() == name))
    }

    pub fn get_scope(&self, name: &str) -> Option<&ScopeValue> {
        self.scopes.iter().find(|scope| scope.name() == name)
    }

    pub fn context(&self) -> QueryContext<'_> {
        QueryContext::new(&self.config, &self.filters, self.entities.as_deref())
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("entity", &self.config.entity())
            .field("filters", &self.filters)
            .field("scopes", &self.scopes)
            .field("relationships", &self.relationships)
            .field("sorts", &self.sorts)
            .field("fields_only", &self.fields_only)
            .field("pagination", &self.pagination)
            .field("dump", &self.dump)
            .field("entities", &self.entities.is_some())
            .finish()
    }
}

/// Argument setter for a scope just added to a plan
pub struct ScopeHandle<'q> {
    value: &'q mut ScopeValue,
    context: QueryContext<'q>,
}

impl ScopeHandle<'_> {
    /// Set an argument through its transformer
    pub fn set(&mut self, argument: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.value.set_argument(argument, value.into(), &self.context)?;
        Ok(self)
    }

    pub fn value(&self) -> &ScopeValue {
        &*self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FilterType;
    use crate::query::pagination::NoPagination;
    use crate::query_builder::{ParameterDescriptor, ScopeRegistry};
    use crate::validation::Rule;

    fn config() -> Arc<QueryConfig> {
        let scopes = ScopeRegistry::new("foos")
            .register("whereSize", vec![ParameterDescriptor::integer("size")], |_, _| Ok(()))
            .into_shared();
        let mut config = QueryConfig::new("foos", scopes);
        config.filter("name").unwrap();
        config.filter("size").unwrap().of_type(FilterType::Integer);
        config
            .filter("big")
            .unwrap()
            .scope(Some("whereSize"))
            .arg_with("size", |argument| {
                argument.using(|context| {
                    context
                        .filter_value("size")
                        .map(|filter| filter.value().clone())
                        .unwrap_or(Value::Integer(10))
                })
            });
        config
            .filter("doubled")
            .unwrap()
            .scope(Some("whereSize"))
            .arg_with("size", |argument| {
                argument
                    .with_validation(vec![Rule::Integer])
                    .transform(|value, _| Ok(Value::Integer(value.as_i64().unwrap_or_default() * 2)))
            });
        config.sorts(&["id", "name"]).unwrap();
        config.default_sort("id", SortOrder::Descending).unwrap();
        config.with("bars").unwrap();
        config.lock().unwrap();
        Arc::new(config)
    }

    #[test]
    fn test_filters_chain() {
        let mut query = Query::from_config(config());
        query
            .filter("name", FilterMode::Contains, "Ali", false)
            .unwrap()
            .filter("size", FilterMode::GreaterThan, 3, true)
            .unwrap();
        assert_eq!(query.filters().len(), 2);
        assert!(query.has_filter("size").unwrap());
        assert!(!query.has_filter("name").unwrap());
        assert!(matches!(
            query.filter("big", FilterMode::Equals, 1, false),
            Err(QueryError::NotFound { kind: "filter", .. })
        ));
    }

    #[test]
    fn test_scope_resolver_sees_earlier_filters() {
        let mut query = Query::from_config(config());
        query.scope("big").unwrap();
        query.filter("size", FilterMode::Equals, 7, false).unwrap();
        query.scope("big").unwrap();

        let values: Vec<&Value> = query
            .scopes()
            .iter()
            .map(|scope| scope.argument("size").unwrap().value())
            .collect();
        assert_eq!(values, vec![&Value::Integer(10), &Value::Integer(7)]);
    }

    #[test]
    fn test_scope_handle_transforms() {
        let mut query = Query::from_config(config());
        query.scope("doubled").unwrap().set("size", 4).unwrap();
        assert!(query.has_scope("doubled").unwrap());
        assert!(!query.has_scope("big").unwrap());
        assert!(matches!(
            query.has_scope("dobled"),
            Err(QueryError::NotFound { kind: "scope", .. })
        ));
        assert!(query.has_scope("name").is_err());
        let scope = query.get_scope("doubled").unwrap();
        assert_eq!(scope.arguments_map().get("size"), Some(&Value::Integer(8)));
        assert!(query.scope("name").is_err());
    }

    #[test]
    fn test_sorts_fall_back_to_defaults() {
        let mut query = Query::from_config(config());
        assert_eq!(query.sorts()[0].name(), "id");
        assert_eq!(query.sorts()[0].order(), SortOrder::Descending);

        query.sort_by("name", SortOrder::Ascending).unwrap();
        assert_eq!(query.sorts().len(), 1);
        assert_eq!(query.sorts()[0].name(), "name");
    }

    #[test]
    fn test_load_and_pagination() {
        let mut query = Query::from_config(config());
        query.load("bars").unwrap().load("bars").unwrap();
        assert_eq!(query.relationships().len(), 1);
        assert!(query.load("owner").is_err());

        assert_eq!(query.pagination().mode(), crate::constants::PaginationMode::Offset);
        query.paginate(NoPagination).fields_only("id").dump();
        assert_eq!(query.pagination().mode(), crate::constants::PaginationMode::None);
        assert_eq!(query.fields(), &["id".to_string()]);
        assert!(query.should_dump());
    }
}
