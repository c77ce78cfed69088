//! # Query Applier
//!
//! Emits a [`Query`] plan onto a [`QueryBuilder`]: filters, scopes, eager
//! loads, ordering and projection, in that order. [`QueryApplier::run`]
//! additionally hands the composed builder to the plan's pagination strategy,
//! or returns its textual dump when the plan asks for one.
//!
//! Filter dispatch by type and mode:
//!
//! | type                              | modes                          |
//! |-----------------------------------|--------------------------------|
//! | string                            | equals, contains               |
//! | integer, float, date, date_time   | equals, gt, gte, lt, lte       |
//! | boolean                           | equals                         |
//! | array                             | in                             |
//!
//! Any other combination fails with [`QueryError::NotImplemented`].

use crate::config::QuerySettings;
use crate::constants::{FilterMode, FilterType};
use crate::error::{QueryError, Result};
use crate::logging::log_query_operation;
use crate::query::{FilterValue, Query, QueryPagination, Relationship, ScopeValue};
use crate::query_builder::{
    contains_pattern, FetchQuery, Operator, QueryBuilder, QueryDump, RelationConstraint, RelationQuery,
    ScopeArguments,
};
use crate::result::QueryResult;
use crate::value::Value;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of running a plan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Results(QueryResult),
    Dump(QueryDump),
}

impl QueryResponse {
    pub fn results(&self) -> Option<&QueryResult> {
        match self {
            Self::Results(result) => Some(result),
            Self::Dump(_) => None,
        }
    }

    pub fn into_results(self) -> Option<QueryResult> {
        match self {
            Self::Results(result) => Some(result),
            Self::Dump(_) => None,
        }
    }

    pub fn dump(&self) -> Option<&QueryDump> {
        match self {
            Self::Dump(dump) => Some(dump),
            Self::Results(_) => None,
        }
    }
}

/// Applies plans to builders
#[derive(Debug, Clone, Default)]
pub struct QueryApplier {
    settings: QuerySettings,
}

impl QueryApplier {
    pub fn new(settings: QuerySettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Compose `query` onto `builder`
    pub fn apply(&self, builder: &mut dyn QueryBuilder, query: &Query) -> Result<()> {
        for filter in query.filters() {
            if filter.is_dummy() {
                continue;
            }
            apply_filter(builder, filter)?;
        }

        for scope in query.scopes() {
            self.apply_scope(builder, scope)?;
        }

        for relationship in query.relationships() {
            self.apply_relationship(builder, query, relationship.relationship())?;
        }

        for sort in query.sorts() {
            builder.order_by(sort.field(), sort.order());
        }

        if !query.fields().is_empty() {
            builder.select(query.fields());
        }

        debug!(
            entity = builder.entity(),
            filters = query.filters().len(),
            scopes = query.scopes().len(),
            relationships = query.relationships().len(),
            "Query plan applied"
        );
        Ok(())
    }

    /// Apply `query`, then paginate or dump
    pub async fn run<B: FetchQuery>(&self, builder: &mut B, query: &Query) -> Result<QueryResponse> {
        self.apply(builder, query)?;

        if query.should_dump() {
            let dump = builder.to_dump();
            info!(
                entity = builder.entity(),
                connection = %dump.connection,
                sql = %dump.sql,
                bindings = dump.bindings.len(),
                "Query dump"
            );
            return Ok(QueryResponse::Dump(dump));
        }

        let result = query.pagination().handle(&*builder).await?;
        let details = format!("mode={} items={}", query.pagination().mode(), result.len());
        log_query_operation("run", builder.entity(), "success", Some(&details));
        Ok(QueryResponse::Results(result))
    }

    fn apply_scope(&self, builder: &mut dyn QueryBuilder, scope: &ScopeValue) -> Result<()> {
        let registry = builder.scopes();
        match registry.get(scope.scope_name()) {
            Some(method) => method.call(builder, &scope.arguments_map()),
            None if self.settings.strict_scopes => {
                Err(QueryError::unknown_scope(registry.entity(), scope.scope_name()))
            }
            None => {
                warn!(
                    entity = registry.entity(),
                    scope = scope.name(),
                    method = scope.scope_name(),
                    "Scope method not registered, skipping"
                );
                Ok(())
            }
        }
    }

    /// Eager-load `relationship`, then its declared parent for dotted names
    fn apply_relationship(
        &self,
        builder: &mut dyn QueryBuilder,
        query: &Query,
        relationship: &Relationship,
    ) -> Result<()> {
        let constraint = relation_constraint(relationship, self.settings.strict_scopes);
        builder.with_relation(relationship.relation(), constraint)?;

        if let Some(parent) = relationship
            .parent_name()
            .and_then(|parent| query.config().relationship(parent))
        {
            self.apply_relationship(builder, query, &parent)?;
        }
        Ok(())
    }
}

fn comparison(mode: FilterMode) -> Option<Operator> {
    match mode {
        FilterMode::Equals => Some(Operator::Eq),
        FilterMode::GreaterThan => Some(Operator::Gt),
        FilterMode::GreaterThanOrEqual => Some(Operator::Gte),
        FilterMode::LessThan => Some(Operator::Lt),
        FilterMode::LessThanOrEqual => Some(Operator::Lte),
        FilterMode::Contains | FilterMode::In => None,
    }
}

fn not_implemented(filter: &FilterValue) -> QueryError {
    QueryError::NotImplemented {
        filter: filter.name().to_string(),
        filter_type: filter.filter_type(),
        mode: filter.mode(),
    }
}

fn apply_filter(builder: &mut dyn QueryBuilder, filter: &FilterValue) -> Result<()> {
    let field = filter.field();
    let value = filter.value().clone();
    let boolean = filter.boolean();

    match (filter.filter_type(), filter.mode()) {
        (FilterType::String, FilterMode::Equals) | (FilterType::Boolean, FilterMode::Equals) => {
            builder.where_compare(field, Operator::Eq, value, boolean);
        }
        (FilterType::String, FilterMode::Contains) => {
            let text = match &value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            builder.where_like(field, contains_pattern(&text), boolean);
        }
        (FilterType::Integer | FilterType::Float | FilterType::Date | FilterType::DateTime, mode) => {
            let operator = comparison(mode).ok_or_else(|| not_implemented(filter))?;
            builder.where_compare(field, operator, value, boolean);
        }
        (FilterType::Array, FilterMode::In) => {
            let values = match value {
                Value::Array(values) => values,
                other => vec![other],
            };
            builder.where_in(field, values, boolean);
        }
        _ => return Err(not_implemented(filter)),
    }
    Ok(())
}

/// Scopes run on the related query; polymorphic relations only check the type binding
fn relation_constraint(relationship: &Relationship, strict: bool) -> Option<RelationConstraint> {
    if relationship.scopes().is_empty() {
        return None;
    }
    let scopes = relationship.scopes().to_vec();
    let constraint: RelationConstraint = Arc::new(move |related: &mut dyn RelationQuery| {
        if let Some(morph_type) = related.morph_type() {
            if !related.has_enum_binding(morph_type) {
                return Err(QueryError::InvalidPolymorphic {
                    model: related.parent_entity().to_string(),
                    field: morph_type.to_string(),
                });
            }
            return Ok(());
        }

        let registry = related.query().scopes();
        for scope in &scopes {
            match registry.get(scope) {
                Some(method) => method.call(related.query(), &ScopeArguments::new())?,
                None if strict => return Err(QueryError::unknown_scope(registry.entity(), scope)),
                None => warn!(
                    entity = registry.entity(),
                    relation = related.relation(),
                    scope = %scope,
                    "Relation scope not registered, skipping"
                ),
            }
        }
        Ok(())
    });
    Some(constraint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SortOrder;
    use crate::query::QueryConfig;
    use crate::query_builder::{
        required_argument, Catalog, ParameterDescriptor, ScopeRegistry, SqlQueryBuilder, TableSchema,
    };

    fn scopes() -> ScopeRegistry {
        ScopeRegistry::new("foos").register(
            "whereSize",
            vec![ParameterDescriptor::integer("size")],
            |builder, arguments| {
                let size = required_argument(arguments, "whereSize", "size")?.clone();
                builder.where_compare("size", Operator::Eq, size, Default::default());
                Ok(())
            },
        )
    }

    fn builder() -> SqlQueryBuilder {
        let catalog = Catalog::new().table(TableSchema::new("foos").scopes(scopes()));
        SqlQueryBuilder::new(catalog.into_shared(), "foos").unwrap()
    }

    fn config(configure: impl FnOnce(&mut QueryConfig)) -> Arc<QueryConfig> {
        let mut config = QueryConfig::new("foos", scopes().into_shared());
        configure(&mut config);
        config.lock().unwrap();
        Arc::new(config)
    }

    #[test]
    fn test_filters_render_in_order() {
        let config = config(|config| {
            config.filter("name").unwrap();
            config.filter("size").unwrap().of_type(FilterType::Integer);
            config.filter("ghost").unwrap().dummy();
        });
        let mut query = Query::from_config(config);
        query
            .filter("name", FilterMode::Contains, "50%_off", true)
            .unwrap()
            .filter("size", FilterMode::LessThan, 4, false)
            .unwrap()
            .filter("ghost", FilterMode::Equals, "x", false)
            .unwrap();

        let mut builder = builder();
        QueryApplier::default().apply(&mut builder, &query).unwrap();
        let dump = builder.to_dump();
        assert!(dump.sql.contains(r#"NOT ("name" LIKE $1 ESCAPE"#), "{}", dump.sql);
        assert!(dump.sql.contains(r#""size" < $2"#), "{}", dump.sql);
        assert_eq!(dump.bindings, vec![Value::from(r"%50\%\_off%"), Value::Integer(4)]);
    }

    #[test]
    fn test_unsupported_modes_are_not_implemented() {
        let config = config(|config| {
            config.filter("name").unwrap();
            config.filter("size").unwrap().of_type(FilterType::Integer);
        });
        for (name, mode) in [("name", FilterMode::In), ("size", FilterMode::In), ("size", FilterMode::Contains)] {
            let mut query = Query::from_config(config.clone());
            query.filter(name, mode, 1, false).unwrap();
            let error = QueryApplier::default().apply(&mut builder(), &query).unwrap_err();
            assert!(matches!(error, QueryError::NotImplemented { .. }), "{name} {mode}");
        }
    }

    #[test]
    fn test_array_in_honours_negation() {
        let config = config(|config| {
            config.filter("tags").unwrap().field("tag").of_type(FilterType::Array);
        });
        let mut query = Query::from_config(config);
        query.filter("tags", FilterMode::In, vec!["a", "b"], true).unwrap();
        let mut builder = builder();
        QueryApplier::default().apply(&mut builder, &query).unwrap();
        assert!(builder.to_dump().sql.contains(r#"NOT ("tag" IN ($1, $2))"#), "{}", builder.to_dump().sql);
    }

    #[test]
    fn test_scopes_receive_parameter_keyed_arguments() {
        let config = config(|config| {
            config.filter("big").unwrap().scope(Some("whereSize")).arg("size");
            config.filter("missing").unwrap().scope(Some("whereMissing"));
        });
        let mut query = Query::from_config(config.clone());
        query.scope("big").unwrap().set("size", 9).unwrap();
        let mut builder = builder();
        QueryApplier::default().apply(&mut builder, &query).unwrap();
        assert_eq!(builder.to_dump().bindings, vec![Value::Integer(9)]);

        let mut query = Query::from_config(config);
        query.scope("missing").unwrap();
        let strict = QueryApplier::default().apply(&mut self::builder(), &query);
        assert!(matches!(strict, Err(QueryError::UnknownScope { .. })));

        let permissive = QueryApplier::new(QuerySettings {
            strict_scopes: false,
            ..QuerySettings::default()
        });
        assert!(permissive.apply(&mut self::builder(), &query).is_ok());
    }

    #[test]
    fn test_sorts_and_projection() {
        let config = config(|config| {
            config.sorts(&["id", "name"]).unwrap();
            config.default_sort("id", SortOrder::Descending).unwrap();
        });
        let mut query = Query::from_config(config);
        query.fields_only("name");
        let mut builder = builder();
        QueryApplier::default().apply(&mut builder, &query).unwrap();
        let sql = builder.to_dump().sql;
        assert!(sql.contains(r#"ORDER BY "id" DESC"#), "{sql}");
    }

    #[tokio::test]
    async fn test_dump_skips_pagination() {
        let config = config(|_| {});
        let mut query = Query::from_config(config);
        query.dump();
        let response = QueryApplier::new(QuerySettings::for_test())
            .run(&mut builder(), &query)
            .await
            .unwrap();
        let dump = response.dump().unwrap();
        assert!(dump.sql.starts_with("SELECT"));
        assert!(response.results().is_none());
    }
}
