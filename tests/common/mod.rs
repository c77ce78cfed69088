//! Shared fixtures: a `foos` / `bars` store and the `FooQuery` definition.
#![allow(dead_code)]

pub mod strategies;

use query_config::query::QueryConfig;
use query_config::query_builder::{
    required_argument, Boolean, MemoryQueryBuilder, MemoryStore, Operator, ParameterDescriptor,
    RelationDefinition, ScopeRegistry, TableSchema,
};
use query_config::validation::Rule;
use query_config::{
    FilterType, Query, QueryApplier, QueryDefinition, QueryError, QueryRequest, QueryResult,
    QuerySettings, Record, RequestInput, Result, SortOrder, Value,
};
use serde_json::json;
use std::sync::Arc;

/// Lifecycle state of a foo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FooState {
    Active,
    Pending,
    Inactive,
}

impl FooState {
    pub const ALL: [FooState; 3] = [Self::Active, Self::Pending, Self::Inactive];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Inactive => "inactive",
        }
    }

    pub fn parse(value: &Value) -> Result<Self> {
        let text = value.as_str().unwrap_or_default();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == text)
            .ok_or_else(|| QueryError::invalid_argument("state", format!("unknown state `{text}`")))
    }
}

fn state_names() -> Vec<&'static str> {
    FooState::ALL.iter().map(FooState::as_str).collect()
}

pub fn foo_scopes() -> ScopeRegistry {
    ScopeRegistry::new("foos")
        .register(
            "whereState",
            vec![ParameterDescriptor::other("state", "FooState")],
            |builder, arguments| {
                let state = required_argument(arguments, "whereState", "state")?.clone();
                builder.where_compare("state", Operator::Eq, state, Boolean::And);
                Ok(())
            },
        )
        .register(
            "whereStates",
            vec![ParameterDescriptor::other("states", "Vec<FooState>")],
            |builder, arguments| {
                let states = required_argument(arguments, "whereStates", "states")?;
                let values = states.as_array().map(<[Value]>::to_vec).unwrap_or_default();
                builder.where_in("state", values, Boolean::And);
                Ok(())
            },
        )
        .register(
            "whereBar",
            vec![ParameterDescriptor::entity("bar", "bars")],
            |builder, arguments| {
                let bar = required_argument(arguments, "whereBar", "bar")?;
                let foo_id = bar
                    .as_record()
                    .and_then(|record| record.get("foo_id"))
                    .map(Value::from_json)
                    .unwrap_or_default();
                builder.where_compare("id", Operator::Eq, foo_id, Boolean::And);
                Ok(())
            },
        )
        .register(
            "minSize",
            vec![ParameterDescriptor::integer("size").optional()],
            |builder, arguments| {
                let size = arguments.get("size").cloned().unwrap_or(Value::Integer(0));
                builder.where_compare("size", Operator::Gte, size, Boolean::And);
                Ok(())
            },
        )
        .register("popular", vec![], |builder, _| {
            builder.where_compare("size", Operator::Gte, Value::Integer(10), Boolean::And);
            Ok(())
        })
}

pub fn bar_scopes() -> ScopeRegistry {
    ScopeRegistry::new("bars").register("active", vec![], |builder, _| {
        builder.where_compare("active", Operator::Eq, Value::Bool(true), Boolean::And);
        Ok(())
    })
}

/// Query definition for the `foos` table
pub struct FooQuery;

impl QueryDefinition for FooQuery {
    fn entity(&self) -> &str {
        "foos"
    }

    fn scopes(&self) -> Arc<ScopeRegistry> {
        foo_scopes().into_shared()
    }

    fn configure(&self, config: &mut QueryConfig) -> Result<()> {
        config.filter("name")?;
        config.filter("size")?.of_type(FilterType::Integer);
        config
            .filter("created")?
            .field("created_at")
            .of_type(FilterType::DateTime);
        config.filter("legacy")?.dummy();

        config.filter("whereState")?.scope(None).arg_with("state", |argument| {
            argument
                .with_validation(vec![
                    Rule::RequiredWith("whereState".to_string()),
                    Rule::String,
                    Rule::one_of(state_names()),
                ])
                .transform(|value, _| Ok(Value::from(FooState::parse(&value)?.as_str())))
        });
        config.filter("whereStates")?.scope(None).arg_with("states", |argument| {
            argument
                .with_validation(vec![
                    Rule::RequiredWith("whereStates".to_string()),
                    Rule::Array,
                    Rule::Min(1),
                ])
                .added_validation("*", vec![Rule::Required, Rule::String, Rule::one_of(state_names())])
                .transform(|value, _| {
                    let states = value
                        .as_array()
                        .unwrap_or_default()
                        .iter()
                        .map(|state| FooState::parse(state).map(|state| Value::from(state.as_str())))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Value::Array(states))
                })
        });
        config.filter("whereBar")?.scope(None).arg("bar");
        config.filter("minSize")?.scope(None).arg("size");
        config.filter("popular")?.scope(None);

        config.sorts(&["id", "name"])?;
        config.sort("size")?;
        config.default_sort("name", SortOrder::Ascending)?;

        config.with("bars")?.with_scopes(&["active"]);
        config.with("bars.foo")?;
        config.with("subject")?.with_scopes(&["active"]);

        config.only(&["id", "name", "size"])?;
        Ok(())
    }
}

pub fn foo_schema() -> TableSchema {
    TableSchema::new("foos")
        .scopes(foo_scopes())
        .relation(RelationDefinition::has_many("bars", "bars", "foo_id", "id"))
        .relation(
            RelationDefinition::morph_to("subject", "subject_type", "subject_id")
                .with_type_binding([("bar", "bars")]),
        )
}

pub fn bar_schema() -> TableSchema {
    TableSchema::new("bars")
        .scopes(bar_scopes())
        .relation(RelationDefinition::belongs_to("foo", "foos", "foo_id", "id"))
}

/// Carol, Alice, Eve, Oscar and Dave, in insertion order
pub fn named_foos() -> Vec<Record> {
    vec![
        json!({"id": 1, "name": "Carol", "size": 1, "state": "active", "created_at": "2024-01-01T10:00:00+00:00", "subject_type": "bar", "subject_id": 10}),
        json!({"id": 2, "name": "Alice", "size": 3, "state": "pending", "created_at": "2024-01-02T10:00:00+00:00", "subject_type": null, "subject_id": null}),
        json!({"id": 3, "name": "Eve", "size": 12, "state": "active", "created_at": "2024-01-03T10:00:00+00:00", "subject_type": null, "subject_id": null}),
        json!({"id": 4, "name": "Oscar", "size": 5, "state": "inactive", "created_at": "2024-01-04T10:00:00+00:00", "subject_type": null, "subject_id": null}),
        json!({"id": 5, "name": "Dave", "size": 8, "state": "pending", "created_at": "2024-01-05T10:00:00+00:00", "subject_type": null, "subject_id": null}),
    ]
}

pub fn bars() -> Vec<Record> {
    vec![
        json!({"id": 10, "foo_id": 1, "label": "first", "active": true}),
        json!({"id": 11, "foo_id": 1, "label": "second", "active": false}),
        json!({"id": 12, "foo_id": 2, "label": "third", "active": true}),
    ]
}

pub fn store() -> Arc<MemoryStore> {
    MemoryStore::new()
        .table(foo_schema(), named_foos())
        .table(bar_schema(), bars())
        .into_shared()
}

/// `count` foos named `foo-01`, `foo-02`, ...
pub fn numbered_store(count: usize) -> Arc<MemoryStore> {
    let foos = (1..=count)
        .map(|id| {
            json!({
                "id": id,
                "name": format!("foo-{id:02}"),
                "size": id % 7,
                "state": FooState::ALL[id % 3].as_str(),
                "created_at": "2024-01-01T00:00:00+00:00",
            })
        })
        .collect();
    MemoryStore::new()
        .table(foo_schema(), foos)
        .table(bar_schema(), Vec::new())
        .into_shared()
}

pub fn foo_config() -> Arc<QueryConfig> {
    QueryConfig::build(&FooQuery).expect("FooQuery configuration should lock")
}

pub fn builder(store: &Arc<MemoryStore>) -> MemoryQueryBuilder {
    MemoryQueryBuilder::new(store.clone(), "foos").expect("foos table is registered")
}

/// Bind a query string against `FooQuery`
pub fn bind(query: &str, store: &Arc<MemoryStore>) -> Result<Query> {
    let input = RequestInput::from_query_str(query)?;
    QueryRequest::new(foo_config(), input)
        .with_settings(QuerySettings::for_test())
        .with_entities(store.clone())
        .to_query()
}

/// Apply and paginate `query` over `store`
pub async fn run(query: &Query, store: &Arc<MemoryStore>) -> Result<QueryResult> {
    let response = QueryApplier::new(QuerySettings::for_test())
        .run(&mut builder(store), query)
        .await?;
    response
        .into_results()
        .ok_or_else(|| QueryError::Storage("query was dumped".to_string()))
}

/// Bind then run
pub async fn fetch(query: &str, store: &Arc<MemoryStore>) -> Result<QueryResult> {
    let query = bind(query, store)?;
    run(&query, store).await
}

pub fn names(result: &QueryResult) -> Vec<String> {
    result
        .items()
        .iter()
        .filter_map(|row| row.get("name").and_then(|name| name.as_str()).map(str::to_string))
        .collect()
}
