//! Sorting, default sorts and field projection.

mod common;

use common::{bind, fetch, foo_scopes, names, store};
use query_config::query::QueryConfig;
use query_config::query_builder::ScopeRegistry;
use query_config::{QueryDefinition, QueryError, QueryRequest, RequestInput, Result, SortOrder};
use std::sync::Arc;

#[tokio::test]
async fn test_default_sort_applies_without_request_sort() {
    let store = store();
    let result = fetch("", &store).await.unwrap();
    assert_eq!(names(&result), vec!["Alice", "Carol", "Dave", "Eve", "Oscar"]);
}

#[tokio::test]
async fn test_request_sort_replaces_default() {
    let store = store();
    let result = fetch("sortBy=size&sortOrder=desc", &store).await.unwrap();
    assert_eq!(names(&result), vec!["Eve", "Dave", "Oscar", "Alice", "Carol"]);

    let result = fetch("sortBy=id", &store).await.unwrap();
    assert_eq!(names(&result), vec!["Carol", "Alice", "Eve", "Oscar", "Dave"]);
}

#[test]
fn test_empty_sort_keeps_default() {
    let store = store();
    let query = bind("sortBy=&sortOrder=", &store).unwrap();
    let sorts: Vec<(&str, SortOrder)> = query.sorts().iter().map(|sort| (sort.name(), sort.order())).collect();
    assert_eq!(sorts, vec![("name", SortOrder::Ascending)]);
}

#[test]
fn test_undeclared_sort_fails_validation() {
    let store = store();
    for query in ["sortBy=created_at", "sortBy=name&sortOrder=sideways"] {
        let error = bind(query, &store).unwrap_err();
        assert!(error.is_validation(), "{query} should fail validation");
    }
}

#[tokio::test]
async fn test_only_projects_requested_fields() {
    let store = store();
    let result = fetch("only[]=id&only[]=name&sortBy=id&limit=2", &store).await.unwrap();
    assert_eq!(
        result.items(),
        &[
            serde_json::json!({"id": 1, "name": "Carol"}),
            serde_json::json!({"id": 2, "name": "Alice"}),
        ]
    );

    let error = bind("only[]=state", &store).unwrap_err();
    match error {
        QueryError::Validation(errors) => assert!(errors.has("only.0")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

struct RankedQuery;

impl QueryDefinition for RankedQuery {
    fn entity(&self) -> &str {
        "foos"
    }

    fn scopes(&self) -> Arc<ScopeRegistry> {
        foo_scopes().into_shared()
    }

    fn configure(&self, config: &mut QueryConfig) -> Result<()> {
        config.sort("rank")?.field("size").as_default(SortOrder::Descending);
        config.sort("name")?;
        Ok(())
    }
}

#[tokio::test]
async fn test_sort_on_renamed_field() {
    let store = store();
    let config = QueryConfig::build(&RankedQuery).unwrap();
    let query = QueryRequest::new(config.clone(), RequestInput::default())
        .to_query()
        .unwrap();
    assert_eq!(query.sorts()[0].field(), "size");

    let result = common::run(&query, &store).await.unwrap();
    assert_eq!(names(&result), vec!["Eve", "Dave", "Oscar", "Alice", "Carol"]);

    let input = RequestInput::from_query_str("sortBy=rank").unwrap();
    let query = QueryRequest::new(config, input).to_query().unwrap();
    let result = common::run(&query, &store).await.unwrap();
    assert_eq!(names(&result), vec!["Carol", "Alice", "Oscar", "Dave", "Eve"]);
}
