//! Filter binding and application over the in-memory store.

mod common;

use common::{bind, fetch, names, run, store};
use query_config::{FilterMode, FilterType, QueryError};

#[tokio::test]
async fn test_integer_filter_defaults_to_equals() {
    let store = store();
    let result = fetch("size[value]=3", &store).await.unwrap();
    assert_eq!(names(&result), vec!["Alice"]);
}

#[tokio::test]
async fn test_string_filter_contains_negated() {
    let store = store();
    let result = fetch("name[value]=Ali&name[not]=1", &store).await.unwrap();
    assert_eq!(names(&result), vec!["Carol", "Dave", "Eve", "Oscar"]);
}

#[tokio::test]
async fn test_contains_is_literal() {
    let store = store();
    let result = fetch("name[value]=%25", &store).await.unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn test_numeric_comparison_modes() {
    let store = store();
    let result = fetch("size[value]=4&size[mode]=gt", &store).await.unwrap();
    assert_eq!(names(&result), vec!["Dave", "Eve", "Oscar"]);

    let result = fetch("size[value]=5&size[mode]=lte", &store).await.unwrap();
    assert_eq!(names(&result), vec!["Alice", "Carol", "Oscar"]);
}

#[tokio::test]
async fn test_datetime_filter_on_renamed_field() {
    let store = store();
    let result = fetch(
        "created[value]=2024-01-03T00:00:00%2B00:00&created[mode]=gte",
        &store,
    )
    .await
    .unwrap();
    assert_eq!(names(&result), vec!["Dave", "Eve", "Oscar"]);
}

#[tokio::test]
async fn test_dummy_filter_is_bound_but_not_applied() {
    let store = store();
    let query = bind("legacy[value]=anything", &store).unwrap();
    assert!(query.has_filter("legacy").unwrap());

    let result = run(&query, &store).await.unwrap();
    assert_eq!(result.len(), 5);
}

#[tokio::test]
async fn test_string_in_is_not_implemented() {
    let store = store();
    let query = bind("name[value]=Ali&name[mode]=in", &store).unwrap();
    let error = run(&query, &store).await.unwrap_err();
    assert!(matches!(
        error,
        QueryError::NotImplemented {
            filter_type: FilterType::String,
            mode: FilterMode::In,
            ..
        }
    ));
}

#[test]
fn test_mode_outside_type_fails_validation() {
    let store = store();
    let error = bind("name[value]=Ali&name[mode]=gt", &store).unwrap_err();
    match error {
        QueryError::Validation(errors) => assert!(errors.has("name.mode")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_invalid_integer_value_fails_validation() {
    let store = store();
    let error = bind("size[value]=three", &store).unwrap_err();
    assert!(error.is_validation());
}

#[test]
fn test_unknown_parameter_fails_validation() {
    let store = store();
    let error = bind("colour[value]=red", &store).unwrap_err();
    match error {
        QueryError::Validation(errors) => assert!(errors.has("colour")),
        other => panic!("expected validation error, got {other:?}"),
    }
}
