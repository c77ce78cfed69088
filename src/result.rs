//! # Query Results
//!
//! The three result shapes produced by pagination strategies. Each serializes
//! to the JSON body an API would return: a bare `data` list, or `data` plus
//! pagination `meta`.

use crate::query_builder::pagination::LimitOffset;
use crate::value::Record;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Every matching row, unpaginated
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Collection {
    pub items: Vec<Record>,
}

impl Serialize for Collection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Collection", 1)?;
        state.serialize_field("data", &self.items)?;
        state.end()
    }
}

/// One page of an offset-paginated result with its total count
#[derive(Debug, Clone, PartialEq)]
pub struct LengthAwarePaginator {
    pub items: Vec<Record>,
    pub total: u64,
    pub per_page: u32,
    pub current_page: u32,
}

impl LengthAwarePaginator {
    pub fn new(items: Vec<Record>, total: u64, per_page: u32, current_page: u32) -> Self {
        Self {
            items,
            total,
            per_page,
            current_page,
        }
    }

    /// Window this page was fetched with
    pub fn window(&self) -> LimitOffset {
        LimitOffset::new(self.current_page.max(1), self.per_page)
    }

    pub fn last_page(&self) -> u64 {
        self.window().total_pages(self.total)
    }

    /// 1-based position of the first item, `None` on an empty page
    pub fn from(&self) -> Option<u64> {
        if self.items.is_empty() {
            return None;
        }
        Some(u64::from(self.current_page.saturating_sub(1)) * u64::from(self.per_page) + 1)
    }

    pub fn to(&self) -> Option<u64> {
        self.from().map(|from| from + self.items.len() as u64 - 1)
    }

    pub fn has_more_pages(&self) -> bool {
        self.window().has_next_page(self.total)
    }
}

#[derive(Serialize)]
struct PageMeta {
    current_page: u32,
    from: Option<u64>,
    last_page: u64,
    per_page: u32,
    to: Option<u64>,
    total: u64,
}

impl Serialize for LengthAwarePaginator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("LengthAwarePaginator", 2)?;
        state.serialize_field("data", &self.items)?;
        state.serialize_field(
            "meta",
            &PageMeta {
                current_page: self.current_page,
                from: self.from(),
                last_page: self.last_page(),
                per_page: self.per_page,
                to: self.to(),
                total: self.total,
            },
        )?;
        state.end()
    }
}

/// Forward-only page addressed by an opaque cursor
#[derive(Debug, Clone, PartialEq)]
pub struct CursorPaginator {
    pub items: Vec<Record>,
    pub per_page: u32,
    /// Cursor this page was fetched with
    pub cursor: Option<String>,
    /// Cursor for the following page, when there is one
    pub next_cursor: Option<String>,
}

#[derive(Serialize)]
struct CursorMeta<'a> {
    per_page: u32,
    cursor: Option<&'a str>,
    next_cursor: Option<&'a str>,
}

impl Serialize for CursorPaginator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("CursorPaginator", 2)?;
        state.serialize_field("data", &self.items)?;
        state.serialize_field(
            "meta",
            &CursorMeta {
                per_page: self.per_page,
                cursor: self.cursor.as_deref(),
                next_cursor: self.next_cursor.as_deref(),
            },
        )?;
        state.end()
    }
}

/// Result of running a query plan through its pagination strategy
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Collection(Collection),
    LengthAware(LengthAwarePaginator),
    Cursor(CursorPaginator),
}

impl QueryResult {
    pub fn items(&self) -> &[Record] {
        match self {
            Self::Collection(collection) => &collection.items,
            Self::LengthAware(paginator) => &paginator.items,
            Self::Cursor(paginator) => &paginator.items,
        }
    }

    pub fn into_items(self) -> Vec<Record> {
        match self {
            Self::Collection(collection) => collection.items,
            Self::LengthAware(paginator) => paginator.items,
            Self::Cursor(paginator) => paginator.items,
        }
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}

impl From<Collection> for QueryResult {
    fn from(collection: Collection) -> Self {
        Self::Collection(collection)
    }
}

impl From<LengthAwarePaginator> for QueryResult {
    fn from(paginator: LengthAwarePaginator) -> Self {
        Self::LengthAware(paginator)
    }
}

impl From<CursorPaginator> for QueryResult {
    fn from(paginator: CursorPaginator) -> Self {
        Self::Cursor(paginator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_meta() {
        let items = (1..=5).map(|id| json!({"id": id})).collect();
        let page = LengthAwarePaginator::new(items, 30, 5, 1);
        assert_eq!(page.last_page(), 6);
        assert_eq!(page.from(), Some(1));
        assert_eq!(page.to(), Some(5));
        assert!(page.has_more_pages());
        assert_eq!(page.window().to_sql(), " LIMIT 5 OFFSET 0");
    }

    #[test]
    fn test_last_page_has_no_more_pages() {
        let page = LengthAwarePaginator::new(vec![json!({"id": 31})], 31, 5, 7);
        assert_eq!(page.last_page(), 7);
        assert!(!page.has_more_pages());
        assert!(LengthAwarePaginator::new(Vec::new(), 31, 5, 6).has_more_pages());
    }

    #[test]
    fn test_empty_page_meta() {
        let page = LengthAwarePaginator::new(Vec::new(), 0, 10, 1);
        assert_eq!(page.last_page(), 1);
        assert_eq!(page.from(), None);
        assert_eq!(page.to(), None);
    }

    #[test]
    fn test_serialized_shape() {
        let page = LengthAwarePaginator::new(vec![json!({"id": 6})], 6, 5, 2);
        let body = serde_json::to_value(QueryResult::from(page)).unwrap();
        assert_eq!(body["data"], json!([{"id": 6}]));
        assert_eq!(body["meta"]["last_page"], 2);
        assert_eq!(body["meta"]["from"], 6);

        let cursor = CursorPaginator {
            items: vec![],
            per_page: 10,
            cursor: None,
            next_cursor: None,
        };
        let body = serde_json::to_value(QueryResult::from(cursor)).unwrap();
        assert_eq!(body["meta"]["next_cursor"], serde_json::Value::Null);
    }
}
