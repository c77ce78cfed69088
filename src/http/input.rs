//! Decoded request input.
//!
//! Query strings use bracket notation: `name[value]=Ali`, `with[]=bars`,
//! `whereStates[states][]=active`. Pairs are folded into a nested JSON tree
//! so validation and binding work on the same structure as a JSON body.
//! Empty values decode to `null`.

use crate::error::{QueryError, Result};
use crate::validation::lookup;
use serde_json::{Map, Value as Json};

/// Request parameters as a JSON object
#[derive(Debug, Clone, PartialEq)]
pub struct RequestInput {
    root: Json,
}

impl Default for RequestInput {
    fn default() -> Self {
        Self {
            root: Json::Object(Map::new()),
        }
    }
}

impl RequestInput {
    pub fn from_query_str(query: &str) -> Result<Self> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query.trim_start_matches('?'))
            .map_err(|error| QueryError::parse("query", "query string", error.to_string()))?;

        let mut root = Json::Object(Map::new());
        for (key, value) in pairs {
            let segments = key_segments(&key);
            let value = if value.is_empty() {
                Json::Null
            } else {
                Json::String(value)
            };
            insert(&mut root, &segments, value);
        }
        Ok(Self { root })
    }

    /// Wrap an already decoded body; anything but an object becomes empty input
    pub fn from_json(root: Json) -> Self {
        match root {
            Json::Object(_) => Self { root },
            _ => Self::default(),
        }
    }

    pub fn as_json(&self) -> &Json {
        &self.root
    }

    /// Value at a dotted path
    pub fn input(&self, path: &str) -> Option<&Json> {
        lookup(&self.root, path)
    }

    /// Whether the path is present, even when null
    pub fn has(&self, path: &str) -> bool {
        self.input(path).is_some()
    }

    /// Non-null scalar at `path` as text
    pub fn string(&self, path: &str) -> Option<String> {
        match self.input(path)? {
            Json::String(text) => Some(text.clone()),
            Json::Number(number) => Some(number.to_string()),
            Json::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    pub fn integer(&self, path: &str) -> Result<Option<i64>> {
        match self.input(path) {
            None | Some(Json::Null) => Ok(None),
            Some(Json::Number(number)) => number
                .as_i64()
                .map(Some)
                .ok_or_else(|| QueryError::parse(path, "integer", number.to_string())),
            Some(Json::String(text)) => text
                .trim()
                .parse()
                .map(Some)
                .map_err(|error: std::num::ParseIntError| QueryError::parse(path, "integer", error.to_string())),
            Some(other) => Err(QueryError::parse(path, "integer", other.to_string())),
        }
    }

    /// `true`, `1`, `on` and `yes` are true; anything else present is false
    pub fn boolean(&self, path: &str) -> Option<bool> {
        match self.input(path)? {
            Json::Null => None,
            Json::Bool(flag) => Some(*flag),
            Json::Number(number) => Some(number.as_f64().is_some_and(|n| n != 0.0)),
            Json::String(text) => Some(matches!(
                text.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "on" | "yes"
            )),
            _ => Some(true),
        }
    }

    /// Non-null strings of a list; a scalar reads as a one-element list
    pub fn strings(&self, path: &str) -> Vec<String> {
        match self.input(path) {
            Some(Json::Array(items)) => items.iter().filter_map(scalar).collect(),
            Some(Json::Object(map)) => map.values().filter_map(scalar).collect(),
            Some(other) => scalar(other).into_iter().collect(),
            None => Vec::new(),
        }
    }
}

fn scalar(value: &Json) -> Option<String> {
    match value {
        Json::String(text) => Some(text.clone()),
        Json::Number(number) => Some(number.to_string()),
        Json::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// `a[b][]` → `["a", "b", ""]`
fn key_segments(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };
    let mut segments = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        match stripped.find(']') {
            Some(close) => {
                segments.push(stripped[..close].to_string());
                rest = &stripped[close + 1..];
            }
            None => break,
        }
    }
    segments
}

fn insert(target: &mut Json, segments: &[String], value: Json) {
    let Some((head, rest)) = segments.split_first() else {
        *target = value;
        return;
    };

    if head.is_empty() {
        if !target.is_array() {
            *target = Json::Array(Vec::new());
        }
        if let Json::Array(items) = target {
            items.push(Json::Null);
            if let Some(last) = items.last_mut() {
                insert(last, rest, value);
            }
        }
        return;
    }

    if let (Ok(index), true) = (head.parse::<usize>(), target.is_array() || target.is_null()) {
        if !target.is_array() {
            *target = Json::Array(Vec::new());
        }
        if let Json::Array(items) = target {
            if items.len() <= index {
                items.resize(index + 1, Json::Null);
            }
            insert(&mut items[index], rest, value);
        }
        return;
    }

    if !target.is_object() {
        *target = Json::Object(Map::new());
    }
    if let Json::Object(map) = target {
        let entry = map.entry(head.clone()).or_insert(Json::Null);
        insert(entry, rest, value);
    }
}
