//! # Request Validation
//!
//! Rule sets derived from a query configuration, and the evaluator that checks
//! decoded request input against them before any query plan is built.
//!
//! Rules render as the conventional string tokens (`nullable`, `in:a,b`,
//! `max:256`, ...) so a rule set can also be handed to an external validator
//! as a plain data artifact.

use chrono::{DateTime, NaiveDate};
use serde::{Serialize, Serializer};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Accepted textual date layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateFormat {
    /// `Y-m-d`
    Date,
    /// `Y-m-d\TH:i:sP`, shared by ATOM and RFC 3339
    Atom,
    /// `Y-m-d\TH:i:s.vP`
    Rfc3339Extended,
}

impl DateFormat {
    pub const ISO: [DateFormat; 2] = [Self::Atom, Self::Rfc3339Extended];

    pub fn pattern(&self) -> &'static str {
        match self {
            Self::Date => "Y-m-d",
            Self::Atom => "Y-m-d\\TH:i:sP",
            Self::Rfc3339Extended => "Y-m-d\\TH:i:s.vP",
        }
    }

    /// Strict match: parsing then formatting must reproduce the input
    pub fn matches(&self, input: &str) -> bool {
        match self {
            Self::Date => NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .map(|date| date.format("%Y-%m-%d").to_string() == input)
                .unwrap_or(false),
            Self::Atom => DateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%:z")
                .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%:z").to_string() == input)
                .unwrap_or(false),
            Self::Rfc3339Extended => DateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.3f%:z")
                .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string() == input)
                .unwrap_or(false),
        }
    }
}

/// A single validation rule
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// Skip every other rule when the field is absent
    Sometimes,
    /// Accept an explicit null
    Nullable,
    Required,
    /// Required when the named field is filled
    RequiredWith(String),
    String,
    Integer,
    Numeric,
    Boolean,
    Array,
    Min(i64),
    Max(i64),
    In(Vec<String>),
    DateFormats(Vec<DateFormat>),
}

impl Rule {
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: fmt::Display,
    {
        Self::In(values.into_iter().map(|v| v.to_string()).collect())
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sometimes => write!(f, "sometimes"),
            Self::Nullable => write!(f, "nullable"),
            Self::Required => write!(f, "required"),
            Self::RequiredWith(other) => write!(f, "required_with:{other}"),
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Numeric => write!(f, "numeric"),
            Self::Boolean => write!(f, "boolean"),
            Self::Array => write!(f, "array"),
            Self::Min(min) => write!(f, "min:{min}"),
            Self::Max(max) => write!(f, "max:{max}"),
            Self::In(values) => write!(f, "in:{}", values.join(",")),
            Self::DateFormats(formats) => {
                let patterns: Vec<&str> = formats.iter().map(DateFormat::pattern).collect();
                write!(f, "date_formats:{}", patterns.join("|"))
            }
        }
    }
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Field-keyed validation failures, shaped like a 422 response body
#[derive(Error, Debug, Clone, Default, PartialEq, Serialize)]
#[error("{message}")]
pub struct ValidationErrors {
    pub message: String,
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    pub fn messages_for(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn has(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    /// Returns `Err(self)` with a summary message when any failure was recorded
    pub fn into_result(mut self) -> Result<(), ValidationErrors> {
        let Some(first) = self.errors.values().flatten().next().cloned() else {
            return Ok(());
        };
        let remaining = self.len() - 1;
        self.message = match remaining {
            0 => first,
            1 => format!("{first} (and 1 more error)"),
            n => format!("{first} (and {n} more errors)"),
        };
        Err(self)
    }
}

/// Ordered mapping from dotted field path to its rules
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: BTreeMap<String, Vec<Rule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, rules: Vec<Rule>) {
        self.rules.insert(path.into(), rules);
    }

    pub fn get(&self, path: &str) -> Option<&[Rule]> {
        self.rules.get(path).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.rules.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Rule>)> {
        self.rules.iter()
    }

    /// Rule tokens as strings, keyed by path
    pub fn to_tokens(&self) -> BTreeMap<String, Vec<String>> {
        self.rules
            .iter()
            .map(|(path, rules)| (path.clone(), rules.iter().map(Rule::to_string).collect()))
            .collect()
    }

    fn covers_root(&self, key: &str) -> bool {
        self.rules
            .keys()
            .any(|path| path.split('.').next() == Some(key))
    }

    /// Checks `input` (a JSON object) against every rule.
    ///
    /// Top-level keys that no rule path starts with are rejected as unknown
    /// parameters.
    pub fn validate(&self, input: &Json) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        if let Some(map) = input.as_object() {
            for key in map.keys() {
                if !self.covers_root(key) {
                    errors.add(key.clone(), format!("The {key} parameter is not recognised."));
                }
            }
        }

        for (path, rules) in &self.rules {
            let segments: Vec<&str> = path.split('.').collect();
            let mut targets = Vec::new();
            expand(&segments, Some(input), String::new(), &mut targets);
            for (attribute, value) in targets {
                check_field(&attribute, value, rules, input, &mut errors);
            }
        }

        errors.into_result()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = (&'a String, &'a Vec<Rule>);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Vec<Rule>>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

/// Resolves a dotted path against JSON, numeric segments indexing arrays
pub fn lookup<'a>(input: &'a Json, path: &str) -> Option<&'a Json> {
    path.split('.').try_fold(input, |current, segment| match current {
        Json::Object(map) => map.get(segment),
        Json::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn expand<'a>(
    segments: &[&str],
    current: Option<&'a Json>,
    prefix: String,
    out: &mut Vec<(String, Option<&'a Json>)>,
) {
    let Some((head, rest)) = segments.split_first() else {
        out.push((prefix, current));
        return;
    };
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };

    if *head == "*" {
        match current {
            Some(Json::Array(items)) => {
                for (index, item) in items.iter().enumerate() {
                    expand(rest, Some(item), join(&index.to_string()), out);
                }
            }
            Some(Json::Object(map)) => {
                for (key, item) in map {
                    expand(rest, Some(item), join(key), out);
                }
            }
            _ => {}
        }
        return;
    }

    let next = match current {
        Some(Json::Object(map)) => map.get(*head),
        Some(Json::Array(items)) => head.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    };
    expand(rest, next, join(head), out);
}

fn is_filled(value: Option<&Json>) -> bool {
    match value {
        None | Some(Json::Null) => false,
        Some(Json::String(s)) => !s.trim().is_empty(),
        Some(Json::Array(items)) => !items.is_empty(),
        Some(Json::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

fn as_number(value: &Json) -> Option<f64> {
    match value {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn is_integer(value: &Json) -> bool {
    match value {
        Json::Number(n) => n.is_i64() || n.is_u64(),
        Json::String(s) => s.trim().parse::<i64>().is_ok(),
        _ => false,
    }
}

fn is_boolean(value: &Json) -> bool {
    match value {
        Json::Bool(_) => true,
        Json::Number(n) => n.as_i64().is_some_and(|i| i == 0 || i == 1),
        Json::String(s) => matches!(s.as_str(), "0" | "1" | "true" | "false"),
        _ => false,
    }
}

fn scalar_text(value: &Json) -> Option<String> {
    match value {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn check_field(
    attribute: &str,
    value: Option<&Json>,
    rules: &[Rule],
    input: &Json,
    errors: &mut ValidationErrors,
) {
    if value.is_none() && rules.contains(&Rule::Sometimes) {
        return;
    }

    let required = rules.iter().any(|rule| match rule {
        Rule::Required => true,
        Rule::RequiredWith(other) => lookup(input, other).is_some(),
        _ => false,
    });
    if required && !is_filled(value) {
        errors.add(attribute, format!("The {attribute} field is required."));
        return;
    }

    let Some(value) = value else {
        return;
    };
    if value.is_null() && rules.contains(&Rule::Nullable) {
        return;
    }

    let numeric = rules.iter().any(|r| matches!(r, Rule::Integer | Rule::Numeric));
    let size = |value: &Json| -> Option<f64> {
        match value {
            Json::Array(items) => Some(items.len() as f64),
            _ if numeric => as_number(value),
            Json::String(s) => Some(s.chars().count() as f64),
            _ => None,
        }
    };

    for rule in rules {
        let message = match rule {
            Rule::String if !value.is_string() => Some(format!("The {attribute} field must be a string.")),
            Rule::Integer if !is_integer(value) => Some(format!("The {attribute} field must be an integer.")),
            Rule::Numeric if as_number(value).is_none() => {
                Some(format!("The {attribute} field must be a number."))
            }
            Rule::Boolean if !is_boolean(value) => {
                Some(format!("The {attribute} field must be true or false."))
            }
            Rule::Array if !value.is_array() && !value.is_object() => {
                Some(format!("The {attribute} field must be an array."))
            }
            Rule::Min(min) => match size(value) {
                Some(actual) if actual < *min as f64 => {
                    Some(format!("The {attribute} field must be at least {min}."))
                }
                _ => None,
            },
            Rule::Max(max) => match size(value) {
                Some(actual) if actual > *max as f64 => {
                    Some(format!("The {attribute} field must not be greater than {max}."))
                }
                _ => None,
            },
            Rule::In(allowed) => match scalar_text(value) {
                Some(text) if allowed.contains(&text) => None,
                _ => Some(format!("The selected {attribute} is invalid.")),
            },
            Rule::DateFormats(formats) => match scalar_text(value) {
                Some(text) if formats.iter().any(|format| format.matches(&text)) => None,
                _ => Some(format!("The {attribute} field must be a valid date.")),
            },
            _ => None,
        };
        if let Some(message) = message {
            errors.add(attribute, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules() -> RuleSet {
        let mut rules = RuleSet::new();
        rules.insert("name.value", vec![Rule::Nullable, Rule::String, Rule::Max(5)]);
        rules.insert("name.mode", vec![Rule::Nullable, Rule::one_of(["equals", "contains"])]);
        rules.insert("limit", vec![Rule::Sometimes, Rule::Integer, Rule::Min(1), Rule::Max(100)]);
        rules.insert("with", vec![Rule::Array]);
        rules.insert("with.*", vec![Rule::String, Rule::Nullable, Rule::one_of(["bars"])]);
        rules
    }

    #[test]
    fn test_rule_tokens() {
        assert_eq!(Rule::RequiredWith("whereState".into()).to_string(), "required_with:whereState");
        assert_eq!(Rule::one_of(["asc", "desc"]).to_string(), "in:asc,desc");
        assert_eq!(
            Rule::DateFormats(vec![DateFormat::Date]).to_string(),
            "date_formats:Y-m-d"
        );
    }

    #[test]
    fn test_valid_input_passes() {
        let input = json!({"name": {"value": "Ali", "mode": "contains"}, "limit": "10", "with": ["bars"]});
        assert!(rules().validate(&input).is_ok());
    }

    #[test]
    fn test_unknown_top_level_key_is_rejected() {
        let errors = rules().validate(&json!({"colour": {"value": "red"}})).unwrap_err();
        assert!(errors.has("colour"));
    }

    #[test]
    fn test_wildcard_paths_are_expanded() {
        let errors = rules().validate(&json!({"with": ["bars", "bazs"]})).unwrap_err();
        assert!(errors.has("with.1"));
        assert!(!errors.has("with.0"));
    }

    #[test]
    fn test_size_rules_follow_type() {
        let errors = rules()
            .validate(&json!({"limit": "500", "name": {"value": "Alexandra"}}))
            .unwrap_err();
        assert_eq!(errors.messages_for("limit"), ["The limit field must not be greater than 100."]);
        assert!(errors.has("name.value"));
        assert_eq!(errors.message, "The limit field must not be greater than 100. (and 1 more error)");
    }

    #[test]
    fn test_required_with() {
        let mut rules = RuleSet::new();
        rules.insert("whereState", vec![Rule::Nullable, Rule::Array]);
        rules.insert("whereState.state", vec![Rule::RequiredWith("whereState".into()), Rule::String]);

        assert!(rules.validate(&json!({})).is_ok());
        let errors = rules.validate(&json!({"whereState": {}})).unwrap_err();
        assert!(errors.has("whereState.state"));
        assert!(rules.validate(&json!({"whereState": {"state": "active"}})).is_ok());
    }

    #[test]
    fn test_date_formats_are_strict() {
        assert!(DateFormat::Date.matches("2024-02-29"));
        assert!(!DateFormat::Date.matches("2024-2-29"));
        assert!(DateFormat::Atom.matches("2024-01-31T10:00:00+02:00"));
        assert!(DateFormat::Rfc3339Extended.matches("2024-01-31T10:00:00.120+00:00"));
        assert!(!DateFormat::Atom.matches("2024-01-31 10:00:00"));
    }

    #[test]
    fn test_lookup_indexes_arrays() {
        let input = json!({"with": ["bars", "bazs"]});
        assert_eq!(lookup(&input, "with.1"), Some(&json!("bazs")));
        assert_eq!(lookup(&input, "with.2"), None);
    }
}
