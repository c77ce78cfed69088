//! # Query Vocabulary
//!
//! Closed vocabularies shared by the configuration, binding and application
//! layers: filter types and modes, sort orders and pagination modes.
//!
//! Each [`FilterType`] owns a fixed value validation rule set, the subset of
//! [`FilterMode`]s it accepts and the mode used when a request omits one.

use crate::validation::{DateFormat, Rule};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum accepted length of a string filter value
pub const DEFAULT_MAX_STRING_LENGTH: i64 = 256;

/// Highest page number a request may ask for
pub const DEFAULT_MAX_PAGE: i64 = 999_999;

/// Maximum accepted length of a cursor token
pub const DEFAULT_MAX_CURSOR_LENGTH: i64 = 1024;

/// Value type of a declared filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    #[default]
    String,
    Integer,
    Float,
    Date,
    DateTime,
    Boolean,
    Array,
}

impl FilterType {
    pub const ALL: [FilterType; 7] = [
        Self::String,
        Self::Integer,
        Self::Float,
        Self::Date,
        Self::DateTime,
        Self::Boolean,
        Self::Array,
    ];

    /// Validation rules applied to `{filter}.value`
    pub fn value_rules(&self) -> Vec<Rule> {
        self.value_rules_bounded(DEFAULT_MAX_STRING_LENGTH)
    }

    /// Same as [`FilterType::value_rules`] with a custom string length bound
    pub fn value_rules_bounded(&self, max_string_length: i64) -> Vec<Rule> {
        match self {
            Self::String => vec![Rule::String, Rule::Max(max_string_length)],
            Self::Integer => vec![Rule::Integer, Rule::Min(i64::MIN), Rule::Max(i64::MAX)],
            Self::Float => vec![Rule::Numeric, Rule::Min(i64::MIN), Rule::Max(i64::MAX)],
            Self::Date => vec![Rule::DateFormats(vec![DateFormat::Date])],
            Self::DateTime => vec![Rule::DateFormats(DateFormat::ISO.to_vec())],
            Self::Boolean => vec![Rule::Boolean],
            Self::Array => vec![Rule::Array],
        }
    }

    /// Modes a request may select for this type
    pub fn modes(&self) -> &'static [FilterMode] {
        match self {
            Self::String => &[FilterMode::Equals, FilterMode::Contains, FilterMode::In],
            Self::Integer | Self::Float | Self::Date | Self::DateTime => {
                &FilterMode::NUMERIC_COMPARISON
            }
            Self::Boolean => &[FilterMode::Equals],
            Self::Array => &[FilterMode::In],
        }
    }

    pub fn default_mode(&self) -> FilterMode {
        match self {
            Self::String => FilterMode::Contains,
            Self::Array => FilterMode::In,
            _ => FilterMode::Equals,
        }
    }

    pub fn allows(&self, mode: FilterMode) -> bool {
        self.modes().contains(&mode)
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::Date => write!(f, "date"),
            Self::DateTime => write!(f, "date_time"),
            Self::Boolean => write!(f, "boolean"),
            Self::Array => write!(f, "array"),
        }
    }
}

impl std::str::FromStr for FilterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "float" => Ok(Self::Float),
            "date" => Ok(Self::Date),
            "date_time" => Ok(Self::DateTime),
            "boolean" => Ok(Self::Boolean),
            "array" => Ok(Self::Array),
            _ => Err(format!("Invalid filter type: {s}")),
        }
    }
}

/// Comparison applied by a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterMode {
    #[serde(rename = "equals")]
    Equals,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "gt")]
    GreaterThan,
    #[serde(rename = "gte")]
    GreaterThanOrEqual,
    #[serde(rename = "lt")]
    LessThan,
    #[serde(rename = "lte")]
    LessThanOrEqual,
    #[serde(rename = "in")]
    In,
}

impl FilterMode {
    pub const ALL: [FilterMode; 7] = [
        Self::Equals,
        Self::Contains,
        Self::GreaterThan,
        Self::GreaterThanOrEqual,
        Self::LessThan,
        Self::LessThanOrEqual,
        Self::In,
    ];

    /// Modes shared by the numeric and temporal filter types
    pub const NUMERIC_COMPARISON: [FilterMode; 6] = [
        Self::Equals,
        Self::GreaterThan,
        Self::GreaterThanOrEqual,
        Self::LessThan,
        Self::LessThanOrEqual,
        Self::In,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::Contains => "contains",
            Self::GreaterThan => "gt",
            Self::GreaterThanOrEqual => "gte",
            Self::LessThan => "lt",
            Self::LessThanOrEqual => "lte",
            Self::In => "in",
        }
    }

    pub fn is_numeric_comparison(&self) -> bool {
        Self::NUMERIC_COMPARISON.contains(self)
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FilterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| format!("Invalid filter mode: {s}"))
    }
}

/// Direction of an ordering instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "asc")]
    Ascending,
    #[serde(rename = "desc")]
    Descending,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ascending => "asc",
            Self::Descending => "desc",
        }
    }

    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Ascending),
            "desc" => Ok(Self::Descending),
            _ => Err(format!("Invalid sort order: {s}")),
        }
    }
}

/// How results are split into pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationMode {
    /// Page number and limit, with a total count
    Offset,
    /// Opaque forward-only cursor
    Cursor,
    /// Every matching row
    None,
}

impl PaginationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offset => "offset",
            Self::Cursor => "cursor",
            Self::None => "none",
        }
    }
}

impl fmt::Display for PaginationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaginationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offset" => Ok(Self::Offset),
            "cursor" => Ok(Self::Cursor),
            "none" => Ok(Self::None),
            _ => Err(format!("Invalid pagination mode: {s}")),
        }
    }
}
