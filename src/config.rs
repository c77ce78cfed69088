//! Query Settings
//!
//! Process-level settings threaded through request binding and plan
//! application. Loaded from built-in defaults, an optional TOML file and
//! `QUERY_CONFIG__*` environment variables, in that order of precedence.

use crate::constants::{DEFAULT_MAX_CURSOR_LENGTH, DEFAULT_MAX_PAGE, DEFAULT_MAX_STRING_LENGTH};
use crate::error::{QueryError, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

const DEFAULT_SETTINGS_FILE: &str = "config/query";
const ENV_PREFIX: &str = "QUERY_CONFIG";

/// Settings shared by every query request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Application timezone used when parsing date filters: `UTC` or `±HH:MM`
    pub timezone: String,
    /// Fail when a scope has no registered handler instead of skipping it
    pub strict_scopes: bool,
    pub max_page: i64,
    pub max_cursor_length: i64,
    pub max_string_length: i64,
    /// Connection name reported in query dumps
    pub connection_name: String,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            strict_scopes: true,
            max_page: DEFAULT_MAX_PAGE,
            max_cursor_length: DEFAULT_MAX_CURSOR_LENGTH,
            max_string_length: DEFAULT_MAX_STRING_LENGTH,
            connection_name: "default".to_string(),
        }
    }
}

impl QuerySettings {
    /// Loads `config/query.{toml,...}` if present, then the environment
    pub fn load() -> Result<Self> {
        Self::build(config::File::with_name(DEFAULT_SETTINGS_FILE).required(false))
    }

    /// Loads an explicit settings file, then the environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::build(config::File::from(path.as_ref()).required(true))
    }

    fn build<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let defaults = Self::default();
        let settings: Self = config::Config::builder()
            .set_default("timezone", defaults.timezone)?
            .set_default("strict_scopes", defaults.strict_scopes)?
            .set_default("max_page", defaults.max_page)?
            .set_default("max_cursor_length", defaults.max_cursor_length)?
            .set_default("max_string_length", defaults.max_string_length)?
            .set_default("connection_name", defaults.connection_name)?
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        debug!(
            timezone = %settings.timezone,
            strict_scopes = settings.strict_scopes,
            connection = %settings.connection_name,
            "Query settings loaded"
        );
        Ok(settings)
    }

    /// Default settings reporting a `test` connection in dumps
    pub fn for_test() -> Self {
        Self {
            connection_name: "test".to_string(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.timezone_offset()?;
        if self.max_page < 1 {
            return Err(QueryError::InvalidSettings(format!(
                "max_page must be at least 1, got {}",
                self.max_page
            )));
        }
        if self.max_cursor_length < 1 {
            return Err(QueryError::InvalidSettings(format!(
                "max_cursor_length must be at least 1, got {}",
                self.max_cursor_length
            )));
        }
        if self.max_string_length < 1 {
            return Err(QueryError::InvalidSettings(format!(
                "max_string_length must be at least 1, got {}",
                self.max_string_length
            )));
        }
        Ok(())
    }

    /// Parses [`QuerySettings::timezone`]
    pub fn timezone_offset(&self) -> Result<FixedOffset> {
        parse_offset(&self.timezone).ok_or_else(|| {
            QueryError::InvalidSettings(format!("unsupported timezone `{}`", self.timezone))
        })
    }
}

fn parse_offset(timezone: &str) -> Option<FixedOffset> {
    let timezone = timezone.trim();
    if timezone.eq_ignore_ascii_case("utc") || timezone == "Z" {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match timezone.as_bytes().first()? {
        b'+' => (1, &timezone[1..]),
        b'-' => (-1, &timezone[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    if hours.len() != 2 || minutes.len() != 2 {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
