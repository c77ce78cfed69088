//! # Request Binding
//!
//! [`QueryRequest`] turns decoded request input into a [`Query`].
//!
//! ## Overview
//!
//! Binding runs in two steps. [`QueryRequest::rules`] derives a [`RuleSet`]
//! from the locked configuration and [`QueryRequest::validate`] checks the
//! input against it, so unknown parameters, illegal modes and out-of-range
//! pagination never reach the plan. [`QueryRequest::to_query`] then reads
//! filters, scopes, pagination, relationships, sorting and projection in that
//! order, coercing raw values to each filter's type.
//!
//! Date and date-time values are interpreted in the timezone configured on
//! [`QuerySettings`]: offsets carried by the input are converted, naive
//! values are taken as local to that timezone.

use super::input::RequestInput;
use crate::config::QuerySettings;
use crate::constants::{FilterMode, FilterType, PaginationMode, SortOrder};
use crate::error::{QueryError, Result};
use crate::logging::{log_error, log_query_operation};
use crate::query::{
    Filter, PaginationStrategy, Query, QueryConfig, QueryConfigCache, QueryDefinition, QueryFilter,
    Scope,
};
use crate::query_builder::{EntityLookup, ParameterType};
use crate::validation::Rule;
use crate::validation::RuleSet;
use crate::value::Value;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use serde_json::Value as Json;
use std::sync::Arc;
use tracing::debug;

/// One request against a query configuration
#[derive(Clone)]
pub struct QueryRequest {
    config: Arc<QueryConfig>,
    input: RequestInput,
    settings: QuerySettings,
    entities: Option<Arc<dyn EntityLookup>>,
}

impl QueryRequest {
    pub fn new(config: Arc<QueryConfig>, input: RequestInput) -> Self {
        Self {
            config,
            input,
            settings: QuerySettings::default(),
            entities: None,
        }
    }

    /// Bind against the cached configuration of `D`
    pub fn for_definition<D: QueryDefinition>(definition: &D, input: RequestInput) -> Result<Self> {
        let config = QueryConfigCache::global().get_or_build(definition)?;
        Ok(Self::new(config, input))
    }

    pub fn with_settings(mut self, settings: QuerySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_entities(mut self, entities: Arc<dyn EntityLookup>) -> Self {
        self.entities = Some(entities);
        self
    }

    pub fn config(&self) -> &Arc<QueryConfig> {
        &self.config
    }

    pub fn input(&self) -> &RequestInput {
        &self.input
    }

    /// Validation rules for every parameter the configuration accepts
    pub fn rules(&self) -> RuleSet {
        let mut rules = RuleSet::new();

        for entry in self.config.entries() {
            match entry {
                QueryFilter::Filter(filter) => {
                    for (key, filter_rules) in filter.validation_bounded(self.settings.max_string_length) {
                        rules.insert(format!("{}.{key}", filter.name()), filter_rules);
                    }
                }
                QueryFilter::Scope(scope) => {
                    for (key, scope_rules) in scope.validation() {
                        let path = if key.is_empty() {
                            scope.name().to_string()
                        } else {
                            format!("{}.{key}", scope.name())
                        };
                        rules.insert(path, scope_rules);
                    }
                }
            }
        }

        let relationships = self.config.relationships();
        if !relationships.is_empty() {
            let mut names: Vec<&str> = Vec::new();
            for relationship in relationships {
                for name in [relationship.name(), relationship.relation()] {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
            rules.insert("with", vec![Rule::Sometimes, Rule::Nullable, Rule::Array]);
            rules.insert("with.*", vec![Rule::Nullable, Rule::String, Rule::one_of(names)]);
        }

        let sorts = self.config.sort_list();
        if !sorts.is_empty() {
            rules.insert(
                "sortBy",
                vec![Rule::Sometimes, Rule::Nullable, Rule::one_of(sorts.iter().map(|sort| sort.name()))],
            );
            rules.insert(
                "sortOrder",
                vec![
                    Rule::Sometimes,
                    Rule::Nullable,
                    Rule::one_of([SortOrder::Ascending.as_str(), SortOrder::Descending.as_str()]),
                ],
            );
        }

        let fields = self.config.fields_only();
        if !fields.is_empty() {
            rules.insert("only", vec![Rule::Sometimes, Rule::Nullable, Rule::Array]);
            rules.insert("only.*", vec![Rule::Nullable, Rule::String, Rule::one_of(fields)]);
        }

        let pagination = self.config.pagination_config();
        rules.insert(
            "pagination",
            vec![
                Rule::Sometimes,
                Rule::Nullable,
                Rule::String,
                Rule::one_of(pagination.allowed().iter().map(PaginationMode::as_str)),
            ],
        );
        rules.insert(
            "limit",
            vec![
                Rule::Sometimes,
                Rule::Nullable,
                Rule::Integer,
                Rule::Min(1),
                Rule::Max(i64::from(pagination.max_limit())),
            ],
        );
        rules.insert(
            "page",
            vec![
                Rule::Sometimes,
                Rule::Nullable,
                Rule::Integer,
                Rule::Min(1),
                Rule::Max(self.settings.max_page),
            ],
        );
        rules.insert(
            "cursor",
            vec![
                Rule::Sometimes,
                Rule::Nullable,
                Rule::String,
                Rule::Max(self.settings.max_cursor_length),
            ],
        );

        rules
    }

    pub fn validate(&self) -> Result<()> {
        self.rules().validate(self.input.as_json()).map_err(|errors| {
            log_error(
                "binder",
                "validate",
                &errors.message,
                Some(self.config.entity()),
            );
            QueryError::Validation(errors)
        })
    }

    /// Validate the input and build the plan it describes
    pub fn to_query(&self) -> Result<Query> {
        self.validate()?;

        let mut query = Query::from_config(self.config.clone());
        if let Some(entities) = &self.entities {
            query = query.with_entities(entities.clone());
        }
        let offset = self.settings.timezone_offset()?;

        for entry in self.config.entries() {
            match entry {
                QueryFilter::Filter(filter) => self.bind_filter(&mut query, filter, offset)?,
                QueryFilter::Scope(scope) => self.bind_scope(&mut query, scope)?,
            }
        }
        self.bind_pagination(&mut query)?;
        self.bind_relationships(&mut query)?;
        self.bind_sort(&mut query)?;
        for field in self.input.strings("only") {
            query.fields_only(&field);
        }

        let details = format!(
            "filters={} scopes={} relationships={} pagination={}",
            query.filters().len(),
            query.scopes().len(),
            query.relationships().len(),
            query.pagination().mode()
        );
        log_query_operation("bind", self.config.entity(), "success", Some(&details));
        Ok(query)
    }

    fn bind_filter(&self, query: &mut Query, filter: &Filter, offset: FixedOffset) -> Result<()> {
        let name = filter.name();
        let path = format!("{name}.value");
        let value = match self.input.input(&path).filter(|raw| !raw.is_null()) {
            Some(raw) => coerce_filter_value(filter.filter_type(), raw, offset, &path)?,
            None => match filter.default_value() {
                Some(default) => default.clone(),
                None => return Ok(()),
            },
        };

        let filter_type = filter.filter_type();
        let mode = self
            .input
            .string(&format!("{name}.mode"))
            .and_then(|mode| mode.parse::<FilterMode>().ok())
            .filter(|mode| filter_type.allows(*mode))
            .unwrap_or_else(|| filter_type.default_mode());
        let not = self.input.boolean(&format!("{name}.not")).unwrap_or(false);

        debug!(filter = name, mode = %mode, not, "Binding filter");
        query.filter(name, mode, value, not)?;
        Ok(())
    }

    fn bind_scope(&self, query: &mut Query, scope: &Scope) -> Result<()> {
        if !self.input.has(scope.name()) {
            return Ok(());
        }
        let mut handle = query.scope(scope.name())?;
        for argument in scope.arguments() {
            let path = format!("{}.{}", scope.name(), argument.name());
            let Some(raw) = self.input.input(&path).filter(|raw| !raw.is_null()) else {
                continue;
            };
            let value = match argument.target_parameter().map(|parameter| &parameter.ty) {
                Some(ty) => coerce_argument(ty, raw, &path)?,
                None => Value::from_json(raw),
            };
            handle.set(argument.name(), value)?;
        }
        debug!(scope = scope.name(), method = scope.scope_name(), "Binding scope");
        Ok(())
    }

    fn bind_pagination(&self, query: &mut Query) -> Result<()> {
        let config = self.config.pagination_config();
        let mode = self
            .input
            .string("pagination")
            .and_then(|mode| mode.parse::<PaginationMode>().ok())
            .unwrap_or_else(|| config.default_mode());
        let limit = match self.input.integer("limit")? {
            Some(limit) => u32::try_from(limit)
                .map_err(|error| QueryError::parse("limit", "integer", error.to_string()))?
                .min(config.max_limit()),
            None => config.default_limit(),
        };
        let page = match self.input.integer("page")? {
            Some(page) => u32::try_from(page)
                .map_err(|error| QueryError::parse("page", "integer", error.to_string()))?,
            None => 1,
        };
        let cursor = self.input.string("cursor");
        query.paginate(PaginationStrategy::for_mode(mode, page.max(1), limit.max(1), cursor));
        Ok(())
    }

    fn bind_relationships(&self, query: &mut Query) -> Result<()> {
        let requested = self.input.strings("with");
        if requested.is_empty() {
            return Ok(());
        }
        for relationship in self.config.relationships() {
            let wanted = requested
                .iter()
                .any(|name| name == relationship.name() || name == relationship.relation());
            if wanted {
                query.load(relationship.name())?;
            }
        }
        Ok(())
    }

    fn bind_sort(&self, query: &mut Query) -> Result<()> {
        let Some(sort_by) = self.input.string("sortBy").filter(|sort| !sort.is_empty()) else {
            return Ok(());
        };
        let order = self
            .input
            .string("sortOrder")
            .and_then(|order| order.parse::<SortOrder>().ok())
            .unwrap_or_default();
        query.sort_by(&sort_by, order)?;
        Ok(())
    }
}

fn text_of(raw: &Json) -> Option<String> {
    match raw {
        Json::String(text) => Some(text.trim().to_string()),
        Json::Number(number) => Some(number.to_string()),
        Json::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn truthy(raw: &Json) -> bool {
    match raw {
        Json::Bool(flag) => *flag,
        Json::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Json::String(text) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "on" | "yes"
        ),
        _ => false,
    }
}

fn parse_integer(raw: &Json, path: &str) -> Result<Value> {
    let text = text_of(raw).ok_or_else(|| QueryError::parse(path, "integer", raw.to_string()))?;
    text.parse::<i64>()
        .map(Value::Integer)
        .map_err(|error| QueryError::parse(path, "integer", error.to_string()))
}

fn parse_float(raw: &Json, path: &str) -> Result<Value> {
    let text = text_of(raw).ok_or_else(|| QueryError::parse(path, "float", raw.to_string()))?;
    text.parse::<f64>()
        .map(Value::Float)
        .map_err(|error| QueryError::parse(path, "float", error.to_string()))
}

/// Parse a date or date-time into `offset`
pub fn parse_datetime(text: &str, offset: FixedOffset, path: &str) -> Result<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&offset));
    }
    let naive = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .or_else(|| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").ok())
        .ok_or_else(|| QueryError::parse(path, "date", format!("unrecognised date `{text}`")))?;
    offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| QueryError::parse(path, "date", format!("ambiguous local time `{text}`")))
}

fn coerce_filter_value(filter_type: FilterType, raw: &Json, offset: FixedOffset, path: &str) -> Result<Value> {
    match filter_type {
        FilterType::String => Ok(text_of(raw).map(Value::String).unwrap_or_else(|| Value::from_json(raw))),
        FilterType::Integer => parse_integer(raw, path),
        FilterType::Float => parse_float(raw, path),
        FilterType::Date | FilterType::DateTime => {
            let text = text_of(raw).ok_or_else(|| QueryError::parse(path, "date", raw.to_string()))?;
            parse_datetime(&text, offset, path).map(Value::DateTime)
        }
        FilterType::Boolean => Ok(Value::Bool(truthy(raw))),
        FilterType::Array => Ok(match raw {
            Json::Array(items) => Value::Array(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::Array(map.values().map(Value::from_json).collect()),
            scalar => Value::Array(vec![Value::from_json(scalar)]),
        }),
    }
}

/// Builtin parameter types are coerced; anything else passes through raw
fn coerce_argument(ty: &ParameterType, raw: &Json, path: &str) -> Result<Value> {
    match ty {
        ParameterType::Integer => parse_integer(raw, path),
        ParameterType::Float => parse_float(raw, path),
        ParameterType::Boolean => Ok(Value::Bool(truthy(raw))),
        ParameterType::String => Ok(text_of(raw).map(Value::String).unwrap_or_else(|| Value::from_json(raw))),
        ParameterType::Entity(_) | ParameterType::Other(_) => Ok(Value::from_json(raw)),
    }
}
