//! # Error Types
//!
//! [`QueryError`] is returned by every fallible operation in the crate.
//! Lock-time declaration problems are grouped in [`ConfigurationError`] so
//! callers can tell a broken query definition apart from a bad request.

use crate::constants::{FilterMode, FilterType};
use crate::validation::ValidationErrors;
use thiserror::Error;

/// Problems detected while locking a query configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Unknown parameter `{argument}` for scope filter `{scope}` on model `{entity}`.")]
    ParameterNotFound {
        entity: String,
        scope: String,
        argument: String,
    },

    #[error(
        "Type of parameter `{argument}` of scope filter `{scope}` on model `{entity}` is either too intricate or missing. You may need to use a transformer or custom validation."
    )]
    InvalidArgumentType {
        entity: String,
        scope: String,
        argument: String,
    },

    #[error("Duplicate {kind} `{name}` declared on model `{entity}`.")]
    DuplicateName {
        entity: String,
        kind: &'static str,
        name: String,
    },

    #[error("Scope filter `{scope}` on model `{entity}` is bound to unknown scope method `{method}`.")]
    UnknownScopeMethod {
        entity: String,
        scope: String,
        method: String,
    },

    #[error("Relationship `{relationship}` on model `{entity}` is invalid: {reason}")]
    InvalidRelationship {
        entity: String,
        relationship: String,
        reason: String,
    },
}

impl ConfigurationError {
    pub fn parameter_not_found(
        entity: impl Into<String>,
        scope: impl Into<String>,
        argument: impl Into<String>,
    ) -> Self {
        Self::ParameterNotFound {
            entity: entity.into(),
            scope: scope.into(),
            argument: argument.into(),
        }
    }

    pub fn invalid_argument_type(
        entity: impl Into<String>,
        scope: impl Into<String>,
        argument: impl Into<String>,
    ) -> Self {
        Self::InvalidArgumentType {
            entity: entity.into(),
            scope: scope.into(),
            argument: argument.into(),
        }
    }

    pub fn invalid_relationship(
        entity: impl Into<String>,
        relationship: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidRelationship {
            entity: entity.into(),
            relationship: relationship.into(),
            reason: reason.into(),
        }
    }
}

/// Crate-wide error
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Cannot update configuration after query has been built.")]
    ConfigLocked,

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("No {kind} was registered with name `{name}`.")]
    NotFound { kind: &'static str, name: String },

    #[error("Unknown argument `{argument}` on scope `{scope}`.")]
    ArgumentNotFound { scope: String, argument: String },

    #[error("Unable to parse `{field}` as {expected}: {reason}")]
    Parse {
        field: String,
        expected: &'static str,
        reason: String,
    },

    #[error("Filter mode `{mode}` is not implemented for {filter_type} filter `{filter}`.")]
    NotImplemented {
        filter: String,
        filter_type: FilterType,
        mode: FilterMode,
    },

    #[error("The model {model} does not have an enum binding for the morph type {field}")]
    InvalidPolymorphic { model: String, field: String },

    #[error("Scope `{scope}` is not registered on `{entity}`.")]
    UnknownScope { entity: String, scope: String },

    #[error("Relation `{relation}` is not defined on `{entity}`.")]
    UnknownRelation { entity: String, relation: String },

    #[error("No `{entity}` found for key {key}.")]
    EntityNotFound { entity: String, key: String },

    #[error("No entity lookup is available to resolve `{entity}` arguments.")]
    MissingEntityLookup { entity: String },

    #[error("Invalid value for argument `{argument}`: {reason}")]
    InvalidArgument { argument: String, reason: String },

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

impl QueryError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn parse(field: impl Into<String>, expected: &'static str, reason: impl Into<String>) -> Self {
        Self::Parse {
            field: field.into(),
            expected,
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_scope(entity: impl Into<String>, scope: impl Into<String>) -> Self {
        Self::UnknownScope {
            entity: entity.into(),
            scope: scope.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
