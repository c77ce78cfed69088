//! Named scope methods registered per entity.
//!
//! A scope method is a closure applied to a [`QueryBuilder`] together with the
//! parameter descriptors it accepts. Descriptors drive argument validation
//! inference and entity resolution when a query configuration is locked.

use super::QueryBuilder;
use crate::error::{QueryError, Result};
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Arguments handed to a scope handler, keyed by parameter name
pub type ScopeArguments = BTreeMap<String, Value>;

pub type ScopeHandler =
    Arc<dyn Fn(&mut dyn QueryBuilder, &ScopeArguments) -> Result<()> + Send + Sync>;

/// Static type of a scope parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParameterType {
    Integer,
    Float,
    String,
    Boolean,
    /// Reference to a stored entity, resolved from its key
    Entity(String),
    /// Any other type: enums, arrays, value objects
    Other(String),
}

impl ParameterType {
    pub fn is_builtin(&self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::String | Self::Boolean)
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
            Self::Boolean => write!(f, "bool"),
            Self::Entity(entity) => write!(f, "{entity}"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Declared parameter of a scope method or typed transformer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterDescriptor {
    pub name: String,
    pub ty: ParameterType,
    pub nullable: bool,
    pub optional: bool,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>, ty: ParameterType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            optional: false,
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ParameterType::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ParameterType::Float)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ParameterType::String)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ParameterType::Boolean)
    }

    pub fn entity(name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::new(name, ParameterType::Entity(entity.into()))
    }

    pub fn other(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(name, ParameterType::Other(type_name.into()))
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Absent values are acceptable
    pub fn accepts_missing(&self) -> bool {
        self.nullable || self.optional
    }
}

/// A registered scope method
#[derive(Clone)]
pub struct ScopeMethod {
    name: String,
    parameters: Vec<ParameterDescriptor>,
    handler: ScopeHandler,
}

impl ScopeMethod {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|parameter| parameter.name == name)
    }

    pub fn call(&self, builder: &mut dyn QueryBuilder, arguments: &ScopeArguments) -> Result<()> {
        (self.handler)(builder, arguments)
    }
}

impl fmt::Debug for ScopeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeMethod")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Scope methods available on one entity
#[derive(Debug, Clone, Default)]
pub struct ScopeRegistry {
    entity: String,
    methods: BTreeMap<String, Arc<ScopeMethod>>,
}

impl ScopeRegistry {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            methods: BTreeMap::new(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Register a scope method; a later registration under the same name wins
    pub fn register<F>(mut self, name: &str, parameters: Vec<ParameterDescriptor>, handler: F) -> Self
    where
        F: Fn(&mut dyn QueryBuilder, &ScopeArguments) -> Result<()> + Send + Sync + 'static,
    {
        self.methods.insert(
            name.to_string(),
            Arc::new(ScopeMethod {
                name: name.to_string(),
                parameters,
                handler: Arc::new(handler),
            }),
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ScopeMethod>> {
        self.methods.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn call(&self, name: &str, builder: &mut dyn QueryBuilder, arguments: &ScopeArguments) -> Result<()> {
        let method = self
            .get(name)
            .ok_or_else(|| QueryError::unknown_scope(&self.entity, name))?;
        method.call(builder, arguments)
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

/// Reads a required argument, failing with a descriptive error
pub fn required_argument<'a>(arguments: &'a ScopeArguments, scope: &str, name: &str) -> Result<&'a Value> {
    arguments.get(name).ok_or_else(|| QueryError::ArgumentNotFound {
        scope: scope.to_string(),
        argument: name.to_string(),
    })
}
