//! Scope filters and their arguments.
//!
//! A [`Scope`] binds a query-facing name to a scope method registered on the
//! entity's [`ScopeRegistry`]. Each [`ScopeArgument`] is resolved against the
//! method's [`ParameterDescriptor`]s when the configuration locks: that step
//! infers validation rules for plain types and wraps entity-typed parameters
//! with a lookup through the request's [`EntityLookup`](crate::query_builder::EntityLookup).

use super::plan::QueryContext;
use crate::error::{ConfigurationError, QueryError, Result};
use crate::query_builder::{ParameterDescriptor, ParameterType, ScopeArguments, ScopeMethod, ScopeRegistry};
use crate::validation::Rule;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Computes an argument's value before the request sets one
pub type ArgumentResolver = Arc<dyn Fn(&QueryContext<'_>) -> Value + Send + Sync>;

/// Converts raw request input into the value handed to the scope method
pub type ArgumentTransformer = Arc<dyn Fn(Value, &QueryContext<'_>) -> Result<Value> + Send + Sync>;

/// Validation rules keyed by sub-key; the empty key targets the argument itself
pub type ArgumentRules = Vec<(String, Vec<Rule>)>;

#[derive(Clone)]
struct ResolvedArgument {
    parameter: ParameterDescriptor,
    validation: ArgumentRules,
    transformer: Option<ArgumentTransformer>,
}

/// One request-facing argument of a scope filter
#[derive(Clone)]
pub struct ScopeArgument {
    name: String,
    parameter_name: String,
    resolver: Option<ArgumentResolver>,
    transformer: Option<ArgumentTransformer>,
    transformer_input: Option<ParameterDescriptor>,
    validation: Option<ArgumentRules>,
    resolved: Option<ResolvedArgument>,
}

impl ScopeArgument {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parameter_name: name.to_string(),
            resolver: None,
            transformer: None,
            transformer_input: None,
            validation: None,
            resolved: None,
        }
    }

    /// Bind to the scope method parameter called `parameter`
    pub fn for_parameter(mut self, parameter: &str) -> Self {
        self.parameter_name = parameter.to_string();
        self
    }

    /// Default value computed from the query being built
    pub fn using<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&QueryContext<'_>) -> Value + Send + Sync + 'static,
    {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Transformer accepting untyped input; rules must then be given explicitly
    pub fn transform<F>(self, transformer: F) -> Self
    where
        F: Fn(Value, &QueryContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        let input = ParameterDescriptor::other(self.name.clone(), "mixed");
        self.transform_from(input, transformer)
    }

    /// Transformer whose input is described by `input`
    pub fn transform_from<F>(mut self, input: ParameterDescriptor, transformer: F) -> Self
    where
        F: Fn(Value, &QueryContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.transformer = Some(boxed_transformer(transformer));
        self.transformer_input = Some(input);
        self
    }

    /// Replace the inferred rules for the argument value
    pub fn with_validation(mut self, rules: Vec<Rule>) -> Self {
        self.set_rules(String::new(), rules);
        self
    }

    /// Rules for a sub-key of the argument, e.g. `*` for array items
    pub fn added_validation(mut self, sub_key: &str, rules: Vec<Rule>) -> Self {
        self.set_rules(sub_key.to_string(), rules);
        self
    }

    fn set_rules(&mut self, key: String, rules: Vec<Rule>) {
        let validation = self.validation.get_or_insert_with(Vec::new);
        match validation.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = rules,
            None => validation.push((key, rules)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_name(&self) -> &str {
        &self.parameter_name
    }

    pub fn has_resolver(&self) -> bool {
        self.resolver.is_some()
    }

    pub fn has_transformer(&self) -> bool {
        self.transformer.is_some()
    }

    /// Parameter the argument resolved to, once locked
    pub fn target_parameter(&self) -> Option<&ParameterDescriptor> {
        self.resolved.as_ref().map(|resolved| &resolved.parameter)
    }

    /// Effective rules: resolved ones once locked, else the explicit ones
    pub fn validation(&self) -> &[(String, Vec<Rule>)] {
        match (&self.resolved, &self.validation) {
            (Some(resolved), _) => &resolved.validation,
            (None, Some(explicit)) => explicit,
            (None, None) => &[],
        }
    }

    pub(crate) fn resolve(
        &mut self,
        entity: &str,
        scope: &str,
        method: &ScopeMethod,
    ) -> std::result::Result<(), ConfigurationError> {
        let parameter = match &self.transformer_input {
            Some(input) => input.clone(),
            None => method
                .parameter(&self.parameter_name)
                .cloned()
                .ok_or_else(|| ConfigurationError::parameter_not_found(entity, scope, &self.name))?,
        };

        let validation = match &self.validation {
            Some(explicit) => explicit.clone(),
            None => vec![(String::new(), infer_rules(&parameter, entity, scope, &self.name)?)],
        };

        let transformer = match &parameter.ty {
            ParameterType::Entity(target) => Some(entity_transformer(
                target.clone(),
                parameter.nullable,
                self.transformer.clone(),
            )),
            _ => self.transformer.clone(),
        };

        self.resolved = Some(ResolvedArgument {
            parameter,
            validation,
            transformer,
        });
        Ok(())
    }

    pub(crate) fn initial_value(&self, context: &QueryContext<'_>) -> Value {
        match &self.resolver {
            Some(resolver) => resolver(context),
            None => Value::Null,
        }
    }

    pub(crate) fn transform_value(&self, value: Value, context: &QueryContext<'_>) -> Result<Value> {
        let transformer = match &self.resolved {
            Some(resolved) => resolved.transformer.as_ref(),
            None => self.transformer.as_ref(),
        };
        match transformer {
            Some(transformer) if !value.is_null() => transformer(value, context),
            _ => Ok(value),
        }
    }
}

impl fmt::Debug for ScopeArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeArgument")
            .field("name", &self.name)
            .field("parameter_name", &self.parameter_name)
            .field("resolver", &self.resolver.is_some())
            .field("transformer", &self.transformer.is_some())
            .field("validation", &self.validation())
            .finish()
    }
}

fn infer_rules(
    parameter: &ParameterDescriptor,
    entity: &str,
    scope: &str,
    argument: &str,
) -> std::result::Result<Vec<Rule>, ConfigurationError> {
    let presence = if parameter.accepts_missing() {
        Rule::Nullable
    } else {
        Rule::RequiredWith(scope.to_string())
    };
    let type_rule = match &parameter.ty {
        ParameterType::Integer => Some(Rule::Integer),
        ParameterType::Float => Some(Rule::Numeric),
        ParameterType::String => Some(Rule::String),
        ParameterType::Boolean => Some(Rule::Boolean),
        ParameterType::Entity(_) => None,
        ParameterType::Other(_) => {
            return Err(ConfigurationError::invalid_argument_type(entity, scope, argument));
        }
    };
    Ok(std::iter::once(presence).chain(type_rule).collect())
}

fn boxed_transformer<F>(transformer: F) -> ArgumentTransformer
where
    F: Fn(Value, &QueryContext<'_>) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(transformer)
}

/// Looks the raw key up as `entity`, then hands the record to `base`
fn entity_transformer(entity: String, nullable: bool, base: Option<ArgumentTransformer>) -> ArgumentTransformer {
    boxed_transformer(move |value, context| {
        let lookup = context
            .entities()
            .ok_or_else(|| QueryError::MissingEntityLookup {
                entity: entity.clone(),
            })?;
        let found = match lookup.find(&entity, &value)? {
            Some(record) => Value::Record(record),
            None if nullable => Value::Null,
            None => {
                return Err(QueryError::EntityNotFound {
                    entity: entity.clone(),
                    key: value.to_string(),
                })
            }
        };
        match &base {
            Some(transformer) => transformer(found, context),
            None => Ok(found),
        }
    })
}

/// A filter bound to a scope method instead of a column
#[derive(Debug, Clone)]
pub struct Scope {
    name: String,
    scope_name: String,
    arguments: Vec<Arc<ScopeArgument>>,
}

impl Scope {
    pub fn new(name: &str, scope_name: &str) -> Self {
        Self {
            name: name.to_string(),
            scope_name: scope_name.to_string(),
            arguments: Vec::new(),
        }
    }

    /// Query-facing name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scope method invoked on the builder
    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    pub fn arguments(&self) -> &[Arc<ScopeArgument>] {
        &self.arguments
    }

    pub fn argument(&self, name: &str) -> Option<&ScopeArgument> {
        self.arguments
            .iter()
            .find(|argument| argument.name() == name)
            .map(Arc::as_ref)
    }

    pub(crate) fn push_argument(&mut self, argument: ScopeArgument) {
        self.arguments.push(Arc::new(argument));
    }

    /// Resolve every argument against the bound scope method
    pub(crate) fn lock(&mut self, registry: &ScopeRegistry) -> std::result::Result<(), ConfigurationError> {
        if self.arguments.is_empty() {
            return Ok(());
        }
        let method = registry
            .get(&self.scope_name)
            .ok_or_else(|| ConfigurationError::UnknownScopeMethod {
                entity: registry.entity().to_string(),
                scope: self.name.clone(),
                method: self.scope_name.clone(),
            })?;
        for argument in &mut self.arguments {
            Arc::make_mut(argument).resolve(registry.entity(), &self.name, method)?;
        }
        Ok(())
    }

    /// Rules relative to the scope key; the empty key is the scope itself
    pub fn validation(&self) -> ArgumentRules {
        let own = if self.arguments.is_empty() {
            vec![Rule::Nullable]
        } else {
            vec![Rule::Nullable, Rule::Array]
        };
        let mut rules = vec![(String::new(), own)];
        for argument in &self.arguments {
            for (key, argument_rules) in argument.validation() {
                let path = if key.is_empty() {
                    argument.name().to_string()
                } else {
                    format!("{}.{key}", argument.name())
                };
                rules.push((path, argument_rules.clone()));
            }
        }
        rules
    }
}

/// An argument value on one applied scope
#[derive(Debug, Clone)]
pub struct ScopeArgumentValue {
    argument: Arc<ScopeArgument>,
    value: Value,
}

impl ScopeArgumentValue {
    pub(crate) fn new(argument: Arc<ScopeArgument>, context: &QueryContext<'_>) -> Self {
        let value = argument.initial_value(context);
        Self { argument, value }
    }

    /// Store `value`, transformed unless it is null
    pub fn set(&mut self, value: Value, context: &QueryContext<'_>) -> Result<()> {
        self.value = self.argument.transform_value(value, context)?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        self.argument.name()
    }

    pub fn parameter_name(&self) -> &str {
        self.argument.parameter_name()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// A scope applied to one query
#[derive(Debug, Clone)]
pub struct ScopeValue {
    scope: Arc<Scope>,
    arguments: Vec<ScopeArgumentValue>,
}

impl ScopeValue {
    pub(crate) fn new(scope: Arc<Scope>, context: &QueryContext<'_>) -> Self {
        let arguments = scope
            .arguments()
            .iter()
            .map(|argument| ScopeArgumentValue::new(argument.clone(), context))
            .collect();
        Self { scope, arguments }
    }

    pub fn name(&self) -> &str {
        self.scope.name()
    }

    pub fn scope_name(&self) -> &str {
        self.scope.scope_name()
    }

    pub fn arguments(&self) -> &[ScopeArgumentValue] {
        &self.arguments
    }

    pub fn argument(&self, name: &str) -> Result<&ScopeArgumentValue> {
        self.arguments
            .iter()
            .find(|argument| argument.name() == name)
            .ok_or_else(|| self.missing_argument(name))
    }

    pub fn set_argument(&mut self, name: &str, value: Value, context: &QueryContext<'_>) -> Result<()> {
        let missing = self.missing_argument(name);
        self.arguments
            .iter_mut()
            .find(|argument| argument.name() == name)
            .ok_or(missing)?
            .set(value, context)
    }

    fn missing_argument(&self, name: &str) -> QueryError {
        QueryError::ArgumentNotFound {
            scope: self.name().to_string(),
            argument: name.to_string(),
        }
    }

    /// Non-null argument values keyed by scope method parameter
    pub fn arguments_map(&self) -> ScopeArguments {
        self.arguments
            .iter()
            .filter(|argument| !argument.value().is_null())
            .map(|argument| (argument.parameter_name().to_string(), argument.value().clone()))
            .collect()
    }
}
