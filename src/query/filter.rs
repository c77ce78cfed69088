use crate::constants::{FilterMode, FilterType, DEFAULT_MAX_STRING_LENGTH};
use crate::query_builder::Boolean;
use crate::validation::Rule;
use crate::value::Value;
use std::sync::Arc;

/// A filter on a single column
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub(crate) name: String,
    pub(crate) field: String,
    pub(crate) filter_type: FilterType,
    pub(crate) default: Option<Value>,
    pub(crate) dummy: bool,
}

impl Filter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field: name.to_string(),
            filter_type: FilterType::default(),
            default: None,
            dummy: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column the filter applies to
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    /// Value bound when the request carries none
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Dummy filters are accepted by validation but never reach the builder
    pub fn is_dummy(&self) -> bool {
        self.dummy
    }

    /// Rules for the `value`, `mode` and `not` sub-keys
    pub fn validation(&self) -> Vec<(&'static str, Vec<Rule>)> {
        self.validation_bounded(DEFAULT_MAX_STRING_LENGTH)
    }

    pub fn validation_bounded(&self, max_string_length: i64) -> Vec<(&'static str, Vec<Rule>)> {
        let mut value = vec![Rule::Nullable];
        value.extend(self.filter_type.value_rules_bounded(max_string_length));
        vec![
            ("value", value),
            (
                "mode",
                vec![
                    Rule::Nullable,
                    Rule::one_of(self.filter_type.modes().iter().map(FilterMode::as_str)),
                ],
            ),
            ("not", vec![Rule::Nullable, Rule::Boolean]),
        ]
    }
}

/// A filter applied to one query
#[derive(Debug, Clone, PartialEq)]
pub struct FilterValue {
    filter: Arc<Filter>,
    mode: FilterMode,
    value: Value,
    not: bool,
}

impl FilterValue {
    pub fn new(filter: Arc<Filter>, mode: FilterMode, value: Value, not: bool) -> Self {
        Self {
            filter,
            mode,
            value,
            not,
        }
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn name(&self) -> &str {
        self.filter.name()
    }

    pub fn field(&self) -> &str {
        self.filter.field()
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter.filter_type()
    }

    pub fn is_dummy(&self) -> bool {
        self.filter.is_dummy()
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_not(&self) -> bool {
        self.not
    }

    /// How the predicate joins the previous ones
    pub fn boolean(&self) -> Boolean {
        Boolean::negated(self.not)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_defaults() {
        let filter = Filter::new("name");
        assert_eq!(filter.field(), "name");
        assert_eq!(filter.filter_type(), FilterType::String);
        assert!(filter.default_value().is_none());
        assert!(!filter.is_dummy());
    }

    #[test]
    fn test_validation_keys() {
        let mut filter = Filter::new("size");
        filter.filter_type = FilterType::Integer;
        let rules = filter.validation();
        let keys: Vec<&str> = rules.iter().map(|(key, _)| *key).collect();
        assert_eq!(keys, vec!["value", "mode", "not"]);
        assert_eq!(rules[0].1[0], Rule::Nullable);
        assert_eq!(rules[0].1[1], Rule::Integer);
        assert_eq!(rules[1].1[1].to_string(), "in:equals,gt,gte,lt,lte,in");
        assert_eq!(rules[2].1, vec![Rule::Nullable, Rule::Boolean]);
    }

    #[test]
    fn test_negated_value_joins_with_and_not() {
        let value = FilterValue::new(Arc::new(Filter::new("name")), FilterMode::Contains, "Ali".into(), true);
        assert_eq!(value.boolean(), Boolean::AndNot);
        assert!(value.is_not());
    }
}
