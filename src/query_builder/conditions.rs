use crate::value::Value;
use std::fmt;

/// Whitelisted comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// How a predicate joins the ones before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Boolean {
    #[default]
    And,
    AndNot,
}

impl Boolean {
    pub fn negated(not: bool) -> Self {
        if not {
            Self::AndNot
        } else {
            Self::And
        }
    }

    pub fn is_not(&self) -> bool {
        matches!(self, Self::AndNot)
    }
}

/// Represents the predicates a query builder accepts
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        field: String,
        operator: Operator,
        value: Value,
    },
    /// `LIKE` with `\` as escape character
    Like { field: String, pattern: String },
    In { field: String, values: Vec<Value> },
}

impl Condition {
    pub fn compare(field: &str, operator: Operator, value: Value) -> Self {
        Self::Compare {
            field: field.to_string(),
            operator,
            value,
        }
    }

    pub fn like(field: &str, pattern: impl Into<String>) -> Self {
        Self::Like {
            field: field.to_string(),
            pattern: pattern.into(),
        }
    }

    pub fn in_values(field: &str, values: Vec<Value>) -> Self {
        Self::In {
            field: field.to_string(),
            values,
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Compare { field, .. } | Self::Like { field, .. } | Self::In { field, .. } => field,
        }
    }

    /// Render with positional `$n` placeholders, pushing values onto `bindings`
    pub fn to_sql(&self, bindings: &mut Vec<Value>) -> String {
        match self {
            Self::Compare {
                field,
                operator,
                value,
            } => {
                if value.is_null() && *operator == Operator::Eq {
                    return format!("{} IS NULL", quote_identifier(field));
                }
                bindings.push(value.clone());
                format!("{} {} ${}", quote_identifier(field), operator, bindings.len())
            }
            Self::Like { field, pattern } => {
                bindings.push(Value::String(pattern.clone()));
                format!("{} LIKE ${} ESCAPE '\\'", quote_identifier(field), bindings.len())
            }
            Self::In { field, values } => {
                if values.is_empty() {
                    return "1 = 0".to_string();
                }
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|value| {
                        bindings.push(value.clone());
                        format!("${}", bindings.len())
                    })
                    .collect();
                format!("{} IN ({})", quote_identifier(field), placeholders.join(", "))
            }
        }
    }
}

/// A condition plus the boolean joining it to previous clauses
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub condition: Condition,
    pub boolean: Boolean,
}

impl WhereClause {
    pub fn new(condition: Condition, boolean: Boolean) -> Self {
        Self { condition, boolean }
    }

    pub fn and(condition: Condition) -> Self {
        Self::new(condition, Boolean::And)
    }

    pub fn and_not(condition: Condition) -> Self {
        Self::new(condition, Boolean::AndNot)
    }

    pub fn to_sql(&self, bindings: &mut Vec<Value>) -> String {
        let sql = self.condition.to_sql(bindings);
        match self.boolean {
            Boolean::And => sql,
            Boolean::AndNot => format!("NOT ({sql})"),
        }
    }
}

/// Escape `\`, `%` and `_` so user input matches literally inside `LIKE`
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Substring pattern for `LIKE`
pub fn contains_pattern(value: &str) -> String {
    format!("%{}%", escape_like(value))
}

/// Double-quote an identifier, keeping `table.column` qualification
pub fn quote_identifier(identifier: &str) -> String {
    if identifier == "*" {
        return identifier.to_string();
    }
    identifier
        .split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Evaluates a `LIKE` pattern (with `\` escapes) against `text`
pub fn like_matches(text: &str, pattern: &str) -> bool {
    #[derive(Debug, PartialEq)]
    enum Token {
        Literal(char),
        AnyOne,
        AnyMany,
    }

    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => tokens.push(Token::Literal(chars.next().unwrap_or('\\'))),
            '%' => tokens.push(Token::AnyMany),
            '_' => tokens.push(Token::AnyOne),
            other => tokens.push(Token::Literal(other)),
        }
    }

    let text: Vec<char> = text.chars().collect();
    // matched[i][j]: first i tokens match first j chars
    let mut matched = vec![vec![false; text.len() + 1]; tokens.len() + 1];
    matched[0][0] = true;
    for (i, token) in tokens.iter().enumerate() {
        for j in 0..=text.len() {
            matched[i + 1][j] = match token {
                Token::AnyMany => matched[i][j] || (j > 0 && matched[i + 1][j - 1]),
                Token::AnyOne => j > 0 && matched[i][j - 1],
                Token::Literal(c) => j > 0 && matched[i][j - 1] && text[j - 1] == *c,
            };
        }
    }
    matched[tokens.len()][text.len()]
}
