//! Table schemas and relation definitions.
//!
//! Builders resolve eager loads through a shared [`Catalog`]: each table
//! declares its primary key, scope registry and relations to other tables.

use super::cursor::field_value;
use super::scopes::ScopeRegistry;
use super::{QueryBuilder, RelationQuery};
use crate::error::{QueryError, Result};
use crate::value::{Record, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// How two tables are linked
#[derive(Debug, Clone, PartialEq)]
pub enum RelationKind {
    /// Related rows carry `foreign_key` pointing at the parent's `local_key`
    HasMany { foreign_key: String, local_key: String },
    /// Single-row variant of [`RelationKind::HasMany`]
    HasOne { foreign_key: String, local_key: String },
    /// The parent carries `foreign_key` pointing at the related `owner_key`
    BelongsTo { foreign_key: String, owner_key: String },
    /// Polymorphic parent reference: `type_column` names the related table
    MorphTo {
        type_column: String,
        id_column: String,
        owner_key: String,
        /// Closed mapping from discriminator value to table
        type_binding: Option<BTreeMap<String, String>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationDefinition {
    pub name: String,
    /// Related table; empty for polymorphic relations
    pub related: String,
    pub kind: RelationKind,
}

impl RelationDefinition {
    pub fn has_many(name: &str, related: &str, foreign_key: &str, local_key: &str) -> Self {
        Self {
            name: name.to_string(),
            related: related.to_string(),
            kind: RelationKind::HasMany {
                foreign_key: foreign_key.to_string(),
                local_key: local_key.to_string(),
            },
        }
    }

    pub fn has_one(name: &str, related: &str, foreign_key: &str, local_key: &str) -> Self {
        Self {
            name: name.to_string(),
            related: related.to_string(),
            kind: RelationKind::HasOne {
                foreign_key: foreign_key.to_string(),
                local_key: local_key.to_string(),
            },
        }
    }

    pub fn belongs_to(name: &str, related: &str, foreign_key: &str, owner_key: &str) -> Self {
        Self {
            name: name.to_string(),
            related: related.to_string(),
            kind: RelationKind::BelongsTo {
                foreign_key: foreign_key.to_string(),
                owner_key: owner_key.to_string(),
            },
        }
    }

    pub fn morph_to(name: &str, type_column: &str, id_column: &str) -> Self {
        Self {
            name: name.to_string(),
            related: String::new(),
            kind: RelationKind::MorphTo {
                type_column: type_column.to_string(),
                id_column: id_column.to_string(),
                owner_key: "id".to_string(),
                type_binding: None,
            },
        }
    }

    /// Bind discriminator values to tables; no-op on non-polymorphic relations
    pub fn with_type_binding<I>(mut self, bindings: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, &'static str)>,
    {
        if let RelationKind::MorphTo { type_binding, .. } = &mut self.kind {
            *type_binding = Some(
                bindings
                    .into_iter()
                    .map(|(value, table)| (value.to_string(), table.to_string()))
                    .collect(),
            );
        }
        self
    }

    pub fn morph_type(&self) -> Option<&str> {
        match &self.kind {
            RelationKind::MorphTo { type_column, .. } => Some(type_column.as_str()),
            _ => None,
        }
    }

    pub fn has_enum_binding(&self, column: &str) -> bool {
        matches!(
            &self.kind,
            RelationKind::MorphTo { type_column, type_binding: Some(_), .. } if type_column == column
        )
    }

    /// Tables a polymorphic relation reaches from `rows`, with their parent rows' indexes
    pub fn morph_targets(&self, rows: &[Record]) -> Vec<(String, String, Vec<usize>)> {
        let RelationKind::MorphTo {
            type_column,
            type_binding,
            ..
        } = &self.kind
        else {
            return Vec::new();
        };
        let mut targets: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, row) in rows.iter().enumerate() {
            if let Some(serde_json::Value::String(morph)) = field_value(row, type_column) {
                targets.entry(morph.clone()).or_default().push(index);
            }
        }
        targets
            .into_iter()
            .filter_map(|(morph, indexes)| {
                let table = match type_binding {
                    Some(binding) => binding.get(&morph)?.clone(),
                    None => morph.clone(),
                };
                Some((morph, table, indexes))
            })
            .collect()
    }
}

/// Primary key, scopes and relations of one table
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub primary_key: String,
    pub scopes: Arc<ScopeRegistry>,
    pub relations: BTreeMap<String, RelationDefinition>,
    /// SQL types of columns whose JSON form is not their native type
    pub column_types: BTreeMap<String, String>,
}

impl TableSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            primary_key: "id".to_string(),
            scopes: Arc::new(ScopeRegistry::new(name)),
            relations: BTreeMap::new(),
            column_types: BTreeMap::new(),
        }
    }

    /// Declare the SQL type of `column`, e.g. `timestamptz` or `numeric`
    pub fn column_type(mut self, column: &str, sql_type: &str) -> Self {
        self.column_types.insert(column.to_string(), sql_type.to_string());
        self
    }

    pub fn primary_key(mut self, key: &str) -> Self {
        self.primary_key = key.to_string();
        self
    }

    pub fn scopes(mut self, scopes: ScopeRegistry) -> Self {
        self.scopes = Arc::new(scopes);
        self
    }

    pub fn relation(mut self, definition: RelationDefinition) -> Self {
        self.relations.insert(definition.name.clone(), definition);
        self
    }

    pub fn relation_or_fail(&self, name: &str) -> Result<&RelationDefinition> {
        self.relations.get(name).ok_or_else(|| QueryError::UnknownRelation {
            entity: self.name.clone(),
            relation: name.to_string(),
        })
    }
}

/// Every table builders may reach
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: BTreeMap<String, TableSchema>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, schema: TableSchema) -> Self {
        self.tables.insert(schema.name.clone(), schema);
        self
    }

    pub fn get(&self, name: &str) -> Result<&TableSchema> {
        self.tables
            .get(name)
            .ok_or_else(|| QueryError::not_found("table", name))
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

/// [`RelationQuery`] over a concrete related builder
pub struct RelatedQuery<'a, B: QueryBuilder> {
    definition: &'a RelationDefinition,
    parent_entity: &'a str,
    builder: &'a mut B,
}

impl<'a, B: QueryBuilder> RelatedQuery<'a, B> {
    pub fn new(definition: &'a RelationDefinition, parent_entity: &'a str, builder: &'a mut B) -> Self {
        Self {
            definition,
            parent_entity,
            builder,
        }
    }
}

impl<B: QueryBuilder> RelationQuery for RelatedQuery<'_, B> {
    fn relation(&self) -> &str {
        &self.definition.name
    }

    fn parent_entity(&self) -> &str {
        self.parent_entity
    }

    fn morph_type(&self) -> Option<&str> {
        self.definition.morph_type()
    }

    fn has_enum_binding(&self, column: &str) -> bool {
        self.definition.has_enum_binding(column)
    }

    fn query(&mut self) -> &mut dyn QueryBuilder {
        &mut *self.builder
    }
}

fn key_of(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Distinct non-null values of `column` across `rows`
pub(crate) fn relation_keys<'a, I>(rows: I, column: &str) -> Vec<Value>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut seen = std::collections::BTreeSet::new();
    let mut keys = Vec::new();
    for row in rows {
        if let Some(value) = field_value(row, column) {
            if let Some(key) = key_of(value) {
                if seen.insert(key) {
                    keys.push(Value::from_json(value));
                }
            }
        }
    }
    keys
}

fn index_related(related: Vec<Record>, key_column: &str) -> BTreeMap<String, Vec<Record>> {
    let mut index: BTreeMap<String, Vec<Record>> = BTreeMap::new();
    for row in related {
        if let Some(key) = field_value(&row, key_column).and_then(key_of) {
            index.entry(key).or_default().push(row);
        }
    }
    index
}

fn set_relation(row: &mut Record, name: &str, value: serde_json::Value) {
    if let Some(object) = row.as_object_mut() {
        object.insert(name.to_string(), value);
    }
}

/// Attach related rows to their parents according to `definition`.
///
/// `indexes` limits attachment to a subset of parents (polymorphic groups).
pub(crate) fn attach_related(
    definition: &RelationDefinition,
    rows: &mut [Record],
    indexes: Option<&[usize]>,
    related: Vec<Record>,
) {
    let (parent_column, related_column, many) = match &definition.kind {
        RelationKind::HasMany { foreign_key, local_key } => (local_key, foreign_key, true),
        RelationKind::HasOne { foreign_key, local_key } => (local_key, foreign_key, false),
        RelationKind::BelongsTo { foreign_key, owner_key } => (foreign_key, owner_key, false),
        RelationKind::MorphTo { id_column, owner_key, .. } => (id_column, owner_key, false),
    };
    let index = index_related(related, related_column);

    let positions: Vec<usize> = match indexes {
        Some(indexes) => indexes.to_vec(),
        None => (0..rows.len()).collect(),
    };
    for position in positions {
        let Some(row) = rows.get_mut(position) else {
            continue;
        };
        let matches = field_value(row, parent_column)
            .and_then(key_of)
            .and_then(|key| index.get(&key))
            .cloned()
            .unwrap_or_default();
        let value = if many {
            serde_json::Value::Array(matches)
        } else {
            matches.into_iter().next().unwrap_or(serde_json::Value::Null)
        };
        set_relation(row, &definition.name, value);
    }
}

/// Parent rows served by one related table during an eager load
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LoadGroup {
    pub table: String,
    /// Parent positions; `None` means every row
    pub indexes: Option<Vec<usize>>,
}

impl LoadGroup {
    pub fn keys(&self, rows: &[Record], column: &str) -> Vec<Value> {
        match &self.indexes {
            Some(indexes) => relation_keys(indexes.iter().filter_map(|&i| rows.get(i)), column),
            None => relation_keys(rows.iter(), column),
        }
    }
}

/// Related tables to query for `definition`; polymorphic relations split by discriminator
pub(crate) fn load_groups(definition: &RelationDefinition, rows: &[Record]) -> Vec<LoadGroup> {
    if definition.morph_type().is_some() {
        definition
            .morph_targets(rows)
            .into_iter()
            .map(|(_, table, indexes)| LoadGroup {
                table,
                indexes: Some(indexes),
            })
            .collect()
    } else {
        vec![LoadGroup {
            table: definition.related.clone(),
            indexes: None,
        }]
    }
}

/// Column on the related table constrained by the parents' keys, and the parent column providing them
pub(crate) fn join_columns(definition: &RelationDefinition) -> (&str, &str) {
    match &definition.kind {
        RelationKind::HasMany { foreign_key, local_key }
        | RelationKind::HasOne { foreign_key, local_key } => (foreign_key.as_str(), local_key.as_str()),
        RelationKind::BelongsTo { foreign_key, owner_key } => (owner_key.as_str(), foreign_key.as_str()),
        RelationKind::MorphTo { id_column, owner_key, .. } => (owner_key.as_str(), id_column.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_has_many_attachment() {
        let definition = RelationDefinition::has_many("bars", "bars", "foo_id", "id");
        let mut rows = vec![json!({"id": 1}), json!({"id": 2})];
        let related = vec![
            json!({"id": 10, "foo_id": 1}),
            json!({"id": 11, "foo_id": 1}),
        ];
        attach_related(&definition, &mut rows, None, related);
        assert_eq!(rows[0]["bars"].as_array().map(Vec::len), Some(2));
        assert_eq!(rows[1]["bars"], json!([]));
    }

    #[test]
    fn test_belongs_to_attachment() {
        let definition = RelationDefinition::belongs_to("foo", "foos", "foo_id", "id");
        let mut rows = vec![json!({"id": 10, "foo_id": 1}), json!({"id": 11, "foo_id": null})];
        attach_related(&definition, &mut rows, None, vec![json!({"id": 1, "name": "Alice"})]);
        assert_eq!(rows[0]["foo"]["name"], "Alice");
        assert_eq!(rows[1]["foo"], serde_json::Value::Null);
    }

    #[test]
    fn test_relation_keys_are_distinct() {
        let rows = [json!({"foo_id": 1}), json!({"foo_id": 1}), json!({"foo_id": null}), json!({"foo_id": 2})];
        assert_eq!(relation_keys(&rows, "foo_id"), vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn test_morph_targets_follow_binding() {
        let rows = [
            json!({"owner_type": "foo", "owner_id": 1}),
            json!({"owner_type": "bar", "owner_id": 2}),
            json!({"owner_type": "baz", "owner_id": 3}),
        ];
        let unbound = RelationDefinition::morph_to("owner", "owner_type", "owner_id");
        assert!(!unbound.has_enum_binding("owner_type"));
        assert_eq!(unbound.morph_targets(&rows).len(), 3);

        let bound = unbound.with_type_binding([("foo", "foos"), ("bar", "bars")]);
        assert!(bound.has_enum_binding("owner_type"));
        let targets = bound.morph_targets(&rows);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0], ("bar".to_string(), "bars".to_string(), vec![1]));

        let groups = load_groups(&bound, &rows);
        assert_eq!(groups[1].table, "foos");
        assert_eq!(groups[1].keys(&rows, "owner_id"), vec![Value::Integer(1)]);
    }
}
