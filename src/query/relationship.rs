use std::sync::Arc;

/// An eager-loadable relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub(crate) name: String,
    pub(crate) relation: String,
    pub(crate) scopes: Vec<String>,
}

impl Relationship {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            relation: name.to_string(),
            scopes: Vec::new(),
        }
    }

    /// Query-facing name; a dotted name also loads its parent relationship
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Relation loaded on the builder
    pub fn relation(&self) -> &str {
        &self.relation
    }

    /// Scope methods applied to the related query
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Name of the parent relationship for dotted names
    pub fn parent_name(&self) -> Option<&str> {
        self.name.rfind('.').map(|position| &self.name[..position])
    }
}

/// A relationship loaded by one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipValue {
    relationship: Arc<Relationship>,
}

impl RelationshipValue {
    pub fn new(relationship: Arc<Relationship>) -> Self {
        Self { relationship }
    }

    pub fn relationship(&self) -> &Relationship {
        &self.relationship
    }

    pub fn name(&self) -> &str {
        self.relationship.name()
    }

    pub fn relation(&self) -> &str {
        self.relationship.relation()
    }

    pub fn scopes(&self) -> &[String] {
        self.relationship.scopes()
    }
}
