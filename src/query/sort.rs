use crate::constants::SortOrder;
use std::fmt;
use std::sync::Arc;

/// A sortable column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub(crate) name: String,
    pub(crate) field: String,
}

impl Sort {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A sort applied to one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortValue {
    sort: Arc<Sort>,
    order: SortOrder,
}

impl SortValue {
    pub fn new(sort: Arc<Sort>, order: SortOrder) -> Self {
        Self { sort, order }
    }

    pub fn name(&self) -> &str {
        self.sort.name()
    }

    pub fn field(&self) -> &str {
        self.sort.field()
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }
}
