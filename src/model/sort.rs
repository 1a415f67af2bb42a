//! Sort specification of a node's output.

use serde::{Deserialize, Serialize};

use super::column::ColumnRef;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortRef {
    pub column: ColumnRef,
    pub order: SortOrder,
}

/// Ordered sort keys; earlier keys take precedence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SortInfo {
    pub keys: Vec<SortRef>,
}

impl SortInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by(mut self, column: ColumnRef, order: SortOrder) -> Self {
        self.keys.push(SortRef { column, order });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn rename_entity(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        for key in &mut self.keys {
            changed |= key.column.rename_entity(old, new);
        }
        changed
    }
}
