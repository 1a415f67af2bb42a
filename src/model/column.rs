//! Column references and ordered column selections (node projections).

use serde::{Deserialize, Serialize};

use super::types::DataType;

/// A calculated column whose formula reads columns of other nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionColumn {
    /// Formula text, opaque to this crate.
    pub expression: String,
    /// Nodes the formula reads from.
    pub referenced_nodes: Vec<String>,
}

/// Reference to a column, optionally qualified by the node that produces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Producing node (sub-table) name, if qualified.
    pub entity: Option<String>,
    /// Column name within the producing node.
    pub attribute: String,
    /// Output name override.
    pub alias: Option<String>,
    pub data_type: DataType,
    /// Hidden columns stay in the selection but are not output.
    pub visible: bool,
    /// Set for calculated columns.
    pub expression: Option<ExpressionColumn>,
}

impl ColumnRef {
    /// Create an unqualified column of unknown type.
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            entity: None,
            attribute: attribute.into(),
            alias: None,
            data_type: DataType::Unknown,
            visible: true,
            expression: None,
        }
    }

    /// Create a column qualified by its producing node.
    pub fn qualified(entity: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            entity: Some(entity.into()),
            ..Self::new(attribute)
        }
    }

    /// Create a calculated column.
    pub fn expression(
        name: impl Into<String>,
        expression: impl Into<String>,
        referenced_nodes: Vec<String>,
    ) -> Self {
        Self {
            expression: Some(ExpressionColumn {
                expression: expression.into(),
                referenced_nodes,
            }),
            ..Self::new(name)
        }
    }

    pub fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// The name this column is output under.
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.attribute)
    }

    /// Whether this column matches a (possibly qualified) lookup.
    pub fn matches(&self, entity: Option<&str>, name: &str) -> bool {
        let entity_ok = match (entity, self.entity.as_deref()) {
            (Some(want), Some(have)) => want == have,
            _ => true,
        };
        entity_ok && (self.name() == name || self.attribute == name)
    }

    /// Rewrite references to a renamed node. Returns true if anything changed.
    pub fn rename_entity(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        if self.entity.as_deref() == Some(old) {
            self.entity = Some(new.to_string());
            changed = true;
        }
        if let Some(expr) = &mut self.expression {
            for node in &mut expr.referenced_nodes {
                if node == old {
                    *node = new.to_string();
                    changed = true;
                }
            }
        }
        changed
    }
}

/// Ordered list of output columns of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnSelection {
    columns: Vec<ColumnRef>,
}

impl ColumnSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: Vec<ColumnRef>) -> Self {
        Self { columns }
    }

    pub fn push(&mut self, column: ColumnRef) {
        self.columns.push(column);
    }

    /// Remove a column by output name, returning it.
    pub fn remove(&mut self, name: &str) -> Option<ColumnRef> {
        let idx = self.columns.iter().position(|c| c.name() == name)?;
        Some(self.columns.remove(idx))
    }

    pub fn get(&self, index: usize) -> Option<&ColumnRef> {
        self.columns.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ColumnRef> {
        self.columns.get_mut(index)
    }

    /// Find a column by (possibly qualified) name.
    pub fn find(&self, entity: Option<&str>, name: &str) -> Option<&ColumnRef> {
        self.columns.iter().find(|c| c.matches(entity, name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(None, name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnRef> {
        self.columns.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ColumnRef> {
        self.columns.iter_mut()
    }

    /// Visible (output) columns in order.
    pub fn public_columns(&self) -> impl Iterator<Item = &ColumnRef> {
        self.columns.iter().filter(|c| c.visible)
    }

    /// Number of visible columns.
    pub fn public_len(&self) -> usize {
        self.public_columns().count()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Types of the visible columns in order.
    pub fn public_types(&self) -> Vec<DataType> {
        self.public_columns().map(|c| c.data_type).collect()
    }

    /// Output names of the visible columns in order.
    pub fn public_names(&self) -> Vec<&str> {
        self.public_columns().map(|c| c.name()).collect()
    }

    /// Rewrite node-qualified references. Returns true if anything changed.
    pub fn rename_entity(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        for column in &mut self.columns {
            changed |= column.rename_entity(old, new);
        }
        changed
    }

    /// Nodes referenced by calculated columns.
    pub fn expression_nodes(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter_map(|c| c.expression.as_ref())
            .flat_map(|e| e.referenced_nodes.iter().map(String::as_str))
    }
}

impl FromIterator<ColumnRef> for ColumnSelection {
    fn from_iter<T: IntoIterator<Item = ColumnRef>>(iter: T) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}
