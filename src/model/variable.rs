//! Bound variables (run-time parameters) and the variable collaborator seam.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::types::{DataType, Value};

/// A named parameter resolved at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserVariable {
    pub name: String,
    pub data_type: DataType,
    /// Resolved value(s); empty until replaced.
    pub values: Vec<Value>,
    /// Node supplying the variable's choice list, if any.
    pub choice_table: Option<String>,
    pub choice_column: Option<String>,
}

impl UserVariable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::Unknown,
            values: Vec::new(),
            choice_table: None,
            choice_column: None,
        }
    }

    pub fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Bind the variable's choices to a column of another node.
    pub fn with_choices(mut self, node: impl Into<String>, column: impl Into<String>) -> Self {
        self.choice_table = Some(node.into());
        self.choice_column = Some(column.into());
        self
    }

    pub fn is_resolved(&self) -> bool {
        !self.values.is_empty()
    }

    /// Take the value(s) bound in the table, if present.
    pub fn resolve(&mut self, table: &VariableTable) -> bool {
        match table.get(&self.name) {
            Some(values) => {
                self.values = values
                    .iter()
                    .map(|v| v.coerce(self.data_type))
                    .collect();
                true
            }
            None => false,
        }
    }

    /// Rewrite the choice table after a node rename.
    pub fn rename_entity(&mut self, old: &str, new: &str) -> bool {
        if self.choice_table.as_deref() == Some(old) {
            self.choice_table = Some(new.to_string());
            true
        } else {
            false
        }
    }
}

/// Name to value(s) bindings supplied by the caller at run time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableTable {
    values: IndexMap<String, Vec<Value>>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), vec![value.into()]);
    }

    pub fn set_all(&mut self, name: impl Into<String>, values: Vec<Value>) {
        self.values.insert(name.into(), values);
    }

    pub fn get(&self, name: &str) -> Option<&[Value]> {
        self.values.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Objects that may hold bound variables.
pub trait VariableSupport {
    /// All variables referenced by this object, in declaration order.
    fn all_variables(&self) -> Vec<UserVariable>;

    /// Substitute values from the table into every referenced variable.
    fn replace_variables(&mut self, vars: &VariableTable);
}

/// Append variables not already present (by name).
pub(crate) fn merge_variables(into: &mut Vec<UserVariable>, more: Vec<UserVariable>) {
    for var in more {
        if !into.iter().any(|v| v.name == var.name) {
            into.push(var);
        }
    }
}
