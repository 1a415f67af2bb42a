//! Named groups: user-defined bucketing of one column's values into labels.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{Condition, ConditionItem, ConditionList, JunctionOp, RowAccess};
use crate::model::{merge_variables, ColumnRef, DataType, UserVariable, Value, VariableSupport, VariableTable};

/// Label used for values outside every group when they are kept.
pub const OTHERS_LABEL: &str = "Others";

/// What happens to values that match no group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OthersPolicy {
    /// Values outside every group keep no label.
    #[default]
    LeaveOthers,
    /// Values outside every group are bucketed under [`OTHERS_LABEL`].
    GroupOthers,
}

/// How one group selects its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupDefinition {
    Conditions(ConditionList),
    /// Raw value list; becomes `= v1 OR = v2 ...`.
    Values(Vec<Value>),
    /// Half-open `[start, end)`, typically a date period.
    Range { start: Value, end: Value },
}

/// Ordered label → group definition mapping for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedGroupInfo {
    pub attribute: ColumnRef,
    /// Type values are normalized to before comparison.
    pub data_type: DataType,
    groups: IndexMap<String, GroupDefinition>,
    pub others: OthersPolicy,
}

impl NamedGroupInfo {
    pub fn new(attribute: ColumnRef) -> Self {
        let data_type = attribute.data_type;
        Self {
            attribute,
            data_type,
            groups: IndexMap::new(),
            others: OthersPolicy::default(),
        }
    }

    pub fn with_others(mut self, others: OthersPolicy) -> Self {
        self.others = others;
        self
    }

    /// Add or replace a group. Replacing keeps the label's position.
    pub fn set_group(&mut self, label: impl Into<String>, definition: GroupDefinition) {
        self.groups.insert(label.into(), definition);
    }

    pub fn remove_group(&mut self, label: &str) -> Option<GroupDefinition> {
        self.groups.shift_remove(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn group(&self, label: &str) -> Option<&GroupDefinition> {
        self.groups.get(label)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Condition list selecting the values of one group.
    pub fn group_condition(&self, label: &str) -> Option<ConditionList> {
        Some(match self.groups.get(label)? {
            GroupDefinition::Conditions(list) => list.clone(),
            GroupDefinition::Values(values) => self.values_condition(values),
            GroupDefinition::Range { start, end } => {
                let mut list = ConditionList::new();
                list.append(
                    ConditionItem::new(
                        self.attribute.clone(),
                        Condition::greater_than(start.coerce(self.data_type), true)
                            .with_type(self.data_type),
                    ),
                    JunctionOp::And,
                );
                list.append(
                    ConditionItem::new(
                        self.attribute.clone(),
                        Condition::less_than(end.coerce(self.data_type), false)
                            .with_type(self.data_type),
                    ),
                    JunctionOp::And,
                );
                list
            }
        })
    }

    /// Distinct normalized values OR-ed together; nulls become one NULL test.
    fn values_condition(&self, values: &[Value]) -> ConditionList {
        let mut distinct: Vec<Value> = Vec::new();
        let mut has_null = false;
        for value in values {
            let value = value.coerce(self.data_type);
            if value.is_null() {
                has_null = true;
            } else if !distinct.contains(&value) {
                distinct.push(value);
            }
        }

        let mut list = ConditionList::new();
        for value in distinct {
            list.append(
                ConditionItem::new(
                    self.attribute.clone(),
                    Condition::equal_to(value).with_type(self.data_type),
                ),
                JunctionOp::Or,
            );
        }
        if has_null {
            list.append(
                ConditionItem::new(self.attribute.clone(), Condition::is_null()),
                JunctionOp::Or,
            );
        }
        list
    }

    /// Label of the first group whose condition accepts the row.
    pub fn assign_row<R: RowAccess + ?Sized>(&self, row: &R) -> Option<String> {
        for label in self.groups.keys() {
            let accepted = self
                .group_condition(label)
                .is_some_and(|cond| !cond.is_empty() && cond.evaluate(row));
            if accepted {
                return Some(label.clone());
            }
        }
        match self.others {
            OthersPolicy::GroupOthers => Some(OTHERS_LABEL.to_string()),
            OthersPolicy::LeaveOthers => None,
        }
    }

    /// Label for a single value of the grouped column.
    pub fn assign(&self, value: &Value) -> Option<String> {
        let mut row = HashMap::new();
        row.insert(self.attribute.attribute.clone(), value.clone());
        self.assign_row(&row)
    }

    pub fn rename_entity(&mut self, old: &str, new: &str) -> bool {
        let mut changed = self.attribute.rename_entity(old, new);
        for definition in self.groups.values_mut() {
            if let GroupDefinition::Conditions(list) = definition {
                changed |= list.rename_entity(old, new);
            }
        }
        changed
    }
}

impl VariableSupport for NamedGroupInfo {
    fn all_variables(&self) -> Vec<UserVariable> {
        let mut vars = Vec::new();
        for definition in self.groups.values() {
            if let GroupDefinition::Conditions(list) = definition {
                merge_variables(&mut vars, list.all_variables());
            }
        }
        vars
    }

    fn replace_variables(&mut self, table: &VariableTable) {
        for definition in self.groups.values_mut() {
            if let GroupDefinition::Conditions(list) = definition {
                list.replace_variables(table);
            }
        }
    }
}
