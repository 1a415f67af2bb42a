//! Condition lists, ranking and date-range conditions, and named groups.
//!
//! A [`ConditionList`] is an infix expression: items sit at even positions
//! and AND/OR junctions at odd positions, so a well-formed list always has an
//! odd length (or is empty). Each junction carries a nesting level; a higher
//! level binds tighter, and junctions on the same level fold left to right.
//!
//! ```text
//! [ a ] AND(0) [ b ] OR(1) [ c ]      =>   a AND (b OR c)
//! [ a ] AND(0) [ b ] OR(0) [ c ]      =>   (a AND b) OR c
//! ```

mod date_range;
mod group;
mod item;
mod ranking;

pub use date_range::{DateRange, DateRangeCondition, DateUnit};
pub use group::{GroupDefinition, NamedGroupInfo, OthersPolicy, OTHERS_LABEL};
pub use item::{
    Condition, ConditionItem, ConditionKind, ConditionOp, ConditionValue, SubqueryValue,
};
pub use ranking::{RankingCondition, RankingN, RankingOrder};

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::model::{merge_variables, ColumnRef, UserVariable, Value, VariableSupport, VariableTable};

// ============================================================================
// Row access
// ============================================================================

/// Read access to the cells of one row, used by condition evaluation.
pub trait RowAccess {
    /// Value of the referenced column, if the row has it.
    fn value_of(&self, column: &ColumnRef) -> Option<Value>;
}

/// Look a column up by qualified `entity.attribute` first, then by name.
fn lookup<'a, F>(column: &ColumnRef, get: F) -> Option<Value>
where
    F: Fn(&str) -> Option<&'a Value>,
{
    if let Some(entity) = &column.entity {
        if let Some(v) = get(&format!("{}.{}", entity, column.attribute)) {
            return Some(v.clone());
        }
    }
    get(&column.attribute)
        .or_else(|| column.alias.as_deref().and_then(&get))
        .cloned()
}

impl RowAccess for HashMap<String, Value> {
    fn value_of(&self, column: &ColumnRef) -> Option<Value> {
        lookup(column, |k| self.get(k))
    }
}

impl RowAccess for IndexMap<String, Value> {
    fn value_of(&self, column: &ColumnRef) -> Option<Value> {
        lookup(column, |k| self.get(k))
    }
}

// ============================================================================
// Condition list
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JunctionOp {
    And,
    Or,
}

impl fmt::Display for JunctionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JunctionOp::And => f.write_str("AND"),
            JunctionOp::Or => f.write_str("OR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Junction {
    pub op: JunctionOp,
    pub level: usize,
}

impl Junction {
    pub fn new(op: JunctionOp) -> Self {
        Self { op, level: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionEntry {
    Item(ConditionItem),
    Junction(Junction),
}

/// Infix list of condition items separated by junctions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionList {
    entries: Vec<ConditionEntry>,
}

impl ConditionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from items all joined by the same junction.
    pub fn joined(items: Vec<ConditionItem>, op: JunctionOp) -> Self {
        let mut list = Self::new();
        for item in items {
            list.append(item, op);
        }
        list
    }

    /// Build from raw entries, rejecting malformed alternation.
    pub fn from_entries(entries: Vec<ConditionEntry>) -> Option<Self> {
        let list = Self { entries };
        list.is_well_formed().then_some(list)
    }

    pub fn entries(&self) -> &[ConditionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.entries.len().div_ceil(2)
    }

    /// Append an item, joined to the previous one by `op` (ignored when empty).
    pub fn append(&mut self, item: ConditionItem, op: JunctionOp) {
        if !self.entries.is_empty() {
            self.entries.push(ConditionEntry::Junction(Junction::new(op)));
        }
        self.entries.push(ConditionEntry::Item(item));
    }

    /// Append another list as one nested group, joined by `op`.
    ///
    /// Junctions of the appended list are raised one level above the joining
    /// junction so the group binds tighter than `op`.
    pub fn append_group(&mut self, other: &ConditionList, op: JunctionOp) {
        if other.is_empty() {
            return;
        }
        if !self.entries.is_empty() {
            self.entries.push(ConditionEntry::Junction(Junction::new(op)));
        }
        for entry in &other.entries {
            self.entries.push(match entry {
                ConditionEntry::Junction(j) => ConditionEntry::Junction(Junction {
                    op: j.op,
                    level: j.level + 1,
                }),
                item => item.clone(),
            });
        }
    }

    /// `self AND other`, each side kept as its own group.
    pub fn and(&self, other: &ConditionList) -> ConditionList {
        let mut result = ConditionList::new();
        result.append_group(self, JunctionOp::And);
        result.append_group(other, JunctionOp::And);
        result
    }

    pub fn item(&self, index: usize) -> Option<&ConditionItem> {
        match self.entries.get(index * 2)? {
            ConditionEntry::Item(item) => Some(item),
            ConditionEntry::Junction(_) => None,
        }
    }

    pub fn junction(&self, index: usize) -> Option<&Junction> {
        match self.entries.get(index * 2 + 1)? {
            ConditionEntry::Junction(j) => Some(j),
            ConditionEntry::Item(_) => None,
        }
    }

    pub fn items(&self) -> impl Iterator<Item = &ConditionItem> {
        self.entries.iter().filter_map(|e| match e {
            ConditionEntry::Item(item) => Some(item),
            ConditionEntry::Junction(_) => None,
        })
    }

    pub fn items_mut(&mut self) -> impl Iterator<Item = &mut ConditionItem> {
        self.entries.iter_mut().filter_map(|e| match e {
            ConditionEntry::Item(item) => Some(item),
            ConditionEntry::Junction(_) => None,
        })
    }

    /// Remove the item at `index` and the junction that tied it in.
    pub fn remove_item(&mut self, index: usize) -> Option<ConditionItem> {
        let pos = index * 2;
        if pos >= self.entries.len() {
            return None;
        }
        let removed = self.entries.remove(pos);
        if pos > 0 {
            // Junction before the item.
            self.entries.remove(pos - 1);
        } else if !self.entries.is_empty() {
            // First item: drop the junction that followed it.
            self.entries.remove(0);
        }
        match removed {
            ConditionEntry::Item(item) => Some(item),
            ConditionEntry::Junction(_) => None,
        }
    }

    /// Change the nesting level of the junction at `index`.
    pub fn set_level(&mut self, index: usize, level: usize) -> bool {
        match self.entries.get_mut(index * 2 + 1) {
            Some(ConditionEntry::Junction(j)) => {
                j.level = level;
                true
            }
            _ => false,
        }
    }

    /// Drop leading/trailing junctions and collapse adjacent duplicates so the
    /// list is well formed again after bulk edits.
    pub fn trim(&mut self) {
        let mut out: Vec<ConditionEntry> = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            let is_junction = matches!(entry, ConditionEntry::Junction(_));
            let after_item = matches!(out.last(), Some(ConditionEntry::Item(_)));
            match (is_junction, after_item) {
                (true, false) => {}
                (false, true) => {
                    out.push(ConditionEntry::Junction(Junction::new(JunctionOp::And)));
                    out.push(entry);
                }
                _ => out.push(entry),
            }
        }
        if matches!(out.last(), Some(ConditionEntry::Junction(_))) {
            out.pop();
        }
        self.entries = out;
    }

    /// Items at even positions, junctions at odd positions, odd length.
    pub fn is_well_formed(&self) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        self.entries.len() % 2 == 1
            && self.entries.iter().enumerate().all(|(i, e)| match e {
                ConditionEntry::Item(_) => i % 2 == 0,
                ConditionEntry::Junction(_) => i % 2 == 1,
            })
    }

    /// Evaluate against one row. An empty list accepts every row.
    pub fn evaluate<R: RowAccess + ?Sized>(&self, row: &R) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        self.eval_range(row, 0, self.item_count() - 1)
    }

    /// Evaluate items `lo..=hi` by splitting at the loosest junction.
    fn eval_range<R: RowAccess + ?Sized>(&self, row: &R, lo: usize, hi: usize) -> bool {
        if lo == hi {
            return self.item(lo).is_some_and(|item| item.evaluate(row));
        }

        // Lowest level binds loosest; the rightmost of equal levels gives a
        // left fold.
        let mut split = lo;
        let mut split_level = usize::MAX;
        for k in lo..hi {
            let level = self.junction(k).map(|j| j.level).unwrap_or(0);
            if level <= split_level {
                split = k;
                split_level = level;
            }
        }
        let op = self.junction(split).map(|j| j.op).unwrap_or(JunctionOp::And);

        let left = self.eval_range(row, lo, split);
        match op {
            JunctionOp::And if !left => false,
            JunctionOp::Or if left => true,
            _ => self.eval_range(row, split + 1, hi),
        }
    }

    /// Rewrite references to a renamed node. Returns true if anything changed.
    pub fn rename_entity(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        for item in self.items_mut() {
            changed |= item.rename_entity(old, new);
        }
        changed
    }

    /// Nodes referenced by sub-query operands.
    pub fn subquery_nodes(&self) -> Vec<&str> {
        self.items().flat_map(|i| i.subquery_nodes()).collect()
    }

    /// Ranking items in this list.
    pub fn rankings(&self) -> impl Iterator<Item = (&ColumnRef, &RankingCondition)> {
        self.items().filter_map(|item| match &item.condition {
            ConditionKind::Ranking(r) => Some((&item.attribute, r)),
            _ => None,
        })
    }
}

impl VariableSupport for ConditionList {
    fn all_variables(&self) -> Vec<UserVariable> {
        let mut vars = Vec::new();
        for item in self.items() {
            merge_variables(&mut vars, item.all_variables());
        }
        vars
    }

    fn replace_variables(&mut self, table: &VariableTable) {
        for item in self.items_mut() {
            item.replace_variables(table);
        }
    }
}
