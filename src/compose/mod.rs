//! Composition rules for join and concatenation nodes.
//!
//! Operators are kept per sub-table pair. A join node only accepts join
//! kinds and is always kept fully connected, falling back to cross joins.
//! A concatenation node only accepts set kinds; its sub-tables must be
//! column compatible, and it becomes removable once fewer than two
//! sub-tables remain connected.

mod concat;
mod join;

pub use concat::merged_column_types;

use std::collections::HashMap;

use indexmap::IndexMap;
use petgraph::unionfind::UnionFind;

use crate::error::{PlanError, PlanResult};
use crate::model::{ColumnSelection, Node, NodeKind, OperatorItem, TableOperator, TablePair};

// ============================================================================
// Schema lookup
// ============================================================================

/// Projection lookup for sub-tables by node name.
pub trait SchemaLookup {
    fn columns_of(&self, node: &str) -> Option<&ColumnSelection>;
}

impl SchemaLookup for HashMap<String, ColumnSelection> {
    fn columns_of(&self, node: &str) -> Option<&ColumnSelection> {
        self.get(node)
    }
}

impl SchemaLookup for IndexMap<String, ColumnSelection> {
    fn columns_of(&self, node: &str) -> Option<&ColumnSelection> {
        self.get(node)
    }
}

// ============================================================================
// Operator algebra
// ============================================================================

/// Replace the operators between `left` and `right` with `item`.
pub fn set_operator(node: &mut Node, left: &str, right: &str, item: OperatorItem) -> PlanResult<()> {
    put_operator(node, left, right, item, true)
}

/// Add `item` after the existing operators between `left` and `right`.
pub fn add_operator(node: &mut Node, left: &str, right: &str, item: OperatorItem) -> PlanResult<()> {
    put_operator(node, left, right, item, false)
}

fn put_operator(
    node: &mut Node,
    left: &str,
    right: &str,
    item: OperatorItem,
    replace: bool,
) -> PlanResult<()> {
    let name = node.name.clone();
    let invalid_kind = || PlanError::InvalidOperatorKind {
        node: name.clone(),
        operator: item.kind.to_string(),
    };

    let (subtables, operators) = match &mut node.kind {
        NodeKind::Join(join) => {
            let spec = item.join_spec().ok_or_else(invalid_kind)?;
            if spec.needs_columns() && (item.left_column.is_none() || item.right_column.is_none()) {
                return Err(PlanError::invalid(
                    &name,
                    format!("{} between '{}' and '{}' needs a column pair", spec.as_str(), left, right),
                ));
            }
            (&join.subtables, &mut join.operators)
        }
        NodeKind::Concatenate(concat) => {
            item.set_spec().ok_or_else(invalid_kind)?;
            (&concat.subtables, &mut concat.operators)
        }
        _ => return Err(PlanError::invalid(&name, "node has no table operators")),
    };

    for table in [left, right] {
        if !subtables.iter().any(|t| t == table) {
            return Err(PlanError::invalid(&name, format!("'{}' is not a sub-table", table)));
        }
    }
    if left == right {
        return Err(PlanError::invalid(&name, "an operator needs two distinct sub-tables"));
    }

    let key = pair_key(operators, left, right).unwrap_or_else(|| TablePair::new(left, right));
    let entry = operators.entry(key).or_default();
    // Synthesized cross joins give way to the first explicit operator.
    if replace || entry.is_cross() {
        entry.items.clear();
    }
    entry.items.push(item);
    Ok(())
}

/// Remove every operator between `left` and `right`.
///
/// Returns true when the node is left under-connected and must be deleted
/// by the caller. Join nodes never are: a cross join is synthesized instead.
pub fn remove_operator(node: &mut Node, left: &str, right: &str) -> PlanResult<bool> {
    let name = node.name.clone();
    match &mut node.kind {
        NodeKind::Join(join) => Ok(join.remove_pair(left, right)),
        NodeKind::Concatenate(concat) => Ok(concat.remove_pair(left, right)),
        _ => Err(PlanError::invalid(name, "node has no table operators")),
    }
}

/// Replace the sub-tables of a composite node.
///
/// Joins get cross-join defaults between adjacent tables lacking an
/// operator. Concatenations are checked for column compatibility and get
/// UNION defaults; their projection types are widened to the merged types.
pub fn set_subtables(node: &mut Node, tables: Vec<String>, schema: &dyn SchemaLookup) -> PlanResult<()> {
    let name = node.name.clone();
    match &mut node.kind {
        NodeKind::Join(join) => {
            join.set_subtables(tables);
            Ok(())
        }
        NodeKind::Concatenate(concat) => {
            let merged = merged_column_types(&name, &tables, schema)?;
            concat.set_subtables(tables);
            widen_projection(&mut node.projection, &merged);
            Ok(())
        }
        _ => Err(PlanError::invalid(name, "node has no sub-tables")),
    }
}

/// Widen projection types to `merged`. Returns true if any type changed.
pub(crate) fn widen_projection(projection: &mut ColumnSelection, merged: &[crate::model::DataType]) -> bool {
    let mut changed = false;
    for (column, merged_type) in projection.iter_mut().filter(|c| c.visible).zip(merged) {
        let widened = column.data_type.merge(*merged_type).unwrap_or(*merged_type);
        if widened != column.data_type {
            column.data_type = widened;
            changed = true;
        }
    }
    changed
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Existing key connecting `a` and `b` in either orientation.
pub(crate) fn pair_key(
    operators: &IndexMap<TablePair, TableOperator>,
    a: &str,
    b: &str,
) -> Option<TablePair> {
    operators.keys().find(|p| p.connects(a, b)).cloned()
}

/// Rename a table in the operator keys, keeping key order.
pub(crate) fn rename_operator_keys(
    operators: &mut IndexMap<TablePair, TableOperator>,
    old: &str,
    new: &str,
) -> bool {
    if !operators.keys().any(|p| p.involves(old)) {
        return false;
    }
    let renamed = std::mem::take(operators)
        .into_iter()
        .map(|(mut pair, op)| {
            pair.rename(old, new);
            (pair, op)
        })
        .collect();
    *operators = renamed;
    true
}

/// Groups of sub-tables connected through the given operators, in
/// sub-table order.
pub(crate) fn components(
    subtables: &[String],
    operators: &IndexMap<TablePair, TableOperator>,
) -> Vec<Vec<String>> {
    let index: HashMap<&str, usize> = subtables
        .iter()
        .enumerate()
        .map(|(i, t)| (t.as_str(), i))
        .collect();
    let mut sets = UnionFind::<usize>::new(subtables.len());
    for (pair, op) in operators {
        if op.is_empty() {
            continue;
        }
        if let (Some(&l), Some(&r)) = (index.get(pair.left.as_str()), index.get(pair.right.as_str())) {
            sets.union(l, r);
        }
    }

    let mut groups: IndexMap<usize, Vec<String>> = IndexMap::new();
    for (i, table) in subtables.iter().enumerate() {
        groups.entry(sets.find(i)).or_default().push(table.clone());
    }
    groups.into_values().collect()
}
