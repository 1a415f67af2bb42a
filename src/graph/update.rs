//! Validity and update protocol.
//!
//! Nodes move `Built -> Updated -> Valid | Invalid`. [`update`] re-resolves
//! references and reports staleness as a boolean; [`check_validity`] checks
//! structure and reports problems as typed errors.

use std::sync::Arc;

use indexmap::IndexMap;

use super::dependency::local_targets;
use super::mirror::{resolve, sync_mirror, PlanCatalog};
use crate::compose::{merged_column_types, widen_projection, SchemaLookup};
use crate::error::{PlanError, PlanResult};
use crate::model::{
    ColumnSelection, GraphId, JoinTable, Node, NodeKind, NodeState, OperatorItem, TableOperator,
    TablePair,
};

/// Read access to the rest of the graph while one node is checked.
pub(crate) struct Resolver<'a> {
    pub(crate) graph: GraphId,
    pub(crate) nodes: &'a IndexMap<String, Arc<Node>>,
    pub(crate) catalog: Option<&'a dyn PlanCatalog>,
}

impl Resolver<'_> {
    fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }
}

impl SchemaLookup for Resolver<'_> {
    fn columns_of(&self, node: &str) -> Option<&ColumnSelection> {
        self.nodes.get(node).map(|n| &n.projection)
    }
}

// ============================================================================
// Update
// ============================================================================

/// Re-resolve every reference of `node` against the graph.
///
/// Returns false when a referenced node is gone; the caller decides whether
/// to drop or repair the node. Auto-updating mirrors re-sync their columns
/// and concatenations widen their column types to the merged sub-table types.
pub(crate) fn update(node: &mut Node, ctx: &Resolver<'_>) -> bool {
    let mut resolved = true;

    for target in local_targets(node, ctx.graph) {
        if !ctx.contains(&target) {
            tracing::warn!(node = %node.name, reference = %target, "unresolved reference");
            resolved = false;
        }
    }

    let mirror_target = match &node.kind {
        NodeKind::Mirror(mirror) => Some(mirror.target.clone()),
        _ => None,
    };
    if let Some(target_ref) = mirror_target {
        match resolve(&target_ref, ctx.graph, ctx.nodes, ctx.catalog) {
            Some(target) => {
                sync_mirror(node, &target);
            }
            None => {
                if !target_ref.is_local_to(ctx.graph) {
                    tracing::warn!(
                        node = %node.name,
                        reference = %target_ref.node,
                        "mirror target not found in catalog"
                    );
                }
                resolved = false;
            }
        }
    }

    if let NodeKind::Concatenate(concat) = &node.kind {
        if let Ok(merged) = merged_column_types(&node.name, concat.subtables(), ctx) {
            if widen_projection(&mut node.projection, &merged) {
                tracing::debug!(node = %node.name, "concatenation column types widened");
            }
        }
    }

    node.set_state(if resolved {
        NodeState::Updated
    } else {
        NodeState::Invalid
    });
    resolved
}

// ============================================================================
// Validity
// ============================================================================

/// Check the node's structure against the graph.
///
/// With `check_cross_joins` a join pair whose every operator lost its
/// columns is reported as [`PlanError::CrossJoinDetected`] so the caller can
/// confirm; without it the same pair is reported as an invalid node.
pub(crate) fn check_validity(node: &mut Node, ctx: &Resolver<'_>, check_cross_joins: bool) -> PlanResult<()> {
    let result = validate(node, ctx, check_cross_joins);
    node.set_state(if result.is_ok() {
        NodeState::Valid
    } else {
        NodeState::Invalid
    });
    result
}

fn validate(node: &Node, ctx: &Resolver<'_>, check_cross_joins: bool) -> PlanResult<()> {
    let name = node.name();

    if local_targets(node, ctx.graph).contains(name) {
        return Err(PlanError::cycle([name, name]));
    }

    for list in node.condition_lists() {
        if !list.is_well_formed() {
            return Err(PlanError::invalid(name, "condition list is not well formed"));
        }
    }

    match &node.kind {
        NodeKind::Bound(bound) => {
            if bound.source.is_empty() {
                return Err(PlanError::invalid(name, "no data source set"));
            }
        }
        NodeKind::Embedded(table) => {
            if let Some(row) = table.ragged_row() {
                return Err(PlanError::invalid(
                    name,
                    format!("row {} does not match the {} schema columns", row, table.schema.len()),
                ));
            }
        }
        NodeKind::DataInline(inline) => {
            let width = node.projection.len();
            if let Some(row) = inline.rows.iter().position(|r| r.len() != width) {
                return Err(PlanError::invalid(
                    name,
                    format!("row {} does not match the {} projected columns", row, width),
                ));
            }
        }
        NodeKind::Join(join) => {
            require_subtables(name, join.subtables(), ctx)?;
            let broken = broken_pairs(join, ctx);
            if check_cross_joins {
                if let Some(b) = broken.iter().find(|b| b.all_broken) {
                    return Err(PlanError::CrossJoinDetected {
                        left: b.pair.left.clone(),
                        right: b.pair.right.clone(),
                        operator: b.operator.clone(),
                    });
                }
            }
            if let Some(b) = broken.first() {
                return Err(PlanError::invalid(
                    name,
                    format!("join columns missing for pair '{}'", b.pair),
                ));
            }
        }
        NodeKind::Concatenate(concat) => {
            require_subtables(name, concat.subtables(), ctx)?;
            merged_column_types(name, concat.subtables(), ctx)?;
        }
        NodeKind::Mirror(mirror) => {
            if mirror.target.node.is_empty() {
                return Err(PlanError::invalid(name, "no mirror target set"));
            }
            if mirror.target.is_local_to(ctx.graph) && !ctx.contains(&mirror.target.node) {
                return Err(unresolved(name, &mirror.target.node));
            }
        }
        NodeKind::Rotate(rotate) => {
            if !ctx.contains(&rotate.target) {
                return Err(unresolved(name, &rotate.target));
            }
        }
        NodeKind::Unpivot(unpivot) => {
            let target = ctx
                .nodes
                .get(&unpivot.target)
                .ok_or_else(|| unresolved(name, &unpivot.target))?;
            let width = target.projection.public_len();
            if unpivot.header_column_count == 0 || unpivot.header_column_count >= width {
                return Err(PlanError::invalid(
                    name,
                    format!(
                        "header column count {} must be between 1 and {}",
                        unpivot.header_column_count,
                        width.saturating_sub(1)
                    ),
                ));
            }
        }
    }

    Ok(())
}

fn unresolved(node: &str, reference: &str) -> PlanError {
    PlanError::UnresolvedReference {
        node: node.to_string(),
        reference: reference.to_string(),
    }
}

fn require_subtables(node: &str, tables: &[String], ctx: &Resolver<'_>) -> PlanResult<()> {
    if tables.len() < 2 {
        return Err(PlanError::invalid(node, "needs at least two sub-tables"));
    }
    match tables.iter().find(|t| !ctx.contains(t)) {
        Some(missing) => Err(unresolved(node, missing)),
        None => Ok(()),
    }
}

// ============================================================================
// Join column checks
// ============================================================================

/// Operators of one pair whose columns are missing from the sub-tables.
pub(crate) struct BrokenPair {
    pub(crate) pair: TablePair,
    /// Indices of the broken operator items.
    pub(crate) items: Vec<usize>,
    /// Every item of the pair is broken: the pair degrades to a cross join.
    pub(crate) all_broken: bool,
    pub(crate) operator: String,
}

fn has_column(schema: &dyn SchemaLookup, table: &str, column: Option<&str>) -> bool {
    match (schema.columns_of(table), column) {
        (Some(columns), Some(column)) => columns.find(None, column).is_some(),
        _ => false,
    }
}

pub(crate) fn broken_pairs(join: &JoinTable, schema: &dyn SchemaLookup) -> Vec<BrokenPair> {
    let mut out = Vec::new();
    for (pair, op) in join.operators() {
        if op.is_cross() {
            continue;
        }
        let items: Vec<usize> = op
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| {
                item.join_spec().is_some_and(|s| s.needs_columns())
                    && !(has_column(schema, &pair.left, item.left_column.as_deref())
                        && has_column(schema, &pair.right, item.right_column.as_deref()))
            })
            .map(|(i, _)| i)
            .collect();
        if items.is_empty() {
            continue;
        }
        let operator = op
            .first_kind()
            .map(|k| k.to_string())
            .unwrap_or_default();
        out.push(BrokenPair {
            pair: pair.clone(),
            all_broken: items.len() == op.items.len(),
            items,
            operator,
        });
    }
    out
}

/// Drop the join's broken operator items; pairs left without an operator
/// become explicit cross joins. Returns true if anything changed.
pub(crate) fn degrade_broken_joins(node: &mut Node, schema: &dyn SchemaLookup) -> bool {
    let name = node.name.clone();
    let NodeKind::Join(join) = &mut node.kind else {
        return false;
    };
    let broken = broken_pairs(join, schema);
    for b in &broken {
        let Some(op) = join.operator_mut(&b.pair.left, &b.pair.right) else {
            continue;
        };
        if b.all_broken {
            tracing::warn!(node = %name, pair = %b.pair, operator = %b.operator, "join degraded to cross join");
            *op = TableOperator::single(OperatorItem::cross());
        } else {
            for index in b.items.iter().rev() {
                op.items.remove(*index);
            }
            tracing::warn!(node = %name, pair = %b.pair, dropped = b.items.len(), "join operators dropped");
        }
    }
    !broken.is_empty()
}
