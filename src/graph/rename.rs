//! Rename propagation.
//!
//! Renaming a node rewrites every reference to it: condition operands and
//! qualified columns, operator table keys, sub-table lists, mirror, rotate
//! and unpivot targets, variable choice tables and calculated-column
//! references. Applying `old -> new` then `new -> old` restores the
//! original node exactly.

use crate::compose::rename_operator_keys;
use crate::model::{GraphId, Node, NodeKind};

fn rename_in(list: &mut [String], old: &str, new: &str) -> bool {
    let mut changed = false;
    for name in list.iter_mut().filter(|n| *n == old) {
        *name = new.to_string();
        changed = true;
    }
    changed
}

fn rename_target(target: &mut String, old: &str, new: &str) -> bool {
    if target == old {
        *target = new.to_string();
        true
    } else {
        false
    }
}

impl Node {
    /// Rewrite references to node `old` as `new`. Mirror targets only
    /// follow the rename when they point into graph `graph`.
    pub(crate) fn rename_references(&mut self, old: &str, new: &str, graph: GraphId) -> bool {
        let mut changed = self.projection.rename_entity(old, new);
        for list in self.condition_lists_mut() {
            changed |= list.rename_entity(old, new);
        }
        if let Some(info) = &mut self.group_spec {
            changed |= info.rename_entity(old, new);
        }
        if let Some(sort) = &mut self.sort_spec {
            changed |= sort.rename_entity(old, new);
        }

        changed |= match &mut self.kind {
            NodeKind::Bound(bound) => rename_in(&mut bound.scripted_refs, old, new),
            NodeKind::Join(join) => {
                rename_in(&mut join.subtables, old, new)
                    | rename_operator_keys(&mut join.operators, old, new)
            }
            NodeKind::Concatenate(concat) => {
                rename_in(&mut concat.subtables, old, new)
                    | rename_operator_keys(&mut concat.operators, old, new)
            }
            NodeKind::Mirror(mirror) if mirror.target.is_local_to(graph) => {
                rename_target(&mut mirror.target.node, old, new)
            }
            NodeKind::Rotate(rotate) => rename_target(&mut rotate.target, old, new),
            NodeKind::Unpivot(unpivot) => rename_target(&mut unpivot.target, old, new),
            NodeKind::Mirror(_) | NodeKind::Embedded(_) | NodeKind::DataInline(_) => false,
        };
        changed
    }
}
