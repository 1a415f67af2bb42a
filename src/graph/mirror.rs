//! Mirror resolution across graphs.
//!
//! A mirror names its target weakly: an optional graph id plus a node name.
//! Targets in the mirror's own graph resolve through that graph; anything
//! else goes through a [`PlanCatalog`] supplied by the caller.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use super::PlanSnapshot;
use crate::content::ContentKey;
use crate::model::{ColumnRef, ColumnSelection, GraphId, MirrorTarget, Node, NodeKind};

/// Lookup service for nodes of other graphs.
pub trait PlanCatalog: Send + Sync {
    fn lookup(&self, graph: GraphId, node: &str) -> Option<Arc<Node>>;
}

/// Catalog over in-memory graph snapshots.
#[derive(Debug, Clone, Default)]
pub struct MapCatalog {
    graphs: HashMap<GraphId, PlanSnapshot>,
}

impl MapCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, snapshot: PlanSnapshot) {
        self.graphs.insert(snapshot.id(), snapshot);
    }

    pub fn remove(&mut self, graph: GraphId) -> Option<PlanSnapshot> {
        self.graphs.remove(&graph)
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}

impl PlanCatalog for MapCatalog {
    fn lookup(&self, graph: GraphId, node: &str) -> Option<Arc<Node>> {
        self.graphs.get(&graph)?.get_shared(node)
    }
}

/// Resolve a mirror target from the point of view of graph `own`.
pub fn resolve(
    target: &MirrorTarget,
    own: GraphId,
    local: &IndexMap<String, Arc<Node>>,
    catalog: Option<&dyn PlanCatalog>,
) -> Option<Arc<Node>> {
    match target.graph {
        Some(graph) if graph != own => catalog?.lookup(graph, &target.node),
        _ => local.get(&target.node).cloned(),
    }
}

/// Columns a mirror of `target` exposes: the target's visible columns,
/// qualified by the target name.
pub fn mirrored_projection(target: &Node) -> ColumnSelection {
    target
        .projection
        .public_columns()
        .map(|c| ColumnRef::qualified(target.name(), c.name()).with_type(c.data_type))
        .collect()
}

/// Copy the target's columns into an auto-updating mirror and record the
/// target's content key. Returns true if the projection changed.
pub fn sync_mirror(node: &mut Node, target: &Node) -> bool {
    let NodeKind::Mirror(mirror) = &mut node.kind else {
        return false;
    };
    if !mirror.auto_update {
        return false;
    }
    mirror.last_synced_key = Some(target.content_digest());

    let projection = mirrored_projection(target);
    if projection == node.projection {
        return false;
    }
    tracing::debug!(mirror = %node.name, target = %target.name(), "mirror columns synced");
    node.projection = projection;
    true
}

/// Whether the target changed since the mirror last synced with it.
pub fn is_stale(node: &Node, target: &Node) -> bool {
    match &node.kind {
        NodeKind::Mirror(mirror) => {
            mirror.last_synced_key.as_deref() != Some(target.content_digest().as_str())
        }
        _ => false,
    }
}
