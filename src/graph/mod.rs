//! The plan graph.
//!
//! A [`PlanGraph`] owns its nodes by name, in insertion order. Nodes are
//! shared through `Arc` so a [`PlanSnapshot`] taken before an edit stays
//! valid for readers while the writer keeps editing: every mutation works on
//! a private copy of the nodes it touches and is committed only after the
//! dependency graph has been re-checked for cycles.

mod cycle;
mod dependency;
pub mod mirror;
mod rename;
mod update;

pub use cycle::DependencyGraph;
pub use dependency::{augmented_dependents_of, dependents_of, AssemblyRef, DependencyType, EdgeType};
pub use mirror::{MapCatalog, PlanCatalog};

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::compose::{self, SchemaLookup};
use crate::error::{PlanError, PlanResult};
use crate::model::{ColumnSelection, GraphId, Node, NodeKind, NodeState};
use dependency::local_targets;
use update::Resolver;

// ============================================================================
// Options
// ============================================================================

/// Graph-wide validation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Report joins degraded to cross joins instead of accepting them.
    pub check_cross_joins: bool,
    pub max_nodes: usize,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            check_cross_joins: true,
            max_nodes: 10_000,
        }
    }
}

/// Outcome of [`PlanGraph::update_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Nodes whose references no longer resolve.
    pub stale: Vec<String>,
    /// Nodes whose content changed while updating.
    pub changed: Vec<String>,
}

// ============================================================================
// Snapshot
// ============================================================================

/// Immutable view of a graph at one point in time.
#[derive(Debug, Clone)]
pub struct PlanSnapshot {
    id: GraphId,
    name: String,
    nodes: IndexMap<String, Arc<Node>>,
}

impl PlanSnapshot {
    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name).map(Arc::as_ref)
    }

    pub fn get_shared(&self, name: &str) -> Option<Arc<Node>> {
        self.nodes.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ============================================================================
// Plan graph
// ============================================================================

#[derive(Clone)]
pub struct PlanGraph {
    id: GraphId,
    name: String,
    nodes: IndexMap<String, Arc<Node>>,
    options: ValidationOptions,
    catalog: Option<Arc<dyn PlanCatalog>>,
}

impl fmt::Debug for PlanGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanGraph")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl PlanGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(GraphId::new(), name)
    }

    pub fn with_id(id: GraphId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            nodes: IndexMap::new(),
            options: ValidationOptions::default(),
            catalog: None,
        }
    }

    pub fn with_options(mut self, options: ValidationOptions) -> Self {
        self.options = options;
        self
    }

    /// Catalog used to resolve mirrors of nodes in other graphs.
    pub fn with_catalog(mut self, catalog: Arc<dyn PlanCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> ValidationOptions {
        self.options
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name).map(Arc::as_ref)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Share the current nodes with readers.
    pub fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            id: self.id,
            name: self.name.clone(),
            nodes: self.nodes.clone(),
        }
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver {
            graph: self.id,
            nodes: &self.nodes,
            catalog: self.catalog.as_deref(),
        }
    }

    fn require(&self, name: &str) -> PlanResult<&Node> {
        self.get(name)
            .ok_or_else(|| PlanError::UnknownNode(name.to_string()))
    }

    // ------------------------------------------------------------------------
    // Structural edits
    // ------------------------------------------------------------------------

    /// Add a node. Rejected if the name is taken or the node closes a cycle.
    pub fn add_node(&mut self, node: Node) -> PlanResult<()> {
        if self.contains(node.name()) {
            return Err(PlanError::DuplicateNode(node.name().to_string()));
        }
        if self.nodes.len() >= self.options.max_nodes {
            return Err(PlanError::invalid(
                node.name(),
                format!("graph already holds the maximum of {} nodes", self.options.max_nodes),
            ));
        }

        let deps = DependencyGraph::build(self.iter().chain(std::iter::once(&node)), self.id);
        if let Some(cycle) = deps.cycle_through(node.name()) {
            return Err(PlanError::cycle(cycle));
        }

        tracing::debug!(graph = %self.name, node = %node.name(), kind = node.tag(), "node added");
        self.nodes.insert(node.name().to_string(), Arc::new(node));
        Ok(())
    }

    /// Remove a node and update its dependers. Returns the dependers left
    /// with unresolved references.
    pub fn remove_node(&mut self, name: &str) -> PlanResult<Vec<String>> {
        self.require(name)?.ensure_editable()?;
        let dependers = self.dependers_of(name);
        self.nodes.shift_remove(name);
        tracing::debug!(graph = %self.name, node = %name, "node removed");

        let mut stale = Vec::new();
        for depender in dependers {
            let Some(current) = self.nodes.get(&depender) else {
                continue;
            };
            let mut staged = Node::clone(current);
            if !update::update(&mut staged, &self.resolver()) {
                stale.push(depender.clone());
            }
            self.nodes.insert(depender, Arc::new(staged));
        }
        Ok(stale)
    }

    /// Edit one node on a private copy and commit it if the graph stays
    /// acyclic. Read-only nodes are rejected before `f` runs.
    pub fn mutate<F>(&mut self, name: &str, f: F) -> PlanResult<()>
    where
        F: FnOnce(&mut Node) -> PlanResult<()>,
    {
        let current = self.require(name)?;
        current.ensure_editable()?;
        let mut staged = current.clone();
        f(&mut staged)?;
        self.commit(name, staged)
    }

    fn commit(&mut self, name: &str, mut staged: Node) -> PlanResult<()> {
        // The key stays stable; renames go through `rename_node`.
        staged.name = name.to_string();

        let deps = DependencyGraph::build(
            self.nodes
                .iter()
                .map(|(key, node)| if key == name { &staged } else { node.as_ref() }),
            self.id,
        );
        if let Some(cycle) = deps.cycle_through(name) {
            tracing::debug!(node = %name, ?cycle, "edit rejected: dependency cycle");
            return Err(PlanError::cycle(cycle));
        }

        staged.set_state(NodeState::Built);
        self.nodes.insert(name.to_string(), Arc::new(staged));
        tracing::debug!(graph = %self.name, node = %name, "edit committed");
        Ok(())
    }

    /// Rename a node and every reference to it.
    ///
    /// The staged graph is checked for cycles before names are checked for
    /// uniqueness, so a rename that would make a node depend on itself is
    /// reported as a cycle.
    pub fn rename_node(&mut self, old: &str, new: &str) -> PlanResult<()> {
        self.require(old)?.ensure_editable()?;
        if old == new {
            return Ok(());
        }

        let staged: Vec<(String, Arc<Node>)> = self
            .nodes
            .iter()
            .map(|(key, shared)| {
                let mut node = Node::clone(shared);
                let mut changed = node.rename_references(old, new, self.id);
                if key == old {
                    node.name = new.to_string();
                    changed = true;
                }
                let key = if key == old { new.to_string() } else { key.clone() };
                let shared = if changed { Arc::new(node) } else { Arc::clone(shared) };
                (key, shared)
            })
            .collect();

        let deps = DependencyGraph::build(staged.iter().map(|(_, n)| n.as_ref()), self.id);
        if let Some(cycle) = deps.cycle_through(new) {
            return Err(PlanError::cycle(cycle));
        }
        if self.contains(new) {
            return Err(PlanError::DuplicateNode(new.to_string()));
        }

        self.nodes = staged.into_iter().collect();
        tracing::debug!(graph = %self.name, old, new, "node renamed");

        for node in self.nodes.values() {
            for target in local_targets(node, self.id) {
                if !self.nodes.contains_key(&target) {
                    tracing::warn!(node = %node.name(), reference = %target, "unresolved reference after rename");
                }
            }
        }
        Ok(())
    }

    /// Replace a node's projection.
    ///
    /// Joins reading the node are checked for operators whose columns
    /// disappear. With `check_cross_joins` a join that would fall back to a
    /// cross join is reported as [`PlanError::CrossJoinDetected`] and nothing
    /// changes; without it the broken operators are dropped and the affected
    /// pairs become explicit cross joins.
    pub fn set_projection(
        &mut self,
        name: &str,
        projection: ColumnSelection,
        check_cross_joins: bool,
    ) -> PlanResult<()> {
        let current = self.require(name)?;
        current.ensure_projection_editable()?;
        let mut staged = current.clone();
        staged.projection = projection;

        let mut schema: IndexMap<String, ColumnSelection> = self
            .nodes
            .iter()
            .map(|(k, n)| (k.clone(), n.projection.clone()))
            .collect();
        schema.insert(name.to_string(), staged.projection.clone());

        let mut degraded = Vec::new();
        for depender in self.dependers_of(name) {
            let Some(join) = self.get(&depender).and_then(Node::as_join) else {
                continue;
            };
            let before = update::broken_pairs(join, self as &dyn SchemaLookup).len();
            let broken = update::broken_pairs(join, &schema);
            if broken.len() <= before {
                continue;
            }
            if check_cross_joins {
                if let Some(b) = broken.iter().find(|b| b.all_broken) {
                    return Err(PlanError::CrossJoinDetected {
                        left: b.pair.left.clone(),
                        right: b.pair.right.clone(),
                        operator: b.operator.clone(),
                    });
                }
            }
            let mut join_node = self.require(&depender)?.clone();
            update::degrade_broken_joins(&mut join_node, &schema);
            degraded.push(join_node);
        }

        self.commit(name, staged)?;
        for join_node in degraded {
            let key = join_node.name().to_string();
            self.commit(&key, join_node)?;
        }
        Ok(())
    }

    /// Replace the sub-tables of a join or concatenation.
    pub fn set_subtables(&mut self, name: &str, tables: Vec<String>) -> PlanResult<()> {
        let current = self.require(name)?;
        current.ensure_editable()?;
        let mut staged = current.clone();
        compose::set_subtables(&mut staged, tables, self)?;
        self.commit(name, staged)
    }

    /// Remove the operators between two sub-tables. A concatenation left
    /// with fewer than two connected sub-tables is removed from the graph;
    /// the return value tells whether that happened.
    pub fn remove_operator(&mut self, name: &str, left: &str, right: &str) -> PlanResult<bool> {
        let current = self.require(name)?;
        current.ensure_editable()?;
        let mut staged = current.clone();
        if compose::remove_operator(&mut staged, left, right)? {
            self.remove_node(name)?;
            return Ok(true);
        }
        self.commit(name, staged)?;
        Ok(false)
    }

    // ------------------------------------------------------------------------
    // Dependencies
    // ------------------------------------------------------------------------

    pub fn dependents_of(&self, name: &str) -> PlanResult<IndexSet<AssemblyRef>> {
        Ok(dependents_of(self.require(name)?, self.id))
    }

    pub fn augmented_dependents_of(
        &self,
        name: &str,
    ) -> PlanResult<IndexMap<String, BTreeSet<DependencyType>>> {
        Ok(augmented_dependents_of(self.require(name)?, self.id))
    }

    /// Nodes that reference `name`, in graph order.
    pub fn dependers_of(&self, name: &str) -> Vec<String> {
        self.nodes
            .values()
            .filter(|n| local_targets(n, self.id).contains(name))
            .map(|n| n.name().to_string())
            .collect()
    }

    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::build(self.iter(), self.id)
    }

    /// Fail if any chain of dependencies leads from `name` back to itself.
    pub fn check_acyclic(&self, name: &str) -> PlanResult<()> {
        self.require(name)?;
        match self.dependency_graph().cycle_through(name) {
            Some(cycle) => Err(PlanError::cycle(cycle)),
            None => Ok(()),
        }
    }

    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        self.dependency_graph().cycles()
    }

    /// Node names with every dependency before its dependers.
    pub fn topological_order(&self) -> PlanResult<Vec<String>> {
        self.dependency_graph().evaluation_order().map_err(|node| {
            let deps = self.dependency_graph();
            PlanError::cycle(deps.cycle_through(&node).unwrap_or_else(|| vec![node]))
        })
    }

    // ------------------------------------------------------------------------
    // Validity
    // ------------------------------------------------------------------------

    /// Re-resolve every node, children first.
    pub fn update_all(&mut self) -> UpdateReport {
        let order = self
            .topological_order()
            .unwrap_or_else(|_| self.nodes.keys().cloned().collect());
        let mut report = UpdateReport::default();
        for name in order {
            let Some(current) = self.nodes.get(&name) else {
                continue;
            };
            let mut staged = Node::clone(current);
            if !update::update(&mut staged, &self.resolver()) {
                report.stale.push(name.clone());
            }
            let mut before = Node::clone(current);
            before.set_state(staged.state());
            if before != staged {
                report.changed.push(name.clone());
            }
            self.nodes.insert(name, Arc::new(staged));
        }
        report
    }

    /// Check one node; its state becomes `Valid` or `Invalid`.
    pub fn check_validity(&mut self, name: &str) -> PlanResult<()> {
        let mut staged = self.require(name)?.clone();
        let result = update::check_validity(&mut staged, &self.resolver(), self.options.check_cross_joins);
        self.nodes.insert(name.to_string(), Arc::new(staged));
        result
    }

    /// Check every node and every cycle. Returns the problems found.
    pub fn validate_all(&mut self) -> Vec<(String, PlanError)> {
        let mut problems = Vec::new();
        for cycle in self.detect_cycles() {
            if let Some(first) = cycle.first() {
                problems.push((first.clone(), PlanError::cycle(cycle.clone())));
            }
        }
        let names: Vec<String> = self.nodes.keys().cloned().collect();
        for name in names {
            if let Err(err) = self.check_validity(&name) {
                problems.push((name, err));
            }
        }
        problems
    }

    /// Whether an auto-updating mirror is behind its target.
    pub fn is_mirror_stale(&self, name: &str) -> PlanResult<bool> {
        let node = self.require(name)?;
        let NodeKind::Mirror(m) = &node.kind else {
            return Ok(false);
        };
        let target = mirror::resolve(&m.target, self.id, &self.nodes, self.catalog.as_deref())
            .ok_or_else(|| PlanError::UnresolvedReference {
                node: name.to_string(),
                reference: m.target.node.clone(),
            })?;
        Ok(mirror::is_stale(node, &target))
    }
}

impl SchemaLookup for PlanGraph {
    fn columns_of(&self, node: &str) -> Option<&ColumnSelection> {
        self.get(node).map(|n| &n.projection)
    }
}
