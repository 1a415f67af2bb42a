//! Cycle detection over node dependencies.
//!
//! Edges point from a node to the nodes it depends on. Names may repeat
//! while a rename is staged, so every node occupies its own vertex and name
//! lookups fan out to all vertices carrying that name.

use std::collections::HashMap;

use petgraph::algo::{astar, tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};

use super::dependency::local_targets;
use crate::model::{GraphId, Node};

pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    by_name: HashMap<String, Vec<NodeIndex>>,
}

impl DependencyGraph {
    pub fn build<'a>(nodes: impl IntoIterator<Item = &'a Node>, graph_id: GraphId) -> Self {
        let nodes: Vec<&Node> = nodes.into_iter().collect();
        let mut graph = DiGraph::new();
        let mut by_name: HashMap<String, Vec<NodeIndex>> = HashMap::new();

        let indices: Vec<NodeIndex> = nodes
            .iter()
            .map(|node| {
                let idx = graph.add_node(node.name().to_string());
                by_name.entry(node.name().to_string()).or_default().push(idx);
                idx
            })
            .collect();

        for (node, &from) in nodes.iter().zip(&indices) {
            for target in local_targets(node, graph_id) {
                if let Some(targets) = by_name.get(&target) {
                    for &to in targets {
                        graph.update_edge(from, to, ());
                    }
                }
            }
        }

        Self { graph, by_name }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// A path from `name` back to itself, as node names starting at `name`.
    pub fn cycle_through(&self, name: &str) -> Option<Vec<String>> {
        let starts = self.by_name.get(name)?;
        for &start in starts {
            if self.graph.edges_connecting(start, start).next().is_some() {
                return Some(vec![name.to_string(), name.to_string()]);
            }
            for next in self.graph.neighbors(start) {
                if let Some((_, path)) = astar(&self.graph, next, |n| n == start, |_| 1, |_| 0) {
                    let mut cycle = vec![name.to_string()];
                    cycle.extend(path.into_iter().map(|idx| self.graph[idx].clone()));
                    return Some(cycle);
                }
            }
        }
        None
    }

    /// Every cycle in the graph, one entry per strongly connected component.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let sccs = tarjan_scc(&self.graph);
        sccs.into_iter()
            .filter(|scc| {
                if scc.len() == 1 {
                    let idx = scc[0];
                    self.graph.edges_connecting(idx, idx).next().is_some()
                } else {
                    true
                }
            })
            .map(|scc| {
                let mut names: Vec<String> = scc.into_iter().map(|idx| self.graph[idx].clone()).collect();
                names.sort();
                names
            })
            .collect()
    }

    /// Node names with every dependency before its dependers, or the node
    /// that closes a cycle.
    pub fn evaluation_order(&self) -> Result<Vec<String>, String> {
        match toposort(&self.graph, None) {
            Ok(order) => Ok(order
                .into_iter()
                .rev()
                .map(|idx| self.graph[idx].clone())
                .collect()),
            Err(cycle) => Err(self.graph[cycle.node_id()].clone()),
        }
    }
}
