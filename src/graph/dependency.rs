//! Typed dependency edges of a node.
//!
//! Every reference a node holds to another node of the same graph is an
//! edge. [`EdgeType`] records the direction of data flow; [`DependencyType`]
//! records why the edge exists. One target may be reached for several
//! reasons; join roles on one target collapse to a single type by priority.

use std::collections::BTreeSet;
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::model::{GraphId, JoinSpec, Node, NodeKind, SetSpec, TableOperator, TablePair, VariableSupport};

/// Direction of data flow along an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// The node reads the target's rows.
    Input,
    /// The target supplies choices to one of the node's variables.
    Output,
    /// A calculated column reads the target.
    View,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    OuterJoin,
    InnerJoin,
    /// Any operator after the first between the same pair.
    SecondaryJoin,
    CrossJoin,
    Union,
    Intersect,
    Minus,
    Mirror,
    Rotation,
    Unpivot,
    VariableFilter,
    Subquery,
    Expression,
}

impl DependencyType {
    /// Join roles from strongest to weakest; the first one present wins.
    pub const JOIN_PRIORITY: [DependencyType; 4] = [
        DependencyType::OuterJoin,
        DependencyType::InnerJoin,
        DependencyType::SecondaryJoin,
        DependencyType::CrossJoin,
    ];

    pub fn is_join(&self) -> bool {
        Self::JOIN_PRIORITY.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyType::OuterJoin => "outer_join",
            DependencyType::InnerJoin => "inner_join",
            DependencyType::SecondaryJoin => "secondary_join",
            DependencyType::CrossJoin => "cross_join",
            DependencyType::Union => "union",
            DependencyType::Intersect => "intersect",
            DependencyType::Minus => "minus",
            DependencyType::Mirror => "mirror",
            DependencyType::Rotation => "rotation",
            DependencyType::Unpivot => "unpivot",
            DependencyType::VariableFilter => "variable_filter",
            DependencyType::Subquery => "subquery",
            DependencyType::Expression => "expression",
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An edge from a node to the node it references.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssemblyRef {
    pub edge: EdgeType,
    pub target: String,
}

impl AssemblyRef {
    pub fn new(edge: EdgeType, target: impl Into<String>) -> Self {
        Self {
            edge,
            target: target.into(),
        }
    }
}

/// One classified reference, before grouping.
struct Edge<'a> {
    target: &'a str,
    edge: EdgeType,
    kind: DependencyType,
}

fn join_role(op: &TableOperator, index: usize) -> DependencyType {
    if index > 0 {
        return DependencyType::SecondaryJoin;
    }
    match op.items.first().and_then(|i| i.join_spec()) {
        Some(spec) if spec.is_outer() => DependencyType::OuterJoin,
        Some(JoinSpec::Cross) | None => DependencyType::CrossJoin,
        Some(_) => DependencyType::InnerJoin,
    }
}

fn set_role(spec: SetSpec) -> DependencyType {
    match spec {
        SetSpec::Union => DependencyType::Union,
        SetSpec::Intersect => DependencyType::Intersect,
        SetSpec::Minus => DependencyType::Minus,
    }
}

fn operator_edges<'a, F>(
    subtables: &'a [String],
    operators: impl Iterator<Item = (&'a TablePair, &'a TableOperator)>,
    classify: F,
    unpaired: DependencyType,
    out: &mut Vec<Edge<'a>>,
) where
    F: Fn(&TableOperator, usize) -> Option<DependencyType>,
{
    let mut paired: IndexSet<&str> = IndexSet::new();
    for (pair, op) in operators {
        for index in 0..op.items.len() {
            let Some(kind) = classify(op, index) else {
                continue;
            };
            for target in [pair.left.as_str(), pair.right.as_str()] {
                paired.insert(target);
                out.push(Edge {
                    target,
                    edge: EdgeType::Input,
                    kind,
                });
            }
        }
    }
    for table in subtables {
        if !paired.contains(table.as_str()) {
            out.push(Edge {
                target: table,
                edge: EdgeType::Input,
                kind: unpaired,
            });
        }
    }
}

fn collect_edges(node: &Node, graph: GraphId) -> Vec<Edge<'_>> {
    let mut out = Vec::new();

    match &node.kind {
        NodeKind::Bound(bound) => {
            for target in &bound.scripted_refs {
                out.push(Edge {
                    target,
                    edge: EdgeType::Input,
                    kind: DependencyType::Expression,
                });
            }
        }
        NodeKind::Join(join) => operator_edges(
            join.subtables(),
            join.operators(),
            |op, index| Some(join_role(op, index)),
            DependencyType::CrossJoin,
            &mut out,
        ),
        NodeKind::Concatenate(concat) => operator_edges(
            concat.subtables(),
            concat.operators(),
            |op, index| op.items.get(index).and_then(|i| i.set_spec()).map(set_role),
            DependencyType::Union,
            &mut out,
        ),
        NodeKind::Mirror(mirror) => {
            if mirror.target.is_local_to(graph) {
                out.push(Edge {
                    target: &mirror.target.node,
                    edge: EdgeType::Input,
                    kind: DependencyType::Mirror,
                });
            }
        }
        NodeKind::Rotate(rotate) => out.push(Edge {
            target: &rotate.target,
            edge: EdgeType::Input,
            kind: DependencyType::Rotation,
        }),
        NodeKind::Unpivot(unpivot) => out.push(Edge {
            target: &unpivot.target,
            edge: EdgeType::Input,
            kind: DependencyType::Unpivot,
        }),
        NodeKind::Embedded(_) | NodeKind::DataInline(_) => {}
    }

    for list in node.condition_lists() {
        for target in list.subquery_nodes() {
            out.push(Edge {
                target,
                edge: EdgeType::Input,
                kind: DependencyType::Subquery,
            });
        }
    }

    for target in node.projection.expression_nodes() {
        out.push(Edge {
            target,
            edge: EdgeType::View,
            kind: DependencyType::Expression,
        });
    }

    out
}

/// Nodes this node references, with the direction of each edge.
pub fn dependents_of(node: &Node, graph: GraphId) -> IndexSet<AssemblyRef> {
    let mut refs: IndexSet<AssemblyRef> = collect_edges(node, graph)
        .into_iter()
        .map(|e| AssemblyRef::new(e.edge, e.target))
        .collect();
    for table in variable_tables(node) {
        refs.insert(AssemblyRef::new(EdgeType::Output, table));
    }
    refs
}

/// Names of the nodes supplying choices to the node's variables.
fn variable_tables(node: &Node) -> Vec<String> {
    node.all_variables()
        .into_iter()
        .filter_map(|v| v.choice_table)
        .collect()
}

/// Referenced nodes with the reasons they are referenced.
///
/// When a target plays several join roles only the strongest is kept
/// (outer, inner, secondary, cross); other kinds are kept as they are.
pub fn augmented_dependents_of(node: &Node, graph: GraphId) -> IndexMap<String, BTreeSet<DependencyType>> {
    let mut result: IndexMap<String, BTreeSet<DependencyType>> = IndexMap::new();
    for edge in collect_edges(node, graph) {
        result.entry(edge.target.to_string()).or_default().insert(edge.kind);
    }
    for table in variable_tables(node) {
        result.entry(table).or_default().insert(DependencyType::VariableFilter);
    }

    for kinds in result.values_mut() {
        if let Some(keep) = DependencyType::JOIN_PRIORITY
            .into_iter()
            .find(|k| kinds.contains(k))
        {
            kinds.retain(|k| !k.is_join() || *k == keep);
        }
    }
    result
}

/// Names of the same-graph nodes this node depends on.
pub(crate) fn local_targets(node: &Node, graph: GraphId) -> IndexSet<String> {
    dependents_of(node, graph)
        .into_iter()
        .map(|r| r.target)
        .collect()
}
