use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use tabula::model::{MirrorTarget, Node, NodeKind, RotateNode, SetSpec};
use tabula::{PlanError, PlanGraph};

fn leaves(names: &[&str]) -> PlanGraph {
    let mut graph = PlanGraph::new("acyclic");
    for name in names {
        graph.add_node(Node::bound(*name, format!("db.{}", name))).unwrap();
    }
    graph
}

#[test]
fn test_self_reference_is_rejected() {
    let mut graph = PlanGraph::new("g");
    let err = graph.add_node(Node::rotate("r", "r")).unwrap_err();
    assert_eq!(err, PlanError::cycle(["r", "r"]));
    assert!(graph.is_empty());
}

#[test]
fn test_edit_closing_a_loop_is_rolled_back() {
    let mut graph = leaves(&["a"]);
    graph.add_node(Node::mirror("m", MirrorTarget::local("a"))).unwrap();
    graph.add_node(Node::rotate("r", "m")).unwrap();

    let before = graph.get("a").cloned();
    let err = graph
        .mutate("a", |n| {
            n.kind = NodeKind::Rotate(RotateNode { target: "r".into() });
            Ok(())
        })
        .unwrap_err();

    match err {
        PlanError::DependencyCycle { cycle } => {
            assert_eq!(cycle.first().map(String::as_str), Some("a"));
            assert_eq!(cycle.last().map(String::as_str), Some("a"));
            assert!(cycle.contains(&"m".to_string()));
            assert!(cycle.contains(&"r".to_string()));
        }
        other => panic!("expected a cycle, got {:?}", other),
    }
    assert_eq!(graph.get("a").cloned(), before);
    assert!(graph.check_acyclic("a").is_ok());
}

#[test]
fn test_concat_over_its_own_depender_is_rejected() {
    let mut graph = leaves(&["a", "b"]);
    graph
        .add_node(Node::concat("u", vec!["a".into(), "b".into()], SetSpec::Union))
        .unwrap();
    graph.add_node(Node::mirror("m", MirrorTarget::local("u"))).unwrap();

    let err = graph
        .set_subtables("u", vec!["a".into(), "m".into()])
        .unwrap_err();
    assert!(matches!(err, PlanError::DependencyCycle { .. }));
    let concat = graph.get("u").and_then(Node::as_concat).unwrap();
    assert_eq!(concat.subtables(), &["a".to_string(), "b".to_string()]);
}

#[test]
fn test_topological_order_and_detect_cycles() {
    let mut graph = leaves(&["a", "b"]);
    graph.add_node(Node::join("j", vec!["a".into(), "b".into()])).unwrap();
    graph.add_node(Node::rotate("r", "j")).unwrap();

    let order = graph.topological_order().unwrap();
    let pos = |n: &str| order.iter().position(|o| o == n).unwrap();
    assert!(pos("a") < pos("j"));
    assert!(pos("b") < pos("j"));
    assert!(pos("j") < pos("r"));
    assert!(graph.detect_cycles().is_empty());
}

// ============================================================================
// Properties
// ============================================================================

/// Node `i > 0` reads node `parents[i] % i`; node 0 is a leaf.
fn chain_graph(parents: &[usize]) -> (PlanGraph, HashMap<String, String>) {
    let mut graph = PlanGraph::new("prop");
    let mut edges = HashMap::new();
    graph.add_node(Node::bound("n0", "db.n0")).unwrap();
    for (i, parent) in parents.iter().enumerate() {
        let name = format!("n{}", i + 1);
        let target = format!("n{}", parent % (i + 1));
        let node = if i % 2 == 0 {
            Node::rotate(name.as_str(), target.as_str())
        } else {
            Node::mirror(name.as_str(), MirrorTarget::local(target.as_str()))
        };
        graph.add_node(node).unwrap();
        edges.insert(name, target);
    }
    (graph, edges)
}

/// Whether following edges from `from` reaches `to`.
fn reaches(edges: &HashMap<String, String>, from: &str, to: &str) -> bool {
    let mut seen = HashSet::new();
    let mut current = from.to_string();
    loop {
        if current == to {
            return true;
        }
        if !seen.insert(current.clone()) {
            return false;
        }
        match edges.get(&current) {
            Some(next) => current = next.clone(),
            None => return false,
        }
    }
}

proptest! {
    #[test]
    fn prop_edit_rejected_exactly_when_it_closes_a_cycle(
        parents in prop::collection::vec(0usize..64, 1..12),
        a in 0usize..64,
        b in 0usize..64,
    ) {
        let (mut graph, edges) = chain_graph(&parents);
        let count = graph.len();
        let a = format!("n{}", a % count);
        let b = format!("n{}", b % count);
        let closes_cycle = reaches(&edges, &b, &a);

        let before = graph.get(&a).cloned();
        let target = b.clone();
        let result = graph.mutate(&a, move |n| {
            n.kind = NodeKind::Rotate(RotateNode { target });
            Ok(())
        });

        if closes_cycle {
            let is_cycle = matches!(result, Err(PlanError::DependencyCycle { .. }));
            prop_assert!(is_cycle);
            prop_assert_eq!(graph.get(&a).cloned(), before);
        } else {
            prop_assert!(result.is_ok());
            prop_assert!(graph.topological_order().is_ok());
        }
        prop_assert!(graph.detect_cycles().is_empty());
    }
}
