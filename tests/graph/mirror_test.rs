use std::sync::Arc;

use tabula::graph::MapCatalog;
use tabula::model::{
    ColumnRef, ColumnSelection, DataType, GraphId, MirrorTarget, Node, NodeKind, NodeState,
};
use tabula::{PlanError, PlanGraph};

fn orders() -> Node {
    Node::bound("orders", "db.orders").with_projection(ColumnSelection::from_columns(vec![
        ColumnRef::new("id").with_type(DataType::Integer),
        ColumnRef::new("amount").with_type(DataType::Double),
        ColumnRef::new("note").hidden(),
    ]))
}

#[test]
fn test_local_mirror_syncs_on_update() {
    let mut graph = PlanGraph::new("local");
    graph.add_node(orders()).unwrap();
    graph
        .add_node(Node::mirror("copy", MirrorTarget::local("orders")))
        .unwrap();
    assert!(graph.is_mirror_stale("copy").unwrap());

    let report = graph.update_all();
    assert!(report.stale.is_empty());
    assert!(report.changed.contains(&"copy".to_string()));

    let copy = graph.get("copy").unwrap();
    assert_eq!(copy.state(), NodeState::Updated);
    assert_eq!(copy.projection.public_names(), vec!["id", "amount"]);
    assert_eq!(
        copy.projection.public_types(),
        vec![DataType::Integer, DataType::Double]
    );
    assert!(!graph.is_mirror_stale("copy").unwrap());
}

#[test]
fn test_target_edit_makes_mirror_stale() {
    let mut graph = PlanGraph::new("local");
    graph.add_node(orders()).unwrap();
    graph
        .add_node(Node::mirror("copy", MirrorTarget::local("orders")))
        .unwrap();
    graph.update_all();
    assert!(!graph.is_mirror_stale("copy").unwrap());

    graph
        .mutate("orders", |n| {
            n.distinct = true;
            Ok(())
        })
        .unwrap();
    assert!(graph.is_mirror_stale("copy").unwrap());

    graph.update_all();
    assert!(!graph.is_mirror_stale("copy").unwrap());
}

#[test]
fn test_mirror_columns_are_not_editable() {
    let mut graph = PlanGraph::new("local");
    graph.add_node(orders()).unwrap();
    graph
        .add_node(Node::mirror("copy", MirrorTarget::local("orders")))
        .unwrap();

    let err = graph
        .set_projection(
            "copy",
            ColumnSelection::from_columns(vec![ColumnRef::new("id")]),
            true,
        )
        .unwrap_err();
    assert!(matches!(err, PlanError::EditNotAllowed { ref node, .. } if node == "copy"));

    // A manual mirror keeps its own columns.
    graph
        .mutate("copy", |n| {
            if let NodeKind::Mirror(m) = &mut n.kind {
                m.auto_update = false;
            }
            Ok(())
        })
        .unwrap();
    graph
        .set_projection(
            "copy",
            ColumnSelection::from_columns(vec![ColumnRef::new("id")]),
            true,
        )
        .unwrap();
    assert_eq!(graph.get("copy").unwrap().projection.len(), 1);
}

#[test]
fn test_external_mirror_resolves_through_catalog() {
    let remote_id = GraphId::new();
    let mut remote = PlanGraph::with_id(remote_id, "remote");
    remote.add_node(orders()).unwrap();

    let mut catalog = MapCatalog::new();
    catalog.insert(remote.snapshot());

    let mut graph = PlanGraph::new("local").with_catalog(Arc::new(catalog));
    graph
        .add_node(Node::mirror(
            "remote_orders",
            MirrorTarget::external(remote_id, "orders"),
        ))
        .unwrap();

    // External targets are not local edges.
    assert!(graph.topological_order().is_ok());
    assert!(graph.dependers_of("orders").is_empty());

    let report = graph.update_all();
    assert!(report.stale.is_empty());
    let mirror = graph.get("remote_orders").unwrap();
    assert_eq!(mirror.projection.public_names(), vec!["id", "amount"]);
    assert!(!graph.is_mirror_stale("remote_orders").unwrap());
    assert!(graph.check_validity("remote_orders").is_ok());
}

#[test]
fn test_external_mirror_without_catalog_is_stale() {
    let mut graph = PlanGraph::new("local");
    graph
        .add_node(Node::mirror(
            "remote_orders",
            MirrorTarget::external(GraphId::new(), "orders"),
        ))
        .unwrap();

    let report = graph.update_all();
    assert_eq!(report.stale, vec!["remote_orders".to_string()]);
    assert_eq!(
        graph.get("remote_orders").unwrap().state(),
        NodeState::Invalid
    );
    assert!(matches!(
        graph.is_mirror_stale("remote_orders"),
        Err(PlanError::UnresolvedReference { .. })
    ));
}
