use tabula::compose::set_operator;
use tabula::condition::{Condition, ConditionItem, JunctionOp};
use tabula::model::{
    ColumnRef, ColumnSelection, JoinSpec, MirrorTarget, Node, NodeKind, OperatorItem,
};
use tabula::{PlanError, PlanGraph};

fn leaf(name: &str, cols: &[&str]) -> Node {
    Node::bound(name, format!("db.{}", name)).with_projection(
        cols.iter()
            .map(|c| ColumnRef::qualified(name, *c))
            .collect::<ColumnSelection>(),
    )
}

/// customers + orders joined, a mirror of the join and a filtered rotation.
fn sheet() -> PlanGraph {
    let mut graph = PlanGraph::new("sheet");
    graph.add_node(leaf("customers", &["id", "name"])).unwrap();
    graph.add_node(leaf("orders", &["customer_id", "amount"])).unwrap();

    let mut join = Node::join("joined", vec!["customers".into(), "orders".into()]).with_projection(
        ColumnSelection::from_columns(vec![
            ColumnRef::qualified("customers", "name"),
            ColumnRef::qualified("orders", "amount"),
        ]),
    );
    set_operator(
        &mut join,
        "customers",
        "orders",
        OperatorItem::join_on(JoinSpec::Inner, "id", "customer_id"),
    )
    .unwrap();
    join.filters.pre_design.append(
        ConditionItem::new(
            ColumnRef::qualified("orders", "amount"),
            Condition::greater_than(100, false),
        ),
        JunctionOp::And,
    );
    graph.add_node(join).unwrap();
    graph
        .add_node(Node::mirror("copy", MirrorTarget::local("joined")))
        .unwrap();
    graph.add_node(Node::rotate("turned", "orders")).unwrap();
    graph
}

#[test]
fn test_rename_rewrites_every_reference() {
    let mut graph = sheet();
    graph.rename_node("orders", "sales").unwrap();

    assert!(!graph.contains("orders"));
    assert_eq!(graph.get("sales").unwrap().name(), "sales");

    let join_node = graph.get("joined").unwrap();
    let join = join_node.as_join().unwrap();
    assert_eq!(join.subtables(), &["customers".to_string(), "sales".to_string()]);
    assert!(join.operator("customers", "sales").is_some());
    assert!(join.operator("customers", "orders").is_none());
    assert_eq!(
        join_node.projection.get(1).and_then(|c| c.entity.as_deref()),
        Some("sales")
    );
    let filter = join_node.filters.pre_design.item(0).unwrap();
    assert_eq!(filter.attribute.entity.as_deref(), Some("sales"));

    match &graph.get("turned").unwrap().kind {
        NodeKind::Rotate(rotate) => assert_eq!(rotate.target, "sales"),
        other => panic!("unexpected kind {:?}", other),
    }
    // The leaf's own columns were qualified by its old name too.
    assert!(graph
        .get("sales")
        .unwrap()
        .projection
        .iter()
        .all(|c| c.entity.as_deref() == Some("sales")));
}

#[test]
fn test_rename_there_and_back_restores_the_graph() {
    let mut graph = sheet();
    let before: Vec<Node> = graph.iter().cloned().collect();

    graph.rename_node("joined", "combined").unwrap();
    graph.rename_node("combined", "joined").unwrap();

    let after: Vec<Node> = graph.iter().cloned().collect();
    assert_eq!(after, before);
}

#[test]
fn test_rename_to_existing_name_is_rejected() {
    let mut graph = sheet();
    let err = graph.rename_node("turned", "customers").unwrap_err();
    assert_eq!(err, PlanError::DuplicateNode("customers".into()));
    assert!(graph.contains("turned"));
}

#[test]
fn test_rename_to_the_mirror_name_is_a_cycle() {
    let mut graph = sheet();
    // copy mirrors joined: renaming joined to "copy" makes copy mirror itself.
    let err = graph.rename_node("joined", "copy").unwrap_err();
    assert!(matches!(err, PlanError::DependencyCycle { .. }));
    assert!(graph.contains("joined"));
}

#[test]
fn test_rename_unknown_or_read_only() {
    let mut graph = sheet();
    assert_eq!(
        graph.rename_node("nope", "x").unwrap_err(),
        PlanError::UnknownNode("nope".into())
    );

    let mut locked = leaf("locked", &["id"]);
    locked.read_only = true;
    graph.add_node(locked).unwrap();
    assert!(matches!(
        graph.rename_node("locked", "free"),
        Err(PlanError::EditNotAllowed { .. })
    ));
}

#[test]
fn test_rename_to_same_name_is_a_no_op() {
    let mut graph = sheet();
    let before: Vec<Node> = graph.iter().cloned().collect();
    graph.rename_node("orders", "orders").unwrap();
    assert_eq!(graph.iter().cloned().collect::<Vec<_>>(), before);
}
