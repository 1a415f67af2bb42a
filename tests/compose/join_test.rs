use tabula::compose::{add_operator, remove_operator, set_operator, set_subtables};
use tabula::model::{
    ColumnRef, ColumnSelection, JoinSpec, Node, NodeKind, OperatorItem, OperatorKind, SetSpec,
    TableOperator,
};
use tabula::{PlanError, PlanGraph};

fn names(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

fn leaf(name: &str) -> Node {
    Node::bound(name, format!("db.{}", name)).with_projection(ColumnSelection::from_columns(vec![
        ColumnRef::qualified(name, "id"),
    ]))
}

#[test]
fn test_new_join_defaults_to_cross_joins() {
    let node = Node::join("j", names(&["a", "b", "c"]));
    let join = node.as_join().unwrap();
    assert_eq!(join.operator_pairs().len(), 2);
    assert!(join.operator("a", "b").is_some_and(TableOperator::is_cross));
    assert!(join.operator("c", "b").is_some_and(TableOperator::is_cross));
    assert!(join.operator("a", "c").is_none());
    assert!(join.is_connected());
}

#[test]
fn test_join_rejects_set_operators_and_missing_columns() {
    let mut node = Node::join("j", names(&["a", "b"]));
    let err = set_operator(&mut node, "a", "b", OperatorItem::bare(SetSpec::Union)).unwrap_err();
    assert_eq!(
        err,
        PlanError::InvalidOperatorKind {
            node: "j".into(),
            operator: SetSpec::Union.as_str().into(),
        }
    );

    let err = set_operator(&mut node, "a", "b", OperatorItem::bare(JoinSpec::LeftOuter)).unwrap_err();
    assert!(matches!(err, PlanError::InvalidNode { .. }));

    let err = set_operator(
        &mut node,
        "a",
        "zzz",
        OperatorItem::join_on(JoinSpec::Inner, "id", "id"),
    )
    .unwrap_err();
    assert!(matches!(err, PlanError::InvalidNode { .. }));

    // Failed edits leave the default in place.
    let join = node.as_join().unwrap();
    assert!(join.operator("a", "b").is_some_and(TableOperator::is_cross));
}

#[test]
fn test_add_operator_appends_in_either_orientation() {
    let mut node = Node::join("j", names(&["a", "b"]));
    set_operator(&mut node, "a", "b", OperatorItem::join_on(JoinSpec::Inner, "id", "a_id")).unwrap();
    add_operator(&mut node, "b", "a", OperatorItem::join_on(JoinSpec::Inner, "k", "k")).unwrap();

    let join = node.as_join().unwrap();
    assert_eq!(join.operator_pairs().len(), 1);
    let op = join.operator("a", "b").unwrap();
    assert_eq!(op.items.len(), 2);
    assert_eq!(op.items[1].left_column.as_deref(), Some("k"));
}

#[test]
fn test_remove_operator_synthesizes_cross_join() {
    let mut node = Node::join("j", names(&["a", "b", "c"]));
    set_operator(&mut node, "a", "b", OperatorItem::join_on(JoinSpec::Inner, "id", "id")).unwrap();

    let removable = remove_operator(&mut node, "a", "b").unwrap();
    assert!(!removable);
    let join = node.as_join().unwrap();
    assert!(join.operator("a", "b").is_some_and(TableOperator::is_cross));
    assert!(join.is_connected());
}

#[test]
fn test_graph_never_removes_a_join() {
    let mut graph = PlanGraph::new("g");
    for name in ["a", "b"] {
        graph.add_node(leaf(name)).unwrap();
    }
    let mut join = Node::join("j", names(&["a", "b"]));
    set_operator(&mut join, "a", "b", OperatorItem::join_on(JoinSpec::Inner, "id", "id")).unwrap();
    graph.add_node(join).unwrap();

    assert!(!graph.remove_operator("j", "a", "b").unwrap());
    let join = graph.get("j").and_then(Node::as_join).unwrap();
    assert!(join.operator("a", "b").is_some_and(TableOperator::is_cross));
}

#[test]
fn test_remove_subtable_reconnects_neighbours() {
    let mut node = Node::join("j", names(&["a", "b", "c"]));
    set_operator(&mut node, "b", "c", OperatorItem::join_on(JoinSpec::Inner, "id", "id")).unwrap();

    let NodeKind::Join(join) = &mut node.kind else {
        panic!("not a join");
    };
    assert!(join.remove_subtable("b"));
    assert!(!join.remove_subtable("b"));
    assert_eq!(join.subtables(), names(&["a", "c"]).as_slice());
    assert!(join.operator("a", "c").is_some_and(TableOperator::is_cross));
    assert!(join.is_connected());
}

#[test]
fn test_set_subtables_keeps_surviving_operators() {
    let mut node = Node::join("j", names(&["a", "b", "c"]));
    set_operator(&mut node, "b", "c", OperatorItem::join_on(JoinSpec::FullOuter, "id", "id")).unwrap();

    let schema = std::collections::HashMap::<String, ColumnSelection>::new();
    set_subtables(&mut node, names(&["b", "c", "d"]), &schema).unwrap();

    let join = node.as_join().unwrap();
    assert_eq!(join.subtables(), names(&["b", "c", "d"]).as_slice());
    assert!(join.operator("a", "b").is_none());
    assert_eq!(
        join.operator("b", "c").and_then(|op| op.first_kind()),
        Some(OperatorKind::Join(JoinSpec::FullOuter))
    );
    assert!(join.operator("c", "d").is_some_and(TableOperator::is_cross));
}
