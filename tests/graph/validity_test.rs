use tabula::compose::set_operator;
use tabula::model::{
    ColumnRef, ColumnSelection, DataType, JoinSpec, Node, NodeState, OperatorItem, SetSpec, Value,
};
use tabula::{PlanError, PlanGraph, ValidationOptions};

fn leaf(name: &str, cols: &[(&str, DataType)]) -> Node {
    Node::bound(name, format!("db.{}", name)).with_projection(
        cols.iter()
            .map(|(c, t)| ColumnRef::qualified(name, *c).with_type(*t))
            .collect::<ColumnSelection>(),
    )
}

fn joined(check_cross_joins: bool) -> PlanGraph {
    let mut graph = PlanGraph::new("valid").with_options(ValidationOptions {
        check_cross_joins,
        ..ValidationOptions::default()
    });
    graph
        .add_node(leaf("a", &[("id", DataType::Integer), ("x", DataType::Integer)]))
        .unwrap();
    graph
        .add_node(leaf("b", &[("a_id", DataType::Integer), ("y", DataType::Double)]))
        .unwrap();
    let mut join = Node::join("j", vec!["a".into(), "b".into()]);
    set_operator(&mut join, "a", "b", OperatorItem::join_on(JoinSpec::Inner, "id", "a_id")).unwrap();
    graph.add_node(join).unwrap();
    graph
}

#[test]
fn test_sound_graph_validates() {
    let mut graph = joined(true);
    assert!(graph.validate_all().is_empty());
    assert!(graph.iter().all(|n| n.state() == NodeState::Valid));
}

#[test]
fn test_missing_sub_table_is_unresolved() {
    let mut graph = joined(true);
    let stale = graph.remove_node("b").unwrap();
    assert_eq!(stale, vec!["j".to_string()]);

    let err = graph.check_validity("j").unwrap_err();
    assert_eq!(
        err,
        PlanError::UnresolvedReference {
            node: "j".into(),
            reference: "b".into(),
        }
    );
    assert_eq!(graph.get("j").unwrap().state(), NodeState::Invalid);
}

#[test]
fn test_cross_join_detection_follows_options() {
    let mut degraded = joined(true);
    degraded
        .set_projection("b", leaf("b", &[("y", DataType::Double)]).projection, false)
        .unwrap();
    // The override already degraded the pair to a cross join.
    assert!(degraded.check_validity("j").is_ok());

    let mut graph = joined(true);
    let err = graph
        .set_projection("b", leaf("b", &[("y", DataType::Double)]).projection, true)
        .unwrap_err();
    assert_eq!(
        err,
        PlanError::CrossJoinDetected {
            left: "a".into(),
            right: "b".into(),
            operator: "INNER JOIN".into(),
        }
    );
    assert!(err.is_recoverable());
}

#[test]
fn test_broken_join_reported_by_validity_check() {
    let mut graph = joined(true);
    // Swap the leaf for one without the join column, bypassing the projection edit checks.
    graph
        .mutate("b", |n| {
            n.projection = ColumnSelection::from_columns(vec![ColumnRef::qualified("b", "y")]);
            Ok(())
        })
        .unwrap();
    assert!(matches!(
        graph.check_validity("j"),
        Err(PlanError::CrossJoinDetected { .. })
    ));

    let mut lenient = graph.clone().with_options(ValidationOptions {
        check_cross_joins: false,
        ..ValidationOptions::default()
    });
    assert!(matches!(
        lenient.check_validity("j"),
        Err(PlanError::InvalidNode { .. })
    ));
}

#[test]
fn test_incompatible_concat_is_invalid() {
    let mut graph = PlanGraph::new("u");
    graph.add_node(leaf("a", &[("v", DataType::Integer)])).unwrap();
    graph.add_node(leaf("b", &[("v", DataType::Date)])).unwrap();
    graph
        .add_node(Node::concat("u", vec!["a".into(), "b".into()], SetSpec::Union))
        .unwrap();

    let problems = graph.validate_all();
    assert_eq!(problems.len(), 1);
    let (node, err) = &problems[0];
    assert_eq!(node, "u");
    assert!(matches!(err, PlanError::IncompatibleSubtables { .. }));
}

#[test]
fn test_unpivot_header_count_bounds() {
    let mut graph = PlanGraph::new("p");
    graph
        .add_node(leaf(
            "wide",
            &[
                ("region", DataType::String),
                ("q1", DataType::Double),
                ("q2", DataType::Double),
            ],
        ))
        .unwrap();
    graph.add_node(Node::unpivot("ok", "wide", 1)).unwrap();
    graph.add_node(Node::unpivot("all_headers", "wide", 3)).unwrap();
    graph.add_node(Node::unpivot("no_headers", "wide", 0)).unwrap();

    assert!(graph.check_validity("ok").is_ok());
    assert!(matches!(
        graph.check_validity("all_headers"),
        Err(PlanError::InvalidNode { .. })
    ));
    assert!(matches!(
        graph.check_validity("no_headers"),
        Err(PlanError::InvalidNode { .. })
    ));
}

#[test]
fn test_inline_rows_must_match_projection() {
    let mut graph = PlanGraph::new("i");
    graph
        .add_node(Node::inline(
            "data",
            ColumnSelection::from_columns(vec![ColumnRef::new("a"), ColumnRef::new("b")]),
            vec![vec![Value::Int(1), Value::Int(2)], vec![Value::Int(3)]],
        ))
        .unwrap();
    let err = graph.check_validity("data").unwrap_err();
    assert!(matches!(err, PlanError::InvalidNode { ref node, .. } if node == "data"));
    assert!(!err.is_recoverable());
}

#[test]
fn test_update_all_reports_stale_nodes() {
    let mut graph = joined(true);
    graph.add_node(Node::rotate("r", "j")).unwrap();
    graph.remove_node("a").unwrap();

    let report = graph.update_all();
    assert_eq!(report.stale, vec!["j".to_string()]);
    assert_eq!(graph.get("r").unwrap().state(), NodeState::Updated);
}

#[test]
fn test_node_limit() {
    let mut graph = PlanGraph::new("small").with_options(ValidationOptions {
        max_nodes: 1,
        ..ValidationOptions::default()
    });
    graph.add_node(leaf("a", &[])).unwrap();
    assert!(matches!(
        graph.add_node(leaf("b", &[])),
        Err(PlanError::InvalidNode { .. })
    ));
}
