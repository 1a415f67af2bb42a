use std::collections::HashMap;

use tabula::compose::{merged_column_types, set_operator};
use tabula::exec::{execute, MemoryExecutor};
use tabula::model::{
    ColumnRef, ColumnSelection, DataType, Node, OperatorItem, SchemaColumn, SetSpec, Value,
};
use tabula::{PlanError, PlanGraph};

fn names(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

fn typed(name: &str, types: &[DataType]) -> Node {
    Node::bound(name, format!("db.{}", name)).with_projection(
        types
            .iter()
            .enumerate()
            .map(|(i, t)| ColumnRef::qualified(name, format!("c{}", i)).with_type(*t))
            .collect::<ColumnSelection>(),
    )
}

fn union_all() -> OperatorItem {
    OperatorItem {
        all: true,
        ..OperatorItem::bare(SetSpec::Union)
    }
}

#[test]
fn test_merged_types_widen_pairwise() {
    let schema: HashMap<String, ColumnSelection> = [
        typed("a", &[DataType::Integer, DataType::Date, DataType::Unknown]),
        typed("b", &[DataType::Long, DataType::Timestamp, DataType::String]),
        typed("c", &[DataType::Short, DataType::Date, DataType::String]),
    ]
    .into_iter()
    .map(|n| (n.name().to_string(), n.projection))
    .collect();

    let merged = merged_column_types("u", &names(&["a", "b", "c"]), &schema).unwrap();
    assert_eq!(
        merged,
        vec![DataType::Long, DataType::Timestamp, DataType::String]
    );
}

#[test]
fn test_merged_types_reject_mismatches() {
    let schema: HashMap<String, ColumnSelection> = [
        typed("a", &[DataType::Integer]),
        typed("b", &[DataType::Integer, DataType::String]),
        typed("c", &[DataType::String]),
    ]
    .into_iter()
    .map(|n| (n.name().to_string(), n.projection))
    .collect();

    let err = merged_column_types("u", &names(&["a", "b"]), &schema).unwrap_err();
    assert!(matches!(
        err,
        PlanError::IncompatibleSubtables { ref left, ref right, .. } if left == "a" && right == "b"
    ));
    assert!(merged_column_types("u", &names(&["a", "c"]), &schema).is_err());
    assert_eq!(
        merged_column_types("u", &names(&["a", "missing"]), &schema).unwrap_err(),
        PlanError::UnresolvedReference {
            node: "u".into(),
            reference: "missing".into(),
        }
    );
}

#[test]
fn test_concat_rejects_join_operators() {
    let mut node = Node::concat("u", names(&["a", "b"]), SetSpec::Union);
    let err = set_operator(&mut node, "a", "b", OperatorItem::cross()).unwrap_err();
    assert!(matches!(err, PlanError::InvalidOperatorKind { .. }));
}

#[test]
fn test_incompatible_subtables_leave_the_node_unchanged() {
    let mut graph = PlanGraph::new("g");
    graph.add_node(typed("a", &[DataType::Integer])).unwrap();
    graph.add_node(typed("b", &[DataType::Long])).unwrap();
    graph.add_node(typed("dates", &[DataType::Date])).unwrap();
    graph
        .add_node(Node::concat("u", names(&["a", "b"]), SetSpec::Union))
        .unwrap();

    let err = graph.set_subtables("u", names(&["a", "dates"])).unwrap_err();
    assert!(matches!(err, PlanError::IncompatibleSubtables { .. }));
    let concat = graph.get("u").and_then(Node::as_concat).unwrap();
    assert_eq!(concat.subtables(), names(&["a", "b"]).as_slice());
}

#[test]
fn test_removing_operators_narrows_then_removes() {
    let mut graph = PlanGraph::new("g");
    for name in ["a", "b", "c", "d"] {
        graph.add_node(typed(name, &[DataType::Integer])).unwrap();
    }
    graph
        .add_node(Node::concat("u", names(&["a", "b", "c", "d"]), SetSpec::Union))
        .unwrap();

    // Two groups of equal size: the one holding the earliest table stays.
    assert!(!graph.remove_operator("u", "b", "c").unwrap());
    let concat = graph.get("u").and_then(Node::as_concat).unwrap();
    assert_eq!(concat.subtables(), names(&["a", "b"]).as_slice());
    assert!(concat.operator("c", "d").is_none());

    assert!(graph.remove_operator("u", "a", "b").unwrap());
    assert!(!graph.contains("u"));
}

#[test]
fn test_union_all_keeps_duplicates() {
    let schema = [SchemaColumn::new("c0", DataType::Integer)];
    let mut executor = MemoryExecutor::new();
    executor.register("db.a", &schema, vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
    executor.register("db.b", &schema, vec![vec![Value::Int(2)], vec![Value::Int(3)]]);

    let mut graph = PlanGraph::new("g");
    graph.add_node(typed("a", &[DataType::Integer])).unwrap();
    graph.add_node(typed("b", &[DataType::Integer])).unwrap();
    graph
        .add_node(Node::concat("u", names(&["a", "b"]), SetSpec::Union))
        .unwrap();
    let mut all = Node::concat("u_all", names(&["a", "b"]), SetSpec::Union);
    set_operator(&mut all, "a", "b", union_all()).unwrap();
    graph.add_node(all).unwrap();

    let snapshot = graph.snapshot();
    let distinct = execute(&snapshot, "u", &executor).unwrap();
    assert_eq!(distinct.len(), 3);
    let all = execute(&snapshot, "u_all", &executor).unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(
        all.column("c0"),
        Some(vec![Value::Int(1), Value::Int(2), Value::Int(2), Value::Int(3)])
    );
}
