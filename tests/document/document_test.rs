use tabula::compose::set_operator;
use tabula::content::ContentKey;
use tabula::document::{from_json, read_file, to_json, write_file};
use tabula::model::{
    ColumnRef, ColumnSelection, DataType, JoinSpec, Layout, MirrorTarget, Node, OperatorItem,
};
use tabula::{PlanError, PlanGraph};

fn sample() -> PlanGraph {
    let mut graph = PlanGraph::new("report");
    graph
        .add_node(
            Node::bound("orders", "db.orders").with_projection(ColumnSelection::from_columns(
                vec![
                    ColumnRef::qualified("orders", "id").with_type(DataType::Integer),
                    ColumnRef::qualified("orders", "amount").with_type(DataType::Double),
                ],
            )),
        )
        .unwrap();
    graph
        .add_node(
            Node::bound("customers", "db.customers").with_projection(
                ColumnSelection::from_columns(vec![ColumnRef::qualified("customers", "id")]),
            ),
        )
        .unwrap();

    let mut join = Node::join("joined", vec!["customers".into(), "orders".into()]);
    set_operator(
        &mut join,
        "customers",
        "orders",
        OperatorItem::join_on(JoinSpec::LeftOuter, "id", "id"),
    )
    .unwrap();
    join.max_rows = Some(500);
    join.layout = Layout {
        x: 40,
        y: 80,
        width: 200,
        height: 120,
    };
    graph.add_node(join).unwrap();
    graph
        .add_node(Node::mirror("copy", MirrorTarget::local("joined")))
        .unwrap();
    graph
}

#[test]
fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    let graph = sample();

    write_file(&path, &graph).unwrap();
    let loaded = read_file(&path).unwrap();

    assert_eq!(loaded.id(), graph.id());
    assert_eq!(loaded.name(), "report");
    assert_eq!(
        loaded.names().collect::<Vec<_>>(),
        vec!["orders", "customers", "joined", "copy"]
    );
    for node in graph.iter() {
        let other = loaded.get(node.name()).unwrap();
        assert_eq!(other.content_key(), node.content_key());
        assert_eq!(other.layout, node.layout);
    }
}

#[test]
fn test_text_round_trip_is_stable() {
    let text = to_json(&sample()).unwrap();
    let again = to_json(&from_json(&text).unwrap()).unwrap();
    assert_eq!(again, text);
}

#[test]
fn test_cyclic_document_is_rejected() {
    let text = r#"{
        "tag": "plan",
        "attributes": { "name": "loop" },
        "children": [
            { "tag": "rotate", "attributes": { "name": "a", "target": "b" } },
            { "tag": "rotate", "attributes": { "name": "b", "target": "a" } }
        ]
    }"#;
    assert!(matches!(
        from_json(text),
        Err(PlanError::DependencyCycle { .. })
    ));
}

#[test]
fn test_malformed_documents() {
    let bad_rows = r#"{
        "tag": "plan",
        "children": [
            { "tag": "bound", "attributes": { "name": "t", "source": "db.t", "max_rows": "many" } }
        ]
    }"#;
    assert!(matches!(from_json(bad_rows), Err(PlanError::Document(_))));

    let unknown = r#"{ "tag": "plan", "children": [ { "tag": "spreadsheet", "attributes": { "name": "s" } } ] }"#;
    assert!(matches!(from_json(unknown), Err(PlanError::Document(_))));

    let unnamed = r#"{ "tag": "plan", "children": [ { "tag": "rotate", "attributes": { "target": "x" } } ] }"#;
    assert!(matches!(from_json(unnamed), Err(PlanError::Document(_))));

    let wrong_root = r#"{ "tag": "sheet" }"#;
    assert!(matches!(from_json(wrong_root), Err(PlanError::Document(_))));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, PlanError::Document(_)));
}
