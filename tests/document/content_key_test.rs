use tabula::content::ContentKey;
use tabula::model::{ColumnRef, ColumnSelection, DataType, Layout, Node, NodeState};
use tabula::PlanGraph;

fn orders() -> Node {
    let mut node = Node::bound("orders", "db.orders").with_projection(
        ColumnSelection::from_columns(vec![
            ColumnRef::qualified("orders", "id").with_type(DataType::Integer),
            ColumnRef::new("note").hidden(),
        ]),
    );
    node.max_rows = Some(10);
    node.distinct = true;
    node
}

#[test]
fn test_bound_node_key() {
    insta::assert_snapshot!(
        orders().content_key(),
        @r#"bound{name="orders";source="db.orders";projection=columns{items=[col{entity="orders";attr="id";type=integer},col{attr="note";type=unknown;hidden=1}]};max_rows=10;distinct=1}"#
    );
}

#[test]
fn test_empty_projection_key() {
    insta::assert_snapshot!(
        Node::rotate("r", "orders").content_key(),
        @r#"rotate{name="r";target="orders";projection=columns{}}"#
    );
}

#[test]
fn test_cosmetic_fields_do_not_change_the_key() {
    let plain = orders();
    let mut moved = orders();
    moved.layout = Layout {
        x: 5,
        y: 5,
        width: 300,
        height: 200,
    };
    moved.read_only = true;

    let mut graph = PlanGraph::new("keys");
    graph.add_node(moved).unwrap();
    graph.validate_all();
    let stored = graph.get("orders").unwrap();
    assert_eq!(stored.state(), NodeState::Valid);

    assert_eq!(stored.content_key(), plain.content_key());
    assert_eq!(stored.content_digest(), plain.content_digest());
}

#[test]
fn test_semantic_edits_change_the_key() {
    let plain = orders();
    let mut limited = orders();
    limited.max_rows = Some(11);
    assert_ne!(limited.content_key(), plain.content_key());

    let mut renamed = orders();
    renamed.projection = ColumnSelection::from_columns(vec![
        ColumnRef::qualified("orders", "id")
            .with_type(DataType::Integer)
            .with_alias("order_id"),
        ColumnRef::new("note").hidden(),
    ]);
    assert_ne!(renamed.content_digest(), plain.content_digest());
}

#[test]
fn test_digest_is_sha256_hex() {
    let digest = orders().content_digest();
    assert_eq!(digest.len(), 64);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}
