use std::collections::BTreeSet;

use tabula::compose::{add_operator, set_operator};
use tabula::condition::{
    Condition, ConditionItem, ConditionOp, ConditionValue, JunctionOp, SubqueryValue,
};
use tabula::graph::{AssemblyRef, DependencyType, EdgeType};
use tabula::model::{
    ColumnRef, ColumnSelection, JoinSpec, MirrorTarget, Node, OperatorItem, SetSpec, UserVariable,
};
use tabula::{PlanError, PlanGraph};

fn leaf(name: &str) -> Node {
    Node::bound(name, format!("db.{}", name)).with_projection(ColumnSelection::from_columns(vec![
        ColumnRef::qualified(name, "id"),
        ColumnRef::qualified(name, "k"),
    ]))
}

fn graph_with(names: &[&str]) -> PlanGraph {
    let mut graph = PlanGraph::new("deps");
    for name in names {
        graph.add_node(leaf(name)).unwrap();
    }
    graph
}

fn kinds(types: &[DependencyType]) -> BTreeSet<DependencyType> {
    types.iter().copied().collect()
}

#[test]
fn test_join_roles_collapse_by_priority() {
    let mut graph = graph_with(&["a", "b", "c", "d"]);
    let mut join = Node::join("j", vec!["a".into(), "b".into(), "c".into(), "d".into()]);
    set_operator(&mut join, "a", "b", OperatorItem::join_on(JoinSpec::Inner, "id", "id")).unwrap();
    add_operator(&mut join, "a", "b", OperatorItem::join_on(JoinSpec::Inner, "k", "k")).unwrap();
    set_operator(&mut join, "b", "c", OperatorItem::join_on(JoinSpec::FullOuter, "id", "id")).unwrap();
    graph.add_node(join).unwrap();

    let deps = graph.augmented_dependents_of("j").unwrap();
    assert_eq!(deps["a"], kinds(&[DependencyType::InnerJoin]));
    // b is inner with a and outer with c: outer wins
    assert_eq!(deps["b"], kinds(&[DependencyType::OuterJoin]));
    assert_eq!(deps["c"], kinds(&[DependencyType::OuterJoin]));
    // c-d still carries the default cross join
    assert_eq!(deps["d"], kinds(&[DependencyType::CrossJoin]));
}

#[test]
fn test_explicit_operator_replaces_default_cross_join() {
    let mut graph = graph_with(&["a", "b"]);
    let mut join = Node::join("j", vec!["a".into(), "b".into()]);
    set_operator(&mut join, "a", "b", OperatorItem::cross()).unwrap();
    add_operator(&mut join, "a", "b", OperatorItem::join_on(JoinSpec::Less, "id", "id")).unwrap();
    graph.add_node(join).unwrap();

    // The explicit operator replaced the cross join and is the only item.
    let deps = graph.augmented_dependents_of("j").unwrap();
    assert_eq!(deps["a"], kinds(&[DependencyType::InnerJoin]));
}

#[test]
fn test_concat_roles() {
    let mut graph = graph_with(&["a", "b", "c"]);
    let mut concat = Node::concat("u", vec!["a".into(), "b".into(), "c".into()], SetSpec::Union);
    set_operator(&mut concat, "b", "c", OperatorItem::bare(SetSpec::Minus)).unwrap();
    graph.add_node(concat).unwrap();

    let deps = graph.augmented_dependents_of("u").unwrap();
    assert_eq!(deps["a"], kinds(&[DependencyType::Union]));
    assert_eq!(deps["b"], kinds(&[DependencyType::Union, DependencyType::Minus]));
    assert_eq!(deps["c"], kinds(&[DependencyType::Minus]));
}

#[test]
fn test_variable_choice_table_is_an_output_edge() {
    let mut graph = graph_with(&["regions", "sales"]);
    let var = UserVariable::new("region").with_choices("regions", "id");
    let mut node = Node::mirror("filtered", MirrorTarget::local("sales"));
    node.filters.pre_runtime.append(
        ConditionItem::new(
            ColumnRef::new("k"),
            Condition::new(ConditionOp::EqualTo, vec![ConditionValue::Variable(var)]),
        ),
        JunctionOp::And,
    );
    graph.add_node(node).unwrap();

    let refs = graph.dependents_of("filtered").unwrap();
    assert!(refs.contains(&AssemblyRef::new(EdgeType::Input, "sales")));
    assert!(refs.contains(&AssemblyRef::new(EdgeType::Output, "regions")));

    let deps = graph.augmented_dependents_of("filtered").unwrap();
    assert_eq!(deps["sales"], kinds(&[DependencyType::Mirror]));
    assert_eq!(deps["regions"], kinds(&[DependencyType::VariableFilter]));
    assert_eq!(graph.dependers_of("regions"), vec!["filtered".to_string()]);
}

#[test]
fn test_subquery_and_expression_edges() {
    let mut graph = graph_with(&["lookup", "rates", "orders"]);
    let mut node = Node::rotate("r", "orders").with_projection(ColumnSelection::from_columns(vec![
        ColumnRef::expression("converted", "amount * rate", vec!["rates".into()]),
    ]));
    node.filters.pre_design.append(
        ConditionItem::new(
            ColumnRef::new("id"),
            Condition::new(
                ConditionOp::OneOf,
                vec![ConditionValue::Subquery(SubqueryValue {
                    node: "lookup".into(),
                    column: "id".into(),
                    values: Vec::new(),
                })],
            ),
        ),
        JunctionOp::And,
    );
    graph.add_node(node).unwrap();

    let deps = graph.augmented_dependents_of("r").unwrap();
    assert_eq!(deps["orders"], kinds(&[DependencyType::Rotation]));
    assert_eq!(deps["lookup"], kinds(&[DependencyType::Subquery]));
    assert_eq!(deps["rates"], kinds(&[DependencyType::Expression]));

    let refs = graph.dependents_of("r").unwrap();
    assert!(refs.contains(&AssemblyRef::new(EdgeType::View, "rates")));
}

#[test]
fn test_leaf_has_no_dependents() {
    let graph = graph_with(&["a"]);
    assert!(graph.dependents_of("a").unwrap().is_empty());
    assert!(graph.augmented_dependents_of("a").unwrap().is_empty());
    assert_eq!(
        graph.dependents_of("missing").unwrap_err(),
        PlanError::UnknownNode("missing".into())
    );
}
