use tabula::aggregate::{AggregateFormula, AggregateInfo, AggregateRef, GroupRef};
use tabula::condition::{GroupDefinition, NamedGroupInfo, OthersPolicy, OTHERS_LABEL};
use tabula::exec::{execute, MemoryExecutor};
use tabula::model::{ColumnRef, DataType, Node, SchemaColumn, Value};
use tabula::PlanGraph;

fn amount() -> ColumnRef {
    ColumnRef::new("amount").with_type(DataType::Integer)
}

fn bands(others: OthersPolicy) -> NamedGroupInfo {
    let mut info = NamedGroupInfo::new(amount()).with_others(others);
    info.set_group(
        "Low",
        GroupDefinition::Range {
            start: Value::Int(0),
            end: Value::Int(10),
        },
    );
    info.set_group(
        "High",
        GroupDefinition::Range {
            start: Value::Int(10),
            end: Value::Int(100),
        },
    );
    info
}

#[test]
fn test_ranges_are_half_open() {
    let info = bands(OthersPolicy::LeaveOthers);
    assert_eq!(info.assign(&Value::Int(0)).as_deref(), Some("Low"));
    assert_eq!(info.assign(&Value::Int(5)).as_deref(), Some("Low"));
    assert_eq!(info.assign(&Value::Int(10)).as_deref(), Some("High"));
    assert_eq!(info.assign(&Value::Int(15)).as_deref(), Some("High"));
    assert_eq!(info.assign(&Value::Int(100)), None);
    assert_eq!(info.assign(&Value::Int(-1)), None);
    assert_eq!(info.assign(&Value::Null), None);
}

#[test]
fn test_others_are_grouped_on_request() {
    let info = bands(OthersPolicy::GroupOthers);
    assert_eq!(info.assign(&Value::Int(-1)).as_deref(), Some(OTHERS_LABEL));
    assert_eq!(info.assign(&Value::Int(5)).as_deref(), Some("Low"));
}

#[test]
fn test_first_matching_group_wins() {
    let mut info = bands(OthersPolicy::LeaveOthers);
    info.set_group(
        "Small",
        GroupDefinition::Range {
            start: Value::Int(0),
            end: Value::Int(50),
        },
    );
    assert_eq!(info.labels().collect::<Vec<_>>(), vec!["Low", "High", "Small"]);
    assert_eq!(info.assign(&Value::Int(20)).as_deref(), Some("High"));

    info.remove_group("High");
    assert_eq!(info.assign(&Value::Int(20)).as_deref(), Some("Small"));
}

#[test]
fn test_value_lists_cover_nulls() {
    let mut info = NamedGroupInfo::new(ColumnRef::new("region").with_type(DataType::String));
    info.set_group(
        "North",
        GroupDefinition::Values(vec![
            Value::from("N"),
            Value::from("NE"),
            Value::from("N"),
            Value::Null,
        ]),
    );

    // Duplicates collapse; the null becomes one IS NULL test.
    let cond = info.group_condition("North").unwrap();
    assert_eq!(cond.item_count(), 3);

    assert_eq!(info.assign(&Value::from("NE")).as_deref(), Some("North"));
    assert_eq!(info.assign(&Value::Null).as_deref(), Some("North"));
    assert_eq!(info.assign(&Value::from("S")), None);
    assert!(info.group_condition("South").is_none());
}

#[test]
fn test_grouping_by_named_group() {
    let mut executor = MemoryExecutor::new();
    executor.register(
        "db.sales",
        &[SchemaColumn::new("amount", DataType::Integer)],
        [5, 15, 7, 200].iter().map(|v| vec![Value::Int(*v)]).collect(),
    );

    let mut sales = Node::bound("sales", "db.sales");
    sales.group_spec = Some(
        AggregateInfo::new()
            .with_group(GroupRef::new(amount()).with_named_group(bands(OthersPolicy::GroupOthers)))
            .with_aggregate(AggregateRef::new(AggregateFormula::Count, amount()).with_alias("n")),
    );
    let mut graph = PlanGraph::new("g");
    graph.add_node(sales).unwrap();

    let table = execute(&graph.snapshot(), "sales", &executor).unwrap();
    assert_eq!(table.column_names(), vec!["amount", "n"]);
    assert_eq!(
        table.rows,
        vec![
            vec![Value::from("Low"), Value::Int(2)],
            vec![Value::from("High"), Value::Int(1)],
            vec![Value::from(OTHERS_LABEL), Value::Int(1)],
        ]
    );
}
