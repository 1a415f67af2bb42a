use std::collections::HashMap;

use tabula::condition::{
    Condition, ConditionEntry, ConditionItem, ConditionList, ConditionOp, ConditionValue, Junction,
    JunctionOp,
};
use tabula::model::{ColumnRef, DataType, Value};

type Row = HashMap<String, Value>;

fn row(cells: &[(&str, Value)]) -> Row {
    cells
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn item(column: &str, condition: Condition) -> ConditionItem {
    ConditionItem::new(ColumnRef::new(column), condition)
}

fn flag(column: &str) -> ConditionItem {
    item(column, Condition::equal_to(true))
}

fn flags(a: bool, b: bool, c: bool) -> Row {
    row(&[
        ("a", Value::Bool(a)),
        ("b", Value::Bool(b)),
        ("c", Value::Bool(c)),
    ])
}

// ============================================================================
// Conditions
// ============================================================================

#[test]
fn test_comparisons() {
    let r = row(&[("n", Value::Int(10)), ("s", Value::from("Widget"))]);
    let holds = |column: &str, c: Condition| item(column, c).evaluate(&r);

    assert!(holds("n", Condition::equal_to(10)));
    assert!(!holds("n", Condition::less_than(10, false)));
    assert!(holds("n", Condition::less_than(10, true)));
    assert!(holds("n", Condition::greater_than(9, false)));
    assert!(holds("n", Condition::between(10, 20)));
    assert!(holds("n", Condition::between(1, 10)));
    assert!(!holds("n", Condition::between(11, 20)));
    assert!(holds("n", Condition::one_of(vec![Value::Int(3), Value::Int(10)])));
    assert!(holds("s", Condition::like("W%t")));
    assert!(holds("s", Condition::like("Widge_")));
    assert!(!holds("s", Condition::like("w%")));
    assert!(holds("s", Condition::equal_to(10).negate()));
}

#[test]
fn test_null_handling() {
    let r = row(&[("n", Value::Null)]);
    assert!(item("n", Condition::is_null()).evaluate(&r));
    assert!(!item("n", Condition::is_null().negate()).evaluate(&r));
    assert!(!item("n", Condition::equal_to(1)).evaluate(&r));
    assert!(!item("n", Condition::less_than(1, true)).evaluate(&r));
    // Missing columns read as null.
    assert!(item("missing", Condition::is_null()).evaluate(&r));
}

#[test]
fn test_typed_comparison_coerces_operands() {
    let r = row(&[("n", Value::from("42"))]);
    let cond = Condition::greater_than(Value::from("7"), false).with_type(DataType::Integer);
    assert!(item("n", cond).evaluate(&r));
    // Untyped, the strings compare lexically.
    assert!(!item("n", Condition::greater_than("7", false)).evaluate(&r));
}

#[test]
fn test_field_operand_reads_the_same_row() {
    let r = row(&[("shipped", Value::Int(5)), ("ordered", Value::Int(3))]);
    let cond = Condition::new(
        ConditionOp::GreaterThan,
        vec![ConditionValue::Field(ColumnRef::new("ordered"))],
    );
    assert!(item("shipped", cond.clone()).evaluate(&r));
    assert!(!item("ordered", cond).evaluate(&r));
}

#[test]
fn test_qualified_lookup() {
    let r = row(&[("orders.id", Value::Int(1)), ("id", Value::Int(2))]);
    let qualified = ConditionItem::new(ColumnRef::qualified("orders", "id"), Condition::equal_to(1));
    let plain = ConditionItem::new(ColumnRef::new("id"), Condition::equal_to(2));
    assert!(qualified.evaluate(&r));
    assert!(plain.evaluate(&r));
}

// ============================================================================
// Lists
// ============================================================================

#[test]
fn test_empty_list_accepts_everything() {
    let list = ConditionList::new();
    assert!(list.is_well_formed());
    assert!(list.evaluate(&flags(false, false, false)));
}

#[test]
fn test_equal_levels_fold_left() {
    // (a OR b) AND c
    let mut list = ConditionList::new();
    list.append(flag("a"), JunctionOp::And);
    list.append(flag("b"), JunctionOp::Or);
    list.append(flag("c"), JunctionOp::And);

    assert!(list.evaluate(&flags(false, true, true)));
    assert!(!list.evaluate(&flags(true, false, false)));
}

#[test]
fn test_higher_level_binds_tighter() {
    // a AND (b OR c)
    let mut list = ConditionList::new();
    list.append(flag("a"), JunctionOp::And);
    list.append(flag("b"), JunctionOp::And);
    list.append(flag("c"), JunctionOp::Or);
    assert!(list.set_level(1, 1));
    assert!(!list.set_level(2, 1));

    assert!(list.evaluate(&flags(true, false, true)));
    assert!(!list.evaluate(&flags(false, true, true)));

    // a OR (b AND c)
    let mut list = ConditionList::new();
    list.append(flag("a"), JunctionOp::And);
    list.append(flag("b"), JunctionOp::Or);
    list.append(flag("c"), JunctionOp::And);
    list.set_level(1, 1);
    assert!(list.evaluate(&flags(true, false, false)));
    assert!(!list.evaluate(&flags(false, true, false)));
}

#[test]
fn test_append_group_nests_the_other_list() {
    let either = ConditionList::joined(vec![flag("b"), flag("c")], JunctionOp::Or);
    let mut list = ConditionList::joined(vec![flag("a")], JunctionOp::And);
    list.append_group(&either, JunctionOp::And);

    assert_eq!(list.item_count(), 3);
    assert_eq!(list.junction(1).map(|j| j.level), Some(1));
    assert!(list.evaluate(&flags(true, false, true)));
    assert!(!list.evaluate(&flags(false, true, true)));

    // Appending an empty group is a no-op.
    let before = list.clone();
    list.append_group(&ConditionList::new(), JunctionOp::Or);
    assert_eq!(list, before);
}

#[test]
fn test_and_combines_two_lists_as_groups() {
    let left = ConditionList::joined(vec![flag("a"), flag("b")], JunctionOp::Or);
    let right = ConditionList::joined(vec![flag("b"), flag("c")], JunctionOp::Or);
    let both = left.and(&right);

    assert_eq!(both.item_count(), 4);
    assert!(both.evaluate(&flags(true, false, true)));
    assert!(!both.evaluate(&flags(true, false, false)));
    assert!(!both.evaluate(&flags(false, false, true)));
}

#[test]
fn test_remove_item_keeps_the_list_well_formed() {
    let mut list = ConditionList::joined(vec![flag("a"), flag("b"), flag("c")], JunctionOp::And);

    let removed = list.remove_item(1).unwrap();
    assert_eq!(removed.attribute.attribute, "b");
    assert!(list.is_well_formed());
    assert_eq!(list.item_count(), 2);

    let first = list.remove_item(0).unwrap();
    assert_eq!(first.attribute.attribute, "a");
    assert!(list.is_well_formed());
    assert_eq!(list.item(0).map(|i| i.attribute.attribute.as_str()), Some("c"));

    assert!(list.remove_item(5).is_none());
    list.remove_item(0);
    assert!(list.is_empty());
}

#[test]
fn test_trim_repairs_bulk_edits() {
    let raw = vec![
        ConditionEntry::Junction(Junction::new(JunctionOp::Or)),
        ConditionEntry::Item(flag("a")),
        ConditionEntry::Item(flag("b")),
        ConditionEntry::Junction(Junction::new(JunctionOp::Or)),
        ConditionEntry::Junction(Junction::new(JunctionOp::Or)),
        ConditionEntry::Item(flag("c")),
        ConditionEntry::Junction(Junction::new(JunctionOp::And)),
    ];
    assert!(ConditionList::from_entries(raw.clone()).is_none());

    // Stored lists are not checked on load.
    let mut list: ConditionList =
        serde_json::from_value(serde_json::json!({ "entries": raw })).unwrap();
    assert!(!list.is_well_formed());

    list.trim();
    assert!(list.is_well_formed());
    assert_eq!(list.item_count(), 3);
    assert_eq!(list.junction(0).map(|j| j.op), Some(JunctionOp::And));
    assert_eq!(list.junction(1).map(|j| j.op), Some(JunctionOp::Or));
    // (a AND b) OR c
    assert!(list.evaluate(&flags(false, false, true)));
    assert!(!list.evaluate(&flags(true, false, false)));
}
