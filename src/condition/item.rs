//! Condition items: an attribute plus a relational, ranking or date-range test.

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::date_range::DateRangeCondition;
use super::ranking::RankingCondition;
use super::RowAccess;
use crate::model::{merge_variables, ColumnRef, DataType, UserVariable, Value, VariableSupport, VariableTable};

/// Relational operator of a standard condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    EqualTo,
    /// IN (...)
    OneOf,
    LessThan,
    GreaterThan,
    /// Inclusive on both ends.
    Between,
    StartingWith,
    Contains,
    /// SQL pattern: `%` any run, `_` any single character.
    Like,
    Null,
}

impl ConditionOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOp::EqualTo => "EQUAL_TO",
            ConditionOp::OneOf => "ONE_OF",
            ConditionOp::LessThan => "LESS_THAN",
            ConditionOp::GreaterThan => "GREATER_THAN",
            ConditionOp::Between => "BETWEEN",
            ConditionOp::StartingWith => "STARTING_WITH",
            ConditionOp::Contains => "CONTAINS",
            ConditionOp::Like => "LIKE",
            ConditionOp::Null => "NULL",
        }
    }

    /// Number of operand values the operator needs.
    fn arity(&self) -> usize {
        match self {
            ConditionOp::Null => 0,
            ConditionOp::Between => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for ConditionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Materialized result column of another node, used as a condition operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubqueryValue {
    pub node: String,
    pub column: String,
    /// Filled in by the execution collaborator before row evaluation.
    #[serde(default)]
    pub values: Vec<Value>,
}

/// One operand of a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionValue {
    Literal(Value),
    Variable(UserVariable),
    /// Another column of the same row.
    Field(ColumnRef),
    Subquery(SubqueryValue),
}

impl ConditionValue {
    /// Concrete values this operand stands for on the given row.
    fn resolve<R: RowAccess + ?Sized>(&self, row: &R, data_type: DataType) -> Vec<Value> {
        match self {
            ConditionValue::Literal(v) => vec![v.coerce(data_type)],
            ConditionValue::Variable(var) => {
                var.values.iter().map(|v| v.coerce(data_type)).collect()
            }
            ConditionValue::Field(col) => vec![row.value_of(col).unwrap_or(Value::Null)],
            ConditionValue::Subquery(sub) => {
                sub.values.iter().map(|v| v.coerce(data_type)).collect()
            }
        }
    }

    fn rename_entity(&mut self, old: &str, new: &str) -> bool {
        match self {
            ConditionValue::Literal(_) => false,
            ConditionValue::Variable(var) => var.rename_entity(old, new),
            ConditionValue::Field(col) => col.rename_entity(old, new),
            ConditionValue::Subquery(sub) => {
                if sub.node == old {
                    sub.node = new.to_string();
                    true
                } else {
                    false
                }
            }
        }
    }
}

impl From<Value> for ConditionValue {
    fn from(v: Value) -> Self {
        ConditionValue::Literal(v)
    }
}

/// A relational test against the attribute's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub op: ConditionOp,
    pub values: Vec<ConditionValue>,
    pub negated: bool,
    /// Makes LESS_THAN / GREATER_THAN inclusive.
    pub equal: bool,
    /// Type operands are coerced to before comparing.
    pub data_type: DataType,
    pub case_sensitive: bool,
}

impl Condition {
    pub fn new(op: ConditionOp, values: Vec<ConditionValue>) -> Self {
        Self {
            op,
            values,
            negated: false,
            equal: false,
            data_type: DataType::Unknown,
            case_sensitive: true,
        }
    }

    pub fn equal_to(value: impl Into<Value>) -> Self {
        Self::new(ConditionOp::EqualTo, vec![ConditionValue::Literal(value.into())])
    }

    pub fn one_of(values: Vec<Value>) -> Self {
        Self::new(
            ConditionOp::OneOf,
            values.into_iter().map(ConditionValue::Literal).collect(),
        )
    }

    pub fn less_than(value: impl Into<Value>, equal: bool) -> Self {
        let mut cond = Self::new(ConditionOp::LessThan, vec![ConditionValue::Literal(value.into())]);
        cond.equal = equal;
        cond
    }

    pub fn greater_than(value: impl Into<Value>, equal: bool) -> Self {
        let mut cond =
            Self::new(ConditionOp::GreaterThan, vec![ConditionValue::Literal(value.into())]);
        cond.equal = equal;
        cond
    }

    pub fn between(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::new(
            ConditionOp::Between,
            vec![
                ConditionValue::Literal(low.into()),
                ConditionValue::Literal(high.into()),
            ],
        )
    }

    pub fn like(pattern: impl Into<String>) -> Self {
        Self::new(
            ConditionOp::Like,
            vec![ConditionValue::Literal(Value::String(pattern.into()))],
        )
    }

    pub fn is_null() -> Self {
        Self::new(ConditionOp::Null, Vec::new())
    }

    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Whether the condition has the operands its operator needs.
    pub fn is_valid(&self) -> bool {
        match self.op {
            ConditionOp::OneOf => !self.values.is_empty(),
            op => self.values.len() >= op.arity(),
        }
    }

    /// Evaluate against the attribute value of one row.
    pub fn evaluate<R: RowAccess + ?Sized>(&self, value: &Value, row: &R) -> bool {
        let value = value.coerce(self.data_type);
        let result = self.test(&value, row);
        result != self.negated
    }

    fn test<R: RowAccess + ?Sized>(&self, value: &Value, row: &R) -> bool {
        if self.op == ConditionOp::Null {
            return value.is_null();
        }
        if value.is_null() {
            return false;
        }

        let operands: Vec<Vec<Value>> = self
            .values
            .iter()
            .map(|v| v.resolve(row, self.data_type))
            .collect();
        let first = || operands.iter().flatten();

        match self.op {
            ConditionOp::EqualTo | ConditionOp::OneOf => first().any(|v| v == value),
            ConditionOp::LessThan => first().next().is_some_and(|v| {
                matches!(value.compare(v), Some(Ordering::Less))
                    || (self.equal && matches!(value.compare(v), Some(Ordering::Equal)))
            }),
            ConditionOp::GreaterThan => first().next().is_some_and(|v| {
                matches!(value.compare(v), Some(Ordering::Greater))
                    || (self.equal && matches!(value.compare(v), Some(Ordering::Equal)))
            }),
            ConditionOp::Between => {
                let (Some(low), Some(high)) = (
                    operands.first().and_then(|v| v.first()),
                    operands.get(1).and_then(|v| v.first()),
                ) else {
                    return false;
                };
                matches!(value.compare(low), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(value.compare(high), Some(Ordering::Less | Ordering::Equal))
            }
            ConditionOp::StartingWith | ConditionOp::Contains | ConditionOp::Like => {
                let text = self.fold_case(&value.to_string());
                first().any(|operand| {
                    let pattern = self.fold_case(&operand.to_string());
                    match self.op {
                        ConditionOp::StartingWith => text.starts_with(&pattern),
                        ConditionOp::Contains => text.contains(&pattern),
                        _ => like_regex(&pattern).is_some_and(|re| re.is_match(&text)),
                    }
                })
            }
            ConditionOp::Null => value.is_null(),
        }
    }

    fn fold_case(&self, s: &str) -> String {
        if self.case_sensitive {
            s.to_string()
        } else {
            s.to_lowercase()
        }
    }
}

/// Translate a SQL LIKE pattern into an anchored regex.
pub(crate) fn like_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?s)^");
    for ch in pattern.chars() {
        match ch {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// The test half of a condition item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    Standard(Condition),
    /// Top/bottom-N; a no-op at row level.
    Ranking(RankingCondition),
    DateRange(DateRangeCondition),
}

/// Attribute plus test, the operand between junctions of a condition list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionItem {
    pub attribute: ColumnRef,
    pub condition: ConditionKind,
}

impl ConditionItem {
    pub fn new(attribute: ColumnRef, condition: Condition) -> Self {
        Self {
            attribute,
            condition: ConditionKind::Standard(condition),
        }
    }

    pub fn ranking(attribute: ColumnRef, ranking: RankingCondition) -> Self {
        Self {
            attribute,
            condition: ConditionKind::Ranking(ranking),
        }
    }

    pub fn date_range(attribute: ColumnRef, range: DateRangeCondition) -> Self {
        Self {
            attribute,
            condition: ConditionKind::DateRange(range),
        }
    }

    pub fn is_ranking(&self) -> bool {
        matches!(self.condition, ConditionKind::Ranking(_))
    }

    /// Evaluate against a row.
    pub fn evaluate<R: RowAccess + ?Sized>(&self, row: &R) -> bool {
        match &self.condition {
            ConditionKind::Ranking(_) => true,
            ConditionKind::Standard(cond) => {
                let value = row.value_of(&self.attribute).unwrap_or(Value::Null);
                cond.evaluate(&value, row)
            }
            ConditionKind::DateRange(range) => {
                let value = row.value_of(&self.attribute).unwrap_or(Value::Null);
                range.evaluate(&value)
            }
        }
    }

    /// Nodes referenced through sub-query operands.
    pub fn subquery_nodes(&self) -> Vec<&str> {
        match &self.condition {
            ConditionKind::Standard(cond) => cond
                .values
                .iter()
                .filter_map(|v| match v {
                    ConditionValue::Subquery(sub) => Some(sub.node.as_str()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Rewrite references to a renamed node. Returns true if anything changed.
    pub fn rename_entity(&mut self, old: &str, new: &str) -> bool {
        let mut changed = self.attribute.rename_entity(old, new);
        match &mut self.condition {
            ConditionKind::Standard(cond) => {
                for value in &mut cond.values {
                    changed |= value.rename_entity(old, new);
                }
            }
            ConditionKind::Ranking(rank) => changed |= rank.rename_entity(old, new),
            ConditionKind::DateRange(_) => {}
        }
        changed
    }
}

impl VariableSupport for ConditionItem {
    fn all_variables(&self) -> Vec<UserVariable> {
        let mut vars = Vec::new();
        match &self.condition {
            ConditionKind::Standard(cond) => {
                for value in &cond.values {
                    if let ConditionValue::Variable(var) = value {
                        merge_variables(&mut vars, vec![var.clone()]);
                    }
                }
            }
            ConditionKind::Ranking(rank) => merge_variables(&mut vars, rank.all_variables()),
            ConditionKind::DateRange(_) => {}
        }
        vars
    }

    fn replace_variables(&mut self, table: &VariableTable) {
        match &mut self.condition {
            ConditionKind::Standard(cond) => {
                for value in &mut cond.values {
                    if let ConditionValue::Variable(var) = value {
                        var.resolve(table);
                    }
                }
            }
            ConditionKind::Ranking(rank) => rank.replace_variables(table),
            ConditionKind::DateRange(_) => {}
        }
    }
}
