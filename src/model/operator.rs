//! Operators connecting the sub-tables of composite nodes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Join kind between two sub-tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinSpec {
    Cross,
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
    /// Non-equi joins.
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    NotEqual,
}

impl JoinSpec {
    pub const ALL: [JoinSpec; 10] = [
        JoinSpec::Cross,
        JoinSpec::Inner,
        JoinSpec::LeftOuter,
        JoinSpec::RightOuter,
        JoinSpec::FullOuter,
        JoinSpec::Greater,
        JoinSpec::GreaterEqual,
        JoinSpec::Less,
        JoinSpec::LessEqual,
        JoinSpec::NotEqual,
    ];

    pub fn is_outer(&self) -> bool {
        matches!(
            self,
            JoinSpec::LeftOuter | JoinSpec::RightOuter | JoinSpec::FullOuter
        )
    }

    pub fn is_cross(&self) -> bool {
        matches!(self, JoinSpec::Cross)
    }

    /// Whether the join compares a column pair.
    pub fn needs_columns(&self) -> bool {
        !self.is_cross()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JoinSpec::Cross => "CROSS JOIN",
            JoinSpec::Inner => "INNER JOIN",
            JoinSpec::LeftOuter => "LEFT JOIN",
            JoinSpec::RightOuter => "RIGHT JOIN",
            JoinSpec::FullOuter => "FULL JOIN",
            JoinSpec::Greater => "JOIN >",
            JoinSpec::GreaterEqual => "JOIN >=",
            JoinSpec::Less => "JOIN <",
            JoinSpec::LessEqual => "JOIN <=",
            JoinSpec::NotEqual => "JOIN <>",
        }
    }
}

/// Set operation between two concatenated sub-tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetSpec {
    Union,
    Intersect,
    Minus,
}

impl SetSpec {
    pub const ALL: [SetSpec; 3] = [SetSpec::Union, SetSpec::Intersect, SetSpec::Minus];

    pub fn as_str(&self) -> &'static str {
        match self {
            SetSpec::Union => "UNION",
            SetSpec::Intersect => "INTERSECT",
            SetSpec::Minus => "MINUS",
        }
    }
}

/// Either kind of table operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    Join(JoinSpec),
    Set(SetSpec),
}

impl OperatorKind {
    /// Every operator kind, joins first.
    pub fn all() -> impl Iterator<Item = OperatorKind> {
        JoinSpec::ALL
            .into_iter()
            .map(OperatorKind::Join)
            .chain(SetSpec::ALL.into_iter().map(OperatorKind::Set))
    }

    pub fn is_join(&self) -> bool {
        matches!(self, OperatorKind::Join(_))
    }

    pub fn is_set(&self) -> bool {
        matches!(self, OperatorKind::Set(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorKind::Join(j) => j.as_str(),
            OperatorKind::Set(s) => s.as_str(),
        }
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<JoinSpec> for OperatorKind {
    fn from(spec: JoinSpec) -> Self {
        OperatorKind::Join(spec)
    }
}

impl From<SetSpec> for OperatorKind {
    fn from(spec: SetSpec) -> Self {
        OperatorKind::Set(spec)
    }
}

/// One operator between a pair of sub-tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorItem {
    pub kind: OperatorKind,
    /// Left join column (join operators other than cross).
    pub left_column: Option<String>,
    /// Right join column.
    pub right_column: Option<String>,
    /// Set operators only: keep duplicates (UNION ALL).
    pub all: bool,
}

impl OperatorItem {
    /// A cross join, or a set operator, which takes no columns.
    pub fn bare(kind: impl Into<OperatorKind>) -> Self {
        Self {
            kind: kind.into(),
            left_column: None,
            right_column: None,
            all: false,
        }
    }

    /// A column-comparing join.
    pub fn join_on(
        spec: JoinSpec,
        left_column: impl Into<String>,
        right_column: impl Into<String>,
    ) -> Self {
        Self {
            kind: OperatorKind::Join(spec),
            left_column: Some(left_column.into()),
            right_column: Some(right_column.into()),
            all: false,
        }
    }

    pub fn cross() -> Self {
        Self::bare(JoinSpec::Cross)
    }

    pub fn join_spec(&self) -> Option<JoinSpec> {
        match self.kind {
            OperatorKind::Join(j) => Some(j),
            OperatorKind::Set(_) => None,
        }
    }

    pub fn set_spec(&self) -> Option<SetSpec> {
        match self.kind {
            OperatorKind::Set(s) => Some(s),
            OperatorKind::Join(_) => None,
        }
    }
}

/// Ordered pair of sub-table names an operator connects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TablePair {
    pub left: String,
    pub right: String,
}

impl TablePair {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Whether the pair connects `a` and `b` in either direction.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.left == a && self.right == b) || (self.left == b && self.right == a)
    }

    pub fn involves(&self, name: &str) -> bool {
        self.left == name || self.right == name
    }

    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        if self.left == old {
            self.left = new.to_string();
            changed = true;
        }
        if self.right == old {
            self.right = new.to_string();
            changed = true;
        }
        changed
    }
}

impl fmt::Display for TablePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.left, self.right)
    }
}

/// All operators between one pair of sub-tables, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableOperator {
    pub items: Vec<OperatorItem>,
}

impl TableOperator {
    pub fn single(item: OperatorItem) -> Self {
        Self { items: vec![item] }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether every item is a cross join.
    pub fn is_cross(&self) -> bool {
        !self.items.is_empty()
            && self
                .items
                .iter()
                .all(|i| matches!(i.kind, OperatorKind::Join(JoinSpec::Cross)))
    }

    pub fn first_kind(&self) -> Option<OperatorKind> {
        self.items.first().map(|i| i.kind)
    }
}
