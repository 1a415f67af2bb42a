//! Top-N / bottom-N ranking pseudo-conditions.
//!
//! A ranking condition always passes at row level; the execution stage reads
//! it to keep the first `n` groups ordered by the ranking column.

use serde::{Deserialize, Serialize};

use crate::model::{UserVariable, Value, VariableSupport, VariableTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingOrder {
    Top,
    Bottom,
}

/// The `n` of a ranking: a literal or a variable bound at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingN {
    Literal(usize),
    Variable(UserVariable),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingCondition {
    pub order: RankingOrder,
    pub n: RankingN,
    /// Column (usually an aggregate output) the groups are ranked by.
    pub ranking_column: Option<String>,
    /// Collapse the groups outside the top/bottom N into one "Others" group.
    pub group_others: bool,
}

impl RankingCondition {
    pub fn top(n: usize) -> Self {
        Self {
            order: RankingOrder::Top,
            n: RankingN::Literal(n),
            ranking_column: None,
            group_others: false,
        }
    }

    pub fn bottom(n: usize) -> Self {
        Self {
            order: RankingOrder::Bottom,
            ..Self::top(n)
        }
    }

    /// Rank with an `n` supplied by a variable.
    pub fn with_variable(order: RankingOrder, var: UserVariable) -> Self {
        Self {
            order,
            n: RankingN::Variable(var),
            ranking_column: None,
            group_others: false,
        }
    }

    pub fn by(mut self, column: impl Into<String>) -> Self {
        self.ranking_column = Some(column.into());
        self
    }

    pub fn grouping_others(mut self) -> Self {
        self.group_others = true;
        self
    }

    /// The resolved N, or `None` while its variable is unbound or not a
    /// non-negative integer.
    pub fn n(&self) -> Option<usize> {
        match &self.n {
            RankingN::Literal(n) => Some(*n),
            RankingN::Variable(var) => match var.values.first()? {
                Value::Int(i) if *i >= 0 => Some(*i as usize),
                Value::Float(f) if *f >= 0.0 => Some(f.trunc() as usize),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            },
        }
    }

    pub(crate) fn rename_entity(&mut self, old: &str, new: &str) -> bool {
        match &mut self.n {
            RankingN::Variable(var) => var.rename_entity(old, new),
            RankingN::Literal(_) => false,
        }
    }
}

impl VariableSupport for RankingCondition {
    fn all_variables(&self) -> Vec<UserVariable> {
        match &self.n {
            RankingN::Variable(var) => vec![var.clone()],
            RankingN::Literal(_) => Vec::new(),
        }
    }

    fn replace_variables(&mut self, table: &VariableTable) {
        if let RankingN::Variable(var) = &mut self.n {
            var.resolve(table);
        }
    }
}
