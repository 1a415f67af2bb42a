//! Aggregate specifications and their two-phase decomposition.
//!
//! A node's [`AggregateInfo`] lists its grouping columns and aggregate
//! columns. When the node's input is split into partitions (sub-tables of a
//! concatenation, shards of a source), each aggregate is decomposed into
//! partial aggregates computed per partition and a [`Combiner`] that merges
//! the partial results into the final value.
//!
//! ```text
//! VARIANCE(x)  ==>  per partition: COUNT(x), SUM(x), SUMSQ(x)
//!                   combine:       parallel (n, mean, M2) merge
//! ```

mod combine;
mod decompose;

pub use combine::{compute_partials, evaluate};
pub use decompose::{decompose, Combiner, CompositeAggregate, NotDecomposable, PushdownPlan};

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::condition::NamedGroupInfo;
use crate::model::{merge_variables, ColumnRef, UserVariable, VariableSupport, VariableTable};

// ============================================================================
// Formulas
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFormula {
    Sum,
    /// Non-null values.
    Count,
    CountDistinct,
    Avg,
    /// Average of the column weighted by the secondary column.
    WeightedAvg,
    Min,
    Max,
    /// Sample variance (n - 1).
    Variance,
    PopulationVariance,
    StdDev,
    PopulationStdDev,
    /// Sample covariance (n - 1) of the column and the secondary column.
    Covariance,
    Correlation,
    /// Sum of squares.
    SumSq,
    /// Sum of the products of the column and the secondary column.
    SumProduct,
    Median,
    Mode,
    First,
    Last,
}

impl AggregateFormula {
    pub const ALL: [AggregateFormula; 19] = [
        AggregateFormula::Sum,
        AggregateFormula::Count,
        AggregateFormula::CountDistinct,
        AggregateFormula::Avg,
        AggregateFormula::WeightedAvg,
        AggregateFormula::Min,
        AggregateFormula::Max,
        AggregateFormula::Variance,
        AggregateFormula::PopulationVariance,
        AggregateFormula::StdDev,
        AggregateFormula::PopulationStdDev,
        AggregateFormula::Covariance,
        AggregateFormula::Correlation,
        AggregateFormula::SumSq,
        AggregateFormula::SumProduct,
        AggregateFormula::Median,
        AggregateFormula::Mode,
        AggregateFormula::First,
        AggregateFormula::Last,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFormula::Sum => "SUM",
            AggregateFormula::Count => "COUNT",
            AggregateFormula::CountDistinct => "COUNT DISTINCT",
            AggregateFormula::Avg => "AVG",
            AggregateFormula::WeightedAvg => "WEIGHTED AVG",
            AggregateFormula::Min => "MIN",
            AggregateFormula::Max => "MAX",
            AggregateFormula::Variance => "VARIANCE",
            AggregateFormula::PopulationVariance => "POPULATION VARIANCE",
            AggregateFormula::StdDev => "STD DEV",
            AggregateFormula::PopulationStdDev => "POPULATION STD DEV",
            AggregateFormula::Covariance => "COVARIANCE",
            AggregateFormula::Correlation => "CORRELATION",
            AggregateFormula::SumSq => "SUMSQ",
            AggregateFormula::SumProduct => "SUMPRODUCT",
            AggregateFormula::Median => "MEDIAN",
            AggregateFormula::Mode => "MODE",
            AggregateFormula::First => "FIRST",
            AggregateFormula::Last => "LAST",
        }
    }

    /// Parse a formula name. Case, underscores and `STDDEV`-style spellings
    /// are accepted.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_uppercase().replace(['_', '-'], " ");
        let found = match normalized.as_str() {
            "COUNT ALL" => Some(AggregateFormula::Count),
            "AVERAGE" => Some(AggregateFormula::Avg),
            "STDDEV" => Some(AggregateFormula::StdDev),
            "VAR" => Some(AggregateFormula::Variance),
            "SUM OF SQUARES" => Some(AggregateFormula::SumSq),
            _ => None,
        };
        found.or_else(|| {
            Self::ALL
                .into_iter()
                .find(|f| f.as_str() == normalized || f.as_str().replace(' ', "") == normalized)
        })
    }

    /// Formulas over a column pair.
    pub fn requires_secondary(&self) -> bool {
        matches!(
            self,
            AggregateFormula::WeightedAvg
                | AggregateFormula::Covariance
                | AggregateFormula::Correlation
                | AggregateFormula::SumProduct
        )
    }
}

impl fmt::Display for AggregateFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Aggregate references
// ============================================================================

/// Canonical text of a column for hashing.
fn canonical_column(column: &ColumnRef) -> String {
    match &column.entity {
        Some(entity) => format!("{}.{}", entity, column.attribute),
        None => column.attribute.clone(),
    }
}

/// Stable key identifying an aggregate by formula and columns.
///
/// Two aggregates with the same key compute the same value over the same
/// rows, so their partial results can be shared.
pub fn unique_id(
    formula: AggregateFormula,
    column: &ColumnRef,
    secondary: Option<&ColumnRef>,
) -> String {
    let canonical = format!(
        "{}|{}|{}",
        formula.as_str(),
        canonical_column(column),
        secondary.map(canonical_column).unwrap_or_default()
    );
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..32].to_string()
}

/// One aggregate column: formula over a column (and optional second column).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRef {
    pub formula: AggregateFormula,
    pub column: ColumnRef,
    /// Weight / second variable. For SUM, SUMSQ and COUNT it restricts the
    /// rows to those where this column is not null.
    pub secondary: Option<ColumnRef>,
    pub alias: Option<String>,
}

impl AggregateRef {
    pub fn new(formula: AggregateFormula, column: ColumnRef) -> Self {
        Self {
            formula,
            column,
            secondary: None,
            alias: None,
        }
    }

    pub fn with_secondary(mut self, secondary: ColumnRef) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn unique_id(&self) -> String {
        unique_id(self.formula, &self.column, self.secondary.as_ref())
    }

    /// Output column name.
    pub fn output_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => match &self.secondary {
                Some(sec) => format!("{}({}, {})", self.formula, self.column.name(), sec.name()),
                None => format!("{}({})", self.formula, self.column.name()),
            },
        }
    }

    pub fn rename_entity(&mut self, old: &str, new: &str) -> bool {
        let mut changed = self.column.rename_entity(old, new);
        if let Some(sec) = &mut self.secondary {
            changed |= sec.rename_entity(old, new);
        }
        changed
    }
}

/// A grouping column, optionally bucketed through named groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRef {
    pub column: ColumnRef,
    pub named_group: Option<NamedGroupInfo>,
}

impl GroupRef {
    pub fn new(column: ColumnRef) -> Self {
        Self {
            column,
            named_group: None,
        }
    }

    pub fn with_named_group(mut self, info: NamedGroupInfo) -> Self {
        self.named_group = Some(info);
        self
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// What the partition-side data source can compute, and what merging the
/// caller allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateCapabilities {
    /// Master switch; when off nothing is decomposed.
    pub distributed: bool,
    /// Merge COUNT DISTINCT partials by SUM. Only correct when partitions
    /// hold disjoint values.
    pub allow_distinct_merge: bool,
    pub sum_squares: bool,
    pub sum_product: bool,
}

impl Default for AggregateCapabilities {
    fn default() -> Self {
        Self {
            distributed: true,
            allow_distinct_merge: false,
            sum_squares: true,
            sum_product: true,
        }
    }
}

// ============================================================================
// Aggregate info
// ============================================================================

type CachedPushdown = (AggregateCapabilities, Result<Arc<PushdownPlan>, NotDecomposable>);

/// Grouping and aggregate columns of a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateInfo {
    groups: Vec<GroupRef>,
    aggregates: Vec<AggregateRef>,
    #[serde(skip)]
    pushdown: OnceLock<CachedPushdown>,
}

impl PartialEq for AggregateInfo {
    fn eq(&self, other: &Self) -> bool {
        self.groups == other.groups && self.aggregates == other.aggregates
    }
}

impl AggregateInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: GroupRef) -> Self {
        self.add_group(group);
        self
    }

    pub fn with_aggregate(mut self, aggregate: AggregateRef) -> Self {
        self.add_aggregate(aggregate);
        self
    }

    pub fn groups(&self) -> &[GroupRef] {
        &self.groups
    }

    pub fn aggregates(&self) -> &[AggregateRef] {
        &self.aggregates
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.aggregates.is_empty()
    }

    pub fn add_group(&mut self, group: GroupRef) {
        self.groups.push(group);
        self.invalidate();
    }

    pub fn add_aggregate(&mut self, aggregate: AggregateRef) {
        self.aggregates.push(aggregate);
        self.invalidate();
    }

    pub fn remove_aggregate(&mut self, index: usize) -> Option<AggregateRef> {
        if index >= self.aggregates.len() {
            return None;
        }
        let removed = self.aggregates.remove(index);
        self.invalidate();
        Some(removed)
    }

    pub fn set_aggregates(&mut self, aggregates: Vec<AggregateRef>) {
        self.aggregates = aggregates;
        self.invalidate();
    }

    /// Partial aggregates and combiners for evaluating this info over
    /// partitions. Cached until the next edit.
    pub fn pushdown(
        &self,
        caps: &AggregateCapabilities,
    ) -> Result<Arc<PushdownPlan>, NotDecomposable> {
        if let Some((cached_caps, result)) = self.pushdown.get() {
            if cached_caps == caps {
                tracing::trace!("aggregate pushdown cache hit");
                return result.clone();
            }
        }
        let result = decompose::plan_pushdown(self, caps);
        // First computation wins; other capability sets are recomputed.
        let _ = self.pushdown.set((*caps, result.clone()));
        result
    }

    pub fn is_pushdown_cached(&self) -> bool {
        self.pushdown.get().is_some()
    }

    fn invalidate(&mut self) {
        self.pushdown = OnceLock::new();
    }

    pub fn rename_entity(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        for group in &mut self.groups {
            changed |= group.column.rename_entity(old, new);
            if let Some(info) = &mut group.named_group {
                changed |= info.rename_entity(old, new);
            }
        }
        for aggregate in &mut self.aggregates {
            changed |= aggregate.rename_entity(old, new);
        }
        if changed {
            self.invalidate();
        }
        changed
    }
}

impl VariableSupport for AggregateInfo {
    fn all_variables(&self) -> Vec<UserVariable> {
        let mut vars = Vec::new();
        for group in &self.groups {
            if let Some(info) = &group.named_group {
                merge_variables(&mut vars, info.all_variables());
            }
        }
        vars
    }

    fn replace_variables(&mut self, table: &VariableTable) {
        for group in &mut self.groups {
            if let Some(info) = &mut group.named_group {
                info.replace_variables(table);
            }
        }
        self.invalidate();
    }
}
