//! Split aggregates into per-partition partials plus a combiner.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{AggregateCapabilities, AggregateFormula, AggregateInfo, AggregateRef};
use crate::error::PlanError;
use crate::model::ColumnRef;

/// How partial results of one aggregate are merged into its final value.
///
/// Combiners read the partial values positionally, in the order of
/// [`CompositeAggregate::partials`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combiner {
    /// Sum of partials (SUM, COUNT, COUNT DISTINCT, SUMSQ, SUMPRODUCT).
    Sum,
    Min,
    Max,
    /// Average of the first partial weighted by the last partial.
    WeightedAverage,
    /// Sum of the first partials over the sum of the last partials.
    Ratio,
    /// Partials `[count, sum, sumsq]`, merged as `(n, mean, M2)` triples.
    Variance { population: bool, root: bool },
    /// Partials `[count, sum_x, sum_y, sum_xy]`.
    Covariance,
    /// Partials `[count, sum_x, sum_y, sum_xy, sumsq_x, sumsq_y]`.
    Correlation,
}

/// An aggregate expressed as partial aggregates plus a combiner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeAggregate {
    pub target: AggregateRef,
    /// Computed per partition.
    pub partials: Vec<AggregateRef>,
    pub combiner: Combiner,
    /// `unique_id` of the target.
    pub uid: String,
}

/// The formula cannot be evaluated per partition; evaluate it centrally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotDecomposable {
    pub formula: AggregateFormula,
    pub reason: String,
}

impl NotDecomposable {
    fn new(formula: AggregateFormula, reason: impl Into<String>) -> Self {
        Self {
            formula,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for NotDecomposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is not decomposable: {}", self.formula, self.reason)
    }
}

impl From<NotDecomposable> for PlanError {
    fn from(err: NotDecomposable) -> Self {
        PlanError::FormulaNotDecomposable {
            formula: err.formula.to_string(),
            reason: err.reason,
        }
    }
}

/// Partial aggregate with a deterministic output alias.
fn partial(formula: AggregateFormula, column: &ColumnRef, secondary: Option<&ColumnRef>) -> AggregateRef {
    let mut aggr = AggregateRef::new(formula, column.clone());
    aggr.secondary = secondary.cloned();
    let uid = aggr.unique_id();
    aggr.with_alias(format!("p_{}", &uid[..12]))
}

/// Decompose one aggregate.
pub fn decompose(
    aggr: &AggregateRef,
    caps: &AggregateCapabilities,
) -> Result<CompositeAggregate, NotDecomposable> {
    use AggregateFormula as F;

    let formula = aggr.formula;
    if !caps.distributed {
        return Err(NotDecomposable::new(formula, "distributed evaluation is disabled"));
    }

    let x = &aggr.column;
    let secondary = || {
        aggr.secondary
            .as_ref()
            .ok_or_else(|| NotDecomposable::new(formula, "second column is not set"))
    };

    let (partials, combiner) = match formula {
        F::Sum => (vec![partial(F::Sum, x, aggr.secondary.as_ref())], Combiner::Sum),
        F::Min => (vec![partial(F::Min, x, None)], Combiner::Min),
        F::Max => (vec![partial(F::Max, x, None)], Combiner::Max),
        F::Count => (vec![partial(F::Count, x, aggr.secondary.as_ref())], Combiner::Sum),
        F::CountDistinct => {
            if !caps.allow_distinct_merge {
                return Err(NotDecomposable::new(formula, "distinct merging is not allowed"));
            }
            (vec![partial(F::CountDistinct, x, None)], Combiner::Sum)
        }
        F::SumSq => {
            if !caps.sum_squares {
                return Err(NotDecomposable::new(formula, "source lacks SUMSQ"));
            }
            (vec![partial(F::SumSq, x, aggr.secondary.as_ref())], Combiner::Sum)
        }
        F::SumProduct => {
            if !caps.sum_product {
                return Err(NotDecomposable::new(formula, "source lacks SUMPRODUCT"));
            }
            (vec![partial(F::SumProduct, x, Some(secondary()?))], Combiner::Sum)
        }
        F::Avg => (
            vec![partial(F::Avg, x, None), partial(F::Count, x, None)],
            Combiner::WeightedAverage,
        ),
        F::WeightedAvg => {
            let w = secondary()?;
            if !caps.sum_product {
                return Err(NotDecomposable::new(formula, "source lacks SUMPRODUCT"));
            }
            // A partition whose weights cancel out has no mean of its own
            // but still contributes to the numerator.
            (
                vec![partial(F::SumProduct, x, Some(w)), partial(F::Sum, w, Some(x))],
                Combiner::Ratio,
            )
        }
        F::Variance | F::PopulationVariance | F::StdDev | F::PopulationStdDev => {
            if !caps.sum_squares {
                return Err(NotDecomposable::new(formula, "source lacks SUMSQ"));
            }
            let combiner = Combiner::Variance {
                population: matches!(formula, F::PopulationVariance | F::PopulationStdDev),
                root: matches!(formula, F::StdDev | F::PopulationStdDev),
            };
            (
                vec![
                    partial(F::Count, x, None),
                    partial(F::Sum, x, None),
                    partial(F::SumSq, x, None),
                ],
                combiner,
            )
        }
        F::Covariance | F::Correlation => {
            let y = secondary()?;
            if !caps.sum_product {
                return Err(NotDecomposable::new(formula, "source lacks SUMPRODUCT"));
            }
            let mut partials = vec![
                partial(F::Count, x, Some(y)),
                partial(F::Sum, x, Some(y)),
                partial(F::Sum, y, Some(x)),
                partial(F::SumProduct, x, Some(y)),
            ];
            if formula == F::Correlation {
                if !caps.sum_squares {
                    return Err(NotDecomposable::new(formula, "source lacks SUMSQ"));
                }
                partials.push(partial(F::SumSq, x, Some(y)));
                partials.push(partial(F::SumSq, y, Some(x)));
                (partials, Combiner::Correlation)
            } else {
                (partials, Combiner::Covariance)
            }
        }
        F::Median | F::Mode | F::First | F::Last => {
            return Err(NotDecomposable::new(
                formula,
                "result depends on the order or distribution of all rows",
            ));
        }
    };

    tracing::debug!(formula = %formula, partials = partials.len(), "decomposed aggregate");
    Ok(CompositeAggregate {
        target: aggr.clone(),
        partials,
        combiner,
        uid: aggr.unique_id(),
    })
}

/// Per-partition aggregation plus the composites that merge its output.
#[derive(Debug, Clone, PartialEq)]
pub struct PushdownPlan {
    /// What every partition computes: the original groups and the
    /// de-duplicated partial aggregates.
    pub child_info: AggregateInfo,
    pub composites: Vec<CompositeAggregate>,
}

pub(super) fn plan_pushdown(
    info: &AggregateInfo,
    caps: &AggregateCapabilities,
) -> Result<Arc<PushdownPlan>, NotDecomposable> {
    let mut child_info = AggregateInfo::new();
    for group in info.groups() {
        child_info.add_group(group.clone());
    }

    let mut seen = HashSet::new();
    let mut composites = Vec::with_capacity(info.aggregates().len());
    for aggr in info.aggregates() {
        let composite = decompose(aggr, caps).inspect_err(|err| {
            tracing::debug!(%err, "aggregate pushdown falls back to central evaluation");
        })?;
        for p in &composite.partials {
            if seen.insert(p.unique_id()) {
                child_info.add_aggregate(p.clone());
            }
        }
        composites.push(composite);
    }

    Ok(Arc::new(PushdownPlan {
        child_info,
        composites,
    }))
}
