//! Numeric evaluation of aggregates and of combiners over partial results.

use std::cmp::Ordering;

use super::{AggregateFormula, AggregateRef, Combiner, CompositeAggregate};
use crate::condition::RowAccess;
use crate::model::Value;

/// Running count, mean and sum of squared deviations.
#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    n: f64,
    mean: f64,
    m2: f64,
}

impl Moments {
    fn from_sums(n: f64, sum: f64, sumsq: f64) -> Self {
        if n <= 0.0 {
            return Self::default();
        }
        let mean = sum / n;
        Self {
            n,
            mean,
            m2: (sumsq - sum * sum / n).max(0.0),
        }
    }

    fn push(&mut self, x: f64) {
        self.n += 1.0;
        let delta = x - self.mean;
        self.mean += delta / self.n;
        self.m2 += delta * (x - self.mean);
    }

    /// Parallel merge of two partitions (Chan et al.).
    fn merge(self, other: Moments) -> Moments {
        if self.n == 0.0 {
            return other;
        }
        if other.n == 0.0 {
            return self;
        }
        let n = self.n + other.n;
        let delta = other.mean - self.mean;
        Moments {
            n,
            mean: self.mean + delta * other.n / n,
            m2: self.m2 + other.m2 + delta * delta * self.n * other.n / n,
        }
    }

    fn variance(&self, population: bool) -> Option<f64> {
        let denom = if population { self.n } else { self.n - 1.0 };
        (denom > 0.0).then(|| self.m2 / denom)
    }
}

/// Running co-moments of a column pair.
#[derive(Debug, Clone, Copy, Default)]
struct CoMoments {
    x: Moments,
    y: Moments,
    c: f64,
}

impl CoMoments {
    fn from_sums(n: f64, sx: f64, sy: f64, sxy: f64, sxx: f64, syy: f64) -> Self {
        if n <= 0.0 {
            return Self::default();
        }
        Self {
            x: Moments::from_sums(n, sx, sxx),
            y: Moments::from_sums(n, sy, syy),
            c: sxy - sx * sy / n,
        }
    }

    fn push(&mut self, x: f64, y: f64) {
        let dx = x - self.x.mean;
        self.x.push(x);
        self.y.push(y);
        self.c += dx * (y - self.y.mean);
    }

    fn merge(self, other: CoMoments) -> CoMoments {
        if self.x.n == 0.0 {
            return other;
        }
        if other.x.n == 0.0 {
            return self;
        }
        let n = self.x.n + other.x.n;
        let dx = other.x.mean - self.x.mean;
        let dy = other.y.mean - self.y.mean;
        CoMoments {
            x: self.x.merge(other.x),
            y: self.y.merge(other.y),
            c: self.c + other.c + dx * dy * self.x.n * other.x.n / n,
        }
    }

    fn covariance(&self) -> Option<f64> {
        (self.x.n > 1.0).then(|| self.c / (self.x.n - 1.0))
    }

    fn correlation(&self) -> Option<f64> {
        let denom = (self.x.m2 * self.y.m2).sqrt();
        (self.x.n > 1.0 && denom > 0.0).then(|| self.c / denom)
    }
}

fn numeric<R: RowAccess + ?Sized>(row: &R, column: &crate::model::ColumnRef) -> Option<f64> {
    row.value_of(column).and_then(|v| v.as_f64())
}

/// Evaluate an aggregate over all rows in one pass.
///
/// Returns `None` for an empty input where SQL would return NULL.
pub fn evaluate<R: RowAccess>(aggr: &AggregateRef, rows: &[R]) -> Option<f64> {
    use AggregateFormula as F;

    // Rows where the secondary column (if any) is present.
    let paired = |row: &R| -> bool {
        aggr.secondary
            .as_ref()
            .map_or(true, |sec| row.value_of(sec).is_some_and(|v| !v.is_null()))
    };
    let x_values: Vec<f64> = rows
        .iter()
        .filter(|r| paired(*r))
        .filter_map(|r| numeric(r, &aggr.column))
        .collect();
    let pair_values: Vec<(f64, f64)> = match &aggr.secondary {
        Some(sec) => rows
            .iter()
            .filter_map(|r| Some((numeric(r, &aggr.column)?, numeric(r, sec)?)))
            .collect(),
        None => Vec::new(),
    };
    let xs = || x_values.iter().copied();
    let pairs = || pair_values.iter().copied();

    match aggr.formula {
        F::Sum => xs().fold(None, |acc, x| Some(acc.unwrap_or(0.0) + x)),
        F::SumSq => xs().fold(None, |acc, x| Some(acc.unwrap_or(0.0) + x * x)),
        F::SumProduct => pairs().fold(None, |acc, (x, y)| Some(acc.unwrap_or(0.0) + x * y)),
        F::Count => Some(
            rows.iter()
                .filter(|r| paired(*r))
                .filter(|r| r.value_of(&aggr.column).is_some_and(|v| !v.is_null()))
                .count() as f64,
        ),
        F::CountDistinct => {
            let mut distinct: Vec<Value> = Vec::new();
            for row in rows {
                if let Some(v) = row.value_of(&aggr.column).filter(|v| !v.is_null()) {
                    if !distinct.contains(&v) {
                        distinct.push(v);
                    }
                }
            }
            Some(distinct.len() as f64)
        }
        F::Min => xs().fold(None, |acc: Option<f64>, x| Some(acc.map_or(x, |a| a.min(x)))),
        F::Max => xs().fold(None, |acc: Option<f64>, x| Some(acc.map_or(x, |a| a.max(x)))),
        F::Avg => {
            let (sum, n) = xs().fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
            (n > 0).then(|| sum / n as f64)
        }
        F::WeightedAvg => {
            let (num, den) = pairs().fold((0.0, 0.0), |(num, den), (x, w)| (num + x * w, den + w));
            (den != 0.0).then(|| num / den)
        }
        F::Variance | F::PopulationVariance | F::StdDev | F::PopulationStdDev => {
            let mut m = Moments::default();
            xs().for_each(|x| m.push(x));
            let var = m.variance(matches!(aggr.formula, F::PopulationVariance | F::PopulationStdDev))?;
            Some(if matches!(aggr.formula, F::StdDev | F::PopulationStdDev) {
                var.sqrt()
            } else {
                var
            })
        }
        F::Covariance | F::Correlation => {
            let mut m = CoMoments::default();
            pairs().for_each(|(x, y)| m.push(x, y));
            if aggr.formula == F::Covariance {
                m.covariance()
            } else {
                m.correlation()
            }
        }
        F::Median => {
            let mut values: Vec<f64> = xs().collect();
            if values.is_empty() {
                return None;
            }
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            let mid = values.len() / 2;
            Some(if values.len() % 2 == 0 {
                (values[mid - 1] + values[mid]) / 2.0
            } else {
                values[mid]
            })
        }
        F::Mode => {
            let mut values: Vec<f64> = xs().collect();
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            // Smallest of the most frequent values.
            let mut best: Option<(f64, usize)> = None;
            let mut i = 0;
            while i < values.len() {
                let current = values[i];
                let run = values[i..].iter().take_while(|v| **v == current).count().max(1);
                if best.map_or(true, |(_, count)| run > count) {
                    best = Some((current, run));
                }
                i += run;
            }
            best.map(|(v, _)| v)
        }
        F::First => xs().next(),
        F::Last => xs().last(),
    }
}

/// Partial values of one partition, aligned with `composite.partials`.
pub fn compute_partials<R: RowAccess>(composite: &CompositeAggregate, rows: &[R]) -> Vec<Option<f64>> {
    composite
        .partials
        .iter()
        .map(|p| evaluate(p, rows))
        .collect()
}

impl Combiner {
    /// Merge the partial vectors of several partitions into the final value.
    pub fn combine(&self, partitions: &[Vec<Option<f64>>]) -> Option<f64> {
        let at = |p: &Vec<Option<f64>>, i: usize| p.get(i).copied().flatten();
        let firsts = || partitions.iter().filter_map(move |p| at(p, 0));

        match self {
            Combiner::Sum => firsts().fold(None, |acc, x| Some(acc.unwrap_or(0.0) + x)),
            Combiner::Min => firsts().fold(None, |acc: Option<f64>, x| Some(acc.map_or(x, |a| a.min(x)))),
            Combiner::Max => firsts().fold(None, |acc: Option<f64>, x| Some(acc.map_or(x, |a| a.max(x)))),
            Combiner::WeightedAverage => {
                let (num, den) = partitions
                    .iter()
                    .filter_map(|p| Some((at(p, 0)?, at(p, p.len().checked_sub(1)?)?)))
                    .fold((0.0, 0.0), |(num, den), (v, w)| (num + v * w, den + w));
                (den != 0.0).then(|| num / den)
            }
            Combiner::Ratio => {
                let (num, den) = partitions
                    .iter()
                    .filter_map(|p| Some((at(p, 0)?, at(p, p.len().checked_sub(1)?)?)))
                    .fold((0.0, 0.0), |(num, den), (n, d)| (num + n, den + d));
                (den != 0.0).then(|| num / den)
            }
            Combiner::Variance { population, root } => {
                let merged = partitions
                    .iter()
                    .map(|p| {
                        Moments::from_sums(
                            at(p, 0).unwrap_or(0.0),
                            at(p, 1).unwrap_or(0.0),
                            at(p, 2).unwrap_or(0.0),
                        )
                    })
                    .fold(Moments::default(), Moments::merge);
                let var = merged.variance(*population)?;
                Some(if *root { var.sqrt() } else { var })
            }
            Combiner::Covariance | Combiner::Correlation => {
                let merged = partitions
                    .iter()
                    .map(|p| {
                        let v = |i| at(p, i).unwrap_or(0.0);
                        CoMoments::from_sums(v(0), v(1), v(2), v(3), v(4), v(5))
                    })
                    .fold(CoMoments::default(), CoMoments::merge);
                if *self == Combiner::Covariance {
                    merged.covariance()
                } else {
                    merged.correlation()
                }
            }
        }
    }
}
