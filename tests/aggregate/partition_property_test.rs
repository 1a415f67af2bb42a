//! Aggregating partitions separately and combining the partials must give
//! the same answer as aggregating every row at once.

use std::collections::HashMap;

use proptest::prelude::*;
use tabula::aggregate::{
    compute_partials, decompose, evaluate, AggregateCapabilities, AggregateFormula, AggregateRef,
};
use tabula::model::{ColumnRef, Value};

type Row = HashMap<String, Value>;

fn cell(v: Option<i64>) -> Value {
    v.map_or(Value::Null, Value::Int)
}

fn to_rows(cells: &[(Option<i64>, Option<i64>)]) -> Vec<Row> {
    cells
        .iter()
        .map(|(x, y)| {
            HashMap::from([("x".to_string(), cell(*x)), ("y".to_string(), cell(*y))])
        })
        .collect()
}

fn aggregate(formula: AggregateFormula) -> AggregateRef {
    let aggr = AggregateRef::new(formula, ColumnRef::new("x"));
    if formula.requires_secondary() {
        aggr.with_secondary(ColumnRef::new("y"))
    } else {
        aggr
    }
}

fn close(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => (a - b).abs() <= 1e-6 * a.abs().max(1.0),
        _ => false,
    }
}

/// Central value and combined partition value of one aggregate.
fn both_ways(formula: AggregateFormula, partitions: &[Vec<Row>]) -> (Option<f64>, Option<f64>) {
    let aggr = aggregate(formula);
    let composite = decompose(&aggr, &AggregateCapabilities::default()).unwrap();

    let all: Vec<Row> = partitions.iter().flatten().cloned().collect();
    let central = evaluate(&aggr, all.as_slice());

    let partials: Vec<Vec<Option<f64>>> = partitions
        .iter()
        .map(|rows| compute_partials(&composite, rows.as_slice()))
        .collect();
    (central, composite.combiner.combine(&partials))
}

const FORMULAS: [AggregateFormula; 12] = [
    AggregateFormula::Sum,
    AggregateFormula::Count,
    AggregateFormula::Min,
    AggregateFormula::Max,
    AggregateFormula::Avg,
    AggregateFormula::WeightedAvg,
    AggregateFormula::SumSq,
    AggregateFormula::Variance,
    AggregateFormula::StdDev,
    AggregateFormula::PopulationStdDev,
    AggregateFormula::Covariance,
    AggregateFormula::SumProduct,
];

/// Signed values, so a partition's weights can sum to zero.
fn partitions() -> impl Strategy<Value = Vec<Vec<(Option<i64>, Option<i64>)>>> {
    let value = || prop::option::weighted(0.8, -100i64..100);
    let row = (value(), value());
    prop::collection::vec(prop::collection::vec(row, 0..8), 1..5)
}

proptest! {
    #[test]
    fn prop_partitioned_equals_central(parts in partitions()) {
        let partitions: Vec<Vec<Row>> = parts.iter().map(|p| to_rows(p)).collect();
        for formula in FORMULAS {
            let (central, combined) = both_ways(formula, &partitions);
            prop_assert!(
                close(central, combined),
                "{}: central {:?} vs combined {:?}",
                formula,
                central,
                combined
            );
        }
    }
}

#[test]
fn test_correlation_across_partitions() {
    let xy = [(1, 2), (2, 4), (3, 5), (4, 4), (5, 5)];
    let cells: Vec<(Option<i64>, Option<i64>)> =
        xy.iter().map(|(x, y)| (Some(*x), Some(*y))).collect();
    let partitions = vec![to_rows(&cells[..2]), to_rows(&cells[2..])];

    let (central, combined) = both_ways(AggregateFormula::Correlation, &partitions);
    let expected = 6.0 / 60f64.sqrt();
    assert!((central.unwrap() - expected).abs() < 1e-12);
    assert!((combined.unwrap() - expected).abs() < 1e-9);
}

#[test]
fn test_weighted_average_across_partitions() {
    // x weighted by y
    let cells = [(Some(10), Some(1)), (Some(20), Some(3)), (Some(40), Some(0)), (None, Some(5))];
    let partitions = vec![to_rows(&cells[..1]), to_rows(&cells[1..])];

    let (central, combined) = both_ways(AggregateFormula::WeightedAvg, &partitions);
    assert_eq!(central, Some(17.5));
    assert!(close(central, combined));
}

#[test]
fn test_weighted_average_when_partition_weights_cancel() {
    let first = [(Some(10), Some(1)), (Some(20), Some(-1))];
    let second = [(Some(5), Some(2))];
    let partitions = vec![to_rows(&first), to_rows(&second)];

    let (central, combined) = both_ways(AggregateFormula::WeightedAvg, &partitions);
    assert_eq!(central, Some(0.0));
    assert_eq!(combined, Some(0.0));
}

#[test]
fn test_empty_partitions_are_neutral() {
    let cells = [(Some(3), None), (Some(5), None)];
    let partitions = vec![Vec::new(), to_rows(&cells), Vec::new()];
    for formula in [
        AggregateFormula::Sum,
        AggregateFormula::Avg,
        AggregateFormula::Variance,
        AggregateFormula::Min,
    ] {
        let (central, combined) = both_ways(formula, &partitions);
        assert!(close(central, combined), "{}", formula);
    }
}
