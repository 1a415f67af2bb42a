use tabula::aggregate::{
    decompose, AggregateCapabilities, AggregateFormula, AggregateInfo, AggregateRef, Combiner,
    GroupRef,
};
use tabula::model::ColumnRef;
use tabula::PlanError;

use tabula::aggregate::AggregateFormula as F;

fn aggr(formula: AggregateFormula) -> AggregateRef {
    AggregateRef::new(formula, ColumnRef::new("x"))
}

fn paired(formula: AggregateFormula) -> AggregateRef {
    aggr(formula).with_secondary(ColumnRef::new("y"))
}

fn formulas(aggr: &AggregateRef) -> Vec<AggregateFormula> {
    decompose(aggr, &AggregateCapabilities::default())
        .unwrap()
        .partials
        .iter()
        .map(|p| p.formula)
        .collect()
}

#[test]
fn test_partials_per_formula() {
    assert_eq!(formulas(&aggr(F::Sum)), vec![F::Sum]);
    assert_eq!(formulas(&aggr(F::Count)), vec![F::Count]);
    assert_eq!(formulas(&aggr(F::Min)), vec![F::Min]);
    assert_eq!(formulas(&aggr(F::Avg)), vec![F::Avg, F::Count]);
    assert_eq!(formulas(&paired(F::WeightedAvg)), vec![F::SumProduct, F::Sum]);
    assert_eq!(formulas(&aggr(F::Variance)), vec![F::Count, F::Sum, F::SumSq]);
    assert_eq!(
        formulas(&paired(F::Covariance)),
        vec![F::Count, F::Sum, F::Sum, F::SumProduct]
    );
    assert_eq!(formulas(&paired(F::Correlation)).len(), 6);
}

#[test]
fn test_combiners() {
    let caps = AggregateCapabilities::default();
    let combiner = |a: AggregateRef| decompose(&a, &caps).unwrap().combiner;

    assert_eq!(combiner(aggr(F::Count)), Combiner::Sum);
    assert_eq!(combiner(aggr(F::Max)), Combiner::Max);
    assert_eq!(combiner(aggr(F::Avg)), Combiner::WeightedAverage);
    assert_eq!(combiner(paired(F::WeightedAvg)), Combiner::Ratio);
    assert_eq!(
        combiner(aggr(F::StdDev)),
        Combiner::Variance {
            population: false,
            root: true,
        }
    );
    assert_eq!(
        combiner(aggr(F::PopulationVariance)),
        Combiner::Variance {
            population: true,
            root: false,
        }
    );
    assert_eq!(combiner(paired(F::Covariance)), Combiner::Covariance);
}

#[test]
fn test_order_dependent_formulas_are_not_decomposable() {
    let caps = AggregateCapabilities::default();
    for f in [F::Median, F::Mode, F::First, F::Last] {
        let err = decompose(&aggr(f), &caps).unwrap_err();
        assert_eq!(err.formula, f);
        let plan_err: PlanError = err.into();
        assert!(matches!(
            plan_err,
            PlanError::FormulaNotDecomposable { ref formula, .. } if formula == f.as_str()
        ));
    }
}

#[test]
fn test_capabilities_gate_decomposition() {
    // Distinct counts overlap across partitions unless the source says otherwise.
    assert!(decompose(&aggr(F::CountDistinct), &AggregateCapabilities::default()).is_err());
    let disjoint = AggregateCapabilities {
        allow_distinct_merge: true,
        ..AggregateCapabilities::default()
    };
    assert!(decompose(&aggr(F::CountDistinct), &disjoint).is_ok());

    let no_squares = AggregateCapabilities {
        sum_squares: false,
        ..AggregateCapabilities::default()
    };
    assert!(decompose(&aggr(F::SumSq), &no_squares).is_err());
    assert!(decompose(&aggr(F::Variance), &no_squares).is_err());
    assert!(decompose(&paired(F::Covariance), &no_squares).is_ok());
    assert!(decompose(&paired(F::Correlation), &no_squares).is_err());

    let no_products = AggregateCapabilities {
        sum_product: false,
        ..AggregateCapabilities::default()
    };
    assert!(decompose(&paired(F::SumProduct), &no_products).is_err());
    assert!(decompose(&paired(F::Covariance), &no_products).is_err());
    assert!(decompose(&paired(F::WeightedAvg), &no_products).is_err());

    let central = AggregateCapabilities {
        distributed: false,
        ..AggregateCapabilities::default()
    };
    assert!(decompose(&aggr(F::Sum), &central).is_err());
}

#[test]
fn test_pair_formulas_need_a_second_column() {
    let caps = AggregateCapabilities::default();
    assert!(decompose(&aggr(F::Covariance), &caps).is_err());
    assert!(decompose(&aggr(F::WeightedAvg), &caps).is_err());
    assert!(F::Correlation.requires_secondary());
    assert!(!F::Sum.requires_secondary());
}

#[test]
fn test_unique_ids_are_stable() {
    let a = aggr(F::Sum);
    assert_eq!(a.unique_id().len(), 32);
    assert_eq!(a.unique_id(), a.clone().with_alias("total").unique_id());
    assert_ne!(a.unique_id(), aggr(F::Count).unique_id());
    assert_ne!(
        a.unique_id(),
        AggregateRef::new(F::Sum, ColumnRef::qualified("t", "x")).unique_id()
    );

    let caps = AggregateCapabilities::default();
    let first = decompose(&aggr(F::Variance), &caps).unwrap();
    let second = decompose(&aggr(F::Variance), &caps).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.uid, aggr(F::Variance).unique_id());
}

#[test]
fn test_output_names() {
    assert_eq!(aggr(F::Sum).output_name(), "SUM(x)");
    assert_eq!(paired(F::Covariance).output_name(), "COVARIANCE(x, y)");
    assert_eq!(aggr(F::CountDistinct).with_alias("n").output_name(), "n");
}

#[test]
fn test_formula_names_parse() {
    assert_eq!(AggregateFormula::parse("stddev"), Some(F::StdDev));
    assert_eq!(AggregateFormula::parse("count_distinct"), Some(F::CountDistinct));
    assert_eq!(AggregateFormula::parse("WeightedAvg"), Some(F::WeightedAvg));
    assert_eq!(AggregateFormula::parse(" sum "), Some(F::Sum));
    assert_eq!(AggregateFormula::parse("bogus"), None);
    assert_eq!(F::CountDistinct.to_string(), "COUNT DISTINCT");
    for formula in AggregateFormula::ALL {
        assert_eq!(AggregateFormula::parse(formula.as_str()), Some(formula));
    }
}

#[test]
fn test_pushdown_shares_partials_and_is_cached() {
    let caps = AggregateCapabilities::default();
    let mut info = AggregateInfo::new()
        .with_group(GroupRef::new(ColumnRef::new("region")))
        .with_aggregate(aggr(F::Avg))
        .with_aggregate(aggr(F::Variance));
    assert!(!info.is_pushdown_cached());

    let plan = info.pushdown(&caps).unwrap();
    assert!(info.is_pushdown_cached());
    assert_eq!(plan.composites.len(), 2);
    assert_eq!(plan.child_info.groups(), info.groups());
    // COUNT(x) is shared between AVG and VARIANCE.
    assert_eq!(plan.child_info.aggregates().len(), 4);

    info.add_aggregate(aggr(F::Median));
    assert!(!info.is_pushdown_cached());
    assert!(info.pushdown(&caps).is_err());

    info.set_aggregates(vec![aggr(F::Sum)]);
    assert_eq!(info.pushdown(&caps).unwrap().composites.len(), 1);
}
