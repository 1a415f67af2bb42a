//! Concatenation node operator table and column compatibility.

use super::{components, pair_key, SchemaLookup};
use crate::error::{PlanError, PlanResult};
use crate::model::{ConcatTable, DataType, OperatorItem, SetSpec, TableOperator, TablePair};

impl ConcatTable {
    /// Concatenation with `spec` between adjacent sub-tables.
    pub fn new(subtables: Vec<String>, spec: SetSpec) -> Self {
        let mut concat = ConcatTable::default();
        concat.fill_defaults(&subtables, spec);
        concat.subtables = subtables;
        concat
    }

    pub fn subtables(&self) -> &[String] {
        &self.subtables
    }

    pub fn operators(&self) -> impl Iterator<Item = (&TablePair, &TableOperator)> {
        self.operators.iter()
    }

    pub fn operator_pairs(&self) -> Vec<&TablePair> {
        self.operators.keys().collect()
    }

    pub fn operator(&self, a: &str, b: &str) -> Option<&TableOperator> {
        self.operators
            .iter()
            .find(|(pair, _)| pair.connects(a, b))
            .map(|(_, op)| op)
    }

    /// A concatenation needs at least two sub-tables.
    pub fn is_removable(&self) -> bool {
        self.subtables.len() < 2
    }

    pub(crate) fn set_subtables(&mut self, subtables: Vec<String>) {
        self.operators
            .retain(|pair, _| subtables.contains(&pair.left) && subtables.contains(&pair.right));
        self.fill_defaults(&subtables, SetSpec::Union);
        self.subtables = subtables;
    }

    fn fill_defaults(&mut self, subtables: &[String], spec: SetSpec) {
        for window in subtables.windows(2) {
            let (left, right) = (&window[0], &window[1]);
            if pair_key(&self.operators, left, right).is_none() {
                self.operators.insert(
                    TablePair::new(left.clone(), right.clone()),
                    TableOperator::single(OperatorItem::bare(spec)),
                );
            }
        }
    }

    /// Remove the operators between `left` and `right` and narrow the node to
    /// the largest group of sub-tables still connected. Returns true when
    /// fewer than two tables remain connected and the node must be deleted.
    pub(crate) fn remove_pair(&mut self, left: &str, right: &str) -> bool {
        if let Some(key) = pair_key(&self.operators, left, right) {
            self.operators.shift_remove(&key);
        }

        let groups = components(&self.subtables, &self.operators);
        // Largest group; ties go to the group holding the earliest table.
        let Some(largest) = groups
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| a.len().cmp(&b.len()).then(ib.cmp(ia)))
            .map(|(_, g)| g.clone())
        else {
            return true;
        };
        if largest.len() < 2 {
            return true;
        }

        if largest.len() < self.subtables.len() {
            tracing::debug!(kept = ?largest, "concatenation narrowed to connected sub-tables");
            self.operators
                .retain(|pair, _| largest.contains(&pair.left) && largest.contains(&pair.right));
            self.subtables = largest;
        }
        false
    }
}

/// Merged output column types of concatenated tables.
///
/// Adjacent tables must have equal visible column counts and pairwise
/// mergeable types.
pub fn merged_column_types(
    node: &str,
    tables: &[String],
    schema: &dyn SchemaLookup,
) -> PlanResult<Vec<DataType>> {
    let mut merged: Option<Vec<DataType>> = None;
    let mut previous: Option<&str> = None;

    for table in tables {
        let columns = schema.columns_of(table).ok_or_else(|| PlanError::UnresolvedReference {
            node: node.to_string(),
            reference: table.clone(),
        })?;
        let types = columns.public_types();

        merged = Some(match (merged, previous) {
            (Some(acc), Some(prev)) => {
                let incompatible = |message: String| PlanError::IncompatibleSubtables {
                    node: node.to_string(),
                    left: prev.to_string(),
                    right: table.clone(),
                    message,
                };
                if acc.len() != types.len() {
                    return Err(incompatible(format!(
                        "column count {} vs {}",
                        acc.len(),
                        types.len()
                    )));
                }
                acc.iter()
                    .zip(&types)
                    .enumerate()
                    .map(|(i, (a, b))| {
                        a.merge(*b).ok_or_else(|| {
                            incompatible(format!("column {}: {} vs {}", i + 1, a, b))
                        })
                    })
                    .collect::<PlanResult<Vec<_>>>()?
            }
            _ => types,
        });
        previous = Some(table);
    }

    Ok(merged.unwrap_or_default())
}
