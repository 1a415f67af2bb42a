//! Relational operators over [`MemoryTable`]s.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::iter;

use super::{position, ColumnHeader, MemoryTable, RowView};
use crate::aggregate::{compute_partials, evaluate, AggregateFormula, AggregateInfo, AggregateRef, PushdownPlan};
use crate::condition::{ConditionList, RankingOrder, RowAccess};
use crate::error::{PlanError, PlanResult};
use crate::model::{
    ColumnRef, ColumnSelection, ConcatTable, DataType, JoinSpec, JoinTable, SetSpec, SortInfo,
    SortOrder, UnpivotNode, Value,
};

static NULL: Value = Value::Null;

fn cell(row: &[Value], index: usize) -> &Value {
    row.get(index).unwrap_or(&NULL)
}

/// Nulls sort last in either direction.
fn order_cells(a: &Value, b: &Value, descending: bool) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => {
            let ord = a.compare(b).unwrap_or(Ordering::Equal);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
    }
}

fn dedup(rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    let mut out: Vec<Vec<Value>> = Vec::with_capacity(rows.len());
    for row in rows {
        if !out.contains(&row) {
            out.push(row);
        }
    }
    out
}

// ============================================================================
// Filtering and ordering
// ============================================================================

pub(crate) fn filter(mut table: MemoryTable, list: &ConditionList) -> MemoryTable {
    if !list.is_empty() {
        table
            .rows
            .retain(|row| list.evaluate(&RowView::new(&table.columns, row)));
    }
    table
}

/// Keep the top or bottom `n` rows of every ranking in `list`, preserving
/// row order.
pub(crate) fn rank(mut table: MemoryTable, list: &ConditionList) -> MemoryTable {
    for (column, ranking) in list.rankings() {
        let Some(n) = ranking.n() else {
            tracing::warn!(column = %column.name(), "ranking without a resolved n is ignored");
            continue;
        };
        let key = ranking
            .ranking_column
            .as_deref()
            .map(ColumnRef::new)
            .unwrap_or_else(|| column.clone());
        let Some(index) = table.column_index(&key) else {
            continue;
        };

        let descending = ranking.order == RankingOrder::Top;
        let mut order: Vec<usize> = (0..table.len()).collect();
        order.sort_by(|a, b| {
            order_cells(
                cell(&table.rows[*a], index),
                cell(&table.rows[*b], index),
                descending,
            )
        });
        let keep: HashSet<usize> = order.into_iter().take(n).collect();
        table.rows = table
            .rows
            .into_iter()
            .enumerate()
            .filter(|(i, _)| keep.contains(i))
            .map(|(_, row)| row)
            .collect();
    }
    table
}

pub(crate) fn sort(mut table: MemoryTable, info: &SortInfo) -> MemoryTable {
    let keys: Vec<(usize, bool)> = info
        .keys
        .iter()
        .filter_map(|key| {
            let index = table.column_index(&key.column)?;
            Some((index, key.order == SortOrder::Descending))
        })
        .collect();
    if keys.is_empty() {
        return table;
    }
    table.rows.sort_by(|a, b| {
        keys.iter()
            .map(|(i, desc)| order_cells(cell(a, *i), cell(b, *i), *desc))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    table
}

pub(crate) fn distinct(mut table: MemoryTable) -> MemoryTable {
    table.rows = dedup(table.rows);
    table
}

/// Select the visible projection columns, attributed to `node`. An empty
/// projection passes every column through. Calculated columns are opaque
/// here and come out as nulls.
pub(crate) fn project(node: &str, projection: &ColumnSelection, table: MemoryTable) -> PlanResult<MemoryTable> {
    if projection.is_empty() {
        return Ok(table.requalify(node));
    }

    let mut indices = Vec::new();
    let mut columns = Vec::new();
    for column in projection.public_columns() {
        let index = if column.expression.is_some() {
            None
        } else {
            Some(position(&table.columns, column).ok_or_else(|| {
                PlanError::invalid(node, format!("column '{}' is not produced by its input", column.name()))
            })?)
        };
        let data_type = match (column.data_type, index) {
            (DataType::Unknown, Some(i)) => table.columns[i].data_type,
            (declared, _) => declared,
        };
        columns.push(ColumnHeader::new(node, column.name(), data_type));
        indices.push(index);
    }

    let rows = table
        .rows
        .iter()
        .map(|row| {
            indices
                .iter()
                .map(|i| i.map_or(Value::Null, |i| cell(row, i).clone()))
                .collect()
        })
        .collect();
    Ok(MemoryTable::new(columns, rows))
}

// ============================================================================
// Joins
// ============================================================================

/// One join condition between the accumulated table and the next sub-table.
struct Clause {
    spec: JoinSpec,
    /// (accumulated column, next column); `None` for cross joins.
    columns: Option<(usize, usize)>,
}

impl Clause {
    fn holds(&self, left: &[Value], right: &[Value]) -> bool {
        let Some((l, r)) = self.columns else {
            return true;
        };
        let Some(ord) = cell(left, l).compare(cell(right, r)) else {
            return false;
        };
        match self.spec {
            JoinSpec::Cross => true,
            JoinSpec::Inner | JoinSpec::LeftOuter | JoinSpec::RightOuter | JoinSpec::FullOuter => {
                ord == Ordering::Equal
            }
            JoinSpec::Greater => ord == Ordering::Greater,
            JoinSpec::GreaterEqual => ord != Ordering::Less,
            JoinSpec::Less => ord == Ordering::Less,
            JoinSpec::LessEqual => ord != Ordering::Greater,
            JoinSpec::NotEqual => ord != Ordering::Equal,
        }
    }
}

/// The same join seen from the other side.
fn flip(spec: JoinSpec) -> JoinSpec {
    match spec {
        JoinSpec::Greater => JoinSpec::Less,
        JoinSpec::GreaterEqual => JoinSpec::LessEqual,
        JoinSpec::Less => JoinSpec::Greater,
        JoinSpec::LessEqual => JoinSpec::GreaterEqual,
        JoinSpec::LeftOuter => JoinSpec::RightOuter,
        JoinSpec::RightOuter => JoinSpec::LeftOuter,
        other => other,
    }
}

fn join_column(columns: &[ColumnHeader], node: &str, table: &str, column: &str) -> PlanResult<usize> {
    let wanted = ColumnRef::qualified(table, column);
    columns
        .iter()
        .position(|h| h.matches(&wanted))
        .ok_or_else(|| PlanError::invalid(node, format!("join column '{}.{}' is missing", table, column)))
}

/// Join sub-tables left to right. Each sub-table joins the ones before it
/// through every operator connecting them; with none it is a cross join.
pub(crate) fn join(node: &str, join: &JoinTable, children: Vec<MemoryTable>) -> PlanResult<MemoryTable> {
    let mut tables = join.subtables().iter().zip(children);
    let Some((first, mut acc)) = tables.next() else {
        return Err(PlanError::invalid(node, "join has no sub-tables"));
    };
    let mut joined = vec![first.as_str()];

    for (name, right) in tables {
        let mut clauses = Vec::new();
        for (pair, op) in join.operators() {
            let (other, next_is_right) = if pair.right == *name && joined.contains(&pair.left.as_str()) {
                (&pair.left, true)
            } else if pair.left == *name && joined.contains(&pair.right.as_str()) {
                (&pair.right, false)
            } else {
                continue;
            };
            for item in &op.items {
                let Some(spec) = item.join_spec() else {
                    continue;
                };
                if spec.is_cross() {
                    clauses.push(Clause { spec, columns: None });
                    continue;
                }
                let (own, theirs, spec) = if next_is_right {
                    (&item.right_column, &item.left_column, spec)
                } else {
                    (&item.left_column, &item.right_column, flip(spec))
                };
                let (Some(own), Some(theirs)) = (own, theirs) else {
                    return Err(PlanError::invalid(
                        node,
                        format!("join between '{}' and '{}' has no columns", other, name),
                    ));
                };
                let l = join_column(&acc.columns, node, other, theirs)?;
                let r = join_column(&right.columns, node, name, own)?;
                clauses.push(Clause {
                    spec,
                    columns: Some((l, r)),
                });
            }
        }
        acc = join_pair(acc, right, &clauses);
        joined.push(name.as_str());
    }
    Ok(acc)
}

fn join_pair(left: MemoryTable, right: MemoryTable, clauses: &[Clause]) -> MemoryTable {
    let kind = clauses
        .iter()
        .map(|c| c.spec)
        .find(JoinSpec::is_outer)
        .unwrap_or(JoinSpec::Inner);
    let keep_left = matches!(kind, JoinSpec::LeftOuter | JoinSpec::FullOuter);
    let keep_right = matches!(kind, JoinSpec::RightOuter | JoinSpec::FullOuter);
    let (left_width, right_width) = (left.width(), right.width());

    let mut right_matched = vec![false; right.rows.len()];
    let mut rows = Vec::new();
    for l in &left.rows {
        let mut matched = false;
        for (ri, r) in right.rows.iter().enumerate() {
            if clauses.iter().all(|c| c.holds(l, r)) {
                matched = true;
                right_matched[ri] = true;
                rows.push(l.iter().chain(r).cloned().collect());
            }
        }
        if !matched && keep_left {
            rows.push(
                l.iter()
                    .cloned()
                    .chain(iter::repeat(Value::Null).take(right_width))
                    .collect(),
            );
        }
    }
    if keep_right {
        for (r, _) in right.rows.iter().zip(&right_matched).filter(|(_, m)| !**m) {
            rows.push(
                iter::repeat(Value::Null)
                    .take(left_width)
                    .chain(r.iter().cloned())
                    .collect(),
            );
        }
    }

    let mut columns = left.columns;
    columns.extend(right.columns);
    MemoryTable::new(columns, rows)
}

// ============================================================================
// Set operations and reshaping
// ============================================================================

/// Whether every operator of the concatenation is UNION ALL, so its
/// sub-tables are disjoint partitions of the result.
pub(crate) fn is_union_all(concat: &ConcatTable) -> bool {
    let mut items = concat.operators().flat_map(|(_, op)| op.items.iter()).peekable();
    items.peek().is_some() && items.all(|item| item.set_spec() == Some(SetSpec::Union) && item.all)
}

/// Combine sub-tables positionally, left to right.
pub(crate) fn concat(node: &str, concat: &ConcatTable, children: Vec<MemoryTable>) -> PlanResult<MemoryTable> {
    let mut tables = concat.subtables().iter().zip(children);
    let Some((first, mut acc)) = tables.next() else {
        return Err(PlanError::invalid(node, "concatenation has no sub-tables"));
    };
    let width = acc.width();
    let mut prev = first;

    for (name, next) in tables {
        if next.width() != width {
            return Err(PlanError::IncompatibleSubtables {
                node: node.to_string(),
                left: prev.clone(),
                right: name.clone(),
                message: format!("{} columns against {}", next.width(), width),
            });
        }
        let item = concat.operator(prev, name).and_then(|op| op.items.first());
        let spec = item.and_then(|i| i.set_spec()).unwrap_or(SetSpec::Union);
        let all = item.is_some_and(|i| i.all);

        let rows = match spec {
            SetSpec::Union => {
                let mut rows = acc.rows;
                rows.extend(next.rows);
                rows
            }
            SetSpec::Intersect => acc.rows.into_iter().filter(|r| next.rows.contains(r)).collect(),
            SetSpec::Minus => acc.rows.into_iter().filter(|r| !next.rows.contains(r)).collect(),
        };
        acc.rows = if all { rows } else { dedup(rows) };
        for (header, other) in acc.columns.iter_mut().zip(&next.columns) {
            header.data_type = header.data_type.merge(other.data_type).unwrap_or(DataType::String);
        }
        prev = name;
    }
    Ok(acc.requalify(node))
}

/// Transpose: input columns become rows, input rows become columns named by
/// their first cell.
pub(crate) fn rotate(node: &str, child: MemoryTable) -> MemoryTable {
    let mut columns = vec![ColumnHeader::new(node, "column", DataType::String)];
    for (i, row) in child.rows.iter().enumerate() {
        let label = match row.first() {
            None | Some(Value::Null) => format!("row{}", i + 1),
            Some(v) => v.to_string(),
        };
        columns.push(ColumnHeader::new(node, label, DataType::Unknown));
    }
    let rows = child
        .columns
        .iter()
        .enumerate()
        .skip(1)
        .map(|(j, header)| {
            iter::once(Value::String(header.name.clone()))
                .chain(child.rows.iter().map(|row| cell(row, j).clone()))
                .collect()
        })
        .collect();
    MemoryTable::new(columns, rows)
}

/// Columns to rows: each non-header column of each input row becomes one
/// `(headers.., column, value)` output row.
pub(crate) fn unpivot(node: &str, spec: &UnpivotNode, child: MemoryTable) -> PlanResult<MemoryTable> {
    let headers = spec.header_column_count;
    let width = child.width();
    if headers == 0 || headers >= width {
        return Err(PlanError::invalid(
            node,
            format!("header column count {} is out of range for {} columns", headers, width),
        ));
    }

    let value_type = child.columns[headers..]
        .iter()
        .map(|c| c.data_type)
        .reduce(|acc, t| acc.merge(t).unwrap_or(DataType::String))
        .unwrap_or(DataType::Unknown);
    let mut columns: Vec<ColumnHeader> = child.columns[..headers]
        .iter()
        .map(|c| ColumnHeader::new(node, c.name.clone(), c.data_type))
        .collect();
    columns.push(ColumnHeader::new(node, "column", DataType::String));
    columns.push(ColumnHeader::new(node, "value", value_type));
    for column in &mut columns {
        if let Some(t) = spec.type_overrides.get(&column.name) {
            column.data_type = *t;
        }
    }

    let mut rows = Vec::with_capacity(child.len() * (width - headers));
    for row in &child.rows {
        for (j, header) in child.columns.iter().enumerate().skip(headers) {
            let mut out: Vec<Value> = row.iter().take(headers).cloned().collect();
            out.push(Value::String(header.name.clone()));
            out.push(cell(row, j).clone());
            for (value, column) in out.iter_mut().zip(&columns) {
                *value = value.coerce(column.data_type);
            }
            rows.push(out);
        }
    }
    Ok(MemoryTable::new(columns, rows))
}

// ============================================================================
// Aggregation
// ============================================================================

fn group_key(info: &AggregateInfo, row: &RowView<'_>) -> Vec<Value> {
    info.groups()
        .iter()
        .map(|g| {
            let value = row.value_of(&g.column).unwrap_or(Value::Null);
            match &g.named_group {
                Some(named) => named.assign(&value).map_or(Value::Null, Value::String),
                None => value,
            }
        })
        .collect()
}

/// Rows bucketed by group key, in order of first appearance. Without
/// grouping columns everything lands in one bucket, even with no rows.
fn buckets<'a>(info: &AggregateInfo, views: &[RowView<'a>]) -> Vec<(Vec<Value>, Vec<RowView<'a>>)> {
    if info.groups().is_empty() {
        return vec![(Vec::new(), views.to_vec())];
    }
    let mut out: Vec<(Vec<Value>, Vec<RowView<'a>>)> = Vec::new();
    for view in views {
        let key = group_key(info, view);
        match out.iter_mut().find(|(k, _)| *k == key) {
            Some((_, rows)) => rows.push(*view),
            None => out.push((key, vec![*view])),
        }
    }
    out
}

fn is_count(formula: AggregateFormula) -> bool {
    matches!(formula, AggregateFormula::Count | AggregateFormula::CountDistinct)
}

fn aggregate_value(aggr: &AggregateRef, value: Option<f64>) -> Value {
    match value {
        None => Value::Null,
        Some(v) if is_count(aggr.formula) => Value::Int(v.round() as i64),
        Some(v) => Value::Float(v),
    }
}

fn group_columns(node: &str, info: &AggregateInfo, input: &[ColumnHeader]) -> Vec<ColumnHeader> {
    let groups = info.groups().iter().map(|g| {
        let data_type = if g.named_group.is_some() {
            DataType::String
        } else {
            position(input, &g.column).map_or(g.column.data_type, |i| input[i].data_type)
        };
        ColumnHeader::new(node, g.column.name(), data_type)
    });
    let aggregates = info.aggregates().iter().map(|a| {
        let data_type = if is_count(a.formula) {
            DataType::Long
        } else {
            DataType::Double
        };
        ColumnHeader::new(node, a.output_name(), data_type)
    });
    groups.chain(aggregates).collect()
}

/// Group and aggregate in one pass over all rows.
pub(crate) fn group(node: &str, info: &AggregateInfo, table: &MemoryTable) -> MemoryTable {
    let views = table.views();
    let rows = buckets(info, &views)
        .into_iter()
        .map(|(mut key, rows)| {
            key.extend(
                info.aggregates()
                    .iter()
                    .map(|a| aggregate_value(a, evaluate(a, rows.as_slice()))),
            );
            key
        })
        .collect();
    MemoryTable::new(group_columns(node, info, &table.columns), rows)
}

/// Group every partition separately, compute partial aggregates per
/// partition and merge them with each aggregate's combiner.
pub(crate) fn group_partitioned(
    node: &str,
    info: &AggregateInfo,
    plan: &PushdownPlan,
    partitions: &[MemoryTable],
    columns: &[ColumnHeader],
) -> MemoryTable {
    let views: Vec<Vec<RowView<'_>>> = partitions.iter().map(MemoryTable::views).collect();
    let per_partition: Vec<_> = views.iter().map(|v| buckets(info, v)).collect();

    let mut keys: Vec<Vec<Value>> = Vec::new();
    for (key, _) in per_partition.iter().flatten() {
        if !keys.contains(key) {
            keys.push(key.clone());
        }
    }

    let rows = keys
        .into_iter()
        .map(|key| {
            let mut row = key.clone();
            for composite in &plan.composites {
                let partials: Vec<Vec<Option<f64>>> = per_partition
                    .iter()
                    .filter_map(|part| part.iter().find(|(k, _)| *k == key))
                    .map(|(_, rows)| compute_partials(composite, rows.as_slice()))
                    .collect();
                row.push(aggregate_value(
                    &composite.target,
                    composite.combiner.combine(&partials),
                ));
            }
            row
        })
        .collect();
    MemoryTable::new(group_columns(node, info, columns), rows)
}
