//! Execution collaborator interface.
//!
//! An [`Executor`] turns leaf nodes into row sources and applies every other
//! node's operator to its already materialized children. [`execute`] drives
//! an executor over a [`PlanSnapshot`], children first, evaluating each node
//! at most once.
//!
//! # Pipeline
//!
//! ```text
//! operator (scan | join | concat | mirror | rotate | unpivot)
//!   -> pre filter -> group -> post filter -> ranking
//!   -> sort -> distinct -> max rows -> projection
//! ```
//!
//! [`MemoryExecutor`] implements the pipeline over in-memory rows.

mod memory;
mod ops;

pub use memory::MemoryExecutor;

use std::collections::HashMap;

use crate::condition::RowAccess;
use crate::error::{PlanError, PlanResult};
use crate::graph::PlanSnapshot;
use crate::model::{ColumnRef, DataType, Node, NodeKind, SchemaColumn, Value};

// ============================================================================
// Tables
// ============================================================================

/// One output column of a row source.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnHeader {
    /// Node that produced the column.
    pub entity: Option<String>,
    pub name: String,
    pub data_type: DataType,
}

impl ColumnHeader {
    pub fn new(entity: impl Into<String>, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            entity: Some(entity.into()),
            name: name.into(),
            data_type,
        }
    }

    fn names(&self, column: &ColumnRef) -> bool {
        self.name == column.attribute || column.alias.as_deref() == Some(self.name.as_str())
    }

    /// Exact match, honouring the reference's entity qualifier.
    fn matches(&self, column: &ColumnRef) -> bool {
        let entity_ok = match (&column.entity, &self.entity) {
            (Some(want), Some(have)) => want == have,
            (Some(_), None) => false,
            (None, _) => true,
        };
        entity_ok && self.names(column)
    }
}

/// Index of the column a reference points at. Falls back to an unqualified
/// name match when no column carries the reference's entity.
pub(crate) fn position(columns: &[ColumnHeader], column: &ColumnRef) -> Option<usize> {
    columns
        .iter()
        .position(|h| h.matches(column))
        .or_else(|| columns.iter().position(|h| h.names(column)))
}

/// Borrowed view of one row, for condition and aggregate evaluation.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    columns: &'a [ColumnHeader],
    values: &'a [Value],
}

impl<'a> RowView<'a> {
    pub fn new(columns: &'a [ColumnHeader], values: &'a [Value]) -> Self {
        Self { columns, values }
    }
}

impl RowAccess for RowView<'_> {
    fn value_of(&self, column: &ColumnRef) -> Option<Value> {
        position(self.columns, column).and_then(|i| self.values.get(i).cloned())
    }
}

/// Fully materialized rows with their columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    pub columns: Vec<ColumnHeader>,
    pub rows: Vec<Vec<Value>>,
}

impl MemoryTable {
    pub fn new(columns: Vec<ColumnHeader>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Table whose columns follow `schema`, all produced by `entity`.
    pub fn from_schema(entity: &str, schema: &[SchemaColumn], rows: Vec<Vec<Value>>) -> Self {
        let columns = schema
            .iter()
            .map(|c| ColumnHeader::new(entity, c.name.clone(), c.data_type))
            .collect();
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, column: &ColumnRef) -> Option<usize> {
        position(&self.columns, column)
    }

    /// Values of one column by name, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<Value>> {
        let idx = self.column_index(&ColumnRef::new(name))?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }

    pub fn views(&self) -> Vec<RowView<'_>> {
        self.rows
            .iter()
            .map(|row| RowView::new(&self.columns, row))
            .collect()
    }

    /// Re-attribute every column to `entity`.
    pub(crate) fn requalify(mut self, entity: &str) -> Self {
        for column in &mut self.columns {
            column.entity = Some(entity.to_string());
        }
        self
    }

    pub fn into_source(self) -> Box<dyn RowSource> {
        Box::new(MemoryRows {
            columns: self.columns,
            rows: self.rows.into_iter(),
        })
    }
}

// ============================================================================
// Collaborator traits
// ============================================================================

/// A stream of rows with a known schema.
pub trait RowSource: Send {
    fn columns(&self) -> &[ColumnHeader];

    /// Next row, or `None` once exhausted.
    fn next_row(&mut self) -> Option<Vec<Value>>;

    /// Drain the remaining rows into a table.
    fn into_table(mut self: Box<Self>) -> MemoryTable {
        let columns = self.columns().to_vec();
        let mut rows = Vec::new();
        while let Some(row) = self.next_row() {
            rows.push(row);
        }
        MemoryTable { columns, rows }
    }
}

struct MemoryRows {
    columns: Vec<ColumnHeader>,
    rows: std::vec::IntoIter<Vec<Value>>,
}

impl RowSource for MemoryRows {
    fn columns(&self) -> &[ColumnHeader] {
        &self.columns
    }

    fn next_row(&mut self) -> Option<Vec<Value>> {
        self.rows.next()
    }
}

/// Evaluates node definitions into rows.
pub trait Executor {
    /// Rows of a leaf node (bound, embedded or inline data).
    fn scan(&self, node: &Node) -> PlanResult<Box<dyn RowSource>>;

    /// Apply a node's operator to its children, given in
    /// [`Node::children`] order.
    fn apply(&self, node: &Node, children: Vec<Box<dyn RowSource>>) -> PlanResult<Box<dyn RowSource>>;
}

// ============================================================================
// Driver
// ============================================================================

/// Evaluate `name` and everything it reads from.
pub fn execute(snapshot: &PlanSnapshot, name: &str, executor: &dyn Executor) -> PlanResult<MemoryTable> {
    let mut done = HashMap::new();
    let mut visiting = Vec::new();
    evaluate_node(snapshot, name, executor, &mut done, &mut visiting)
}

fn evaluate_node(
    snapshot: &PlanSnapshot,
    name: &str,
    executor: &dyn Executor,
    done: &mut HashMap<String, MemoryTable>,
    visiting: &mut Vec<String>,
) -> PlanResult<MemoryTable> {
    if let Some(table) = done.get(name) {
        return Ok(table.clone());
    }
    if let Some(pos) = visiting.iter().position(|v| v == name) {
        let mut cycle = visiting[pos..].to_vec();
        cycle.push(name.to_string());
        return Err(PlanError::cycle(cycle));
    }
    let node = snapshot
        .get(name)
        .ok_or_else(|| PlanError::UnknownNode(name.to_string()))?;

    visiting.push(name.to_string());
    let source = if node.is_leaf() {
        executor.scan(node)?
    } else {
        if let NodeKind::Mirror(m) = &node.kind {
            if !m.target.is_local_to(snapshot.id()) {
                return Err(PlanError::UnresolvedReference {
                    node: name.to_string(),
                    reference: m.target.node.clone(),
                });
            }
        }
        let mut children = Vec::new();
        for child in node.children() {
            children.push(evaluate_node(snapshot, child, executor, done, visiting)?.into_source());
        }
        executor.apply(node, children)?
    };
    visiting.pop();

    let table = source.into_table();
    tracing::debug!(node = name, rows = table.len(), "node evaluated");
    done.insert(name.to_string(), table.clone());
    Ok(table)
}
