//! In-memory executor.

use std::collections::HashMap;
use std::sync::Arc;

use super::{ops, ColumnHeader, Executor, MemoryTable, RowSource};
use crate::aggregate::AggregateCapabilities;
use crate::cache::{BlockStore, DecodeCache};
use crate::error::{PlanError, PlanResult};
use crate::model::{FilterStage, Node, NodeKind, SchemaColumn, Value};

/// Evaluates plans over registered in-memory source tables.
///
/// Bound nodes read the table registered under their source name; embedded
/// nodes decode through the shared [`DecodeCache`]. Grouping over a
/// UNION ALL concatenation aggregates each sub-table separately and merges
/// the partials whenever every aggregate decomposes under the configured
/// capabilities.
pub struct MemoryExecutor {
    sources: HashMap<String, MemoryTable>,
    decode_cache: Arc<DecodeCache>,
    store: Option<Arc<dyn BlockStore>>,
    capabilities: AggregateCapabilities,
}

impl Default for MemoryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
            decode_cache: Arc::new(DecodeCache::default()),
            store: None,
            capabilities: AggregateCapabilities::default(),
        }
    }

    pub fn with_decode_cache(mut self, cache: Arc<DecodeCache>) -> Self {
        self.decode_cache = cache;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn BlockStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_capabilities(mut self, capabilities: AggregateCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Register the rows a bound source name reads.
    pub fn register(&mut self, source: impl Into<String>, schema: &[SchemaColumn], rows: Vec<Vec<Value>>) {
        let source = source.into();
        let table = MemoryTable::from_schema(&source, schema, rows);
        self.sources.insert(source, table);
    }

    /// Everything after the node's operator: filters, grouping, ranking,
    /// ordering, limits and the projection.
    fn finish(
        &self,
        node: &Node,
        table: MemoryTable,
        partitions: Option<Vec<MemoryTable>>,
    ) -> PlanResult<MemoryTable> {
        let name = node.name();
        let pre = node.filters.effective(FilterStage::Pre);
        let mut table = ops::filter(table, &pre);

        let grouping = node.group_spec.as_ref().filter(|info| !info.is_empty());
        if let Some(info) = grouping {
            table = match partitions {
                Some(parts) => match info.pushdown(&self.capabilities) {
                    Ok(plan) => {
                        let parts: Vec<MemoryTable> =
                            parts.into_iter().map(|p| ops::filter(p, &pre)).collect();
                        tracing::debug!(node = name, partitions = parts.len(), "aggregating per partition");
                        ops::group_partitioned(name, info, &plan, &parts, &table.columns)
                    }
                    Err(reason) => {
                        tracing::debug!(node = name, %reason, "aggregating centrally");
                        ops::group(name, info, &table)
                    }
                },
                None => ops::group(name, info, &table),
            };
            table = ops::filter(table, &node.filters.effective(FilterStage::Post));
        }

        table = ops::rank(table, &node.filters.effective(FilterStage::Ranking));
        if let Some(sort) = &node.sort_spec {
            table = ops::sort(table, sort);
        }
        if node.distinct {
            table = ops::distinct(table);
        }
        if let Some(max) = node.max_rows {
            table.rows.truncate(max);
        }

        if grouping.is_some() {
            Ok(table.requalify(name))
        } else {
            ops::project(name, &node.projection, table)
        }
    }
}

fn single(node: &Node, mut children: Vec<MemoryTable>) -> PlanResult<MemoryTable> {
    match children.len() {
        1 => Ok(children.remove(0)),
        n => Err(PlanError::invalid(
            node.name(),
            format!("{} node takes one input, got {}", node.tag(), n),
        )),
    }
}

impl Executor for MemoryExecutor {
    fn scan(&self, node: &Node) -> PlanResult<Box<dyn RowSource>> {
        let name = node.name();
        let table = match &node.kind {
            NodeKind::Bound(bound) => {
                let table = self.sources.get(&bound.source).ok_or_else(|| {
                    PlanError::UnresolvedReference {
                        node: name.to_string(),
                        reference: bound.source.clone(),
                    }
                })?;
                ops::filter(table.clone().requalify(name), &bound.query_filter)
            }
            NodeKind::Embedded(embedded) => {
                let rows = self.decode_cache.rows(embedded, self.store.as_deref())?;
                MemoryTable::from_schema(name, &embedded.schema, rows)
            }
            NodeKind::DataInline(inline) => MemoryTable::new(
                node.projection
                    .iter()
                    .map(|c| ColumnHeader::new(name, c.name(), c.data_type))
                    .collect(),
                inline.rows.clone(),
            ),
            _ => {
                return Err(PlanError::invalid(
                    name,
                    format!("{} node is not a leaf", node.tag()),
                ))
            }
        };
        Ok(self.finish(node, table, None)?.into_source())
    }

    fn apply(&self, node: &Node, children: Vec<Box<dyn RowSource>>) -> PlanResult<Box<dyn RowSource>> {
        let name = node.name();
        let children: Vec<MemoryTable> = children.into_iter().map(|c| c.into_table()).collect();

        let (table, partitions) = match &node.kind {
            NodeKind::Join(join) => (ops::join(name, join, children)?, None),
            NodeKind::Concatenate(concat) => {
                let partitions = ops::is_union_all(concat).then(|| {
                    children
                        .iter()
                        .cloned()
                        .map(|t| t.requalify(name))
                        .collect::<Vec<_>>()
                });
                (ops::concat(name, concat, children)?, partitions)
            }
            // Keeps the target's column attribution; mirrored projections
            // are qualified by the target name.
            NodeKind::Mirror(_) => (single(node, children)?, None),
            NodeKind::Rotate(_) => (ops::rotate(name, single(node, children)?), None),
            NodeKind::Unpivot(unpivot) => (ops::unpivot(name, unpivot, single(node, children)?)?, None),
            NodeKind::Bound(_) | NodeKind::Embedded(_) | NodeKind::DataInline(_) => {
                return self.scan(node);
            }
        };
        Ok(self.finish(node, table, partitions)?.into_source())
    }
}
