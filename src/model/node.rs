//! Plan nodes.
//!
//! A [`Node`] is one operator of the logical plan: the shared envelope
//! (projection, filter slots, grouping, sorting, row limits) plus a
//! [`NodeKind`] payload naming the operator itself. Nodes refer to each other
//! by name only; the owning [`PlanGraph`](crate::graph::PlanGraph) resolves
//! names.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::column::ColumnSelection;
use super::embedded::EmbeddedTable;
use super::operator::{SetSpec, TableOperator, TablePair};
use super::sort::SortInfo;
use super::types::{DataType, Value};
use super::variable::{merge_variables, UserVariable, VariableSupport, VariableTable};
use crate::aggregate::AggregateInfo;
use crate::condition::ConditionList;
use crate::error::{PlanError, PlanResult};

// ============================================================================
// Identity
// ============================================================================

/// Identity of one plan graph, used by cross-graph mirror references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphId(Uuid);

impl GraphId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for GraphId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

// ============================================================================
// Filter slots
// ============================================================================

/// When a filter applies relative to grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    /// Before aggregation (WHERE).
    Pre,
    /// After aggregation (HAVING).
    Post,
    /// Top/bottom-N selection.
    Ranking,
}

/// Who owns a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOrigin {
    /// Saved with the plan.
    Design,
    /// Supplied for one evaluation.
    Runtime,
}

/// The six condition-list slots every node carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSlots {
    pub pre_design: ConditionList,
    pub pre_runtime: ConditionList,
    pub post_design: ConditionList,
    pub post_runtime: ConditionList,
    pub ranking_design: ConditionList,
    pub ranking_runtime: ConditionList,
}

impl FilterSlots {
    pub fn get(&self, stage: FilterStage, origin: FilterOrigin) -> &ConditionList {
        match (stage, origin) {
            (FilterStage::Pre, FilterOrigin::Design) => &self.pre_design,
            (FilterStage::Pre, FilterOrigin::Runtime) => &self.pre_runtime,
            (FilterStage::Post, FilterOrigin::Design) => &self.post_design,
            (FilterStage::Post, FilterOrigin::Runtime) => &self.post_runtime,
            (FilterStage::Ranking, FilterOrigin::Design) => &self.ranking_design,
            (FilterStage::Ranking, FilterOrigin::Runtime) => &self.ranking_runtime,
        }
    }

    pub fn get_mut(&mut self, stage: FilterStage, origin: FilterOrigin) -> &mut ConditionList {
        match (stage, origin) {
            (FilterStage::Pre, FilterOrigin::Design) => &mut self.pre_design,
            (FilterStage::Pre, FilterOrigin::Runtime) => &mut self.pre_runtime,
            (FilterStage::Post, FilterOrigin::Design) => &mut self.post_design,
            (FilterStage::Post, FilterOrigin::Runtime) => &mut self.post_runtime,
            (FilterStage::Ranking, FilterOrigin::Design) => &mut self.ranking_design,
            (FilterStage::Ranking, FilterOrigin::Runtime) => &mut self.ranking_runtime,
        }
    }

    pub fn set(&mut self, stage: FilterStage, origin: FilterOrigin, list: ConditionList) {
        *self.get_mut(stage, origin) = list;
    }

    /// Design and runtime filters of one stage combined with AND.
    pub fn effective(&self, stage: FilterStage) -> ConditionList {
        let design = self.get(stage, FilterOrigin::Design);
        let runtime = self.get(stage, FilterOrigin::Runtime);
        match (design.is_empty(), runtime.is_empty()) {
            (_, true) => design.clone(),
            (true, false) => runtime.clone(),
            (false, false) => design.and(runtime),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (FilterStage, FilterOrigin, &ConditionList)> {
        [
            (FilterStage::Pre, FilterOrigin::Design, &self.pre_design),
            (FilterStage::Pre, FilterOrigin::Runtime, &self.pre_runtime),
            (FilterStage::Post, FilterOrigin::Design, &self.post_design),
            (FilterStage::Post, FilterOrigin::Runtime, &self.post_runtime),
            (FilterStage::Ranking, FilterOrigin::Design, &self.ranking_design),
            (FilterStage::Ranking, FilterOrigin::Runtime, &self.ranking_runtime),
        ]
        .into_iter()
    }

    pub fn lists_mut(&mut self) -> impl Iterator<Item = &mut ConditionList> {
        [
            &mut self.pre_design,
            &mut self.pre_runtime,
            &mut self.post_design,
            &mut self.post_runtime,
            &mut self.ranking_design,
            &mut self.ranking_runtime,
        ]
        .into_iter()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().all(|(_, _, list)| list.is_empty())
    }
}

// ============================================================================
// Node payloads
// ============================================================================

/// Leaf reading from an external data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundSource {
    /// Data-source qualified table or query name.
    pub source: String,
    /// Conditions pushed into the source query itself.
    pub query_filter: ConditionList,
    /// Nodes read by a parameterized or scripted source's expressions.
    pub scripted_refs: Vec<String>,
}

/// Join of two or more sub-tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinTable {
    pub(crate) subtables: Vec<String>,
    #[serde(with = "indexmap::map::serde_seq")]
    pub(crate) operators: IndexMap<TablePair, TableOperator>,
}

/// Set operation (union/intersect/minus) over two or more sub-tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConcatTable {
    pub(crate) subtables: Vec<String>,
    #[serde(with = "indexmap::map::serde_seq")]
    pub(crate) operators: IndexMap<TablePair, TableOperator>,
}

/// Weak reference to a node, possibly in another graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MirrorTarget {
    /// Owning graph; `None` means the mirror's own graph.
    pub graph: Option<GraphId>,
    pub node: String,
}

impl MirrorTarget {
    pub fn local(node: impl Into<String>) -> Self {
        Self {
            graph: None,
            node: node.into(),
        }
    }

    pub fn external(graph: GraphId, node: impl Into<String>) -> Self {
        Self {
            graph: Some(graph),
            node: node.into(),
        }
    }

    /// Whether the target lives in the graph identified by `own`.
    pub fn is_local_to(&self, own: GraphId) -> bool {
        self.graph.map_or(true, |g| g == own)
    }
}

/// Pass-through of another node's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorNode {
    pub target: MirrorTarget,
    /// Mirror through an outer join when the target lives elsewhere.
    pub is_outer: bool,
    /// Re-sync the projection from the target on demand.
    pub auto_update: bool,
    /// Content key of the target at the last sync.
    pub last_synced_key: Option<String>,
}

/// Rows-to-columns transform of a single child.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RotateNode {
    pub target: String,
}

/// Columns-to-rows transform of a single child.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnpivotNode {
    pub target: String,
    /// Leading columns kept as row headers.
    pub header_column_count: usize,
    /// Output type overrides by column name.
    pub type_overrides: IndexMap<String, DataType>,
}

/// Literal rows supplied with the plan; the schema is the node's projection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataInline {
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Bound(BoundSource),
    Embedded(EmbeddedTable),
    Join(JoinTable),
    Concatenate(ConcatTable),
    Mirror(MirrorNode),
    Rotate(RotateNode),
    Unpivot(UnpivotNode),
    DataInline(DataInline),
}

impl NodeKind {
    /// Stable tag used for document dispatch.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Bound(_) => "bound",
            NodeKind::Embedded(_) => "embedded",
            NodeKind::Join(_) => "join",
            NodeKind::Concatenate(_) => "concat",
            NodeKind::Mirror(_) => "mirror",
            NodeKind::Rotate(_) => "rotate",
            NodeKind::Unpivot(_) => "unpivot",
            NodeKind::DataInline(_) => "inline",
        }
    }
}

// ============================================================================
// Node
// ============================================================================

/// Validity state machine: `Built -> Updated -> Valid | Invalid`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    #[default]
    Built,
    Updated,
    Valid,
    Invalid,
}

/// Canvas placement. Cosmetic only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Layout {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) name: String,
    pub kind: NodeKind,
    pub projection: ColumnSelection,
    pub filters: FilterSlots,
    pub group_spec: Option<AggregateInfo>,
    pub sort_spec: Option<SortInfo>,
    pub max_rows: Option<usize>,
    pub distinct: bool,
    pub live_data: bool,
    /// Rejects edits through the graph.
    pub read_only: bool,
    pub layout: Layout,
    pub(crate) state: NodeState,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            projection: ColumnSelection::new(),
            filters: FilterSlots::default(),
            group_spec: None,
            sort_spec: None,
            max_rows: None,
            distinct: false,
            live_data: false,
            read_only: false,
            layout: Layout::default(),
            state: NodeState::Built,
        }
    }

    pub fn bound(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(
            name,
            NodeKind::Bound(BoundSource {
                source: source.into(),
                ..BoundSource::default()
            }),
        )
    }

    /// Embedded leaf exposing every schema column.
    pub fn embedded(name: impl Into<String>, table: EmbeddedTable) -> Self {
        let name = name.into();
        let projection = table.default_projection(&name);
        Self::new(name, NodeKind::Embedded(table)).with_projection(projection)
    }

    /// Join with cross-join defaults between adjacent sub-tables.
    pub fn join(name: impl Into<String>, subtables: Vec<String>) -> Self {
        Self::new(name, NodeKind::Join(JoinTable::new(subtables)))
    }

    /// Concatenation with `spec` between adjacent sub-tables.
    pub fn concat(name: impl Into<String>, subtables: Vec<String>, spec: SetSpec) -> Self {
        Self::new(name, NodeKind::Concatenate(ConcatTable::new(subtables, spec)))
    }

    pub fn mirror(name: impl Into<String>, target: MirrorTarget) -> Self {
        Self::new(
            name,
            NodeKind::Mirror(MirrorNode {
                target,
                is_outer: false,
                auto_update: true,
                last_synced_key: None,
            }),
        )
    }

    pub fn rotate(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            NodeKind::Rotate(RotateNode {
                target: target.into(),
            }),
        )
    }

    pub fn unpivot(
        name: impl Into<String>,
        target: impl Into<String>,
        header_column_count: usize,
    ) -> Self {
        Self::new(
            name,
            NodeKind::Unpivot(UnpivotNode {
                target: target.into(),
                header_column_count,
                type_overrides: IndexMap::new(),
            }),
        )
    }

    pub fn inline(name: impl Into<String>, projection: ColumnSelection, rows: Vec<Vec<Value>>) -> Self {
        Self::new(name, NodeKind::DataInline(DataInline { rows })).with_projection(projection)
    }

    pub fn with_projection(mut self, projection: ColumnSelection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_group(mut self, info: AggregateInfo) -> Self {
        self.group_spec = Some(info);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn tag(&self) -> &'static str {
        self.kind.tag()
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.kind, NodeKind::Join(_) | NodeKind::Concatenate(_))
    }

    pub fn is_leaf(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Bound(_) | NodeKind::Embedded(_) | NodeKind::DataInline(_)
        )
    }

    /// Structural children within the same graph.
    pub fn children(&self) -> Vec<&str> {
        match &self.kind {
            NodeKind::Join(j) => j.subtables.iter().map(String::as_str).collect(),
            NodeKind::Concatenate(c) => c.subtables.iter().map(String::as_str).collect(),
            NodeKind::Rotate(r) => vec![r.target.as_str()],
            NodeKind::Unpivot(u) => vec![u.target.as_str()],
            NodeKind::Mirror(m) if m.target.graph.is_none() => vec![m.target.node.as_str()],
            _ => Vec::new(),
        }
    }

    pub fn as_join(&self) -> Option<&JoinTable> {
        match &self.kind {
            NodeKind::Join(j) => Some(j),
            _ => None,
        }
    }

    pub fn as_concat(&self) -> Option<&ConcatTable> {
        match &self.kind {
            NodeKind::Concatenate(c) => Some(c),
            _ => None,
        }
    }

    /// Every condition list the node holds, filters first.
    pub fn condition_lists(&self) -> Vec<&ConditionList> {
        let mut lists: Vec<&ConditionList> = self.filters.iter().map(|(_, _, l)| l).collect();
        if let NodeKind::Bound(b) = &self.kind {
            lists.push(&b.query_filter);
        }
        lists
    }

    pub fn condition_lists_mut(&mut self) -> Vec<&mut ConditionList> {
        let mut lists: Vec<&mut ConditionList> = self.filters.lists_mut().collect();
        if let NodeKind::Bound(b) = &mut self.kind {
            lists.push(&mut b.query_filter);
        }
        lists
    }

    /// Reject edits on read-only nodes.
    pub fn ensure_editable(&self) -> PlanResult<()> {
        if self.read_only {
            return Err(PlanError::EditNotAllowed {
                node: self.name.clone(),
                reason: "node is read-only".to_string(),
            });
        }
        Ok(())
    }

    /// Reject projection edits on nodes whose columns are owned elsewhere.
    pub fn ensure_projection_editable(&self) -> PlanResult<()> {
        self.ensure_editable()?;
        if let NodeKind::Mirror(m) = &self.kind {
            if m.auto_update {
                return Err(PlanError::EditNotAllowed {
                    node: self.name.clone(),
                    reason: format!("columns are mirrored from '{}'", m.target.node),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn set_state(&mut self, state: NodeState) {
        self.state = state;
    }
}

impl VariableSupport for Node {
    fn all_variables(&self) -> Vec<UserVariable> {
        let mut vars = Vec::new();
        for list in self.condition_lists() {
            merge_variables(&mut vars, list.all_variables());
        }
        if let Some(info) = &self.group_spec {
            merge_variables(&mut vars, info.all_variables());
        }
        vars
    }

    fn replace_variables(&mut self, table: &VariableTable) {
        for list in self.condition_lists_mut() {
            list.replace_variables(table);
        }
        if let Some(info) = &mut self.group_spec {
            info.replace_variables(table);
        }
    }
}
