//! Document hooks for nodes and graphs.

use indexmap::IndexMap;

use super::{DocumentNode, Element};
use crate::error::{PlanError, PlanResult};
use crate::graph::PlanGraph;
use crate::model::{
    BoundSource, ConcatTable, DataInline, EmbeddedTable, GraphId, JoinTable, Layout, MirrorNode,
    MirrorTarget, Node, NodeKind, RotateNode, UnpivotNode,
};

const PLAN_TAG: &str = "plan";

fn blank_kind(tag: &str) -> PlanResult<NodeKind> {
    Ok(match tag {
        "bound" => NodeKind::Bound(BoundSource::default()),
        "embedded" => NodeKind::Embedded(EmbeddedTable::from_rows(Vec::new(), Vec::new())),
        "join" => NodeKind::Join(JoinTable::default()),
        "concat" => NodeKind::Concatenate(ConcatTable::default()),
        "mirror" => NodeKind::Mirror(MirrorNode {
            target: MirrorTarget::local(""),
            is_outer: false,
            auto_update: true,
            last_synced_key: None,
        }),
        "rotate" => NodeKind::Rotate(RotateNode::default()),
        "unpivot" => NodeKind::Unpivot(UnpivotNode::default()),
        "inline" => NodeKind::DataInline(DataInline::default()),
        other => return Err(PlanError::Document(format!("Unknown node element <{}>", other))),
    })
}

impl DocumentNode for Node {
    fn tag(&self) -> &'static str {
        self.kind.tag()
    }

    fn write_attributes(&self, element: &mut Element) {
        element.set_attr("name", &self.name);
        element.set_flag("distinct", self.distinct);
        element.set_flag("live_data", self.live_data);
        element.set_flag("read_only", self.read_only);
        if let Some(max) = self.max_rows {
            element.set_attr("max_rows", max);
        }
        if self.layout != Layout::default() {
            element.set_attr("x", self.layout.x);
            element.set_attr("y", self.layout.y);
            element.set_attr("width", self.layout.width);
            element.set_attr("height", self.layout.height);
        }

        match &self.kind {
            NodeKind::Bound(bound) => element.set_attr("source", &bound.source),
            NodeKind::Mirror(mirror) => {
                element.set_attr("target", &mirror.target.node);
                if let Some(graph) = mirror.target.graph {
                    element.set_attr("target_graph", graph);
                }
                element.set_flag("outer", mirror.is_outer);
                element.set_attr("auto_update", mirror.auto_update);
                if let Some(key) = &mirror.last_synced_key {
                    element.set_attr("synced_key", key);
                }
            }
            NodeKind::Rotate(rotate) => element.set_attr("target", &rotate.target),
            NodeKind::Unpivot(unpivot) => {
                element.set_attr("target", &unpivot.target);
                element.set_attr("header_columns", unpivot.header_column_count);
            }
            NodeKind::Embedded(_) | NodeKind::Join(_) | NodeKind::Concatenate(_) | NodeKind::DataInline(_) => {}
        }
    }

    fn write_contents(&self, element: &mut Element) -> PlanResult<()> {
        if !self.projection.is_empty() {
            element.push_json("projection", &self.projection)?;
        }
        if !self.filters.is_empty() {
            element.push_json("filters", &self.filters)?;
        }
        if let Some(group) = &self.group_spec {
            element.push_json("group", group)?;
        }
        if let Some(sort) = &self.sort_spec {
            element.push_json("sort", sort)?;
        }

        match &self.kind {
            NodeKind::Bound(bound) => {
                if !bound.query_filter.is_empty() {
                    element.push_json("query_filter", &bound.query_filter)?;
                }
                if !bound.scripted_refs.is_empty() {
                    element.push_json("scripted_refs", &bound.scripted_refs)?;
                }
            }
            NodeKind::Embedded(table) => element.push_json("data", table)?,
            NodeKind::Join(join) => element.push_json("table", join)?,
            NodeKind::Concatenate(concat) => element.push_json("table", concat)?,
            NodeKind::Unpivot(unpivot) if !unpivot.type_overrides.is_empty() => {
                element.push_json("type_overrides", &unpivot.type_overrides)?;
            }
            NodeKind::DataInline(inline) => element.push_json("rows", &inline.rows)?,
            NodeKind::Unpivot(_) | NodeKind::Mirror(_) | NodeKind::Rotate(_) => {}
        }
        Ok(())
    }

    fn blank(element: &Element) -> PlanResult<Self> {
        let kind = blank_kind(&element.tag)?;
        Ok(Node::new(element.required_attr("name")?, kind))
    }

    fn parse_attributes(&mut self, element: &Element) -> PlanResult<()> {
        self.distinct = element.flag("distinct")?;
        self.live_data = element.flag("live_data")?;
        self.read_only = element.flag("read_only")?;
        self.max_rows = element.parse_attr("max_rows")?;
        self.layout = Layout {
            x: element.parse_attr("x")?.unwrap_or_default(),
            y: element.parse_attr("y")?.unwrap_or_default(),
            width: element.parse_attr("width")?.unwrap_or_default(),
            height: element.parse_attr("height")?.unwrap_or_default(),
        };

        match &mut self.kind {
            NodeKind::Bound(bound) => bound.source = element.required_attr("source")?.to_string(),
            NodeKind::Mirror(mirror) => {
                let graph = element
                    .attr("target_graph")
                    .map(|raw| {
                        GraphId::parse(raw).ok_or_else(|| {
                            PlanError::Document(format!("Invalid graph id '{}' in <mirror>", raw))
                        })
                    })
                    .transpose()?;
                mirror.target = MirrorTarget {
                    graph,
                    node: element.required_attr("target")?.to_string(),
                };
                mirror.is_outer = element.flag("outer")?;
                mirror.auto_update = element.parse_attr("auto_update")?.unwrap_or(true);
                mirror.last_synced_key = element.attr("synced_key").map(str::to_string);
            }
            NodeKind::Rotate(rotate) => rotate.target = element.required_attr("target")?.to_string(),
            NodeKind::Unpivot(unpivot) => {
                unpivot.target = element.required_attr("target")?.to_string();
                unpivot.header_column_count = element.parse_attr("header_columns")?.unwrap_or(1);
            }
            NodeKind::Embedded(_) | NodeKind::Join(_) | NodeKind::Concatenate(_) | NodeKind::DataInline(_) => {}
        }
        Ok(())
    }

    fn parse_contents(&mut self, element: &Element) -> PlanResult<()> {
        if let Some(projection) = element.json_child("projection")? {
            self.projection = projection;
        }
        if let Some(filters) = element.json_child("filters")? {
            self.filters = filters;
        }
        self.group_spec = element.json_child("group")?;
        self.sort_spec = element.json_child("sort")?;

        match &mut self.kind {
            NodeKind::Bound(bound) => {
                bound.query_filter = element.json_child("query_filter")?.unwrap_or_default();
                bound.scripted_refs = element.json_child("scripted_refs")?.unwrap_or_default();
            }
            NodeKind::Embedded(table) => {
                *table = element.json_child("data")?.ok_or_else(|| {
                    PlanError::Document(format!("Missing <data> in embedded node '{}'", self.name))
                })?;
            }
            NodeKind::Join(join) => *join = element.json_child("table")?.unwrap_or_default(),
            NodeKind::Concatenate(concat) => *concat = element.json_child("table")?.unwrap_or_default(),
            NodeKind::Unpivot(unpivot) => {
                unpivot.type_overrides = element
                    .json_child("type_overrides")?
                    .unwrap_or_else(IndexMap::new);
            }
            NodeKind::DataInline(inline) => inline.rows = element.json_child("rows")?.unwrap_or_default(),
            NodeKind::Mirror(_) | NodeKind::Rotate(_) => {}
        }
        Ok(())
    }
}

impl DocumentNode for PlanGraph {
    fn tag(&self) -> &'static str {
        PLAN_TAG
    }

    fn write_attributes(&self, element: &mut Element) {
        element.set_attr("id", self.id());
        element.set_attr("name", self.name());
    }

    fn write_contents(&self, element: &mut Element) -> PlanResult<()> {
        for node in self.iter() {
            element.push(node.write()?);
        }
        Ok(())
    }

    fn blank(element: &Element) -> PlanResult<Self> {
        if element.tag != PLAN_TAG {
            return Err(PlanError::Document(format!(
                "Expected <{}>, found <{}>",
                PLAN_TAG, element.tag
            )));
        }
        Ok(PlanGraph::new(""))
    }

    fn parse_attributes(&mut self, element: &Element) -> PlanResult<()> {
        let id = match element.attr("id") {
            Some(raw) => GraphId::parse(raw)
                .ok_or_else(|| PlanError::Document(format!("Invalid graph id '{}'", raw)))?,
            None => GraphId::new(),
        };
        let name = element.attr("name").unwrap_or_default();
        *self = PlanGraph::with_id(id, name).with_options(self.options());
        Ok(())
    }

    /// Nodes are added in document order, so a document describing a cycle
    /// is rejected like the equivalent edit.
    fn parse_contents(&mut self, element: &Element) -> PlanResult<()> {
        for child in &element.children {
            self.add_node(Node::parse(child)?)?;
        }
        Ok(())
    }
}
