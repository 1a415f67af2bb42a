use super::{ContentKey, KeyWriter};
use crate::aggregate::{AggregateInfo, AggregateRef, GroupRef};
use crate::condition::{
    Condition, ConditionEntry, ConditionItem, ConditionKind, ConditionList, ConditionValue,
    DateRange, DateRangeCondition, GroupDefinition, NamedGroupInfo, RankingCondition, RankingN,
    RankingOrder,
};
use crate::model::{
    BlockRef, ColumnRef, ColumnSelection, EmbeddedData, EmbeddedTable, Node, NodeKind,
    OperatorItem, SortInfo, SortOrder, TableOperator, TablePair, UserVariable,
};

// ============================================================================
// Columns and variables
// ============================================================================

impl ContentKey for ColumnRef {
    fn write_key(&self, w: &mut KeyWriter) {
        w.begin("col");
        w.opt_str("entity", self.entity.as_deref());
        w.str("attr", &self.attribute);
        w.opt_str("alias", self.alias.as_deref());
        w.token("type", self.data_type.as_str());
        w.flag("hidden", !self.visible);
        if let Some(expr) = &self.expression {
            w.str("expr", &expr.expression);
            w.strs("refs", expr.referenced_nodes.iter().map(String::as_str));
        }
        w.end();
    }
}

impl ContentKey for ColumnSelection {
    fn write_key(&self, w: &mut KeyWriter) {
        w.begin("columns");
        w.list("items", self.iter());
        w.end();
    }
}

impl ContentKey for UserVariable {
    fn write_key(&self, w: &mut KeyWriter) {
        w.begin("var");
        w.str("name", &self.name);
        w.token("type", self.data_type.as_str());
        if !self.values.is_empty() {
            w.values("values", &self.values);
        }
        w.opt_str("choices", self.choice_table.as_deref());
        w.opt_str("choice_column", self.choice_column.as_deref());
        w.end();
    }
}

// ============================================================================
// Conditions
// ============================================================================

impl ContentKey for ConditionValue {
    fn write_key(&self, w: &mut KeyWriter) {
        match self {
            ConditionValue::Literal(v) => {
                w.begin("lit");
                w.value("v", v);
            }
            ConditionValue::Variable(var) => {
                w.begin("bind");
                w.object("var", var);
            }
            ConditionValue::Field(col) => {
                w.begin("field");
                w.object("col", col);
            }
            // Materialized values are run-time data, not plan content.
            ConditionValue::Subquery(sub) => {
                w.begin("subquery");
                w.str("node", &sub.node);
                w.str("column", &sub.column);
            }
        }
        w.end();
    }
}

impl ContentKey for Condition {
    fn write_key(&self, w: &mut KeyWriter) {
        w.begin("cond");
        w.token("op", self.op.as_str());
        w.list("values", &self.values);
        w.flag("not", self.negated);
        w.flag("equal", self.equal);
        w.token("type", self.data_type.as_str());
        w.flag("case", self.case_sensitive);
        w.end();
    }
}

impl ContentKey for RankingCondition {
    fn write_key(&self, w: &mut KeyWriter) {
        w.begin("ranking");
        w.token(
            "order",
            match self.order {
                RankingOrder::Top => "top",
                RankingOrder::Bottom => "bottom",
            },
        );
        match &self.n {
            RankingN::Literal(n) => w.int("n", i64::try_from(*n).unwrap_or(i64::MAX)),
            RankingN::Variable(var) => w.object("n", var),
        }
        w.opt_str("by", self.ranking_column.as_deref());
        w.flag("others", self.group_others);
        w.end();
    }
}

impl ContentKey for DateRangeCondition {
    fn write_key(&self, w: &mut KeyWriter) {
        w.begin("date_range");
        match &self.range {
            DateRange::Period { start, end } => {
                w.token("start", &start.format("%Y-%m-%d").to_string());
                w.token("end", &end.format("%Y-%m-%d").to_string());
            }
            DateRange::Relative {
                unit,
                offset,
                length,
            } => {
                w.token("unit", &format!("{:?}", unit).to_lowercase());
                w.int("offset", *offset);
                w.int("length", i64::from(*length));
            }
        }
        if let Some(anchor) = self.anchor {
            w.token("anchor", &anchor.format("%Y-%m-%d").to_string());
        }
        w.flag("not", self.negated);
        w.end();
    }
}

impl ContentKey for ConditionItem {
    fn write_key(&self, w: &mut KeyWriter) {
        w.begin("item");
        w.object("attr", &self.attribute);
        match &self.condition {
            ConditionKind::Standard(c) => w.object("test", c),
            ConditionKind::Ranking(r) => w.object("test", r),
            ConditionKind::DateRange(d) => w.object("test", d),
        }
        w.end();
    }
}

impl ContentKey for ConditionEntry {
    fn write_key(&self, w: &mut KeyWriter) {
        match self {
            ConditionEntry::Item(item) => item.write_key(w),
            ConditionEntry::Junction(j) => {
                w.begin("junction");
                w.token("op", &j.op.to_string());
                w.int("level", i64::try_from(j.level).unwrap_or(i64::MAX));
                w.end();
            }
        }
    }
}

impl ContentKey for ConditionList {
    fn write_key(&self, w: &mut KeyWriter) {
        w.begin("conditions");
        w.list("entries", self.entries());
        w.end();
    }
}

impl ContentKey for GroupDefinition {
    fn write_key(&self, w: &mut KeyWriter) {
        match self {
            GroupDefinition::Conditions(list) => {
                w.begin("group_conditions");
                w.object("list", list);
            }
            GroupDefinition::Values(values) => {
                w.begin("group_values");
                w.values("values", values);
            }
            GroupDefinition::Range { start, end } => {
                w.begin("group_range");
                w.value("start", start);
                w.value("end", end);
            }
        }
        w.end();
    }
}

impl ContentKey for NamedGroupInfo {
    fn write_key(&self, w: &mut KeyWriter) {
        w.begin("named_groups");
        w.object("attr", &self.attribute);
        w.token("type", self.data_type.as_str());
        for label in self.labels() {
            if let Some(group) = self.group(label) {
                w.object(&format!("group:{}", label), group);
            }
        }
        w.token("others", &format!("{:?}", self.others).to_lowercase());
        w.end();
    }
}

// ============================================================================
// Aggregates and sorting
// ============================================================================

impl ContentKey for AggregateRef {
    fn write_key(&self, w: &mut KeyWriter) {
        w.begin("aggregate");
        w.token("formula", self.formula.as_str());
        w.object("col", &self.column);
        w.opt_object("col2", self.secondary.as_ref());
        w.opt_str("alias", self.alias.as_deref());
        w.end();
    }
}

impl ContentKey for GroupRef {
    fn write_key(&self, w: &mut KeyWriter) {
        w.begin("group");
        w.object("col", &self.column);
        w.opt_object("named", self.named_group.as_ref());
        w.end();
    }
}

impl ContentKey for AggregateInfo {
    fn write_key(&self, w: &mut KeyWriter) {
        w.begin("aggregate_info");
        w.list("groups", self.groups());
        w.list("aggregates", self.aggregates());
        w.end();
    }
}

impl ContentKey for SortInfo {
    fn write_key(&self, w: &mut KeyWriter) {
        w.begin("sort");
        for key in &self.keys {
            let order = match key.order {
                SortOrder::Ascending => "asc",
                SortOrder::Descending => "desc",
            };
            w.object(order, &key.column);
        }
        w.end();
    }
}

// ============================================================================
// Operators and node payloads
// ============================================================================

impl ContentKey for OperatorItem {
    fn write_key(&self, w: &mut KeyWriter) {
        w.begin("op");
        w.str("kind", self.kind.as_str());
        w.opt_str("left", self.left_column.as_deref());
        w.opt_str("right", self.right_column.as_deref());
        w.flag("all", self.all);
        w.end();
    }
}

struct PairOperator<'a>(&'a TablePair, &'a TableOperator);

impl ContentKey for PairOperator<'_> {
    fn write_key(&self, w: &mut KeyWriter) {
        w.begin("pair");
        w.str("left", &self.0.left);
        w.str("right", &self.0.right);
        w.list("items", &self.1.items);
        w.end();
    }
}

fn write_operators<'a>(
    w: &mut KeyWriter,
    subtables: &[String],
    operators: impl Iterator<Item = (&'a TablePair, &'a TableOperator)>,
) {
    w.strs("subtables", subtables.iter().map(String::as_str));
    let pairs: Vec<PairOperator<'_>> = operators.map(|(p, o)| PairOperator(p, o)).collect();
    w.list("operators", &pairs);
}

impl ContentKey for EmbeddedTable {
    fn write_key(&self, w: &mut KeyWriter) {
        w.begin("embedded_table");
        for column in &self.schema {
            w.token(&format!("schema:{}", column.name), column.data_type.as_str());
        }
        match &self.data {
            EmbeddedData::Rows(rows) => {
                for (i, row) in rows.iter().enumerate() {
                    w.values(&format!("row{}", i), row);
                }
            }
            // The digest covers every block; block locations do not matter.
            EmbeddedData::Encoded(payload) => {
                w.str("digest", &payload.digest);
                w.int("blocks", i64::try_from(payload.blocks.len()).unwrap_or(i64::MAX));
                let inline = payload
                    .blocks
                    .iter()
                    .filter(|b| matches!(b, BlockRef::Inline(_)))
                    .count();
                w.int("inline", i64::try_from(inline).unwrap_or(i64::MAX));
            }
        }
        w.end();
    }
}

fn write_kind(kind: &NodeKind, w: &mut KeyWriter) {
    match kind {
        NodeKind::Bound(bound) => {
            w.str("source", &bound.source);
            if !bound.query_filter.is_empty() {
                w.object("query_filter", &bound.query_filter);
            }
            if !bound.scripted_refs.is_empty() {
                w.strs("scripted", bound.scripted_refs.iter().map(String::as_str));
            }
        }
        NodeKind::Embedded(table) => w.object("data", table),
        NodeKind::Join(join) => write_operators(w, join.subtables(), join.operators()),
        NodeKind::Concatenate(concat) => write_operators(w, concat.subtables(), concat.operators()),
        NodeKind::Mirror(mirror) => {
            if let Some(graph) = mirror.target.graph {
                w.token("graph", &graph.to_string());
            }
            w.str("target", &mirror.target.node);
            w.flag("outer", mirror.is_outer);
            w.flag("auto", mirror.auto_update);
        }
        NodeKind::Rotate(rotate) => w.str("target", &rotate.target),
        NodeKind::Unpivot(unpivot) => {
            w.str("target", &unpivot.target);
            w.int(
                "headers",
                i64::try_from(unpivot.header_column_count).unwrap_or(i64::MAX),
            );
            for (column, data_type) in &unpivot.type_overrides {
                w.token(&format!("override:{}", column), data_type.as_str());
            }
        }
        NodeKind::DataInline(inline) => {
            for (i, row) in inline.rows.iter().enumerate() {
                w.values(&format!("row{}", i), row);
            }
        }
    }
}

impl ContentKey for Node {
    fn write_key(&self, w: &mut KeyWriter) {
        w.begin(self.tag());
        w.str("name", self.name());
        write_kind(&self.kind, w);
        w.object("projection", &self.projection);
        for (stage, origin, list) in self.filters.iter() {
            if !list.is_empty() {
                let slot = format!("{:?}_{:?}", stage, origin).to_lowercase();
                w.object(&slot, list);
            }
        }
        w.opt_object("group", self.group_spec.as_ref());
        w.opt_object("sort", self.sort_spec.as_ref());
        if let Some(max) = self.max_rows {
            w.int("max_rows", i64::try_from(max).unwrap_or(i64::MAX));
        }
        w.flag("distinct", self.distinct);
        w.flag("live", self.live_data);
        w.end();
    }
}
