//! # Tabula
//!
//! A logical query-plan model: a graph of table operators that a composer
//! edits and an execution engine evaluates.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  Plan document (JSON)                    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [document]
//! ┌─────────────────────────────────────────────────────────┐
//! │                       PlanGraph                          │
//! │  nodes: bound | embedded | join | concat | mirror | ...  │
//! │  conditions, aggregates, operators (model, condition,    │
//! │  aggregate, compose)                                     │
//! └─────────────────────────────────────────────────────────┘
//!        │                  │                    │
//!        ▼ [graph]          ▼ [content]          ▼ [exec]
//!  dependencies,       canonical keys,      row sources,
//!  cycles, rename,     digests              operator evaluation
//!  validity                                 (+ aggregate pushdown)
//! ```
//!
//! Edits go through [`PlanGraph`]: each one is staged on a private copy of
//! the touched nodes and committed only if the graph stays acyclic, so a
//! [`PlanSnapshot`] handed to a reader is never affected by later edits.

pub mod aggregate;
pub mod cache;
pub mod compose;
pub mod condition;
pub mod config;
pub mod content;
pub mod document;
pub mod error;
pub mod exec;
pub mod graph;
pub mod model;

pub use error::{PlanError, PlanResult};
pub use graph::{PlanGraph, PlanSnapshot, ValidationOptions};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::aggregate::{
        AggregateCapabilities, AggregateFormula, AggregateInfo, AggregateRef, GroupRef,
    };
    pub use crate::condition::{
        Condition, ConditionItem, ConditionList, JunctionOp, NamedGroupInfo, RankingCondition,
    };
    pub use crate::content::ContentKey;
    pub use crate::document::DocumentNode;
    pub use crate::error::{PlanError, PlanResult};
    pub use crate::graph::{DependencyType, PlanGraph, PlanSnapshot, ValidationOptions};
    pub use crate::model::{
        ColumnRef, ColumnSelection, DataType, JoinSpec, MirrorTarget, Node, NodeKind,
        OperatorItem, SetSpec, Value, VariableSupport,
    };
}
