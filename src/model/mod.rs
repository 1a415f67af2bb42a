//! Plan data model: values and types, columns, variables, table operators
//! and the nodes that carry them.

pub mod column;
pub mod embedded;
pub mod node;
pub mod operator;
pub mod sort;
pub mod types;
pub mod variable;

pub use column::{ColumnRef, ColumnSelection, ExpressionColumn};
pub use embedded::{BlockRef, EmbeddedData, EmbeddedTable, EncodedPayload, SchemaColumn};
pub use node::{
    BoundSource, ConcatTable, DataInline, FilterOrigin, FilterSlots, FilterStage, GraphId,
    JoinTable, Layout, MirrorNode, MirrorTarget, Node, NodeKind, NodeState, RotateNode,
    UnpivotNode,
};
pub use operator::{JoinSpec, OperatorItem, OperatorKind, SetSpec, TableOperator, TablePair};
pub use sort::{SortInfo, SortOrder, SortRef};
pub use types::{DataType, Value};
pub use variable::{UserVariable, VariableSupport, VariableTable};

pub(crate) use variable::merge_variables;
