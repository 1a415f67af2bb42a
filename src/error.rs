//! Unified error type for plan-graph operations.
//!
//! Structural violations (cycles, illegal operators, unknown nodes) are raised
//! out of the mutating call and the graph is left untouched. Soft staleness is
//! reported as a status by the operations that discover it; the matching
//! variants here exist for callers that want to turn that status into a
//! `Result`.

use thiserror::Error;

/// Result type for plan operations.
pub type PlanResult<T> = Result<T, PlanError>;

/// Errors that can occur while building, mutating or validating a plan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    /// A node would (transitively) depend on itself.
    #[error("Dependency cycle detected: {}", cycle.join(" -> "))]
    DependencyCycle {
        /// Node names along the cycle, first node repeated at the end.
        cycle: Vec<String>,
    },

    /// A column-selection edit would turn a join into an unintended cross join.
    ///
    /// Recoverable: the caller may confirm and re-issue the edit with the
    /// cross-join check disabled.
    #[error("Edit would introduce a cross join between '{left}' and '{right}' (was {operator})")]
    CrossJoinDetected {
        left: String,
        right: String,
        operator: String,
    },

    /// A join operator was set on a concatenation node or vice versa.
    #[error("Operator {operator} is not valid on node '{node}'")]
    InvalidOperatorKind { node: String, operator: String },

    /// A reference no longer resolves against the current graph.
    #[error("Node '{node}' references unknown node '{reference}'")]
    UnresolvedReference { node: String, reference: String },

    /// The aggregate cannot be split into partial and merge steps.
    #[error("Formula {formula} cannot be decomposed: {reason}")]
    FormulaNotDecomposable { formula: String, reason: String },

    /// The node is read-only (mirrored or locked).
    #[error("Node '{node}' cannot be edited: {reason}")]
    EditNotAllowed { node: String, reason: String },

    /// No node with this name exists in the graph.
    #[error("Unknown node: '{0}'")]
    UnknownNode(String),

    /// A node with this name already exists in the graph.
    #[error("Duplicate node name: '{0}'")]
    DuplicateNode(String),

    /// The node fails its own validity rules.
    #[error("Invalid node '{node}': {message}")]
    InvalidNode { node: String, message: String },

    /// Concatenated sub-tables are not column compatible.
    #[error("Sub-tables '{left}' and '{right}' of '{node}' are incompatible: {message}")]
    IncompatibleSubtables {
        node: String,
        left: String,
        right: String,
        message: String,
    },

    /// A plan document could not be read.
    #[error("Invalid document: {0}")]
    Document(String),

    /// Encoded embedded data could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Block storage failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl PlanError {
    /// Build a cycle error from a path of node names.
    pub fn cycle<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PlanError::DependencyCycle {
            cycle: path.into_iter().map(Into::into).collect(),
        }
    }

    /// Build an invalid-node error.
    pub fn invalid(node: impl Into<String>, message: impl Into<String>) -> Self {
        PlanError::InvalidNode {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Whether the caller may confirm and retry the rejected edit.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PlanError::CrossJoinDetected { .. })
    }

    /// Whether the error signals a soft condition rather than a broken plan.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            PlanError::UnresolvedReference { .. } | PlanError::FormulaNotDecomposable { .. }
        )
    }
}

impl From<std::io::Error> for PlanError {
    fn from(err: std::io::Error) -> Self {
        PlanError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PlanError {
    fn from(err: serde_json::Error) -> Self {
        PlanError::Document(err.to_string())
    }
}
