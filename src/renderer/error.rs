//! Error types for node compilation.

use super::node::HashKey;
use super::types::{ShaderStage, ValueType};

/// Fail-fast diagnostics raised while resolving or generating a node.
///
/// Every variant aborts the current shader-permutation build.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NodeError {
    /// A scope tag that the node family does not know.
    #[error("{node}: unknown scope: {scope}")]
    UnknownScope { node: &'static str, scope: String },

    /// A method or feature name that the node family does not know.
    #[error("{node}: unknown operation: {method}")]
    UnknownOperation { node: &'static str, method: String },

    /// The node may only be generated in a specific shader stage.
    #[error("{node}: `{what}` generated in invalid shader stage {stage}")]
    InvalidStage {
        node: &'static str,
        what: String,
        stage: ShaderStage,
    },

    /// The scope is forbidden in the active stage.
    #[error("{node}: scope `{scope}` cannot be used in the {stage} stage")]
    StageRestriction {
        node: &'static str,
        scope: String,
        stage: ShaderStage,
    },

    #[error("{node}: type mismatch in `{method}`: expected {expected}, found {found}")]
    TypeMismatch {
        node: &'static str,
        method: String,
        expected: ValueType,
        found: ValueType,
    },

    /// Wrong operand arity or configuration for the node's method.
    #[error("{node}: malformed node: {reason}")]
    MalformedNode { node: &'static str, reason: String },

    #[error("cyclic node graph: {hash} is already being generated")]
    CyclicGraph { hash: HashKey },

    #[error("{node}: cannot resolve node type: {reason}")]
    TypeResolution { node: &'static str, reason: String },
}

pub type NodeResult<T> = Result<T, NodeError>;

impl NodeError {
    pub fn malformed(node: &'static str, reason: impl Into<String>) -> Self {
        NodeError::MalformedNode {
            node,
            reason: reason.into(),
        }
    }
}
