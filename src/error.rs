//! Error types for dispatch and operator wiring.

use thiserror::Error;

use crate::dtype::ElementType;

/// Errors that abort an operator invocation or instantiation.
///
/// Falling back from FP16 to FP32 accumulation on an incapable device is not
/// an error and has no variant here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The primary input's element type is not handled by the FC dispatcher.
    #[error("Unsupported input type: {0}")]
    UnsupportedInputType(ElementType),

    /// No operator is registered under this name.
    #[error("Unknown operator: {op_type}")]
    UnknownOperator {
        /// The requested operator type.
        op_type: String,
    },

    /// The definition names an engine that does not exist.
    #[error("Unknown engine: {0}")]
    UnknownEngine(String),

    /// The definition has the wrong number of inputs or outputs.
    #[error("Invalid operator definition: {0}")]
    InvalidDefinition(String),

    /// A named input blob is not in the workspace.
    #[error("Blob not found in workspace: {0}")]
    MissingBlob(String),
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
