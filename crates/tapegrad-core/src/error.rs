use thiserror::Error;

/// Error taxonomy for tensor operations and gradient queries.
///
/// Every variant names the operation that produced it so failures deep in a
/// backward pass still point at the responsible op.
#[derive(Error, Debug, Clone)]
pub enum TensorError {
    #[error("Shape mismatch in operation '{operation}': expected {expected}, got {got}")]
    ShapeMismatch {
        operation: String,
        expected: String,
        got: String,
    },

    #[error("Invalid shape in operation '{operation}': {reason}")]
    InvalidShape { operation: String, reason: String },

    #[error("Invalid axis {axis} in operation '{operation}' for tensor with {ndim} dimensions")]
    InvalidAxis {
        operation: String,
        axis: usize,
        ndim: usize,
    },

    #[error("Invalid argument in operation '{operation}': {reason}")]
    InvalidArgument { operation: String, reason: String },

    #[error("No backward rule available for operation kind '{kind}'")]
    UndefinedGradient { kind: String },

    #[error("Stale tape: {reason}")]
    StaleTape { reason: String },

    #[error("Operation '{operation}' not supported: {reason}")]
    UnsupportedOperation { operation: String, reason: String },

    #[error("Error in operation '{operation}': {details}")]
    Other { operation: String, details: String },
}

impl TensorError {
    pub fn shape_mismatch(operation: &str, expected: &str, got: &str) -> Self {
        Self::ShapeMismatch {
            operation: operation.to_string(),
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    pub fn invalid_shape(operation: &str, reason: &str) -> Self {
        Self::InvalidShape {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_axis(operation: &str, axis: usize, ndim: usize) -> Self {
        Self::InvalidAxis {
            operation: operation.to_string(),
            axis,
            ndim,
        }
    }

    pub fn invalid_argument(operation: &str, reason: &str) -> Self {
        Self::InvalidArgument {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn undefined_gradient(kind: &str) -> Self {
        Self::UndefinedGradient {
            kind: kind.to_string(),
        }
    }

    pub fn stale_tape(reason: &str) -> Self {
        Self::StaleTape {
            reason: reason.to_string(),
        }
    }

    pub fn unsupported_operation(operation: &str, reason: &str) -> Self {
        Self::UnsupportedOperation {
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn other(operation: &str, details: &str) -> Self {
        Self::Other {
            operation: operation.to_string(),
            details: details.to_string(),
        }
    }

    /// Name of the operation (or op kind) this error originated in.
    pub fn operation(&self) -> &str {
        match self {
            Self::ShapeMismatch { operation, .. }
            | Self::InvalidShape { operation, .. }
            | Self::InvalidAxis { operation, .. }
            | Self::InvalidArgument { operation, .. }
            | Self::UnsupportedOperation { operation, .. }
            | Self::Other { operation, .. } => operation,
            Self::UndefinedGradient { kind } => kind,
            Self::StaleTape { .. } => "gradient",
        }
    }
}

impl From<ndarray::ShapeError> for TensorError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::InvalidShape {
            operation: "tensor_creation".to_string(),
            reason: format!("shape error: {err}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, TensorError>;
