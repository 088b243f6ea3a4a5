//! Operation descriptors recorded on the tape.

use std::fmt;

use crate::tape::TensorId;

/// A recorded forward operation, holding the ids of its inputs along with
/// any attributes the backward rule needs to replay it.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Leaf value registered with `watch` or created as a constant.
    Leaf,

    // Binary element-wise operations (broadcasting).
    Add { lhs: TensorId, rhs: TensorId },
    Sub { lhs: TensorId, rhs: TensorId },
    Mul { lhs: TensorId, rhs: TensorId },
    Div { lhs: TensorId, rhs: TensorId },
    Pow { lhs: TensorId, rhs: TensorId },

    /// 2-D matrix product.
    MatMul { lhs: TensorId, rhs: TensorId },

    // Unary element-wise operations.
    Neg { input: TensorId },
    Exp { input: TensorId },
    Ln { input: TensorId },
    Sigmoid { input: TensorId },
    Tanh { input: TensorId },
    Relu { input: TensorId },
    PowScalar { input: TensorId, exponent: i32 },

    // Structural operations.
    Transpose { input: TensorId },
    Reshape { input: TensorId, original_dims: Vec<usize> },
    Sum { input: TensorId, axes: Option<Vec<usize>>, keepdims: bool },
    Mean { input: TensorId, axes: Option<Vec<usize>>, keepdims: bool },

    /// Passes values through unchanged; gradient passes through as well.
    Identity { input: TensorId },

    /// Blocks gradient flow: backward produces zeros for the input.
    StopGradient { input: TensorId },

    /// Operation with a caller-supplied backward rule attached at record
    /// time. `name` is only used for diagnostics.
    Custom { inputs: Vec<TensorId>, name: String },
}

impl Operation {
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Leaf => OpKind::Leaf,
            Operation::Add { .. } => OpKind::Add,
            Operation::Sub { .. } => OpKind::Sub,
            Operation::Mul { .. } => OpKind::Mul,
            Operation::Div { .. } => OpKind::Div,
            Operation::Pow { .. } => OpKind::Pow,
            Operation::MatMul { .. } => OpKind::MatMul,
            Operation::Neg { .. } => OpKind::Neg,
            Operation::Exp { .. } => OpKind::Exp,
            Operation::Ln { .. } => OpKind::Ln,
            Operation::Sigmoid { .. } => OpKind::Sigmoid,
            Operation::Tanh { .. } => OpKind::Tanh,
            Operation::Relu { .. } => OpKind::Relu,
            Operation::PowScalar { .. } => OpKind::PowScalar,
            Operation::Transpose { .. } => OpKind::Transpose,
            Operation::Reshape { .. } => OpKind::Reshape,
            Operation::Sum { .. } => OpKind::Sum,
            Operation::Mean { .. } => OpKind::Mean,
            Operation::Identity { .. } => OpKind::Identity,
            Operation::StopGradient { .. } => OpKind::StopGradient,
            Operation::Custom { .. } => OpKind::Custom,
        }
    }
}

/// Fieldless mirror of [`Operation`], used as the key for backward-rule
/// lookup in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Leaf,
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    MatMul,
    Neg,
    Exp,
    Ln,
    Sigmoid,
    Tanh,
    Relu,
    PowScalar,
    Transpose,
    Reshape,
    Sum,
    Mean,
    Identity,
    StopGradient,
    Custom,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpKind::Leaf => "Leaf",
            OpKind::Add => "Add",
            OpKind::Sub => "Sub",
            OpKind::Mul => "Mul",
            OpKind::Div => "Div",
            OpKind::Pow => "Pow",
            OpKind::MatMul => "MatMul",
            OpKind::Neg => "Neg",
            OpKind::Exp => "Exp",
            OpKind::Ln => "Ln",
            OpKind::Sigmoid => "Sigmoid",
            OpKind::Tanh => "Tanh",
            OpKind::Relu => "Relu",
            OpKind::PowScalar => "PowScalar",
            OpKind::Transpose => "Transpose",
            OpKind::Reshape => "Reshape",
            OpKind::Sum => "Sum",
            OpKind::Mean => "Mean",
            OpKind::Identity => "Identity",
            OpKind::StopGradient => "StopGradient",
            OpKind::Custom => "Custom",
        };
        f.write_str(name)
    }
}

/// Input ids of an operation, in argument order.
pub fn extract_parent_ids(operation: &Operation) -> Vec<TensorId> {
    match operation {
        Operation::Leaf => vec![],
        Operation::Add { lhs, rhs }
        | Operation::Sub { lhs, rhs }
        | Operation::Mul { lhs, rhs }
        | Operation::Div { lhs, rhs }
        | Operation::Pow { lhs, rhs }
        | Operation::MatMul { lhs, rhs } => vec![*lhs, *rhs],
        Operation::Neg { input }
        | Operation::Exp { input }
        | Operation::Ln { input }
        | Operation::Sigmoid { input }
        | Operation::Tanh { input }
        | Operation::Relu { input }
        | Operation::PowScalar { input, .. }
        | Operation::Transpose { input }
        | Operation::Reshape { input, .. }
        | Operation::Sum { input, .. }
        | Operation::Mean { input, .. }
        | Operation::Identity { input }
        | Operation::StopGradient { input } => vec![*input],
        Operation::Custom { inputs, .. } => inputs.clone(),
    }
}
