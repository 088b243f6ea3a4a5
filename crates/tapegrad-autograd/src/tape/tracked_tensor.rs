//! Differentiable operations on tracked tensors.
//!
//! Each method computes the forward value, then notifies every recording
//! tape on the current thread. The operations mirror the element-wise,
//! matrix, and reduction primitives of the core tensor type.

use num_traits::{Float, FromPrimitive};
use tapegrad_core::{Result, Tensor};

use crate::context;
use crate::tape::{Operation, TrackedTensor};

impl<T: Float + Send + Sync + 'static> TrackedTensor<T> {
    fn record_unary(operation: Operation, input: &Self, output: Tensor<T>) -> Self {
        let out = Self {
            id: context::next_tensor_id(),
            tensor: output,
        };
        context::record(
            &operation,
            &[(input.id, &input.tensor)],
            out.id,
            &out.tensor,
        );
        out
    }

    fn record_binary(operation: Operation, lhs: &Self, rhs: &Self, output: Tensor<T>) -> Self {
        let out = Self {
            id: context::next_tensor_id(),
            tensor: output,
        };
        context::record(
            &operation,
            &[(lhs.id, &lhs.tensor), (rhs.id, &rhs.tensor)],
            out.id,
            &out.tensor,
        );
        out
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        let value = self.tensor.add(&other.tensor)?;
        Ok(Self::record_binary(
            Operation::Add {
                lhs: self.id,
                rhs: other.id,
            },
            self,
            other,
            value,
        ))
    }

    pub fn sub(&self, other: &Self) -> Result<Self> {
        let value = self.tensor.sub(&other.tensor)?;
        Ok(Self::record_binary(
            Operation::Sub {
                lhs: self.id,
                rhs: other.id,
            },
            self,
            other,
            value,
        ))
    }

    pub fn mul(&self, other: &Self) -> Result<Self> {
        let value = self.tensor.mul(&other.tensor)?;
        Ok(Self::record_binary(
            Operation::Mul {
                lhs: self.id,
                rhs: other.id,
            },
            self,
            other,
            value,
        ))
    }

    pub fn div(&self, other: &Self) -> Result<Self> {
        let value = self.tensor.div(&other.tensor)?;
        Ok(Self::record_binary(
            Operation::Div {
                lhs: self.id,
                rhs: other.id,
            },
            self,
            other,
            value,
        ))
    }

    /// Element-wise `self ^ other`.
    pub fn pow(&self, other: &Self) -> Result<Self> {
        let value = self.tensor.pow(&other.tensor)?;
        Ok(Self::record_binary(
            Operation::Pow {
                lhs: self.id,
                rhs: other.id,
            },
            self,
            other,
            value,
        ))
    }

    /// 2-D matrix product.
    pub fn matmul(&self, other: &Self) -> Result<Self> {
        let value = self.tensor.matmul(&other.tensor)?;
        Ok(Self::record_binary(
            Operation::MatMul {
                lhs: self.id,
                rhs: other.id,
            },
            self,
            other,
            value,
        ))
    }

    pub fn neg(&self) -> Self {
        Self::record_unary(Operation::Neg { input: self.id }, self, self.tensor.neg())
    }

    pub fn exp(&self) -> Self {
        Self::record_unary(Operation::Exp { input: self.id }, self, self.tensor.exp())
    }

    pub fn ln(&self) -> Self {
        Self::record_unary(Operation::Ln { input: self.id }, self, self.tensor.ln())
    }

    pub fn sigmoid(&self) -> Self {
        Self::record_unary(
            Operation::Sigmoid { input: self.id },
            self,
            self.tensor.sigmoid(),
        )
    }

    pub fn tanh(&self) -> Self {
        Self::record_unary(
            Operation::Tanh { input: self.id },
            self,
            self.tensor.tanh(),
        )
    }

    pub fn relu(&self) -> Self {
        Self::record_unary(
            Operation::Relu { input: self.id },
            self,
            self.tensor.relu(),
        )
    }

    /// Element-wise integer power.
    pub fn powi(&self, exponent: i32) -> Self {
        Self::record_unary(
            Operation::PowScalar {
                input: self.id,
                exponent,
            },
            self,
            self.tensor.powi(exponent),
        )
    }

    /// Reverses the axis order.
    pub fn transpose(&self) -> Self {
        Self::record_unary(
            Operation::Transpose { input: self.id },
            self,
            self.tensor.transpose(),
        )
    }

    pub fn reshape(&self, dims: &[usize]) -> Result<Self> {
        let original_dims = self.dims().to_vec();
        let value = self.tensor.reshape(dims)?;
        Ok(Self::record_unary(
            Operation::Reshape {
                input: self.id,
                original_dims,
            },
            self,
            value,
        ))
    }

    /// Sums over `axes`, or over everything to a scalar when `axes` is
    /// `None`.
    pub fn sum(&self, axes: Option<&[usize]>, keepdims: bool) -> Result<Self> {
        let value = self.tensor.sum(axes, keepdims)?;
        Ok(Self::record_unary(
            Operation::Sum {
                input: self.id,
                axes: axes.map(|a| a.to_vec()),
                keepdims,
            },
            self,
            value,
        ))
    }

    /// Passes the value through unchanged; so does the gradient.
    pub fn identity(&self) -> Self {
        Self::record_unary(
            Operation::Identity { input: self.id },
            self,
            self.tensor.clone(),
        )
    }

    /// Forwards the value but blocks gradient flow: the backward pass
    /// treats this output as a constant, so everything upstream of it
    /// receives zero gradient through this edge.
    pub fn stop_gradient(&self) -> Self {
        Self::record_unary(
            Operation::StopGradient { input: self.id },
            self,
            self.tensor.clone(),
        )
    }

    /// Returns the same value as a fresh untracked constant. Unlike
    /// [`stop_gradient`](Self::stop_gradient), nothing is recorded.
    pub fn detach(&self) -> Self {
        Self::constant(self.tensor.clone())
    }
}

impl<T: Float + FromPrimitive + Send + Sync + 'static> TrackedTensor<T> {
    /// Arithmetic mean over `axes`, or over everything when `None`.
    pub fn mean(&self, axes: Option<&[usize]>, keepdims: bool) -> Result<Self> {
        let value = self.tensor.mean(axes, keepdims)?;
        Ok(Self::record_unary(
            Operation::Mean {
                input: self.id,
                axes: axes.map(|a| a.to_vec()),
                keepdims,
            },
            self,
            value,
        ))
    }
}
