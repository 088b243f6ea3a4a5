//! Backward rules for structural operations: shape changes, reductions,
//! and gradient-flow control.

use std::sync::Arc;

use num_traits::{Float, FromPrimitive};
use tapegrad_core::{Result, Tensor, TensorError};

use crate::registry::{BackwardRule, OpRegistry};
use crate::tape::gradient_computation::basic_ops::{unary_input, wrong_variant};
use crate::tape::utils::zeros_like_dims;
use crate::tape::{OpKind, Operation, TrackedTensor};

pub(crate) fn register<T: Float + FromPrimitive + Send + Sync + 'static>(
    registry: &mut OpRegistry<T>,
) {
    registry
        .register(OpKind::Transpose, Arc::new(TransposeRule))
        .register(OpKind::Reshape, Arc::new(ReshapeRule))
        .register(OpKind::Sum, Arc::new(SumRule))
        .register(OpKind::Mean, Arc::new(MeanRule))
        .register(OpKind::Identity, Arc::new(IdentityRule))
        .register(OpKind::StopGradient, Arc::new(StopGradientRule));
}

pub struct TransposeRule;

impl<T: Float + Send + Sync + 'static> BackwardRule<T> for TransposeRule {
    fn vjp(
        &self,
        _operation: &Operation,
        grad: &TrackedTensor<T>,
        _inputs: &[TrackedTensor<T>],
        _output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        Ok(vec![grad.transpose()])
    }
}

pub struct ReshapeRule;

impl<T: Float + Send + Sync + 'static> BackwardRule<T> for ReshapeRule {
    fn vjp(
        &self,
        operation: &Operation,
        grad: &TrackedTensor<T>,
        _inputs: &[TrackedTensor<T>],
        _output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        let Operation::Reshape { original_dims, .. } = operation else {
            return Err(wrong_variant("Reshape"));
        };
        Ok(vec![grad.reshape(original_dims)?])
    }
}

/// Expands the gradient of a reduction back over the reduced axes.
fn spread_reduction_grad<T: Float + Send + Sync + 'static>(
    grad: &TrackedTensor<T>,
    input_dims: &[usize],
    axes: &Option<Vec<usize>>,
    keepdims: bool,
) -> Result<TrackedTensor<T>> {
    let ones = TrackedTensor::constant(Tensor::<T>::ones(input_dims));
    match axes {
        // Full reduction: the scalar gradient broadcasts everywhere.
        None => grad.mul(&ones),
        Some(axes) => {
            let shaped = if keepdims {
                grad.clone()
            } else {
                // Reinsert the reduced axes as size 1 so broadcasting lines
                // the gradient up with the input.
                let mut kept: Vec<usize> = input_dims.to_vec();
                for &axis in axes {
                    if axis >= kept.len() {
                        return Err(TensorError::invalid_axis(
                            "reduction_grad",
                            axis,
                            input_dims.len(),
                        ));
                    }
                    kept[axis] = 1;
                }
                grad.reshape(&kept)?
            };
            shaped.mul(&ones)
        }
    }
}

pub struct SumRule;

impl<T: Float + Send + Sync + 'static> BackwardRule<T> for SumRule {
    fn vjp(
        &self,
        operation: &Operation,
        grad: &TrackedTensor<T>,
        inputs: &[TrackedTensor<T>],
        _output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        let Operation::Sum { axes, keepdims, .. } = operation else {
            return Err(wrong_variant("Sum"));
        };
        let [a] = unary_input(inputs)?;
        Ok(vec![spread_reduction_grad(grad, a.dims(), axes, *keepdims)?])
    }
}

pub struct MeanRule;

impl<T: Float + FromPrimitive + Send + Sync + 'static> BackwardRule<T> for MeanRule {
    fn vjp(
        &self,
        operation: &Operation,
        grad: &TrackedTensor<T>,
        inputs: &[TrackedTensor<T>],
        _output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        let Operation::Mean { axes, keepdims, .. } = operation else {
            return Err(wrong_variant("Mean"));
        };
        let [a] = unary_input(inputs)?;
        let count: usize = match axes {
            None => a.tensor().numel(),
            Some(axes) => {
                let mut count = 1usize;
                for &axis in axes {
                    let dim = a.dims().get(axis).copied().ok_or_else(|| {
                        TensorError::invalid_axis("Mean", axis, a.dims().len())
                    })?;
                    count *= dim;
                }
                count
            }
        };
        let count = T::from_usize(count.max(1)).ok_or_else(|| {
            TensorError::other("Mean", "element count not representable in element type")
        })?;
        let spread = spread_reduction_grad(grad, a.dims(), axes, *keepdims)?;
        spread
            .div(&TrackedTensor::from_scalar(count))
            .map(|g| vec![g])
    }
}

pub struct IdentityRule;

impl<T: Float + Send + Sync + 'static> BackwardRule<T> for IdentityRule {
    fn vjp(
        &self,
        _operation: &Operation,
        grad: &TrackedTensor<T>,
        _inputs: &[TrackedTensor<T>],
        _output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        Ok(vec![grad.clone()])
    }
}

pub struct StopGradientRule;

impl<T: Float + Send + Sync + 'static> BackwardRule<T> for StopGradientRule {
    fn vjp(
        &self,
        _operation: &Operation,
        _grad: &TrackedTensor<T>,
        inputs: &[TrackedTensor<T>],
        _output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        let [a] = unary_input(inputs)?;
        Ok(vec![zeros_like_dims(a.dims())])
    }
}
