//! Backward rules for arithmetic and matrix operations.
//!
//! Binary element-wise rules reduce their results back to the input shapes
//! so broadcasting in the forward pass is mirrored by summation in the
//! backward pass. Every rule is written in tracked operations, so the rules
//! themselves are differentiable by enclosing tapes.

use std::sync::Arc;

use num_traits::{Float, FromPrimitive};
use tapegrad_core::{Result, TensorError};

use crate::registry::{BackwardRule, OpRegistry};
use crate::tape::utils::reduce_grad_to;
use crate::tape::{OpKind, Operation, TrackedTensor};

pub(crate) fn register<T: Float + FromPrimitive + Send + Sync + 'static>(
    registry: &mut OpRegistry<T>,
) {
    registry
        .register(OpKind::Add, Arc::new(AddRule))
        .register(OpKind::Sub, Arc::new(SubRule))
        .register(OpKind::Mul, Arc::new(MulRule))
        .register(OpKind::Div, Arc::new(DivRule))
        .register(OpKind::Pow, Arc::new(PowRule))
        .register(OpKind::PowScalar, Arc::new(PowScalarRule))
        .register(OpKind::Neg, Arc::new(NegRule))
        .register(OpKind::MatMul, Arc::new(MatMulRule));
}

pub struct AddRule;

impl<T: Float + Send + Sync + 'static> BackwardRule<T> for AddRule {
    fn vjp(
        &self,
        _operation: &Operation,
        grad: &TrackedTensor<T>,
        inputs: &[TrackedTensor<T>],
        _output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        let [a, b] = binary_inputs(inputs)?;
        Ok(vec![
            reduce_grad_to(grad, a.dims())?,
            reduce_grad_to(grad, b.dims())?,
        ])
    }
}

pub struct SubRule;

impl<T: Float + Send + Sync + 'static> BackwardRule<T> for SubRule {
    fn vjp(
        &self,
        _operation: &Operation,
        grad: &TrackedTensor<T>,
        inputs: &[TrackedTensor<T>],
        _output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        let [a, b] = binary_inputs(inputs)?;
        Ok(vec![
            reduce_grad_to(grad, a.dims())?,
            reduce_grad_to(&grad.neg(), b.dims())?,
        ])
    }
}

pub struct MulRule;

impl<T: Float + Send + Sync + 'static> BackwardRule<T> for MulRule {
    fn vjp(
        &self,
        _operation: &Operation,
        grad: &TrackedTensor<T>,
        inputs: &[TrackedTensor<T>],
        _output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        let [a, b] = binary_inputs(inputs)?;
        Ok(vec![
            reduce_grad_to(&grad.mul(b)?, a.dims())?,
            reduce_grad_to(&grad.mul(a)?, b.dims())?,
        ])
    }
}

pub struct DivRule;

impl<T: Float + Send + Sync + 'static> BackwardRule<T> for DivRule {
    fn vjp(
        &self,
        _operation: &Operation,
        grad: &TrackedTensor<T>,
        inputs: &[TrackedTensor<T>],
        _output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        let [a, b] = binary_inputs(inputs)?;
        // d(a/b)/da = 1/b,  d(a/b)/db = -a/b^2
        let grad_a = grad.div(b)?;
        let grad_b = grad.mul(a)?.neg().div(&b.mul(b)?)?;
        Ok(vec![
            reduce_grad_to(&grad_a, a.dims())?,
            reduce_grad_to(&grad_b, b.dims())?,
        ])
    }
}

pub struct PowRule;

impl<T: Float + Send + Sync + 'static> BackwardRule<T> for PowRule {
    fn vjp(
        &self,
        _operation: &Operation,
        grad: &TrackedTensor<T>,
        inputs: &[TrackedTensor<T>],
        output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        let [a, b] = binary_inputs(inputs)?;
        // d(a^b)/da = b * a^(b-1),  d(a^b)/db = a^b * ln(a)
        let one = TrackedTensor::from_scalar(T::one());
        let grad_a = grad.mul(&b.mul(&a.pow(&b.sub(&one)?)?)?)?;
        let grad_b = grad.mul(&output.mul(&a.ln())?)?;
        Ok(vec![
            reduce_grad_to(&grad_a, a.dims())?,
            reduce_grad_to(&grad_b, b.dims())?,
        ])
    }
}

pub struct PowScalarRule;

impl<T: Float + Send + Sync + 'static> BackwardRule<T> for PowScalarRule {
    fn vjp(
        &self,
        operation: &Operation,
        grad: &TrackedTensor<T>,
        inputs: &[TrackedTensor<T>],
        _output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        let Operation::PowScalar { exponent, .. } = operation else {
            return Err(wrong_variant("PowScalar"));
        };
        let [a] = unary_input(inputs)?;
        let n = T::from(*exponent).ok_or_else(|| {
            TensorError::other("PowScalar", "exponent not representable in element type")
        })?;
        // d(a^n)/da = n * a^(n-1)
        let scale = TrackedTensor::from_scalar(n);
        let grad_a = grad.mul(&scale.mul(&a.powi(*exponent - 1))?)?;
        Ok(vec![grad_a])
    }
}

pub struct NegRule;

impl<T: Float + Send + Sync + 'static> BackwardRule<T> for NegRule {
    fn vjp(
        &self,
        _operation: &Operation,
        grad: &TrackedTensor<T>,
        _inputs: &[TrackedTensor<T>],
        _output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        Ok(vec![grad.neg()])
    }
}

pub struct MatMulRule;

impl<T: Float + Send + Sync + 'static> BackwardRule<T> for MatMulRule {
    fn vjp(
        &self,
        _operation: &Operation,
        grad: &TrackedTensor<T>,
        inputs: &[TrackedTensor<T>],
        _output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        let [a, b] = binary_inputs(inputs)?;
        // dC/dA = G·Bᵀ,  dC/dB = Aᵀ·G
        let grad_a = grad.matmul(&b.transpose())?;
        let grad_b = a.transpose().matmul(grad)?;
        Ok(vec![grad_a, grad_b])
    }
}

pub(crate) fn binary_inputs<T>(inputs: &[TrackedTensor<T>]) -> Result<[&TrackedTensor<T>; 2]> {
    match inputs {
        [a, b] => Ok([a, b]),
        _ => Err(TensorError::other(
            "backward_pass",
            &format!("expected 2 inputs, got {}", inputs.len()),
        )),
    }
}

pub(crate) fn unary_input<T>(inputs: &[TrackedTensor<T>]) -> Result<[&TrackedTensor<T>; 1]> {
    match inputs {
        [a] => Ok([a]),
        _ => Err(TensorError::other(
            "backward_pass",
            &format!("expected 1 input, got {}", inputs.len()),
        )),
    }
}

pub(crate) fn wrong_variant(expected: &str) -> TensorError {
    TensorError::other(
        "backward_pass",
        &format!("rule for {expected} invoked with a different operation"),
    )
}
