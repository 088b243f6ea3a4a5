//! Backward rules for transcendental and activation functions.
//!
//! Where the derivative is expressible in the forward output (exp, sigmoid,
//! tanh), the rules reuse the recorded output instead of recomputing it.

use std::sync::Arc;

use num_traits::{Float, FromPrimitive};
use tapegrad_core::Result;

use crate::registry::{BackwardRule, OpRegistry};
use crate::tape::gradient_computation::basic_ops::unary_input;
use crate::tape::{OpKind, Operation, TrackedTensor};

pub(crate) fn register<T: Float + FromPrimitive + Send + Sync + 'static>(
    registry: &mut OpRegistry<T>,
) {
    registry
        .register(OpKind::Exp, Arc::new(ExpRule))
        .register(OpKind::Ln, Arc::new(LnRule))
        .register(OpKind::Sigmoid, Arc::new(SigmoidRule))
        .register(OpKind::Tanh, Arc::new(TanhRule))
        .register(OpKind::Relu, Arc::new(ReluRule));
}

pub struct ExpRule;

impl<T: Float + Send + Sync + 'static> BackwardRule<T> for ExpRule {
    fn vjp(
        &self,
        _operation: &Operation,
        grad: &TrackedTensor<T>,
        _inputs: &[TrackedTensor<T>],
        output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        // d(e^a)/da = e^a
        Ok(vec![grad.mul(output)?])
    }
}

pub struct LnRule;

impl<T: Float + Send + Sync + 'static> BackwardRule<T> for LnRule {
    fn vjp(
        &self,
        _operation: &Operation,
        grad: &TrackedTensor<T>,
        inputs: &[TrackedTensor<T>],
        _output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        let [a] = unary_input(inputs)?;
        Ok(vec![grad.div(a)?])
    }
}

pub struct SigmoidRule;

impl<T: Float + Send + Sync + 'static> BackwardRule<T> for SigmoidRule {
    fn vjp(
        &self,
        _operation: &Operation,
        grad: &TrackedTensor<T>,
        _inputs: &[TrackedTensor<T>],
        output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        // dσ/da = σ(a) * (1 - σ(a))
        let one = TrackedTensor::from_scalar(T::one());
        let grad_a = grad.mul(&output.mul(&one.sub(output)?)?)?;
        Ok(vec![grad_a])
    }
}

pub struct TanhRule;

impl<T: Float + Send + Sync + 'static> BackwardRule<T> for TanhRule {
    fn vjp(
        &self,
        _operation: &Operation,
        grad: &TrackedTensor<T>,
        _inputs: &[TrackedTensor<T>],
        output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        // d(tanh a)/da = 1 - tanh(a)^2
        let one = TrackedTensor::from_scalar(T::one());
        let grad_a = grad.mul(&one.sub(&output.mul(output)?)?)?;
        Ok(vec![grad_a])
    }
}

pub struct ReluRule;

impl<T: Float + Send + Sync + 'static> BackwardRule<T> for ReluRule {
    fn vjp(
        &self,
        _operation: &Operation,
        grad: &TrackedTensor<T>,
        inputs: &[TrackedTensor<T>],
        _output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        let [a] = unary_input(inputs)?;
        // Subgradient convention: zero at a == 0.
        let mask = TrackedTensor::constant(a.tensor().gt_zero_mask());
        Ok(vec![grad.mul(&mask)?])
    }
}
