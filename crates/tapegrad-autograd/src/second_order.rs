//! Higher-order derivatives via nested tapes.
//!
//! An outer tape records the backward pass of an inner tape, because that
//! backward pass is itself expressed in tracked operations. Differentiating
//! the recorded gradient then yields second derivatives.

use num_traits::{Float, FromPrimitive};
use tapegrad_core::{Result, Tensor};

use crate::tape::{GradientTape, TrackedTensor};

/// d²f/dx², element-wise, for a scalar-to-scalar or element-wise `f`.
///
/// Returns zeros when `f` does not depend on `x` at all.
pub fn second_derivative<T, F>(f: F, x: Tensor<T>) -> Result<Tensor<T>>
where
    T: Float + FromPrimitive + Send + Sync + 'static,
    F: FnOnce(&TrackedTensor<T>) -> Result<TrackedTensor<T>>,
{
    let dims = x.shape().dims().to_vec();
    let outer = GradientTape::new();
    let tracked = outer.watch(x);

    let inner = GradientTape::new();
    inner.watch_tracked(&tracked);
    let y = f(&tracked)?;

    let Some(first) = inner.gradient_tracked(&y, &[&tracked])?.pop().flatten() else {
        return Ok(Tensor::zeros(&dims));
    };
    let second = outer.gradient(&first, &[&tracked])?.pop().flatten();
    Ok(second.unwrap_or_else(|| Tensor::zeros(&dims)))
}

/// Hessian of a scalar-valued `f` at `x`, as an `[n, n]` matrix over the
/// flattened input.
pub fn hessian<T, F>(f: F, x: Tensor<T>) -> Result<Tensor<T>>
where
    T: Float + FromPrimitive + Send + Sync + 'static,
    F: FnOnce(&TrackedTensor<T>) -> Result<TrackedTensor<T>>,
{
    let n = x.numel();
    let outer = GradientTape::new();
    let tracked = outer.watch(x);

    let inner = GradientTape::new();
    inner.watch_tracked(&tracked);
    let y = f(&tracked)?;

    let Some(first) = inner.gradient_tracked(&y, &[&tracked])?.pop().flatten() else {
        return Ok(Tensor::zeros(&[n, n]));
    };
    outer.jacobian(&first, &tracked)?.reshape(&[n, n])
}

/// Hessian-vector product `H(x)·v` without materializing the Hessian:
/// differentiates `∇f(x)·v` once more with respect to `x`.
pub fn hessian_vector_product<T, F>(f: F, x: Tensor<T>, v: &Tensor<T>) -> Result<Tensor<T>>
where
    T: Float + FromPrimitive + Send + Sync + 'static,
    F: FnOnce(&TrackedTensor<T>) -> Result<TrackedTensor<T>>,
{
    let dims = x.shape().dims().to_vec();
    let outer = GradientTape::new();
    let tracked = outer.watch(x);

    let inner = GradientTape::new();
    inner.watch_tracked(&tracked);
    let y = f(&tracked)?;

    let Some(first) = inner.gradient_tracked(&y, &[&tracked])?.pop().flatten() else {
        return Ok(Tensor::zeros(&dims));
    };
    let direction = TrackedTensor::constant(v.clone());
    let dotted = first.mul(&direction)?.sum(None, false)?;
    let result = outer.gradient(&dotted, &[&tracked])?.pop().flatten();
    Ok(result.unwrap_or_else(|| Tensor::zeros(&dims)))
}
