//! Helpers shared by the backward pass and the rule implementations.

use std::collections::HashMap;

use num_traits::Float;
use tapegrad_core::{Result, Tensor, TensorError};

use crate::tape::{TensorId, TrackedTensor};

/// Adds `grad` into the accumulator slot for `id`, summing with whatever a
/// previous path through the graph already contributed.
///
/// Accumulation is a tracked add so enclosing tapes can differentiate
/// through it.
pub(crate) fn accumulate_gradient<T: Float + Send + Sync + 'static>(
    accumulator: &mut HashMap<TensorId, TrackedTensor<T>>,
    id: TensorId,
    grad: TrackedTensor<T>,
) -> Result<()> {
    match accumulator.remove(&id) {
        None => {
            accumulator.insert(id, grad);
        }
        Some(existing) => {
            if !existing.tensor().same_shape(grad.tensor()) {
                return Err(TensorError::shape_mismatch(
                    "accumulate_gradient",
                    &format!("{:?}", existing.dims()),
                    &format!("{:?}", grad.dims()),
                ));
            }
            accumulator.insert(id, existing.add(&grad)?);
        }
    }
    Ok(())
}

/// Reduces a broadcast gradient back to the shape of the input it belongs
/// to: extra leading axes are summed away, and axes the broadcast stretched
/// from 1 are summed with the dimension kept.
pub(crate) fn reduce_grad_to<T: Float + Send + Sync + 'static>(
    grad: &TrackedTensor<T>,
    target_dims: &[usize],
) -> Result<TrackedTensor<T>> {
    let grad_dims = grad.dims().to_vec();
    if grad_dims == target_dims {
        return Ok(grad.clone());
    }

    let mut current = grad.clone();
    let extra = grad_dims.len().saturating_sub(target_dims.len());
    if extra > 0 {
        let leading: Vec<usize> = (0..extra).collect();
        current = current.sum(Some(&leading), false)?;
    }

    let mut stretched = Vec::new();
    for (axis, (&have, &want)) in current
        .dims()
        .iter()
        .zip(target_dims.iter())
        .enumerate()
    {
        if want == 1 && have != 1 {
            stretched.push(axis);
        }
    }
    if !stretched.is_empty() {
        current = current.sum(Some(&stretched), true)?;
    }

    if current.dims() != target_dims {
        current = current.reshape(target_dims)?;
    }
    Ok(current)
}

/// A zeros gradient for a value of the given dimensions, as an untracked
/// constant.
pub(crate) fn zeros_like_dims<T: Float + Send + Sync + 'static>(
    dims: &[usize],
) -> TrackedTensor<T> {
    TrackedTensor::constant(Tensor::zeros(dims))
}
