//! Post-query gradient utilities: clipping, scaling, accumulation, and
//! validity checks over the raw tensors a gradient query returns.

use num_traits::Float;
use tapegrad_core::{Result, Tensor, TensorError};

/// Clamps every gradient element into `[min, max]`.
pub fn clip_by_value<T: Float + Send + Sync + 'static>(
    gradients: &[Tensor<T>],
    min: T,
    max: T,
) -> Result<Vec<Tensor<T>>> {
    if min > max {
        return Err(TensorError::invalid_argument(
            "clip_by_value",
            "min must not exceed max",
        ));
    }
    let lo = Tensor::from_scalar(min);
    let hi = Tensor::from_scalar(max);
    gradients
        .iter()
        .map(|g| g.maximum(&lo)?.minimum(&hi))
        .collect()
}

/// Scales the whole gradient set down so its joint L2 norm does not exceed
/// `max_norm`. Returns the scaled gradients and the pre-clip norm.
pub fn clip_by_global_norm<T: Float + Send + Sync + 'static>(
    gradients: &[Tensor<T>],
    max_norm: T,
) -> Result<(Vec<Tensor<T>>, T)> {
    if max_norm <= T::zero() {
        return Err(TensorError::invalid_argument(
            "clip_by_global_norm",
            "max_norm must be positive",
        ));
    }

    let mut sum_sq = T::zero();
    for g in gradients {
        sum_sq = sum_sq + g.mul(g)?.sum(None, false)?.to_scalar()?;
    }
    let global_norm = sum_sq.sqrt();

    if global_norm <= max_norm || !global_norm.is_finite() {
        return Ok((gradients.to_vec(), global_norm));
    }
    let factor = Tensor::from_scalar(max_norm / global_norm);
    let clipped = gradients
        .iter()
        .map(|g| g.mul(&factor))
        .collect::<Result<Vec<_>>>()?;
    Ok((clipped, global_norm))
}

pub fn scale_gradients<T: Float + Send + Sync + 'static>(
    gradients: &[Tensor<T>],
    factor: T,
) -> Result<Vec<Tensor<T>>> {
    let factor = Tensor::from_scalar(factor);
    gradients.iter().map(|g| g.mul(&factor)).collect()
}

/// Element-wise sum of two matching gradient sets, e.g. across
/// micro-batches.
pub fn accumulate_gradients<T: Float + Send + Sync + 'static>(
    accumulated: &[Tensor<T>],
    fresh: &[Tensor<T>],
) -> Result<Vec<Tensor<T>>> {
    if accumulated.len() != fresh.len() {
        return Err(TensorError::invalid_argument(
            "accumulate_gradients",
            &format!(
                "gradient sets differ in length: {} vs {}",
                accumulated.len(),
                fresh.len()
            ),
        ));
    }
    accumulated
        .iter()
        .zip(fresh.iter())
        .map(|(a, b)| a.add(b))
        .collect()
}

/// A zeroed gradient set matching the shapes of `gradients`.
pub fn zero_gradients<T: Float + Send + Sync + 'static>(gradients: &[Tensor<T>]) -> Vec<Tensor<T>> {
    gradients
        .iter()
        .map(|g| Tensor::zeros(g.shape().dims()))
        .collect()
}

/// True if any gradient contains a NaN or infinity.
pub fn has_invalid_gradients<T: Float + Send + Sync + 'static>(gradients: &[Tensor<T>]) -> bool {
    gradients.iter().any(Tensor::has_invalid_values)
}
