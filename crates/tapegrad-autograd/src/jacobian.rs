//! Full and batch Jacobians.
//!
//! Reverse mode yields one row of the Jacobian per backward pass, so these
//! run one pass per target component, seeding a one-hot gradient each time.

use std::collections::HashMap;

use num_traits::{Float, FromPrimitive};
use tapegrad_core::{Result, Tensor, TensorError};

use crate::tape::gradient_computation::TapeSnapshot;
use crate::tape::{GradientTape, TensorId, TrackedTensor};

impl GradientTape {
    /// Jacobian of `target` with respect to `source`, with shape
    /// `target.dims ++ source.dims`.
    ///
    /// Components of the target that do not depend on the source produce
    /// zero rows.
    pub fn jacobian<T: Float + FromPrimitive + Send + Sync + 'static>(
        &self,
        target: &TrackedTensor<T>,
        source: &TrackedTensor<T>,
    ) -> Result<Tensor<T>> {
        let snapshot = TapeSnapshot::<T>::capture(self)?;
        let target_dims = target.dims().to_vec();
        let source_dims = source.dims().to_vec();
        let n = source.tensor().numel();
        let m = target.tensor().numel();

        let mut data = Vec::with_capacity(m * n);
        {
            let _pause = self.stop_recording();
            for component in 0..m {
                let row = component_row(
                    &snapshot,
                    &target_dims,
                    target.id(),
                    source.id(),
                    n,
                    component,
                )?;
                data.extend(row);
            }
        }
        self.finish_query();

        let mut dims = target_dims;
        dims.extend_from_slice(&source_dims);
        Tensor::from_vec(data, &dims)
    }

    /// Per-item Jacobian of a batched target with respect to a batched
    /// source, with shape `[b] ++ target.dims[1..] ++ source.dims[1..]`.
    ///
    /// Both tensors must carry the batch on their leading axis with equal
    /// length. Only the diagonal batch blocks are materialized; callers
    /// are responsible for batch items being computed independently, which
    /// is what makes the off-diagonal blocks zero.
    pub fn batch_jacobian<T: Float + FromPrimitive + Send + Sync + 'static>(
        &self,
        target: &TrackedTensor<T>,
        source: &TrackedTensor<T>,
    ) -> Result<Tensor<T>> {
        let target_dims = target.dims().to_vec();
        let source_dims = source.dims().to_vec();
        let (Some(&tb), Some(&sb)) = (target_dims.first(), source_dims.first()) else {
            return Err(TensorError::invalid_shape(
                "batch_jacobian",
                "target and source must each have a leading batch axis",
            ));
        };
        if tb != sb {
            return Err(TensorError::shape_mismatch(
                "batch_jacobian",
                &format!("batch size {tb}"),
                &format!("{sb}"),
            ));
        }

        let snapshot = TapeSnapshot::<T>::capture(self)?;
        let batch = tb;
        let m_per: usize = target_dims[1..].iter().product();
        let n_per: usize = source_dims[1..].iter().product();
        let n = source.tensor().numel();

        let mut data = Vec::with_capacity(batch * m_per * n_per);
        {
            let _pause = self.stop_recording();
            for item in 0..batch {
                for component in 0..m_per {
                    let row = component_row(
                        &snapshot,
                        &target_dims,
                        target.id(),
                        source.id(),
                        n,
                        item * m_per + component,
                    )?;
                    data.extend_from_slice(&row[item * n_per..(item + 1) * n_per]);
                }
            }
        }
        self.finish_query();

        let mut dims = vec![batch];
        dims.extend_from_slice(&target_dims[1..]);
        dims.extend_from_slice(&source_dims[1..]);
        Tensor::from_vec(data, &dims)
    }
}

/// One backward pass seeded with a one-hot at `component`, flattened to the
/// source's gradient in row-major order. Zeros if the source is unreached.
fn component_row<T: Float + FromPrimitive + Send + Sync + 'static>(
    snapshot: &TapeSnapshot<T>,
    target_dims: &[usize],
    target_id: TensorId,
    source_id: TensorId,
    source_len: usize,
    component: usize,
) -> Result<Vec<T>> {
    let seed = TrackedTensor::constant(Tensor::one_hot(target_dims, component)?);
    let mut seeds = HashMap::new();
    seeds.insert(target_id, seed);
    let grads = snapshot.backward_pass(seeds)?;
    match grads.get(&source_id) {
        Some(grad) => Ok(grad.tensor().array().iter().cloned().collect()),
        None => Ok(vec![T::zero(); source_len]),
    }
}
