//! The backward pass: reverse traversal of the operation log with
//! per-operation vector-Jacobian products.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use num_traits::{Float, FromPrimitive};
use tapegrad_core::{Result, Tensor, TensorError};

use crate::registry::{BackwardRule, OpRegistry};
use crate::tape::utils::accumulate_gradient;
use crate::tape::{extract_parent_ids, GradientTape, Operation, TapeNode, TensorId, TrackedTensor};

/// An immutable copy of everything a gradient query needs, taken under a
/// short lock. The backward pass itself runs lock-free, which matters
/// because its tracked operations re-enter every recording tape.
pub(crate) struct TapeSnapshot<T> {
    nodes: Vec<TapeNode>,
    values: HashMap<TensorId, Tensor<T>>,
    overrides: HashMap<TensorId, Arc<dyn BackwardRule<T>>>,
    registry: OpRegistry<T>,
}

impl<T: Float + FromPrimitive + Send + Sync + 'static> TapeSnapshot<T> {
    pub(crate) fn capture(tape: &GradientTape) -> Result<Self> {
        let inner = tape.lock();
        if inner.consumed {
            return Err(TensorError::stale_tape(
                "non-persistent tape already used; construct it with `persistent()` to query more than once",
            ));
        }

        let values = inner
            .tensor_values
            .iter()
            .filter_map(|(id, boxed)| {
                boxed.downcast_ref::<Tensor<T>>().map(|t| (*id, t.clone()))
            })
            .collect();
        let overrides = inner
            .overrides
            .iter()
            .filter_map(|(id, boxed)| {
                boxed
                    .downcast_ref::<Arc<dyn BackwardRule<T>>>()
                    .map(|rule| (*id, rule.clone()))
            })
            .collect();
        let registry = inner
            .registries
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<OpRegistry<T>>())
            .cloned()
            .unwrap_or_else(OpRegistry::builtin);

        Ok(Self {
            nodes: inner.nodes.clone(),
            values,
            overrides,
            registry,
        })
    }

    fn tracked_value(&self, id: TensorId) -> Result<TrackedTensor<T>> {
        let tensor = self.values.get(&id).cloned().ok_or_else(|| {
            TensorError::other("backward_pass", &format!("no recorded value for tensor {id}"))
        })?;
        Ok(TrackedTensor { tensor, id })
    }

    /// Walks the log in reverse from the seeded outputs, returning the
    /// accumulated gradient for every reached tensor id.
    ///
    /// Gradients for one id arriving along several paths are summed in the
    /// order the paths are encountered, so results are deterministic.
    pub(crate) fn backward_pass(
        &self,
        seeds: HashMap<TensorId, TrackedTensor<T>>,
    ) -> Result<HashMap<TensorId, TrackedTensor<T>>> {
        let mut grads = seeds;

        for node in self.nodes.iter().rev() {
            if matches!(node.operation, Operation::Leaf) {
                continue;
            }
            let Some(grad) = grads.get(&node.id).cloned() else {
                continue;
            };

            let rule = match self.overrides.get(&node.id) {
                Some(rule) => rule.clone(),
                None => {
                    let kind = node.operation.kind();
                    self.registry.lookup(kind).ok_or_else(|| {
                        TensorError::undefined_gradient(&kind.to_string())
                    })?
                }
            };

            let parent_ids = extract_parent_ids(&node.operation);
            let inputs = parent_ids
                .iter()
                .map(|&id| self.tracked_value(id))
                .collect::<Result<Vec<_>>>()?;
            let output = self.tracked_value(node.id)?;

            let input_grads = rule.vjp(&node.operation, &grad, &inputs, &output)?;
            if input_grads.len() != parent_ids.len() {
                return Err(TensorError::other(
                    "backward_pass",
                    &format!(
                        "rule for {} returned {} gradients for {} inputs",
                        node.operation.kind(),
                        input_grads.len(),
                        parent_ids.len()
                    ),
                ));
            }
            for (id, g) in parent_ids.into_iter().zip(input_grads) {
                accumulate_gradient(&mut grads, id, g)?;
            }
        }

        Ok(grads)
    }
}

impl GradientTape {
    /// Gradient of `target` with respect to each source.
    ///
    /// `target` is seeded with ones, so a non-scalar target yields the
    /// gradient of its implicit sum. A source the target does not depend on
    /// maps to `None`; a dependence severed only by
    /// [`stop_gradient`](TrackedTensor::stop_gradient) yields explicit
    /// zeros instead.
    ///
    /// The query pauses recording on this tape while the backward pass
    /// runs, so a tape never records its own gradient computation. Other
    /// recording tapes do observe it, which is what enables higher-order
    /// derivatives.
    pub fn gradient<T: Float + FromPrimitive + Send + Sync + 'static>(
        &self,
        target: &TrackedTensor<T>,
        sources: &[&TrackedTensor<T>],
    ) -> Result<Vec<Option<Tensor<T>>>> {
        let grads = self.gradient_tracked(target, sources)?;
        Ok(grads
            .into_iter()
            .map(|g| g.map(TrackedTensor::into_tensor))
            .collect())
    }

    /// Like [`gradient`](Self::gradient), but keeps the results tracked so
    /// an enclosing tape can differentiate through them.
    pub fn gradient_tracked<T: Float + FromPrimitive + Send + Sync + 'static>(
        &self,
        target: &TrackedTensor<T>,
        sources: &[&TrackedTensor<T>],
    ) -> Result<Vec<Option<TrackedTensor<T>>>> {
        let snapshot = TapeSnapshot::capture(self)?;

        let result = {
            let _pause = self.stop_recording();
            let seed = TrackedTensor::constant(Tensor::ones(target.dims()));
            let mut seeds = HashMap::new();
            seeds.insert(target.id(), seed);
            let grads = snapshot.backward_pass(seeds)?;
            sources
                .iter()
                .map(|source| grads.get(&source.id()).cloned())
                .collect::<Vec<_>>()
        };

        self.finish_query();
        Ok(result)
    }

    /// Marks a non-persistent tape consumed and releases its recordings.
    pub(crate) fn finish_query(&self) {
        let mut inner = self.lock();
        if inner.persistent {
            return;
        }
        inner.consumed = true;
        inner.is_recording = false;
        inner.nodes.clear();
        inner.tensor_values.clear();
        inner.overrides.clear();
        log::debug!("tape {} consumed", self.tape_id);
    }
}
