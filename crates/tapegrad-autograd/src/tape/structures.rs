//! Core tape data structures.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use num_traits::Float;
use tapegrad_core::Tensor;

use crate::context;
use crate::tape::{Operation, TensorId};

/// One entry in the tape's operation log.
#[derive(Debug, Clone)]
pub struct TapeNode {
    /// Id of the output produced by this operation.
    pub id: TensorId,
    pub operation: Operation,
    /// Dimensions of the output, kept for seeding and zero-gradient
    /// construction during backward.
    pub output_dims: Vec<usize>,
}

/// A tensor paired with its tape identity.
///
/// Tracked tensors are cheap handles: the underlying buffer is shared, and
/// arithmetic on them notifies every currently-recording tape.
#[derive(Debug, Clone)]
pub struct TrackedTensor<T> {
    pub(crate) tensor: Tensor<T>,
    pub(crate) id: TensorId,
}

impl<T: Float + Send + Sync + 'static> TrackedTensor<T> {
    /// Wraps a tensor without recording anything. The value participates in
    /// forward computation but contributes no gradient of its own.
    pub fn constant(tensor: Tensor<T>) -> Self {
        Self {
            tensor,
            id: context::next_tensor_id(),
        }
    }

    pub fn from_scalar(value: T) -> Self {
        Self::constant(Tensor::from_scalar(value))
    }

    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn tensor(&self) -> &Tensor<T> {
        &self.tensor
    }

    pub fn into_tensor(self) -> Tensor<T> {
        self.tensor
    }

    pub fn dims(&self) -> &[usize] {
        self.tensor.shape().dims()
    }
}

/// Interior state of a [`GradientTape`], guarded by a mutex so tracked
/// operations on any thread can append to it.
pub(crate) struct GradientTapeInner {
    pub(crate) nodes: Vec<TapeNode>,
    /// Forward values captured at record time, keyed by tensor id. Stored
    /// type-erased so one tape can record tensors of any element type.
    pub(crate) tensor_values: HashMap<TensorId, Box<dyn Any + Send + Sync>>,
    /// Per-output backward-rule overrides, as type-erased
    /// `Arc<dyn BackwardRule<T>>`.
    pub(crate) overrides: HashMap<TensorId, Box<dyn Any + Send + Sync>>,
    /// Caller-installed registries, keyed by element type. A tape with no
    /// entry for `T` falls back to the builtin registry at query time.
    pub(crate) registries: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    pub(crate) is_recording: bool,
    pub(crate) persistent: bool,
    /// Set once a non-persistent tape has served a gradient query.
    pub(crate) consumed: bool,
}

impl GradientTapeInner {
    pub(crate) fn new(persistent: bool) -> Self {
        Self {
            nodes: Vec::new(),
            tensor_values: HashMap::new(),
            overrides: HashMap::new(),
            registries: HashMap::new(),
            is_recording: true,
            persistent,
            consumed: false,
        }
    }

    pub(crate) fn store_value<T: Float + Send + Sync + 'static>(
        &mut self,
        id: TensorId,
        tensor: &Tensor<T>,
    ) {
        self.tensor_values
            .entry(id)
            .or_insert_with(|| Box::new(tensor.clone()));
    }
}

/// Records operations on watched tensors for later gradient computation.
///
/// While a tape is recording, every operation on a [`TrackedTensor`] is
/// appended to its log. Multiple tapes may record simultaneously, which is
/// what makes nested (higher-order) differentiation work: the backward pass
/// of an inner tape is itself expressed in tracked operations that an outer
/// tape observes.
pub struct GradientTape {
    pub(crate) inner: Arc<Mutex<GradientTapeInner>>,
    pub(crate) tape_id: u64,
}

impl std::fmt::Debug for GradientTape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("GradientTape")
            .field("tape_id", &self.tape_id)
            .field("nodes", &inner.nodes.len())
            .field("is_recording", &inner.is_recording)
            .field("persistent", &inner.persistent)
            .finish()
    }
}
