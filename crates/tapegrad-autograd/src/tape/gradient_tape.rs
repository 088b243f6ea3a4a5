//! Tape lifecycle: construction, watching, recording control.

use std::any::TypeId;
use std::sync::{Arc, Mutex, Weak};

use num_traits::Float;
use tapegrad_core::Tensor;

use crate::context;
use crate::registry::OpRegistry;
use crate::tape::structures::GradientTapeInner;
use crate::tape::{GradientTape, Operation, TapeNode, TrackedTensor};

impl GradientTape {
    /// A single-use tape: the first gradient query consumes it.
    pub fn new() -> Self {
        Self::with_persistence(false)
    }

    /// A persistent tape, queryable any number of times.
    pub fn persistent() -> Self {
        Self::with_persistence(true)
    }

    fn with_persistence(persistent: bool) -> Self {
        let inner = Arc::new(Mutex::new(GradientTapeInner::new(persistent)));
        let tape_id = context::next_tape_id();
        context::register_tape(tape_id, &inner);
        log::debug!("tape {tape_id} created (persistent: {persistent})");
        Self { inner, tape_id }
    }

    /// Registers `tensor` as a differentiation source and returns the
    /// tracked handle to compute with.
    pub fn watch<T: Float + Send + Sync + 'static>(&self, tensor: Tensor<T>) -> TrackedTensor<T> {
        let tracked = TrackedTensor::constant(tensor);
        self.watch_tracked(&tracked);
        tracked
    }

    /// Registers an already-tracked value as a source on this tape. Used
    /// when the same value participates in more than one tape, e.g. for
    /// nested differentiation.
    pub fn watch_tracked<T: Float + Send + Sync + 'static>(&self, tracked: &TrackedTensor<T>) {
        let mut inner = self.lock();
        inner.store_value(tracked.id(), tracked.tensor());
        inner.nodes.push(TapeNode {
            id: tracked.id(),
            operation: Operation::Leaf,
            output_dims: tracked.dims().to_vec(),
        });
    }

    /// Suspends recording on this tape until the returned guard drops.
    /// Operations run inside the scope are invisible to this tape; other
    /// tapes are unaffected.
    pub fn stop_recording(&self) -> RecordingPause {
        RecordingPause::engage(&self.inner)
    }

    /// Discards everything recorded so far and resumes recording. The tape
    /// behaves as if freshly constructed; watched tensors must be watched
    /// again.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.nodes.clear();
        inner.tensor_values.clear();
        inner.overrides.clear();
        inner.is_recording = true;
        inner.consumed = false;
        log::debug!("tape {} reset", self.tape_id);
    }

    pub fn is_recording(&self) -> bool {
        self.lock().is_recording
    }

    pub fn is_persistent(&self) -> bool {
        self.lock().persistent
    }

    /// Number of recorded nodes, watched leaves included.
    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().nodes.is_empty()
    }

    /// Installs a backward-rule registry for element type `T`, replacing
    /// the builtin rules for queries on this tape.
    pub fn set_registry<T: Float + Send + Sync + 'static>(&self, registry: OpRegistry<T>) {
        self.lock()
            .registries
            .insert(TypeId::of::<T>(), Box::new(registry));
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, GradientTapeInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for GradientTape {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GradientTape {
    fn drop(&mut self) {
        context::unregister_tape(self.tape_id);
    }
}

/// RAII guard that pauses recording on one tape. Restores the previous
/// recording state on drop, including on early error returns.
pub struct RecordingPause {
    inner: Weak<Mutex<GradientTapeInner>>,
    was_recording: bool,
}

impl RecordingPause {
    pub(crate) fn engage(inner: &Arc<Mutex<GradientTapeInner>>) -> Self {
        let mut guard = inner.lock().unwrap_or_else(|e| e.into_inner());
        let was_recording = guard.is_recording;
        guard.is_recording = false;
        drop(guard);
        Self {
            inner: Arc::downgrade(inner),
            was_recording,
        }
    }
}

impl Drop for RecordingPause {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .is_recording = self.was_recording;
        }
    }
}
