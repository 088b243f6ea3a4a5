//! Thread-local registry of active tapes.
//!
//! Every recording tape on the current thread is reachable here, so a
//! tracked operation can notify all of them in one pass. Tapes register on
//! construction and unregister on drop; the `Weak` handle keeps a dropped
//! tape from being kept alive by this list.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use num_traits::Float;
use tapegrad_core::Tensor;

use crate::registry::BackwardRule;
use crate::tape::structures::GradientTapeInner;
use crate::tape::{extract_parent_ids, Operation, TapeNode, TensorId};

static NEXT_TENSOR_ID: AtomicUsize = AtomicUsize::new(1);
static NEXT_TAPE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static ACTIVE_TAPES: RefCell<Vec<(u64, Weak<Mutex<GradientTapeInner>>)>> =
        const { RefCell::new(Vec::new()) };
}

/// Allocates a fresh tensor id. Ids are global so a value watched on two
/// tapes has the same identity on both.
pub(crate) fn next_tensor_id() -> TensorId {
    NEXT_TENSOR_ID.fetch_add(1, Ordering::Relaxed)
}

pub(crate) fn next_tape_id() -> u64 {
    NEXT_TAPE_ID.fetch_add(1, Ordering::Relaxed)
}

pub(crate) fn register_tape(tape_id: u64, inner: &Arc<Mutex<GradientTapeInner>>) {
    ACTIVE_TAPES.with(|tapes| {
        tapes.borrow_mut().push((tape_id, Arc::downgrade(inner)));
    });
}

pub(crate) fn unregister_tape(tape_id: u64) {
    ACTIVE_TAPES.with(|tapes| {
        tapes.borrow_mut().retain(|(id, _)| *id != tape_id);
    });
}

/// Records `operation` on every tape currently recording on this thread,
/// capturing the forward values of the inputs and the output.
pub(crate) fn record<T: Float + Send + Sync + 'static>(
    operation: &Operation,
    inputs: &[(TensorId, &Tensor<T>)],
    output_id: TensorId,
    output: &Tensor<T>,
) {
    record_impl::<T>(operation, inputs, output_id, output, None);
}

/// Like [`record`], but also attaches a backward-rule override for the
/// output on every recording tape.
pub(crate) fn record_with_override<T: Float + Send + Sync + 'static>(
    operation: &Operation,
    inputs: &[(TensorId, &Tensor<T>)],
    output_id: TensorId,
    output: &Tensor<T>,
    rule: Arc<dyn BackwardRule<T>>,
) {
    record_impl::<T>(operation, inputs, output_id, output, Some(rule));
}

fn record_impl<T: Float + Send + Sync + 'static>(
    operation: &Operation,
    inputs: &[(TensorId, &Tensor<T>)],
    output_id: TensorId,
    output: &Tensor<T>,
    rule: Option<Arc<dyn BackwardRule<T>>>,
) {
    debug_assert_eq!(
        extract_parent_ids(operation).len(),
        inputs.len(),
        "operation arity does not match supplied inputs"
    );

    ACTIVE_TAPES.with(|tapes| {
        let tapes = tapes.borrow();
        for (_, weak) in tapes.iter() {
            let Some(inner) = weak.upgrade() else { continue };
            let mut inner = inner.lock().unwrap_or_else(|e| e.into_inner());
            if !inner.is_recording {
                continue;
            }
            for (id, tensor) in inputs {
                inner.store_value(*id, tensor);
            }
            inner.store_value(output_id, output);
            inner.nodes.push(TapeNode {
                id: output_id,
                operation: operation.clone(),
                output_dims: output.shape().dims().to_vec(),
            });
            if let Some(rule) = &rule {
                inner.overrides.insert(output_id, Box::new(rule.clone()));
            }
        }
    });
}
