//! Gradient tape: operation recording and backward gradient computation.
//!
//! The tape records every operation performed on tracked tensors while a
//! recording scope is active, then walks the log in reverse to apply the
//! chain rule.

pub mod gradient_computation;
pub mod gradient_tape;
pub mod operations;
pub mod structures;
pub mod tracked_tensor;
pub mod utils;

pub use gradient_tape::RecordingPause;
pub use operations::{extract_parent_ids, OpKind, Operation};
pub use structures::{GradientTape, TapeNode, TrackedTensor};

/// Unique identifier for tracked values. Allocated from a single global
/// counter so ids stay consistent across every tape watching a value.
pub type TensorId = usize;
