//! Tape-based reverse-mode automatic differentiation.
//!
//! A [`GradientTape`] records every operation performed on tracked tensors
//! while it is active, then replays the log backwards to compute gradients:
//!
//! ```
//! use tapegrad_autograd::GradientTape;
//! use tapegrad_core::Tensor;
//!
//! let tape = GradientTape::new();
//! let x = tape.watch(Tensor::from_scalar(3.0f64));
//! let y = x.mul(&x)?; // y = x^2
//! let grads = tape.gradient(&y, &[&x])?;
//! assert_eq!(grads[0].as_ref().unwrap().to_scalar()?, 6.0);
//! # Ok::<(), tapegrad_core::TensorError>(())
//! ```
//!
//! Backward rules live in a per-tape [`OpRegistry`] keyed by operation
//! kind, and individual outputs can carry rule overrides via
//! [`CustomGradientFunction`]. Because the backward pass is itself written
//! in tracked operations, an enclosing tape can differentiate a gradient
//! again; see [`second_order`].

#![deny(unsafe_code)]

mod context;
pub mod custom_gradients;
pub mod gradient_ops;
pub mod jacobian;
pub mod registry;
pub mod second_order;
pub mod tape;

pub use custom_gradients::{
    apply_custom_gradient, CustomGradientFunction, GradientClipFunction, GradientScaleFunction,
};
pub use gradient_ops::{
    accumulate_gradients, clip_by_global_norm, clip_by_value, has_invalid_gradients,
    scale_gradients, zero_gradients,
};
pub use registry::{BackwardRule, OpRegistry};
pub use second_order::{hessian, hessian_vector_product, second_derivative};
pub use tape::{GradientTape, OpKind, Operation, RecordingPause, TensorId, TrackedTensor};
