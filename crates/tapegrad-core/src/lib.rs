//! # tapegrad-core
//!
//! Dense CPU tensor substrate for the `tapegrad` automatic differentiation
//! engine. Provides the [`Tensor`] type over `ndarray` storage, the
//! [`Shape`] descriptor with NumPy-style broadcast rules, and the
//! [`TensorError`] taxonomy shared by the whole workspace.
//!
//! The differentiation engine itself lives in `tapegrad-autograd`; this
//! crate knows nothing about tapes or gradients beyond the error variants
//! they surface.

pub mod error;
pub mod shape;
pub mod tensor;

pub use error::{Result, TensorError};
pub use shape::Shape;
pub use tensor::Tensor;
