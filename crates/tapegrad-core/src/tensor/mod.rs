//! Dense CPU tensor over `ndarray` storage.
//!
//! Split into focused submodules: `core` holds the struct and accessors,
//! `creation` the constructors, `ops` the math.

mod core;
mod creation;
mod ops;

pub use self::core::Tensor;
