//! Reverse-mode gradient evaluation over a recorded tape.

pub mod activation_ops;
pub mod basic_ops;
pub mod core;
pub mod tensor_ops;

pub(crate) use self::core::TapeSnapshot;
