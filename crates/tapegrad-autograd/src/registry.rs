//! Backward-rule registry.
//!
//! Every operation kind maps to a [`BackwardRule`] that turns the gradient
//! flowing into an output into gradients for each input (a vector-Jacobian
//! product). Registries are plain values installed per tape, so callers can
//! extend or replace rules without touching any global state.

use std::collections::HashMap;
use std::sync::Arc;

use num_traits::{Float, FromPrimitive};
use tapegrad_core::Result;

use crate::tape::gradient_computation::{activation_ops, basic_ops, tensor_ops};
use crate::tape::{OpKind, Operation, TrackedTensor};

/// A vector-Jacobian product for one operation kind.
///
/// `inputs` and `output` carry the forward values captured at record time,
/// with their original tape identities, so rule bodies written in tracked
/// operations remain differentiable by enclosing tapes.
pub trait BackwardRule<T>: Send + Sync {
    /// Returns one gradient per input, in the operation's argument order.
    fn vjp(
        &self,
        operation: &Operation,
        grad: &TrackedTensor<T>,
        inputs: &[TrackedTensor<T>],
        output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>>;
}

/// Lookup table from operation kind to backward rule.
pub struct OpRegistry<T> {
    rules: HashMap<OpKind, Arc<dyn BackwardRule<T>>>,
}

impl<T> Clone for OpRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            rules: self.rules.clone(),
        }
    }
}

impl<T> Default for OpRegistry<T>
where
    T: Float + FromPrimitive + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::builtin()
    }
}

impl<T> OpRegistry<T> {
    /// A registry with no rules at all. Any gradient query over it fails
    /// with an undefined-gradient error naming the missing kind.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Installs (or replaces) the rule for `kind`.
    pub fn register(&mut self, kind: OpKind, rule: Arc<dyn BackwardRule<T>>) -> &mut Self {
        self.rules.insert(kind, rule);
        self
    }

    pub fn lookup(&self, kind: OpKind) -> Option<Arc<dyn BackwardRule<T>>> {
        self.rules.get(&kind).cloned()
    }

    pub fn contains(&self, kind: OpKind) -> bool {
        self.rules.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<T> OpRegistry<T>
where
    T: Float + FromPrimitive + Send + Sync + 'static,
{
    /// The full builtin rule set covering every recorded operation kind.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        basic_ops::register(&mut registry);
        activation_ops::register(&mut registry);
        tensor_ops::register(&mut registry);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_arithmetic_kinds() {
        let registry = OpRegistry::<f64>::builtin();
        for kind in [
            OpKind::Add,
            OpKind::Sub,
            OpKind::Mul,
            OpKind::Div,
            OpKind::Pow,
            OpKind::MatMul,
            OpKind::Neg,
            OpKind::Exp,
            OpKind::Ln,
            OpKind::Sigmoid,
            OpKind::Tanh,
            OpKind::Relu,
            OpKind::PowScalar,
            OpKind::Transpose,
            OpKind::Reshape,
            OpKind::Sum,
            OpKind::Mean,
            OpKind::Identity,
            OpKind::StopGradient,
        ] {
            assert!(registry.contains(kind), "missing rule for {kind}");
        }
    }

    #[test]
    fn empty_registry_has_no_rules() {
        let registry = OpRegistry::<f32>::empty();
        assert!(registry.is_empty());
        assert!(registry.lookup(OpKind::Add).is_none());
    }
}
