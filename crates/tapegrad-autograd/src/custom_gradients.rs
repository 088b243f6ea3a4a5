//! User-defined operations with custom backward rules.
//!
//! A [`CustomGradientFunction`] pairs a forward computation with the
//! backward rule the tape should use for it, overriding whatever the
//! registry would have resolved. Typical uses are numerically stabler
//! gradients than the composed primitives would give, and gradient
//! shaping tricks like clipping or scaling the backward signal while
//! leaving the forward value untouched.

use std::sync::Arc;

use num_traits::Float;
use tapegrad_core::{Result, Tensor, TensorError};

use crate::context;
use crate::registry::BackwardRule;
use crate::tape::{Operation, TensorId, TrackedTensor};

/// A differentiable operation with a caller-supplied backward rule.
pub trait CustomGradientFunction<T>: Send + Sync {
    /// Computes the forward value from the raw input tensors.
    fn forward(&self, inputs: &[Tensor<T>]) -> Result<Tensor<T>>;

    /// Maps the gradient flowing into the output to one gradient per
    /// input, in argument order.
    fn backward(
        &self,
        grad_output: &Tensor<T>,
        inputs: &[Tensor<T>],
        output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>>;

    /// Diagnostic name, shown in error messages and logs.
    fn name(&self) -> &str;
}

/// Adapts a [`CustomGradientFunction`] to the registry's rule interface.
///
/// The wrapped backward works on raw tensors, so its outputs enter the
/// gradient flow as constants: custom overrides are first-order only, and
/// an enclosing tape sees them as opaque.
struct CustomRuleAdapter<T> {
    function: Arc<dyn CustomGradientFunction<T>>,
}

impl<T: Float + Send + Sync + 'static> BackwardRule<T> for CustomRuleAdapter<T> {
    fn vjp(
        &self,
        _operation: &Operation,
        grad: &TrackedTensor<T>,
        inputs: &[TrackedTensor<T>],
        output: &TrackedTensor<T>,
    ) -> Result<Vec<TrackedTensor<T>>> {
        let raw_inputs: Vec<Tensor<T>> = inputs.iter().map(|t| t.tensor().clone()).collect();
        let grads = self
            .function
            .backward(grad.tensor(), &raw_inputs, output.tensor())?;
        if grads.len() != inputs.len() {
            return Err(TensorError::other(
                self.function.name(),
                &format!(
                    "backward returned {} gradients for {} inputs",
                    grads.len(),
                    inputs.len()
                ),
            ));
        }
        Ok(grads.into_iter().map(TrackedTensor::constant).collect())
    }
}

/// Runs `function` on the inputs and records it with its backward rule
/// attached, on every tape currently recording.
pub fn apply_custom_gradient<T: Float + Send + Sync + 'static>(
    function: Arc<dyn CustomGradientFunction<T>>,
    inputs: &[&TrackedTensor<T>],
) -> Result<TrackedTensor<T>> {
    let raw_inputs: Vec<Tensor<T>> = inputs.iter().map(|t| t.tensor().clone()).collect();
    let value = function.forward(&raw_inputs)?;

    let out = TrackedTensor::constant(value);
    let operation = Operation::Custom {
        inputs: inputs.iter().map(|t| t.id()).collect(),
        name: function.name().to_string(),
    };
    let pairs: Vec<(TensorId, &Tensor<T>)> =
        inputs.iter().map(|t| (t.id(), t.tensor())).collect();
    let rule: Arc<dyn BackwardRule<T>> = Arc::new(CustomRuleAdapter { function });
    context::record_with_override(&operation, &pairs, out.id(), out.tensor(), rule);
    Ok(out)
}

impl<T: Float + Send + Sync + 'static> TrackedTensor<T> {
    /// Unary convenience for [`apply_custom_gradient`].
    pub fn with_custom_gradient(
        &self,
        function: Arc<dyn CustomGradientFunction<T>>,
    ) -> Result<Self> {
        apply_custom_gradient(function, &[self])
    }
}

/// Identity forward; backward clamps each gradient element to
/// `[min, max]`.
pub struct GradientClipFunction<T> {
    pub min: T,
    pub max: T,
}

impl<T: Float + Send + Sync + 'static> CustomGradientFunction<T> for GradientClipFunction<T> {
    fn forward(&self, inputs: &[Tensor<T>]) -> Result<Tensor<T>> {
        single_input("gradient_clip", inputs).cloned()
    }

    fn backward(
        &self,
        grad_output: &Tensor<T>,
        _inputs: &[Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>> {
        let lo = Tensor::from_scalar(self.min);
        let hi = Tensor::from_scalar(self.max);
        Ok(vec![grad_output.maximum(&lo)?.minimum(&hi)?])
    }

    fn name(&self) -> &str {
        "gradient_clip"
    }
}

/// Identity forward; backward multiplies the gradient by a fixed factor.
pub struct GradientScaleFunction<T> {
    pub scale: T,
}

impl<T: Float + Send + Sync + 'static> CustomGradientFunction<T> for GradientScaleFunction<T> {
    fn forward(&self, inputs: &[Tensor<T>]) -> Result<Tensor<T>> {
        single_input("gradient_scale", inputs).cloned()
    }

    fn backward(
        &self,
        grad_output: &Tensor<T>,
        _inputs: &[Tensor<T>],
        _output: &Tensor<T>,
    ) -> Result<Vec<Tensor<T>>> {
        Ok(vec![grad_output.mul(&Tensor::from_scalar(self.scale))?])
    }

    fn name(&self) -> &str {
        "gradient_scale"
    }
}

fn single_input<'a, T>(name: &str, inputs: &'a [Tensor<T>]) -> Result<&'a Tensor<T>> {
    match inputs {
        [input] => Ok(input),
        _ => Err(TensorError::other(
            name,
            &format!("expected 1 input, got {}", inputs.len()),
        )),
    }
}
