//! Custom backward rules: per-output overrides and registry replacement.

use std::sync::Arc;

use tapegrad_autograd::{
    apply_custom_gradient, BackwardRule, CustomGradientFunction, GradientClipFunction,
    GradientScaleFunction, GradientTape, OpKind, OpRegistry, Operation, TrackedTensor,
};
use tapegrad_core::{Result, Tensor};

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

/// `y = x^2` forward, but a deliberately wrong backward (`dy/dx = 10`)
/// so tests can tell the override was used.
struct SquareWithFlatGradient;

impl CustomGradientFunction<f64> for SquareWithFlatGradient {
    fn forward(&self, inputs: &[Tensor<f64>]) -> Result<Tensor<f64>> {
        inputs[0].mul(&inputs[0])
    }

    fn backward(
        &self,
        grad_output: &Tensor<f64>,
        inputs: &[Tensor<f64>],
        _output: &Tensor<f64>,
    ) -> Result<Vec<Tensor<f64>>> {
        let flat = Tensor::ones(inputs[0].shape().dims()).mul(&Tensor::from_scalar(10.0))?;
        Ok(vec![grad_output.mul(&flat)?])
    }

    fn name(&self) -> &str {
        "square_flat_grad"
    }
}

#[test]
fn test_override_replaces_builtin_rule() {
    let tape = GradientTape::new();
    let x = tape.watch(Tensor::from_scalar(3.0f64));
    let y = x.with_custom_gradient(Arc::new(SquareWithFlatGradient)).unwrap();

    // forward is still the square
    assert_close(y.tensor().to_scalar().unwrap(), 9.0);

    // backward uses the override, not d(x^2)/dx = 6
    let grads = tape.gradient(&y, &[&x]).unwrap();
    assert_close(grads[0].as_ref().unwrap().to_scalar().unwrap(), 10.0);
}

#[test]
fn test_override_composes_with_builtin_rules() {
    // z = custom(x) * x: dz/dx = 10*x + custom(x) = 30 + 9 at x = 3
    let tape = GradientTape::new();
    let x = tape.watch(Tensor::from_scalar(3.0f64));
    let y = x.with_custom_gradient(Arc::new(SquareWithFlatGradient)).unwrap();
    let z = y.mul(&x).unwrap();

    let grads = tape.gradient(&z, &[&x]).unwrap();
    assert_close(grads[0].as_ref().unwrap().to_scalar().unwrap(), 39.0);
}

#[test]
fn test_gradient_clip_function() {
    // forward is the identity; backward clamps into [-1, 1]
    let tape = GradientTape::new();
    let x = tape.watch(Tensor::from_scalar(2.0f64));
    let clipped = x
        .with_custom_gradient(Arc::new(GradientClipFunction { min: -1.0, max: 1.0 }))
        .unwrap();
    // y = 5 * clipped(x): raw gradient would be 5
    let y = clipped.mul(&TrackedTensor::from_scalar(5.0)).unwrap();

    assert_close(y.tensor().to_scalar().unwrap(), 10.0);
    let grads = tape.gradient(&y, &[&x]).unwrap();
    assert_close(grads[0].as_ref().unwrap().to_scalar().unwrap(), 1.0);
}

#[test]
fn test_gradient_scale_function() {
    let tape = GradientTape::new();
    let x = tape.watch(Tensor::from_scalar(2.0f64));
    let scaled = x
        .with_custom_gradient(Arc::new(GradientScaleFunction { scale: 0.5 }))
        .unwrap();
    let y = scaled.mul(&scaled).unwrap();

    // dy/dx = 2*x * 0.5 = 2 at x = 2
    let grads = tape.gradient(&y, &[&x]).unwrap();
    assert_close(grads[0].as_ref().unwrap().to_scalar().unwrap(), 2.0);
}

struct WeightedSum;

impl CustomGradientFunction<f64> for WeightedSum {
    fn forward(&self, inputs: &[Tensor<f64>]) -> Result<Tensor<f64>> {
        let two = Tensor::from_scalar(2.0);
        inputs[0].add(&inputs[1].mul(&two)?)
    }

    fn backward(
        &self,
        grad_output: &Tensor<f64>,
        _inputs: &[Tensor<f64>],
        _output: &Tensor<f64>,
    ) -> Result<Vec<Tensor<f64>>> {
        let two = Tensor::from_scalar(2.0);
        Ok(vec![grad_output.clone(), grad_output.mul(&two)?])
    }

    fn name(&self) -> &str {
        "weighted_sum"
    }
}

#[test]
fn test_multi_input_custom_function() {
    // y = a + 2b: dy/da = 1, dy/db = 2
    let tape = GradientTape::new();
    let a = tape.watch(Tensor::from_scalar(1.0f64));
    let b = tape.watch(Tensor::from_scalar(4.0f64));
    let y = apply_custom_gradient(Arc::new(WeightedSum), &[&a, &b]).unwrap();

    assert_close(y.tensor().to_scalar().unwrap(), 9.0);
    let grads = tape.gradient(&y, &[&a, &b]).unwrap();
    assert_close(grads[0].as_ref().unwrap().to_scalar().unwrap(), 1.0);
    assert_close(grads[1].as_ref().unwrap().to_scalar().unwrap(), 2.0);
}

/// A replacement Mul rule that doubles the true gradient, to show registry
/// substitution end to end.
struct DoubledMulRule;

impl BackwardRule<f64> for DoubledMulRule {
    fn vjp(
        &self,
        _operation: &Operation,
        grad: &TrackedTensor<f64>,
        inputs: &[TrackedTensor<f64>],
        _output: &TrackedTensor<f64>,
    ) -> Result<Vec<TrackedTensor<f64>>> {
        let two = TrackedTensor::from_scalar(2.0);
        let grad_a = grad.mul(&inputs[1])?.mul(&two)?;
        let grad_b = grad.mul(&inputs[0])?.mul(&two)?;
        Ok(vec![grad_a, grad_b])
    }
}

#[test]
fn test_registry_rule_substitution() {
    let tape = GradientTape::new();
    let mut registry = OpRegistry::<f64>::builtin();
    registry.register(OpKind::Mul, Arc::new(DoubledMulRule));
    tape.set_registry(registry);

    let x = tape.watch(Tensor::from_scalar(3.0f64));
    let y = x.mul(&x).unwrap();

    // builtin would give 6; the substituted rule gives 12
    let grads = tape.gradient(&y, &[&x]).unwrap();
    assert_close(grads[0].as_ref().unwrap().to_scalar().unwrap(), 12.0);
}

#[test]
fn test_registry_is_per_tape() {
    let plain = GradientTape::persistent();
    let doubled = GradientTape::persistent();
    let mut registry = OpRegistry::<f64>::builtin();
    registry.register(OpKind::Mul, Arc::new(DoubledMulRule));
    doubled.set_registry(registry);

    let x = plain.watch(Tensor::from_scalar(3.0f64));
    doubled.watch_tracked(&x);
    let y = x.mul(&x).unwrap();

    let plain_grads = plain.gradient(&y, &[&x]).unwrap();
    let doubled_grads = doubled.gradient(&y, &[&x]).unwrap();
    assert_close(plain_grads[0].as_ref().unwrap().to_scalar().unwrap(), 6.0);
    assert_close(doubled_grads[0].as_ref().unwrap().to_scalar().unwrap(), 12.0);
}
