//! Jacobian and batch-Jacobian evaluation.

use tapegrad_autograd::GradientTape;
use tapegrad_core::{Tensor, TensorError};

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn test_elementwise_jacobian_is_diagonal() {
    // y = x^2 element-wise: J[i][j] = 2*x[i] when i == j, else 0
    let tape = GradientTape::new();
    let x = tape.watch(Tensor::from_vec(vec![1.0f64, 2.0, 3.0], &[3]).unwrap());
    let y = x.mul(&x).unwrap();

    let jac = tape.jacobian(&y, &x).unwrap();
    assert_eq!(jac.shape().dims(), &[3, 3]);
    let expected = [
        [2.0, 0.0, 0.0],
        [0.0, 4.0, 0.0],
        [0.0, 0.0, 6.0],
    ];
    for i in 0..3 {
        for j in 0..3 {
            assert_close(jac.get(&[i, j]).unwrap(), expected[i][j]);
        }
    }
}

#[test]
fn test_matmul_jacobian_shape_and_values() {
    // y = W·x with W [2,2] constant, x [2,1]: dy[i]/dx[j] = W[i][j]
    let tape = GradientTape::new();
    let x = tape.watch(Tensor::from_vec(vec![1.0f64, 2.0], &[2, 1]).unwrap());
    let w = tapegrad_autograd::TrackedTensor::constant(
        Tensor::from_vec(vec![1.0f64, 2.0, 3.0, 4.0], &[2, 2]).unwrap(),
    );
    let y = w.matmul(&x).unwrap();

    let jac = tape.jacobian(&y, &x).unwrap();
    // shape: target dims [2,1] ++ source dims [2,1]
    assert_eq!(jac.shape().dims(), &[2, 1, 2, 1]);
    let flat = jac.as_slice().unwrap();
    assert_eq!(flat, &[1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_jacobian_of_unconnected_source_is_zeros() {
    let tape = GradientTape::new();
    let x = tape.watch(Tensor::from_vec(vec![1.0f64, 2.0], &[2]).unwrap());
    let z = tape.watch(Tensor::from_vec(vec![5.0f64, 6.0], &[2]).unwrap());
    let y = x.mul(&x).unwrap();

    let jac = tape.jacobian(&y, &z).unwrap();
    assert_eq!(jac.shape().dims(), &[2, 2]);
    assert_eq!(jac.as_slice().unwrap(), &[0.0; 4]);
}

#[test]
fn test_jacobian_consumes_non_persistent_tape_once() {
    let tape = GradientTape::new();
    let x = tape.watch(Tensor::from_vec(vec![1.0f64, 2.0], &[2]).unwrap());
    let y = x.mul(&x).unwrap();

    // several internal backward passes count as one query
    assert!(tape.jacobian(&y, &x).is_ok());
    assert!(matches!(
        tape.jacobian(&y, &x),
        Err(TensorError::StaleTape { .. })
    ));
}

#[test]
fn test_batch_jacobian_diagonal_blocks() {
    // batch of 2 items, y = x^2 element-wise over [2, 3]
    let tape = GradientTape::new();
    let x = tape.watch(
        Tensor::from_vec(vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap(),
    );
    let y = x.mul(&x).unwrap();

    let jac = tape.batch_jacobian(&y, &x).unwrap();
    assert_eq!(jac.shape().dims(), &[2, 3, 3]);
    for item in 0..2 {
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j {
                    2.0 * ((item * 3 + i) as f64 + 1.0)
                } else {
                    0.0
                };
                assert_close(jac.get(&[item, i, j]).unwrap(), expected);
            }
        }
    }
}

#[test]
fn test_batch_jacobian_with_coupled_items_keeps_documented_shape() {
    // batch items coupled through a sum over the batch axis: per-item
    // independence is the caller's contract, so the result is still Ok with
    // the documented shape, just not meaningful as per-item Jacobians
    let tape = GradientTape::new();
    let x = tape.watch(
        Tensor::from_vec(vec![1.0f64, 2.0, 3.0, 4.0], &[2, 2]).unwrap(),
    );
    let coupling = x.sum(Some(&[0]), true).unwrap();
    let y = x.mul(&coupling).unwrap();

    let jac = tape.batch_jacobian(&y, &x).unwrap();
    assert_eq!(jac.shape().dims(), &[2, 2, 2]);
}

#[test]
fn test_batch_jacobian_rejects_mismatched_batch_dims() {
    let tape = GradientTape::new();
    let x = tape.watch(Tensor::from_vec(vec![1.0f64; 6], &[2, 3]).unwrap());
    let z = tape.watch(Tensor::from_vec(vec![1.0f64; 9], &[3, 3]).unwrap());
    let y = x.mul(&x).unwrap();

    let err = tape.batch_jacobian(&y, &z).unwrap_err();
    assert!(matches!(err, TensorError::ShapeMismatch { .. }));
}

#[test]
fn test_batch_jacobian_rejects_scalars() {
    let tape = GradientTape::new();
    let x = tape.watch(Tensor::from_scalar(2.0f64));
    let y = x.mul(&x).unwrap();

    assert!(tape.batch_jacobian(&y, &x).is_err());
}

#[test]
fn test_jacobian_rows_sum_to_gradient() {
    // summing the Jacobian over the target axes gives the gradient of the
    // summed target
    let tape = GradientTape::persistent();
    let x = tape.watch(Tensor::from_vec(vec![1.0f64, 2.0, 3.0], &[3]).unwrap());
    let y = x.mul(&x).unwrap().exp();

    let jac = tape.jacobian(&y, &x).unwrap();
    let summed_target = y.sum(None, false).unwrap();
    let grads = tape.gradient(&summed_target, &[&x]).unwrap();
    let grad = grads[0].as_ref().unwrap();

    for j in 0..3 {
        let mut column = 0.0;
        for i in 0..3 {
            column += jac.get(&[i, j]).unwrap();
        }
        assert_close(column, grad.get(&[j]).unwrap());
    }
}

#[test]
fn test_batch_jacobian_matches_full_jacobian_diagonal() {
    // independent batch items: the batch Jacobian is exactly the diagonal
    // blocks of the full Jacobian
    let tape = GradientTape::persistent();
    let x = tape.watch(Tensor::from_vec(vec![0.5f64, 1.0, 1.5, 2.0], &[2, 2]).unwrap());
    let y = x.tanh();

    let full = tape.jacobian(&y, &x).unwrap();
    let batched = tape.batch_jacobian(&y, &x).unwrap();
    assert_eq!(batched.shape().dims(), &[2, 2, 2]);
    for item in 0..2 {
        for i in 0..2 {
            for j in 0..2 {
                assert_close(
                    batched.get(&[item, i, j]).unwrap(),
                    full.get(&[item, i, item, j]).unwrap(),
                );
            }
        }
    }
}

#[test]
fn test_jacobian_on_persistent_tape_is_repeatable() {
    let tape = GradientTape::persistent();
    let x = tape.watch(Tensor::from_vec(vec![2.0f64, 3.0], &[2]).unwrap());
    let y = x.mul(&x).unwrap();

    let j1 = tape.jacobian(&y, &x).unwrap();
    let j2 = tape.jacobian(&y, &x).unwrap();
    assert_eq!(j1.as_slice().unwrap(), j2.as_slice().unwrap());
}
