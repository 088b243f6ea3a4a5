use crate::{Result, Shape, Tensor, TensorError};
use ndarray::{ArrayD, IxDyn};
use num_traits::{One, Zero};

impl<T> Tensor<T> {
    /// Wrap an existing `ndarray` array, normalizing to standard layout.
    pub fn from_array(data: ArrayD<T>) -> Self
    where
        T: Clone,
    {
        let data = if data.is_standard_layout() {
            data
        } else {
            let dims = data.shape().to_vec();
            ArrayD::from_shape_vec(IxDyn(&dims), data.iter().cloned().collect())
                .expect("layout normalization preserves element count")
        };
        let shape = Shape::from_slice(data.shape());
        Self { data, shape }
    }

    /// Build a tensor from a row-major element vector.
    pub fn from_vec(values: Vec<T>, dims: &[usize]) -> Result<Self>
    where
        T: Clone,
    {
        let expected: usize = dims.iter().product();
        if values.len() != expected {
            return Err(TensorError::invalid_shape(
                "from_vec",
                &format!("{} values do not fill shape {:?}", values.len(), dims),
            ));
        }
        let data = ArrayD::from_shape_vec(IxDyn(dims), values)?;
        Ok(Self::from_array(data))
    }

    /// Rank-0 tensor holding a single value.
    pub fn from_scalar(value: T) -> Self
    where
        T: Clone,
    {
        Self::from_array(ArrayD::from_elem(IxDyn(&[]), value))
    }

    pub fn zeros(dims: &[usize]) -> Self
    where
        T: Clone + Zero,
    {
        Self::from_array(ArrayD::from_elem(IxDyn(dims), T::zero()))
    }

    pub fn ones(dims: &[usize]) -> Self
    where
        T: Clone + One,
    {
        Self::from_array(ArrayD::from_elem(IxDyn(dims), T::one()))
    }

    /// All-zeros tensor with a single one at the given row-major flat index.
    ///
    /// Used by the jacobian evaluator to seed one target component at a
    /// time.
    pub fn one_hot(dims: &[usize], flat_index: usize) -> Result<Self>
    where
        T: Clone + Zero + One,
    {
        let size: usize = dims.iter().product();
        if flat_index >= size {
            return Err(TensorError::invalid_argument(
                "one_hot",
                &format!("flat index {flat_index} out of range for shape {dims:?}"),
            ));
        }
        let mut values = vec![T::zero(); size];
        values[flat_index] = T::one();
        Self::from_vec(values, dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_shape_check() {
        assert!(Tensor::<f32>::from_vec(vec![1.0, 2.0, 3.0], &[2, 2]).is_err());
        let t = Tensor::<f32>::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
        assert_eq!(t.shape().dims(), &[2, 2]);
    }

    #[test]
    fn test_scalar_roundtrip() {
        let t = Tensor::from_scalar(3.5f64);
        assert!(t.is_scalar());
        assert!((t.to_scalar().unwrap() - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_one_hot() {
        let t = Tensor::<f32>::one_hot(&[2, 2], 2).unwrap();
        assert_eq!(t.as_slice().unwrap(), &[0.0, 0.0, 1.0, 0.0]);
        assert!(Tensor::<f32>::one_hot(&[2, 2], 4).is_err());
    }
}
