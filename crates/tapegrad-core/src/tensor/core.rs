use crate::{Result, Shape, TensorError};
use ndarray::ArrayD;

/// Dense tensor with row-major CPU storage.
///
/// All constructors and operations keep the backing array in standard
/// layout, so `as_slice` never fails for tensors produced by this crate.
#[derive(Debug, Clone)]
pub struct Tensor<T> {
    pub(crate) data: ArrayD<T>,
    pub(crate) shape: Shape,
}

impl<T> Tensor<T> {
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Borrow the underlying data in row-major order.
    pub fn as_slice(&self) -> Option<&[T]> {
        self.data.as_slice()
    }

    /// Borrow the backing `ndarray` array.
    pub fn array(&self) -> &ArrayD<T> {
        &self.data
    }

    pub fn numel(&self) -> usize {
        self.shape.size()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_scalar()
    }

    pub fn same_shape(&self, other: &Self) -> bool {
        self.shape == other.shape
    }

    /// Value at a multi-dimensional index, `None` when out of bounds or of
    /// wrong rank.
    pub fn get(&self, index: &[usize]) -> Option<T>
    where
        T: Clone,
    {
        if index.len() != self.data.ndim() {
            return None;
        }
        self.data.get(index).cloned()
    }

    /// Extract the single element of a one-element tensor.
    pub fn to_scalar(&self) -> Result<T>
    where
        T: Clone,
    {
        if self.numel() != 1 {
            return Err(TensorError::invalid_shape(
                "to_scalar",
                &format!("expected one element, tensor has {}", self.numel()),
            ));
        }
        self.data.iter().next().cloned().ok_or_else(|| {
            TensorError::invalid_shape("to_scalar", "empty backing storage")
        })
    }
}
