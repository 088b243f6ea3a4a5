use crate::{Result, Tensor, TensorError};
use ndarray::{Axis, Ix2, IxDyn, Zip};
use num_traits::{Float, FromPrimitive};

impl<T> Tensor<T>
where
    T: Float + Send + Sync + 'static,
{
    fn broadcast_binary<F>(&self, other: &Self, name: &str, f: F) -> Result<Self>
    where
        F: Fn(T, T) -> T,
    {
        let out_shape = self.shape.broadcast_shape(&other.shape).ok_or_else(|| {
            TensorError::shape_mismatch(name, &self.shape.to_string(), &other.shape.to_string())
        })?;
        let dims = IxDyn(out_shape.dims());
        let lhs = self
            .data
            .broadcast(dims.clone())
            .ok_or_else(|| TensorError::invalid_shape(name, "lhs broadcast failed"))?;
        let rhs = other
            .data
            .broadcast(dims)
            .ok_or_else(|| TensorError::invalid_shape(name, "rhs broadcast failed"))?;
        let data = Zip::from(&lhs).and(&rhs).map_collect(|&a, &b| f(a, b));
        Ok(Self::from_array(data))
    }

    fn map<F>(&self, f: F) -> Self
    where
        F: Fn(T) -> T,
    {
        Self::from_array(self.data.mapv(f))
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        self.broadcast_binary(other, "add", |a, b| a + b)
    }

    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.broadcast_binary(other, "sub", |a, b| a - b)
    }

    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.broadcast_binary(other, "mul", |a, b| a * b)
    }

    pub fn div(&self, other: &Self) -> Result<Self> {
        self.broadcast_binary(other, "div", |a, b| a / b)
    }

    /// Element-wise power with a tensor exponent.
    pub fn pow(&self, other: &Self) -> Result<Self> {
        self.broadcast_binary(other, "pow", |a, b| a.powf(b))
    }

    pub fn maximum(&self, other: &Self) -> Result<Self> {
        self.broadcast_binary(other, "maximum", |a, b| if a > b { a } else { b })
    }

    pub fn minimum(&self, other: &Self) -> Result<Self> {
        self.broadcast_binary(other, "minimum", |a, b| if a < b { a } else { b })
    }

    pub fn neg(&self) -> Self {
        self.map(|v| -v)
    }

    pub fn exp(&self) -> Self {
        self.map(|v| v.exp())
    }

    pub fn ln(&self) -> Self {
        self.map(|v| v.ln())
    }

    pub fn sigmoid(&self) -> Self {
        self.map(|v| T::one() / (T::one() + (-v).exp()))
    }

    pub fn tanh(&self) -> Self {
        self.map(|v| v.tanh())
    }

    pub fn relu(&self) -> Self {
        self.map(|v| if v > T::zero() { v } else { T::zero() })
    }

    /// Element-wise integer power.
    pub fn powi(&self, exponent: i32) -> Self {
        self.map(|v| v.powi(exponent))
    }

    /// 1 where the element is strictly positive, 0 elsewhere. The ReLU
    /// derivative mask.
    pub fn gt_zero_mask(&self) -> Self {
        self.map(|v| if v > T::zero() { T::one() } else { T::zero() })
    }

    /// 2-D matrix product.
    pub fn matmul(&self, other: &Self) -> Result<Self> {
        let a = self
            .data
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| TensorError::invalid_shape("matmul", "lhs must be 2-D"))?;
        let b = other
            .data
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| TensorError::invalid_shape("matmul", "rhs must be 2-D"))?;
        if a.ncols() != b.nrows() {
            return Err(TensorError::shape_mismatch(
                "matmul",
                &format!("inner dimension {}", a.ncols()),
                &format!("{}", b.nrows()),
            ));
        }
        Ok(Self::from_array(a.dot(&b).into_dyn()))
    }

    /// Reverse all axes; for matrices this is the usual transpose.
    pub fn transpose(&self) -> Self {
        Self::from_array(self.data.t().to_owned())
    }

    pub fn reshape(&self, dims: &[usize]) -> Result<Self> {
        let expected: usize = dims.iter().product();
        if expected != self.numel() {
            return Err(TensorError::invalid_shape(
                "reshape",
                &format!(
                    "cannot reshape {} elements into {:?}",
                    self.numel(),
                    dims
                ),
            ));
        }
        let data = self
            .data
            .clone()
            .into_shape_with_order(IxDyn(dims))
            .map_err(TensorError::from)?;
        Ok(Self::from_array(data))
    }

    pub fn broadcast_to(&self, dims: &[usize]) -> Result<Self> {
        let view = self.data.broadcast(IxDyn(dims)).ok_or_else(|| {
            TensorError::shape_mismatch("broadcast_to", &format!("{dims:?}"), &self.shape.to_string())
        })?;
        Ok(Self::from_array(view.to_owned()))
    }

    /// Sum over the given axes, or over everything when `axes` is `None`.
    ///
    /// The full reduction folds elements in row-major order, so the
    /// floating-point result is deterministic for a given tensor.
    pub fn sum(&self, axes: Option<&[usize]>, keepdims: bool) -> Result<Self> {
        match axes {
            None => {
                let total = self
                    .data
                    .iter()
                    .fold(T::zero(), |acc, &v| acc + v);
                if keepdims {
                    let dims = vec![1usize; self.rank()];
                    Tensor::from_vec(vec![total], &dims)
                } else {
                    Ok(Tensor::from_scalar(total))
                }
            }
            Some(axes) => {
                let mut sorted = axes.to_vec();
                sorted.sort_unstable();
                sorted.dedup();
                if sorted.len() != axes.len() {
                    return Err(TensorError::invalid_argument("sum", "duplicate axes"));
                }
                for &ax in &sorted {
                    if ax >= self.rank() {
                        return Err(TensorError::invalid_axis("sum", ax, self.rank()));
                    }
                }
                let mut data = self.data.clone();
                for &ax in sorted.iter().rev() {
                    data = data.sum_axis(Axis(ax));
                }
                if keepdims {
                    for &ax in sorted.iter() {
                        data = data.insert_axis(Axis(ax));
                    }
                }
                Ok(Self::from_array(data))
            }
        }
    }

    /// Arithmetic mean over the given axes (all axes when `None`).
    pub fn mean(&self, axes: Option<&[usize]>, keepdims: bool) -> Result<Self>
    where
        T: FromPrimitive,
    {
        let summed = self.sum(axes, keepdims)?;
        let count = self.numel() / summed.numel().max(1);
        let count = T::from_usize(count.max(1)).ok_or_else(|| {
            TensorError::other("mean", "element count not representable in element type")
        })?;
        Ok(summed.map(|v| v / count))
    }

    /// Sum a (possibly broadcast) gradient back down to `dims`.
    ///
    /// Inverse of broadcasting: extra leading axes are summed away, and
    /// axes that were stretched from 1 are summed with the dimension kept.
    pub fn reduce_to_shape(&self, dims: &[usize]) -> Result<Self> {
        if self.shape.dims() == dims {
            return Ok(self.clone());
        }
        let extra = self.rank().checked_sub(dims.len()).ok_or_else(|| {
            TensorError::shape_mismatch(
                "reduce_to_shape",
                &format!("{dims:?}"),
                &self.shape.to_string(),
            )
        })?;
        let mut reduced = if extra > 0 {
            let leading: Vec<usize> = (0..extra).collect();
            self.sum(Some(&leading), false)?
        } else {
            self.clone()
        };
        let stretched: Vec<usize> = dims
            .iter()
            .enumerate()
            .filter(|&(i, &d)| d == 1 && reduced.shape.dims()[i] != 1)
            .map(|(i, _)| i)
            .collect();
        if !stretched.is_empty() {
            reduced = reduced.sum(Some(&stretched), true)?;
        }
        if reduced.shape.dims() != dims {
            reduced = reduced.reshape(dims)?;
        }
        Ok(reduced)
    }

    /// True when any element is NaN or infinite.
    pub fn has_invalid_values(&self) -> bool {
        self.data.iter().any(|v| !v.is_finite())
    }
}
