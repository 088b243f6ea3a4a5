/// Dimension descriptor for a tensor. A rank-0 shape describes a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    pub fn from_slice(dims: &[usize]) -> Self {
        Self {
            dims: dims.to_vec(),
        }
    }

    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements; 1 for scalars.
    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// NumPy broadcast rules: align trailing dimensions, a dimension of 1
    /// stretches to match.
    pub fn broadcast_shape(&self, other: &Self) -> Option<Shape> {
        let rank = self.rank().max(other.rank());
        let mut dims = vec![0usize; rank];
        for i in 0..rank {
            let a = self
                .dims
                .get(self.rank().wrapping_sub(i + 1))
                .copied()
                .unwrap_or(1);
            let b = other
                .dims
                .get(other.rank().wrapping_sub(i + 1))
                .copied()
                .unwrap_or(1);
            dims[rank - 1 - i] = if a == b {
                a
            } else if a == 1 {
                b
            } else if b == 1 {
                a
            } else {
                return None;
            };
        }
        Some(Shape::new(dims))
    }

    pub fn is_broadcastable_with(&self, other: &Self) -> bool {
        self.broadcast_shape(other).is_some()
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_shape() {
        let a = Shape::from_slice(&[2, 1, 3]);
        let b = Shape::from_slice(&[4, 3]);
        assert_eq!(a.broadcast_shape(&b).unwrap().dims(), &[2, 4, 3]);

        let scalar = Shape::scalar();
        assert_eq!(a.broadcast_shape(&scalar).unwrap().dims(), &[2, 1, 3]);
    }

    #[test]
    fn test_broadcast_incompatible() {
        let a = Shape::from_slice(&[2, 3]);
        let b = Shape::from_slice(&[4, 3]);
        assert!(a.broadcast_shape(&b).is_none());
        assert!(!a.is_broadcastable_with(&b));
    }

    #[test]
    fn test_scalar_shape() {
        let s = Shape::scalar();
        assert!(s.is_scalar());
        assert_eq!(s.rank(), 0);
        assert_eq!(s.size(), 1);
    }
}
