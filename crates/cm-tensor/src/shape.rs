use crate::error::{Result, TensorError};
use std::fmt;

/// Dimension sizes of a tensor. Everything the engine computes on is 2-D,
/// but shapes read from disk may not be, so the rank is not fixed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    /// A `[rows, cols]` shape.
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Shape {
            dims: vec![rows, cols],
        }
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Element count; zero when any dimension is zero.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// `(rows, cols)`, or `NotAMatrix` for any other rank.
    pub fn as_matrix(&self) -> Result<(usize, usize)> {
        match *self.dims.as_slice() {
            [rows, cols] => Ok((rows, cols)),
            _ => Err(TensorError::NotAMatrix { ndim: self.ndim() }),
        }
    }
}

/// numpy-style tuple, e.g. `(4, 3)`.
impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.dims.iter().map(|d| d.to_string()).collect();
        write!(f, "({})", dims.join(", "))
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}
