use std::fmt::Debug;
use std::ops::Range;

use crate::error::{Result, TensorError};
use crate::shape::Shape;
use crate::tensor::Tensor;

/// Memory capacity reported by an accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMemory {
    /// Total global memory in bytes.
    pub global_bytes: u64,
    /// Largest single buffer the device will allocate, in bytes.
    pub max_alloc_bytes: u64,
}

/// Trait for pluggable compute backends (host, OpenCL, ...).
///
/// A backend owns a memory space. Host tensors enter it through `upload`,
/// products stay in it as `Self::Array`, and `to_host` is the explicit,
/// blocking copy back. For the host backend `Array` is `Tensor` and both
/// transfers are identities.
pub trait ComputeBackend: Debug {
    /// Backend-native array handle.
    type Array: Debug;

    /// Returns the name of this backend (e.g., "cpu", "opencl").
    fn name(&self) -> &str;

    /// True when arrays live in host memory and `to_host` is free.
    fn is_host(&self) -> bool;

    /// Move a host tensor into the backend's memory space.
    fn upload(&self, host: Tensor) -> Result<Self::Array>;

    /// Shape of a backend-native array.
    fn shape(&self, array: &Self::Array) -> Shape;

    /// Column-block product: `A @ B[:, cols]`.
    ///
    /// - `a`: shape [m, k]
    /// - `b`: shape [k, n]
    /// - Returns: shape [m, cols.len()]
    ///
    /// The column slice of `b` is read in place, never copied out. An empty
    /// range yields an [m, 0] array.
    fn matmul_cols(&self, a: &Self::Array, b: &Self::Array, cols: Range<usize>)
        -> Result<Self::Array>;

    /// Full product: `A @ B`.
    fn matmul(&self, a: &Self::Array, b: &Self::Array) -> Result<Self::Array> {
        let (_, n) = self.shape(b).as_matrix()?;
        self.matmul_cols(a, b, 0..n)
    }

    /// Blocking copy of an array back to host memory.
    fn to_host(&self, array: Self::Array) -> Result<Tensor>;

    /// Device memory capacity, if the backend has a separate memory space.
    fn device_memory(&self) -> Option<DeviceMemory> {
        None
    }
}

/// Validate operand shapes for `matmul_cols`, returning `(m, k, n)`.
pub fn check_matmul_cols(a: &Shape, b: &Shape, cols: &Range<usize>) -> Result<(usize, usize, usize)> {
    let (m, k) = a.as_matrix()?;
    let (k2, n) = b.as_matrix()?;
    if k != k2 {
        return Err(TensorError::MatmulMismatch { m, k, k2, n });
    }
    if cols.start > cols.end || cols.end > n {
        return Err(TensorError::ColumnRange {
            start: cols.start,
            end: cols.end,
            cols: n,
        });
    }
    Ok((m, k, n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_matmul_cols_ok() {
        let dims = check_matmul_cols(&Shape::matrix(4, 3), &Shape::matrix(3, 5), &(1..4)).unwrap();
        assert_eq!(dims, (4, 3, 5));
    }

    #[test]
    fn test_check_matmul_cols_mismatch_reports_both_shapes() {
        let err = check_matmul_cols(&Shape::matrix(4, 3), &Shape::matrix(5, 4), &(0..4)).unwrap_err();
        assert_eq!(err.to_string(), "matmul dimension mismatch: [4x3] @ [5x4]");
    }

    #[test]
    fn test_check_matmul_cols_range() {
        let a = Shape::matrix(2, 2);
        let b = Shape::matrix(2, 5);
        assert!(check_matmul_cols(&a, &b, &(5..5)).is_ok());
        assert!(check_matmul_cols(&a, &b, &(4..6)).is_err());
    }
}
