pub mod matmul;

use std::ops::Range;

use half::f16;

use crate::backend::{check_matmul_cols, ComputeBackend};
use crate::error::{Result, TensorError};
use crate::shape::Shape;
use crate::storage::CpuStorage;
use crate::tensor::Tensor;

/// Pure-Rust host compute backend.
///
/// Arrays are ordinary host tensors, so `upload` and `to_host` move values
/// without copying.
#[derive(Debug, Clone)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    type Array = Tensor;

    fn name(&self) -> &str {
        "cpu"
    }

    fn is_host(&self) -> bool {
        true
    }

    fn upload(&self, host: Tensor) -> Result<Tensor> {
        Ok(host)
    }

    fn shape(&self, array: &Tensor) -> Shape {
        array.shape().clone()
    }

    fn matmul_cols(&self, a: &Tensor, b: &Tensor, cols: Range<usize>) -> Result<Tensor> {
        let (m, k, n) = check_matmul_cols(a.shape(), b.shape(), &cols)?;
        let storage = match (a.storage(), b.storage()) {
            (CpuStorage::F32(a), CpuStorage::F32(b)) => CpuStorage::F32(matmul::matmul_block::<f32>(
                a, b, m, k, n, cols.start, cols.end,
            )),
            (CpuStorage::F16(a), CpuStorage::F16(b)) => CpuStorage::F16(matmul::matmul_block::<f16>(
                a, b, m, k, n, cols.start, cols.end,
            )),
            (a, b) => {
                return Err(TensorError::DTypeMismatch {
                    expected: a.dtype().to_string(),
                    got: b.dtype().to_string(),
                })
            }
        };
        Tensor::from_storage(storage, Shape::matrix(m, cols.len()))
    }

    fn to_host(&self, array: Tensor) -> Result<Tensor> {
        Ok(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use approx::assert_relative_eq;

    fn backend() -> CpuBackend {
        CpuBackend::new()
    }

    fn iota(rows: usize, cols: usize) -> Tensor {
        let data = (0..rows * cols).map(|i| i as f32 * 0.5 - 1.0).collect();
        Tensor::new(data, Shape::matrix(rows, cols))
    }

    #[test]
    fn test_matmul_identity() {
        let b = backend();
        let eye = Tensor::new(vec![1.0, 0.0, 0.0, 1.0], Shape::matrix(2, 2));
        let x = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], Shape::matrix(2, 2));
        let c = b.matmul(&eye, &x).unwrap();
        assert_eq!(c.to_f32_vec(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_matmul_rectangular() {
        let b = backend();
        // [1,2,3] @ [[1],[2],[3]] = [14]
        let a = Tensor::new(vec![1.0, 2.0, 3.0], Shape::matrix(1, 3));
        let x = Tensor::new(vec![1.0, 2.0, 3.0], Shape::matrix(3, 1));
        let c = b.matmul(&a, &x).unwrap();
        assert_eq!(c.shape().dims(), &[1, 1]);
        assert_eq!(c.to_f32_vec(), vec![14.0]);
    }

    #[test]
    fn test_matmul_cols_matches_narrowed_product() {
        let b = backend();
        let a = iota(4, 3);
        let x = iota(3, 7);
        let block = b.matmul_cols(&a, &x, 2..5).unwrap();
        let expected = b.matmul(&a, &x.narrow_cols(2, 5).unwrap()).unwrap();
        assert_eq!(block.shape().dims(), &[4, 3]);
        for (got, want) in block.to_f32_vec().iter().zip(expected.to_f32_vec()) {
            assert_relative_eq!(*got, want, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_matmul_cols_zero_width() {
        let b = backend();
        let c = b.matmul_cols(&iota(3, 2), &iota(2, 4), 4..4).unwrap();
        assert_eq!(c.shape().dims(), &[3, 0]);
        assert!(c.storage().is_empty());
    }

    #[test]
    fn test_matmul_dimension_mismatch() {
        let b = backend();
        let err = b.matmul(&iota(4, 3), &iota(5, 4)).unwrap_err();
        assert!(matches!(err, TensorError::MatmulMismatch { m: 4, k: 3, k2: 5, n: 4 }));
    }

    #[test]
    fn test_matmul_dtype_mismatch() {
        let b = backend();
        let a = iota(2, 2);
        assert!(b.matmul(&a, &a.to_dtype(DType::F16)).is_err());
    }

    #[test]
    fn test_matmul_f16() {
        let b = backend();
        let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], Shape::matrix(2, 2)).to_dtype(DType::F16);
        let x = Tensor::new(vec![5.0, 6.0, 7.0, 8.0], Shape::matrix(2, 2)).to_dtype(DType::F16);
        let c = b.matmul(&a, &x).unwrap();
        assert_eq!(c.dtype(), DType::F16);
        assert_eq!(c.to_f32_vec(), vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_transfers_are_identity() {
        let b = backend();
        let t = iota(2, 3);
        let up = b.upload(t.clone()).unwrap();
        assert_eq!(b.to_host(up).unwrap(), t);
        assert!(b.is_host());
        assert!(b.device_memory().is_none());
    }
}
