use crate::backend::ComputeBackend;
use crate::cpu::CpuBackend;
use crate::dtype::{DType, Element};
use crate::error::{Result, TensorError};
use crate::shape::Shape;
use crate::storage::CpuStorage;

/// A dense matrix held in host memory.
///
/// Data is contiguous and row-major; the dtype is carried by the storage.
/// Column blocks produced by the chunked multiplier are plain `Tensor`s.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    storage: CpuStorage,
    shape: Shape,
}

impl Tensor {
    /// Create a new f32 tensor from data and a shape.
    ///
    /// # Panics
    /// Panics if `data.len() != shape.numel()`.
    pub fn new(data: Vec<f32>, shape: Shape) -> Self {
        assert_eq!(
            data.len(),
            shape.numel(),
            "data length {} does not match shape {:?} (numel={})",
            data.len(),
            shape,
            shape.numel()
        );
        Tensor {
            storage: CpuStorage::from_f32_vec(data),
            shape,
        }
    }

    /// Create a tensor from existing storage, checking the element count.
    pub fn from_storage(storage: CpuStorage, shape: Shape) -> Result<Self> {
        if storage.len() != shape.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: shape.dims().to_vec(),
                got: vec![storage.len()],
            });
        }
        Ok(Tensor { storage, shape })
    }

    /// Create a zero-filled tensor with the given shape and dtype.
    pub fn zeros(shape: Shape, dtype: DType) -> Self {
        let n = shape.numel();
        Tensor {
            storage: CpuStorage::zeros(dtype, n),
            shape,
        }
    }

    /// Returns a reference to the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    /// Returns `(rows, cols)`, failing for anything that is not 2-D.
    pub fn matrix_dims(&self) -> Result<(usize, usize)> {
        self.shape.as_matrix()
    }

    /// Returns the underlying storage reference.
    pub fn storage(&self) -> &CpuStorage {
        &self.storage
    }

    /// Copy the elements out as f32.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.storage.to_f32_vec()
    }

    /// Convert to another element type.
    pub fn to_dtype(&self, dtype: DType) -> Tensor {
        Tensor {
            storage: self.storage.to_dtype(dtype),
            shape: self.shape.clone(),
        }
    }

    /// Copy columns `start..end` into a new `[rows, end - start]` tensor.
    pub fn narrow_cols(&self, start: usize, end: usize) -> Result<Tensor> {
        let (rows, cols) = self.matrix_dims()?;
        check_col_range(start, end, cols)?;
        let storage = match &self.storage {
            CpuStorage::F32(v) => CpuStorage::F32(copy_cols(v, rows, cols, start, end)),
            CpuStorage::F16(v) => CpuStorage::F16(copy_cols(v, rows, cols, start, end)),
        };
        Ok(Tensor {
            storage,
            shape: Shape::matrix(rows, end - start),
        })
    }

    /// Remove the first `count` columns and return them as a new tensor.
    ///
    /// The remaining columns are compacted in place inside the existing
    /// buffer, so the extra memory needed is one `[rows, count]` block. The
    /// buffer keeps its capacity; repeated splits of a `W`-column block
    /// therefore move about `W * W / (2 * count)` elements per row in total
    /// without ever reallocating.
    pub fn split_off_leading_cols(&mut self, count: usize) -> Result<Tensor> {
        let (rows, cols) = self.matrix_dims()?;
        check_col_range(0, count, cols)?;
        let head = match &mut self.storage {
            CpuStorage::F32(v) => CpuStorage::F32(split_leading(v, rows, cols, count)),
            CpuStorage::F16(v) => CpuStorage::F16(split_leading(v, rows, cols, count)),
        };
        self.shape = Shape::matrix(rows, cols - count);
        Ok(Tensor {
            storage: head,
            shape: Shape::matrix(rows, count),
        })
    }

    /// Concatenate 2-D tensors along the column axis.
    ///
    /// All parts must share the row count and dtype. An empty slice is an error
    /// because the row count would be unknown.
    pub fn concat_cols(parts: &[Tensor]) -> Result<Tensor> {
        let first = parts
            .first()
            .ok_or_else(|| TensorError::Other("concat_cols: no parts".to_string()))?;
        let (rows, _) = first.matrix_dims()?;
        let dtype = first.dtype();
        let mut total = 0;
        for part in parts {
            let (r, c) = part.matrix_dims()?;
            if r != rows {
                return Err(TensorError::ShapeMismatch {
                    expected: vec![rows, c],
                    got: vec![r, c],
                });
            }
            if part.dtype() != dtype {
                return Err(TensorError::DTypeMismatch {
                    expected: dtype.to_string(),
                    got: part.dtype().to_string(),
                });
            }
            total += c;
        }
        let storage = match dtype {
            DType::F32 => f32::wrap(concat_typed::<f32>(parts, rows, total)?),
            DType::F16 => half::f16::wrap(concat_typed::<half::f16>(parts, rows, total)?),
        };
        Ok(Tensor {
            storage,
            shape: Shape::matrix(rows, total),
        })
    }

    /// Matrix multiplication of two 2-D tensors on the host backend.
    ///
    /// self is [m, k], other is [k, n], result is [m, n].
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor> {
        CpuBackend::new().matmul(self, other)
    }
}

fn check_col_range(start: usize, end: usize, cols: usize) -> Result<()> {
    if start > end || end > cols {
        return Err(TensorError::ColumnRange { start, end, cols });
    }
    Ok(())
}

fn copy_cols<T: Copy>(data: &[T], rows: usize, cols: usize, start: usize, end: usize) -> Vec<T> {
    let width = end - start;
    let mut out = Vec::with_capacity(rows * width);
    for r in 0..rows {
        let row = r * cols;
        out.extend_from_slice(&data[row + start..row + end]);
    }
    out
}

fn split_leading<T: Copy>(data: &mut Vec<T>, rows: usize, cols: usize, count: usize) -> Vec<T> {
    let head = copy_cols(data, rows, cols, 0, count);
    let rest = cols - count;
    // Destination of row r never passes the unread source of row r.
    for r in 0..rows {
        let src = r * cols + count;
        data.copy_within(src..src + rest, r * rest);
    }
    data.truncate(rows * rest);
    head
}

fn concat_typed<T: Element>(parts: &[Tensor], rows: usize, total: usize) -> Result<Vec<T>> {
    let mut views = Vec::with_capacity(parts.len());
    for part in parts {
        let data = T::view(part.storage()).ok_or_else(|| TensorError::DTypeMismatch {
            expected: T::DTYPE.to_string(),
            got: part.dtype().to_string(),
        })?;
        let (_, cols) = part.matrix_dims()?;
        views.push((data, cols));
    }
    let mut out = Vec::with_capacity(rows * total);
    for r in 0..rows {
        for &(data, cols) in &views {
            out.extend_from_slice(&data[r * cols..(r + 1) * cols]);
        }
    }
    Ok(out)
}
