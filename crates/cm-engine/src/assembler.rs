//! Column-block accumulation of the final product.

use std::path::{Path, PathBuf};

use cm_io::OutputFormat;
use cm_tensor::{DType, Shape, Tensor, TensorError};
use tracing::{debug, trace};

use crate::error::{EngineError, Result};

/// A `[rows, cols]` matrix kept as ordered column blocks.
///
/// Logically the horizontal concatenation of `blocks`. Nothing is copied
/// into one buffer unless `materialize` is called.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkedMatrix {
    rows: usize,
    cols: usize,
    dtype: DType,
    blocks: Vec<Tensor>,
}

impl ChunkedMatrix {
    /// A `[rows, 0]` matrix with no blocks.
    pub fn empty(rows: usize, dtype: DType) -> Self {
        ChunkedMatrix {
            rows,
            cols: 0,
            dtype,
            blocks: Vec::new(),
        }
    }

    /// Wrap a single block as-is.
    pub fn from_block(block: Tensor) -> Result<Self> {
        let (rows, _) = block.matrix_dims()?;
        let mut matrix = ChunkedMatrix::empty(rows, block.dtype());
        matrix.push_block(block)?;
        Ok(matrix)
    }

    /// Append a block on the right. Zero-width blocks are dropped.
    pub fn push_block(&mut self, block: Tensor) -> Result<()> {
        self.check_block(&block)?;
        let (_, cols) = block.matrix_dims()?;
        if cols == 0 {
            return Ok(());
        }
        self.cols += cols;
        self.blocks.push(block);
        Ok(())
    }

    fn check_block(&self, block: &Tensor) -> Result<()> {
        let (rows, cols) = block.matrix_dims()?;
        if rows != self.rows {
            return Err(TensorError::ShapeMismatch {
                expected: vec![self.rows, cols],
                got: vec![rows, cols],
            }
            .into());
        }
        if block.dtype() != self.dtype {
            return Err(TensorError::DTypeMismatch {
                expected: self.dtype.to_string(),
                got: block.dtype().to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> Shape {
        Shape::matrix(self.rows, self.cols)
    }

    pub fn blocks(&self) -> &[Tensor] {
        &self.blocks
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Copy the blocks into one contiguous tensor.
    pub fn materialize(&self) -> Result<Tensor> {
        if self.blocks.is_empty() {
            return Ok(Tensor::zeros(self.shape(), self.dtype));
        }
        Ok(Tensor::concat_cols(&self.blocks)?)
    }

    /// Stream the matrix to `path` in `format`, returning the final path.
    pub fn persist(&self, path: &Path, format: OutputFormat) -> Result<PathBuf> {
        debug!(
            shape = %self.shape(),
            dtype = %self.dtype,
            blocks = self.blocks.len(),
            "persisting chunked matrix"
        );
        Ok(cm_io::write_blocks(
            path,
            format,
            self.rows,
            self.dtype,
            &self.blocks,
        )?)
    }
}

/// Grows the product one column block at a time.
///
/// The first block is stored as-is. Each later block is cut into
/// sub-blocks of `split_cols` columns (the last one possibly narrower) and
/// those are appended in order. Cutting compacts the incoming block in
/// place and the final remainder is copied out of the block's buffer, so
/// at most one extra sub-block is alive at any point and no stored block
/// keeps more capacity than its own columns.
#[derive(Debug)]
pub struct IncrementalAssembler {
    accumulated: Option<ChunkedMatrix>,
    split_cols: usize,
}

impl IncrementalAssembler {
    pub fn new(split_cols: usize) -> Result<Self> {
        if split_cols == 0 {
            return Err(EngineError::InvalidConfig(
                "split_cols must be > 0".to_string(),
            ));
        }
        Ok(IncrementalAssembler {
            accumulated: None,
            split_cols,
        })
    }

    /// The product so far, or `None` before the first append.
    pub fn accumulated(&self) -> Option<&ChunkedMatrix> {
        self.accumulated.as_ref()
    }

    /// Append the next column block of the product.
    ///
    /// Row count and dtype are checked up front, so a rejected block leaves
    /// the accumulated matrix untouched.
    pub fn append(&mut self, block: Tensor) -> Result<()> {
        let acc = match &mut self.accumulated {
            None => {
                self.accumulated = Some(ChunkedMatrix::from_block(block)?);
                return Ok(());
            }
            Some(acc) => acc,
        };
        acc.check_block(&block)?;

        let mut rest = block;
        let mut pieces = 0usize;
        while rest.matrix_dims()?.1 > self.split_cols {
            let head = rest.split_off_leading_cols(self.split_cols)?;
            acc.push_block(head)?;
            pieces += 1;
        }
        let width = rest.matrix_dims()?.1;
        if width > 0 {
            if pieces > 0 {
                // Release the block's original buffer.
                rest = rest.narrow_cols(0, width)?;
            }
            acc.push_block(rest)?;
            pieces += 1;
        }
        trace!(pieces, cols = acc.cols(), "appended block");
        Ok(())
    }

    /// Consume the assembler, returning the product if anything was appended.
    pub fn finish(self) -> Option<ChunkedMatrix> {
        self.accumulated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iota(rows: usize, cols: usize, offset: f32) -> Tensor {
        let data = (0..rows * cols).map(|i| i as f32 + offset).collect();
        Tensor::new(data, Shape::matrix(rows, cols))
    }

    fn widths(m: &ChunkedMatrix) -> Vec<usize> {
        m.blocks().iter().map(|b| b.matrix_dims().unwrap().1).collect()
    }

    #[test]
    fn test_first_block_stored_as_is() {
        let mut asm = IncrementalAssembler::new(2).unwrap();
        asm.append(iota(3, 7, 0.0)).unwrap();
        let acc = asm.accumulated().unwrap();
        assert_eq!(widths(acc), vec![7]);
        assert_eq!(acc.shape(), Shape::matrix(3, 7));
    }

    #[test]
    fn test_later_blocks_are_split() {
        let mut asm = IncrementalAssembler::new(2).unwrap();
        asm.append(iota(2, 3, 0.0)).unwrap();
        asm.append(iota(2, 5, 100.0)).unwrap();
        let acc = asm.finish().unwrap();
        assert_eq!(widths(&acc), vec![3, 2, 2, 1]);
        assert_eq!(acc.cols(), 8);
    }

    #[test]
    fn test_exact_multiple_has_no_remainder() {
        let mut asm = IncrementalAssembler::new(2).unwrap();
        asm.append(iota(2, 1, 0.0)).unwrap();
        asm.append(iota(2, 4, 0.0)).unwrap();
        assert_eq!(widths(asm.accumulated().unwrap()), vec![1, 2, 2]);
    }

    #[test]
    fn test_narrow_block_appended_whole() {
        let mut asm = IncrementalAssembler::new(500).unwrap();
        asm.append(iota(2, 2, 0.0)).unwrap();
        asm.append(iota(2, 3, 0.0)).unwrap();
        assert_eq!(widths(asm.accumulated().unwrap()), vec![2, 3]);
    }

    #[test]
    fn test_split_preserves_values() {
        let a = iota(3, 4, 0.0);
        let b = iota(3, 9, 50.0);
        let mut asm = IncrementalAssembler::new(4).unwrap();
        asm.append(a.clone()).unwrap();
        asm.append(b.clone()).unwrap();
        let got = asm.finish().unwrap().materialize().unwrap();
        let want = Tensor::concat_cols(&[a, b]).unwrap();
        assert_eq!(got, want);
    }

    #[test]
    fn test_zero_width_append_is_noop() {
        let mut asm = IncrementalAssembler::new(2).unwrap();
        asm.append(iota(2, 3, 0.0)).unwrap();
        let before = asm.accumulated().unwrap().clone();
        asm.append(Tensor::zeros(Shape::matrix(2, 0), DType::F32)).unwrap();
        assert_eq!(asm.accumulated().unwrap(), &before);
    }

    #[test]
    fn test_row_mismatch_leaves_state() {
        let mut asm = IncrementalAssembler::new(2).unwrap();
        asm.append(iota(2, 3, 0.0)).unwrap();
        assert!(asm.append(iota(3, 3, 0.0)).is_err());
        assert_eq!(asm.accumulated().unwrap().cols(), 3);
    }

    #[test]
    fn test_dtype_mismatch_rejected() {
        let mut asm = IncrementalAssembler::new(2).unwrap();
        asm.append(iota(2, 3, 0.0)).unwrap();
        let half = iota(2, 3, 0.0).to_dtype(DType::F16);
        assert!(asm.append(half).is_err());
    }

    #[test]
    fn test_zero_split_rejected() {
        assert!(IncrementalAssembler::new(0).is_err());
    }

    #[test]
    fn test_empty_matrix_materializes() {
        let m = ChunkedMatrix::empty(4, DType::F16);
        let t = m.materialize().unwrap();
        assert_eq!(t.shape(), &Shape::matrix(4, 0));
        assert_eq!(t.dtype(), DType::F16);
    }

    #[test]
    fn test_persist_npy_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut asm = IncrementalAssembler::new(2).unwrap();
        asm.append(iota(2, 2, 0.0)).unwrap();
        asm.append(iota(2, 3, 10.0)).unwrap();
        let m = asm.finish().unwrap();

        let path = m.persist(&dir.path().join("ab"), OutputFormat::Npy).unwrap();
        assert_eq!(path, dir.path().join("ab.npy"));
        let loaded = cm_io::load_matrix(&path, DType::F32).unwrap();
        assert_eq!(loaded, m.materialize().unwrap());
    }
}
