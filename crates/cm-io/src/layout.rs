use cm_tensor::{DType, Tensor};

use crate::error::{Result, StoreError};

/// Check that `blocks` tile a `[rows, _]` matrix of `dtype` column-wise and
/// return the total column count.
pub fn check_blocks(rows: usize, dtype: DType, blocks: &[Tensor]) -> Result<usize> {
    let mut cols = 0;
    for (index, block) in blocks.iter().enumerate() {
        let (r, c) = block.matrix_dims()?;
        if r != rows {
            return Err(StoreError::BlockLayout {
                index,
                reason: format!("has {} rows, expected {}", r, rows),
            });
        }
        if block.dtype() != dtype {
            return Err(StoreError::BlockLayout {
                index,
                reason: format!("has dtype {}, expected {}", block.dtype(), dtype),
            });
        }
        cols += c;
    }
    Ok(cols)
}
