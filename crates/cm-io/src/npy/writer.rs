use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use cm_tensor::{CpuStorage, DType, Tensor};
use tracing::debug;

use super::header::NpyHeader;
use crate::error::Result;
use crate::layout::check_blocks;

/// Path numpy's `save` would write to: `.npy` is appended unless present.
pub fn npy_path(path: &Path) -> PathBuf {
    if path.extension() == Some(OsStr::new("npy")) {
        path.to_path_buf()
    } else {
        let mut s = path.as_os_str().to_owned();
        s.push(".npy");
        PathBuf::from(s)
    }
}

/// Write column blocks as one C-ordered `[rows, sum(cols)]` `.npy` array.
///
/// Rows are streamed across the blocks in order, so no contiguous copy of
/// the full matrix is ever built. Returns the path actually written.
pub fn write_npy_blocks(path: &Path, rows: usize, dtype: DType, blocks: &[Tensor]) -> Result<PathBuf> {
    let cols = check_blocks(rows, dtype, blocks)?;
    let path = npy_path(path);

    let mut writer = BufWriter::new(File::create(&path)?);
    writer.write_all(&NpyHeader::for_matrix(rows, cols, dtype).encode())?;

    let widths: Vec<usize> = blocks
        .iter()
        .map(|b| b.matrix_dims().map(|(_, c)| c))
        .collect::<std::result::Result<_, _>>()?;
    for r in 0..rows {
        for (block, &width) in blocks.iter().zip(&widths) {
            let span = r * width..(r + 1) * width;
            match block.storage() {
                CpuStorage::F32(v) => {
                    for x in &v[span] {
                        writer.write_all(&x.to_le_bytes())?;
                    }
                }
                CpuStorage::F16(v) => {
                    for x in &v[span] {
                        writer.write_all(&x.to_le_bytes())?;
                    }
                }
            }
        }
    }
    writer.flush()?;

    debug!(path = %path.display(), rows, cols, blocks = blocks.len(), "wrote .npy");
    Ok(path)
}

/// Write a single tensor as `.npy`.
pub fn save_matrix(path: &Path, tensor: &Tensor) -> Result<PathBuf> {
    let (rows, _) = tensor.matrix_dims()?;
    write_npy_blocks(path, rows, tensor.dtype(), std::slice::from_ref(tensor))
}
