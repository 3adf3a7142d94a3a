//! `cm-io` - Array file formats for chunkmul.
//!
//! - `.npy` loading through a memory map, with dtype conversion on load
//! - Streaming `.npy` and HDF5 writers that take the result as ordered
//!   column blocks instead of one contiguous buffer

pub mod error;
pub mod h5;
mod layout;
pub mod npy;

use std::path::{Path, PathBuf};

use cm_tensor::{DType, Tensor};

pub use error::{Result, StoreError};
pub use layout::check_blocks;
pub use npy::{load_matrix, save_matrix, write_npy_blocks, NpyFile, NpyHeader};

/// On-disk format of the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// numpy `.npy` file at `<path>` (`.npy` appended when missing).
    Npy,
    /// Chunked HDF5 file at `<path>.hdf5`, dataset `/AB`.
    Hdf5,
}

impl OutputFormat {
    /// Selects the format from the HDF5 switch.
    pub fn from_hdf5_flag(hdf5: bool) -> OutputFormat {
        if hdf5 {
            OutputFormat::Hdf5
        } else {
            OutputFormat::Npy
        }
    }

    /// Fail early if this build cannot write the format.
    pub fn check_available(&self) -> Result<()> {
        match self {
            OutputFormat::Hdf5 if !cfg!(feature = "hdf5") => Err(StoreError::Hdf5Unavailable),
            _ => Ok(()),
        }
    }

    /// Where a result written to `path` in this format ends up.
    pub fn output_path(&self, path: &Path) -> PathBuf {
        match self {
            OutputFormat::Npy => npy::npy_path(path),
            OutputFormat::Hdf5 => h5::hdf5_path(path),
        }
    }
}

/// Persist ordered column blocks of a `[rows, _]` matrix in `format`.
pub fn write_blocks(
    path: &Path,
    format: OutputFormat,
    rows: usize,
    dtype: DType,
    blocks: &[Tensor],
) -> Result<PathBuf> {
    match format {
        OutputFormat::Npy => write_npy_blocks(path, rows, dtype, blocks),
        OutputFormat::Hdf5 => h5::write_hdf5_blocks(path, rows, dtype, blocks),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_paths() {
        let p = Path::new("/tmp/result");
        assert_eq!(OutputFormat::Npy.output_path(p), PathBuf::from("/tmp/result.npy"));
        assert_eq!(OutputFormat::Hdf5.output_path(p), PathBuf::from("/tmp/result.hdf5"));
        assert_eq!(OutputFormat::from_hdf5_flag(true), OutputFormat::Hdf5);
        assert_eq!(OutputFormat::from_hdf5_flag(false), OutputFormat::Npy);
    }

    #[test]
    fn test_check_available() {
        assert!(OutputFormat::Npy.check_available().is_ok());
        let hdf5 = OutputFormat::Hdf5.check_available();
        if cfg!(feature = "hdf5") {
            assert!(hdf5.is_ok());
        } else {
            assert!(matches!(hdf5, Err(StoreError::Hdf5Unavailable)));
        }
    }
}
