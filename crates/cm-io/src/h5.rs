//! Chunked HDF5 output.
//!
//! The result goes to `<path>.hdf5` under the dataset `/AB`, one hyperslab
//! write per column block. Only available with the `hdf5` feature.

use std::path::{Path, PathBuf};

use cm_tensor::{DType, Tensor};

use crate::error::Result;

/// Name of the dataset holding the product.
pub const DATASET_NAME: &str = "AB";

/// Upper bound on the row extent of one storage chunk.
pub const CHUNK_ROWS: usize = 1024;

/// Upper bound on the column extent of one storage chunk.
pub const CHUNK_COLS: usize = 500;

/// `<path>.hdf5`, always appended.
pub fn hdf5_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".hdf5");
    PathBuf::from(s)
}

/// Write column blocks into a chunked `[rows, sum(cols)]` dataset.
#[cfg(feature = "hdf5")]
pub fn write_hdf5_blocks(path: &Path, rows: usize, dtype: DType, blocks: &[Tensor]) -> Result<PathBuf> {
    use crate::layout::check_blocks;
    use half::f16;

    let cols = check_blocks(rows, dtype, blocks)?;
    let path = hdf5_path(path);
    let file = ::hdf5::File::create(&path).map_err(hdf5_error)?;
    match dtype {
        DType::F32 => write_dataset::<f32>(&file, rows, cols, blocks)?,
        DType::F16 => write_dataset::<f16>(&file, rows, cols, blocks)?,
    }
    tracing::debug!(path = %path.display(), rows, cols, dataset = DATASET_NAME, "wrote hdf5");
    Ok(path)
}

#[cfg(feature = "hdf5")]
fn write_dataset<T>(file: &::hdf5::File, rows: usize, cols: usize, blocks: &[Tensor]) -> Result<()>
where
    T: cm_tensor::Element + ::hdf5::H5Type,
{
    use crate::error::StoreError;

    let chunk = (rows.clamp(1, CHUNK_ROWS), cols.clamp(1, CHUNK_COLS));
    let dataset = file
        .new_dataset::<T>()
        .chunk(chunk)
        .shape((rows, cols))
        .create(DATASET_NAME)
        .map_err(hdf5_error)?;

    let mut start = 0;
    for (index, block) in blocks.iter().enumerate() {
        let (_, width) = block.matrix_dims()?;
        if width == 0 {
            continue;
        }
        let data = T::view(block.storage()).ok_or_else(|| StoreError::BlockLayout {
            index,
            reason: format!("has dtype {}", block.dtype()),
        })?;
        let view = ndarray::ArrayView2::from_shape((rows, width), data)
            .map_err(|e| StoreError::Hdf5(e.to_string()))?;
        dataset
            .write_slice(&view, (.., start..start + width))
            .map_err(hdf5_error)?;
        start += width;
    }
    Ok(())
}

#[cfg(feature = "hdf5")]
fn hdf5_error(e: ::hdf5::Error) -> crate::error::StoreError {
    crate::error::StoreError::Hdf5(e.to_string())
}

/// Without the `hdf5` feature HDF5 output is refused before touching disk.
#[cfg(not(feature = "hdf5"))]
pub fn write_hdf5_blocks(_path: &Path, _rows: usize, _dtype: DType, _blocks: &[Tensor]) -> Result<PathBuf> {
    Err(crate::error::StoreError::Hdf5Unavailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hdf5_path_appends_suffix() {
        assert_eq!(hdf5_path(Path::new("out")), PathBuf::from("out.hdf5"));
        assert_eq!(hdf5_path(Path::new("out.npy")), PathBuf::from("out.npy.hdf5"));
    }

    #[cfg(not(feature = "hdf5"))]
    #[test]
    fn test_unavailable_without_feature() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ab");
        let err = write_hdf5_blocks(&target, 0, DType::F32, &[]).unwrap_err();
        assert!(matches!(err, crate::error::StoreError::Hdf5Unavailable));
        assert!(!hdf5_path(&target).exists());
    }

    #[cfg(feature = "hdf5")]
    #[test]
    fn test_blocks_land_in_their_hyperslabs() {
        use cm_tensor::Shape;

        let dir = tempfile::tempdir().unwrap();
        let full = Tensor::new((0..12).map(|i| i as f32).collect(), Shape::matrix(3, 4));
        let blocks = vec![full.narrow_cols(0, 3).unwrap(), full.narrow_cols(3, 4).unwrap()];
        let path = write_hdf5_blocks(&dir.path().join("ab"), 3, DType::F32, &blocks).unwrap();

        let file = ::hdf5::File::open(&path).unwrap();
        let data: Vec<f32> = file.dataset(DATASET_NAME).unwrap().read_raw().unwrap();
        assert_eq!(data, full.to_f32_vec());
    }
}
