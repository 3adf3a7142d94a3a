use std::io::Cursor;
use std::path::Path;

use half::f16;
use memmap2::Mmap;
use tracing::debug;

use cm_tensor::{DType, Element, Shape, Tensor};

use super::header::{Endian, FloatFormat, NpyHeader};
use crate::error::{Result, StoreError};

/// A `.npy` file backed by a memory-mapped region.
///
/// The header is parsed up front; the payload is only decoded when a tensor
/// is requested, straight from the mapping.
pub struct NpyFile {
    /// Parsed header (dtype, order, shape).
    pub header: NpyHeader,
    /// Memory-mapped file contents.
    mmap: Mmap,
    /// Byte offset within the file where array data begins.
    data_offset: usize,
    /// Payload length in bytes, as described by the header.
    data_len: usize,
}

impl NpyFile {
    /// Open and parse a `.npy` file from disk.
    pub fn open(path: &Path) -> Result<NpyFile> {
        let file = std::fs::File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let mut cursor = Cursor::new(&mmap[..]);
        let header = NpyHeader::parse(&mut cursor)?;
        let data_offset = cursor.position() as usize;

        let data_len = header.data_size()?;
        let available = mmap.len() - data_offset;
        if available < data_len {
            return Err(StoreError::Truncated {
                expected: data_len,
                got: available,
            });
        }

        Ok(NpyFile {
            header,
            mmap,
            data_offset,
            data_len,
        })
    }

    /// Raw payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.mmap[self.data_offset..self.data_offset + self.data_len]
    }

    /// `(rows, cols)` of the stored matrix.
    pub fn matrix_dims(&self) -> Result<(usize, usize)> {
        match self.header.shape.as_slice() {
            &[rows, cols] => Ok((rows, cols)),
            other => Err(StoreError::NotAMatrix(other.to_vec())),
        }
    }

    /// Decode the stored matrix into a row-major tensor of `dtype`.
    ///
    /// Any stored float width is accepted and converted; Fortran-ordered
    /// data is transposed into C order.
    pub fn to_tensor(&self, dtype: DType) -> Result<Tensor> {
        let (rows, cols) = self.matrix_dims()?;
        let storage = match dtype {
            DType::F32 => f32::wrap(self.decode::<f32>(rows, cols)),
            DType::F16 => f16::wrap(self.decode::<f16>(rows, cols)),
        };
        Ok(Tensor::from_storage(storage, Shape::matrix(rows, cols))?)
    }

    fn decode<T: Element>(&self, rows: usize, cols: usize) -> Vec<T> {
        let descr = self.header.descr;
        let size = descr.format.item_size();
        let values: Vec<T> = self
            .data()
            .chunks_exact(size)
            .map(|b| T::from_f32(read_float(b, descr.format, descr.endian)))
            .collect();
        if self.header.fortran_order {
            column_major_to_row_major(&values, rows, cols)
        } else {
            values
        }
    }
}

/// Load a 2-D `.npy` array as a tensor of `dtype`.
pub fn load_matrix(path: &Path, dtype: DType) -> Result<Tensor> {
    let file = NpyFile::open(path)?;
    let tensor = file.to_tensor(dtype)?;
    debug!(
        path = %path.display(),
        stored = %file.header.descr.as_numpy_str(),
        shape = %tensor.shape(),
        %dtype,
        "loaded matrix"
    );
    Ok(tensor)
}

fn read_float(bytes: &[u8], format: FloatFormat, endian: Endian) -> f32 {
    match (format, endian) {
        (FloatFormat::F16, Endian::Little) => f16::from_le_bytes([bytes[0], bytes[1]]).to_f32(),
        (FloatFormat::F16, Endian::Big) => f16::from_be_bytes([bytes[0], bytes[1]]).to_f32(),
        (FloatFormat::F32, Endian::Little) => {
            f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        }
        (FloatFormat::F32, Endian::Big) => f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        (FloatFormat::F64, endian) => {
            let mut buf8 = [0u8; 8];
            buf8.copy_from_slice(&bytes[..8]);
            let v = match endian {
                Endian::Little => f64::from_le_bytes(buf8),
                Endian::Big => f64::from_be_bytes(buf8),
            };
            v as f32
        }
    }
}

fn column_major_to_row_major<T: Copy>(values: &[T], rows: usize, cols: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(values.len());
    for r in 0..rows {
        for c in 0..cols {
            out.push(values[c * rows + r]);
        }
    }
    out
}
