use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid .npy magic: {0:?}")]
    InvalidMagic([u8; 6]),
    #[error("unsupported .npy version: {0}.{1}")]
    UnsupportedVersion(u8, u8),
    #[error("malformed .npy header: {0}")]
    MalformedHeader(String),
    #[error("unsupported array dtype: {0}")]
    UnsupportedDescr(String),
    #[error("expected a 2-D array, got shape {0:?}")]
    NotAMatrix(Vec<usize>),
    #[error("array data truncated: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("block {index} does not fit the output: {reason}")]
    BlockLayout { index: usize, reason: String },
    #[error("HDF5 error: {0}")]
    Hdf5(String),
    #[error("HDF5 output requested but chunkmul was built without the `hdf5` feature")]
    Hdf5Unavailable,
    #[error("tensor error: {0}")]
    Tensor(#[from] cm_tensor::TensorError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
