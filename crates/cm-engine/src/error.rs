use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Tensor(#[from] cm_tensor::TensorError),
    #[error(transparent)]
    Store(#[from] cm_io::StoreError),
}

impl EngineError {
    /// True for the `A.cols != B.rows` failure.
    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(
            self,
            EngineError::Tensor(cm_tensor::TensorError::MatmulMismatch { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
