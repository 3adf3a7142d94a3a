//! `cm-tensor` - Dense matrices with pluggable compute backends for chunkmul.
//!
//! This crate provides:
//! - A `Tensor` type backed by host (CPU) storage in f32 or f16
//! - A `ComputeBackend` trait separating backend-native arrays from host tensors
//! - A reference `CpuBackend` implementation
//! - An OpenCL accelerator backend behind the `opencl` feature
//! - Shape utilities and element type definitions

pub mod backend;
pub mod cpu;
pub mod dtype;
pub mod error;
#[cfg(feature = "opencl")]
pub mod opencl;
pub mod shape;
pub mod storage;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use backend::{ComputeBackend, DeviceMemory};
pub use cpu::CpuBackend;
pub use dtype::{DType, Element};
pub use error::{Result, TensorError};
#[cfg(feature = "opencl")]
pub use opencl::OpenClBackend;
pub use shape::Shape;
pub use storage::CpuStorage;
pub use tensor::Tensor;
