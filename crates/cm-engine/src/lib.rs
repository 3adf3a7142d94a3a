//! `cm-engine` - Chunked matrix multiplication for chunkmul.
//!
//! Computes `A @ B` on a host or accelerator backend. When the product is
//! too large for the accelerator it is computed in column blocks of `B`,
//! each block copied back to the host and appended to a `ChunkedMatrix`
//! that is finally streamed to disk.

pub mod assembler;
pub mod config;
pub mod error;
pub mod job;
pub mod multiplier;
pub mod policy;
pub mod selector;

pub use assembler::{ChunkedMatrix, IncrementalAssembler};
pub use config::{EngineConfig, DEFAULT_BLOCK_COLS, DEFAULT_ELEMENT_LIMIT, DEFAULT_SPLIT_COLS};
pub use error::{EngineError, Result};
pub use job::{run_job, run_on, JobReport, MatmulJob};
pub use multiplier::{ChunkedMultiplier, Product};
pub use policy::{block_ranges, CapacityPolicy, ExecutionMode, ExecutionPlan};
pub use selector::{select_backend, SelectedBackend};

pub use cm_io::OutputFormat;
pub use cm_tensor::DType;
