//! End-to-end run: load, plan, multiply, persist.

use std::path::PathBuf;

use cm_io::OutputFormat;
use cm_tensor::{ComputeBackend, DType, Shape};
use tracing::info;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::multiplier::ChunkedMultiplier;
use crate::policy::{check_dimensions, CapacityPolicy, ExecutionMode};
use crate::selector::{select_backend, SelectedBackend};

/// One `A @ B` request.
#[derive(Debug, Clone)]
pub struct MatmulJob {
    /// `.npy` file holding `A`.
    pub lhs: PathBuf,
    /// `.npy` file holding `B`.
    pub rhs: PathBuf,
    /// Output path; the format's extension is appended.
    pub output: PathBuf,
    pub host_only: bool,
    /// Element type both inputs are converted to on load.
    pub dtype: DType,
    pub format: OutputFormat,
    pub config: EngineConfig,
}

/// What a finished job did.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub backend: String,
    pub mode: ExecutionMode,
    pub shape: Shape,
    pub blocks: usize,
    pub output: PathBuf,
}

/// Select a backend for `job` and run it there.
pub fn run_job(job: &MatmulJob) -> Result<JobReport> {
    check_job(job)?;
    match select_backend(job.host_only) {
        SelectedBackend::Host(backend) => run_on(&backend, job),
        #[cfg(feature = "opencl")]
        SelectedBackend::OpenCl(backend) => run_on(&backend, job),
    }
}

/// Run `job` on a specific backend.
///
/// The configuration and output format are checked before anything is
/// loaded. Operand shapes are checked right after loading; on mismatch
/// nothing is uploaded or computed and no output file is created.
pub fn run_on<B: ComputeBackend>(backend: &B, job: &MatmulJob) -> Result<JobReport> {
    check_job(job)?;
    let a = cm_io::load_matrix(&job.lhs, job.dtype)?;
    let b = cm_io::load_matrix(&job.rhs, job.dtype)?;
    info!(a = %a.shape(), b = %b.shape(), dtype = %job.dtype, "loaded operands");
    let (m, k, n) = check_dimensions(a.shape(), b.shape())?;

    let policy = match backend.device_memory() {
        Some(memory) if job.config.derive_from_device => {
            CapacityPolicy::from_device_memory(memory, m, k, n)?
        }
        _ => CapacityPolicy::from_config(&job.config)?,
    };
    let plan = policy.plan(a.shape(), b.shape(), backend.is_host())?;

    let a = backend.upload(a)?;
    let b = backend.upload(b)?;
    let multiplier = ChunkedMultiplier::new(backend, job.config.split_cols);
    let result = multiplier.multiply(&a, &b, &plan)?.into_chunked(backend)?;
    drop(a);
    drop(b);

    info!(shape = %result.shape(), dtype = %result.dtype(), "saving result");
    let output = result.persist(&job.output, job.format)?;
    info!(path = %output.display(), "result written");

    Ok(JobReport {
        backend: backend.name().to_string(),
        mode: plan.mode,
        shape: result.shape(),
        blocks: result.num_blocks(),
        output,
    })
}

fn check_job(job: &MatmulJob) -> Result<()> {
    job.config.validate()?;
    job.format.check_available()?;
    Ok(())
}
