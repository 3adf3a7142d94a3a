use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use cm_engine::{
    run_job, DType, EngineConfig, EngineError, MatmulJob, OutputFormat, DEFAULT_BLOCK_COLS,
    DEFAULT_ELEMENT_LIMIT, DEFAULT_SPLIT_COLS,
};
use tracing::info;

mod logging;

/// Command-line arguments of `gpu-matmul`
#[derive(Parser, Debug)]
#[command(
    name = "gpu-matmul",
    about = "Multiply two .npy matrices, in column blocks when the product is too large for the device",
    version
)]
struct Cli {
    /// Path to the left operand A (.npy)
    #[arg(long)]
    m1: PathBuf,
    /// Path to the right operand B (.npy)
    #[arg(long)]
    m2: PathBuf,
    /// Output path (the format's extension is appended)
    #[arg(long)]
    ofile: PathBuf,
    /// 1 to compute in host memory only
    #[arg(long = "cpu_only", default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=1))]
    cpu_only: u8,
    /// 1 to load the inputs as float16, 0 for float32
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=1))]
    fp16: u8,
    /// 1 to write a chunked HDF5 file instead of .npy
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=1))]
    hdf5: u8,
    /// Largest product, in elements, computed in one shot on the device
    #[arg(long, default_value_t = DEFAULT_ELEMENT_LIMIT)]
    element_limit: usize,
    /// Column width of each block in blocked mode
    #[arg(long, default_value_t = DEFAULT_BLOCK_COLS)]
    block_cols: usize,
    /// Column width of the sub-blocks appended to the result
    #[arg(long, default_value_t = DEFAULT_SPLIT_COLS)]
    split_cols: usize,
    /// 1 to size blocks from the device's reported memory
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=1))]
    derive_budget: u8,
    /// Log format: pretty, compact or json
    #[arg(long)]
    log_format: Option<String>,
}

impl Cli {
    fn job(&self) -> MatmulJob {
        MatmulJob {
            lhs: self.m1.clone(),
            rhs: self.m2.clone(),
            output: self.ofile.clone(),
            host_only: self.cpu_only == 1,
            dtype: DType::from_half_flag(self.fp16 == 1),
            format: OutputFormat::from_hdf5_flag(self.hdf5 == 1),
            config: EngineConfig {
                element_limit: self.element_limit,
                block_cols: self.block_cols,
                split_cols: self.split_cols,
                derive_from_device: self.derive_budget == 1,
            },
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let job = cli.job();
    let report = run_job(&job).with_context(|| {
        format!(
            "failed to multiply {} by {}",
            job.lhs.display(),
            job.rhs.display()
        )
    })?;
    info!(
        backend = %report.backend,
        mode = ?report.mode,
        shape = %report.shape,
        blocks = report.blocks,
        path = %report.output.display(),
        "done"
    );
    Ok(())
}

/// Entry point: parse arguments, run the job, exit 1 on any failure
fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(logging::LogConfig::from_env(cli.log_format.as_deref())) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }

    if let Err(e) = run(&cli) {
        match e.downcast_ref::<EngineError>() {
            Some(inner) if inner.is_dimension_mismatch() => {
                eprintln!("Error: Array dimensions do not match. {inner}");
            }
            _ => eprintln!("error: {e:#}"),
        }
        process::exit(1);
    }
}
