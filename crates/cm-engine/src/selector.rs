//! Backend selection with fallback to the host.

use cm_tensor::CpuBackend;
#[cfg(feature = "opencl")]
use cm_tensor::OpenClBackend;
use tracing::{info, warn};

/// The backend chosen for a run.
#[derive(Debug)]
pub enum SelectedBackend {
    Host(CpuBackend),
    #[cfg(feature = "opencl")]
    OpenCl(OpenClBackend),
}

impl SelectedBackend {
    pub fn name(&self) -> &str {
        use cm_tensor::ComputeBackend;
        match self {
            SelectedBackend::Host(b) => b.name(),
            #[cfg(feature = "opencl")]
            SelectedBackend::OpenCl(b) => b.name(),
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self, SelectedBackend::Host(_))
    }
}

/// Choose the accelerator unless `host_only` is set.
///
/// Selection never fails: an unavailable accelerator, or a build without
/// one, falls back to the host backend with a warning.
pub fn select_backend(host_only: bool) -> SelectedBackend {
    if host_only {
        info!("host-only run, using cpu backend");
        return SelectedBackend::Host(CpuBackend::new());
    }

    #[cfg(feature = "opencl")]
    match OpenClBackend::new() {
        Ok(backend) => {
            info!(device = backend.device_name(), "using opencl backend");
            return SelectedBackend::OpenCl(backend);
        }
        Err(e) => warn!(error = %e, "opencl unavailable, falling back to cpu backend"),
    }

    #[cfg(not(feature = "opencl"))]
    warn!("built without accelerator support, falling back to cpu backend");

    SelectedBackend::Host(CpuBackend::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_only_selects_cpu() {
        let backend = select_backend(true);
        assert!(backend.is_host());
        assert_eq!(backend.name(), "cpu");
    }

    #[cfg(not(feature = "opencl"))]
    #[test]
    fn test_accelerator_request_falls_back() {
        let backend = select_backend(false);
        assert!(backend.is_host());
    }
}
