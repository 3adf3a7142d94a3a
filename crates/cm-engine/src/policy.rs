//! Capacity policy: direct or blocked execution, and where the blocks fall.

use std::ops::Range;

use cm_tensor::{DeviceMemory, Shape, TensorError};
use tracing::info;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Bytes per element of device-resident arrays (devices compute in f32).
const DEVICE_ELEMENT_BYTES: u64 = 4;

/// How the product is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One full `A @ B`.
    Direct,
    /// Column blocks of `B` of at most `block_cols` columns each.
    Blocked { block_cols: usize },
}

/// The decision for one `A [m, k] @ B [k, n]` product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub m: usize,
    pub k: usize,
    pub n: usize,
    pub mode: ExecutionMode,
}

impl ExecutionPlan {
    /// Shape of the product.
    pub fn output_shape(&self) -> Shape {
        Shape::matrix(self.m, self.n)
    }

    /// Column ranges in execution order, or `None` in direct mode.
    pub fn block_ranges(&self) -> Option<Vec<Range<usize>>> {
        match self.mode {
            ExecutionMode::Direct => None,
            ExecutionMode::Blocked { block_cols } => Some(block_ranges(self.n, block_cols)),
        }
    }
}

/// Check `A.cols == B.rows` and return `(m, k, n)`.
pub fn check_dimensions(a: &Shape, b: &Shape) -> Result<(usize, usize, usize)> {
    let (m, k) = a.as_matrix()?;
    let (k2, n) = b.as_matrix()?;
    if k != k2 {
        return Err(TensorError::MatmulMismatch { m, k, k2, n }.into());
    }
    Ok((m, k, n))
}

/// Right edges of the full-width blocks: `width, 2*width, ...` up to and
/// including `n`.
///
/// Blocked execution walks these and then always runs one flush block
/// `[last, n)`, which is empty when `width` divides `n`.
pub fn block_boundaries(n: usize, width: usize) -> Vec<usize> {
    assert!(width > 0, "block width must be > 0");
    (1..=n / width).map(|i| i * width).collect()
}

/// Every block range in order, the trailing flush range included.
pub fn block_ranges(n: usize, width: usize) -> Vec<Range<usize>> {
    let mut ranges = Vec::with_capacity(n / width.max(1) + 1);
    let mut prev = 0;
    for i in block_boundaries(n, width) {
        ranges.push(prev..i);
        prev = i;
    }
    ranges.push(prev..n);
    ranges
}

/// Decides between direct and blocked execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityPolicy {
    element_limit: usize,
    block_cols: usize,
}

impl CapacityPolicy {
    pub fn new(element_limit: usize, block_cols: usize) -> Result<Self> {
        if element_limit == 0 || block_cols == 0 {
            return Err(EngineError::InvalidConfig(format!(
                "element_limit ({}) and block_cols ({}) must be > 0",
                element_limit, block_cols
            )));
        }
        Ok(CapacityPolicy {
            element_limit,
            block_cols,
        })
    }

    /// Fixed thresholds from the configuration.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        CapacityPolicy::new(config.element_limit, config.block_cols)
    }

    /// Thresholds derived from the device's reported memory.
    ///
    /// The inputs' device footprint is subtracted from global memory; half of
    /// what is left (capped by the largest single allocation) bounds one
    /// product array. A block is sized so that two of them fit that bound.
    pub fn from_device_memory(memory: DeviceMemory, m: usize, k: usize, n: usize) -> Result<Self> {
        let inputs = (m as u64 * k as u64 + k as u64 * n as u64) * DEVICE_ELEMENT_BYTES;
        let free = memory.global_bytes.saturating_sub(inputs);
        let per_array = memory.max_alloc_bytes.min(free / 2);
        let element_limit = ((per_array / DEVICE_ELEMENT_BYTES) as usize).max(1);
        let block_cols = (element_limit / 2 / m.max(1)).clamp(1, n.max(1));
        info!(
            global_bytes = memory.global_bytes,
            max_alloc_bytes = memory.max_alloc_bytes,
            element_limit,
            block_cols,
            "derived capacity from device memory"
        );
        CapacityPolicy::new(element_limit, block_cols)
    }

    pub fn element_limit(&self) -> usize {
        self.element_limit
    }

    pub fn block_cols(&self) -> usize {
        self.block_cols
    }

    /// Decide the execution mode for `A @ B`.
    ///
    /// Fails with a dimension mismatch before anything is computed. Host
    /// backends and products within the element limit run directly.
    pub fn plan(&self, a: &Shape, b: &Shape, host_only: bool) -> Result<ExecutionPlan> {
        let (m, k, n) = check_dimensions(a, b)?;
        let elements = m.saturating_mul(n);
        let mode = if host_only || elements <= self.element_limit {
            ExecutionMode::Direct
        } else {
            info!(
                rows = m,
                cols = n,
                limit = self.element_limit,
                block_cols = self.block_cols,
                "final matrix will be large, computing column-by-column"
            );
            ExecutionMode::Blocked {
                block_cols: self.block_cols,
            }
        };
        Ok(ExecutionPlan { m, k, n, mode })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(limit: usize, cols: usize) -> CapacityPolicy {
        CapacityPolicy::new(limit, cols).unwrap()
    }

    #[test]
    fn test_small_product_is_direct() {
        let plan = policy(100, 2).plan(&Shape::matrix(4, 3), &Shape::matrix(3, 4), false).unwrap();
        assert_eq!(plan.mode, ExecutionMode::Direct);
        assert_eq!(plan.output_shape(), Shape::matrix(4, 4));
        assert!(plan.block_ranges().is_none());
    }

    #[test]
    fn test_limit_is_inclusive() {
        let p = policy(16, 2);
        let at = p.plan(&Shape::matrix(4, 3), &Shape::matrix(3, 4), false).unwrap();
        assert_eq!(at.mode, ExecutionMode::Direct);
        let over = p.plan(&Shape::matrix(4, 3), &Shape::matrix(3, 5), false).unwrap();
        assert_eq!(over.mode, ExecutionMode::Blocked { block_cols: 2 });
    }

    #[test]
    fn test_host_only_is_always_direct() {
        let plan = policy(1, 2).plan(&Shape::matrix(4, 3), &Shape::matrix(3, 4), true).unwrap();
        assert_eq!(plan.mode, ExecutionMode::Direct);
    }

    #[test]
    fn test_mismatch_fails() {
        let err = policy(1, 2)
            .plan(&Shape::matrix(4, 3), &Shape::matrix(5, 4), true)
            .unwrap_err();
        assert!(err.is_dimension_mismatch());
        assert!(err.to_string().contains("[4x3] @ [5x4]"));
    }

    #[test]
    fn test_even_split_ends_with_empty_flush() {
        // A (4,3) @ B (3,4), width 2: two full blocks, then a zero-width flush.
        assert_eq!(block_boundaries(4, 2), vec![2, 4]);
        assert_eq!(block_ranges(4, 2), vec![0..2, 2..4, 4..4]);
    }

    #[test]
    fn test_remainder_goes_to_flush() {
        // A (2,2) @ B (2,5), width 2: widths [2, 2, 1].
        let widths: Vec<usize> = block_ranges(5, 2).iter().map(|r| r.len()).collect();
        assert_eq!(widths, vec![2, 2, 1]);
    }

    #[test]
    fn test_narrow_matrix_is_single_flush() {
        assert!(block_boundaries(3, 5000).is_empty());
        assert_eq!(block_ranges(3, 5000), vec![0..3]);
    }

    #[test]
    fn test_ranges_cover_exactly() {
        for n in 0..30 {
            for w in 1..8 {
                let ranges = block_ranges(n, w);
                let mut cursor = 0;
                for r in &ranges {
                    assert_eq!(r.start, cursor);
                    assert!(r.len() <= w);
                    cursor = r.end;
                }
                assert_eq!(cursor, n);
            }
        }
    }

    #[test]
    fn test_zero_thresholds_rejected() {
        assert!(CapacityPolicy::new(0, 5).is_err());
        assert!(CapacityPolicy::new(5, 0).is_err());
    }

    #[test]
    fn test_from_device_memory() {
        let memory = DeviceMemory {
            global_bytes: 16 * 1024 * 1024,
            max_alloc_bytes: 4 * 1024 * 1024,
        };
        // Inputs take 2 MiB, leaving 14 MiB; half of it is capped to 4 MiB.
        let p = CapacityPolicy::from_device_memory(memory, 512, 512, 512).unwrap();
        assert_eq!(p.element_limit(), 1024 * 1024);
        assert_eq!(p.block_cols(), 512);

        let tight = CapacityPolicy::from_device_memory(memory, 4096, 16, 4096).unwrap();
        assert_eq!(tight.element_limit(), 1024 * 1024);
        assert_eq!(tight.block_cols(), 128);
    }

    #[test]
    fn test_from_device_memory_exhausted() {
        let memory = DeviceMemory {
            global_bytes: 1024,
            max_alloc_bytes: 1024,
        };
        let p = CapacityPolicy::from_device_memory(memory, 100, 100, 100).unwrap();
        assert_eq!(p.element_limit(), 1);
        assert_eq!(p.block_cols(), 1);
    }
}
