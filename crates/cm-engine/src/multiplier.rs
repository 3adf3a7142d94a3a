//! Direct and column-blocked matrix products over any `ComputeBackend`.

use std::ops::Range;

use cm_tensor::{ComputeBackend, TensorError};
use tracing::{debug, info};

use crate::assembler::{ChunkedMatrix, IncrementalAssembler};
use crate::error::Result;
use crate::policy::{block_boundaries, ExecutionMode, ExecutionPlan};

/// Result of `ChunkedMultiplier::multiply`.
#[derive(Debug)]
pub enum Product<A> {
    /// The full product, still in the backend's memory space.
    Direct(A),
    /// The product accumulated on the host as column blocks.
    Blocked(ChunkedMatrix),
}

impl<A> Product<A> {
    /// Bring the product to the host as a chunked matrix.
    pub fn into_chunked<B>(self, backend: &B) -> Result<ChunkedMatrix>
    where
        B: ComputeBackend<Array = A>,
    {
        match self {
            Product::Direct(array) => ChunkedMatrix::from_block(backend.to_host(array)?),
            Product::Blocked(matrix) => Ok(matrix),
        }
    }
}

/// Computes `A @ B` on a backend, in one shot or column block by column block.
#[derive(Debug)]
pub struct ChunkedMultiplier<'a, B: ComputeBackend> {
    backend: &'a B,
    split_cols: usize,
}

impl<'a, B: ComputeBackend> ChunkedMultiplier<'a, B> {
    pub fn new(backend: &'a B, split_cols: usize) -> Self {
        ChunkedMultiplier {
            backend,
            split_cols,
        }
    }

    pub fn backend(&self) -> &B {
        self.backend
    }

    /// Run `plan` on backend-resident operands.
    pub fn multiply(&self, a: &B::Array, b: &B::Array, plan: &ExecutionPlan) -> Result<Product<B::Array>> {
        match plan.mode {
            ExecutionMode::Direct => Ok(Product::Direct(self.multiply_direct(a, b)?)),
            ExecutionMode::Blocked { block_cols } => {
                Ok(Product::Blocked(self.multiply_blocked(a, b, block_cols)?))
            }
        }
    }

    /// One full product, left in the backend's memory space.
    pub fn multiply_direct(&self, a: &B::Array, b: &B::Array) -> Result<B::Array> {
        debug!(backend = self.backend.name(), "direct product");
        Ok(self.backend.matmul(a, b)?)
    }

    /// Blocked product: walk `B` in column blocks of `block_cols`, copy each
    /// block product to the host and append it to the result.
    ///
    /// Full-width blocks are computed first; a final flush block covers the
    /// remaining columns and is empty when `block_cols` divides `n`.
    pub fn multiply_blocked(&self, a: &B::Array, b: &B::Array, block_cols: usize) -> Result<ChunkedMatrix> {
        let (_, n) = self.backend.shape(b).as_matrix()?;
        let mut assembler = IncrementalAssembler::new(self.split_cols)?;

        let mut prev = 0;
        for i in block_boundaries(n, block_cols) {
            self.append_block(a, b, prev..i, &mut assembler)?;
            prev = i;
            if let Some(acc) = assembler.accumulated() {
                info!(iteration = i, shape = %acc.shape(), "block appended");
            }
        }
        self.append_block(a, b, prev..n, &mut assembler)?;
        if let Some(acc) = assembler.accumulated() {
            info!(iteration = n, shape = %acc.shape(), "final block appended");
        }

        assembler
            .finish()
            .ok_or_else(|| TensorError::Other("blocked product produced no blocks".to_string()).into())
    }

    fn append_block(
        &self,
        a: &B::Array,
        b: &B::Array,
        cols: Range<usize>,
        assembler: &mut IncrementalAssembler,
    ) -> Result<()> {
        let block = self.backend.matmul_cols(a, b, cols)?;
        let host = self.backend.to_host(block)?;
        assembler.append(host)
    }
}
