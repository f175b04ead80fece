//! Hierarchical inclusive scan
//!
//! A sequence longer than one block is scanned in levels:
//!
//! ```text
//! level 0:  input ──local_block_scan──► scanned₀ + totals₀
//! level 1:  totals₀ ──local_block_scan──► scanned₁ + totals₁
//! ...
//! level d:  totals_{d-1} fits in one block; scanned_d is final
//!
//! unwind:   scanned_{k} += carry-ins from scanned_{k+1}   (k = d-1 .. 0)
//! ```
//!
//! The descent and the unwind are plain loops over a stack of levels;
//! [`ScanPlan`] describes the stack before any work is dispatched.

mod block_scan;
mod plan;
mod propagate;

pub use plan::{LevelShape, ScanPlan};
pub use propagate::carry_ins_from_scanned_totals;

use block_scan::{BlockScanOutput, block_scan};
use propagate::propagate;

use crate::config::ScanConfig;
use crate::error::Result;
use crate::runtime::{ComputeBackend, ProgramOptions, allocate_f32, download_f32, upload_f32};

/// Inclusive scan driver bound to one backend.
///
/// Construction validates the configuration and compiles both kernels once;
/// every [`scan`](Self::scan) afterwards reuses the compiled program.
pub struct Scanner<'a, B: ComputeBackend> {
    backend: &'a B,
    program: B::Program,
    config: ScanConfig,
}

impl<'a, B: ComputeBackend> Scanner<'a, B> {
    /// Validate `config` against `backend` and compile the scan kernels.
    pub fn new(backend: &'a B, config: ScanConfig) -> Result<Self> {
        config.validate(backend.max_group_size())?;
        // Fits: validate() checked the u32 range.
        let block_size = config.block_size as u32;
        let program = backend.compile(&ProgramOptions { block_size })?;
        log::debug!(
            "{}: compiled scan kernels for block size {block_size}",
            backend.name()
        );
        Ok(Self {
            backend,
            program,
            config,
        })
    }

    /// The backend this scanner dispatches to
    pub fn backend(&self) -> &'a B {
        self.backend
    }

    /// The active configuration
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Level plan for a scan of `len` elements
    pub fn plan(&self, len: usize) -> Result<ScanPlan> {
        ScanPlan::new(len, self.config.block_size)
    }

    /// Inclusive scan of a host slice.
    ///
    /// An empty input returns an empty output without touching the backend.
    pub fn scan(&self, input: &[f32]) -> Result<Vec<f32>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }
        // Reject oversized inputs before uploading them.
        self.plan(input.len())?;
        let device_input = upload_f32(self.backend, input)?;
        let output = self.scan_buffer(&device_input, input.len())?;
        download_f32(self.backend, &output, input.len())
    }

    /// Inclusive scan of the first `len` elements of a device buffer.
    ///
    /// `input` is not modified; the result is a new buffer of `len` elements.
    pub fn scan_buffer(&self, input: &B::Buffer, len: usize) -> Result<B::Buffer> {
        let plan = self.plan(len)?;
        log::debug!(
            "{}: scanning {len} elements, block size {}, depth {}",
            self.backend.name(),
            plan.block_size(),
            plan.depth()
        );

        // Descent: each level scans the block totals of the one above it.
        let mut stack: Vec<BlockScanOutput<B::Buffer>> = Vec::with_capacity(plan.depth());
        for &shape in plan.levels() {
            let level_input = match stack.last() {
                Some(above) => &above.totals,
                None => input,
            };
            let level = block_scan(self.backend, &self.program, level_input, shape)?;
            stack.push(level);
        }

        // The deepest level fits in one block, so its local scan is complete.
        let mut result = match stack.pop() {
            Some(deepest) => deepest.scanned,
            None => return allocate_f32(self.backend, 0),
        };

        // Unwind: `result` holds the scanned totals of the level being finished.
        while let Some(level) = stack.pop() {
            result = propagate(
                self.backend,
                &self.program,
                level.scanned,
                &result,
                level.shape,
            )?;
        }
        Ok(result)
    }
}

/// One-shot inclusive scan.
///
/// Compiles the kernels for `block_size`, scans `input` and drops the
/// program. Use a [`Scanner`] to scan repeatedly.
///
/// ```
/// use scanr::prelude::*;
///
/// # #[cfg(feature = "cpu")] {
/// let backend = CpuBackend::new();
/// let out = inclusive_scan(&backend, &[1.0, 1.0, 1.0, 1.0, 1.0], 4).unwrap();
/// assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
/// # }
/// ```
pub fn inclusive_scan<B: ComputeBackend>(
    backend: &B,
    input: &[f32],
    block_size: usize,
) -> Result<Vec<f32>> {
    Scanner::new(backend, ScanConfig::new(block_size))?.scan(input)
}
