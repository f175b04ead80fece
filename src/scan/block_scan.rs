//! Block Scan Stage (host side)

use super::plan::LevelShape;
use crate::error::Result;
use crate::runtime::{
    Completion, ComputeBackend, KernelArg, KernelName, LaunchConfig, Program, allocate_f32,
};

/// Buffers produced by one Block Scan dispatch
pub(crate) struct BlockScanOutput<Buf> {
    /// Per-block inclusive scan, `shape.len` elements
    pub scanned: Buf,
    /// One total per block, `shape.block_count` elements
    pub totals: Buf,
    pub shape: LevelShape,
}

/// Scan every block of `input` independently and collect the block totals.
///
/// `input` holds `shape.len` elements and is only read.
pub(crate) fn block_scan<B: ComputeBackend>(
    backend: &B,
    program: &B::Program,
    input: &B::Buffer,
    shape: LevelShape,
) -> Result<BlockScanOutput<B::Buffer>> {
    let block_size = program.block_size() as usize;
    let size = shape.kernel_len()?;
    let scanned = allocate_f32(backend, shape.len)?;
    let totals = allocate_f32(backend, shape.block_count)?;

    log::trace!(
        "{}: local_block_scan over {} elements in {} blocks",
        backend.name(),
        shape.len,
        shape.block_count
    );
    backend
        .dispatch(
            program,
            KernelName::LocalBlockScan,
            LaunchConfig::for_elements(shape.len, block_size),
            &[
                KernelArg::Scalar(size),
                KernelArg::Buffer(input),
                KernelArg::Buffer(&scanned),
                KernelArg::Local(block_size),
                KernelArg::Local(block_size),
                KernelArg::Buffer(&totals),
            ],
        )?
        .wait()?;

    Ok(BlockScanOutput {
        scanned,
        totals,
        shape,
    })
}
