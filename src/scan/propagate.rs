//! Carry-Propagation Stage (host side)

use super::plan::LevelShape;
use crate::error::Result;
use crate::runtime::{Completion, ComputeBackend, KernelArg, KernelName, LaunchConfig, Program};

/// Add each block's carry-in to the locally scanned values of one level.
///
/// `scanned_totals` is the inclusive scan of the level's block totals; the
/// kernel reads it shifted by one block. `local` is updated in place and
/// handed back as the level's result, so taking it by value keeps the alias
/// invisible to callers.
pub(crate) fn propagate<B: ComputeBackend>(
    backend: &B,
    program: &B::Program,
    local: B::Buffer,
    scanned_totals: &B::Buffer,
    shape: LevelShape,
) -> Result<B::Buffer> {
    let block_size = program.block_size() as usize;
    let size = shape.kernel_len()?;

    log::trace!(
        "{}: carry_propagation over {} elements in {} blocks",
        backend.name(),
        shape.len,
        shape.block_count
    );
    backend
        .dispatch(
            program,
            KernelName::CarryPropagation,
            LaunchConfig::for_elements(shape.len, block_size),
            &[
                KernelArg::Scalar(size),
                KernelArg::Buffer(&local),
                KernelArg::Buffer(scanned_totals),
            ],
        )?
        .wait()?;

    Ok(local)
}

/// Turn an inclusive scan of block totals into per-block carry-ins.
///
/// Block 0 gets zero and block `k` gets `scanned_totals[k - 1]`.
///
/// ```
/// use scanr::scan::carry_ins_from_scanned_totals;
///
/// assert_eq!(carry_ins_from_scanned_totals(&[4.0, 5.0]), vec![0.0, 4.0]);
/// ```
pub fn carry_ins_from_scanned_totals(scanned_totals: &[f32]) -> Vec<f32> {
    let mut carry_ins = Vec::with_capacity(scanned_totals.len());
    if !scanned_totals.is_empty() {
        carry_ins.push(0.0);
        carry_ins.extend_from_slice(&scanned_totals[..scanned_totals.len() - 1]);
    }
    carry_ins
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carry_ins_shift_by_one() {
        assert_eq!(
            carry_ins_from_scanned_totals(&[4.0, 5.0, 9.0]),
            vec![0.0, 4.0, 5.0]
        );
        assert_eq!(carry_ins_from_scanned_totals(&[7.0]), vec![0.0]);
        assert!(carry_ins_from_scanned_totals(&[]).is_empty());
    }
}
