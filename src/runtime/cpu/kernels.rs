//! Host kernels for the two scan stages
//!
//! Each function runs one whole dispatch: it walks every execution group and,
//! inside a group, every lane. Lanes of a group never observe each other's
//! writes from the current round.

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Hillis-Steele inclusive scan of one execution group.
///
/// `scratch_a` and `scratch_b` are the group's two local-memory arrays, both
/// `block_size` long. A round reads only from one of them and writes only to
/// the other; swapping them is the barrier. Lanes past `input.len()` load the
/// additive identity and are never written back.
///
/// Returns the group total (the last lane's scanned value).
pub(crate) fn scan_group(
    input: &[f32],
    output: &mut [f32],
    scratch_a: &mut [f32],
    scratch_b: &mut [f32],
) -> f32 {
    let block_size = scratch_a.len();
    debug_assert_eq!(scratch_b.len(), block_size);
    debug_assert!(input.len() <= block_size && output.len() == input.len());

    for (lane, slot) in scratch_a.iter_mut().enumerate() {
        *slot = input.get(lane).copied().unwrap_or(0.0);
    }

    let (mut src, mut dst) = (scratch_a, scratch_b);
    let mut offset = 1;
    while offset < block_size {
        for (lane, value) in dst.iter_mut().enumerate() {
            *value = if lane >= offset {
                src[lane] + src[lane - offset]
            } else {
                src[lane]
            };
        }
        std::mem::swap(&mut src, &mut dst);
        offset *= 2;
    }

    output.copy_from_slice(&src[..output.len()]);
    src[block_size - 1]
}

/// `local_block_scan`: scan every block of `input` independently.
///
/// `block_totals` has one slot per dispatched group. Groups that hold no
/// in-range element report a total of zero.
pub(crate) fn local_block_scan(
    input: &[f32],
    output: &mut [f32],
    block_totals: &mut [f32],
    block_size: usize,
) {
    let groups_with_data = input.len().div_ceil(block_size);
    let (live_totals, idle_totals) = block_totals.split_at_mut(groups_with_data);
    idle_totals.fill(0.0);

    #[cfg(feature = "rayon")]
    output
        .par_chunks_mut(block_size)
        .zip(live_totals.par_iter_mut())
        .enumerate()
        .for_each_init(
            || (vec![0.0f32; block_size], vec![0.0f32; block_size]),
            |(scratch_a, scratch_b), (group, (out, total))| {
                let start = group * block_size;
                let block = &input[start..start + out.len()];
                *total = scan_group(block, out, scratch_a, scratch_b);
            },
        );

    #[cfg(not(feature = "rayon"))]
    {
        let mut scratch_a = vec![0.0f32; block_size];
        let mut scratch_b = vec![0.0f32; block_size];
        for (group, (out, total)) in output
            .chunks_mut(block_size)
            .zip(live_totals.iter_mut())
            .enumerate()
        {
            let start = group * block_size;
            let block = &input[start..start + out.len()];
            *total = scan_group(block, out, &mut scratch_a, &mut scratch_b);
        }
    }
}

/// `carry_propagation`: add block `k - 1`'s scanned total to every element
/// of block `k`. Block 0 has a carry-in of zero and is left untouched.
///
/// Every lane reads and writes only its own element, so updating `data` in
/// place is race-free.
pub(crate) fn carry_propagation(data: &mut [f32], scanned_totals: &[f32], block_size: usize) {
    #[cfg(feature = "rayon")]
    data.par_chunks_mut(block_size)
        .enumerate()
        .skip(1)
        .for_each(|(group, block)| {
            let carry = scanned_totals[group - 1];
            block.iter_mut().for_each(|v| *v += carry);
        });

    #[cfg(not(feature = "rayon"))]
    for (group, block) in data.chunks_mut(block_size).enumerate().skip(1) {
        let carry = scanned_totals[group - 1];
        block.iter_mut().for_each(|v| *v += carry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_group_full_block() {
        let input = [3.0f32, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0];
        let mut out = [0.0f32; 8];
        let (mut a, mut b) = ([0.0f32; 8], [0.0f32; 8]);
        let total = scan_group(&input, &mut out, &mut a, &mut b);
        assert_eq!(out, [3.0, 4.0, 8.0, 9.0, 14.0, 23.0, 25.0, 31.0]);
        assert_eq!(total, 31.0);
    }

    #[test]
    fn test_scan_group_short_block_pads_with_zero() {
        let input = [2.0f32, 2.0, 2.0];
        let mut out = [0.0f32; 3];
        let (mut a, mut b) = ([7.0f32; 8], [7.0f32; 8]);
        let total = scan_group(&input, &mut out, &mut a, &mut b);
        assert_eq!(out, [2.0, 4.0, 6.0]);
        assert_eq!(total, 6.0);
    }

    #[test]
    fn test_scan_group_non_power_of_two() {
        let input = [1.0f32; 6];
        let mut out = [0.0f32; 6];
        let (mut a, mut b) = ([0.0f32; 6], [0.0f32; 6]);
        assert_eq!(scan_group(&input, &mut out, &mut a, &mut b), 6.0);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_local_block_scan_five_ones() {
        let input = [1.0f32; 5];
        let mut out = [0.0f32; 5];
        let mut totals = [0.0f32; 2];
        local_block_scan(&input, &mut out, &mut totals, 4);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0, 1.0]);
        assert_eq!(totals, [4.0, 1.0]);
    }

    #[test]
    fn test_local_block_scan_idle_groups_report_zero() {
        let input = [1.0f32; 3];
        let mut out = [0.0f32; 3];
        let mut totals = [5.0f32; 3];
        local_block_scan(&input, &mut out, &mut totals, 2);
        assert_eq!(totals, [2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_carry_propagation_shifts_by_one_block() {
        let mut data = [1.0f32, 2.0, 3.0, 4.0, 1.0];
        carry_propagation(&mut data, &[4.0, 5.0], 4);
        assert_eq!(data, [1.0, 2.0, 3.0, 4.0, 5.0]);
    }
}
