//! Level plan for the hierarchical scan

use crate::error::{Error, Result};

/// Shape of one recursion level
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelShape {
    /// Elements scanned at this level
    pub len: usize,
    /// Blocks the elements split into (`ceil(len / block_size)`)
    pub block_count: usize,
}

impl LevelShape {
    fn new(len: usize, block_size: usize) -> Self {
        Self {
            len,
            block_count: len.div_ceil(block_size),
        }
    }

    /// Element count as passed to the kernels
    pub(crate) fn kernel_len(&self) -> Result<u32> {
        u32::try_from(self.len).map_err(|_| {
            Error::configuration(
                "len",
                format!("{} elements exceed the 32-bit kernel index range", self.len),
            )
        })
    }

    /// True if this level fits in a single block and ends the descent
    pub fn is_last(&self) -> bool {
        self.block_count <= 1
    }
}

/// The levels of one scan, from the input down to the first single-block level.
///
/// Level `k + 1` scans the block totals of level `k`, so its `len` equals the
/// previous `block_count`. An empty input has no levels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanPlan {
    block_size: usize,
    levels: Vec<LevelShape>,
}

impl ScanPlan {
    /// Plan a scan of `len` elements.
    ///
    /// Kernels index elements with 32-bit integers, so `len` may not exceed
    /// `u32::MAX`.
    pub fn new(len: usize, block_size: usize) -> Result<Self> {
        if block_size < 2 {
            return Err(Error::configuration(
                "block_size",
                format!("{block_size} never reduces the problem; use at least 2"),
            ));
        }
        if u32::try_from(len).is_err() {
            return Err(Error::configuration(
                "len",
                format!("{len} elements exceed the 32-bit kernel index range"),
            ));
        }

        let mut levels = Vec::new();
        if len > 0 {
            let mut shape = LevelShape::new(len, block_size);
            levels.push(shape);
            while !shape.is_last() {
                shape = LevelShape::new(shape.block_count, block_size);
                levels.push(shape);
            }
        }
        Ok(Self { block_size, levels })
    }

    /// Block size the plan was built for
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Levels in dispatch order (top level first)
    pub fn levels(&self) -> &[LevelShape] {
        &self.levels
    }

    /// Number of Block Scan dispatches the scan performs
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Number of Carry-Propagation dispatches the scan performs
    pub fn propagation_count(&self) -> usize {
        self.depth().saturating_sub(1)
    }

    /// Input length of the top level (0 for an empty plan)
    pub fn len(&self) -> usize {
        self.levels.first().map_or(0, |l| l.len)
    }

    /// Returns true if the plan scans nothing
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_plan() {
        let plan = ScanPlan::new(0, 256).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.depth(), 0);
        assert_eq!(plan.propagation_count(), 0);
    }

    #[test]
    fn test_single_block() {
        for len in [1, 100, 256] {
            let plan = ScanPlan::new(len, 256).unwrap();
            assert_eq!(plan.depth(), 1);
            assert_eq!(
                plan.levels(),
                &[LevelShape {
                    len,
                    block_count: 1
                }]
            );
        }
    }

    #[test]
    fn test_levels_shrink_by_block_size() {
        let plan = ScanPlan::new(5, 4).unwrap();
        assert_eq!(
            plan.levels(),
            &[
                LevelShape {
                    len: 5,
                    block_count: 2
                },
                LevelShape {
                    len: 2,
                    block_count: 1
                },
            ]
        );

        let plan = ScanPlan::new(1 << 20, 256).unwrap();
        let lens: Vec<usize> = plan.levels().iter().map(|l| l.len).collect();
        assert_eq!(lens, vec![1 << 20, 4096, 16]);
        assert_eq!(plan.propagation_count(), 2);
    }

    #[test]
    fn test_multi_level_depth() {
        // 4^3 < 100 <= 4^4
        let plan = ScanPlan::new(100, 4).unwrap();
        let lens: Vec<usize> = plan.levels().iter().map(|l| l.len).collect();
        assert_eq!(lens, vec![100, 25, 7, 2]);
        assert_eq!(plan.depth(), 4);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_kernel_len_checked() {
        let shape = LevelShape::new(7, 4);
        assert_eq!(shape.kernel_len().unwrap(), 7);
        let shape = LevelShape::new(u32::MAX as usize + 5, 256);
        assert!(matches!(
            shape.kernel_len(),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_rejects_lengths_beyond_u32() {
        let max = u32::MAX as usize;
        let plan = ScanPlan::new(max, 1024).unwrap();
        assert_eq!(plan.len(), max);

        for len in [max + 1, max + 5, usize::MAX] {
            match ScanPlan::new(len, 1024) {
                Err(Error::Configuration { arg, .. }) => assert_eq!(arg, "len"),
                other => panic!("len {len}: expected configuration error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_rejects_degenerate_block_size() {
        assert!(ScanPlan::new(10, 1).is_err());
        assert!(ScanPlan::new(10, 0).is_err());
    }
}
