//! Scan configuration

use crate::error::{Error, Result};

/// Block size used when none is given
pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// Configuration for a [`Scanner`](crate::scan::Scanner).
///
/// `block_size` is the single source of truth for the execution-group size:
/// it is baked into the compiled kernels as a constant and reused as the
/// local work size of every dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanConfig {
    /// Elements per block (= lanes per execution group)
    pub block_size: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl ScanConfig {
    /// Create a configuration with the given block size
    pub fn new(block_size: usize) -> Self {
        Self { block_size }
    }

    /// Replace the block size
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Check the configuration against a backend's group size limit.
    ///
    /// A block size of 1 is rejected along with 0: every level would have
    /// as many blocks as elements and the level loop would never shrink.
    pub fn validate(&self, max_group_size: usize) -> Result<()> {
        match self.block_size {
            0 => Err(Error::configuration("block_size", "must be at least 1")),
            1 => Err(Error::configuration(
                "block_size",
                "a block size of 1 never reduces the problem; use at least 2",
            )),
            n if n > max_group_size => Err(Error::configuration(
                "block_size",
                format!("{n} exceeds the backend group size limit of {max_group_size}"),
            )),
            n if u32::try_from(n).is_err() => Err(Error::configuration(
                "block_size",
                format!("{n} does not fit in 32 bits"),
            )),
            _ => Ok(()),
        }
    }
}
