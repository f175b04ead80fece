//! # scanr
//!
//! **Hierarchical block-parallel inclusive prefix sum, on the CPU or a GPU.**
//!
//! An accelerator can only scan a bounded group of elements cooperatively, so
//! larger sequences are scanned block by block: each block is scanned in
//! local memory, the block totals are scanned the same way (recursively,
//! until they fit in one block) and the resulting carry-ins are added back.
//!
//! ## Quick Start
//!
//! ```rust
//! use scanr::prelude::*;
//!
//! # #[cfg(feature = "cpu")] {
//! let backend = CpuBackend::new();
//! let scanner = Scanner::new(&backend, ScanConfig::default())?;
//!
//! let out = scanner.scan(&[3.0, 1.0, 4.0, 1.0, 5.0])?;
//! assert_eq!(out, vec![3.0, 4.0, 8.0, 9.0, 14.0]);
//! # }
//! # Ok::<(), scanr::error::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `cpu` (default): host backend emulating execution groups
//! - `rayon` (default): run CPU execution groups in parallel
//! - `wgpu`: cross-platform GPU backend via WebGPU

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod io;
pub mod runtime;
pub mod scan;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{DEFAULT_BLOCK_SIZE, ScanConfig};
    pub use crate::error::{Error, Result};
    pub use crate::runtime::{Completion, ComputeBackend, Device, Program};
    pub use crate::scan::{ScanPlan, Scanner, inclusive_scan};

    #[cfg(feature = "cpu")]
    pub use crate::runtime::cpu::CpuBackend;

    #[cfg(feature = "wgpu")]
    pub use crate::runtime::wgpu::WgpuBackend;
}
