//! WebGPU backend (requires `wgpu` feature)
//!
//! Runs the scan kernels on a GPU through WebGPU. Kernel source is WGSL,
//! generated at [`compile`](crate::runtime::ComputeBackend::compile) time with
//! the block size baked in as a constant.
//!
//! ```ignore
//! use scanr::prelude::*;
//! use scanr::runtime::wgpu::WgpuBackend;
//!
//! let backend = WgpuBackend::new()?;
//! let out = inclusive_scan(&backend, &[1.0; 1000], 256)?;
//! ```

mod client;
mod device;
mod pipeline;
mod shaders;

pub use client::{WgpuBackend, WgpuBuffer, WgpuEvent, WgpuProgram};
pub use device::{WgpuDevice, is_wgpu_available};
