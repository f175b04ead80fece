//! Compute backends for the block-parallel scan
//!
//! This module defines the [`ComputeBackend`] trait and provides
//! implementations for the host CPU and WebGPU.
//!
//! # Architecture
//!
//! ```text
//! ComputeBackend (injected handle, owned by the caller)
//! ├── Device   (identifies the selected CPU/GPU)
//! ├── Buffer   (device memory, sized in bytes)
//! ├── Program  (both kernels, compiled for one block size)
//! └── Event    (completion signal returned by dispatch)
//! ```
//!
//! Unlike a global device/queue singleton, a backend is an ordinary value:
//! construct it once, pass it by reference to a [`Scanner`](crate::scan::Scanner),
//! and drop it when all scans are done.

pub mod kernel;

#[cfg(feature = "cpu")]
pub mod cpu;

#[cfg(feature = "wgpu")]
pub mod wgpu;

pub use kernel::{KernelArg, KernelName, LaunchConfig, ProgramOptions};

use crate::error::Result;

/// Trait for device identification
pub trait Device: Clone + Send + Sync + 'static {
    /// Unique identifier for this device
    fn id(&self) -> usize;

    /// Human-readable name
    fn name(&self) -> String {
        format!("Device({})", self.id())
    }
}

/// A compiled set of scan kernels
pub trait Program: Send + Sync {
    /// Group size the kernels were compiled for
    fn block_size(&self) -> u32;
}

/// Completion signal for a dispatch
pub trait Completion {
    /// Block until the dispatch has finished and its writes are visible.
    fn wait(self) -> Result<()>;
}

/// Core trait for compute backends
///
/// The orchestrator only talks to the accelerator through this trait:
/// byte-sized allocation, host/device copies, program compilation and
/// kernel dispatch. Every method reports failures as
/// [`Error::BackendInit`](crate::error::Error::BackendInit),
/// [`Error::Dispatch`](crate::error::Error::Dispatch) or
/// [`Error::OutOfMemory`](crate::error::Error::OutOfMemory); none of them
/// retry.
pub trait ComputeBackend: Send + Sync {
    /// Device identifier type
    type Device: Device;

    /// Device memory handle
    type Buffer: Send + Sync;

    /// Compiled kernels
    type Program: Program;

    /// Completion signal returned by [`dispatch`](Self::dispatch)
    type Event: Completion;

    /// Human-readable name of this backend
    fn name(&self) -> &'static str;

    /// The device this backend runs on
    fn device(&self) -> &Self::Device;

    /// Largest group size (lanes per group) the device supports
    fn max_group_size(&self) -> usize;

    /// Allocate a zero-initialized buffer of `size_bytes`
    fn allocate(&self, size_bytes: usize) -> Result<Self::Buffer>;

    /// Copy bytes from host memory into the start of `dst`
    fn copy_to_device(&self, src: &[u8], dst: &Self::Buffer) -> Result<()>;

    /// Copy the first `dst.len()` bytes of `src` into host memory
    fn copy_from_device(&self, src: &Self::Buffer, dst: &mut [u8]) -> Result<()>;

    /// Compile `local_block_scan` and `carry_propagation` for the given options
    fn compile(&self, options: &ProgramOptions) -> Result<Self::Program>;

    /// Launch one kernel. The returned event must be waited on before the
    /// kernel's outputs are read or passed to a dependent dispatch.
    fn dispatch(
        &self,
        program: &Self::Program,
        kernel: KernelName,
        launch: LaunchConfig,
        args: &[KernelArg<'_, Self::Buffer>],
    ) -> Result<Self::Event>;
}

/// Allocate a buffer holding `len` f32 values
pub fn allocate_f32<B: ComputeBackend>(backend: &B, len: usize) -> Result<B::Buffer> {
    backend.allocate(len * std::mem::size_of::<f32>())
}

/// Upload a host slice into a fresh device buffer
pub fn upload_f32<B: ComputeBackend>(backend: &B, data: &[f32]) -> Result<B::Buffer> {
    let buffer = allocate_f32(backend, data.len())?;
    backend.copy_to_device(bytemuck::cast_slice(data), &buffer)?;
    Ok(buffer)
}

/// Read `len` f32 values back from a device buffer
pub fn download_f32<B: ComputeBackend>(
    backend: &B,
    buffer: &B::Buffer,
    len: usize,
) -> Result<Vec<f32>> {
    let mut out = vec![0.0f32; len];
    backend.copy_from_device(buffer, bytemuck::cast_slice_mut(&mut out))?;
    Ok(out)
}
