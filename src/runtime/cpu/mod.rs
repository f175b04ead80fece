//! CPU backend implementation
//!
//! The CPU backend emulates the accelerator's execution model on the host:
//! each execution group is one task, its lanes advance in lockstep one
//! round at a time, and the end of a round acts as the group barrier.
//! Groups run in parallel on the rayon pool when the `rayon` feature is
//! enabled.
//!
//! This is the reference backend: it is always available and is what the
//! test suite exercises.

mod backend;
mod device;
pub(crate) mod kernels;

pub use backend::{CpuBackend, CpuBuffer, CpuEvent, CpuProgram, MAX_GROUP_SIZE};
pub use device::CpuDevice;
