//! Common test utilities
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use scanr::error::Result;
use scanr::runtime::cpu::{CpuBackend, CpuBuffer, CpuDevice, CpuEvent, CpuProgram};
#[cfg(feature = "wgpu")]
use scanr::runtime::wgpu::WgpuBackend;
use scanr::runtime::{ComputeBackend, KernelArg, KernelName, LaunchConfig, ProgramOptions};

/// Create a CPU backend for testing
pub fn create_cpu_backend() -> CpuBackend {
    CpuBackend::new()
}

/// Create a WebGPU backend, returning None if no GPU is available
#[cfg(feature = "wgpu")]
pub fn create_wgpu_backend() -> Option<WgpuBackend> {
    if !scanr::runtime::wgpu::is_wgpu_available() {
        return None;
    }
    WgpuBackend::new().ok()
}

/// Sequential inclusive scan in f64, rounded to f32
pub fn reference_scan(input: &[f32]) -> Vec<f32> {
    let mut acc = 0.0f64;
    input
        .iter()
        .map(|&x| {
            acc += x as f64;
            acc as f32
        })
        .collect()
}

/// Assert two f32 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f32(a: &[f32], b: &[f32], rtol: f32, atol: f32, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// CPU backend wrapper that counts dispatches per kernel
pub struct CountingBackend {
    inner: CpuBackend,
    block_scans: AtomicUsize,
    propagations: AtomicUsize,
}

impl CountingBackend {
    pub fn new() -> Self {
        Self {
            inner: CpuBackend::new(),
            block_scans: AtomicUsize::new(0),
            propagations: AtomicUsize::new(0),
        }
    }

    /// `local_block_scan` dispatches so far
    pub fn block_scans(&self) -> usize {
        self.block_scans.load(Ordering::SeqCst)
    }

    /// `carry_propagation` dispatches so far
    pub fn propagations(&self) -> usize {
        self.propagations.load(Ordering::SeqCst)
    }
}

impl ComputeBackend for CountingBackend {
    type Device = CpuDevice;
    type Buffer = CpuBuffer;
    type Program = CpuProgram;
    type Event = CpuEvent;

    fn name(&self) -> &'static str {
        "counting-cpu"
    }

    fn device(&self) -> &CpuDevice {
        self.inner.device()
    }

    fn max_group_size(&self) -> usize {
        self.inner.max_group_size()
    }

    fn allocate(&self, size_bytes: usize) -> Result<CpuBuffer> {
        self.inner.allocate(size_bytes)
    }

    fn copy_to_device(&self, src: &[u8], dst: &CpuBuffer) -> Result<()> {
        self.inner.copy_to_device(src, dst)
    }

    fn copy_from_device(&self, src: &CpuBuffer, dst: &mut [u8]) -> Result<()> {
        self.inner.copy_from_device(src, dst)
    }

    fn compile(&self, options: &ProgramOptions) -> Result<CpuProgram> {
        self.inner.compile(options)
    }

    fn dispatch(
        &self,
        program: &CpuProgram,
        kernel: KernelName,
        launch: LaunchConfig,
        args: &[KernelArg<'_, CpuBuffer>],
    ) -> Result<CpuEvent> {
        let counter = match kernel {
            KernelName::LocalBlockScan => &self.block_scans,
            KernelName::CarryPropagation => &self.propagations,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.inner.dispatch(program, kernel, launch, args)
    }
}
