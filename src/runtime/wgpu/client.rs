//! WebGPU backend implementation.
//!
//! `WgpuBackend` owns the WebGPU device and queue. It is an ordinary value:
//! nothing is cached in globals, and dropping the backend releases the GPU.
//!
//! # Thread Safety
//!
//! `wgpu::Device` and `wgpu::Queue` are `Send + Sync`; pipeline creation is
//! serialized by the [`PipelineCache`] locks.

use std::sync::Arc;
use std::time::Duration;

use wgpu::{Buffer, BufferDescriptor, BufferUsages, ComputePipeline, Device, Queue};

use super::device::{WgpuDevice, adapter_info, select_adapter};
use super::pipeline::{LayoutKey, PipelineCache};
use super::shaders::{ScanParams, dispatch_grid};
use crate::error::{Error, Result, codes};
use crate::runtime::kernel::{decode_carry_propagation, decode_local_block_scan};
use crate::runtime::{
    Completion, ComputeBackend, KernelArg, KernelName, LaunchConfig, Program, ProgramOptions,
};

/// How long a blocking wait may take before it is reported as a failure
const WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Buffer sizes and copy lengths must be multiples of this
const COPY_ALIGNMENT: usize = wgpu::COPY_BUFFER_ALIGNMENT as usize;

fn align_copy(size: usize) -> usize {
    size.div_ceil(COPY_ALIGNMENT) * COPY_ALIGNMENT
}

// ============================================================================
// Buffers, programs and events
// ============================================================================

/// GPU storage buffer
///
/// Cloning shares the underlying buffer.
#[derive(Clone, Debug)]
pub struct WgpuBuffer {
    buffer: Arc<Buffer>,
    size_bytes: usize,
}

impl WgpuBuffer {
    /// Logical size in bytes, as requested at allocation
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    fn len(&self) -> usize {
        self.size_bytes / std::mem::size_of::<f32>()
    }

    fn same_storage(&self, other: &WgpuBuffer) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }
}

/// Both scan pipelines, built for one block size
#[derive(Clone)]
pub struct WgpuProgram {
    block_size: u32,
    local_block_scan: Arc<ComputePipeline>,
    carry_propagation: Arc<ComputePipeline>,
}

impl WgpuProgram {
    fn pipeline(&self, kernel: KernelName) -> &ComputePipeline {
        match kernel {
            KernelName::LocalBlockScan => &self.local_block_scan,
            KernelName::CarryPropagation => &self.carry_propagation,
        }
    }
}

impl Program for WgpuProgram {
    fn block_size(&self) -> u32 {
        self.block_size
    }
}

/// Completion of one queue submission
pub struct WgpuEvent {
    device: Arc<Device>,
    submission: Option<wgpu::SubmissionIndex>,
}

impl Completion for WgpuEvent {
    fn wait(self) -> Result<()> {
        let Some(submission) = self.submission else {
            return Ok(());
        };
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(submission),
                timeout: Some(WAIT_TIMEOUT),
            })
            .map_err(|e| Error::dispatch("wait", format!("GPU poll failed: {e}")))?;
        Ok(())
    }
}

// ============================================================================
// WgpuBackend
// ============================================================================

/// WebGPU compute backend.
///
/// # Example
///
/// ```ignore
/// let backend = WgpuBackend::new()?;           // first discrete/integrated GPU
/// let scanner = Scanner::new(&backend, ScanConfig::default())?;
/// let out = scanner.scan(&[1.0, 2.0, 3.0])?;
/// ```
pub struct WgpuBackend {
    device_id: WgpuDevice,
    wgpu_device: Arc<Device>,
    queue: Arc<Queue>,
    pipeline_cache: PipelineCache,
    max_group_size: usize,
    max_groups_per_dim: u32,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("device", &self.device_id)
            .field("max_group_size", &self.max_group_size)
            .finish_non_exhaustive()
    }
}

impl WgpuBackend {
    /// Open the first discrete or integrated GPU.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendInit`] if:
    /// - no GPU adapter is found (`codes::DEVICE_NOT_FOUND`)
    /// - device creation fails (`codes::DEVICE_REQUEST_FAILED`)
    pub fn new() -> Result<Self> {
        Self::open(None)
    }

    /// Open the adapter at `device.index` in enumeration order.
    pub fn with_device(device: WgpuDevice) -> Result<Self> {
        Self::open(Some(device.index))
    }

    fn open(index: Option<usize>) -> Result<Self> {
        let (index, adapter) = pollster::block_on(select_adapter(index))?;
        let info = adapter_info(&adapter);
        let limits = adapter.limits();

        let (wgpu_device, queue) = pollster::block_on(async {
            adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("scanr WebGPU Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    trace: wgpu::Trace::Off,
                    experimental_features: wgpu::ExperimentalFeatures::default(),
                })
                .await
        })
        .map_err(|e| Error::backend_init(codes::DEVICE_REQUEST_FAILED, format!("{e:?}")))?;

        let wgpu_device = Arc::new(wgpu_device);
        let queue = Arc::new(queue);

        // Two f32 scratch arrays of block_size live in workgroup memory.
        let max_group_size = limits
            .max_compute_workgroup_size_x
            .min(limits.max_compute_invocations_per_workgroup)
            .min(limits.max_compute_workgroup_storage_size / 8) as usize;

        let device_id = WgpuDevice::with_info(index, info);
        log::info!(
            "wgpu: opened {} ({:?}), max group size {max_group_size}",
            device_id.adapter_name(),
            device_id.backend()
        );

        Ok(Self {
            device_id,
            pipeline_cache: PipelineCache::new(wgpu_device.clone()),
            wgpu_device,
            queue,
            max_group_size,
            max_groups_per_dim: limits.max_compute_workgroups_per_dimension,
        })
    }

    /// Largest buffer that can still be bound whole as kernel storage.
    fn max_allocation(&self) -> u64 {
        let limits = self.wgpu_device.limits();
        u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size)
    }

    /// Create a staging buffer for CPU readback.
    fn create_staging_buffer(&self, label: &str, size: u64) -> Buffer {
        self.wgpu_device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Create a uniform buffer holding `params`.
    fn create_params_buffer(&self, params: &ScanParams) -> Buffer {
        let buffer = self.wgpu_device.create_buffer(&BufferDescriptor {
            label: Some("scan_params"),
            size: std::mem::size_of::<ScanParams>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue
            .write_buffer(&buffer, 0, bytemuck::bytes_of(params));
        buffer
    }

    fn submit(
        &self,
        program: &WgpuProgram,
        kernel: KernelName,
        groups: usize,
        size: usize,
        storage: &[&Buffer],
    ) -> Result<WgpuEvent> {
        if groups == 0 {
            return Ok(WgpuEvent {
                device: self.wgpu_device.clone(),
                submission: None,
            });
        }
        let (groups_x, groups_y) =
            dispatch_grid(groups, self.max_groups_per_dim).ok_or_else(|| {
                Error::dispatch(
                    kernel.entry_point(),
                    format!("{groups} groups exceed the device dispatch grid"),
                )
            })?;

        let size = u32::try_from(size).map_err(|_| {
            Error::dispatch(
                kernel.entry_point(),
                format!("{size} elements exceed the 32-bit kernel index range"),
            )
        })?;
        let group_count = u32::try_from(groups).map_err(|_| {
            Error::dispatch(
                kernel.entry_point(),
                format!("{groups} groups exceed the 32-bit kernel index range"),
            )
        })?;
        let params = self.create_params_buffer(&ScanParams {
            size,
            groups_x,
            group_count,
            _pad: 0,
        });
        let mut bindings = storage.to_vec();
        bindings.push(&params);

        let layout = self
            .pipeline_cache
            .get_or_create_layout(LayoutKey::for_kernel(kernel));
        let bind_group = self.pipeline_cache.create_bind_group(&layout, &bindings);

        let mut encoder = self
            .wgpu_device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(kernel.entry_point()),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.entry_point()),
                timestamp_writes: None,
            });
            pass.set_pipeline(program.pipeline(kernel));
            pass.set_bind_group(0, Some(&bind_group), &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }

        let submission = self.queue.submit(std::iter::once(encoder.finish()));
        Ok(WgpuEvent {
            device: self.wgpu_device.clone(),
            submission: Some(submission),
        })
    }
}

fn require_len(kernel: KernelName, name: &str, buffer: &WgpuBuffer, len: usize) -> Result<()> {
    if buffer.len() < len {
        return Err(Error::dispatch(
            kernel.entry_point(),
            format!("{name} holds {} elements, {len} required", buffer.len()),
        ));
    }
    Ok(())
}

impl ComputeBackend for WgpuBackend {
    type Device = WgpuDevice;
    type Buffer = WgpuBuffer;
    type Program = WgpuProgram;
    type Event = WgpuEvent;

    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn device(&self) -> &WgpuDevice {
        &self.device_id
    }

    fn max_group_size(&self) -> usize {
        self.max_group_size
    }

    fn allocate(&self, size_bytes: usize) -> Result<WgpuBuffer> {
        // Zero-sized bindings are invalid, so every buffer gets at least one word.
        let aligned_size = align_copy(size_bytes.max(1));
        if aligned_size as u64 > self.max_allocation() {
            return Err(Error::OutOfMemory { size: size_bytes });
        }

        // New wgpu buffers are zero-initialized.
        let buffer = self.wgpu_device.create_buffer(&BufferDescriptor {
            label: Some("scanr buffer"),
            size: aligned_size as u64,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        Ok(WgpuBuffer {
            buffer: Arc::new(buffer),
            size_bytes,
        })
    }

    fn copy_to_device(&self, src: &[u8], dst: &WgpuBuffer) -> Result<()> {
        if src.len() > dst.size_bytes {
            return Err(Error::dispatch(
                "copy_to_device",
                format!(
                    "{} bytes do not fit in a {}-byte buffer",
                    src.len(),
                    dst.size_bytes
                ),
            ));
        }
        if src.is_empty() {
            return Ok(());
        }
        if src.len().is_multiple_of(COPY_ALIGNMENT) {
            self.queue.write_buffer(&dst.buffer, 0, src);
        } else {
            let mut padded = src.to_vec();
            padded.resize(align_copy(src.len()), 0);
            self.queue.write_buffer(&dst.buffer, 0, &padded);
        }
        Ok(())
    }

    fn copy_from_device(&self, src: &WgpuBuffer, dst: &mut [u8]) -> Result<()> {
        if dst.len() > src.size_bytes {
            return Err(Error::dispatch(
                "copy_from_device",
                format!(
                    "cannot read {} bytes from a {}-byte buffer",
                    dst.len(),
                    src.size_bytes
                ),
            ));
        }
        if dst.is_empty() {
            return Ok(());
        }

        let copy_size = align_copy(dst.len()) as u64;
        let staging = self.create_staging_buffer("copy_staging", copy_size);

        let mut encoder = self
            .wgpu_device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("copy_from_device"),
            });
        encoder.copy_buffer_to_buffer(&src.buffer, 0, &staging, 0, copy_size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        self.wgpu_device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(WAIT_TIMEOUT),
            })
            .map_err(|e| {
                Error::dispatch(
                    "copy_from_device",
                    format!("GPU poll failed during buffer read: {e}"),
                )
            })?;

        let map_result = receiver.recv().map_err(|_| {
            Error::dispatch(
                "copy_from_device",
                "map_async callback was not invoked during buffer read",
            )
        })?;
        map_result.map_err(|e| {
            Error::dispatch("copy_from_device", format!("map_async failed: {e}"))
        })?;

        {
            let data = slice.get_mapped_range();
            dst.copy_from_slice(&data[..dst.len()]);
        }

        staging.unmap();
        Ok(())
    }

    fn compile(&self, options: &ProgramOptions) -> Result<WgpuProgram> {
        let block_size = options.block_size as usize;
        if block_size < 2 || block_size > self.max_group_size {
            return Err(Error::configuration(
                "block_size",
                format!(
                    "cannot build kernels for {block_size} lanes (supported: 2..={})",
                    self.max_group_size
                ),
            ));
        }
        Ok(WgpuProgram {
            block_size: options.block_size,
            local_block_scan: self
                .pipeline_cache
                .get_or_create_pipeline(KernelName::LocalBlockScan, options.block_size)?,
            carry_propagation: self
                .pipeline_cache
                .get_or_create_pipeline(KernelName::CarryPropagation, options.block_size)?,
        })
    }

    fn dispatch(
        &self,
        program: &WgpuProgram,
        kernel: KernelName,
        launch: LaunchConfig,
        args: &[KernelArg<'_, WgpuBuffer>],
    ) -> Result<WgpuEvent> {
        launch.validate(kernel, program.block_size)?;
        let groups = launch.group_count();
        log::trace!(
            "wgpu: dispatch {kernel} with {groups} groups of {}",
            launch.local_size
        );

        match kernel {
            KernelName::LocalBlockScan => {
                let bound = decode_local_block_scan(args, program.block_size)?;
                if bound.input.same_storage(bound.output)
                    || bound.input.same_storage(bound.block_totals)
                    || bound.output.same_storage(bound.block_totals)
                {
                    return Err(Error::dispatch(
                        kernel.entry_point(),
                        "input, output and block_totals must be distinct buffers",
                    ));
                }
                require_len(kernel, "input", bound.input, bound.size)?;
                require_len(kernel, "output", bound.output, bound.size)?;
                require_len(kernel, "block_totals", bound.block_totals, groups)?;
                self.submit(
                    program,
                    kernel,
                    groups,
                    bound.size,
                    &[&bound.input.buffer, &bound.output.buffer, &bound.block_totals.buffer],
                )
            }
            KernelName::CarryPropagation => {
                let bound = decode_carry_propagation(args)?;
                if bound.data.same_storage(bound.scanned_totals) {
                    return Err(Error::dispatch(
                        kernel.entry_point(),
                        "data and scanned_totals must be distinct buffers",
                    ));
                }
                require_len(kernel, "data", bound.data, bound.size)?;
                let carries = bound
                    .size
                    .div_ceil(program.block_size as usize)
                    .saturating_sub(1);
                require_len(kernel, "scanned_totals", bound.scanned_totals, carries)?;
                self.submit(
                    program,
                    kernel,
                    groups,
                    bound.size,
                    &[&bound.data.buffer, &bound.scanned_totals.buffer],
                )
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Device, download_f32, upload_f32};

    fn backend() -> Option<WgpuBackend> {
        match WgpuBackend::new() {
            Ok(backend) => Some(backend),
            Err(e) => {
                println!("No GPU available, skipping test: {}", e);
                None
            }
        }
    }

    #[test]
    fn test_wgpu_backend_creation() {
        let Some(backend) = backend() else { return };
        println!("Backend opened on: {}", backend.device().name());
        assert!(backend.max_group_size() >= 2);
    }

    #[test]
    fn test_wgpu_copy_roundtrip() {
        let Some(backend) = backend() else { return };
        let buf = upload_f32(&backend, &[1.0, 2.5, -3.0]).unwrap();
        assert_eq!(download_f32(&backend, &buf, 3).unwrap(), vec![1.0, 2.5, -3.0]);
    }

    #[test]
    fn test_wgpu_compile_rejects_oversized_block() {
        let Some(backend) = backend() else { return };
        let too_big = (backend.max_group_size() * 2) as u32;
        let err = backend
            .compile(&ProgramOptions { block_size: too_big })
            .err()
            .unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_wgpu_allocate_beyond_binding_limit() {
        let Some(backend) = backend() else { return };
        let limit = backend.max_allocation();
        let Some(too_big) = limit
            .checked_add(COPY_ALIGNMENT as u64)
            .and_then(|n| usize::try_from(n).ok())
        else {
            return;
        };
        match backend.allocate(too_big) {
            Err(Error::OutOfMemory { size }) => assert_eq!(size, too_big),
            other => panic!("expected out of memory, got {:?}", other.map(|b| b.size_bytes())),
        }
    }
}
