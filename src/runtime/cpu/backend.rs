//! CPU backend implementation

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::device::CpuDevice;
use super::kernels;
use crate::error::{Error, Result};
use crate::runtime::kernel::{decode_carry_propagation, decode_local_block_scan};
use crate::runtime::{
    Completion, ComputeBackend, KernelArg, KernelName, LaunchConfig, Program, ProgramOptions,
};

/// Default group size limit, matching common GPU work-group limits
pub const MAX_GROUP_SIZE: usize = 1024;

const F32_BYTES: usize = std::mem::size_of::<f32>();

/// Host buffer
///
/// Storage is kept as `f32` words so kernels can operate on it without
/// reinterpreting; transfers go through `bytemuck`. Cloning shares storage.
#[derive(Clone, Debug)]
pub struct CpuBuffer {
    words: Arc<RwLock<Vec<f32>>>,
    size_bytes: usize,
}

impl CpuBuffer {
    /// Size of the allocation in bytes
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Number of whole f32 elements the buffer holds
    pub fn len(&self) -> usize {
        self.size_bytes / F32_BYTES
    }

    /// Returns true if the buffer holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn same_storage(&self, other: &CpuBuffer) -> bool {
        Arc::ptr_eq(&self.words, &other.words)
    }
}

/// Kernels "compiled" for one block size
#[derive(Clone, Debug)]
pub struct CpuProgram {
    block_size: u32,
}

impl Program for CpuProgram {
    fn block_size(&self) -> u32 {
        self.block_size
    }
}

/// CPU dispatches run to completion before returning.
#[derive(Debug)]
pub struct CpuEvent;

impl Completion for CpuEvent {
    fn wait(self) -> Result<()> {
        Ok(())
    }
}

/// Host backend that emulates execution groups
pub struct CpuBackend {
    device: CpuDevice,
    max_group_size: usize,
    #[cfg(feature = "rayon")]
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    /// Create a backend using the global rayon pool (if enabled)
    pub fn new() -> Self {
        Self {
            device: CpuDevice::new(),
            max_group_size: MAX_GROUP_SIZE,
            #[cfg(feature = "rayon")]
            pool: None,
        }
    }

    /// Override the group size limit
    pub fn with_max_group_size(mut self, max_group_size: usize) -> Self {
        self.max_group_size = max_group_size;
        self
    }

    /// Run dispatches on a dedicated pool of `threads` workers.
    ///
    /// Without the `rayon` feature this is a no-op and kernels run on the
    /// calling thread.
    pub fn with_threads(self, threads: usize) -> Result<Self> {
        #[cfg(feature = "rayon")]
        {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("scanr-cpu-{i}"))
                .build()
                .map_err(|e| {
                    Error::backend_init(crate::error::codes::DEVICE_REQUEST_FAILED, e.to_string())
                })?;
            let mut this = self;
            this.pool = Some(Arc::new(pool));
            Ok(this)
        }
        #[cfg(not(feature = "rayon"))]
        {
            let _ = threads;
            Ok(self)
        }
    }

    fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        #[cfg(feature = "rayon")]
        if let Some(pool) = &self.pool {
            return pool.install(f);
        }
        f()
    }

    fn launch_local_block_scan(
        &self,
        program: &CpuProgram,
        launch: LaunchConfig,
        args: &[KernelArg<'_, CpuBuffer>],
    ) -> Result<()> {
        let kernel = KernelName::LocalBlockScan;
        let bound = decode_local_block_scan(args, program.block_size)?;
        let block_size = launch.local_size;
        let groups = launch.group_count();

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
        if bound.size > launch.global_size {
            return Err(Error::dispatch(
                kernel.entry_point(),
                format!(
                    "{} elements do not fit in a launch of {} lanes",
                    bound.size, launch.global_size
                ),
            ));
        }

        let [
            Some(Guard::Read(input_guard)),
            Some(Guard::Write(mut output_guard)),
            Some(Guard::Write(mut totals_guard)),
        ] = lock_in_address_order([
            Access::Read(bound.input),
            Access::Write(bound.output),
            Access::Write(bound.block_totals),
        ])
        else {
            return Err(Error::dispatch(kernel.entry_point(), "failed to lock buffers"));
        };
        let input = &input_guard[..bound.size];
        let output = &mut output_guard[..bound.size];
        let totals = &mut totals_guard[..groups];
        self.install(|| kernels::local_block_scan(input, output, totals, block_size));
        Ok(())
    }

    fn launch_carry_propagation(
        &self,
        program: &CpuProgram,
        launch: LaunchConfig,
        args: &[KernelArg<'_, CpuBuffer>],
    ) -> Result<()> {
        let kernel = KernelName::CarryPropagation;
        let bound = decode_carry_propagation(args)?;
        let block_size = program.block_size as usize;

        if bound.data.same_storage(bound.scanned_totals) {
            return Err(Error::dispatch(
                kernel.entry_point(),
                "data and scanned_totals must be distinct buffers",
            ));
        }
        require_len(kernel, "data", bound.data, bound.size)?;
        if bound.size > launch.global_size {
            return Err(Error::dispatch(
                kernel.entry_point(),
                format!(
                    "{} elements do not fit in a launch of {} lanes",
                    bound.size, launch.global_size
                ),
            ));
        }
        // Block k reads scanned_totals[k - 1], so one fewer total than blocks.
        let carries = bound.size.div_ceil(block_size).saturating_sub(1);
        require_len(kernel, "scanned_totals", bound.scanned_totals, carries)?;

        let [Some(Guard::Write(mut data_guard)), Some(Guard::Read(totals_guard))] =
            lock_in_address_order([
                Access::Write(bound.data),
                Access::Read(bound.scanned_totals),
            ])
        else {
            return Err(Error::dispatch(kernel.entry_point(), "failed to lock buffers"));
        };
        let data = &mut data_guard[..bound.size];
        let totals = totals_guard.as_slice();
        self.install(|| kernels::carry_propagation(data, totals, block_size));
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Access<'a> {
    Read(&'a CpuBuffer),
    Write(&'a CpuBuffer),
}

impl Access<'_> {
    fn storage(&self) -> *const RwLock<Vec<f32>> {
        match self {
            Access::Read(buf) | Access::Write(buf) => Arc::as_ptr(&buf.words),
        }
    }
}

enum Guard<'a> {
    Read(RwLockReadGuard<'a, Vec<f32>>),
    Write(RwLockWriteGuard<'a, Vec<f32>>),
}

/// Lock distinct buffers in storage address order.
///
/// Every dispatch acquires its locks in the same global order, so
/// concurrent dispatches sharing buffers in different roles cannot
/// deadlock. Guards are returned in argument order.
fn lock_in_address_order<'a, const N: usize>(
    accesses: [Access<'a>; N],
) -> [Option<Guard<'a>>; N] {
    let mut order: [usize; N] = std::array::from_fn(|i| i);
    order.sort_by_key(|&i| accesses[i].storage());

    let mut guards: [Option<Guard<'a>>; N] = std::array::from_fn(|_| None);
    for i in order {
        guards[i] = Some(match accesses[i] {
            Access::Read(buf) => Guard::Read(buf.words.read()),
            Access::Write(buf) => Guard::Write(buf.words.write()),
        });
    }
    guards
}

fn require_len(kernel: KernelName, name: &str, buffer: &CpuBuffer, len: usize) -> Result<()> {
    if buffer.len() < len {
        return Err(Error::dispatch(
            kernel.entry_point(),
            format!("{name} holds {} elements, {len} required", buffer.len()),
        ));
    }
    Ok(())
}

impl ComputeBackend for CpuBackend {
    type Device = CpuDevice;
    type Buffer = CpuBuffer;
    type Program = CpuProgram;
    type Event = CpuEvent;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn device(&self) -> &CpuDevice {
        &self.device
    }

    fn max_group_size(&self) -> usize {
        self.max_group_size
    }

    fn allocate(&self, size_bytes: usize) -> Result<CpuBuffer> {
        let words = size_bytes.div_ceil(F32_BYTES);
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(words)
            .map_err(|_| Error::OutOfMemory { size: size_bytes })?;
        storage.resize(words, 0.0);
        Ok(CpuBuffer {
            words: Arc::new(RwLock::new(storage)),
            size_bytes,
        })
    }

    fn copy_to_device(&self, src: &[u8], dst: &CpuBuffer) -> Result<()> {
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
        let mut words = dst.words.write();
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(words.as_mut_slice());
        bytes[..src.len()].copy_from_slice(src);
        Ok(())
    }

    fn copy_from_device(&self, src: &CpuBuffer, dst: &mut [u8]) -> Result<()> {
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
        let words = src.words.read();
        let bytes: &[u8] = bytemuck::cast_slice(words.as_slice());
        dst.copy_from_slice(&bytes[..dst.len()]);
        Ok(())
    }

    fn compile(&self, options: &ProgramOptions) -> Result<CpuProgram> {
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
        log::trace!("cpu: built scan kernels for block size {block_size}");
        Ok(CpuProgram {
            block_size: options.block_size,
        })
    }

    fn dispatch(
        &self,
        program: &CpuProgram,
        kernel: KernelName,
        launch: LaunchConfig,
        args: &[KernelArg<'_, CpuBuffer>],
    ) -> Result<CpuEvent> {
        launch.validate(kernel, program.block_size)?;
        log::trace!(
            "cpu: dispatch {kernel} with {} groups of {}",
            launch.group_count(),
            launch.local_size
        );
        match kernel {
            KernelName::LocalBlockScan => self.launch_local_block_scan(program, launch, args)?,
            KernelName::CarryPropagation => self.launch_carry_propagation(program, launch, args)?,
        }
        Ok(CpuEvent)
    }
}
