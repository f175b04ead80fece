//! WebGPU device selection.
//!
//! `WgpuDevice` identifies one adapter and caches its properties once the
//! adapter has been opened.
//!
//! # Selection policy
//!
//! Without an explicit index, the first adapter reporting a discrete or
//! integrated GPU is used. With an index, that position in enumeration order
//! is used, and an out-of-range index is an error rather than a silent
//! fallback.

use std::fmt;
use std::sync::Arc;

use wgpu::{Adapter, Backend, DeviceType, Limits};

use crate::error::{Error, Result, codes};

/// Cached adapter information for a WebGPU device.
#[derive(Clone)]
pub(crate) struct AdapterInfo {
    /// Adapter name (e.g., "NVIDIA GeForce RTX 4090")
    name: String,
    /// Backend type (Vulkan, Metal, DX12, etc.)
    backend: Backend,
    /// Physical device class
    device_type: DeviceType,
    /// Device limits
    limits: Limits,
}

/// WebGPU device identifier.
///
/// The index maps to the order of adapters returned by enumeration.
#[derive(Clone)]
pub struct WgpuDevice {
    /// Adapter index (enumeration order)
    pub(crate) index: usize,
    /// Cached adapter info
    info: Option<Arc<AdapterInfo>>,
}

impl WgpuDevice {
    /// Create a device identifier for the specified adapter index.
    ///
    /// This does not open the GPU; that happens in
    /// [`WgpuBackend::new`](super::WgpuBackend::new).
    pub fn new(index: usize) -> Self {
        Self { index, info: None }
    }

    pub(crate) fn with_info(index: usize, info: Arc<AdapterInfo>) -> Self {
        Self {
            index,
            info: Some(info),
        }
    }

    /// Get the adapter name.
    ///
    /// Returns "unknown" if the device hasn't been opened yet.
    pub fn adapter_name(&self) -> String {
        self.info
            .as_ref()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Get the backend type (Vulkan, Metal, DX12, etc.).
    pub fn backend(&self) -> Option<Backend> {
        self.info.as_ref().map(|i| i.backend)
    }

    /// Get the physical device class.
    pub fn device_type(&self) -> Option<DeviceType> {
        self.info.as_ref().map(|i| i.device_type)
    }

    /// Get device limits.
    ///
    /// Returns default limits if the device hasn't been opened yet.
    pub fn limits(&self) -> Limits {
        self.info
            .as_ref()
            .map(|i| i.limits.clone())
            .unwrap_or_default()
    }
}

impl super::super::Device for WgpuDevice {
    fn id(&self) -> usize {
        self.index
    }

    fn name(&self) -> String {
        format!("wgpu:{}", self.index)
    }
}

impl fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("index", &self.index)
            .field("adapter", &self.adapter_name())
            .field("backend", &self.backend())
            .finish()
    }
}

// ============================================================================
// Adapter Discovery
// ============================================================================

fn is_gpu(device_type: DeviceType) -> bool {
    matches!(
        device_type,
        DeviceType::DiscreteGpu | DeviceType::IntegratedGpu
    )
}

/// Find an adapter according to the selection policy.
pub(crate) async fn select_adapter(index: Option<usize>) -> Result<(usize, Adapter)> {
    let instance = wgpu::Instance::default();
    let adapters: Vec<_> = instance.enumerate_adapters(wgpu::Backends::all()).await;

    if adapters.is_empty() {
        return Err(Error::backend_init(
            codes::DEVICE_NOT_FOUND,
            "no WebGPU adapter found",
        ));
    }

    let position = match index {
        Some(i) if i < adapters.len() => i,
        Some(i) => {
            return Err(Error::backend_init(
                codes::DEVICE_NOT_FOUND,
                format!("adapter index {i} out of range ({} found)", adapters.len()),
            ));
        }
        None => adapters
            .iter()
            .position(|a| is_gpu(a.get_info().device_type))
            .ok_or_else(|| {
                Error::backend_init(
                    codes::DEVICE_NOT_FOUND,
                    format!(
                        "none of the {} adapters is a discrete or integrated GPU",
                        adapters.len()
                    ),
                )
            })?,
    };

    let mut adapters = adapters;
    Ok((position, adapters.swap_remove(position)))
}

/// Collect the properties of an opened adapter.
pub(crate) fn adapter_info(adapter: &Adapter) -> Arc<AdapterInfo> {
    let info = adapter.get_info();
    Arc::new(AdapterInfo {
        name: info.name,
        backend: info.backend,
        device_type: info.device_type,
        limits: adapter.limits(),
    })
}

/// Returns true if a GPU adapter matching the default policy exists.
pub fn is_wgpu_available() -> bool {
    pollster::block_on(select_adapter(None)).is_ok()
}

// ============================================================================
// Tests
// ============================================================================
