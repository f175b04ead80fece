//! WGSL compute pipeline cache
//!
//! Pipelines are keyed by (kernel, block size). A program compiled twice for
//! the same block size reuses the same modules and pipelines.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingType, Buffer, BufferBindingType, CompilationMessageType,
    ComputePipeline, ComputePipelineDescriptor, Device, PipelineLayoutDescriptor,
    ShaderModuleDescriptor, ShaderSource, ShaderStages,
};

use super::shaders::generate_shader;
use crate::error::{Error, Result, codes};
use crate::runtime::KernelName;

/// Key for bind group layout cache
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct LayoutKey {
    /// Number of storage buffers in the layout
    pub num_storage_buffers: u32,
    /// Number of uniform buffers in the layout
    pub num_uniform_buffers: u32,
}

impl LayoutKey {
    /// Bindings used by a kernel: its storage buffers followed by the params uniform
    pub fn for_kernel(kernel: KernelName) -> Self {
        let num_storage_buffers = match kernel {
            KernelName::LocalBlockScan => 3,
            KernelName::CarryPropagation => 2,
        };
        Self {
            num_storage_buffers,
            num_uniform_buffers: 1,
        }
    }
}

/// Cache for compute pipelines keyed by (kernel, block_size)
pub(crate) struct PipelineCache {
    device: Arc<Device>,
    /// Cached pipelines
    pipelines: Mutex<HashMap<(KernelName, u32), Arc<ComputePipeline>>>,
    /// Cached bind group layouts
    layouts: Mutex<HashMap<LayoutKey, Arc<BindGroupLayout>>>,
}

impl PipelineCache {
    /// Create an empty cache
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            pipelines: Mutex::new(HashMap::new()),
            layouts: Mutex::new(HashMap::new()),
        }
    }

    /// Get or build the pipeline for `kernel` at `block_size`.
    ///
    /// Shader compilation errors are reported as
    /// [`Error::BackendInit`] with [`codes::BUILD_PROGRAM_FAILURE`].
    pub fn get_or_create_pipeline(
        &self,
        kernel: KernelName,
        block_size: u32,
    ) -> Result<Arc<ComputePipeline>> {
        let key = (kernel, block_size);
        if let Some(pipeline) = self.pipelines.lock().get(&key) {
            return Ok(pipeline.clone());
        }

        let source = generate_shader(kernel, block_size);
        if source.trim().is_empty() {
            return Err(Error::configuration("kernel_source", "empty kernel source"));
        }

        let label = format!("{}_{}", kernel.entry_point(), block_size);
        let module = self.device.create_shader_module(ShaderModuleDescriptor {
            label: Some(&label),
            source: ShaderSource::Wgsl(source.into()),
        });

        let info = pollster::block_on(module.get_compilation_info());
        let build_log: Vec<String> = info
            .messages
            .iter()
            .filter(|m| matches!(m.message_type, CompilationMessageType::Error))
            .map(|m| m.message.clone())
            .collect();
        if !build_log.is_empty() {
            return Err(Error::backend_init(
                codes::BUILD_PROGRAM_FAILURE,
                format!("{label}: {}", build_log.join("\n")),
            ));
        }

        let layout = self.get_or_create_layout(LayoutKey::for_kernel(kernel));
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some(&format!("{label}_layout")),
                bind_group_layouts: &[layout.as_ref()],
                immediate_size: 0,
            });

        let pipeline = self
            .device
            .create_compute_pipeline(&ComputePipelineDescriptor {
                label: Some(&label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(kernel.entry_point()),
                compilation_options: Default::default(),
                cache: None,
            });

        let pipeline = Arc::new(pipeline);
        self.pipelines.lock().insert(key, pipeline.clone());
        log::debug!("wgpu: built pipeline {label}");
        Ok(pipeline)
    }

    /// Get or create a bind group layout
    pub fn get_or_create_layout(&self, key: LayoutKey) -> Arc<BindGroupLayout> {
        let mut layouts = self.layouts.lock();

        if let Some(layout) = layouts.get(&key) {
            return layout.clone();
        }

        let mut entries = Vec::new();

        for i in 0..key.num_storage_buffers {
            entries.push(BindGroupLayoutEntry {
                binding: i,
                visibility: ShaderStages::COMPUTE,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }

        for i in 0..key.num_uniform_buffers {
            entries.push(BindGroupLayoutEntry {
                binding: key.num_storage_buffers + i,
                visibility: ShaderStages::COMPUTE,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }

        let layout = self
            .device
            .create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: Some("scan_layout"),
                entries: &entries,
            });

        let layout = Arc::new(layout);
        layouts.insert(key, layout.clone());
        layout
    }

    /// Create a bind group from buffers, in binding order
    pub fn create_bind_group(&self, layout: &BindGroupLayout, buffers: &[&Buffer]) -> BindGroup {
        let entries: Vec<BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| BindGroupEntry {
                binding: i as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        self.device.create_bind_group(&BindGroupDescriptor {
            label: Some("scan_bind_group"),
            layout,
            entries: &entries,
        })
    }
}
