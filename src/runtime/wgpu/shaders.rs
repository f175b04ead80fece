//! WGSL generation for the scan kernels
//!
//! The block size is emitted as a `const`, so the workgroup size and the
//! workgroup scratch array always agree with the launch geometry.
//!
//! Groups are addressed in two dimensions (`workgroup_id.y * groups_x
//! + workgroup_id.x`) because a single dispatch dimension is capped at
//! `max_compute_workgroups_per_dimension`.

use crate::runtime::KernelName;

/// Uniform parameters shared by both kernels (padded to 16 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct ScanParams {
    /// Valid elements in the primary buffer
    pub size: u32,
    /// Groups in the x dimension of the dispatch grid
    pub groups_x: u32,
    /// Groups that carry data; grid cells past this are idle
    pub group_count: u32,
    pub _pad: u32,
}

/// Generate the WGSL module for one kernel
pub(crate) fn generate_shader(kernel: KernelName, block_size: u32) -> String {
    match kernel {
        KernelName::LocalBlockScan => generate_local_block_scan(block_size),
        KernelName::CarryPropagation => generate_carry_propagation(block_size),
    }
}

const PARAMS_STRUCT: &str = r#"struct ScanParams {
    size: u32,
    groups_x: u32,
    group_count: u32,
    _pad: u32,
}"#;

fn generate_local_block_scan(block_size: u32) -> String {
    let scratch_len = 2 * block_size;
    format!(
        r#"// Auto-generated local_block_scan, block size {block_size}

const BLOCK_SIZE: u32 = {block_size}u;

{PARAMS_STRUCT}

@group(0) @binding(0) var<storage, read_write> scan_input: array<f32>;
@group(0) @binding(1) var<storage, read_write> scan_output: array<f32>;
@group(0) @binding(2) var<storage, read_write> block_totals: array<f32>;
@group(0) @binding(3) var<uniform> params: ScanParams;

// Two halves of BLOCK_SIZE, read and written alternately per round
var<workgroup> scratch: array<f32, {scratch_len}>;

@compute @workgroup_size({block_size})
fn local_block_scan(
    @builtin(local_invocation_id) local_id: vec3<u32>,
    @builtin(workgroup_id) group_id: vec3<u32>,
) {{
    let block_idx = group_id.y * params.groups_x + group_id.x;
    if (block_idx >= params.group_count) {{
        return;
    }}

    let lane = local_id.x;
    let gid = block_idx * BLOCK_SIZE + lane;

    var value: f32 = 0.0;
    if (gid < params.size) {{
        value = scan_input[gid];
    }}
    scratch[lane] = value;
    workgroupBarrier();

    var src: u32 = 0u;
    var dst: u32 = BLOCK_SIZE;
    for (var offset: u32 = 1u; offset < BLOCK_SIZE; offset = offset * 2u) {{
        var acc = scratch[src + lane];
        if (lane >= offset) {{
            acc = acc + scratch[src + lane - offset];
        }}
        scratch[dst + lane] = acc;
        workgroupBarrier();
        let tmp = src;
        src = dst;
        dst = tmp;
    }}

    if (gid < params.size) {{
        scan_output[gid] = scratch[src + lane];
    }}
    if (lane == BLOCK_SIZE - 1u) {{
        block_totals[block_idx] = scratch[src + lane];
    }}
}}
"#
    )
}

fn generate_carry_propagation(block_size: u32) -> String {
    format!(
        r#"// Auto-generated carry_propagation, block size {block_size}

const BLOCK_SIZE: u32 = {block_size}u;

{PARAMS_STRUCT}

@group(0) @binding(0) var<storage, read_write> scan_data: array<f32>;
@group(0) @binding(1) var<storage, read_write> scanned_totals: array<f32>;
@group(0) @binding(2) var<uniform> params: ScanParams;

@compute @workgroup_size({block_size})
fn carry_propagation(
    @builtin(local_invocation_id) local_id: vec3<u32>,
    @builtin(workgroup_id) group_id: vec3<u32>,
) {{
    let block_idx = group_id.y * params.groups_x + group_id.x;
    let gid = block_idx * BLOCK_SIZE + local_id.x;
    if (block_idx == 0u || block_idx >= params.group_count || gid >= params.size) {{
        return;
    }}
    scan_data[gid] = scan_data[gid] + scanned_totals[block_idx - 1u];
}}
"#
    )
}

/// Split `groups` into an (x, y) grid with `x <= max_per_dim`.
pub(crate) fn dispatch_grid(groups: usize, max_per_dim: u32) -> Option<(u32, u32)> {
    let max = max_per_dim.max(1) as usize;
    if groups <= max {
        return Some((groups as u32, 1));
    }
    let y = groups.div_ceil(max);
    if y > max {
        return None;
    }
    Some((max as u32, y as u32))
}
