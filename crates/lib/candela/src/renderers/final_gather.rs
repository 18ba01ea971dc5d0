use bytemuck::{Pod, Zeroable};
use candela_gpu::{BufferDesc, BufferUsageFlags, Format, ImageDesc};
use candela_rg::{self as rg, GetOrCreateTemporal, SimpleComputePass};

use super::GbufferDepth;
use crate::{frame_constants::ViewConstants, scene::PackedLight};

/// Gather points per screen dimension divisor; one gather point per 4x4
/// pixel block, reprojected across frames.
pub const GATHER_POINT_TILE_SIZE: u32 = 4;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct GatherPoint {
    pub position: [f32; 3],
    pub age: u32,
    pub radiance: [f32; 3],
    pub valid: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct FinalGatherConstants {
    pub view: ViewConstants,
    pub prev_view: ViewConstants,
    pub screen_extent: [u32; 2],
    pub gather_extent: [u32; 2],
    pub frame_index: u32,
    pub history_valid: u32,
    pub sky_color: [f32; 3],
    pub sky_enabled: u32,
    pub light_count: u32,
    pub _pad: [u32; 3],
}

/// Ray-traced final gather: persistent gather points are reprojected from
/// the previous frame, refreshed by tracing, then gathered into a
/// full-resolution diffuse signal. The gather-points buffer is the one
/// buffer-shaped member of per-view persistent state.
pub fn trace_final_gather(
    rg: &mut rg::TemporalRenderGraph,
    gbuffer_depth: &GbufferDepth,
    lights: Vec<PackedLight>,
    constants: FinalGatherConstants,
) -> rg::Handle<rg::Image> {
    let screen = gbuffer_depth.gbuffer.desc().extent_2d();
    let gather_extent = [
        (screen[0] + GATHER_POINT_TILE_SIZE - 1) / GATHER_POINT_TILE_SIZE,
        (screen[1] + GATHER_POINT_TILE_SIZE - 1) / GATHER_POINT_TILE_SIZE,
    ];
    let gather_count = (gather_extent[0] * gather_extent[1]) as usize;

    let mut gather_points_buf: rg::Handle<rg::Buffer> = rg
        .get_or_create_temporal(
            "final_gather.points",
            BufferDesc::new_gpu_only(
                std::mem::size_of::<GatherPoint>() * gather_count,
                BufferUsageFlags::STORAGE_BUFFER,
            ),
        )
        .unwrap();

    let constants = FinalGatherConstants {
        gather_extent,
        ..constants
    };

    SimpleComputePass::new_compute(
        rg.add_pass("final gather reproject"),
        "final_gather_reproject",
    )
    .read(&gbuffer_depth.depth)
    .write(&mut gather_points_buf)
    .constants(constants)
    .dispatch([gather_extent[0], gather_extent[1], 1]);

    SimpleComputePass::new_compute(rg.add_pass("final gather trace"), "final_gather_trace")
        .read(&gbuffer_depth.depth)
        .write(&mut gather_points_buf)
        .constants(constants)
        .dynamic_storage_buffer_vec(lights)
        .dispatch([gather_extent[0], gather_extent[1], 1]);

    let mut diffuse_tex = rg.create(ImageDesc::new_2d(Format::Rg11b10Float, screen));

    SimpleComputePass::new_compute(rg.add_pass("final gather resolve"), "final_gather_resolve")
        .read(&gbuffer_depth.gbuffer)
        .read(&gather_points_buf)
        .write(&mut diffuse_tex)
        .constants(constants)
        .dispatch([screen[0], screen[1], 1]);

    diffuse_tex
}
