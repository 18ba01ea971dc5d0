use bytemuck::{Pod, Zeroable};
use candela_gpu::Format;
use candela_rg::{self as rg, SimpleComputePass};

use super::GbufferDepth;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct ScreenSpaceGiConstants {
    pub output_extent: [u32; 2],
    pub frame_index: u32,
    pub ray_count_per_pixel: u32,
    pub history_valid: u32,
    pub _pad: [u32; 3],
}

/// Half-resolution screen-space gather against the previous frame's
/// radiance, upsampled back to full resolution with depth guidance. With no
/// usable history (first frame, camera cut) the trace writes zero.
pub fn trace_screen_space_gi(
    rg: &mut rg::RenderGraph,
    gbuffer_depth: &GbufferDepth,
    prev_radiance: &rg::Handle<rg::Image>,
    reprojection_map: &rg::Handle<rg::Image>,
    frame_index: u32,
    ray_count_per_pixel: u32,
    history_valid: bool,
) -> rg::Handle<rg::Image> {
    let half_view_normal = gbuffer_depth.half_view_normal(rg);
    let half_depth = gbuffer_depth.half_depth(rg);

    let mut half_tex = rg.create(
        gbuffer_depth
            .gbuffer
            .desc()
            .half_res()
            .format(Format::Rg11b10Float),
    );

    let constants = ScreenSpaceGiConstants {
        output_extent: half_tex.desc().extent_2d(),
        frame_index,
        ray_count_per_pixel,
        history_valid: history_valid as u32,
        _pad: [0; 3],
    };

    SimpleComputePass::new_compute(rg.add_pass("ssgi trace"), "screen_space_gi_trace")
        .read(&gbuffer_depth.gbuffer)
        .read(&*half_depth)
        .read(&*half_view_normal)
        .read(prev_radiance)
        .read(reprojection_map)
        .write(&mut half_tex)
        .constants(constants)
        .dispatch(half_tex.desc().extent);

    drop(half_view_normal);
    drop(half_depth);

    let mut output_tex = rg.create(
        gbuffer_depth
            .gbuffer
            .desc()
            .format(Format::Rg11b10Float),
    );

    SimpleComputePass::new_compute(rg.add_pass("ssgi upsample"), "screen_space_gi_upsample")
        .read(&half_tex)
        .read(&gbuffer_depth.depth)
        .read(&gbuffer_depth.gbuffer)
        .write(&mut output_tex)
        .constants(constants)
        .dispatch(output_tex.desc().extent);

    output_tex
}
