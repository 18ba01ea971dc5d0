use bytemuck::{Pod, Zeroable};
use candela_gpu::{Format, ImageDesc};
use candela_rg::{self as rg, SimpleComputePass};

use super::GbufferDepth;
use crate::{frame_constants::ViewConstants, scene::PackedLight};

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct BruteForceGiConstants {
    pub view: ViewConstants,
    pub output_extent: [u32; 2],
    pub frame_index: u32,
    pub ray_count_per_pixel: u32,
    pub sky_color: [f32; 3],
    pub sky_enabled: u32,
    pub light_count: u32,
    pub _pad: [u32; 3],
}

/// The unamortized reference path: every full-resolution pixel traces its
/// own hemisphere rays. Requires hardware ray tracing; selected only after
/// the capability gate passed.
pub fn trace_brute_force_gi(
    rg: &mut rg::RenderGraph,
    gbuffer_depth: &GbufferDepth,
    lights: Vec<PackedLight>,
    constants: BruteForceGiConstants,
) -> rg::Handle<rg::Image> {
    let extent = gbuffer_depth.gbuffer.desc().extent_2d();
    let mut output_tex = rg.create(ImageDesc::new_2d(Format::Rg11b10Float, extent));

    SimpleComputePass::new_compute(rg.add_pass("brute force gi"), "brute_force_gi_trace")
        .read(&gbuffer_depth.gbuffer)
        .read(&gbuffer_depth.depth)
        .write(&mut output_tex)
        .constants(BruteForceGiConstants {
            output_extent: extent,
            ..constants
        })
        .dynamic_storage_buffer_vec(lights)
        .dispatch([extent[0], extent[1], 1]);

    output_tex
}
