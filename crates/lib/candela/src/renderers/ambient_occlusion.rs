use bytemuck::{Pod, Zeroable};
use candela_gpu::{Format, ImageDesc};
use candela_rg::{self as rg, SimpleComputePass};

use super::GbufferDepth;
use crate::settings::RayTracingConfig;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct AmbientOcclusionConstants {
    pub output_extent: [u32; 2],
    pub frame_index: u32,
    pub ray_count_per_pixel: u32,
    pub world_radius: f32,
    pub _pad: [u32; 3],
}

pub struct TracedAmbientOcclusion {
    pub mask_tex: rg::Handle<rg::Image>,
    pub ray_hit_distance_tex: rg::Handle<rg::Image>,
}

/// Stochastic short-range occlusion rays against the depth buffer. The mask
/// averages `ray_count_per_pixel` binary visibility samples, so its raw
/// variance falls off as `1/N` before the denoiser ever sees it.
pub fn trace_ambient_occlusion(
    rg: &mut rg::RenderGraph,
    gbuffer_depth: &GbufferDepth,
    frame_index: u32,
    config: RayTracingConfig,
) -> TracedAmbientOcclusion {
    let full = gbuffer_depth.gbuffer.desc().extent_2d();
    let output_extent = [
        ((full[0] as f32 * config.resolution_fraction) as u32).max(1),
        ((full[1] as f32 * config.resolution_fraction) as u32).max(1),
    ];

    let mut mask_tex = rg.create(ImageDesc::new_2d(Format::R16Float, output_extent));
    let mut ray_hit_distance_tex = rg.create(ImageDesc::new_2d(Format::R16Float, output_extent));

    SimpleComputePass::new_compute(rg.add_pass("ambient occlusion"), "ambient_occlusion_trace")
        .read(&gbuffer_depth.depth)
        .read(&gbuffer_depth.geometric_normal)
        .write(&mut mask_tex)
        .write(&mut ray_hit_distance_tex)
        .constants(AmbientOcclusionConstants {
            output_extent,
            frame_index,
            ray_count_per_pixel: config.ray_count_per_pixel,
            world_radius: 1.0,
            _pad: [0; 3],
        })
        .dispatch([output_extent[0], output_extent[1], 1]);

    TracedAmbientOcclusion {
        mask_tex,
        ray_hit_distance_tex,
    }
}
