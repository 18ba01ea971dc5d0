use bytemuck::{Pod, Zeroable};
use candela_gpu::{Format, ImageDesc};
use candela_rg::{self as rg, SimpleComputePass};

use super::GbufferDepth;
use crate::{
    frame_constants::ViewConstants,
    scene::PackedLight,
    settings::RayTracingConfig,
};

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct ReflectionTraceConstants {
    pub view: ViewConstants,
    pub output_extent: [u32; 2],
    pub frame_index: u32,
    pub ray_count_per_pixel: u32,
    pub sky_color: [f32; 3],
    pub sky_enabled: u32,
    pub light_count: u32,
    pub history_valid: u32,
    pub _pad: [u32; 2],
}

/// The raw reflections signal handed to the denoiser: stochastic color plus
/// hit geometry. Miss rays carry a negative hit distance sentinel; the
/// imaginary depth is the reflected hit reprojected behind the reflector,
/// which the denoiser's reconstruction filter keys on.
pub struct TracedReflections {
    pub color_tex: rg::Handle<rg::Image>,
    pub ray_hit_distance_tex: rg::Handle<rg::Image>,
    pub ray_imaginary_depth_tex: rg::Handle<rg::Image>,
}

/// Traces reflections at `config.resolution_fraction` of the output
/// resolution, screen-space against the previous frame's radiance unless
/// hardware ray tracing was selected for this frame.
#[allow(clippy::too_many_arguments)]
pub fn trace_reflections(
    rg: &mut rg::RenderGraph,
    gbuffer_depth: &GbufferDepth,
    prev_radiance: &rg::Handle<rg::Image>,
    lights: Vec<PackedLight>,
    constants: ReflectionTraceConstants,
    config: RayTracingConfig,
    use_hardware_rt: bool,
) -> TracedReflections {
    let full = gbuffer_depth.gbuffer.desc().extent_2d();
    let output_extent = [
        ((full[0] as f32 * config.resolution_fraction) as u32).max(1),
        ((full[1] as f32 * config.resolution_fraction) as u32).max(1),
    ];

    let mut color_tex = rg.create(ImageDesc::new_2d(Format::Rgba16Float, output_extent));
    let mut ray_hit_distance_tex = rg.create(ImageDesc::new_2d(Format::R16Float, output_extent));
    let mut ray_imaginary_depth_tex =
        rg.create(ImageDesc::new_2d(Format::R16Float, output_extent));

    let kernel = if use_hardware_rt {
        "reflections_trace_rt"
    } else {
        "reflections_trace_screen"
    };

    SimpleComputePass::new_compute(rg.add_pass("reflections trace"), kernel)
        .read(&gbuffer_depth.gbuffer)
        .read(&gbuffer_depth.depth)
        .read(prev_radiance)
        .write(&mut color_tex)
        .write(&mut ray_hit_distance_tex)
        .write(&mut ray_imaginary_depth_tex)
        .constants(ReflectionTraceConstants {
            output_extent,
            ray_count_per_pixel: config.ray_count_per_pixel,
            ..constants
        })
        .dynamic_storage_buffer_vec(lights)
        .dispatch([output_extent[0], output_extent[1], 1]);

    TracedReflections {
        color_tex,
        ray_hit_distance_tex,
        ray_imaginary_depth_tex,
    }
}
