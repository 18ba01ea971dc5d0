use bytemuck::{Pod, Zeroable};
use candela_gpu::{
    BufferDesc, BufferUsageFlags, Format, ImageDesc, INDIRECT_DISPATCH_STRIDE,
};
use candela_rg::{self as rg, SimpleComputePass};

use super::{
    probe_hierarchy::*,
    tile_classification::{
        TileCategory, TileClassificationContext, MAX_DISPATCH_SPLITS,
    },
    GbufferDepth,
};
use crate::scene::PackedLight;

/// Occlusion-distance sentinel for pixels with no valid probe or sample.
pub const INVALID_HIT_DISTANCE: f32 = -1.0;

/// Bit width of one ray's slot in the per-pixel sample masks: two bits while
/// they fit the word, one past that.
pub fn sample_mask_bits_per_ray(max_ray_per_pixel: u32) -> u32 {
    if max_ray_per_pixel <= 16 {
        2
    } else {
        1
    }
}

/// The sample-mask storage format scales with the worst-case ray count so
/// low-spp configurations don't pay for 32-bit masks.
pub fn sample_mask_format(max_ray_per_pixel: u32) -> Format {
    let bits = max_ray_per_pixel * sample_mask_bits_per_ray(max_ray_per_pixel);
    if bits <= 8 {
        Format::R8Uint
    } else if bits <= 16 {
        Format::R16Uint
    } else {
        Format::R32Uint
    }
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct ProbeTraceConstants {
    pub hierarchy: ProbeHierarchyConstants,
    pub sky_color: [f32; 3],
    pub sky_enabled: u32,
    pub light_count: u32,
    pub samples_per_pixel: u32,
    pub probes_per_row: u32,
    pub history_valid: u32,
}

/// Full-resolution probe lookups: which probe each pixel gathers from, and
/// how far its occluder sits.
pub struct ResolvedProbes {
    /// R32Uint; `PROBE_INVALID_INDEX` where no probe covers the pixel.
    pub probe_index_tex: rg::Handle<rg::Image>,
    /// R16Float; `INVALID_HIT_DISTANCE` where invalid.
    pub occlusion_distance_tex: rg::Handle<rg::Image>,
}

/// The stochastic outputs of the tracing engine, pre-denoise.
pub struct TracedProbeLighting {
    pub diffuse_tex: rg::Handle<rg::Image>,
    pub specular_tex: rg::Handle<rg::Image>,
    pub diffuse_sample_mask: rg::Handle<rg::Image>,
    pub specular_sample_mask: rg::Handle<rg::Image>,
}

/// Per-pixel stochastic probe selection over the dilated resolve-tile lists.
pub fn resolve_probe_indexes(
    rg: &mut rg::RenderGraph,
    gbuffer_depth: &GbufferDepth,
    hierarchy: &ProbeHierarchy,
) -> ResolvedProbes {
    let screen = gbuffer_depth.gbuffer.desc().extent_2d();

    let mut probe_index_tex = rg.create(ImageDesc::new_2d(Format::R32Uint, screen));
    let mut occlusion_distance_tex = rg.create(ImageDesc::new_2d(Format::R16Float, screen));

    SimpleComputePass::new_compute(rg.add_pass("resolve probe indexes"), "resolve_probe_indexes")
        .read(&gbuffer_depth.depth)
        .read(&hierarchy.probes_buf)
        .read(&hierarchy.dilated_lists[0])
        .read(&hierarchy.dilated_counts[0])
        .write(&mut probe_index_tex)
        .write(&mut occlusion_distance_tex)
        .constants(hierarchy.constants_for_level(0))
        .dispatch([screen[0], screen[1], 1]);

    ResolvedProbes {
        probe_index_tex,
        occlusion_distance_tex,
    }
}

/// Per-pixel occlusion, either marched through the previous frame's radiance
/// mip chain or hardware ray traced. Produces the packed per-sample masks.
/// On a cold start (no usable history) the screen-space variant writes zero
/// masks instead of leaving the buffers untouched.
#[allow(clippy::too_many_arguments)]
pub fn trace_probe_occlusion(
    rg: &mut rg::RenderGraph,
    gbuffer_depth: &GbufferDepth,
    resolved: &ResolvedProbes,
    prev_radiance: &rg::Handle<rg::Image>,
    constants: ProbeTraceConstants,
    use_hardware_rt: bool,
) -> (rg::Handle<rg::Image>, rg::Handle<rg::Image>) {
    let screen = gbuffer_depth.gbuffer.desc().extent_2d();
    let mask_format = sample_mask_format(constants.samples_per_pixel);

    let mut diffuse_sample_mask = rg.create(ImageDesc::new_2d(mask_format, screen));
    let mut specular_sample_mask = rg.create(ImageDesc::new_2d(mask_format, screen));

    let kernel = if use_hardware_rt {
        "probe_occlusion_rt"
    } else {
        "probe_occlusion_screen"
    };

    SimpleComputePass::new_compute(rg.add_pass("probe occlusion"), kernel)
        .read(&gbuffer_depth.depth)
        .read(&resolved.probe_index_tex)
        .read(&resolved.occlusion_distance_tex)
        .read(prev_radiance)
        .write(&mut diffuse_sample_mask)
        .write(&mut specular_sample_mask)
        .constants(constants)
        .dispatch([screen[0], screen[1], 1]);

    (diffuse_sample_mask, specular_sample_mask)
}

pub struct ProbeAtlas {
    pub atlas_tex: rg::Handle<rg::Image>,
    pub probes_per_row: u32,
}

pub fn atlas_probes_per_row(max_probe_count: u32) -> u32 {
    (max_probe_count as f32).sqrt().ceil() as u32
}

/// Indirect dispatch args for the per-probe passes: one record per level,
/// group counts read back from the hierarchy info buffer. Empty levels get a
/// zero-group record, which the graph treats as a valid no-op.
fn prepare_probe_trace_args(
    rg: &mut rg::RenderGraph,
    hierarchy: &ProbeHierarchy,
) -> rg::Handle<rg::Buffer> {
    let mut args_buf = rg.create(BufferDesc::new_gpu_only(
        INDIRECT_DISPATCH_STRIDE as usize * PROBE_MAX_HIERARCHY_DEPTH,
        BufferUsageFlags::INDIRECT_BUFFER,
    ));

    SimpleComputePass::new_compute(rg.add_pass("_probe trace args"), "probe_prepare_trace_args")
        .read(&hierarchy.hierarchy_info_buf)
        .write(&mut args_buf)
        .constants(hierarchy.constants)
        .dispatch([1, 1, 1]);

    args_buf
}

/// Populates every probe's IBL atlas cell by tracing from the probe itself,
/// then composes ancestor cells down into descendants. Ray cost amortizes
/// across all pixels that share a probe; the `1 / supersampling^2` sample
/// weight keeps brightness independent of the supersampling factor.
pub fn trace_probe_atlas(
    rg: &mut rg::RenderGraph,
    hierarchy: &ProbeHierarchy,
    sky_importance: &super::sky::SkyImportanceMap,
    lights: Vec<PackedLight>,
    constants: ProbeTraceConstants,
) -> ProbeAtlas {
    let probes_per_row = atlas_probes_per_row(hierarchy.constants.max_probe_count);
    let atlas_rows =
        (hierarchy.constants.max_probe_count + probes_per_row - 1) / probes_per_row;
    let res = hierarchy.constants.atlas_resolution;

    let mut atlas_tex = rg.create(ImageDesc::new_2d(
        Format::Rg11b10Float,
        [probes_per_row * res, atlas_rows * res],
    ));

    let args_buf = prepare_probe_trace_args(rg, hierarchy);

    for level in 0..hierarchy.level_count {
        SimpleComputePass::new_compute(rg.add_pass("probe atlas trace"), "probe_atlas_trace")
            .read(&hierarchy.probes_buf)
            .read(&hierarchy.hierarchy_info_buf)
            .read(&sky_importance.color)
            .read(&sky_importance.pdf)
            .write_no_sync(&mut atlas_tex)
            .constants(ProbeTraceConstants {
                hierarchy: hierarchy.constants_for_level(level),
                probes_per_row,
                ..constants
            })
            .dynamic_storage_buffer_vec(lights.clone())
            .dispatch_indirect(&args_buf, level as u64 * INDIRECT_DISPATCH_STRIDE);
    }

    // Top-down: children blend their ancestors' lower-frequency samples
    // into their own cells.
    for level in (0..hierarchy.level_count.saturating_sub(1)).rev() {
        SimpleComputePass::new_compute(rg.add_pass("compose probe atlas"), "compose_probe_atlas")
            .read(&hierarchy.probes_buf)
            .read(&hierarchy.hierarchy_info_buf)
            .write_no_sync(&mut atlas_tex)
            .constants(ProbeTraceConstants {
                hierarchy: hierarchy.constants_for_level(level),
                probes_per_row,
                ..constants
            })
            .dispatch_indirect(&args_buf, level as u64 * INDIRECT_DISPATCH_STRIDE);
    }

    ProbeAtlas {
        atlas_tex,
        probes_per_row,
    }
}

/// The final full-resolution gather: resolved probe index + composed atlas +
/// per-pixel sample masks in, stochastic diffuse and specular radiance out,
/// normalized by `1 / samples_per_pixel`.
#[allow(clippy::too_many_arguments)]
pub fn trace_indirect_lighting(
    rg: &mut rg::RenderGraph,
    gbuffer_depth: &GbufferDepth,
    hierarchy: &ProbeHierarchy,
    resolved: &ResolvedProbes,
    atlas: &ProbeAtlas,
    diffuse_sample_mask: rg::Handle<rg::Image>,
    specular_sample_mask: rg::Handle<rg::Image>,
    constants: ProbeTraceConstants,
) -> TracedProbeLighting {
    let screen = gbuffer_depth.gbuffer.desc().extent_2d();

    let mut diffuse_tex = rg.create(ImageDesc::new_2d(Format::Rg11b10Float, screen));
    let mut specular_tex = rg.create(ImageDesc::new_2d(Format::Rg11b10Float, screen));

    SimpleComputePass::new_compute(
        rg.add_pass("trace indirect lighting"),
        "trace_indirect_lighting",
    )
    .read(&gbuffer_depth.gbuffer)
    .read(&resolved.probe_index_tex)
    .read(&resolved.occlusion_distance_tex)
    .read(&atlas.atlas_tex)
    .read(&hierarchy.probes_buf)
    .read(&diffuse_sample_mask)
    .read(&specular_sample_mask)
    .write(&mut diffuse_tex)
    .write(&mut specular_tex)
    .constants(ProbeTraceConstants {
        probes_per_row: atlas.probes_per_row,
        ..constants
    })
    .dispatch([screen[0], screen[1], 1]);

    TracedProbeLighting {
        diffuse_tex,
        specular_tex,
        diffuse_sample_mask,
        specular_sample_mask,
    }
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct SpecularRefineConstants {
    pub category: u32,
    pub split_base: u32,
    pub tile_count: [u32; 2],
}

/// Specular firefly clamp, routed through the compacted tile lists: only the
/// categories that shade specular at all get a thread group per tile, split
/// across physical dispatches where a category outgrows the per-dispatch
/// group bound. Categories with zero tiles dispatch zero groups and fall
/// through as no-ops.
pub fn refine_specular_tiles(
    rg: &mut rg::RenderGraph,
    tiles: &TileClassificationContext,
    specular_tex: &mut rg::Handle<rg::Image>,
) {
    for category in [
        TileCategory::SimpleShadingSpecular,
        TileCategory::ComplexShadingBentNormal,
    ] {
        for split in 0..MAX_DISPATCH_SPLITS {
            SimpleComputePass::new_compute(
                rg.add_pass("probe specular refine"),
                "probe_specular_tile_refine",
            )
            .read(&tiles.tile_lists_buf)
            .read(&tiles.category_counts_buf)
            .write_no_sync(specular_tex)
            .constants(SpecularRefineConstants {
                category: category as u32,
                split_base: TileClassificationContext::split_base_tile(split),
                tile_count: tiles.tile_count,
            })
            .dispatch_indirect(
                &tiles.dispatch_args_buf,
                TileClassificationContext::dispatch_args_offset(category, split),
            );
        }
    }
}
