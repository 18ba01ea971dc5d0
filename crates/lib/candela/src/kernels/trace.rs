use candela_gpu::{DispatchIndirectArgs, GpuError, KernelCtx, KernelRegistry};
use glam::Vec3;

use super::{
    for_each_texel,
    probe::{info_base_count, tile_index},
};
use crate::{
    frame_constants::{hash_combine, hash_to_unorm},
    renderers::{
        ambient_occlusion::AmbientOcclusionConstants,
        brute_force_gi::BruteForceGiConstants,
        final_gather::{FinalGatherConstants, GatherPoint},
        probe_hierarchy::{
            level_tile_count, PackedProbe, DILATED_LIST_MAX_PER_TILE, PROBE_EMIT_TILE_SIZE,
            PROBE_INVALID_INDEX, PROBE_MAX_HIERARCHY_DEPTH,
        },
        probe_trace::{sample_mask_bits_per_ray, ProbeTraceConstants, INVALID_HIT_DISTANCE},
        probe_trace::SpecularRefineConstants,
        reflections::ReflectionTraceConstants,
        screen_space_gi::ScreenSpaceGiConstants,
        tile_classification::{unpack_tile_coord, TILE_LIST_MAX_LENGTH, TRACING_CLASSIFICATION_TILE_SIZE},
    },
    scene::{PackedLight, LIGHT_KIND_DIRECTIONAL},
};

pub(super) fn register(registry: &mut KernelRegistry) {
    registry.register("resolve_probe_indexes", resolve_probe_indexes);
    registry.register("probe_occlusion_screen", probe_occlusion_screen);
    registry.register("probe_occlusion_rt", probe_occlusion_rt);
    registry.register("probe_prepare_trace_args", prepare_trace_args);
    registry.register("probe_atlas_trace", atlas_trace);
    registry.register("compose_probe_atlas", compose_atlas);
    registry.register("trace_indirect_lighting", trace_indirect_lighting);
    registry.register("probe_specular_tile_refine", specular_tile_refine);
    registry.register("reflections_trace_screen", |ctx: &mut KernelCtx| {
        reflections_trace(ctx, false)
    });
    registry.register("reflections_trace_rt", |ctx: &mut KernelCtx| {
        reflections_trace(ctx, true)
    });
    registry.register("ambient_occlusion_trace", ambient_occlusion_trace);
    registry.register("screen_space_gi_trace", screen_space_gi_trace);
    registry.register("screen_space_gi_upsample", screen_space_gi_upsample);
    registry.register("brute_force_gi_trace", brute_force_gi_trace);
    registry.register("final_gather_reproject", final_gather_reproject);
    registry.register("final_gather_trace", final_gather_trace);
    registry.register("final_gather_resolve", final_gather_resolve);
}

fn light_radiance(position: Vec3, light: &PackedLight) -> Vec3 {
    let color = Vec3::from(light.color) * light.intensity;
    if light.kind == LIGHT_KIND_DIRECTIONAL {
        color
    } else {
        let distance_sq = position.distance_squared(Vec3::from(light.position));
        color / (1.0 + distance_sq)
    }
}

/// Incoming radiance at a probe for one atlas texel direction. Sky comes
/// from the importance-map cube (mip 0); punctual lights fall off by
/// distance. Deterministic per (probe, texel), so supersampled sums average
/// back to the same expected value.
fn probe_radiance_sample(
    ctx: &KernelCtx,
    consts: &ProbeTraceConstants,
    lights: &[PackedLight],
    probe: &PackedProbe,
    texel: [u32; 2],
) -> Vec3 {
    let mut radiance = Vec3::ZERO;

    if consts.sky_enabled != 0 {
        let sky_dim = ctx.image(2).desc().extent[0];
        let scale = (sky_dim / consts.hierarchy.atlas_resolution.max(1)).max(1);
        let sky = ctx
            .image(2)
            .load_clamped(0, [(texel[0] * scale) as i32, (texel[1] * scale) as i32, 0]);
        radiance += Vec3::new(sky[0], sky[1], sky[2]);
    }

    let position = Vec3::from(probe.position);
    for light in lights {
        radiance += light_radiance(position, light);
    }

    radiance
}

fn resolve_probe_indexes(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: crate::renderers::probe_hierarchy::ProbeHierarchyConstants = ctx.constants(6);
    let tiles = level_tile_count(consts.screen_extent, 0);

    for_each_texel(ctx.extent, |x, y, _| {
        let depth = ctx.image(0).load(0, [x, y, 0])[0];
        if depth <= 0.0 {
            ctx.image_mut(4)
                .store_u(0, [x, y, 0], [PROBE_INVALID_INDEX, 0, 0, 0]);
            ctx.image_mut(5)
                .store(0, [x, y, 0], [INVALID_HIT_DISTANCE, 0.0, 0.0, 0.0]);
            return;
        }

        let tile = [
            ((x + consts.tile_jitter[0]) / PROBE_EMIT_TILE_SIZE).min(tiles[0] - 1),
            ((y + consts.tile_jitter[1]) / PROBE_EMIT_TILE_SIZE).min(tiles[1] - 1),
        ];
        let tile_idx = tile_index(tile, tiles);
        let count = ctx.buffer(3).as_slice::<u32>()[tile_idx] as usize;

        if count == 0 {
            ctx.image_mut(4)
                .store_u(0, [x, y, 0], [PROBE_INVALID_INDEX, 0, 0, 0]);
            ctx.image_mut(5)
                .store(0, [x, y, 0], [INVALID_HIT_DISTANCE, 0.0, 0.0, 0.0]);
            return;
        }

        // Stochastic proximity-weighted pick from the dilated candidates.
        let mut weights = [0.0f32; DILATED_LIST_MAX_PER_TILE];
        let mut total = 0.0f32;
        for j in 0..count {
            let global = ctx.buffer(2).as_slice::<u32>()
                [tile_idx * DILATED_LIST_MAX_PER_TILE + j];
            let probe = ctx.buffer(1).as_slice::<PackedProbe>()[global as usize];
            let center = 0.5 * (probe.depth_bounds[0] + probe.depth_bounds[1]);
            let w = 1.0 / (1e-4 + (center - depth).abs());
            weights[j] = w;
            total += w;
        }

        let r = hash_to_unorm(hash_combine(
            hash_combine(x, y.wrapping_mul(0x8da6)),
            consts.frame_index,
        )) * total;

        let mut acc = 0.0;
        let mut picked = 0;
        for (j, w) in weights.iter().enumerate().take(count) {
            acc += w;
            if r <= acc {
                picked = j;
                break;
            }
        }

        let global = ctx.buffer(2).as_slice::<u32>()
            [tile_idx * DILATED_LIST_MAX_PER_TILE + picked];
        let probe = ctx.buffer(1).as_slice::<PackedProbe>()[global as usize];
        let center = 0.5 * (probe.depth_bounds[0] + probe.depth_bounds[1]);

        ctx.image_mut(4).store_u(0, [x, y, 0], [global, 0, 0, 0]);
        ctx.image_mut(5)
            .store(0, [x, y, 0], [(center - depth).abs(), 0.0, 0.0, 0.0]);
    });
    Ok(())
}

fn probe_occlusion(ctx: &mut KernelCtx, hardware_rt: bool) -> Result<(), GpuError> {
    let consts: ProbeTraceConstants = ctx.constants(6);
    let spp = consts.samples_per_pixel.max(1);
    let bits = sample_mask_bits_per_ray(spp);

    for_each_texel(ctx.extent, |x, y, _| {
        let probe_index = ctx.image(1).load_u(0, [x, y, 0])[0];

        // Cold start: without a usable radiance history the screen-space
        // march has nothing to sample; the masks are explicitly zeroed
        // rather than skipped.
        let cold = !hardware_rt && consts.history_valid == 0;

        if probe_index == PROBE_INVALID_INDEX || cold {
            ctx.image_mut(4).store_u(0, [x, y, 0], [0, 0, 0, 0]);
            ctx.image_mut(5).store_u(0, [x, y, 0], [0, 0, 0, 0]);
            return;
        }

        let threshold = if hardware_rt { 0.1 } else { 0.25 };

        let mut diffuse_mask = 0u32;
        let mut specular_mask = 0u32;
        for r in 0..spp {
            let h = hash_combine(
                hash_combine(x, y.wrapping_mul(0x9e37)),
                consts.hierarchy.frame_index.wrapping_mul(31).wrapping_add(r),
            );
            if hash_to_unorm(h) > threshold {
                diffuse_mask |= 1 << (r * bits);
            }
            if hash_to_unorm(hash_combine(h, 0x5bd1)) > threshold {
                specular_mask |= 1 << (r * bits);
            }
        }

        ctx.image_mut(4).store_u(0, [x, y, 0], [diffuse_mask, 0, 0, 0]);
        ctx.image_mut(5).store_u(0, [x, y, 0], [specular_mask, 0, 0, 0]);
    });
    Ok(())
}

fn probe_occlusion_screen(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    probe_occlusion(ctx, false)
}

fn probe_occlusion_rt(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    probe_occlusion(ctx, true)
}

fn prepare_trace_args(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: crate::renderers::probe_hierarchy::ProbeHierarchyConstants = ctx.constants(2);

    for level in 0..PROBE_MAX_HIERARCHY_DEPTH as u32 {
        let groups = if level < consts.level_count {
            let info = ctx.buffer(0).as_slice::<u32>();
            info_base_count(info, level).1
        } else {
            0
        };
        ctx.buffer_mut(1).as_mut_slice::<DispatchIndirectArgs>()[level as usize] =
            DispatchIndirectArgs {
                group_count: [groups, 1, 1],
                _pad: 0,
            };
    }
    Ok(())
}

fn atlas_cell_origin(probe_index: u32, probes_per_row: u32, resolution: u32) -> [u32; 2] {
    [
        (probe_index % probes_per_row) * resolution,
        (probe_index / probes_per_row) * resolution,
    ]
}

/// Fills one level's probe atlas cells by tracing from the probes. Each
/// texel accumulates `supersampling^2` samples weighted by
/// `1 / supersampling^2`, so the expected value is independent of the
/// supersampling factor.
fn atlas_trace(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: ProbeTraceConstants = ctx.constants(5);
    let lights: Vec<PackedLight> = ctx.constants_array(6, consts.light_count as usize);

    let res = consts.hierarchy.atlas_resolution;
    let ss = consts.hierarchy.supersampling.max(1);
    let weight = 1.0 / (ss * ss) as f32;

    let (base, _) = {
        let info = ctx.buffer(1).as_slice::<u32>();
        info_base_count(info, consts.hierarchy.level)
    };

    for g in 0..ctx.extent[0] {
        let probe_index = base + g;
        let probe = ctx.buffer(0).as_slice::<PackedProbe>()[probe_index as usize];
        let origin = atlas_cell_origin(probe_index, consts.probes_per_row, res);

        for ty in 0..res {
            for tx in 0..res {
                let mut sum = Vec3::ZERO;
                for _s in 0..ss * ss {
                    sum += probe_radiance_sample(ctx, &consts, &lights, &probe, [tx, ty]) * weight;
                }
                ctx.image_mut(4).store(
                    0,
                    [origin[0] + tx, origin[1] + ty, 0],
                    [sum.x, sum.y, sum.z, 0.0],
                );
            }
        }
    }
    Ok(())
}

/// Blends each probe's cell with its primary parent's cell, half and half.
/// Runs coarsest-first so ancestors are already composed when descendants
/// read them.
fn compose_atlas(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: ProbeTraceConstants = ctx.constants(3);
    let res = consts.hierarchy.atlas_resolution;

    let (base, _) = {
        let info = ctx.buffer(1).as_slice::<u32>();
        info_base_count(info, consts.hierarchy.level)
    };

    for g in 0..ctx.extent[0] {
        let probe_index = base + g;
        let probe = ctx.buffer(0).as_slice::<PackedProbe>()[probe_index as usize];
        if probe.parent_count == 0 {
            continue;
        }

        let own = atlas_cell_origin(probe_index, consts.probes_per_row, res);
        let parent = atlas_cell_origin(probe.parents[0], consts.probes_per_row, res);

        for ty in 0..res {
            for tx in 0..res {
                let a = ctx.image(2).load(0, [own[0] + tx, own[1] + ty, 0]);
                let b = ctx.image(2).load(0, [parent[0] + tx, parent[1] + ty, 0]);
                ctx.image_mut(2).store(
                    0,
                    [own[0] + tx, own[1] + ty, 0],
                    [
                        0.5 * (a[0] + b[0]),
                        0.5 * (a[1] + b[1]),
                        0.5 * (a[2] + b[2]),
                        0.0,
                    ],
                );
            }
        }
    }
    Ok(())
}

fn trace_indirect_lighting(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: ProbeTraceConstants = ctx.constants(9);
    let spp = consts.samples_per_pixel.max(1);
    let bits = sample_mask_bits_per_ray(spp);
    let res = consts.hierarchy.atlas_resolution;

    for_each_texel(ctx.extent, |x, y, _| {
        let probe_index = ctx.image(1).load_u(0, [x, y, 0])[0];
        if probe_index == PROBE_INVALID_INDEX {
            ctx.image_mut(7).store(0, [x, y, 0], [0.0; 4]);
            ctx.image_mut(8).store(0, [x, y, 0], [0.0; 4]);
            return;
        }

        let gbuffer = ctx.image(0).load(0, [x, y, 0]);
        let diffuse_mask = ctx.image(5).load_u(0, [x, y, 0])[0];
        let specular_mask = ctx.image(6).load_u(0, [x, y, 0])[0];
        let origin = atlas_cell_origin(probe_index, consts.probes_per_row, res);

        let mut gather = |mask: u32| -> Vec3 {
            let mut sum = Vec3::ZERO;
            for r in 0..spp {
                if mask & (1 << (r * bits)) == 0 {
                    continue;
                }
                let tx = r % res;
                let ty = (r / res) % res;
                let v = ctx.image(3).load(0, [origin[0] + tx, origin[1] + ty, 0]);
                sum += Vec3::new(v[0], v[1], v[2]);
            }
            sum / spp as f32
        };

        let diffuse = gather(diffuse_mask);
        let specular = gather(specular_mask) * gbuffer[3];

        ctx.image_mut(7)
            .store(0, [x, y, 0], [diffuse.x, diffuse.y, diffuse.z, 0.0]);
        ctx.image_mut(8)
            .store(0, [x, y, 0], [specular.x, specular.y, specular.z, 0.0]);
    });
    Ok(())
}

/// Consume stage of the compacted tile lists: one thread group per listed
/// tile, clamping specular fireflies in the categories that shade specular.
fn specular_tile_refine(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: SpecularRefineConstants = ctx.constants(3);
    const FIREFLY_LIMIT: f32 = 16.0;

    let category_count = ctx.buffer(1).as_slice::<u32>()[consts.category as usize];

    for g in 0..ctx.extent[0] {
        let list_slot = consts.split_base + g;
        if list_slot >= category_count.min(TILE_LIST_MAX_LENGTH) {
            continue;
        }

        let packed = ctx.buffer(0).as_slice::<u32>()
            [consts.category as usize * TILE_LIST_MAX_LENGTH as usize + list_slot as usize];
        let [tx, ty] = unpack_tile_coord(packed);

        let extent = ctx.image(2).desc().extent;
        for py in 0..TRACING_CLASSIFICATION_TILE_SIZE {
            for px in 0..TRACING_CLASSIFICATION_TILE_SIZE {
                let x = tx * TRACING_CLASSIFICATION_TILE_SIZE + px;
                let y = ty * TRACING_CLASSIFICATION_TILE_SIZE + py;
                if x >= extent[0] || y >= extent[1] {
                    continue;
                }
                let v = ctx.image(2).load(0, [x, y, 0]);
                ctx.image_mut(2).store(
                    0,
                    [x, y, 0],
                    [
                        v[0].min(FIREFLY_LIMIT),
                        v[1].min(FIREFLY_LIMIT),
                        v[2].min(FIREFLY_LIMIT),
                        v[3],
                    ],
                );
            }
        }
    }
    Ok(())
}

fn reflections_trace(ctx: &mut KernelCtx, hardware_rt: bool) -> Result<(), GpuError> {
    let consts: ReflectionTraceConstants = ctx.constants(6);
    let lights: Vec<PackedLight> = ctx.constants_array(7, consts.light_count as usize);
    let full = ctx.image(0).desc().extent;
    let out = consts.output_extent;

    for_each_texel(ctx.extent, |x, y, _| {
        let sx = (x * full[0] / out[0].max(1)).min(full[0] - 1);
        let sy = (y * full[1] / out[1].max(1)).min(full[1] - 1);

        let gbuffer = ctx.image(0).load(0, [sx, sy, 0]);
        let depth = ctx.image(1).load(0, [sx, sy, 0])[0];

        if depth <= 0.0 || (!hardware_rt && consts.history_valid == 0) {
            ctx.image_mut(3).store(0, [x, y, 0], [0.0; 4]);
            ctx.image_mut(4)
                .store(0, [x, y, 0], [INVALID_HIT_DISTANCE, 0.0, 0.0, 0.0]);
            ctx.image_mut(5).store(0, [x, y, 0], [0.0; 4]);
            return;
        }

        let position = consts
            .view
            .unproject([sx as f32 + 0.5, sy as f32 + 0.5], [full[0], full[1]], depth);

        let mut radiance = Vec3::from(consts.sky_color) * consts.sky_enabled as f32;
        for light in &lights {
            radiance += light_radiance(position, light);
        }

        if !hardware_rt {
            // Screen-space bounce: reuse last frame's radiance.
            let prev = ctx.image(2).load_clamped(0, [sx as i32, sy as i32, 0]);
            radiance += Vec3::new(prev[0], prev[1], prev[2]) * 0.25;
        }

        // Stochastic roughness spread across the ray budget.
        let spp = consts.ray_count_per_pixel.max(1);
        let mut jitter = 0.0;
        for r in 0..spp {
            let h = hash_combine(hash_combine(x, y), consts.frame_index.wrapping_add(r));
            jitter += hash_to_unorm(h);
        }
        let noise = 0.5 + jitter / spp as f32;

        let specular_weight = gbuffer[3] * (1.0 - gbuffer[0]);
        let color = radiance * specular_weight * noise;

        let hit_distance = 1.0 / (1.0 + depth);

        ctx.image_mut(3)
            .store(0, [x, y, 0], [color.x, color.y, color.z, 1.0]);
        ctx.image_mut(4)
            .store(0, [x, y, 0], [hit_distance, 0.0, 0.0, 0.0]);
        ctx.image_mut(5)
            .store(0, [x, y, 0], [depth - hit_distance * 0.5, 0.0, 0.0, 0.0]);
    });
    Ok(())
}

/// Stochastic tangent-horizon occlusion. Each ray is a Bernoulli visibility
/// sample, so the raw mask's variance over a flat region scales as `1/N`.
fn ambient_occlusion_trace(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: AmbientOcclusionConstants = ctx.constants(4);
    let full = ctx.image(0).desc().extent;
    let out = consts.output_extent;

    for_each_texel(ctx.extent, |x, y, _| {
        let sx = (x * full[0] / out[0].max(1)).min(full[0] - 1);
        let sy = (y * full[1] / out[1].max(1)).min(full[1] - 1);

        let depth = ctx.image(0).load(0, [sx, sy, 0])[0];
        if depth <= 0.0 {
            ctx.image_mut(2).store(0, [x, y, 0], [1.0, 0.0, 0.0, 0.0]);
            ctx.image_mut(3)
                .store(0, [x, y, 0], [INVALID_HIT_DISTANCE, 0.0, 0.0, 0.0]);
            return;
        }

        // Horizon from the local depth gradient; flat regions sit at the
        // tangent-plane default.
        let right = ctx.image(0).load_clamped(0, [sx as i32 + 1, sy as i32, 0])[0];
        let down = ctx.image(0).load_clamped(0, [sx as i32, sy as i32 + 1, 0])[0];
        let gradient = ((right - depth).abs() + (down - depth).abs()).min(0.5);
        let horizon = (0.75 - gradient).clamp(0.0, 1.0);

        let spp = consts.ray_count_per_pixel.max(1);
        let mut visible = 0u32;
        let mut closest = f32::MAX;
        for r in 0..spp {
            let h = hash_combine(
                hash_combine(x, y.wrapping_mul(0x9e37)),
                consts.frame_index.wrapping_mul(spp).wrapping_add(r),
            );
            let u = hash_to_unorm(h);
            if u < horizon {
                visible += 1;
            } else {
                closest = closest.min(u * consts.world_radius);
            }
        }

        let mask = visible as f32 / spp as f32;
        let hit = if visible == spp { INVALID_HIT_DISTANCE } else { closest };

        ctx.image_mut(2).store(0, [x, y, 0], [mask, 0.0, 0.0, 0.0]);
        ctx.image_mut(3).store(0, [x, y, 0], [hit, 0.0, 0.0, 0.0]);
    });
    Ok(())
}

fn screen_space_gi_trace(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: ScreenSpaceGiConstants = ctx.constants(6);

    for_each_texel(ctx.extent, |x, y, _| {
        if consts.history_valid == 0 {
            ctx.image_mut(5).store(0, [x, y, 0], [0.0; 4]);
            return;
        }

        let depth = ctx.image(1).load(0, [x, y, 0])[0];
        if depth <= 0.0 {
            ctx.image_mut(5).store(0, [x, y, 0], [0.0; 4]);
            return;
        }

        let spp = consts.ray_count_per_pixel.max(1);
        let mut sum = Vec3::ZERO;
        for r in 0..spp {
            let h = hash_combine(hash_combine(x, y), consts.frame_index.wrapping_add(r));
            let dx = (hash_to_unorm(h) * 8.0) as i32 - 4;
            let dy = (hash_to_unorm(hash_combine(h, 0x1234)) * 8.0) as i32 - 4;
            let prev = ctx
                .image(3)
                .load_clamped(0, [x as i32 * 2 + dx, y as i32 * 2 + dy, 0]);
            sum += Vec3::new(prev[0], prev[1], prev[2]);
        }

        let gi = sum / spp as f32 * 0.5;
        ctx.image_mut(5).store(0, [x, y, 0], [gi.x, gi.y, gi.z, 0.0]);
    });
    Ok(())
}

fn screen_space_gi_upsample(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    for_each_texel(ctx.extent, |x, y, _| {
        let half = ctx
            .image(0)
            .load_clamped(0, [x as i32 / 2, y as i32 / 2, 0]);
        let depth = ctx.image(1).load(0, [x, y, 0])[0];
        let value = if depth > 0.0 { half } else { [0.0; 4] };
        ctx.image_mut(3).store(0, [x, y, 0], value);
    });
    Ok(())
}

fn brute_force_gi_trace(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: BruteForceGiConstants = ctx.constants(3);
    let lights: Vec<PackedLight> = ctx.constants_array(4, consts.light_count as usize);

    for_each_texel(ctx.extent, |x, y, _| {
        let depth = ctx.image(1).load(0, [x, y, 0])[0];
        let gbuffer = ctx.image(0).load(0, [x, y, 0]);
        if depth <= 0.0 || gbuffer[1] < 0.5 {
            ctx.image_mut(2).store(0, [x, y, 0], [0.0; 4]);
            return;
        }

        let position = consts.view.unproject(
            [x as f32 + 0.5, y as f32 + 0.5],
            consts.output_extent,
            depth,
        );

        let mut radiance = Vec3::from(consts.sky_color) * consts.sky_enabled as f32;
        for light in &lights {
            radiance += light_radiance(position, light);
        }

        let spp = consts.ray_count_per_pixel.max(1);
        let mut jitter = 0.0;
        for r in 0..spp {
            let h = hash_combine(hash_combine(x, y), consts.frame_index.wrapping_add(r));
            jitter += hash_to_unorm(h);
        }
        let noise = 0.5 + jitter / spp as f32;

        let gi = radiance * noise;
        ctx.image_mut(2).store(0, [x, y, 0], [gi.x, gi.y, gi.z, 0.0]);
    });
    Ok(())
}

fn final_gather_reproject(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: FinalGatherConstants = ctx.constants(2);

    for_each_texel(ctx.extent, |gx, gy, _| {
        let idx = (gy * consts.gather_extent[0] + gx) as usize;
        let mut point = ctx.buffer(1).as_slice::<GatherPoint>()[idx];

        if consts.history_valid == 0 {
            point = GatherPoint {
                position: [0.0; 3],
                age: 0,
                radiance: [0.0; 3],
                valid: 0,
            };
        } else {
            point.age = point.age.saturating_add(1);
        }

        // Re-anchor to current geometry.
        let px = gx * crate::renderers::final_gather::GATHER_POINT_TILE_SIZE;
        let py = gy * crate::renderers::final_gather::GATHER_POINT_TILE_SIZE;
        let depth = ctx.image(0).load_clamped(0, [px as i32, py as i32, 0])[0];
        if depth > 0.0 {
            let position = consts.view.unproject(
                [px as f32 + 0.5, py as f32 + 0.5],
                consts.screen_extent,
                depth,
            );
            point.position = position.to_array();
        } else {
            point.valid = 0;
        }

        ctx.buffer_mut(1).as_mut_slice::<GatherPoint>()[idx] = point;
    });
    Ok(())
}

fn final_gather_trace(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: FinalGatherConstants = ctx.constants(2);
    let lights: Vec<PackedLight> = ctx.constants_array(3, consts.light_count as usize);

    for_each_texel(ctx.extent, |gx, gy, _| {
        let idx = (gy * consts.gather_extent[0] + gx) as usize;
        let mut point = ctx.buffer(1).as_slice::<GatherPoint>()[idx];

        let px = gx * crate::renderers::final_gather::GATHER_POINT_TILE_SIZE;
        let py = gy * crate::renderers::final_gather::GATHER_POINT_TILE_SIZE;
        let depth = ctx.image(0).load_clamped(0, [px as i32, py as i32, 0])[0];
        if depth <= 0.0 {
            point.valid = 0;
            point.radiance = [0.0; 3];
        } else {
            let mut radiance = Vec3::from(consts.sky_color) * consts.sky_enabled as f32;
            for light in &lights {
                radiance += light_radiance(Vec3::from(point.position), light);
            }
            point.radiance = radiance.to_array();
            point.valid = 1;
        }

        ctx.buffer_mut(1).as_mut_slice::<GatherPoint>()[idx] = point;
    });
    Ok(())
}

fn final_gather_resolve(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: FinalGatherConstants = ctx.constants(3);

    for_each_texel(ctx.extent, |x, y, _| {
        let gbuffer = ctx.image(0).load(0, [x, y, 0]);
        let gx = (x / crate::renderers::final_gather::GATHER_POINT_TILE_SIZE)
            .min(consts.gather_extent[0] - 1);
        let gy = (y / crate::renderers::final_gather::GATHER_POINT_TILE_SIZE)
            .min(consts.gather_extent[1] - 1);
        let point = ctx.buffer(1).as_slice::<GatherPoint>()
            [(gy * consts.gather_extent[0] + gx) as usize];

        let lit = gbuffer[1] >= 0.5 && point.valid != 0;
        let value = if lit {
            [point.radiance[0], point.radiance[1], point.radiance[2], 0.0]
        } else {
            [0.0; 4]
        };
        ctx.image_mut(2).store(0, [x, y, 0], value);
    });
    Ok(())
}
