use candela_gpu::{GpuError, KernelCtx, KernelRegistry};

use super::for_each_texel;
use crate::renderers::denoiser::{DenoiseSpatialConstants, DenoiseTemporalConstants};

pub(super) fn register(registry: &mut KernelRegistry) {
    registry.register("denoise_temporal", temporal);
    registry.register("denoise_spatial", spatial);
    registry.register("denoise_shadow_prefilter", shadow_prefilter);
    registry.register("denoise_reflections_reconstruct", reflections_reconstruct);
    registry.register("denoise_ao_reconstruct", ao_reconstruct);
    registry.register("denoise_penumbra_harmonics", penumbra_harmonics);
    registry.register("denoise_probe_hierarchy_prefilter", probe_hierarchy_prefilter);
}

/// Exponential temporal accumulation against reprojected history. With no
/// valid history the output restarts from the current input and the stored
/// history term restarts from it too; stale contents are never blended in.
fn temporal(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: DenoiseTemporalConstants = ctx.constants(5);
    let channels = ctx.image(0).desc().format.channel_count();

    for_each_texel(ctx.extent, |x, y, _| {
        let input = ctx.image(0).load(0, [x, y, 0]);
        let reprojection = ctx
            .image(2)
            .load_clamped(0, [x as i32, y as i32, 0]);

        let validity = if consts.history_valid != 0 {
            reprojection[2]
        } else {
            0.0
        };

        let mut out = [0.0f32; 4];
        if validity > 0.0 {
            let history = ctx.image(1).load(0, [x, y, 0]);
            let blend = consts.blend_factor * validity;
            for c in 0..channels {
                out[c] = input[c] * (1.0 - blend) + history[c] * blend;
            }
        } else {
            out[..channels].copy_from_slice(&input[..channels]);
        }

        ctx.image_mut(3).store(0, [x, y, 0], out);
        ctx.image_mut(4).store(0, [x, y, 0], out);
    });
    Ok(())
}

/// Depth-guided box reconstruction.
fn spatial(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: DenoiseSpatialConstants = ctx.constants(3);
    let radius = consts.kernel_radius.max(1) as i32 * consts.step_size.max(1) as i32;
    let channels = ctx.image(0).desc().format.channel_count();

    let input_extent = ctx.image(0).desc().extent;
    let depth_extent = ctx.image(1).desc().extent;
    let scale_x = (depth_extent[0] / input_extent[0].max(1)).max(1);
    let scale_y = (depth_extent[1] / input_extent[1].max(1)).max(1);

    for_each_texel(ctx.extent, |x, y, _| {
        let center_depth = ctx
            .image(1)
            .load_clamped(0, [(x * scale_x) as i32, (y * scale_y) as i32, 0])[0];

        let mut sum = [0.0f32; 4];
        let mut weight = 0.0f32;

        for dy in (-radius..=radius).step_by(consts.step_size.max(1) as usize) {
            for dx in (-radius..=radius).step_by(consts.step_size.max(1) as usize) {
                let sx = x as i32 + dx;
                let sy = y as i32 + dy;
                let sample_depth = ctx.image(1).load_clamped(
                    0,
                    [(sx * scale_x as i32).max(0), (sy * scale_y as i32).max(0), 0],
                )[0];

                if (sample_depth - center_depth).abs() > 0.1 {
                    continue;
                }

                let v = ctx.image(0).load_clamped(0, [sx, sy, 0]);
                for c in 0..channels {
                    sum[c] += v[c];
                }
                weight += 1.0;
            }
        }

        let mut out = [0.0f32; 4];
        if weight > 0.0 {
            for c in 0..channels {
                out[c] = sum[c] / weight;
            }
        }
        ctx.image_mut(2).store(0, [x, y, 0], out);
    });
    Ok(())
}

fn shadow_prefilter(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    for_each_texel(ctx.extent, |x, y, _| {
        let penumbra = ctx.image(0).load(0, [x, y, 0])[0];
        let closest = ctx.image(1).load_clamped(0, [x as i32, y as i32, 0])[0];
        // Negative occluder distance is the "nothing hit" sentinel.
        let occluded = if closest < 0.0 { 0.0 } else { 1.0 };
        ctx.image_mut(2)
            .store(0, [x, y, 0], [penumbra, occluded * closest.max(0.0), 0.0, 0.0]);
    });
    Ok(())
}

/// Hit-distance-aware gather for the reflections signal: neighbors whose
/// rays hit at wildly different distances belong to different reflectors
/// and are excluded.
fn reflections_reconstruct(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: DenoiseSpatialConstants = ctx.constants(5);
    let radius = consts.kernel_radius.max(1) as i32;

    for_each_texel(ctx.extent, |x, y, _| {
        let center_hit = ctx.image(1).load(0, [x, y, 0])[0];

        let mut sum = [0.0f32; 4];
        let mut weight = 0.0f32;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let sx = x as i32 + dx;
                let sy = y as i32 + dy;
                let hit = ctx.image(1).load_clamped(0, [sx, sy, 0])[0];
                if center_hit >= 0.0 && hit >= 0.0 && (hit - center_hit).abs() > 0.5 {
                    continue;
                }
                let v = ctx.image(0).load_clamped(0, [sx, sy, 0]);
                for c in 0..4 {
                    sum[c] += v[c];
                }
                weight += 1.0;
            }
        }

        let mut out = [0.0f32; 4];
        if weight > 0.0 {
            for c in 0..4 {
                out[c] = sum[c] / weight;
            }
        }
        ctx.image_mut(4).store(0, [x, y, 0], out);
    });
    Ok(())
}

fn ao_reconstruct(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: DenoiseSpatialConstants = ctx.constants(3);
    let radius = consts.kernel_radius.max(1) as i32;

    for_each_texel(ctx.extent, |x, y, _| {
        let mut sum = 0.0f32;
        let mut weight = 0.0f32;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let v = ctx
                    .image(0)
                    .load_clamped(0, [x as i32 + dx, y as i32 + dy, 0])[0];
                sum += v;
                weight += 1.0;
            }
        }
        ctx.image_mut(2)
            .store(0, [x, y, 0], [sum / weight, 0.0, 0.0, 0.0]);
    });
    Ok(())
}

/// Collapses the 4+1 harmonic bands into a single penumbra estimate with
/// fixed per-band weights.
fn penumbra_harmonics(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    const BAND_WEIGHTS: [f32; 5] = [1.0, 0.5, 0.25, 0.125, 0.0625];
    let total: f32 = BAND_WEIGHTS.iter().sum();

    for_each_texel(ctx.extent, |x, y, _| {
        let mut sum = [0.0f32; 4];
        for (band, weight) in BAND_WEIGHTS.iter().enumerate() {
            let v = ctx.image(band).load_clamped(0, [x as i32, y as i32, 0]);
            for c in 0..4 {
                sum[c] += v[c] * weight;
            }
        }
        for c in &mut sum {
            *c /= total;
        }
        ctx.image_mut(5).store(0, [x, y, 0], sum);
    });
    Ok(())
}

/// Edge-aware 3x3 prefilter keyed on the probe hierarchy's compressed
/// shading-model summary: samples from tiles with a different dominant
/// shading model don't bleed across.
fn probe_hierarchy_prefilter(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    use crate::renderers::tile_classification::TRACING_CLASSIFICATION_TILE_SIZE;
    let channels = ctx.image(0).desc().format.channel_count();
    let aux_extent = ctx.image(2).desc().extent;

    for_each_texel(ctx.extent, |x, y, _| {
        let tile = [
            (x / TRACING_CLASSIFICATION_TILE_SIZE).min(aux_extent[0] - 1),
            (y / TRACING_CLASSIFICATION_TILE_SIZE).min(aux_extent[1] - 1),
        ];
        let center_model = ctx.image(2).load_u(0, [tile[0], tile[1], 0])[0];

        let mut sum = [0.0f32; 4];
        let mut weight = 0.0f32;
        for dy in -1..=1i32 {
            for dx in -1..=1i32 {
                let sx = x as i32 + dx;
                let sy = y as i32 + dy;
                let stile = [
                    ((sx.max(0) as u32) / TRACING_CLASSIFICATION_TILE_SIZE)
                        .min(aux_extent[0] - 1),
                    ((sy.max(0) as u32) / TRACING_CLASSIFICATION_TILE_SIZE)
                        .min(aux_extent[1] - 1),
                ];
                if ctx.image(2).load_u(0, [stile[0], stile[1], 0])[0] != center_model {
                    continue;
                }
                let v = ctx.image(0).load_clamped(0, [sx, sy, 0]);
                for c in 0..channels {
                    sum[c] += v[c];
                }
                weight += 1.0;
            }
        }

        let mut out = [0.0f32; 4];
        if weight > 0.0 {
            for c in 0..channels {
                out[c] = sum[c] / weight;
            }
        }
        ctx.image_mut(3).store(0, [x, y, 0], out);
    });
    Ok(())
}
