use candela_gpu::{GpuError, KernelCtx, KernelRegistry};

use super::for_each_texel;
use crate::renderers::{
    reflection_captures::CaptureSlotConstants,
    sky::{SkyCubeConstants, SkyMipTreeConstants},
};

pub(super) fn register(registry: &mut KernelRegistry) {
    registry.register("sky_cube", sky_cube);
    registry.register("convolve_cube", convolve_cube);
    registry.register("sky_mip_tree_init", mip_tree_init);
    registry.register("sky_mip_tree_reduce", mip_tree_reduce);
    registry.register("sky_light_trace", sky_light_trace);
    registry.register("capture_array_remap_copy", capture_array_remap_copy);
    registry.register("capture_update_slot", capture_update_slot);
}

fn sky_cube(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: SkyCubeConstants = ctx.constants(1);
    for_each_texel(ctx.extent, |x, y, face| {
        ctx.image_mut(0).store(
            0,
            [x, y, face],
            [consts.color[0], consts.color[1], consts.color[2], 1.0],
        );
    });
    Ok(())
}

fn convolve_cube(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let src_width = ctx.image(0).desc().extent[0];
    let inv_texels = 1.0 / (src_width * src_width) as f32;

    for_each_texel(ctx.extent, |x, y, face| {
        // Diffuse convolution of one face; uniform skies stay uniform.
        let mut sum = [0.0f32; 4];
        for sy in 0..src_width {
            for sx in 0..src_width {
                let v = ctx.image(0).load(0, [sx, sy, face]);
                for c in 0..4 {
                    sum[c] += v[c];
                }
            }
        }
        for c in &mut sum {
            *c *= inv_texels;
        }
        ctx.image_mut(1).store(0, [x, y, face], sum);
    });
    Ok(())
}

fn luminance(v: [f32; 4]) -> f32 {
    0.2126 * v[0] + 0.7152 * v[1] + 0.0722 * v[2]
}

fn mip_tree_init(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    for_each_texel(ctx.extent, |x, y, face| {
        let v = ctx.image(0).load(0, [x, y, face]);
        ctx.image_mut(1).store(0, [x, y, face], v);
        ctx.image_mut(2)
            .store(0, [x, y, face], [luminance(v), 0.0, 0.0, 0.0]);
    });
    Ok(())
}

/// One level of the importance mip tree: color averages down, the PDF sums
/// so every level integrates to the same total.
fn mip_tree_reduce(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: SkyMipTreeConstants = ctx.constants(2);
    let dst = consts.mip as u16;
    let src = dst - 1;

    for_each_texel(ctx.extent, |x, y, face| {
        let mut color = [0.0f32; 4];
        let mut pdf = 0.0f32;
        for dy in 0..2i32 {
            for dx in 0..2i32 {
                let v = ctx
                    .image(0)
                    .load_clamped(src, [x as i32 * 2 + dx, y as i32 * 2 + dy, face as i32]);
                for c in 0..4 {
                    color[c] += 0.25 * v[c];
                }
                pdf += ctx
                    .image(1)
                    .load_clamped(src, [x as i32 * 2 + dx, y as i32 * 2 + dy, face as i32])[0];
            }
        }
        ctx.image_mut(0).store(dst, [x, y, face], color);
        ctx.image_mut(1).store(dst, [x, y, face], [pdf, 0.0, 0.0, 0.0]);
    });
    Ok(())
}

fn sky_light_trace(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: crate::render_passes::SkyLightTraceConstants = ctx.constants(3);

    for_each_texel(ctx.extent, |x, y, _| {
        let gbuffer = ctx.image(0).load(0, [x, y, 0]);
        let lit = consts.enabled != 0 && gbuffer[1] >= 0.5;

        let value = if lit {
            let sky = ctx.image(1).load(0, [0, 0, 0]);
            // Hemisphere integral of a uniform sky against a lambertian
            // surface.
            [sky[0] * 0.5, sky[1] * 0.5, sky[2] * 0.5, 0.0]
        } else {
            [0.0; 4]
        };

        ctx.image_mut(2).store(0, [x, y, 0], value);
    });
    Ok(())
}

fn capture_array_remap_copy(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: CaptureSlotConstants = ctx.constants(2);

    for_each_texel(ctx.extent, |x, y, face| {
        let v = ctx
            .image(0)
            .load(0, [x, y, consts.src_slot * 6 + face]);
        ctx.image_mut(1).store(0, [x, y, consts.slot * 6 + face], v);
    });
    Ok(())
}

fn capture_update_slot(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: CaptureSlotConstants = ctx.constants(1);

    for_each_texel(ctx.extent, |x, y, face| {
        ctx.image_mut(0).store(
            0,
            [x, y, consts.slot * 6 + face],
            [consts.color[0], consts.color[1], consts.color[2], 1.0],
        );
    });
    Ok(())
}
