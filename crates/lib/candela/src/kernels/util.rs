use candela_gpu::{GpuError, KernelCtx, KernelRegistry};
use candela_rg::imageops::ClearColorConstants;

use super::for_each_texel;

pub(super) fn register(registry: &mut KernelRegistry) {
    registry.register("imageops::clear_color", clear_color);
    registry.register("imageops::clear_depth", clear_depth);
    registry.register("half_res::extract_view_normal", extract_view_normal);
    registry.register("half_res::extract_depth", extract_depth);
    registry.register("reprojection::calculate", reprojection_calculate);
    registry.register("combine_specular", combine_specular);
    registry.register("compress_gbuffer_aux", compress_gbuffer_aux);
}

fn clear_color(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: ClearColorConstants = ctx.constants(1);
    let img = ctx.image_mut(0);
    if img.desc().format.is_uint() {
        img.fill_u(consts.value[0] as u32);
    } else {
        img.fill(consts.value);
    }
    Ok(())
}

fn clear_depth(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    ctx.image_mut(0).fill([0.0; 4]);
    Ok(())
}

fn extract_view_normal(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    for_each_texel(ctx.extent, |x, y, _| {
        let v = ctx.image(0).load_clamped(0, [x as i32 * 2, y as i32 * 2, 0]);
        ctx.image_mut(1).store(0, [x, y, 0], v);
    });
    Ok(())
}

fn extract_depth(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    for_each_texel(ctx.extent, |x, y, _| {
        let d = ctx.image(0).load_clamped(0, [x as i32 * 2, y as i32 * 2, 0]);
        ctx.image_mut(1).store(0, [x, y, 0], d);
    });
    Ok(())
}

fn reprojection_calculate(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    use crate::renderers::reprojection::ReprojectionConstants;
    let consts: ReprojectionConstants = ctx.constants(3);
    let [w, h, _] = ctx.extent;

    for_each_texel(ctx.extent, |x, y, _| {
        let depth = ctx.image(0).load(0, [x, y, 0])[0];
        let velocity = ctx.image(1).load(0, [x, y, 0]);

        let prev_u = (x as f32 + 0.5) / w as f32 - velocity[0];
        let prev_v = (y as f32 + 0.5) / h as f32 - velocity[1];

        let on_screen = (0.0..1.0).contains(&prev_u) && (0.0..1.0).contains(&prev_v);
        let validity = if consts.history_valid != 0 && on_screen && depth > 0.0 {
            1.0
        } else {
            0.0
        };

        ctx.image_mut(2)
            .store(0, [x, y, 0], [prev_u, prev_v, validity, 0.0]);
    });
    Ok(())
}

fn combine_specular(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    for_each_texel(ctx.extent, |x, y, _| {
        let a = ctx.image(0).load_clamped(0, [x as i32, y as i32, 0]);
        let b = ctx.image(1).load_clamped(0, [x as i32, y as i32, 0]);
        ctx.image_mut(2)
            .store(0, [x, y, 0], [a[0] + b[0], a[1] + b[1], a[2] + b[2], 0.0]);
    });
    Ok(())
}

fn compress_gbuffer_aux(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    for_each_texel(ctx.extent, |x, y, _| {
        let summary = ctx.image(0).load_u(0, [x, y, 0]);
        let depth = (summary[1] >> 16) as f32 / 65535.0;
        let shading_model = summary[1] & 0xff;
        ctx.image_mut(1).store(0, [x, y, 0], [depth, 0.0, 0.0, 0.0]);
        ctx.image_mut(2).store_u(0, [x, y, 0], [shading_model, 0, 0, 0]);
    });
    Ok(())
}
