use candela_gpu::{GpuError, KernelCtx, KernelRegistry};
use candela_rg::{permuted_kernel_name, KernelPermutation};

use super::for_each_texel;
use crate::renderers::composite::{
    CompositeBlendMode, CompositeConstants, CompositePermutation,
};

pub(super) fn register(registry: &mut KernelRegistry) {
    // One registered kernel per compiled permutation; non-canonical vectors
    // never exist here because the invocation layer remaps before lookup.
    for permutation in CompositePermutation::compiled_variants() {
        registry.register(
            permuted_kernel_name("composite_indirect", permutation),
            move |ctx: &mut KernelCtx| composite(ctx, permutation),
        );
    }
}

fn composite(ctx: &mut KernelCtx, permutation: CompositePermutation) -> Result<(), GpuError> {
    let consts: CompositeConstants = ctx.constants(6);
    let blend_mode = permutation.blend_mode();

    for_each_texel(ctx.extent, |x, y, _| {
        let diffuse = ctx.image(0).load_clamped(0, [x as i32, y as i32, 0]);
        let specular = ctx.image(1).load_clamped(0, [x as i32, y as i32, 0]);

        let mut indirect = [
            diffuse[0] + specular[0],
            diffuse[1] + specular[1],
            diffuse[2] + specular[2],
        ];

        if permutation.sky_light {
            let sky = ctx.image(3).load_clamped(0, [x as i32, y as i32, 0]);
            for c in 0..3 {
                indirect[c] += sky[c];
            }
        }

        if (permutation.has_box_captures || permutation.has_sphere_captures)
            && consts.capture_count > 0
        {
            let capture = ctx.image(4).load_clamped(0, [x as i32, y as i32, 0]);
            for c in 0..3 {
                indirect[c] += capture[c] * 0.1;
            }
        }

        // The AO permutation pre-multiplies the whole indirect term; the
        // non-AO permutation must stay purely additive or a separately
        // composited specular pass would be darkened twice.
        let occlusion = match blend_mode {
            CompositeBlendMode::PremultipliedAlpha => {
                ctx.image(2).load_clamped(0, [x as i32, y as i32, 0])[0]
            }
            CompositeBlendMode::Additive => 1.0,
        };

        let scene = ctx.image(5).load(0, [x, y, 0]);
        ctx.image_mut(5).store(
            0,
            [x, y, 0],
            [
                scene[0] + indirect[0] * occlusion,
                scene[1] + indirect[1] * occlusion,
                scene[2] + indirect[2] * occlusion,
                scene[3],
            ],
        );
    });
    Ok(())
}
