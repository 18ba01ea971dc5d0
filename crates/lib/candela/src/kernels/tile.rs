use candela_gpu::{DispatchIndirectArgs, GpuError, KernelCtx, KernelRegistry};

use super::for_each_texel;
use crate::renderers::tile_classification::{
    pack_tile_coord, TileCategory, TileClassifyConstants, TileDispatchArgsConstants,
    ATOMIC_TILE_SIZE, TILE_CATEGORY_COUNT, TILE_LIST_MAX_LENGTH,
    TRACING_CLASSIFICATION_TILE_SIZE,
};

pub(super) fn register(registry: &mut KernelRegistry) {
    registry.register("tile_classify", tile_classify);
    registry.register("tile_classify_assign_offsets", assign_offsets);
    registry.register("tile_classify_build_lists", build_lists);
    registry.register("tile_classify_dispatch_args", dispatch_args);
}

fn atomic_tile_of(tile: [u32; 2]) -> [u32; 2] {
    [tile[0] / ATOMIC_TILE_SIZE, tile[1] / ATOMIC_TILE_SIZE]
}

fn counter_index(consts: &TileClassifyConstants, atomic_tile: [u32; 2], category: u32) -> usize {
    ((atomic_tile[1] * consts.atomic_tile_count[0] + atomic_tile[0]) as usize)
        * TILE_CATEGORY_COUNT
        + category as usize
}

/// Stage 1: one classification per tile, plus per-atomic-tile category
/// counters. Counters model the GPU's monotonic atomic increments as a
/// deterministic count pass.
fn tile_classify(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: TileClassifyConstants = ctx.constants(4);

    for_each_texel(ctx.extent, |tx, ty, _| {
        let mut max_model = 0.0f32;
        let mut any_bent = false;
        let mut any_specular = false;
        let mut depth_max = 0.0f32;
        let mut roughness_min = 1.0f32;

        for py in 0..TRACING_CLASSIFICATION_TILE_SIZE {
            for px in 0..TRACING_CLASSIFICATION_TILE_SIZE {
                let x = tx * TRACING_CLASSIFICATION_TILE_SIZE + px;
                let y = ty * TRACING_CLASSIFICATION_TILE_SIZE + py;
                if x >= consts.screen_extent[0] || y >= consts.screen_extent[1] {
                    continue;
                }
                let depth = ctx.image(0).load(0, [x, y, 0])[0];
                let gbuffer = ctx.image(1).load(0, [x, y, 0]);

                depth_max = depth_max.max(depth);
                if depth > 0.0 {
                    max_model = max_model.max(gbuffer[1]);
                    any_bent |= gbuffer[2] > 0.5;
                    any_specular |= gbuffer[3] > 0.5;
                    roughness_min = roughness_min.min(gbuffer[0]);
                }
            }
        }

        let category = if depth_max <= 0.0 || max_model < 0.5 {
            TileCategory::Unlit
        } else if max_model < 1.5 {
            TileCategory::DefaultLitOnly
        } else if max_model < 2.5 {
            if any_bent {
                TileCategory::SimpleShadingBentNormal
            } else if any_specular {
                TileCategory::SimpleShadingSpecular
            } else {
                TileCategory::SimpleShading
            }
        } else {
            TileCategory::ComplexShadingBentNormal
        };

        let summary = ((depth_max.clamp(0.0, 1.0) * 65535.0) as u32) << 16
            | ((roughness_min.clamp(0.0, 1.0) * 255.0) as u32) << 8
            | (max_model as u32);

        ctx.image_mut(2)
            .store_u(0, [tx, ty, 0], [category as u32, summary, 0, 0]);

        let idx = counter_index(&consts, atomic_tile_of([tx, ty]), category as u32);
        ctx.buffer_mut(3).as_mut_slice::<u32>()[idx] += 1;
    });
    Ok(())
}

/// Stage 2: fold atomic-tile counts into the global per-category counters,
/// recording each atomic tile's pre-add value as its base offset. The
/// reference model walks atomic tiles in linear order, which makes the
/// compaction bit-for-bit reproducible.
fn assign_offsets(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: TileClassifyConstants = ctx.constants(3);
    let atomic_tiles = (consts.atomic_tile_count[0] * consts.atomic_tile_count[1]) as usize;

    let mut totals = [0u32; TILE_CATEGORY_COUNT];
    for tile in 0..atomic_tiles {
        for category in 0..TILE_CATEGORY_COUNT {
            let idx = tile * TILE_CATEGORY_COUNT + category;
            let count = ctx.buffer(0).as_slice::<u32>()[idx];
            ctx.buffer_mut(1).as_mut_slice::<u32>()[idx] = totals[category];
            totals[category] += count;
        }
    }

    ctx.buffer_mut(2).as_mut_slice::<u32>()[..TILE_CATEGORY_COUNT].copy_from_slice(&totals);
    Ok(())
}

/// Stage 3: scatter tile coordinates into the flat per-category lists. Tiles
/// past `TILE_LIST_MAX_LENGTH` are dropped on the floor, by design.
fn build_lists(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: TileClassifyConstants = ctx.constants(3);

    // Thread-local running counters, one per atomic tile and category.
    let atomic_tiles = (consts.atomic_tile_count[0] * consts.atomic_tile_count[1]) as usize;
    let mut local = vec![0u32; atomic_tiles * TILE_CATEGORY_COUNT];

    for_each_texel(ctx.extent, |tx, ty, _| {
        let category = ctx.image(0).load_u(0, [tx, ty, 0])[0];
        let idx = counter_index(&consts, atomic_tile_of([tx, ty]), category);

        let base = ctx.buffer(1).as_slice::<u32>()[idx];
        let slot = base + local[idx];
        local[idx] += 1;

        if slot < TILE_LIST_MAX_LENGTH {
            let list_idx = category as usize * TILE_LIST_MAX_LENGTH as usize + slot as usize;
            ctx.buffer_mut(2).as_mut_slice::<u32>()[list_idx] = pack_tile_coord(tx, ty);
        }
    });
    Ok(())
}

/// Stage 4 prologue: per-category indirect dispatch records, split so no
/// physical dispatch exceeds the per-axis group bound. Categories with zero
/// tiles still get a record; its zero group count makes the consume dispatch
/// a guaranteed no-op.
fn dispatch_args(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: TileDispatchArgsConstants = ctx.constants(2);

    for category in 0..TILE_CATEGORY_COUNT {
        let count = ctx.buffer(0).as_slice::<u32>()[category].min(TILE_LIST_MAX_LENGTH);
        for split in 0..consts.dispatch_splits {
            let base = split * consts.max_tile_per_dispatch;
            let groups = count.saturating_sub(base).min(consts.max_tile_per_dispatch);
            let record = DispatchIndirectArgs {
                group_count: [groups, 1, 1],
                _pad: 0,
            };
            let idx = category * consts.dispatch_splits as usize + split as usize;
            ctx.buffer_mut(1).as_mut_slice::<DispatchIndirectArgs>()[idx] = record;
        }
    }
    Ok(())
}
