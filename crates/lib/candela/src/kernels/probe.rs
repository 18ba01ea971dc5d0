use candela_gpu::{GpuError, KernelCtx, KernelRegistry};

use super::for_each_texel;
use crate::renderers::probe_hierarchy::{
    level_tile_count, PackedProbe, ProbeHierarchyConstants, ProjectedProbe,
    DILATED_LIST_MAX_PER_TILE, MAX_PARENT_PROBE_COUNT, PROBE_DEPTH_SPLIT_THRESHOLD,
    PROBE_EMIT_TILE_SIZE, PROBE_INVALID_INDEX, PROBE_MAX_EMIT_PER_TILE,
};

pub(super) fn register(registry: &mut KernelRegistry) {
    registry.register("probe_depth_bounds_init", depth_bounds_init);
    registry.register("probe_depth_bounds_reduce", depth_bounds_reduce);
    registry.register("probe_scatter_leaf", scatter_leaf);
    registry.register("probe_scatter_parent", scatter_parent);
    registry.register("probe_assign_offsets", assign_offsets);
    registry.register("probe_materialize", materialize);
    registry.register("probe_dilate", dilate);
    registry.register("probe_select_parents", select_parents);
}

pub(super) fn tile_index(tile: [u32; 2], tiles: [u32; 2]) -> usize {
    (tile[1] * tiles[0] + tile[0]) as usize
}

pub(super) fn info_base_count(info: &[u32], level: u32) -> (u32, u32) {
    (info[level as usize * 2], info[level as usize * 2 + 1])
}

fn depth_bounds_init(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: ProbeHierarchyConstants = ctx.constants(2);

    for_each_texel(ctx.extent, |tx, ty, _| {
        let mut min = f32::MAX;
        let mut max = 0.0f32;

        for py in 0..PROBE_EMIT_TILE_SIZE {
            for px in 0..PROBE_EMIT_TILE_SIZE {
                // The jittered tile grid: tile t covers the pixels that map
                // to t under (pixel + jitter) / tile_size.
                let x = (tx * PROBE_EMIT_TILE_SIZE + px) as i64 - consts.tile_jitter[0] as i64;
                let y = (ty * PROBE_EMIT_TILE_SIZE + py) as i64 - consts.tile_jitter[1] as i64;
                if x < 0
                    || y < 0
                    || x >= consts.screen_extent[0] as i64
                    || y >= consts.screen_extent[1] as i64
                {
                    continue;
                }
                let d = ctx.image(0).load(0, [x as u32, y as u32, 0])[0];
                if d > 0.0 {
                    min = min.min(d);
                    max = max.max(d);
                }
            }
        }

        if max <= 0.0 {
            min = 0.0;
        }
        ctx.image_mut(1).store(0, [tx, ty, 0], [min, max, 0.0, 0.0]);
    });
    Ok(())
}

/// 2x2 min/max reduction into the next mip. Bounds only ever widen going
/// coarser; a written bound is never tightened again.
fn depth_bounds_reduce(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: ProbeHierarchyConstants = ctx.constants(1);
    let dst_mip = consts.level as u16;
    let src_mip = dst_mip - 1;

    for_each_texel(ctx.extent, |tx, ty, _| {
        let mut min = f32::MAX;
        let mut max = 0.0f32;

        for dy in 0..2i32 {
            for dx in 0..2i32 {
                let src = ctx.image(0).load_clamped(
                    src_mip,
                    [tx as i32 * 2 + dx, ty as i32 * 2 + dy, 0],
                );
                if src[1] > 0.0 {
                    min = min.min(src[0]);
                    max = max.max(src[1]);
                }
            }
        }

        if max <= 0.0 {
            min = 0.0;
        }
        ctx.image_mut(0).store(dst_mip, [tx, ty, 0], [min, max, 0.0, 0.0]);
    });
    Ok(())
}

fn scatter_leaf(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let tiles = ctx.extent;

    for_each_texel(ctx.extent, |tx, ty, _| {
        let bounds = ctx.image(0).load(0, [tx, ty, 0]);
        let tile = tile_index([tx, ty], [tiles[0], tiles[1]]);

        let mut candidates: Vec<ProjectedProbe> = Vec::new();
        if bounds[1] > 0.0 {
            if bounds[1] - bounds[0] > PROBE_DEPTH_SPLIT_THRESHOLD {
                // Deep tiles emit a probe at each end of their depth range.
                let mid = 0.5 * (bounds[0] + bounds[1]);
                candidates.push(ProjectedProbe {
                    depth_bounds: [bounds[0], mid],
                });
                candidates.push(ProjectedProbe {
                    depth_bounds: [mid, bounds[1]],
                });
            } else {
                candidates.push(ProjectedProbe {
                    depth_bounds: [bounds[0], bounds[1]],
                });
            }
        }
        candidates.truncate(PROBE_MAX_EMIT_PER_TILE as usize);

        ctx.buffer_mut(1).as_mut_slice::<u32>()[tile] = candidates.len() as u32;
        for (k, candidate) in candidates.iter().enumerate() {
            ctx.buffer_mut(2).as_mut_slice::<ProjectedProbe>()
                [tile * PROBE_MAX_EMIT_PER_TILE as usize + k] = *candidate;
        }
    });
    Ok(())
}

/// Reduces 2x2 blocks of the finer level's candidates into parent
/// candidates, merging depth ranges that overlap within the level's
/// tolerance. Merging only ever shrinks the candidate set.
fn scatter_parent(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: ProbeHierarchyConstants = ctx.constants(5);
    let child_tiles = level_tile_count(consts.screen_extent, consts.level - 1);
    let merge_tolerance = PROBE_DEPTH_SPLIT_THRESHOLD * (1 << consts.level) as f32;
    let tiles = ctx.extent;

    for_each_texel(ctx.extent, |tx, ty, _| {
        let mut candidates: Vec<[f32; 2]> = Vec::new();

        for dy in 0..2 {
            for dx in 0..2 {
                let cx = tx * 2 + dx;
                let cy = ty * 2 + dy;
                if cx >= child_tiles[0] || cy >= child_tiles[1] {
                    continue;
                }
                let child = tile_index([cx, cy], child_tiles);
                let count = ctx.buffer(1).as_slice::<u32>()[child];
                for k in 0..count as usize {
                    let p = ctx.buffer(2).as_slice::<ProjectedProbe>()
                        [child * PROBE_MAX_EMIT_PER_TILE as usize + k];
                    candidates.push(p.depth_bounds);
                }
            }
        }

        candidates.sort_by(|a, b| a[0].total_cmp(&b[0]));

        let mut merged: Vec<[f32; 2]> = Vec::new();
        for range in candidates {
            match merged.last_mut() {
                Some(last) if range[0] <= last[1] + merge_tolerance => {
                    last[1] = last[1].max(range[1]);
                }
                _ => merged.push(range),
            }
        }
        merged.truncate(PROBE_MAX_EMIT_PER_TILE as usize);

        let tile = tile_index([tx, ty], [tiles[0], tiles[1]]);
        ctx.buffer_mut(3).as_mut_slice::<u32>()[tile] = merged.len() as u32;
        for (k, range) in merged.iter().enumerate() {
            ctx.buffer_mut(4).as_mut_slice::<ProjectedProbe>()
                [tile * PROBE_MAX_EMIT_PER_TILE as usize + k] = ProjectedProbe {
                depth_bounds: *range,
            };
        }
    });
    Ok(())
}

/// The per-level "assign offsets" step: per-tile counts become dense global
/// slots, and the level's [base, count] record lands in the hierarchy info
/// buffer. The walk is linear over tiles, which stands in for the GPU's
/// order-free atomic allocation; overflow past the probe budget is dropped
/// here and only here.
fn assign_offsets(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: ProbeHierarchyConstants = ctx.constants(3);
    let tiles = level_tile_count(consts.screen_extent, consts.level);
    let tile_total = (tiles[0] * tiles[1]) as usize;

    let base = if consts.level == 0 {
        0
    } else {
        let info = ctx.buffer(2).as_slice::<u32>();
        let (prev_base, prev_count) = info_base_count(info, consts.level - 1);
        prev_base + prev_count
    };

    let mut running = 0u32;
    for tile in 0..tile_total {
        let count = ctx.buffer(0).as_slice::<u32>()[tile];
        ctx.buffer_mut(1).as_mut_slice::<u32>()[tile] = base + running;
        running += count;
    }

    let clamped = running.min(consts.max_probe_count.saturating_sub(base));

    let info = ctx.buffer_mut(2).as_mut_slice::<u32>();
    info[consts.level as usize * 2] = base;
    info[consts.level as usize * 2 + 1] = clamped;
    Ok(())
}

/// Effective probe count of one tile after the global clamp.
pub(super) fn effective_tile_count(counts: u32, offset: u32, level_end: u32) -> u32 {
    counts.min(level_end.saturating_sub(offset))
}

fn materialize(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: ProbeHierarchyConstants = ctx.constants(5);
    let tiles = ctx.extent;
    let tile_size = PROBE_EMIT_TILE_SIZE << consts.level;

    let (base, count) = {
        let info = ctx.buffer(3).as_slice::<u32>();
        info_base_count(info, consts.level)
    };
    let level_end = base + count;

    for_each_texel(ctx.extent, |tx, ty, _| {
        let tile = tile_index([tx, ty], [tiles[0], tiles[1]]);
        let offset = ctx.buffer(2).as_slice::<u32>()[tile];
        let tile_count = ctx.buffer(1).as_slice::<u32>()[tile];
        let emitted = effective_tile_count(tile_count, offset, level_end);

        for k in 0..emitted as usize {
            let projected = ctx.buffer(0).as_slice::<ProjectedProbe>()
                [tile * PROBE_MAX_EMIT_PER_TILE as usize + k];

            let depth_center = 0.5 * (projected.depth_bounds[0] + projected.depth_bounds[1]);
            let pixel = [
                (tx * tile_size + tile_size / 2) as f32 - consts.tile_jitter[0] as f32,
                (ty * tile_size + tile_size / 2) as f32 - consts.tile_jitter[1] as f32,
            ];
            let position = consts
                .view
                .unproject(pixel, consts.screen_extent, depth_center);

            let probe = PackedProbe {
                position: position.to_array(),
                level: consts.level,
                tile_coord: [tx, ty],
                depth_bounds: projected.depth_bounds,
                parents: [PROBE_INVALID_INDEX; MAX_PARENT_PROBE_COUNT],
                parent_count: 0,
                sample_mask: 0,
                _pad: [0; 2],
            };

            ctx.buffer_mut(4).as_mut_slice::<PackedProbe>()[(offset + k as u32) as usize] = probe;
        }
    });
    Ok(())
}

fn dilate(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    use arrayvec::ArrayVec;

    let consts: ProbeHierarchyConstants = ctx.constants(7);
    let tiles = ctx.extent;
    let margin = 0.05 + consts.counter_parallax_error;

    let (base, count) = {
        let info = ctx.buffer(2).as_slice::<u32>();
        info_base_count(info, consts.level)
    };
    let level_end = base + count;

    for_each_texel(ctx.extent, |tx, ty, _| {
        let own_bounds = ctx
            .image(4)
            .load(consts.level as u16, [tx, ty, 0]);

        let tile = tile_index([tx, ty], [tiles[0], tiles[1]]);
        let mut list: ArrayVec<u32, DILATED_LIST_MAX_PER_TILE> = ArrayVec::new();

        'outer: for dy in -1..=1i32 {
            for dx in -1..=1i32 {
                let nx = tx as i32 + dx;
                let ny = ty as i32 + dy;
                if nx < 0 || ny < 0 || nx as u32 >= tiles[0] || ny as u32 >= tiles[1] {
                    continue;
                }
                let neighbor = tile_index([nx as u32, ny as u32], [tiles[0], tiles[1]]);
                let offset = ctx.buffer(1).as_slice::<u32>()[neighbor];
                let n_count = effective_tile_count(
                    ctx.buffer(0).as_slice::<u32>()[neighbor],
                    offset,
                    level_end,
                );

                for k in 0..n_count {
                    let global = offset + k;
                    let probe = ctx.buffer(3).as_slice::<PackedProbe>()[global as usize];

                    // HZB cull: a probe whose depth range misses the tile's
                    // own (expanded) range can't be seen by any pixel here.
                    let visible = own_bounds[1] > 0.0
                        && probe.depth_bounds[1] >= own_bounds[0] - margin
                        && probe.depth_bounds[0] <= own_bounds[1] + margin;

                    if visible {
                        list.push(global);
                        if list.len() == DILATED_LIST_MAX_PER_TILE {
                            break 'outer;
                        }
                    }
                }
            }
        }

        ctx.buffer_mut(6).as_mut_slice::<u32>()[tile] = list.len() as u32;
        for (j, global) in list.iter().enumerate() {
            ctx.buffer_mut(5).as_mut_slice::<u32>()[tile * DILATED_LIST_MAX_PER_TILE + j] =
                *global;
        }
    });
    Ok(())
}

/// Greedy parent assignment against the next-coarser level's dilated
/// candidates: reject candidates whose depth drifts past the
/// counter-parallax-error tolerance, take the closest survivors.
fn select_parents(ctx: &mut KernelCtx) -> Result<(), GpuError> {
    let consts: ProbeHierarchyConstants = ctx.constants(6);
    let tiles = ctx.extent;
    let parent_tiles = level_tile_count(consts.screen_extent, consts.level + 1);

    let (base, count) = {
        let info = ctx.buffer(0).as_slice::<u32>();
        info_base_count(info, consts.level)
    };
    let level_end = base + count;

    for_each_texel(ctx.extent, |tx, ty, _| {
        let tile = tile_index([tx, ty], [tiles[0], tiles[1]]);
        let offset = ctx.buffer(1).as_slice::<u32>()[tile];
        let emitted = effective_tile_count(
            ctx.buffer(2).as_slice::<u32>()[tile],
            offset,
            level_end,
        );

        let parent_tile = [
            (tx / 2).min(parent_tiles[0] - 1),
            (ty / 2).min(parent_tiles[1] - 1),
        ];
        let parent_tile_idx = tile_index(parent_tile, parent_tiles);
        let candidate_count =
            ctx.buffer(4).as_slice::<u32>()[parent_tile_idx] as usize;

        for k in 0..emitted {
            let child_idx = (offset + k) as usize;
            let child = ctx.buffer(5).as_slice::<PackedProbe>()[child_idx];
            let child_depth = 0.5 * (child.depth_bounds[0] + child.depth_bounds[1]);

            let mut accepted: Vec<(f32, u32)> = Vec::new();
            for j in 0..candidate_count {
                let candidate = ctx.buffer(3).as_slice::<u32>()
                    [parent_tile_idx * DILATED_LIST_MAX_PER_TILE + j];
                let parent = ctx.buffer(5).as_slice::<PackedProbe>()[candidate as usize];
                let parent_depth = 0.5 * (parent.depth_bounds[0] + parent.depth_bounds[1]);

                if (child_depth - parent_depth).abs() > consts.counter_parallax_error {
                    continue;
                }

                let delta = glam::Vec3::from(child.position)
                    .distance(glam::Vec3::from(parent.position));
                accepted.push((delta, candidate));
            }

            accepted.sort_by(|a, b| a.0.total_cmp(&b.0));
            accepted.truncate(MAX_PARENT_PROBE_COUNT);

            let mut updated = child;
            updated.parents = [PROBE_INVALID_INDEX; MAX_PARENT_PROBE_COUNT];
            for (slot, (_, idx)) in accepted.iter().enumerate() {
                updated.parents[slot] = *idx;
            }
            updated.parent_count = accepted.len() as u32;

            ctx.buffer_mut(5).as_mut_slice::<PackedProbe>()[child_idx] = updated;
        }
    });
    Ok(())
}
