use bytemuck::{Pod, Zeroable};
use candela_gpu::{BufferDesc, BufferUsageFlags, Format, ImageDesc};
use candela_rg::{self as rg, SimpleComputePass};

use super::GbufferDepth;
use crate::{
    frame_constants::ViewConstants,
    settings::RenderSettings,
};

/// Edge length in pixels of a level-0 probe emit tile; level L tiles are
/// `PROBE_EMIT_TILE_SIZE << L` pixels wide.
pub const PROBE_EMIT_TILE_SIZE: u32 = 8;

/// Edge length of the per-pixel resolve tile grid. Resolve tiles are half
/// the emit tile size so the dilated probe lists overlap across emit-tile
/// seams.
pub const PROBE_RESOLVE_TILE_SIZE: u32 = 4;

/// Compile-time bound on hierarchy depth.
pub const PROBE_MAX_HIERARCHY_DEPTH: usize = 4;

/// A probe links to at most this many parents on the next-coarser level.
pub const MAX_PARENT_PROBE_COUNT: usize = 4;

/// Leaf probes emitted per tile are bounded by the depth-range splitting
/// heuristic.
pub const PROBE_MAX_EMIT_PER_TILE: u32 = 4;

/// Dilated candidate list capacity per tile (3x3 neighborhood, capped).
pub const DILATED_LIST_MAX_PER_TILE: usize = 32;

pub const PROBE_INVALID_INDEX: u32 = !0u32;

/// Depth spread within one emit tile beyond which the tile emits probes at
/// both ends of its depth range instead of one in the middle.
pub const PROBE_DEPTH_SPLIT_THRESHOLD: f32 = 0.1;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct PackedProbe {
    pub position: [f32; 3],
    pub level: u32,
    pub tile_coord: [u32; 2],
    /// Conservative [min, max] depth of the surface the probe represents.
    pub depth_bounds: [f32; 2],
    pub parents: [u32; MAX_PARENT_PROBE_COUNT],
    pub parent_count: u32,
    /// Bitmask of ray directions already evaluated for this probe's atlas
    /// cell this frame.
    pub sample_mask: u32,
    pub _pad: [u32; 2],
}

/// One slot of the projected-probes scratch: a leaf/parent candidate before
/// global offsets exist. The owning tile is implied by the slot index.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct ProjectedProbe {
    pub depth_bounds: [f32; 2],
}

/// Per-level record in the hierarchy info buffer: [base, count] pairs of
/// offsets into the shared probe array, written on the GPU timeline during
/// global offset assignment and consumed by every later pass.
pub const HIERARCHY_INFO_STRIDE: usize = 2;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct ProbeHierarchyConstants {
    pub view: ViewConstants,
    pub screen_extent: [u32; 2],
    pub tile_jitter: [u32; 2],
    pub level_count: u32,
    /// The level a per-level pass operates on.
    pub level: u32,
    pub supersampling: u32,
    pub atlas_resolution: u32,
    pub max_probe_count: u32,
    pub counter_parallax_error: f32,
    pub frame_index: u32,
    pub _pad: u32,
}

/// Tile grid dimensions of a hierarchy level.
pub fn level_tile_count(screen_extent: [u32; 2], level: u32) -> [u32; 2] {
    let tile = PROBE_EMIT_TILE_SIZE << level;
    [
        (screen_extent[0] + tile - 1) / tile,
        (screen_extent[1] + tile - 1) / tile,
    ]
}

/// Upper bound of probes a frame can materialize at the given screen size
/// and hierarchy depth, before the user cap.
pub fn max_probe_count(screen_extent: [u32; 2], level_count: u32) -> u32 {
    (0..level_count)
        .map(|level| {
            let t = level_tile_count(screen_extent, level);
            t[0] * t[1] * PROBE_MAX_EMIT_PER_TILE
        })
        .sum()
}

pub struct ProbeHierarchy {
    /// The single shared probe array, all levels packed densely.
    pub probes_buf: rg::Handle<rg::Buffer>,
    /// [base, count] per level.
    pub hierarchy_info_buf: rg::Handle<rg::Buffer>,
    /// Min/max depth per emit tile; mip L is level L's tile grid.
    pub depth_bounds_pyramid: rg::Handle<rg::Image>,
    /// Per level: dense per-tile base offsets into the probe array.
    pub tile_offsets: Vec<rg::Handle<rg::Buffer>>,
    /// Per level: per-tile emitted probe counts (pre-clamp).
    pub tile_counts: Vec<rg::Handle<rg::Buffer>>,
    /// Per level: dilated per-tile candidate lists + their lengths.
    pub dilated_lists: Vec<rg::Handle<rg::Buffer>>,
    pub dilated_counts: Vec<rg::Handle<rg::Buffer>>,
    pub level_count: u32,
    pub constants: ProbeHierarchyConstants,
}

impl ProbeHierarchy {
    pub fn constants_for_level(&self, level: u32) -> ProbeHierarchyConstants {
        ProbeHierarchyConstants {
            level,
            ..self.constants
        }
    }
}

/// Builds the per-frame screen-space probe hierarchy, bottom-up scatter
/// followed by offset assignment, materialization, dilation and top-down
/// parent selection.
pub fn build_probe_hierarchy(
    rg: &mut rg::RenderGraph,
    gbuffer_depth: &GbufferDepth,
    view: ViewConstants,
    tile_jitter: [u32; 2],
    frame_index: u32,
    settings: &RenderSettings,
) -> ProbeHierarchy {
    let screen_extent = gbuffer_depth.gbuffer.desc().extent_2d();
    let level_count = settings.hierarchy_depth;
    let probe_cap = max_probe_count(screen_extent, level_count).min(settings.max_probe_count);

    let constants = ProbeHierarchyConstants {
        view,
        screen_extent,
        tile_jitter,
        level_count,
        level: 0,
        supersampling: settings.supersampling,
        atlas_resolution: settings.probe_atlas_resolution,
        max_probe_count: probe_cap,
        counter_parallax_error: settings.counter_parallax_error,
        frame_index,
        _pad: 0,
    };

    // Depth min/max pyramid over the emit tile grids. Mip 0 reduces the
    // full-resolution depth buffer; each further mip is a 2x2 min/max
    // reduction, so coarser bounds stay conservative.
    let level0_tiles = level_tile_count(screen_extent, 0);
    let mut depth_bounds_pyramid = rg.create(
        ImageDesc::new_2d(Format::Rg16Float, level0_tiles).mip_levels(level_count as u16),
    );

    SimpleComputePass::new_compute(rg.add_pass("probe depth bounds"), "probe_depth_bounds_init")
        .read(&gbuffer_depth.depth)
        .write(&mut depth_bounds_pyramid)
        .constants(constants)
        .dispatch([level0_tiles[0], level0_tiles[1], 1]);

    for level in 1..level_count {
        let tiles = level_tile_count(screen_extent, level);
        SimpleComputePass::new_compute(
            rg.add_pass("probe depth bounds reduce"),
            "probe_depth_bounds_reduce",
        )
        .write(&mut depth_bounds_pyramid)
        .constants(ProbeHierarchyConstants { level, ..constants })
        .dispatch([tiles[0], tiles[1], 1]);
    }

    // Bottom-up scatter: per-tile candidate probes and counts, level 0 from
    // the depth bounds, coarser levels by reducing 2x2 blocks of the finer
    // level's candidates.
    let mut tile_counts = Vec::new();
    let mut projected = Vec::new();

    for level in 0..level_count {
        let tiles = level_tile_count(screen_extent, level);
        let tile_total = (tiles[0] * tiles[1]) as usize;

        let mut counts_buf = rg.create(BufferDesc::new_gpu_only(
            std::mem::size_of::<u32>() * tile_total,
            BufferUsageFlags::STORAGE_BUFFER,
        ));
        let mut projected_buf = rg.create(BufferDesc::new_gpu_only(
            std::mem::size_of::<ProjectedProbe>() * tile_total * PROBE_MAX_EMIT_PER_TILE as usize,
            BufferUsageFlags::STORAGE_BUFFER,
        ));

        if level == 0 {
            SimpleComputePass::new_compute(rg.add_pass("probe scatter level 0"), "probe_scatter_leaf")
                .read(&depth_bounds_pyramid)
                .write(&mut counts_buf)
                .write(&mut projected_buf)
                .constants(ProbeHierarchyConstants { level, ..constants })
                .dispatch([tiles[0], tiles[1], 1]);
        } else {
            let (prev_counts, prev_projected): (&rg::Handle<rg::Buffer>, &rg::Handle<rg::Buffer>) = (
                &tile_counts[level as usize - 1],
                &projected[level as usize - 1],
            );
            SimpleComputePass::new_compute(
                rg.add_pass("probe scatter hierarchy"),
                "probe_scatter_parent",
            )
            .read(&depth_bounds_pyramid)
            .read(prev_counts)
            .read(prev_projected)
            .write(&mut counts_buf)
            .write(&mut projected_buf)
            .constants(ProbeHierarchyConstants { level, ..constants })
            .dispatch([tiles[0], tiles[1], 1]);
        }

        tile_counts.push(counts_buf);
        projected.push(projected_buf);
    }

    // Global offset assignment, one level at a time in ascending order so
    // each level's base continues where the previous one ended. The clamp
    // against max_probe_count happens here: later levels and later tiles
    // silently lose their overflow.
    let mut hierarchy_info_buf = rg.create(BufferDesc::new_gpu_only(
        std::mem::size_of::<u32>() * HIERARCHY_INFO_STRIDE * PROBE_MAX_HIERARCHY_DEPTH,
        BufferUsageFlags::STORAGE_BUFFER,
    ));

    let mut tile_offsets = Vec::new();
    for level in 0..level_count {
        let tiles = level_tile_count(screen_extent, level);
        let tile_total = (tiles[0] * tiles[1]) as usize;

        let mut offsets_buf = rg.create(BufferDesc::new_gpu_only(
            std::mem::size_of::<u32>() * tile_total,
            BufferUsageFlags::STORAGE_BUFFER,
        ));

        SimpleComputePass::new_compute(rg.add_pass("probe assign offsets"), "probe_assign_offsets")
            .read(&tile_counts[level as usize])
            .write(&mut offsets_buf)
            .write_no_sync(&mut hierarchy_info_buf)
            .constants(ProbeHierarchyConstants { level, ..constants })
            .dispatch([1, 1, 1]);

        tile_offsets.push(offsets_buf);
    }

    // Probe array materialization: walk tiles again and write final packed
    // probes (position reconstructed from depth, parent slots cleared) into
    // the shared array.
    let mut probes_buf = rg.create(BufferDesc::new_gpu_only(
        std::mem::size_of::<PackedProbe>() * probe_cap as usize,
        BufferUsageFlags::STORAGE_BUFFER,
    ));

    for level in 0..level_count {
        let tiles = level_tile_count(screen_extent, level);
        SimpleComputePass::new_compute(rg.add_pass("probe materialize"), "probe_materialize")
            .read(&projected[level as usize])
            .read(&tile_counts[level as usize])
            .read(&tile_offsets[level as usize])
            .read(&hierarchy_info_buf)
            .write_no_sync(&mut probes_buf)
            .constants(ProbeHierarchyConstants { level, ..constants })
            .dispatch([tiles[0], tiles[1], 1]);
    }

    // Resolve-tile dilation: each tile's candidate list grows by one tile in
    // every direction, culled by the depth-bounds pyramid so probes that no
    // pixel of the tile can see are discarded.
    let mut dilated_lists = Vec::new();
    let mut dilated_counts = Vec::new();

    for level in 0..level_count {
        let tiles = level_tile_count(screen_extent, level);
        let tile_total = (tiles[0] * tiles[1]) as usize;

        let mut list_buf = rg.create(BufferDesc::new_gpu_only(
            std::mem::size_of::<u32>() * tile_total * DILATED_LIST_MAX_PER_TILE,
            BufferUsageFlags::STORAGE_BUFFER,
        ));
        let mut count_buf = rg.create(BufferDesc::new_gpu_only(
            std::mem::size_of::<u32>() * tile_total,
            BufferUsageFlags::STORAGE_BUFFER,
        ));

        SimpleComputePass::new_compute(rg.add_pass("probe list dilate"), "probe_dilate")
            .read(&tile_counts[level as usize])
            .read(&tile_offsets[level as usize])
            .read(&hierarchy_info_buf)
            .read(&probes_buf)
            .read(&depth_bounds_pyramid)
            .write(&mut list_buf)
            .write(&mut count_buf)
            .constants(ProbeHierarchyConstants { level, ..constants })
            .dispatch([tiles[0], tiles[1], 1]);

        dilated_lists.push(list_buf);
        dilated_counts.push(count_buf);
    }

    // Parent selection, every level except the coarsest: greedily pick the
    // closest parent from the next level's dilated candidates, rejecting
    // candidates past the counter-parallax-error tolerance.
    for level in 0..level_count.saturating_sub(1) {
        let tiles = level_tile_count(screen_extent, level);
        SimpleComputePass::new_compute(rg.add_pass("probe select parents"), "probe_select_parents")
            .read(&hierarchy_info_buf)
            .read(&tile_offsets[level as usize])
            .read(&tile_counts[level as usize])
            .read(&dilated_lists[level as usize + 1])
            .read(&dilated_counts[level as usize + 1])
            .write_no_sync(&mut probes_buf)
            .constants(ProbeHierarchyConstants { level, ..constants })
            .dispatch([tiles[0], tiles[1], 1]);
    }

    ProbeHierarchy {
        probes_buf,
        hierarchy_info_buf,
        depth_bounds_pyramid,
        tile_offsets,
        tile_counts,
        dilated_lists,
        dilated_counts,
        level_count,
        constants,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_tile_counts_shrink_by_powers_of_two() {
        let extent = [640, 360];
        assert_eq!(level_tile_count(extent, 0), [80, 45]);
        assert_eq!(level_tile_count(extent, 1), [40, 23]);
        assert_eq!(level_tile_count(extent, 2), [20, 12]);
        assert_eq!(level_tile_count(extent, 3), [10, 6]);
    }

    #[test]
    fn probe_budget_sums_all_levels() {
        let extent = [64, 64];
        // 8x8, 4x4, 2x2, 1x1 tiles with up to 4 probes each.
        assert_eq!(max_probe_count(extent, 4), (64 + 16 + 4 + 1) * 4);
    }
}
