use bytemuck::{Pod, Zeroable};
use candela_gpu::{
    BufferDesc, BufferUsageFlags, Format, ImageDesc, INDIRECT_DISPATCH_STRIDE,
};
use candela_rg::{self as rg, SimpleComputePass};

use super::GbufferDepth;

/// Screen tile edge length for tracing-work classification.
pub const TRACING_CLASSIFICATION_TILE_SIZE: u32 = 8;

/// Edge length, in classification tiles, of one "atomic tile": counters are
/// first accumulated per atomic tile to bound atomic contention before being
/// folded into the global per-category counters.
pub const ATOMIC_TILE_SIZE: u32 = 8;

/// Hard cap of one category's compacted tile list. Tiles past the cap are
/// dropped, a documented lossy degradation, never a crash.
pub const TILE_LIST_MAX_LENGTH: u32 = 1 << 16;

/// Some platforms bound the thread-group count along one dispatch axis, so
/// one logical per-tile dispatch becomes `ceil(total / MAX_TILE_PER_DISPATCH)`
/// physical indirect dispatches.
pub const MAX_TILE_PER_DISPATCH: u32 = 65535;

pub const MAX_DISPATCH_SPLITS: u32 =
    (TILE_LIST_MAX_LENGTH + MAX_TILE_PER_DISPATCH - 1) / MAX_TILE_PER_DISPATCH;

/// What shading work a tile needs. Exactly one category per tile per frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum TileCategory {
    Unlit = 0,
    DefaultLitOnly = 1,
    SimpleShading = 2,
    SimpleShadingSpecular = 3,
    SimpleShadingBentNormal = 4,
    ComplexShadingBentNormal = 5,
}

pub const TILE_CATEGORY_COUNT: usize = 6;

impl TileCategory {
    pub const ALL: [TileCategory; TILE_CATEGORY_COUNT] = [
        TileCategory::Unlit,
        TileCategory::DefaultLitOnly,
        TileCategory::SimpleShading,
        TileCategory::SimpleShadingSpecular,
        TileCategory::SimpleShadingBentNormal,
        TileCategory::ComplexShadingBentNormal,
    ];

    pub fn from_u32(v: u32) -> Self {
        Self::ALL[v as usize]
    }
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct TileClassifyConstants {
    pub screen_extent: [u32; 2],
    pub tile_count: [u32; 2],
    pub atomic_tile_count: [u32; 2],
    pub _pad: [u32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct TileDispatchArgsConstants {
    pub max_tile_per_dispatch: u32,
    pub dispatch_splits: u32,
    pub _pad: [u32; 2],
}

/// Compacted classification results of one frame, consumed by the tracing
/// and shading passes through indirect dispatch.
pub struct TileClassificationContext {
    /// Per tile: x = category, y = packed depth/roughness/shading summary.
    pub classification_tex: rg::Handle<rg::Image>,
    /// `TILE_CATEGORY_COUNT` lists of packed tile coordinates
    /// (`x | y << 16`), each `TILE_LIST_MAX_LENGTH` slots long.
    pub tile_lists_buf: rg::Handle<rg::Buffer>,
    /// Global per-category tile counts.
    pub category_counts_buf: rg::Handle<rg::Buffer>,
    /// `MAX_DISPATCH_SPLITS` indirect dispatch records per category.
    pub dispatch_args_buf: rg::Handle<rg::Buffer>,
    pub tile_count: [u32; 2],
}

impl TileClassificationContext {
    /// Byte offset of the indirect args record for one category/split pair.
    pub fn dispatch_args_offset(category: TileCategory, split: u32) -> u64 {
        debug_assert!(split < MAX_DISPATCH_SPLITS);
        (category as u64 * MAX_DISPATCH_SPLITS as u64 + split as u64) * INDIRECT_DISPATCH_STRIDE
    }

    /// First tile-list index covered by a given split of a category's
    /// dispatch; consumers add it to their group index.
    pub fn split_base_tile(split: u32) -> u32 {
        split * MAX_TILE_PER_DISPATCH
    }
}

/// The four-stage classify / assign-offsets / build-lists pipeline. The
/// consume stage belongs to the callers, which dispatch indirectly off
/// `dispatch_args_buf`.
pub fn classify_tiles(
    rg: &mut rg::RenderGraph,
    gbuffer_depth: &GbufferDepth,
) -> TileClassificationContext {
    let screen_extent = gbuffer_depth.gbuffer.desc().extent_2d();
    let tile_extent = [
        TRACING_CLASSIFICATION_TILE_SIZE,
        TRACING_CLASSIFICATION_TILE_SIZE,
        1,
    ];
    let tile_desc = gbuffer_depth.gbuffer.desc().div_up_extent(tile_extent);
    let tile_count = tile_desc.extent_2d();
    let atomic_tile_count = [
        (tile_count[0] + ATOMIC_TILE_SIZE - 1) / ATOMIC_TILE_SIZE,
        (tile_count[1] + ATOMIC_TILE_SIZE - 1) / ATOMIC_TILE_SIZE,
    ];

    let constants = TileClassifyConstants {
        screen_extent,
        tile_count,
        atomic_tile_count,
        _pad: [0; 2],
    };

    let mut classification_tex =
        rg.create(ImageDesc::new_2d(Format::Rg32Uint, tile_count));

    let atomic_counter_len =
        (atomic_tile_count[0] * atomic_tile_count[1]) as usize * TILE_CATEGORY_COUNT;

    let mut atomic_counts_buf = rg.create(BufferDesc::new_gpu_only(
        std::mem::size_of::<u32>() * atomic_counter_len,
        BufferUsageFlags::STORAGE_BUFFER,
    ));

    SimpleComputePass::new_compute(rg.add_pass("tile classify"), "tile_classify")
        .read(&gbuffer_depth.depth)
        .read(&gbuffer_depth.gbuffer)
        .write(&mut classification_tex)
        .write(&mut atomic_counts_buf)
        .constants(constants)
        .dispatch([tile_count[0], tile_count[1], 1]);

    let mut atomic_offsets_buf = rg.create(BufferDesc::new_gpu_only(
        std::mem::size_of::<u32>() * atomic_counter_len,
        BufferUsageFlags::STORAGE_BUFFER,
    ));
    let mut category_counts_buf = rg.create(BufferDesc::new_gpu_only(
        std::mem::size_of::<u32>() * TILE_CATEGORY_COUNT,
        BufferUsageFlags::STORAGE_BUFFER,
    ));

    SimpleComputePass::new_compute(
        rg.add_pass("tile assign offsets"),
        "tile_classify_assign_offsets",
    )
    .read(&atomic_counts_buf)
    .write(&mut atomic_offsets_buf)
    .write(&mut category_counts_buf)
    .constants(constants)
    .dispatch([atomic_tile_count[0], atomic_tile_count[1], 1]);

    let mut tile_lists_buf = rg.create(BufferDesc::new_gpu_only(
        std::mem::size_of::<u32>() * TILE_CATEGORY_COUNT * TILE_LIST_MAX_LENGTH as usize,
        BufferUsageFlags::STORAGE_BUFFER,
    ));

    SimpleComputePass::new_compute(rg.add_pass("tile build lists"), "tile_classify_build_lists")
        .read(&classification_tex)
        .read(&atomic_offsets_buf)
        .write(&mut tile_lists_buf)
        .constants(constants)
        .dispatch([tile_count[0], tile_count[1], 1]);

    let mut dispatch_args_buf = rg.create(BufferDesc::new_gpu_only(
        INDIRECT_DISPATCH_STRIDE as usize * TILE_CATEGORY_COUNT * MAX_DISPATCH_SPLITS as usize,
        BufferUsageFlags::INDIRECT_BUFFER,
    ));

    SimpleComputePass::new_compute(
        rg.add_pass("tile dispatch args"),
        "tile_classify_dispatch_args",
    )
    .read(&category_counts_buf)
    .write(&mut dispatch_args_buf)
    .constants(TileDispatchArgsConstants {
        max_tile_per_dispatch: MAX_TILE_PER_DISPATCH,
        dispatch_splits: MAX_DISPATCH_SPLITS,
        _pad: [0; 2],
    })
    .dispatch([1, 1, 1]);

    TileClassificationContext {
        classification_tex,
        tile_lists_buf,
        category_counts_buf,
        dispatch_args_buf,
        tile_count,
    }
}

/// Packs a tile coordinate into a list entry.
pub fn pack_tile_coord(x: u32, y: u32) -> u32 {
    x | (y << 16)
}

pub fn unpack_tile_coord(packed: u32) -> [u32; 2] {
    [packed & 0xffff, packed >> 16]
}
