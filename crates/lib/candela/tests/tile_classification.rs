//! Classification coverage, compaction exactness, the zero-tile indirect
//! dispatch, dispatch splitting, and the lossy list cap.

mod common;

use candela::{
    gpu::{DispatchIndirectArgs, SharedBuffer, SharedImage},
    renderers::{
        tile_classification::{
            classify_tiles, unpack_tile_coord, TileCategory, MAX_DISPATCH_SPLITS,
            MAX_TILE_PER_DISPATCH, TILE_CATEGORY_COUNT, TILE_LIST_MAX_LENGTH,
        },
        GbufferDepth,
    },
    rg::{AccessType, RenderGraph, RenderGraphExecutionParams},
    scene::SceneInputs,
};

struct ClassificationRun {
    classification: SharedImage,
    category_counts: SharedBuffer,
    tile_lists: SharedBuffer,
    dispatch_args: SharedBuffer,
    tile_count: [u32; 2],
}

fn run_classification(scene: &SceneInputs, ray_tracing: bool) -> ClassificationRun {
    let device = common::device(ray_tracing);
    let registry = common::registry();

    let mut rg = RenderGraph::new();
    let read = AccessType::AnyShaderReadSampledImageOrUniformTexelBuffer;
    let gbuffer = rg.import_image(scene.gbuffer.clone(), read);
    let depth = rg.import_image(scene.depth.clone(), read);
    let normal = rg.import_image(scene.geometric_normal.clone(), read);
    let gbuffer_depth = GbufferDepth::new(normal, gbuffer, depth);

    let tiles = classify_tiles(&mut rg, &gbuffer_depth);

    let classification = rg.export(&tiles.classification_tex, AccessType::Nothing);
    let category_counts = rg.export(&tiles.category_counts_buf, AccessType::Nothing);
    let tile_lists = rg.export(&tiles.tile_lists_buf, AccessType::Nothing);
    let dispatch_args = rg.export(&tiles.dispatch_args_buf, AccessType::Nothing);
    let tile_count = tiles.tile_count;

    let retired = rg
        .execute(RenderGraphExecutionParams {
            device: &device,
            kernels: &registry,
        })
        .unwrap();

    ClassificationRun {
        classification: retired.exported_image(classification),
        category_counts: retired.exported_buffer(category_counts),
        tile_lists: retired.exported_buffer(tile_lists),
        dispatch_args: retired.exported_buffer(dispatch_args),
        tile_count,
    }
}

#[test]
fn every_tile_gets_exactly_one_category() {
    let device = common::device(false);
    let scene = common::mixed_scene(&device, [128, 96]);
    let run = run_classification(&scene, false);

    let counts: Vec<u32> = run.category_counts.lock().as_slice::<u32>()
        [..TILE_CATEGORY_COUNT]
        .to_vec();
    let total: u32 = counts.iter().sum();
    assert_eq!(total, run.tile_count[0] * run.tile_count[1]);

    // The mixed scene hits more than one category.
    assert!(counts.iter().filter(|&&c| c > 0).count() >= 3);
}

#[test]
fn compacted_lists_match_classification_exactly() {
    let device = common::device(false);
    let scene = common::mixed_scene(&device, [128, 96]);
    let run = run_classification(&scene, false);

    let classification = run.classification.lock();
    let counts = run.category_counts.lock();
    let counts = counts.as_slice::<u32>();
    let lists = run.tile_lists.lock();
    let lists = lists.as_slice::<u32>();

    for category in TileCategory::ALL {
        let count = counts[category as usize] as usize;

        let mut seen = std::collections::HashSet::new();
        for slot in 0..count {
            let packed = lists[category as usize * TILE_LIST_MAX_LENGTH as usize + slot];
            let [tx, ty] = unpack_tile_coord(packed);

            // No duplicates, and every listed tile really has this
            // category.
            assert!(seen.insert(packed), "duplicate tile in list");
            assert_eq!(
                classification.load_u(0, [tx, ty, 0])[0],
                category as u32,
                "tile ({}, {}) listed under the wrong category",
                tx,
                ty
            );
        }

        // No omissions: the list length equals the number of tiles
        // classified into this category.
        let mut expected = 0;
        for ty in 0..run.tile_count[1] {
            for tx in 0..run.tile_count[0] {
                if classification.load_u(0, [tx, ty, 0])[0] == category as u32 {
                    expected += 1;
                }
            }
        }
        assert_eq!(count, expected);
    }
}

#[test]
fn zero_tile_categories_produce_valid_noop_dispatches() {
    let device = common::device(false);
    // Flat simple-shading scene: most categories are empty.
    let scene = common::flat_scene(&device, [64, 64]);
    let run = run_classification(&scene, false);

    let counts = run.category_counts.lock();
    let counts = counts.as_slice::<u32>();
    assert_eq!(counts[TileCategory::ComplexShadingBentNormal as usize], 0);

    let args = run.dispatch_args.lock();
    let args = args.as_slice::<DispatchIndirectArgs>();

    for category in TileCategory::ALL {
        for split in 0..MAX_DISPATCH_SPLITS {
            let record = args[category as usize * MAX_DISPATCH_SPLITS as usize + split as usize];
            if counts[category as usize] == 0 {
                // The record exists and encodes zero groups; it is never
                // omitted.
                assert_eq!(record.group_count[0], 0);
            }
            assert!(record.group_count[0] <= MAX_TILE_PER_DISPATCH);
        }
    }
}

#[test]
fn oversized_categories_split_across_dispatches() {
    let device = common::device(false);
    // 2048x2048 -> 256x256 = 65536 tiles, all the same category: one more
    // than fits a single dispatch.
    let scene = common::flat_scene(&device, [2048, 2048]);
    let run = run_classification(&scene, false);

    let counts = run.category_counts.lock();
    let counts = counts.as_slice::<u32>();
    let category = TileCategory::SimpleShading as usize;
    assert_eq!(counts[category], 65536);

    let args = run.dispatch_args.lock();
    let args = args.as_slice::<DispatchIndirectArgs>();
    let first = args[category * MAX_DISPATCH_SPLITS as usize];
    let second = args[category * MAX_DISPATCH_SPLITS as usize + 1];

    assert_eq!(first.group_count[0], MAX_TILE_PER_DISPATCH);
    assert_eq!(second.group_count[0], 1);
}

#[test]
fn list_overflow_drops_tiles_without_crashing() {
    let device = common::device(false);
    // 2176x2176 -> 272x272 = 73984 tiles of one category, past the list
    // cap. The overflow is silently dropped.
    let scene = common::flat_scene(&device, [2176, 2176]);
    let run = run_classification(&scene, false);

    let counts = run.category_counts.lock();
    let counts = counts.as_slice::<u32>();
    let category = TileCategory::SimpleShading as usize;
    assert_eq!(counts[category], 73984);

    // Dispatch args are bounded by the list capacity, not the raw count.
    let args = run.dispatch_args.lock();
    let args = args.as_slice::<DispatchIndirectArgs>();
    let total_groups: u32 = (0..MAX_DISPATCH_SPLITS as usize)
        .map(|s| args[category * MAX_DISPATCH_SPLITS as usize + s].group_count[0])
        .sum();
    assert_eq!(total_groups, TILE_LIST_MAX_LENGTH);
}
