//! Probe hierarchy build invariants: count monotonicity, the global probe
//! budget, depth-bound conservativeness, and parent selection.

mod common;

use candela::{
    frame_constants::{CameraMatrices, ViewConstants},
    gpu::{SharedBuffer, SharedImage},
    renderers::{
        probe_hierarchy::{
            build_probe_hierarchy, level_tile_count, PackedProbe, MAX_PARENT_PROBE_COUNT,
            PROBE_INVALID_INDEX,
        },
        GbufferDepth,
    },
    rg::{AccessType, RenderGraph, RenderGraphExecutionParams},
    scene::SceneInputs,
    RenderSettings,
};

struct HierarchyRun {
    probes: SharedBuffer,
    hierarchy_info: SharedBuffer,
    depth_bounds: SharedImage,
    level_count: u32,
    max_probe_count: u32,
}

fn build(scene: &SceneInputs, settings: &RenderSettings) -> HierarchyRun {
    let device = common::device(false);
    let registry = common::registry();

    let mut rg = RenderGraph::new();
    let read = AccessType::AnyShaderReadSampledImageOrUniformTexelBuffer;
    let gbuffer = rg.import_image(scene.gbuffer.clone(), read);
    let depth = rg.import_image(scene.depth.clone(), read);
    let normal = rg.import_image(scene.geometric_normal.clone(), read);
    let gbuffer_depth = GbufferDepth::new(normal, gbuffer, depth);

    let view = ViewConstants::new(&CameraMatrices::identity());
    let settings = settings.clamped_for_frame();

    // Zero jitter keeps tile footprints aligned so the count ratios are
    // exact.
    let hierarchy = build_probe_hierarchy(&mut rg, &gbuffer_depth, view, [0, 0], 0, &settings);

    let probes = rg.export(&hierarchy.probes_buf, AccessType::Nothing);
    let info = rg.export(&hierarchy.hierarchy_info_buf, AccessType::Nothing);
    let bounds = rg.export(&hierarchy.depth_bounds_pyramid, AccessType::Nothing);

    let retired = rg
        .execute(RenderGraphExecutionParams {
            device: &device,
            kernels: &registry,
        })
        .unwrap();

    HierarchyRun {
        probes: retired.exported_buffer(probes),
        hierarchy_info: retired.exported_buffer(info),
        depth_bounds: retired.exported_image(bounds),
        level_count: hierarchy.level_count,
        max_probe_count: hierarchy.constants.max_probe_count,
    }
}

fn level_counts(run: &HierarchyRun) -> Vec<(u32, u32)> {
    let info = run.hierarchy_info.lock();
    let info = info.as_slice::<u32>();
    (0..run.level_count)
        .map(|l| (info[l as usize * 2], info[l as usize * 2 + 1]))
        .collect()
}

#[test]
fn probe_counts_shrink_by_the_reduction_factor() {
    let device = common::device(false);
    let scene = common::flat_scene(&device, [512, 512]);
    let run = build(&scene, &RenderSettings::default());

    let counts = level_counts(&run);

    // Flat scene, 8px emit tiles: one probe per tile at every level.
    assert_eq!(counts[0].1, 64 * 64);

    let mut total = 0;
    for level in 0..counts.len() {
        total += counts[level].1;
        if level + 1 < counts.len() {
            let reduced = (counts[level].1 + 3) / 4;
            assert!(
                counts[level + 1].1 <= reduced,
                "level {} count {} exceeds level {} count {} / 4",
                level + 1,
                counts[level + 1].1,
                level,
                counts[level].1,
            );
        }
    }
    assert!(total <= run.max_probe_count);

    // Levels pack densely: each level starts where the previous ended.
    for level in 1..counts.len() {
        assert_eq!(counts[level].0, counts[level - 1].0 + counts[level - 1].1);
    }
}

#[test]
fn probe_budget_exhaustion_degrades_to_exactly_the_cap() {
    let device = common::device(false);
    // A flat 512x512 scene requests ~5400 probes across the hierarchy,
    // well past the 1024 cap.
    let scene = common::flat_scene(&device, [512, 512]);
    let settings = RenderSettings {
        max_probe_count: 1024,
        ..Default::default()
    };
    let run = build(&scene, &settings);

    assert_eq!(run.max_probe_count, 1024);

    let counts = level_counts(&run);
    let total: u32 = counts.iter().map(|(_, c)| c).sum();
    assert_eq!(total, 1024);

    // Every materialized slot holds a real probe.
    let probes = run.probes.lock();
    let probes = probes.as_slice::<PackedProbe>();
    for (base, count) in counts {
        for i in base..base + count {
            let probe = probes[i as usize];
            assert!(probe.depth_bounds[1] > 0.0);
        }
    }
}

#[test]
fn coarser_depth_bounds_contain_their_children() {
    let device = common::device(false);
    let scene = common::gradient_scene(&device, [256, 256]);
    let run = build(&scene, &RenderSettings::default());

    let bounds = run.depth_bounds.lock();

    for level in 1..run.level_count {
        let tiles = level_tile_count([256, 256], level);
        let child_tiles = level_tile_count([256, 256], level - 1);

        for ty in 0..tiles[1] {
            for tx in 0..tiles[0] {
                let parent = bounds.load(level as u16, [tx, ty, 0]);
                if parent[1] <= 0.0 {
                    continue;
                }

                for dy in 0..2 {
                    for dx in 0..2 {
                        let cx = tx * 2 + dx;
                        let cy = ty * 2 + dy;
                        if cx >= child_tiles[0] || cy >= child_tiles[1] {
                            continue;
                        }
                        let child = bounds.load(level as u16 - 1, [cx, cy, 0]);
                        if child[1] <= 0.0 {
                            continue;
                        }
                        assert!(
                            parent[0] <= child[0] + 1e-6 && parent[1] >= child[1] - 1e-6,
                            "level {} tile ({}, {}) bounds {:?} exclude child ({}, {}) {:?}",
                            level,
                            tx,
                            ty,
                            parent,
                            cx,
                            cy,
                            child,
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn probes_link_to_parents_within_tolerance() {
    let device = common::device(false);
    let scene = common::flat_scene(&device, [256, 256]);
    let run = build(&scene, &RenderSettings::default());

    let counts = level_counts(&run);
    let probes = run.probes.lock();
    let probes = probes.as_slice::<PackedProbe>();
    let tolerance = RenderSettings::default().counter_parallax_error;

    // Every probe below the coarsest level finds a parent in a flat scene,
    // and the accepted parent's depth drift honors the tolerance.
    for level in 0..run.level_count - 1 {
        let (base, count) = counts[level as usize];
        for i in base..base + count {
            let probe = probes[i as usize];
            assert!(
                probe.parent_count >= 1 && probe.parent_count <= MAX_PARENT_PROBE_COUNT as u32,
                "level {} probe {} has no parent",
                level,
                i,
            );

            let depth = 0.5 * (probe.depth_bounds[0] + probe.depth_bounds[1]);
            for slot in 0..probe.parent_count as usize {
                let parent_idx = probe.parents[slot];
                assert_ne!(parent_idx, PROBE_INVALID_INDEX);
                let parent = probes[parent_idx as usize];
                assert_eq!(parent.level, level + 1);
                let parent_depth = 0.5 * (parent.depth_bounds[0] + parent.depth_bounds[1]);
                assert!((depth - parent_depth).abs() <= tolerance + 1e-6);
            }
        }
    }

    // The coarsest level has nothing above it.
    let (base, count) = counts[run.level_count as usize - 1];
    for i in base..base + count {
        assert_eq!(probes[i as usize].parent_count, 0);
    }
}
