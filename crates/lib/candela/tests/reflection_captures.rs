//! Reflection capture array maintenance: initial build, slot reuse, and the
//! remap-and-copy growth path.

mod common;

use candela::{
    gpu::SharedImage,
    renderers::reflection_captures::{ReflectionCaptureArray, CAPTURE_CUBE_WIDTH},
    rg::{
        AccessType, RenderGraphExecutionParams, TemporalRenderGraph, TemporalRenderGraphState,
    },
    scene::{CaptureShape, ReflectionCaptureDesc},
};

fn capture(id: u64, shape: CaptureShape, color: [f32; 3]) -> ReflectionCaptureDesc {
    ReflectionCaptureDesc { id, shape, color }
}

fn run_update(
    array: &mut ReflectionCaptureArray,
    captures: &[ReflectionCaptureDesc],
) -> Option<SharedImage> {
    let device = common::device(false);
    let registry = common::registry();

    let mut rg = TemporalRenderGraph::new(TemporalRenderGraphState::default(), device.clone());
    let handle = array.update(&mut rg, captures)?;
    let exported = rg.export(&handle, AccessType::Nothing);

    let (rg, _temporal) = rg.export_temporal();
    let retired = rg
        .execute(RenderGraphExecutionParams {
            device: &device,
            kernels: &registry,
        })
        .unwrap();

    Some(retired.exported_image(exported))
}

fn slot_color(image: &SharedImage, slot: u32) -> [f32; 3] {
    let image = image.lock();
    let v = image.load(0, [CAPTURE_CUBE_WIDTH / 2, CAPTURE_CUBE_WIDTH / 2, slot * 6]);
    [v[0], v[1], v[2]]
}

#[test]
fn no_captures_means_no_array() {
    let mut array = ReflectionCaptureArray::default();
    assert!(run_update(&mut array, &[]).is_none());
}

#[test]
fn captures_render_into_assigned_slots() {
    let mut array = ReflectionCaptureArray::default();
    let captures = [
        capture(1, CaptureShape::Box, [1.0, 0.0, 0.0]),
        capture(2, CaptureShape::Sphere, [0.0, 1.0, 0.0]),
    ];

    let image = run_update(&mut array, &captures).unwrap();

    let red = array.slot_of(1).unwrap();
    let green = array.slot_of(2).unwrap();
    assert_ne!(red, green);
    assert_eq!(slot_color(&image, red), [1.0, 0.0, 0.0]);
    assert_eq!(slot_color(&image, green), [0.0, 1.0, 0.0]);
}

#[test]
fn growing_the_array_remaps_live_slots_instead_of_rebuilding() {
    let mut array = ReflectionCaptureArray::default();

    let initial = [
        capture(1, CaptureShape::Box, [1.0, 0.0, 0.0]),
        capture(2, CaptureShape::Sphere, [0.0, 1.0, 0.0]),
        capture(3, CaptureShape::Box, [0.0, 0.0, 1.0]),
    ];
    run_update(&mut array, &initial).unwrap();

    // Drop capture 2, add four more: forces a grow past the slot
    // granularity. Captures 1 and 3 must be carried over by copy, never
    // re-rendered from scratch.
    let grown: Vec<_> = [
        capture(1, CaptureShape::Box, [1.0, 0.0, 0.0]),
        capture(3, CaptureShape::Box, [0.0, 0.0, 1.0]),
    ]
    .into_iter()
    .chain((10..14).map(|id| capture(id, CaptureShape::Sphere, [0.5, 0.5, 0.5])))
    .collect();

    let image = run_update(&mut array, &grown).unwrap();

    // Stale id is gone; survivors kept their contents.
    assert!(array.slot_of(2).is_none());
    assert_eq!(slot_color(&image, array.slot_of(1).unwrap()), [1.0, 0.0, 0.0]);
    assert_eq!(slot_color(&image, array.slot_of(3).unwrap()), [0.0, 0.0, 1.0]);
    for id in 10..14 {
        assert_eq!(
            slot_color(&image, array.slot_of(id).unwrap()),
            [0.5, 0.5, 0.5]
        );
    }
}
