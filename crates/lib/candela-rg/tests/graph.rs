//! Graph-builder contract tests: declared-order execution, pass culling,
//! the read-before-write assertion, zero-group indirect dispatches, and the
//! temporal export/retire handoff.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use candela_gpu::{
    BufferDesc, BufferUsageFlags, Device, DeviceCapabilities, DispatchIndirectArgs, Format,
    GpuError, ImageDesc, KernelCtx, KernelRegistry,
};
use candela_rg::{
    AccessType, GetOrCreateTemporal, RenderGraph, RenderGraphExecutionParams, SimpleComputePass,
    TemporalRenderGraph, TemporalRenderGraphState,
};

fn device() -> Arc<Device> {
    Arc::new(Device::new(DeviceCapabilities::default()))
}

fn small_image() -> ImageDesc {
    ImageDesc::new_2d(Format::R32Float, [4, 4])
}

#[test]
fn passes_execute_in_declared_order() {
    let device = device();
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let mut registry = KernelRegistry::default();
    for name in ["first", "second", "third"] {
        let order = order.clone();
        registry.register(name, move |ctx: &mut KernelCtx| {
            order.lock().push(name);
            ctx.image_mut(0).fill([1.0; 4]);
            Ok(())
        });
    }

    let mut rg = RenderGraph::new();
    let mut tex = rg.create(small_image());
    for name in ["first", "second", "third"] {
        SimpleComputePass::new_compute(rg.add_pass(name), name)
            .write(&mut tex)
            .dispatch([4, 4, 1]);
    }
    rg.export(&tex, AccessType::Nothing);

    rg.execute(RenderGraphExecutionParams {
        device: &device,
        kernels: &registry,
    })
    .unwrap();

    assert_eq!(*order.lock(), vec!["first", "second", "third"]);
}

#[test]
fn passes_with_unread_outputs_are_culled() {
    let device = device();
    let ran = Arc::new(AtomicUsize::new(0));

    let mut registry = KernelRegistry::default();
    {
        let ran = ran.clone();
        registry.register("side_effect", move |ctx: &mut KernelCtx| {
            ran.fetch_add(1, Ordering::SeqCst);
            ctx.image_mut(0).fill([1.0; 4]);
            Ok(())
        });
    }
    registry.register("consumer", |ctx: &mut KernelCtx| {
        let v = ctx.image(0).load(0, [0, 0, 0]);
        ctx.image_mut(1).store(0, [0, 0, 0], v);
        Ok(())
    });

    let mut rg = RenderGraph::new();

    // This write lands in a texture nobody reads or exports; culling must
    // remove the pass, side effects and all.
    let mut orphan = rg.create(small_image());
    SimpleComputePass::new_compute(rg.add_pass("orphan"), "side_effect")
        .write(&mut orphan)
        .dispatch([4, 4, 1]);

    let mut live = rg.create(small_image());
    SimpleComputePass::new_compute(rg.add_pass("live"), "side_effect")
        .write(&mut live)
        .dispatch([4, 4, 1]);

    let mut out = rg.create(small_image());
    SimpleComputePass::new_compute(rg.add_pass("consume"), "consumer")
        .read(&live)
        .write(&mut out)
        .dispatch([1, 1, 1]);
    rg.export(&out, AccessType::Nothing);

    rg.execute(RenderGraphExecutionParams {
        device: &device,
        kernels: &registry,
    })
    .unwrap();

    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
#[should_panic(expected = "before any pass wrote it")]
fn reading_an_unwritten_transient_is_rejected() {
    let mut rg = RenderGraph::new();
    let fresh = rg.create(small_image());
    let mut out = rg.create(small_image());

    SimpleComputePass::new_compute(rg.add_pass("bad read"), "whatever")
        .read(&fresh)
        .write(&mut out)
        .dispatch([1, 1, 1]);
}

#[test]
fn zero_group_indirect_dispatch_is_a_noop() {
    let device = device();
    let ran = Arc::new(AtomicUsize::new(0));

    let mut registry = KernelRegistry::default();
    registry.register("args", |ctx: &mut KernelCtx| {
        let args = ctx.buffer_mut(0).as_mut_slice::<DispatchIndirectArgs>();
        args[0] = DispatchIndirectArgs {
            group_count: [0, 1, 1],
            _pad: 0,
        };
        Ok(())
    });
    {
        let ran = ran.clone();
        registry.register("consume", move |ctx: &mut KernelCtx| {
            ran.fetch_add(1, Ordering::SeqCst);
            ctx.image_mut(0).fill([1.0; 4]);
            Ok(())
        });
    }

    let mut rg = RenderGraph::new();
    let mut args_buf = rg.create(BufferDesc::new_gpu_only(
        std::mem::size_of::<DispatchIndirectArgs>(),
        BufferUsageFlags::INDIRECT_BUFFER,
    ));
    SimpleComputePass::new_compute(rg.add_pass("make args"), "args")
        .write(&mut args_buf)
        .dispatch([1, 1, 1]);

    let mut out = rg.create(small_image());
    SimpleComputePass::new_compute(rg.add_pass("consume"), "consume")
        .write(&mut out)
        .dispatch_indirect(&args_buf, 0);
    rg.export(&out, AccessType::Nothing);

    rg.execute(RenderGraphExecutionParams {
        device: &device,
        kernels: &registry,
    })
    .unwrap();

    // The dispatch happened (no launch failure) but ran zero groups.
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn temporal_resources_survive_the_export_retire_handoff() {
    let device = device();

    let mut registry = KernelRegistry::default();
    registry.register("bump", |ctx: &mut KernelCtx| {
        let v = ctx.image(0).load(0, [0, 0, 0]);
        ctx.image_mut(0).store(0, [0, 0, 0], [v[0] + 1.0, 0.0, 0.0, 0.0]);
        Ok(())
    });

    let mut state = TemporalRenderGraphState::default();

    for frame in 0..3 {
        let mut rg = TemporalRenderGraph::new(state, device.clone());
        let mut tex = rg.get_or_create_temporal("counter", small_image()).unwrap();

        SimpleComputePass::new_compute(rg.add_pass("bump"), "bump")
            .write(&mut tex)
            .dispatch([1, 1, 1]);

        let (rg, exported) = rg.export_temporal();
        let retired = rg
            .execute(RenderGraphExecutionParams {
                device: &device,
                kernels: &registry,
            })
            .unwrap();
        state = exported.retire_temporal(&retired);

        let image = state.inert_image("counter").unwrap();
        let value = image.lock().load(0, [0, 0, 0])[0];
        assert_eq!(value, (frame + 1) as f32);
    }
}
