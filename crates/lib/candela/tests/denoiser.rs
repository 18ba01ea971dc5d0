//! Denoiser contract tests: signal support queries, the batched shadow
//! entry point, the harmonic bundles, and cold-start zeroing of the
//! temporal path.

mod common;

use candela::{
    gpu::{DeviceCapabilities, Format, ImageDesc},
    renderers::{
        denoiser::{
            DefaultDenoiser, DenoiserContext, PenumbraHarmonics, ShadowVisibilityInput,
            SignalDenoiser, SignalKind, MAX_SHADOW_DENOISE_BATCH, SH_GI_TEXTURE_COUNT,
        },
        reprojection::{calculate_reprojection_map, ReprojectionConstants},
        GbufferDepth,
    },
    frame_constants::{CameraMatrices, ViewConstants},
    rg::{
        self as rg, AccessType, RenderGraphExecutionParams, TemporalRenderGraph,
        TemporalRenderGraphState,
    },
    scene::SceneInputs,
    RayTracingConfig,
};

fn denoiser_harness(
    scene: &SceneInputs,
    run: impl FnOnce(
        &mut TemporalRenderGraph,
        &DenoiserContext<'_>,
        &mut DefaultDenoiser,
    ) -> Vec<rg::ExportedHandle<rg::Image>>,
) -> Vec<Vec<[f32; 4]>> {
    let device = common::device(false);
    let registry = common::registry();

    let mut rg = TemporalRenderGraph::new(TemporalRenderGraphState::default(), device.clone());
    let read = AccessType::AnyShaderReadSampledImageOrUniformTexelBuffer;
    let gbuffer = rg.import_image(scene.gbuffer.clone(), read);
    let depth = rg.import_image(scene.depth.clone(), read);
    let normal = rg.import_image(scene.geometric_normal.clone(), read);
    let velocity = rg.import_image(scene.velocity.clone(), read);
    let gbuffer_depth = GbufferDepth::new(normal, gbuffer, depth);

    let view = ViewConstants::new(&CameraMatrices::identity());
    let reprojection_map = calculate_reprojection_map(
        &mut rg,
        &gbuffer_depth,
        &velocity,
        ReprojectionConstants {
            view,
            prev_view: view,
            history_valid: 0,
            _pad: [0; 3],
        },
    );

    let ctx = DenoiserContext {
        gbuffer_depth: &gbuffer_depth,
        reprojection_map: &reprojection_map,
        history_valid: false,
    };

    let mut denoiser = DefaultDenoiser::default();
    let exports = run(&mut rg, &ctx, &mut denoiser);

    let (rg, exported_temporal) = rg.export_temporal();
    let retired = rg
        .execute(RenderGraphExecutionParams {
            device: &device,
            kernels: &registry,
        })
        .unwrap();
    let _ = exported_temporal.retire_temporal(&retired);

    exports
        .into_iter()
        .map(|handle| common::image_texels(&retired.exported_image(handle)))
        .collect()
}

fn noise_image(rg: &mut TemporalRenderGraph, extent: [u32; 2], value: f32) -> rg::Handle<rg::Image> {
    let mut tex = rg.create(ImageDesc::new_2d(Format::Rgba16Float, extent));
    rg::imageops::clear_color(rg, &mut tex, [value, value, value, 1.0]);
    tex
}

#[test]
fn default_denoiser_gates_penumbra_harmonics_on_ray_tracing() {
    let denoiser = DefaultDenoiser::default();

    let no_rt = DeviceCapabilities {
        ray_tracing: false,
        texture_cube_array: true,
    };
    let rt = DeviceCapabilities {
        ray_tracing: true,
        texture_cube_array: true,
    };

    assert!(!denoiser.supports_signal(SignalKind::PolychromaticPenumbraHarmonics, &no_rt));
    assert!(denoiser.supports_signal(SignalKind::PolychromaticPenumbraHarmonics, &rt));

    for kind in [
        SignalKind::ShadowPenumbra,
        SignalKind::Reflections,
        SignalKind::AmbientOcclusion,
        SignalKind::DiffuseIndirect,
        SignalKind::SkyLight,
        SignalKind::SphericalHarmonicGi,
    ] {
        assert!(denoiser.supports_signal(kind, &no_rt));
    }
}

#[test]
fn shadow_batch_denoises_each_light_separately() {
    let device = common::device(false);
    let scene = common::flat_scene(&device, [32, 32]);

    let results = denoiser_harness(&scene, |rg, ctx, denoiser| {
        let inputs: Vec<ShadowVisibilityInput> = (0..MAX_SHADOW_DENOISE_BATCH)
            .map(|i| ShadowVisibilityInput {
                penumbra: noise_image(rg, [32, 32], 0.25 * (i as f32 + 1.0)),
                closest_occluder: noise_image(rg, [32, 32], 1.0),
            })
            .collect();
        let configs = vec![RayTracingConfig::default(); MAX_SHADOW_DENOISE_BATCH];

        let outputs = denoiser.denoise_shadow_visibility_batch(rg, ctx, &inputs, &configs);
        assert_eq!(outputs.len(), MAX_SHADOW_DENOISE_BATCH);
        outputs
            .iter()
            .map(|o| rg.export(&**o, AccessType::Nothing))
            .collect()
    });

    // A constant penumbra field survives the filter chain untouched, and
    // the four lights keep their own values (no history cross-talk).
    for (i, texels) in results.iter().enumerate() {
        let expected = 0.25 * (i as f32 + 1.0);
        for texel in texels {
            assert!(
                (texel[0] - expected).abs() < 1e-4,
                "light {}: {} != {}",
                i,
                texel[0],
                expected,
            );
        }
    }
}

#[test]
fn harmonic_bundle_round_trips_through_the_denoiser() {
    let device = common::device(false);
    let scene = common::flat_scene(&device, [32, 32]);

    let results = denoiser_harness(&scene, |rg, ctx, denoiser| {
        let bundle: [rg::Handle<rg::Image>; SH_GI_TEXTURE_COUNT] = std::array::from_fn(|i| {
            noise_image(rg, [32, 32], 0.1 * (i as f32 + 1.0))
        });

        let outputs = denoiser.denoise_diffuse_indirect_harmonic(
            rg,
            ctx,
            bundle,
            RayTracingConfig::default(),
        );
        outputs
            .iter()
            .map(|o| rg.export(&**o, AccessType::Nothing))
            .collect()
    });

    assert_eq!(results.len(), SH_GI_TEXTURE_COUNT);
    for (i, texels) in results.iter().enumerate() {
        let expected = 0.1 * (i as f32 + 1.0);
        for texel in texels {
            assert!((texel[0] - expected).abs() < 1e-4);
        }
    }
}

#[test]
fn penumbra_harmonics_reconstruct_to_a_single_channel() {
    let device = common::device(false);
    let scene = common::flat_scene(&device, [32, 32]);

    let results = denoiser_harness(&scene, |rg, ctx, denoiser| {
        let make_bands = |rg: &mut TemporalRenderGraph| PenumbraHarmonics {
            bands: std::array::from_fn(|_| noise_image(rg, [32, 32], 0.5)),
        };
        let diffuse = make_bands(rg);
        let specular = make_bands(rg);

        let out = denoiser.denoise_polychromatic_penumbra_harmonics(rg, ctx, diffuse, specular);
        vec![
            rg.export(&*out.diffuse, AccessType::Nothing),
            rg.export(&*out.specular, AccessType::Nothing),
        ]
    });

    // Equal bands with normalized weights reconstruct to the band value.
    for texels in &results {
        for texel in texels {
            assert!((texel[0] - 0.5).abs() < 1e-4);
        }
    }
}

#[test]
fn temporal_path_starts_from_zero_without_history() {
    let device = common::device(false);
    let scene = common::flat_scene(&device, [32, 32]);

    let results = denoiser_harness(&scene, |rg, ctx, denoiser| {
        let zero = noise_image(rg, [32, 32], 0.0);
        let out = denoiser.denoise_diffuse_indirect(
            rg,
            ctx,
            candela::renderers::denoiser::DiffuseIndirectSignal {
                color: zero,
                ambient_occlusion_mask: None,
                ray_hit_distance: None,
            },
            RayTracingConfig::default(),
        );
        vec![rg.export(&*out.color, AccessType::Nothing)]
    });

    for texel in &results[0] {
        assert_eq!(texel[..3], [0.0; 3]);
    }
}
