use bytemuck::{Pod, Zeroable};
use candela_gpu::{Format, ImageDesc, ImageUsageFlags};
use candela_rg::{self as rg, GetOrCreateTemporal, KernelPermutation, SimpleComputePass};

use crate::{
    frame_constants::{FrameConstants, ViewConstants},
    frame_desc::FrameDesc,
    indirect_renderer::{
        FrameExports, IndirectLightingRenderer, ProbeHierarchyExports, TileClassificationExports,
    },
    renderers::{
        ambient_occlusion::trace_ambient_occlusion,
        brute_force_gi::{trace_brute_force_gi, BruteForceGiConstants},
        composite::{composite_indirect_lighting, CompositeInputs, CompositePermutation},
        denoiser::{
            AmbientOcclusionSignal, DenoiserContext, DiffuseIndirectSignal, ReflectionsSignal,
            SignalKind,
        },
        final_gather::{trace_final_gather, FinalGatherConstants},
        probe_hierarchy::{build_probe_hierarchy, PROBE_EMIT_TILE_SIZE},
        probe_trace::{
            refine_specular_tiles, resolve_probe_indexes, trace_indirect_lighting,
            trace_probe_atlas, trace_probe_occlusion, ProbeTraceConstants,
        },
        reflections::{trace_reflections, ReflectionTraceConstants},
        reprojection::{calculate_reprojection_map, ReprojectionConstants},
        screen_space_gi::trace_screen_space_gi,
        sky,
        tile_classification::{classify_tiles, TileClassificationContext},
        GbufferDepth,
    },
    scene::SceneInputs,
    settings::{GiMethod, RenderSettings},
    view::ViewState,
};

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct SkyLightTraceConstants {
    pub sky_color: [f32; 3],
    pub enabled: u32,
}

impl IndirectLightingRenderer {
    /// Records the whole indirect-lighting frame: sampling sequences and
    /// shared inputs first, then reflections, diffuse GI by the selected
    /// method, ambient occlusion, the denoiser, and finally compositing
    /// into scene color. Configuration is snapshotted up front and never
    /// re-read mid-graph.
    pub fn prepare_render_graph(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        view: &ViewState,
        frame: &FrameDesc,
        scene: &SceneInputs,
        settings: &RenderSettings,
    ) -> FrameExports {
        let settings = settings.clamped_for_frame();
        let caps = *rg.device().capabilities();
        let use_rt = settings.ray_tracing_active(&caps);

        // Path selection happens here, against capabilities, before any
        // tracing pass records. Denoiser support is part of the gate.
        let gi_method = match settings.gi_method {
            m @ (GiMethod::BruteForceRayTrace | GiMethod::FinalGather) if !use_rt => {
                log::info!(
                    "{:?} requires hardware ray tracing; falling back to screen space",
                    m
                );
                GiMethod::ScreenSpace
            }
            m => m,
        };
        assert!(
            self.denoiser.supports_signal(SignalKind::DiffuseIndirect, &caps)
                && self.denoiser.supports_signal(SignalKind::Reflections, &caps)
                && self.denoiser.supports_signal(SignalKind::AmbientOcclusion, &caps),
            "active denoiser strategy cannot serve the selected signal kinds"
        );

        self.sky.set_sky(&scene.sky);

        let history_valid = view.history_valid();
        let frame_index = view.frame_index;
        let view_constants = ViewConstants::new(&frame.camera);
        let prev_view_constants = view
            .prev_camera
            .as_ref()
            .map(ViewConstants::new)
            .unwrap_or(view_constants);

        let coarsest_tile = PROBE_EMIT_TILE_SIZE << (settings.hierarchy_depth - 1);
        let tile_jitter = FrameConstants::tile_jitter_for_frame(frame_index, coarsest_tile);

        // Scene inputs, read-only for the whole graph.
        let read_access = rg::AccessType::AnyShaderReadSampledImageOrUniformTexelBuffer;
        let gbuffer = rg.import_image(scene.gbuffer.clone(), read_access);
        let depth = rg.import_image(scene.depth.clone(), read_access);
        let geometric_normal = rg.import_image(scene.geometric_normal.clone(), read_access);
        let velocity = rg.import_image(scene.velocity.clone(), read_access);
        let gbuffer_depth = GbufferDepth::new(geometric_normal, gbuffer, depth);

        let lights = scene.clamped_lights();
        let light_count = lights.len() as u32;
        let sky_color = if scene.sky.enabled && settings.sky_light_enabled {
            scene.sky.color
        } else {
            [0.0; 3]
        };
        let sky_enabled = (scene.sky.enabled && settings.sky_light_enabled) as u32;

        // Last frame's composited radiance doubles as the screen-space ray
        // source; reads are recorded before the composite write below, so
        // they observe the previous frame.
        let mut accum_img = rg
            .get_or_create_temporal(
                "root.accum",
                ImageDesc::new_2d(Format::Rgba16Float, frame.render_extent)
                    .usage(ImageUsageFlags::SAMPLED | ImageUsageFlags::STORAGE),
            )
            .unwrap();

        let reprojection_map = calculate_reprojection_map(
            rg,
            &gbuffer_depth,
            &velocity,
            ReprojectionConstants {
                view: view_constants,
                prev_view: prev_view_constants,
                history_valid: history_valid as u32,
                _pad: [0; 3],
            },
        );

        let sky_cube = sky::render_sky_cube(rg, &scene.sky);
        let convolved_sky_cube = sky::convolve_cube(rg, &sky_cube);
        let sky_importance = self.sky.prepare_importance_map(rg, &sky_cube);

        let capture_array = if caps.texture_cube_array {
            self.captures.update(rg, &scene.captures)
        } else {
            None
        };

        // Tile classification feeds both the compacted consume dispatches
        // and the compressed per-tile summaries the denoiser keys on.
        let tiles = classify_tiles(rg, &gbuffer_depth);
        let (compressed_depth, compressed_shading_model) =
            compress_gbuffer_aux(rg, &tiles);

        let tile_exports = TileClassificationExports {
            classification: rg.export(&tiles.classification_tex, rg::AccessType::Nothing),
            category_counts: rg.export(&tiles.category_counts_buf, rg::AccessType::Nothing),
            tile_lists: rg.export(&tiles.tile_lists_buf, rg::AccessType::Nothing),
            dispatch_args: rg.export(&tiles.dispatch_args_buf, rg::AccessType::Nothing),
            tile_count: tiles.tile_count,
        };

        // (2) Reflections.
        let traced_reflections = trace_reflections(
            rg,
            &gbuffer_depth,
            &accum_img,
            lights.clone(),
            ReflectionTraceConstants {
                view: view_constants,
                output_extent: [0; 2],
                frame_index,
                ray_count_per_pixel: 0,
                sky_color,
                sky_enabled,
                light_count,
                history_valid: history_valid as u32,
                _pad: [0; 2],
            },
            settings.reflections,
            use_rt,
        );

        // (3) Diffuse GI by the selected method.
        let denoiser_ctx = DenoiserContext {
            gbuffer_depth: &gbuffer_depth,
            reprojection_map: &reprojection_map,
            history_valid,
        };

        let mut probe_exports = None;

        let (raw_diffuse_export, denoised_diffuse, probe_specular) = match gi_method {
            GiMethod::ProbeHierarchy => {
                let hierarchy = build_probe_hierarchy(
                    rg,
                    &gbuffer_depth,
                    view_constants,
                    tile_jitter,
                    frame_index,
                    &settings,
                );

                let trace_constants = ProbeTraceConstants {
                    hierarchy: hierarchy.constants,
                    sky_color,
                    sky_enabled,
                    light_count,
                    samples_per_pixel: settings.diffuse.ray_count_per_pixel,
                    probes_per_row: 0,
                    history_valid: history_valid as u32,
                };

                let resolved = resolve_probe_indexes(rg, &gbuffer_depth, &hierarchy);
                let (diffuse_mask, specular_mask) = trace_probe_occlusion(
                    rg,
                    &gbuffer_depth,
                    &resolved,
                    &accum_img,
                    trace_constants,
                    use_rt,
                );
                let atlas = trace_probe_atlas(
                    rg,
                    &hierarchy,
                    &sky_importance,
                    lights.clone(),
                    trace_constants,
                );
                let mut traced = trace_indirect_lighting(
                    rg,
                    &gbuffer_depth,
                    &hierarchy,
                    &resolved,
                    &atlas,
                    diffuse_mask,
                    specular_mask,
                    trace_constants,
                );

                refine_specular_tiles(rg, &tiles, &mut traced.specular_tex);

                probe_exports = Some(ProbeHierarchyExports {
                    probes: rg.export(&hierarchy.probes_buf, rg::AccessType::Nothing),
                    hierarchy_info: rg
                        .export(&hierarchy.hierarchy_info_buf, rg::AccessType::Nothing),
                    depth_bounds: rg
                        .export(&hierarchy.depth_bounds_pyramid, rg::AccessType::Nothing),
                    atlas: rg.export(&atlas.atlas_tex, rg::AccessType::Nothing),
                    level_count: hierarchy.level_count,
                    max_probe_count: hierarchy.constants.max_probe_count,
                    probes_per_row: atlas.probes_per_row,
                    atlas_resolution: hierarchy.constants.atlas_resolution,
                    supersampling: hierarchy.constants.supersampling,
                });

                let raw_export = rg.export(&traced.diffuse_tex, rg::AccessType::Nothing);

                let denoised = self.denoiser.denoise_indirect_probe_hierarchy(
                    rg,
                    &denoiser_ctx,
                    traced.diffuse_tex,
                    traced.specular_tex,
                    compressed_depth,
                    compressed_shading_model,
                );

                (raw_export, denoised.diffuse, Some(denoised.specular))
            }
            method => {
                let raw_diffuse = match method {
                    GiMethod::ScreenSpace => trace_screen_space_gi(
                        rg,
                        &gbuffer_depth,
                        &accum_img,
                        &reprojection_map,
                        frame_index,
                        settings.diffuse.ray_count_per_pixel,
                        history_valid,
                    ),
                    GiMethod::BruteForceRayTrace => trace_brute_force_gi(
                        rg,
                        &gbuffer_depth,
                        lights.clone(),
                        BruteForceGiConstants {
                            view: view_constants,
                            output_extent: [0; 2],
                            frame_index,
                            ray_count_per_pixel: settings.diffuse.ray_count_per_pixel,
                            sky_color,
                            sky_enabled,
                            light_count,
                            _pad: [0; 3],
                        },
                    ),
                    GiMethod::FinalGather => trace_final_gather(
                        rg,
                        &gbuffer_depth,
                        lights.clone(),
                        FinalGatherConstants {
                            view: view_constants,
                            prev_view: prev_view_constants,
                            screen_extent: frame.render_extent,
                            gather_extent: [0; 2],
                            frame_index,
                            history_valid: history_valid as u32,
                            sky_color,
                            sky_enabled,
                            light_count,
                            _pad: [0; 3],
                        },
                    ),
                    GiMethod::ProbeHierarchy => unreachable!(),
                };

                let raw_export = rg.export(&raw_diffuse, rg::AccessType::Nothing);

                let denoised = self.denoiser.denoise_diffuse_indirect(
                    rg,
                    &denoiser_ctx,
                    DiffuseIndirectSignal {
                        color: raw_diffuse,
                        ambient_occlusion_mask: None,
                        ray_hit_distance: None,
                    },
                    settings.diffuse,
                );

                (raw_export, denoised.color, None)
            }
        };

        // (4) Ambient occlusion.
        let traced_ao = trace_ambient_occlusion(
            rg,
            &gbuffer_depth,
            frame_index,
            settings.ambient_occlusion,
        );
        let raw_ao_export = rg.export(&traced_ao.mask_tex, rg::AccessType::Nothing);

        // (5) Denoise the remaining signals.
        let denoised_reflections = self.denoiser.denoise_reflections(
            rg,
            &denoiser_ctx,
            ReflectionsSignal {
                color: traced_reflections.color_tex,
                ray_hit_distance: traced_reflections.ray_hit_distance_tex,
                ray_imaginary_depth: traced_reflections.ray_imaginary_depth_tex,
            },
            settings.reflections,
        );

        let denoised_ao = self.denoiser.denoise_ambient_occlusion(
            rg,
            &denoiser_ctx,
            AmbientOcclusionSignal {
                mask: traced_ao.mask_tex,
                ray_hit_distance: traced_ao.ray_hit_distance_tex,
            },
            settings.ambient_occlusion,
        );

        let specular_final: rg::ReadOnlyHandle<rg::Image> = match probe_specular {
            Some(probe_specular) => {
                combine_specular(rg, &denoised_reflections, &probe_specular).into()
            }
            None => denoised_reflections,
        };

        let denoised_sky = if settings.sky_light_enabled {
            let mut raw_sky = rg.create(ImageDesc::new_2d(
                Format::Rg11b10Float,
                frame.render_extent,
            ));
            SimpleComputePass::new_compute(rg.add_pass("sky light"), "sky_light_trace")
                .read(&gbuffer_depth.gbuffer)
                .read(&convolved_sky_cube)
                .write(&mut raw_sky)
                .constants(SkyLightTraceConstants {
                    sky_color,
                    enabled: sky_enabled,
                })
                .dispatch([frame.render_extent[0], frame.render_extent[1], 1]);

            Some(
                self.denoiser
                    .denoise_sky_light(
                        rg,
                        &denoiser_ctx,
                        DiffuseIndirectSignal {
                            color: raw_sky,
                            ambient_occlusion_mask: None,
                            ray_hit_distance: None,
                        },
                        settings.diffuse,
                    )
                    .color,
            )
        } else {
            None
        };

        // (6) Composite into scene color.
        let permutation = CompositePermutation {
            has_box_captures: capture_array.is_some() && scene.has_box_captures(),
            has_sphere_captures: capture_array.is_some() && scene.has_sphere_captures(),
            apply_ambient_occlusion: settings.apply_ambient_occlusion_in_composite,
            sky_light: settings.sky_light_enabled,
            dynamic_sky_light: settings.dynamic_sky_light,
            sky_shadowing: settings.sky_shadowing,
            ray_traced_reflections: use_rt,
        }
        .remap();

        let dummy_sky;
        let sky_light_tex = match &denoised_sky {
            Some(tex) => &**tex,
            None => {
                dummy_sky = cleared_dummy(rg, Format::Rg11b10Float);
                &dummy_sky
            }
        };

        let dummy_captures;
        let capture_tex = match &capture_array {
            Some(tex) => tex,
            None => {
                dummy_captures = cleared_dummy(rg, Format::Rgba16Float);
                &dummy_captures
            }
        };

        composite_indirect_lighting(
            rg,
            &mut accum_img,
            CompositeInputs {
                diffuse: &denoised_diffuse,
                specular: &specular_final,
                ambient_occlusion: &denoised_ao,
                sky_light: sky_light_tex,
                capture_array: capture_tex,
            },
            permutation,
            scene.captures.len() as u32,
        );

        FrameExports {
            scene_color: rg.export(&accum_img, rg::AccessType::Nothing),
            diffuse_indirect: rg.export(&*denoised_diffuse, rg::AccessType::Nothing),
            specular_indirect: rg.export(&*specular_final, rg::AccessType::Nothing),
            ambient_occlusion: rg.export(&*denoised_ao, rg::AccessType::Nothing),
            sky_light: denoised_sky
                .as_ref()
                .map(|tex| rg.export(&**tex, rg::AccessType::Nothing)),
            raw_diffuse: raw_diffuse_export,
            raw_ambient_occlusion: raw_ao_export,
            tile_classification: tile_exports,
            probe_hierarchy: probe_exports,
        }
    }
}

/// Compressed per-tile auxiliaries unpacked from the classification summary:
/// a depth proxy and the dominant shading model id, consumed by the
/// probe-hierarchy denoiser entry point for edge stopping.
fn compress_gbuffer_aux(
    rg: &mut rg::RenderGraph,
    tiles: &TileClassificationContext,
) -> (rg::Handle<rg::Image>, rg::Handle<rg::Image>) {
    let mut compressed_depth =
        rg.create(ImageDesc::new_2d(Format::R16Float, tiles.tile_count));
    let mut compressed_shading =
        rg.create(ImageDesc::new_2d(Format::R8Uint, tiles.tile_count));

    SimpleComputePass::new_compute(rg.add_pass("compress gbuffer aux"), "compress_gbuffer_aux")
        .read(&tiles.classification_tex)
        .write(&mut compressed_depth)
        .write(&mut compressed_shading)
        .dispatch([tiles.tile_count[0], tiles.tile_count[1], 1]);

    (compressed_depth, compressed_shading)
}

fn combine_specular(
    rg: &mut rg::RenderGraph,
    reflections: &rg::Handle<rg::Image>,
    probe_specular: &rg::Handle<rg::Image>,
) -> rg::Handle<rg::Image> {
    let mut out = rg.create(*reflections.desc());
    SimpleComputePass::new_compute(rg.add_pass("combine specular"), "combine_specular")
        .read(reflections)
        .read(probe_specular)
        .write(&mut out)
        .dispatch(out.desc().extent);
    out
}

fn cleared_dummy(rg: &mut rg::RenderGraph, format: Format) -> rg::Handle<rg::Image> {
    let mut tex = rg.create(ImageDesc::new_2d(format, [1, 1]));
    rg::imageops::clear_color(rg, &mut tex, [0.0; 4]);
    tex
}
