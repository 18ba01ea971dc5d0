use bytemuck::{Pod, Zeroable};
use candela_gpu::{DeviceCapabilities, Format, ImageDesc};
use candela_rg::{self as rg, SimpleComputePass};

use super::{GbufferDepth, PingPongTemporalResource};
use crate::settings::RayTracingConfig;

/// How many shadowed lights one batched denoise call accepts.
pub const MAX_SHADOW_DENOISE_BATCH: usize = 4;

/// Polychromatic penumbra harmonics arrive as a fixed 4+1 band stack per
/// channel.
pub const PENUMBRA_HARMONIC_BANDS: usize = 5;

/// Spherical-harmonic GI travels as a 4-texture bundle.
pub const SH_GI_TEXTURE_COUNT: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalKind {
    ShadowPenumbra,
    Reflections,
    AmbientOcclusion,
    DiffuseIndirect,
    SkyLight,
    PolychromaticPenumbraHarmonics,
    SphericalHarmonicGi,
}

/// Everything a denoise call needs besides the signal itself. History
/// handles live in the temporal graph; `history_valid` is false on the
/// first frame, after a camera cut, and after a resize, and every operation
/// must branch to its documented cold-start behavior when it is.
pub struct DenoiserContext<'a> {
    pub gbuffer_depth: &'a GbufferDepth,
    pub reprojection_map: &'a rg::Handle<rg::Image>,
    pub history_valid: bool,
}

pub struct ShadowVisibilityInput {
    pub penumbra: rg::Handle<rg::Image>,
    pub closest_occluder: rg::Handle<rg::Image>,
}

pub struct ReflectionsSignal {
    pub color: rg::Handle<rg::Image>,
    pub ray_hit_distance: rg::Handle<rg::Image>,
    pub ray_imaginary_depth: rg::Handle<rg::Image>,
}

pub struct AmbientOcclusionSignal {
    pub mask: rg::Handle<rg::Image>,
    pub ray_hit_distance: rg::Handle<rg::Image>,
}

pub struct DiffuseIndirectSignal {
    pub color: rg::Handle<rg::Image>,
    pub ambient_occlusion_mask: Option<rg::Handle<rg::Image>>,
    pub ray_hit_distance: Option<rg::Handle<rg::Image>>,
}

pub struct DenoisedDiffuseIndirect {
    pub color: rg::ReadOnlyHandle<rg::Image>,
    pub ambient_occlusion_mask: Option<rg::ReadOnlyHandle<rg::Image>>,
}

pub struct PenumbraHarmonics {
    pub bands: [rg::Handle<rg::Image>; PENUMBRA_HARMONIC_BANDS],
}

pub struct DenoisedPenumbra {
    pub diffuse: rg::ReadOnlyHandle<rg::Image>,
    pub specular: rg::ReadOnlyHandle<rg::Image>,
}

pub struct DenoisedProbeHierarchyLighting {
    pub diffuse: rg::ReadOnlyHandle<rg::Image>,
    pub specular: rg::ReadOnlyHandle<rg::Image>,
}

/// The pluggable screen-space denoiser contract. One strategy serves a whole
/// frame; it is chosen before any tracing pass records, based on
/// `supports_signal`, so an unsupported signal kind is a configuration-time
/// decision and never a mid-frame failure. Implementations only declare
/// passes into the graph; they never block or read back.
pub trait SignalDenoiser {
    fn supports_signal(&self, kind: SignalKind, caps: &DeviceCapabilities) -> bool;

    /// Batches up to `MAX_SHADOW_DENOISE_BATCH` lights' penumbra signals
    /// into one call.
    fn denoise_shadow_visibility_batch(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        inputs: &[ShadowVisibilityInput],
        configs: &[RayTracingConfig],
    ) -> Vec<rg::ReadOnlyHandle<rg::Image>>;

    fn denoise_polychromatic_penumbra_harmonics(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        diffuse_harmonics: PenumbraHarmonics,
        specular_harmonics: PenumbraHarmonics,
    ) -> DenoisedPenumbra;

    fn denoise_reflections(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        signal: ReflectionsSignal,
        config: RayTracingConfig,
    ) -> rg::ReadOnlyHandle<rg::Image>;

    fn denoise_ambient_occlusion(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        signal: AmbientOcclusionSignal,
        config: RayTracingConfig,
    ) -> rg::ReadOnlyHandle<rg::Image>;

    fn denoise_diffuse_indirect(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        signal: DiffuseIndirectSignal,
        config: RayTracingConfig,
    ) -> DenoisedDiffuseIndirect;

    /// Identical signature to `denoise_diffuse_indirect`, tracked as a
    /// distinct signal: sky light has its own temporal characteristics and
    /// must never share history with GI.
    fn denoise_sky_light(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        signal: DiffuseIndirectSignal,
        config: RayTracingConfig,
    ) -> DenoisedDiffuseIndirect;

    fn denoise_diffuse_indirect_harmonic(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        bundle: [rg::Handle<rg::Image>; SH_GI_TEXTURE_COUNT],
        config: RayTracingConfig,
    ) -> [rg::ReadOnlyHandle<rg::Image>; SH_GI_TEXTURE_COUNT];

    /// The entry point the probe-hierarchy engine calls: dispatches to the
    /// generic diffuse-indirect path internally, but carries the hierarchy's
    /// compressed depth / shading-model auxiliaries for sharper edge
    /// stopping.
    #[allow(clippy::too_many_arguments)]
    fn denoise_indirect_probe_hierarchy(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        diffuse: rg::Handle<rg::Image>,
        specular: rg::Handle<rg::Image>,
        compressed_depth: rg::Handle<rg::Image>,
        compressed_shading_model: rg::Handle<rg::Image>,
    ) -> DenoisedProbeHierarchyLighting;
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct DenoiseTemporalConstants {
    pub history_valid: u32,
    pub blend_factor: f32,
    pub _pad: [u32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct DenoiseSpatialConstants {
    pub step_size: u32,
    pub kernel_radius: u32,
    pub _pad: [u32; 2],
}

/// The built-in temporal + spatial strategy. History lives in per-signal
/// ping-pong temporal resources; the caller's view state owns the storage
/// and this type only holds the keys.
pub struct DefaultDenoiser {
    shadow: Vec<PingPongTemporalResource>,
    reflections: PingPongTemporalResource,
    ambient_occlusion: PingPongTemporalResource,
    diffuse: PingPongTemporalResource,
    sky: PingPongTemporalResource,
    sh_gi: Vec<PingPongTemporalResource>,
    penumbra_diffuse: PingPongTemporalResource,
    penumbra_specular: PingPongTemporalResource,
    probe_specular: PingPongTemporalResource,
}

impl Default for DefaultDenoiser {
    fn default() -> Self {
        Self {
            shadow: (0..MAX_SHADOW_DENOISE_BATCH)
                .map(|i| PingPongTemporalResource::new(&format!("denoise.shadow{}", i)))
                .collect(),
            reflections: PingPongTemporalResource::new("denoise.reflections"),
            ambient_occlusion: PingPongTemporalResource::new("denoise.ao"),
            diffuse: PingPongTemporalResource::new("denoise.diffuse"),
            sky: PingPongTemporalResource::new("denoise.sky"),
            sh_gi: (0..SH_GI_TEXTURE_COUNT)
                .map(|i| PingPongTemporalResource::new(&format!("denoise.sh_gi{}", i)))
                .collect(),
            penumbra_diffuse: PingPongTemporalResource::new("denoise.penumbra_diffuse"),
            penumbra_specular: PingPongTemporalResource::new("denoise.penumbra_specular"),
            probe_specular: PingPongTemporalResource::new("denoise.probe_specular"),
        }
    }
}

impl DefaultDenoiser {
    /// The reconstruction filter widens as the tracing rate drops: fewer
    /// rays or a lower tracing resolution need more spatial support.
    fn kernel_radius(config: RayTracingConfig) -> u32 {
        let base = (1.0 / config.resolution_fraction).ceil() as u32;
        (base + 4 / config.ray_count_per_pixel.max(1)).clamp(1, 8)
    }

    /// Temporal accumulate + history write, the shared backbone of every
    /// signal path. On cold start the output is the current input and the
    /// temporally accumulated term starts from zero, never from stale
    /// memory.
    fn filter_temporal(
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        input: &rg::Handle<rg::Image>,
        temporal: &mut PingPongTemporalResource,
    ) -> rg::Handle<rg::Image> {
        let desc = *input.desc();
        let (mut history_output_tex, history_tex) = temporal.get_output_and_history(rg, desc);

        let mut filtered_tex = rg.create(desc);

        SimpleComputePass::new_compute(rg.add_pass("denoise temporal"), "denoise_temporal")
            .read(input)
            .read(&history_tex)
            .read(ctx.reprojection_map)
            .write(&mut filtered_tex)
            .write(&mut history_output_tex)
            .constants(DenoiseTemporalConstants {
                history_valid: ctx.history_valid as u32,
                blend_factor: 0.9,
                _pad: [0; 2],
            })
            .dispatch(desc.extent);

        filtered_tex
    }

    fn filter_spatial(
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        input: &rg::Handle<rg::Image>,
        config: RayTracingConfig,
    ) -> rg::Handle<rg::Image> {
        let desc = *input.desc();
        let mut output_tex = rg.create(desc);

        SimpleComputePass::new_compute(rg.add_pass("denoise spatial"), "denoise_spatial")
            .read(input)
            .read(&ctx.gbuffer_depth.depth)
            .write(&mut output_tex)
            .constants(DenoiseSpatialConstants {
                step_size: 1,
                kernel_radius: Self::kernel_radius(config),
                _pad: [0; 2],
            })
            .dispatch(desc.extent);

        output_tex
    }

    fn filter_signal(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        input: &rg::Handle<rg::Image>,
        temporal_key: TemporalSlot,
        config: RayTracingConfig,
    ) -> rg::ReadOnlyHandle<rg::Image> {
        let temporal = self.temporal_slot(temporal_key);
        let accumulated = Self::filter_temporal(rg, ctx, input, temporal);
        Self::filter_spatial(rg, ctx, &accumulated, config).into()
    }

    fn temporal_slot(&mut self, slot: TemporalSlot) -> &mut PingPongTemporalResource {
        match slot {
            TemporalSlot::Shadow(i) => &mut self.shadow[i],
            TemporalSlot::Reflections => &mut self.reflections,
            TemporalSlot::AmbientOcclusion => &mut self.ambient_occlusion,
            TemporalSlot::Diffuse => &mut self.diffuse,
            TemporalSlot::Sky => &mut self.sky,
            TemporalSlot::ShGi(i) => &mut self.sh_gi[i],
            TemporalSlot::PenumbraDiffuse => &mut self.penumbra_diffuse,
            TemporalSlot::PenumbraSpecular => &mut self.penumbra_specular,
            TemporalSlot::ProbeSpecular => &mut self.probe_specular,
        }
    }
}

#[derive(Clone, Copy)]
enum TemporalSlot {
    Shadow(usize),
    Reflections,
    AmbientOcclusion,
    Diffuse,
    Sky,
    ShGi(usize),
    PenumbraDiffuse,
    PenumbraSpecular,
    ProbeSpecular,
}

impl SignalDenoiser for DefaultDenoiser {
    fn supports_signal(&self, kind: SignalKind, caps: &DeviceCapabilities) -> bool {
        match kind {
            // The penumbra-harmonics reconstruction only exists for
            // hardware-traced penumbra input.
            SignalKind::PolychromaticPenumbraHarmonics => caps.ray_tracing,
            _ => true,
        }
    }

    fn denoise_shadow_visibility_batch(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        inputs: &[ShadowVisibilityInput],
        configs: &[RayTracingConfig],
    ) -> Vec<rg::ReadOnlyHandle<rg::Image>> {
        assert!(inputs.len() <= MAX_SHADOW_DENOISE_BATCH);
        assert_eq!(inputs.len(), configs.len());

        inputs
            .iter()
            .zip(configs)
            .enumerate()
            .map(|(i, (input, config))| {
                let desc = *input.penumbra.desc();
                let mut combined = rg.create(desc);

                // Fold the closest-occluder distance into the penumbra
                // estimate before temporal accumulation.
                SimpleComputePass::new_compute(
                    rg.add_pass("shadow penumbra prefilter"),
                    "denoise_shadow_prefilter",
                )
                .read(&input.penumbra)
                .read(&input.closest_occluder)
                .write(&mut combined)
                .dispatch(desc.extent);

                let accumulated = Self::filter_temporal(rg, ctx, &combined, &mut self.shadow[i]);
                Self::filter_spatial(rg, ctx, &accumulated, *config).into()
            })
            .collect()
    }

    fn denoise_polychromatic_penumbra_harmonics(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        diffuse_harmonics: PenumbraHarmonics,
        specular_harmonics: PenumbraHarmonics,
    ) -> DenoisedPenumbra {
        let diffuse = self.reconstruct_penumbra(rg, ctx, diffuse_harmonics, TemporalSlot::PenumbraDiffuse);
        let specular =
            self.reconstruct_penumbra(rg, ctx, specular_harmonics, TemporalSlot::PenumbraSpecular);
        DenoisedPenumbra { diffuse, specular }
    }

    fn denoise_reflections(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        signal: ReflectionsSignal,
        config: RayTracingConfig,
    ) -> rg::ReadOnlyHandle<rg::Image> {
        let desc = *signal.color.desc();
        let mut reconstructed = rg.create(desc);

        SimpleComputePass::new_compute(
            rg.add_pass("reflections reconstruct"),
            "denoise_reflections_reconstruct",
        )
        .read(&signal.color)
        .read(&signal.ray_hit_distance)
        .read(&signal.ray_imaginary_depth)
        .read(&ctx.gbuffer_depth.depth)
        .write(&mut reconstructed)
        .constants(DenoiseSpatialConstants {
            step_size: 1,
            kernel_radius: Self::kernel_radius(config),
            _pad: [0; 2],
        })
        .dispatch(desc.extent);

        self.filter_signal(rg, ctx, &reconstructed, TemporalSlot::Reflections, config)
    }

    fn denoise_ambient_occlusion(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        signal: AmbientOcclusionSignal,
        config: RayTracingConfig,
    ) -> rg::ReadOnlyHandle<rg::Image> {
        let desc = *signal.mask.desc();
        let mut reconstructed = rg.create(desc);

        SimpleComputePass::new_compute(rg.add_pass("ao reconstruct"), "denoise_ao_reconstruct")
            .read(&signal.mask)
            .read(&signal.ray_hit_distance)
            .write(&mut reconstructed)
            .constants(DenoiseSpatialConstants {
                step_size: 1,
                kernel_radius: Self::kernel_radius(config),
                _pad: [0; 2],
            })
            .dispatch(desc.extent);

        self.filter_signal(rg, ctx, &reconstructed, TemporalSlot::AmbientOcclusion, config)
    }

    fn denoise_diffuse_indirect(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        signal: DiffuseIndirectSignal,
        config: RayTracingConfig,
    ) -> DenoisedDiffuseIndirect {
        let color = self.filter_signal(rg, ctx, &signal.color, TemporalSlot::Diffuse, config);
        let ambient_occlusion_mask = signal
            .ambient_occlusion_mask
            .map(|mask| Self::filter_spatial(rg, ctx, &mask, config).into());

        DenoisedDiffuseIndirect {
            color,
            ambient_occlusion_mask,
        }
    }

    fn denoise_sky_light(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        signal: DiffuseIndirectSignal,
        config: RayTracingConfig,
    ) -> DenoisedDiffuseIndirect {
        let color = self.filter_signal(rg, ctx, &signal.color, TemporalSlot::Sky, config);
        let ambient_occlusion_mask = signal
            .ambient_occlusion_mask
            .map(|mask| Self::filter_spatial(rg, ctx, &mask, config).into());

        DenoisedDiffuseIndirect {
            color,
            ambient_occlusion_mask,
        }
    }

    fn denoise_diffuse_indirect_harmonic(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        bundle: [rg::Handle<rg::Image>; SH_GI_TEXTURE_COUNT],
        config: RayTracingConfig,
    ) -> [rg::ReadOnlyHandle<rg::Image>; SH_GI_TEXTURE_COUNT] {
        let mut outputs = Vec::with_capacity(SH_GI_TEXTURE_COUNT);
        for (i, tex) in bundle.into_iter().enumerate() {
            outputs.push(self.filter_signal(rg, ctx, &tex, TemporalSlot::ShGi(i), config));
        }
        outputs
            .try_into()
            .unwrap_or_else(|_| unreachable!("bundle size is fixed"))
    }

    fn denoise_indirect_probe_hierarchy(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        diffuse: rg::Handle<rg::Image>,
        specular: rg::Handle<rg::Image>,
        compressed_depth: rg::Handle<rg::Image>,
        compressed_shading_model: rg::Handle<rg::Image>,
    ) -> DenoisedProbeHierarchyLighting {
        let config = RayTracingConfig::default();

        // Edge-aware prefilter keyed on the hierarchy's compressed
        // auxiliaries, then the generic diffuse-indirect path.
        let prefilter = |rg: &mut rg::TemporalRenderGraph, input: &rg::Handle<rg::Image>| {
            let desc = *input.desc();
            let mut output = rg.create(desc);
            SimpleComputePass::new_compute(
                rg.add_pass("probe hierarchy prefilter"),
                "denoise_probe_hierarchy_prefilter",
            )
            .read(input)
            .read(&compressed_depth)
            .read(&compressed_shading_model)
            .write(&mut output)
            .dispatch(desc.extent);
            output
        };

        let diffuse_prefiltered = prefilter(rg, &diffuse);
        let specular_prefiltered = prefilter(rg, &specular);

        let diffuse_out = self
            .denoise_diffuse_indirect(
                rg,
                ctx,
                DiffuseIndirectSignal {
                    color: diffuse_prefiltered,
                    ambient_occlusion_mask: None,
                    ray_hit_distance: None,
                },
                config,
            )
            .color;

        let specular_out =
            self.filter_signal(rg, ctx, &specular_prefiltered, TemporalSlot::ProbeSpecular, config);

        DenoisedProbeHierarchyLighting {
            diffuse: diffuse_out,
            specular: specular_out,
        }
    }
}

impl DefaultDenoiser {
    fn reconstruct_penumbra(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        ctx: &DenoiserContext<'_>,
        harmonics: PenumbraHarmonics,
        slot: TemporalSlot,
    ) -> rg::ReadOnlyHandle<rg::Image> {
        let desc = ImageDesc::new_2d(Format::Rgba16Float, harmonics.bands[0].desc().extent_2d());
        let mut reconstructed = rg.create(desc);

        let [b0, b1, b2, b3, b4] = harmonics.bands;
        SimpleComputePass::new_compute(
            rg.add_pass("penumbra harmonics reconstruct"),
            "denoise_penumbra_harmonics",
        )
        .read(&b0)
        .read(&b1)
        .read(&b2)
        .read(&b3)
        .read(&b4)
        .write(&mut reconstructed)
        .dispatch(desc.extent);

        self.filter_signal(rg, ctx, &reconstructed, slot, RayTracingConfig::default())
    }
}
