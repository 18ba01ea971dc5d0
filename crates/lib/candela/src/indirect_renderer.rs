use std::sync::Arc;

use candela_gpu::{Device, KernelRegistry, SharedBuffer, SharedImage};
use candela_rg::{self as rg, RenderGraphExecutionParams};

use crate::{
    frame_desc::FrameDesc,
    renderers::{
        denoiser::{DefaultDenoiser, SignalDenoiser},
        reflection_captures::ReflectionCaptureArray,
        sky::SkyRenderer,
    },
    scene::SceneInputs,
    settings::RenderSettings,
    view::ViewState,
};

/// The indirect lighting core. Owns the frame-independent pieces: the
/// denoiser strategy, the sky mip tree, and the reflection capture array.
/// All per-frame state lives in the graph or in the per-view `ViewState`.
pub struct IndirectLightingRenderer {
    pub(crate) device: Arc<Device>,
    pub denoiser: Box<dyn SignalDenoiser>,
    pub sky: SkyRenderer,
    pub captures: ReflectionCaptureArray,
}

impl IndirectLightingRenderer {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            denoiser: Box::<DefaultDenoiser>::default(),
            sky: SkyRenderer::default(),
            captures: ReflectionCaptureArray::default(),
        }
    }

    /// Swap in a third-party denoiser strategy wholesale. Takes effect on
    /// the next frame; strategies are never mixed mid-frame.
    pub fn set_denoiser(&mut self, denoiser: Box<dyn SignalDenoiser>) {
        self.denoiser = denoiser;
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

pub struct TileClassificationExports {
    pub classification: rg::ExportedHandle<rg::Image>,
    pub category_counts: rg::ExportedHandle<rg::Buffer>,
    pub tile_lists: rg::ExportedHandle<rg::Buffer>,
    pub dispatch_args: rg::ExportedHandle<rg::Buffer>,
    pub tile_count: [u32; 2],
}

pub struct ProbeHierarchyExports {
    pub probes: rg::ExportedHandle<rg::Buffer>,
    pub hierarchy_info: rg::ExportedHandle<rg::Buffer>,
    pub depth_bounds: rg::ExportedHandle<rg::Image>,
    pub atlas: rg::ExportedHandle<rg::Image>,
    pub level_count: u32,
    pub max_probe_count: u32,
    pub probes_per_row: u32,
    pub atlas_resolution: u32,
    pub supersampling: u32,
}

/// Handles to everything the frame makes externally observable: the final
/// composited color, the denoised signals, and the raw/diagnostic resources
/// the test-suite properties are written against.
pub struct FrameExports {
    pub scene_color: rg::ExportedHandle<rg::Image>,
    pub diffuse_indirect: rg::ExportedHandle<rg::Image>,
    pub specular_indirect: rg::ExportedHandle<rg::Image>,
    pub ambient_occlusion: rg::ExportedHandle<rg::Image>,
    pub sky_light: Option<rg::ExportedHandle<rg::Image>>,
    pub raw_diffuse: rg::ExportedHandle<rg::Image>,
    pub raw_ambient_occlusion: rg::ExportedHandle<rg::Image>,
    pub tile_classification: TileClassificationExports,
    pub probe_hierarchy: Option<ProbeHierarchyExports>,
}

pub struct TileClassificationOutputs {
    pub classification: SharedImage,
    pub category_counts: SharedBuffer,
    pub tile_lists: SharedBuffer,
    pub dispatch_args: SharedBuffer,
    pub tile_count: [u32; 2],
}

pub struct ProbeHierarchyOutputs {
    pub probes: SharedBuffer,
    pub hierarchy_info: SharedBuffer,
    pub depth_bounds: SharedImage,
    pub atlas: SharedImage,
    pub level_count: u32,
    pub max_probe_count: u32,
    pub probes_per_row: u32,
    pub atlas_resolution: u32,
    pub supersampling: u32,
}

pub struct FrameOutputs {
    pub scene_color: SharedImage,
    pub diffuse_indirect: SharedImage,
    pub specular_indirect: SharedImage,
    pub ambient_occlusion: SharedImage,
    pub sky_light: Option<SharedImage>,
    pub raw_diffuse: SharedImage,
    pub raw_ambient_occlusion: SharedImage,
    pub tile_classification: TileClassificationOutputs,
    pub probe_hierarchy: Option<ProbeHierarchyOutputs>,
}

/// Builds, executes and retires one frame's graph for one view, including
/// the temporal-state handoff. This is the whole per-frame CPU story: a
/// single submission point, no mid-frame synchronization.
pub fn render_frame(
    kernels: &KernelRegistry,
    renderer: &mut IndirectLightingRenderer,
    view: &mut ViewState,
    frame: &FrameDesc,
    scene: &SceneInputs,
    settings: &RenderSettings,
) -> anyhow::Result<FrameOutputs> {
    view.begin_frame(frame);

    let device = renderer.device.clone();
    let mut rg = rg::TemporalRenderGraph::new(view.take_temporal(), device.clone());

    let exports = renderer.prepare_render_graph(&mut rg, view, frame, scene, settings);

    let (rg, exported_temporal) = rg.export_temporal();
    let retired = rg.execute(RenderGraphExecutionParams {
        device: &device,
        kernels,
    })?;

    view.store_temporal(exported_temporal.retire_temporal(&retired));
    view.end_frame(frame);

    let tile = TileClassificationOutputs {
        classification: retired.exported_image(exports.tile_classification.classification),
        category_counts: retired.exported_buffer(exports.tile_classification.category_counts),
        tile_lists: retired.exported_buffer(exports.tile_classification.tile_lists),
        dispatch_args: retired.exported_buffer(exports.tile_classification.dispatch_args),
        tile_count: exports.tile_classification.tile_count,
    };

    let probe = exports.probe_hierarchy.map(|p| ProbeHierarchyOutputs {
        probes: retired.exported_buffer(p.probes),
        hierarchy_info: retired.exported_buffer(p.hierarchy_info),
        depth_bounds: retired.exported_image(p.depth_bounds),
        atlas: retired.exported_image(p.atlas),
        level_count: p.level_count,
        max_probe_count: p.max_probe_count,
        probes_per_row: p.probes_per_row,
        atlas_resolution: p.atlas_resolution,
        supersampling: p.supersampling,
    });

    Ok(FrameOutputs {
        scene_color: retired.exported_image(exports.scene_color),
        diffuse_indirect: retired.exported_image(exports.diffuse_indirect),
        specular_indirect: retired.exported_image(exports.specular_indirect),
        ambient_occlusion: retired.exported_image(exports.ambient_occlusion),
        sky_light: exports.sky_light.map(|h| retired.exported_image(h)),
        raw_diffuse: retired.exported_image(exports.raw_diffuse),
        raw_ambient_occlusion: retired.exported_image(exports.raw_ambient_occlusion),
        tile_classification: tile,
        probe_hierarchy: probe,
    })
}
