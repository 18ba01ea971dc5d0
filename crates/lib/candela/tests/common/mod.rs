#![allow(dead_code)]

use std::sync::Arc;

use candela::{
    frame_constants::CameraMatrices,
    frame_desc::FrameDesc,
    gpu::{
        CpuImage, Device, DeviceCapabilities, Format, ImageDesc, KernelRegistry, SharedImage,
    },
    scene::{PackedLight, SceneInputs, SkyLightParams, LIGHT_KIND_POINT},
    IndirectLightingRenderer, RenderSettings, ViewState,
};

pub fn device(ray_tracing: bool) -> Arc<Device> {
    Arc::new(Device::new(DeviceCapabilities {
        ray_tracing,
        texture_cube_array: true,
    }))
}

pub fn registry() -> KernelRegistry {
    candela::default_registry()
}

pub fn frame_desc(extent: [u32; 2]) -> FrameDesc {
    FrameDesc {
        camera: CameraMatrices::identity(),
        render_extent: extent,
        camera_cut: false,
    }
}

fn image_2d(device: &Device, format: Format, extent: [u32; 2]) -> SharedImage {
    device.create_image(ImageDesc::new_2d(format, extent)).unwrap()
}

/// Flat scene: constant depth, simple-shading material everywhere.
pub fn flat_scene(device: &Device, extent: [u32; 2]) -> SceneInputs {
    scene_with(device, extent, |_, _| (0.5, [0.3, 2.0, 0.0, 0.0]))
}

/// Depth ramp along x, simple shading.
pub fn gradient_scene(device: &Device, extent: [u32; 2]) -> SceneInputs {
    scene_with(device, extent, |x, _| {
        (0.05 + 0.9 * x as f32 / extent[0] as f32, [0.3, 2.0, 0.0, 0.0])
    })
}

/// Quadrants exercising several classification categories: sky, default
/// lit, simple+specular, complex.
pub fn mixed_scene(device: &Device, extent: [u32; 2]) -> SceneInputs {
    scene_with(device, extent, |x, y| {
        let left = x < extent[0] / 2;
        let top = y < extent[1] / 2;
        match (left, top) {
            (true, true) => (0.0, [0.0, 0.0, 0.0, 0.0]), // sky
            (false, true) => (0.4, [0.5, 1.0, 0.0, 0.0]), // default lit
            (true, false) => (0.6, [0.2, 2.0, 0.0, 1.0]), // simple + specular
            (false, false) => (0.8, [0.1, 3.0, 1.0, 1.0]), // complex
        }
    })
}

pub fn scene_with(
    device: &Device,
    extent: [u32; 2],
    mut f: impl FnMut(u32, u32) -> (f32, [f32; 4]),
) -> SceneInputs {
    let gbuffer = image_2d(device, Format::Rgba32Float, extent);
    let depth = image_2d(device, Format::Depth32Float, extent);
    let geometric_normal = image_2d(device, Format::Rgba16Float, extent);
    let velocity = image_2d(device, Format::Rg16Float, extent);

    {
        let mut gbuffer = gbuffer.lock();
        let mut depth = depth.lock();
        let mut normal = geometric_normal.lock();
        for y in 0..extent[1] {
            for x in 0..extent[0] {
                let (d, g) = f(x, y);
                depth.store(0, [x, y, 0], [d, 0.0, 0.0, 0.0]);
                gbuffer.store(0, [x, y, 0], g);
                normal.store(0, [x, y, 0], [0.0, 0.0, 1.0, 0.0]);
            }
        }
    }

    SceneInputs {
        gbuffer,
        depth,
        geometric_normal,
        velocity,
        lights: Vec::new(),
        sky: SkyLightParams::default(),
        captures: Vec::new(),
    }
}

pub fn point_light(position: [f32; 3], color: [f32; 3], intensity: f32) -> PackedLight {
    PackedLight {
        position,
        kind: LIGHT_KIND_POINT,
        color,
        intensity,
        direction: [0.0, 0.0, 1.0],
        radius: 1.0,
    }
}

pub fn default_settings() -> RenderSettings {
    RenderSettings::default()
}

pub fn renderer(device: &Arc<Device>) -> IndirectLightingRenderer {
    IndirectLightingRenderer::new(device.clone())
}

pub fn fresh_view() -> ViewState {
    ViewState::new()
}

pub fn image_texels(image: &SharedImage) -> Vec<[f32; 4]> {
    collect_texels(&image.lock())
}

pub fn collect_texels(image: &CpuImage) -> Vec<[f32; 4]> {
    let e = image.desc().extent;
    let mut out = Vec::with_capacity((e[0] * e[1]) as usize);
    for y in 0..e[1] {
        for x in 0..e[0] {
            out.push(image.load(0, [x, y, 0]));
        }
    }
    out
}

pub fn mean_and_variance(values: &[f32]) -> (f32, f32) {
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
    (mean, variance)
}

pub fn assert_no_nan(values: &[[f32; 4]], what: &str) {
    for (i, v) in values.iter().enumerate() {
        assert!(
            v.iter().all(|c| c.is_finite()),
            "{} has a non-finite texel at {}: {:?}",
            what,
            i,
            v
        );
    }
}
