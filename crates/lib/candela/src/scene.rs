use bytemuck::{Pod, Zeroable};
use candela_gpu::SharedImage;

/// Maximum number of punctual/area lights consumed per frame; extra lights
/// are dropped with a warning rather than growing the parameter array.
pub const MAX_LIGHT_COUNT: usize = 256;

pub const LIGHT_KIND_DIRECTIONAL: u32 = 0;
pub const LIGHT_KIND_POINT: u32 = 1;
pub const LIGHT_KIND_SPOT: u32 = 2;
pub const LIGHT_KIND_RECT: u32 = 3;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct PackedLight {
    pub position: [f32; 3],
    pub kind: u32,
    pub color: [f32; 3],
    pub intensity: f32,
    pub direction: [f32; 3],
    pub radius: f32,
}

#[derive(Clone, Copy, Debug)]
pub struct SkyLightParams {
    pub enabled: bool,
    pub color: [f32; 3],
}

impl Default for SkyLightParams {
    fn default() -> Self {
        Self {
            enabled: false,
            color: [0.0; 3],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureShape {
    Box,
    Sphere,
}

/// One reflection capture component as registered by the scene layer.
#[derive(Clone, Copy, Debug)]
pub struct ReflectionCaptureDesc {
    pub id: u64,
    pub shape: CaptureShape,
    pub color: [f32; 3],
}

/// Read-only scene data the indirect lighting core consumes. The G-buffer
/// textures are produced by the deferred base pass and imported into the
/// frame's graph; the core never writes them.
pub struct SceneInputs {
    /// Packed surface attributes: x = roughness, y = shading model id
    /// (0 unlit, 1 default lit, 2 simple, 3+ complex), z = bent-normal
    /// flag, w = specular weight.
    pub gbuffer: SharedImage,
    pub depth: SharedImage,
    pub geometric_normal: SharedImage,
    pub velocity: SharedImage,

    pub lights: Vec<PackedLight>,
    pub sky: SkyLightParams,
    pub captures: Vec<ReflectionCaptureDesc>,
}

impl SceneInputs {
    /// The bounded light array that actually reaches the GPU.
    pub fn clamped_lights(&self) -> Vec<PackedLight> {
        if self.lights.len() > MAX_LIGHT_COUNT {
            log::warn!(
                "scene exceeds the {} light cap ({} lights); dropping the rest",
                MAX_LIGHT_COUNT,
                self.lights.len()
            );
        }
        self.lights
            .iter()
            .copied()
            .take(MAX_LIGHT_COUNT)
            .collect()
    }

    pub fn has_box_captures(&self) -> bool {
        self.captures.iter().any(|c| c.shape == CaptureShape::Box)
    }

    pub fn has_sphere_captures(&self) -> bool {
        self.captures
            .iter()
            .any(|c| c.shape == CaptureShape::Sphere)
    }
}
