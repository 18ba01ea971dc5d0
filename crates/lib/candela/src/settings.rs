use candela_gpu::DeviceCapabilities;

use crate::renderers::probe_hierarchy::PROBE_MAX_HIERARCHY_DEPTH;

/// Which diffuse-GI path the frame takes. Chosen once while building the
/// frame's graph, never mid-graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GiMethod {
    /// Screen-space gather against the previous frame's radiance.
    ScreenSpace,
    /// Per-pixel hardware ray tracing, no amortization.
    BruteForceRayTrace,
    /// Ray-traced final gather against reprojected gather points.
    FinalGather,
    /// The probe-hierarchy amortized path.
    ProbeHierarchy,
}

/// Tracing rate of one signal: the dispatch resolution relative to the
/// output, and rays per pixel. Also drives the denoiser's reconstruction
/// filter radius.
#[derive(Clone, Copy, Debug)]
pub struct RayTracingConfig {
    pub resolution_fraction: f32,
    pub ray_count_per_pixel: u32,
}

impl Default for RayTracingConfig {
    fn default() -> Self {
        Self {
            resolution_fraction: 1.0,
            ray_count_per_pixel: 1,
        }
    }
}

/// Immutable per-frame configuration snapshot. Read once at the start of
/// graph construction and threaded through every component; leaf code never
/// consults globals.
#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub gi_method: GiMethod,
    pub use_hardware_ray_tracing: bool,

    pub hierarchy_depth: u32,
    pub supersampling: u32,
    pub probe_atlas_resolution: u32,
    /// Hard cap on materialized probes; requests beyond it are dropped
    /// deterministically, never grown.
    pub max_probe_count: u32,
    /// Authored tolerance bounding how far a probe may sit from its chosen
    /// parent before the assignment is rejected. Tuning data, not a law.
    pub counter_parallax_error: f32,

    /// Degraded-quality path for fast camera motion. Clamps quality knobs,
    /// never raises them.
    pub fast_camera_mode: bool,

    pub diffuse: RayTracingConfig,
    pub reflections: RayTracingConfig,
    pub ambient_occlusion: RayTracingConfig,

    pub sky_light_enabled: bool,
    pub dynamic_sky_light: bool,
    pub sky_shadowing: bool,

    pub apply_ambient_occlusion_in_composite: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            gi_method: GiMethod::ProbeHierarchy,
            use_hardware_ray_tracing: false,
            hierarchy_depth: PROBE_MAX_HIERARCHY_DEPTH as u32,
            supersampling: 1,
            probe_atlas_resolution: 8,
            max_probe_count: u32::MAX,
            counter_parallax_error: 0.1,
            fast_camera_mode: false,
            diffuse: RayTracingConfig::default(),
            reflections: RayTracingConfig::default(),
            ambient_occlusion: RayTracingConfig {
                resolution_fraction: 1.0,
                ray_count_per_pixel: 1,
            },
            sky_light_enabled: false,
            dynamic_sky_light: false,
            sky_shadowing: false,
            apply_ambient_occlusion_in_composite: true,
        }
    }
}

impl RenderSettings {
    /// Applies the fast-camera degrade and the compile-time hierarchy bound.
    /// Fast camera mode clamps hierarchy depth to 3, supersampling to 1 and
    /// the probe atlas to 4 texels.
    pub fn clamped_for_frame(&self) -> Self {
        let mut s = self.clone();

        s.hierarchy_depth = s.hierarchy_depth.clamp(1, PROBE_MAX_HIERARCHY_DEPTH as u32);
        s.supersampling = s.supersampling.max(1);

        if s.fast_camera_mode {
            s.hierarchy_depth = s.hierarchy_depth.min(3);
            s.supersampling = 1;
            s.probe_atlas_resolution = s.probe_atlas_resolution.min(4);
        }

        s
    }

    /// Whether the frame may record hardware ray-tracing passes. A
    /// configuration-time decision; requesting RT work past this point is a
    /// programming error.
    pub fn ray_tracing_active(&self, caps: &DeviceCapabilities) -> bool {
        self.use_hardware_ray_tracing && caps.ray_tracing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_camera_mode_clamps_and_never_raises() {
        let settings = RenderSettings {
            hierarchy_depth: 4,
            supersampling: 4,
            probe_atlas_resolution: 16,
            fast_camera_mode: true,
            ..Default::default()
        };
        let clamped = settings.clamped_for_frame();
        assert_eq!(clamped.hierarchy_depth, 3);
        assert_eq!(clamped.supersampling, 1);
        assert_eq!(clamped.probe_atlas_resolution, 4);

        // A user already below the clamp keeps their setting.
        let settings = RenderSettings {
            hierarchy_depth: 2,
            probe_atlas_resolution: 2,
            fast_camera_mode: true,
            ..Default::default()
        };
        let clamped = settings.clamped_for_frame();
        assert_eq!(clamped.hierarchy_depth, 2);
        assert_eq!(clamped.probe_atlas_resolution, 2);
    }

    #[test]
    fn hierarchy_depth_respects_compile_time_bound() {
        let settings = RenderSettings {
            hierarchy_depth: 9,
            ..Default::default()
        };
        assert_eq!(
            settings.clamped_for_frame().hierarchy_depth,
            PROBE_MAX_HIERARCHY_DEPTH as u32
        );
    }
}
