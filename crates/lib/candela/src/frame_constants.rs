use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

/// The canonical period of the per-frame low-discrepancy sequence. Frame
/// indices wrap modulo this before seeding any sampling pattern so that a
/// long-running view cannot drift into poorly distributed sample sets.
pub const HALTON_SEQUENCE_PERIOD: u32 = 1024;

/// Radical-inverse in the given base; the workhorse behind the per-frame
/// jitter and sampling offsets.
pub fn radical_inverse(mut n: u32, base: u32) -> f32 {
    let mut val = 0.0f32;
    let inv_base = 1.0 / base as f32;
    let mut inv_bi = inv_base;

    while n > 0 {
        val += (n % base) as f32 * inv_bi;
        n /= base;
        inv_bi *= inv_base;
    }

    val
}

pub fn halton_2d(index: u32) -> Vec2 {
    let index = index % HALTON_SEQUENCE_PERIOD;
    Vec2::new(
        radical_inverse(index + 1, 2),
        radical_inverse(index + 1, 3),
    )
}

#[derive(Clone, Copy, Debug)]
pub struct CameraMatrices {
    pub world_to_view: Mat4,
    pub view_to_clip: Mat4,
    pub eye_position: Vec3,
}

impl CameraMatrices {
    pub fn identity() -> Self {
        Self {
            world_to_view: Mat4::IDENTITY,
            view_to_clip: Mat4::IDENTITY,
            eye_position: Vec3::ZERO,
        }
    }

    pub fn world_to_clip(&self) -> Mat4 {
        self.view_to_clip * self.world_to_view
    }
}

/// Camera constants as kernels see them.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct ViewConstants {
    pub world_to_clip: [[f32; 4]; 4],
    pub clip_to_world: [[f32; 4]; 4],
    pub eye_position: [f32; 3],
    pub _pad0: f32,
}

impl ViewConstants {
    pub fn new(camera: &CameraMatrices) -> Self {
        let world_to_clip = camera.world_to_clip();
        Self {
            world_to_clip: world_to_clip.to_cols_array_2d(),
            clip_to_world: world_to_clip.inverse().to_cols_array_2d(),
            eye_position: camera.eye_position.to_array(),
            _pad0: 0.0,
        }
    }

    pub fn clip_to_world(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.clip_to_world)
    }

    /// Reconstructs the world-space position of a pixel center from its
    /// screen coordinate and depth.
    pub fn unproject(&self, pixel: [f32; 2], screen_extent: [u32; 2], depth: f32) -> Vec3 {
        let uv = Vec2::new(
            pixel[0] / screen_extent[0] as f32,
            pixel[1] / screen_extent[1] as f32,
        );
        let ndc = uv * 2.0 - Vec2::ONE;
        let clip = glam::Vec4::new(ndc.x, ndc.y, depth, 1.0);
        let world = self.clip_to_world() * clip;
        world.truncate() / world.w.max(1e-8)
    }
}

/// Per-frame constants shared by every pass of one frame's graph. Built once
/// from the immutable settings snapshot before any pass records; leaf passes
/// never read configuration from anywhere else.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct FrameConstants {
    pub view: ViewConstants,
    pub prev_view: ViewConstants,
    pub render_extent: [u32; 2],
    pub frame_index: u32,
    pub history_valid: u32,
    pub tile_jitter: [u32; 2],
    pub _pad0: [u32; 2],
}

impl FrameConstants {
    /// The probe tile grid is offset every frame by a Halton jitter bounded
    /// by the coarsest level's emit tile span, wrapped modulo that span, so
    /// tile seams never stay put. Every level derives its tile mapping from
    /// this one offset within the frame.
    pub fn tile_jitter_for_frame(frame_index: u32, coarsest_tile_size: u32) -> [u32; 2] {
        let h = halton_2d(frame_index);
        [
            (h.x * coarsest_tile_size as f32) as u32 % coarsest_tile_size,
            (h.y * coarsest_tile_size as f32) as u32 % coarsest_tile_size,
        ]
    }
}

/// Deterministic per-pixel hash used by the stochastic kernels. Not a
/// statistical marvel, but stable across platforms, which the tests rely on.
pub fn hash_combine(a: u32, b: u32) -> u32 {
    let mut h = a ^ b.wrapping_mul(0x9e37_79b9);
    h ^= h >> 16;
    h = h.wrapping_mul(0x7feb_352d);
    h ^= h >> 15;
    h = h.wrapping_mul(0x846c_a68b);
    h ^= h >> 16;
    h
}

pub fn hash_to_unorm(h: u32) -> f32 {
    (h >> 8) as f32 / ((1u32 << 24) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halton_wraps_at_canonical_period() {
        assert_eq!(halton_2d(3), halton_2d(3 + HALTON_SEQUENCE_PERIOD));
    }

    #[test]
    fn halton_stays_in_unit_square() {
        for i in 0..HALTON_SEQUENCE_PERIOD {
            let p = halton_2d(i);
            assert!(p.x >= 0.0 && p.x < 1.0);
            assert!(p.y >= 0.0 && p.y < 1.0);
        }
    }

    #[test]
    fn tile_jitter_is_bounded_by_coarsest_tile() {
        for frame in 0..256 {
            let j = FrameConstants::tile_jitter_for_frame(frame, 64);
            assert!(j[0] < 64 && j[1] < 64);
        }
    }
}
