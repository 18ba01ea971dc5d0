use crate::frame_constants::CameraMatrices;

/// What the embedding renderer tells us about the frame being built.
#[derive(Clone, Copy, Debug)]
pub struct FrameDesc {
    pub camera: CameraMatrices,
    pub render_extent: [u32; 2],
    /// Set on hard camera cuts; invalidates all temporal history.
    pub camera_cut: bool,
}
