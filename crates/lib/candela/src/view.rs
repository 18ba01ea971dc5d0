use candela_rg::TemporalRenderGraphState;

use crate::{frame_constants::CameraMatrices, frame_desc::FrameDesc};

/// Everything owned by a view (camera) across frames: the temporal history
/// textures and gather-points buffer live inside `temporal`, keyed by the
/// renderers that own them; previous camera matrices feed reprojection.
///
/// Exactly one frame's graph mutates a view's state at a time; the handoff
/// happens through `take_temporal` / `store_temporal` around graph execution.
pub struct ViewState {
    temporal: Option<TemporalRenderGraphState>,
    pub prev_camera: Option<CameraMatrices>,
    pub frame_index: u32,
    history_valid: bool,
    render_extent: [u32; 2],
}

impl ViewState {
    pub fn new() -> Self {
        Self {
            temporal: Some(TemporalRenderGraphState::default()),
            prev_camera: None,
            frame_index: 0,
            history_valid: false,
            render_extent: [0, 0],
        }
    }

    /// Called before graph construction. Detects the cold-start conditions:
    /// first frame, camera cut, or a resized viewport.
    pub fn begin_frame(&mut self, frame: &FrameDesc) {
        if frame.camera_cut || frame.render_extent != self.render_extent {
            self.history_valid = false;
            if frame.render_extent != self.render_extent {
                // Resize: history textures have the wrong extent; drop them.
                self.temporal = Some(TemporalRenderGraphState::default());
            }
        }
        self.render_extent = frame.render_extent;
    }

    pub fn history_valid(&self) -> bool {
        self.history_valid
    }

    pub fn take_temporal(&mut self) -> TemporalRenderGraphState {
        self.temporal.take().expect("temporal state already taken")
    }

    pub fn store_temporal(&mut self, state: TemporalRenderGraphState) {
        assert!(self.temporal.is_none(), "temporal state stored twice");
        self.temporal = Some(state);
    }

    pub fn temporal(&self) -> &TemporalRenderGraphState {
        self.temporal.as_ref().expect("temporal state is taken")
    }

    /// Called after graph execution; the next frame sees valid history.
    pub fn end_frame(&mut self, frame: &FrameDesc) {
        self.prev_camera = Some(frame.camera);
        self.frame_index = self.frame_index.wrapping_add(1);
        self.history_valid = true;
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new()
    }
}
