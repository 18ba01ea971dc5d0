use std::cell::{Ref, RefCell};

use candela_rg::{self as rg, GetOrCreateTemporal};

pub mod ambient_occlusion;
pub mod brute_force_gi;
pub mod composite;
pub mod denoiser;
pub mod final_gather;
pub mod half_res;
pub mod screen_space_gi;
pub mod probe_hierarchy;
pub mod probe_trace;
pub mod reflection_captures;
pub mod reflections;
pub mod reprojection;
pub mod sky;
pub mod tile_classification;

pub struct GbufferDepth {
    pub geometric_normal: rg::Handle<rg::Image>,
    pub gbuffer: rg::Handle<rg::Image>,
    pub depth: rg::Handle<rg::Image>,
    half_view_normal: RefCell<Option<rg::Handle<rg::Image>>>,
    half_depth: RefCell<Option<rg::Handle<rg::Image>>>,
}

impl GbufferDepth {
    pub fn new(
        geometric_normal: rg::Handle<rg::Image>,
        gbuffer: rg::Handle<rg::Image>,
        depth: rg::Handle<rg::Image>,
    ) -> Self {
        Self {
            geometric_normal,
            gbuffer,
            depth,
            half_view_normal: Default::default(),
            half_depth: Default::default(),
        }
    }

    pub fn half_view_normal(&self, rg: &mut rg::RenderGraph) -> Ref<rg::Handle<rg::Image>> {
        if self.half_view_normal.borrow().is_none() {
            *self.half_view_normal.borrow_mut() =
                Some(half_res::extract_half_res_gbuffer_view_normal(rg, &self.gbuffer));
        }

        Ref::map(self.half_view_normal.borrow(), |res| res.as_ref().unwrap())
    }

    pub fn half_depth(&self, rg: &mut rg::RenderGraph) -> Ref<rg::Handle<rg::Image>> {
        if self.half_depth.borrow().is_none() {
            *self.half_depth.borrow_mut() = Some(half_res::extract_half_res_depth(rg, &self.depth));
        }

        Ref::map(self.half_depth.borrow(), |res| res.as_ref().unwrap())
    }
}

/// Double-buffered cross-frame resource: the current frame writes `output`,
/// reads last frame's `history`, and the keys swap at acquisition time.
pub struct PingPongTemporalResource {
    pub output_tex: rg::TemporalResourceKey,
    pub history_tex: rg::TemporalResourceKey,
}

impl PingPongTemporalResource {
    pub fn new(name: &str) -> Self {
        Self {
            output_tex: format!("{}:0", name).as_str().into(),
            history_tex: format!("{}:1", name).as_str().into(),
        }
    }

    pub fn get_output_and_history(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        desc: candela_gpu::ImageDesc,
    ) -> (rg::Handle<rg::Image>, rg::Handle<rg::Image>) {
        let output_tex = rg
            .get_or_create_temporal(self.output_tex.clone(), desc)
            .unwrap();

        let history_tex = rg
            .get_or_create_temporal(self.history_tex.clone(), desc)
            .unwrap();

        std::mem::swap(&mut self.output_tex, &mut self.history_tex);

        (output_tex, history_tex)
    }
}
