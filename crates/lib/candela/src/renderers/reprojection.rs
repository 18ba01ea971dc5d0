use bytemuck::{Pod, Zeroable};
use candela_gpu::Format;
use candela_rg::{self as rg, SimpleComputePass};

use super::GbufferDepth;
use crate::frame_constants::ViewConstants;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct ReprojectionConstants {
    pub view: ViewConstants,
    pub prev_view: ViewConstants,
    pub history_valid: u32,
    pub _pad: [u32; 3],
}

/// Per-pixel reprojection map: xy = previous-frame uv, z = reprojection
/// validity (0 when the pixel had no history: first frame, off-screen, or a
/// depth mismatch), w = depth delta.
pub fn calculate_reprojection_map(
    rg: &mut rg::RenderGraph,
    gbuffer_depth: &GbufferDepth,
    velocity: &rg::Handle<rg::Image>,
    constants: ReprojectionConstants,
) -> rg::Handle<rg::Image> {
    let mut output_tex = rg.create(
        gbuffer_depth
            .depth
            .desc()
            .format(Format::Rgba16Float),
    );

    SimpleComputePass::new_compute(rg.add_pass("reprojection map"), "reprojection::calculate")
        .read(&gbuffer_depth.depth)
        .read(velocity)
        .write(&mut output_tex)
        .constants(constants)
        .dispatch(output_tex.desc().extent);

    output_tex
}
