use candela_gpu::Format;
use candela_rg::{self as rg, SimpleComputePass};

pub fn extract_half_res_gbuffer_view_normal(
    rg: &mut rg::RenderGraph,
    gbuffer: &rg::Handle<rg::Image>,
) -> rg::Handle<rg::Image> {
    let mut output_tex = rg.create(gbuffer.desc().half_res().format(Format::Rgba8Unorm));
    SimpleComputePass::new_compute(
        rg.add_pass("extract view normal/2"),
        "half_res::extract_view_normal",
    )
    .read(gbuffer)
    .write(&mut output_tex)
    .dispatch(output_tex.desc().extent);
    output_tex
}

pub fn extract_half_res_depth(
    rg: &mut rg::RenderGraph,
    depth: &rg::Handle<rg::Image>,
) -> rg::Handle<rg::Image> {
    let mut output_tex = rg.create(depth.desc().half_res().format(Format::R32Float));
    SimpleComputePass::new_compute(rg.add_pass("extract half depth"), "half_res::extract_depth")
        .read(depth)
        .write(&mut output_tex)
        .dispatch(output_tex.desc().extent);
    output_tex
}
