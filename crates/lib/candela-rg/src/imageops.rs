use bytemuck::{Pod, Zeroable};

use crate::{Handle, Image, RenderGraph, SimpleComputePass};

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct ClearColorConstants {
    pub value: [f32; 4],
}

pub fn clear_color(rg: &mut RenderGraph, img: &mut Handle<Image>, clear_color: [f32; 4]) {
    let extent = img.desc().extent;
    SimpleComputePass::new_compute(rg.add_pass("clear color"), "imageops::clear_color")
        .write(img)
        .constants(ClearColorConstants { value: clear_color })
        .dispatch(extent);
}

pub fn clear_depth(rg: &mut RenderGraph, img: &mut Handle<Image>) {
    let extent = img.desc().extent;
    SimpleComputePass::new_compute(rg.add_pass("clear depth"), "imageops::clear_depth")
        .write(img)
        .dispatch(extent);
}
