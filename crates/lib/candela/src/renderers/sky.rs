use bytemuck::{Pod, Zeroable};
use candela_gpu::{Format, ImageDesc, SharedImage};
use candela_rg::{self as rg, SimpleComputePass};

use crate::scene::SkyLightParams;

pub const SKY_CUBE_WIDTH: u32 = 64;
pub const SKY_CONVOLVED_CUBE_WIDTH: u32 = 16;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct SkyCubeConstants {
    pub color: [f32; 3],
    pub width: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct SkyMipTreeConstants {
    pub mip: u32,
    pub width: u32,
    pub _pad: [u32; 2],
}

pub fn render_sky_cube(rg: &mut rg::RenderGraph, sky: &SkyLightParams) -> rg::Handle<rg::Image> {
    let width = SKY_CUBE_WIDTH;
    let mut sky_tex = rg.create(ImageDesc::new_cube(Format::Rgba16Float, width));

    SimpleComputePass::new_compute(rg.add_pass("sky cube"), "sky_cube")
        .write(&mut sky_tex)
        .constants(SkyCubeConstants {
            color: if sky.enabled { sky.color } else { [0.0; 3] },
            width,
        })
        .dispatch([width, width, 6]);

    sky_tex
}

pub fn convolve_cube(
    rg: &mut rg::RenderGraph,
    input: &rg::Handle<rg::Image>,
) -> rg::Handle<rg::Image> {
    let width = SKY_CONVOLVED_CUBE_WIDTH;
    let mut sky_tex = rg.create(ImageDesc::new_cube(Format::Rgba16Float, width));

    SimpleComputePass::new_compute(rg.add_pass("convolve sky"), "convolve_cube")
        .read(input)
        .write(&mut sky_tex)
        .constants(width)
        .dispatch([width, width, 6]);

    sky_tex
}

/// The sky importance-sampling structure: per cube face, color and PDF mip
/// chains. Consumed by the probe-side atlas tracing for light-direction
/// importance sampling.
pub struct SkyImportanceMap {
    pub color: rg::Handle<rg::Image>,
    pub pdf: rg::Handle<rg::Image>,
}

/// Owns the persistent mip tree and the dirty flag that gates its rebuild:
/// the CDF only recomputes when the sky source actually changed, not every
/// frame.
pub struct SkyRenderer {
    mip_tree_color: Option<SharedImage>,
    mip_tree_pdf: Option<SharedImage>,
    should_rebuild_cdf: bool,
    sky_color: [f32; 3],
}

impl Default for SkyRenderer {
    fn default() -> Self {
        Self {
            mip_tree_color: None,
            mip_tree_pdf: None,
            should_rebuild_cdf: true,
            sky_color: [0.0; 3],
        }
    }
}

impl SkyRenderer {
    pub fn set_sky(&mut self, sky: &SkyLightParams) {
        let color = if sky.enabled { sky.color } else { [0.0; 3] };
        if color != self.sky_color {
            self.sky_color = color;
            self.should_rebuild_cdf = true;
        }
    }

    /// Imports the persistent mip tree into the frame's graph, rebuilding
    /// it first if the source changed.
    pub fn prepare_importance_map(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        sky_cube: &rg::Handle<rg::Image>,
    ) -> SkyImportanceMap {
        let desc = ImageDesc::new_cube(Format::Rgba16Float, SKY_CUBE_WIDTH).all_mip_levels();
        let pdf_desc = desc.format(Format::R32Float);

        if self.mip_tree_color.is_none() {
            self.mip_tree_color = Some(rg.device().create_image(desc).unwrap());
            self.mip_tree_pdf = Some(rg.device().create_image(pdf_desc).unwrap());
        }

        let mut color = rg.import_image(
            self.mip_tree_color.clone().unwrap(),
            rg::AccessType::AnyShaderReadSampledImageOrUniformTexelBuffer,
        );
        let mut pdf = rg.import_image(
            self.mip_tree_pdf.clone().unwrap(),
            rg::AccessType::AnyShaderReadSampledImageOrUniformTexelBuffer,
        );

        if self.should_rebuild_cdf {
            SimpleComputePass::new_compute(rg.add_pass("sky mip tree init"), "sky_mip_tree_init")
                .read(sky_cube)
                .write(&mut color)
                .write(&mut pdf)
                .constants(SkyMipTreeConstants {
                    mip: 0,
                    width: SKY_CUBE_WIDTH,
                    _pad: [0; 2],
                })
                .dispatch([SKY_CUBE_WIDTH, SKY_CUBE_WIDTH, 6]);

            for mip in 1..desc.mip_levels as u32 {
                let width = (SKY_CUBE_WIDTH >> mip).max(1);
                SimpleComputePass::new_compute(
                    rg.add_pass("sky mip tree reduce"),
                    "sky_mip_tree_reduce",
                )
                .write_no_sync(&mut color)
                .write_no_sync(&mut pdf)
                .constants(SkyMipTreeConstants {
                    mip,
                    width,
                    _pad: [0; 2],
                })
                .dispatch([width, width, 6]);
            }

            self.should_rebuild_cdf = false;
        }

        SkyImportanceMap { color, pdf }
    }
}
