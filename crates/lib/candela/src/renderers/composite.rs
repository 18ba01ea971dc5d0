use bytemuck::{Pod, Zeroable};
use candela_rg::{self as rg, KernelPermutation, SimpleComputePass};

/// Permutation domain of the final compositing kernel. Implication rules:
/// sky shadowing needs the dynamic sky light path, and a dynamic sky light
/// is still a sky light; `remap` collapses vectors accordingly before any
/// variant lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompositePermutation {
    pub has_box_captures: bool,
    pub has_sphere_captures: bool,
    pub apply_ambient_occlusion: bool,
    pub sky_light: bool,
    pub dynamic_sky_light: bool,
    pub sky_shadowing: bool,
    pub ray_traced_reflections: bool,
}

impl KernelPermutation for CompositePermutation {
    const BIT_COUNT: u32 = 7;

    fn from_bits(bits: u32) -> Self {
        Self {
            has_box_captures: bits & 1 != 0,
            has_sphere_captures: bits & 2 != 0,
            apply_ambient_occlusion: bits & 4 != 0,
            sky_light: bits & 8 != 0,
            dynamic_sky_light: bits & 16 != 0,
            sky_shadowing: bits & 32 != 0,
            ray_traced_reflections: bits & 64 != 0,
        }
    }

    fn bits(self) -> u32 {
        (self.has_box_captures as u32)
            | (self.has_sphere_captures as u32) << 1
            | (self.apply_ambient_occlusion as u32) << 2
            | (self.sky_light as u32) << 3
            | (self.dynamic_sky_light as u32) << 4
            | (self.sky_shadowing as u32) << 5
            | (self.ray_traced_reflections as u32) << 6
    }

    fn remap(mut self) -> Self {
        if self.sky_shadowing {
            self.dynamic_sky_light = true;
        }
        if self.dynamic_sky_light {
            self.sky_light = true;
        }
        self
    }
}

/// Whether ambient occlusion is folded into this composite. The pairing is
/// correctness-critical: the AO permutation must use pre-multiplied blending
/// or a separately composited specular term gets darkened twice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositeBlendMode {
    Additive,
    PremultipliedAlpha,
}

impl CompositePermutation {
    pub fn blend_mode(&self) -> CompositeBlendMode {
        if self.apply_ambient_occlusion {
            CompositeBlendMode::PremultipliedAlpha
        } else {
            CompositeBlendMode::Additive
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct CompositeConstants {
    pub capture_count: u32,
    pub _pad: [u32; 3],
}

pub struct CompositeInputs<'a> {
    pub diffuse: &'a rg::Handle<rg::Image>,
    pub specular: &'a rg::Handle<rg::Image>,
    pub ambient_occlusion: &'a rg::Handle<rg::Image>,
    pub sky_light: &'a rg::Handle<rg::Image>,
    pub capture_array: &'a rg::Handle<rg::Image>,
}

/// Blends the denoised indirect terms into scene color. The kernel variant
/// is selected by the canonicalized permutation; inputs not covered by the
/// permutation are bound as dummies and never read.
pub fn composite_indirect_lighting(
    rg: &mut rg::RenderGraph,
    scene_color: &mut rg::Handle<rg::Image>,
    inputs: CompositeInputs<'_>,
    permutation: CompositePermutation,
    capture_count: u32,
) {
    let extent = scene_color.desc().extent;

    SimpleComputePass::new_compute(rg.add_pass("composite indirect"), "composite_indirect")
        .permutation(permutation)
        .read(inputs.diffuse)
        .read(inputs.specular)
        .read(inputs.ambient_occlusion)
        .read(inputs.sky_light)
        .read(inputs.capture_array)
        .write(scene_color)
        .constants(CompositeConstants {
            capture_count,
            _pad: [0; 3],
        })
        .dispatch(extent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remap_is_idempotent_over_the_whole_domain() {
        for v in CompositePermutation::enumerate() {
            let once = v.remap();
            assert_eq!(once.remap(), once, "remap must be idempotent for {:?}", v);
        }
    }

    #[test]
    fn implication_rules_collapse_redundant_vectors() {
        let v = CompositePermutation {
            sky_shadowing: true,
            dynamic_sky_light: false,
            sky_light: false,
            has_box_captures: false,
            has_sphere_captures: false,
            apply_ambient_occlusion: false,
            ray_traced_reflections: false,
        };
        let canonical = v.remap();
        assert!(canonical.dynamic_sky_light);
        assert!(canonical.sky_light);
    }

    #[test]
    fn compiled_variants_are_exactly_the_canonical_ones() {
        let variants = CompositePermutation::compiled_variants();
        // 4 valid sky states (off / static / dynamic / dynamic+shadowed)
        // times 16 combinations of the independent bits.
        assert_eq!(variants.len(), 4 * 16);
        for v in &variants {
            assert_eq!(v.remap(), *v);
        }
    }

    #[test]
    fn blend_mode_pairs_with_ao_permutation() {
        let mut v = CompositePermutation::from_bits(0);
        assert_eq!(v.blend_mode(), CompositeBlendMode::Additive);
        v.apply_ambient_occlusion = true;
        assert_eq!(v.blend_mode(), CompositeBlendMode::PremultipliedAlpha);
    }
}
