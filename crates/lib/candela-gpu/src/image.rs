use bitflags::bitflags;

/// Texel formats used by the indirect lighting pipeline. The reference
/// executor stores float formats at full precision; the format still pins
/// down channel count and the intended GPU storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    R8Unorm,
    R8Snorm,
    Rgba8Unorm,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R8Uint,
    R16Uint,
    R32Uint,
    Rg32Uint,
    R32Float,
    Rg11b10Float,
    Rgba32Float,
    Depth32Float,
}

impl Format {
    pub fn channel_count(self) -> usize {
        match self {
            Format::R8Unorm | Format::R8Snorm | Format::R16Float | Format::R8Uint
            | Format::R16Uint | Format::R32Uint | Format::R32Float | Format::Depth32Float => 1,
            Format::Rg16Float | Format::Rg32Uint => 2,
            Format::Rg11b10Float => 3,
            Format::Rgba8Unorm | Format::Rgba16Float | Format::Rgba32Float => 4,
        }
    }

    pub fn bytes_per_texel(self) -> usize {
        match self {
            Format::R8Unorm | Format::R8Snorm | Format::R8Uint => 1,
            Format::R16Float | Format::R16Uint => 2,
            Format::Rgba8Unorm | Format::Rg16Float | Format::R32Uint | Format::R32Float
            | Format::Rg11b10Float | Format::Depth32Float => 4,
            Format::Rgba16Float | Format::Rg32Uint => 8,
            Format::Rgba32Float => 16,
        }
    }

    pub fn is_uint(self) -> bool {
        matches!(
            self,
            Format::R8Uint | Format::R16Uint | Format::R32Uint | Format::Rg32Uint
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageType {
    Tex1d,
    Tex2d,
    Tex3d,
    Tex2dArray,
    Cube,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ImageUsageFlags: u32 {
        const SAMPLED = 1 << 0;
        const STORAGE = 1 << 1;
        const TRANSFER_SRC = 1 << 2;
        const TRANSFER_DST = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub image_type: ImageType,
    pub usage: ImageUsageFlags,
    pub format: Format,
    pub extent: [u32; 3],
    pub mip_levels: u16,
    pub array_elements: u32,
}

impl ImageDesc {
    pub fn new(format: Format, image_type: ImageType, extent: [u32; 3]) -> Self {
        Self {
            image_type,
            usage: ImageUsageFlags::default(),
            format,
            extent,
            mip_levels: 1,
            array_elements: 1,
        }
    }

    pub fn new_2d(format: Format, extent: [u32; 2]) -> Self {
        Self::new(format, ImageType::Tex2d, [extent[0], extent[1], 1])
    }

    pub fn new_3d(format: Format, extent: [u32; 3]) -> Self {
        Self::new(format, ImageType::Tex3d, extent)
    }

    pub fn new_cube(format: Format, width: u32) -> Self {
        let mut desc = Self::new(format, ImageType::Cube, [width, width, 1]);
        desc.array_elements = 6;
        desc
    }

    pub fn usage(mut self, usage: ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn extent(mut self, extent: [u32; 3]) -> Self {
        self.extent = extent;
        self
    }

    pub fn mip_levels(mut self, mip_levels: u16) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    pub fn all_mip_levels(mut self) -> Self {
        self.mip_levels = (32 - self.extent[0].max(self.extent[1]).leading_zeros()) as u16;
        self
    }

    pub fn array_elements(mut self, array_elements: u32) -> Self {
        self.array_elements = array_elements;
        self
    }

    pub fn div_up_extent(mut self, div_extent: [u32; 3]) -> Self {
        for (extent, &div_extent) in self.extent.iter_mut().zip(&div_extent) {
            *extent = ((*extent + div_extent - 1) / div_extent).max(1);
        }
        self
    }

    pub fn half_res(self) -> Self {
        self.div_up_extent([2, 2, 2])
    }

    pub fn extent_2d(&self) -> [u32; 2] {
        [self.extent[0], self.extent[1]]
    }

    pub fn extent_inv_extent_2d(&self) -> [f32; 4] {
        [
            self.extent[0] as f32,
            self.extent[1] as f32,
            1.0 / self.extent[0] as f32,
            1.0 / self.extent[1] as f32,
        ]
    }

    pub fn mip_extent(&self, mip: u16) -> [u32; 3] {
        [
            (self.extent[0] >> mip).max(1),
            (self.extent[1] >> mip).max(1),
            (self.extent[2] >> mip).max(1),
        ]
    }
}

/// Texel payload of a materialized image. Uint formats keep their bit
/// patterns; everything else is held as f32 channels.
pub enum TexelStorage {
    F32(Vec<f32>),
    U32(Vec<u32>),
}

pub struct CpuImage {
    pub desc: ImageDesc,
    mips: Vec<TexelStorage>,
}

impl CpuImage {
    /// Images come up zero-initialized: cold-start reads of a fresh
    /// resource must observe the "no contribution" sentinel, never junk.
    pub fn new(desc: ImageDesc) -> Self {
        let channels = desc.format.channel_count();
        let mips = (0..desc.mip_levels)
            .map(|mip| {
                let e = desc.mip_extent(mip);
                let texels = (e[0] * e[1] * e[2] * desc.array_elements) as usize * channels;
                if desc.format.is_uint() {
                    TexelStorage::U32(vec![0; texels])
                } else {
                    TexelStorage::F32(vec![0.0; texels])
                }
            })
            .collect();

        Self { desc, mips }
    }

    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    fn texel_offset(&self, mip: u16, coord: [u32; 3]) -> usize {
        let e = self.desc.mip_extent(mip);
        debug_assert!(
            coord[0] < e[0] && coord[1] < e[1] && coord[2] < e[2] * self.desc.array_elements,
            "texel {:?} out of bounds for mip {} extent {:?} (layers {})",
            coord,
            mip,
            e,
            self.desc.array_elements,
        );
        ((coord[2] * e[1] + coord[1]) * e[0] + coord[0]) as usize
            * self.desc.format.channel_count()
    }

    pub fn load(&self, mip: u16, coord: [u32; 3]) -> [f32; 4] {
        let offset = self.texel_offset(mip, coord);
        let channels = self.desc.format.channel_count();
        let mut result = [0.0f32; 4];
        match &self.mips[mip as usize] {
            TexelStorage::F32(data) => result[..channels].copy_from_slice(&data[offset..offset + channels]),
            TexelStorage::U32(_) => panic!("load() on a uint image; use load_u()"),
        }
        result
    }

    pub fn store(&mut self, mip: u16, coord: [u32; 3], value: [f32; 4]) {
        let offset = self.texel_offset(mip, coord);
        let channels = self.desc.format.channel_count();
        match &mut self.mips[mip as usize] {
            TexelStorage::F32(data) => data[offset..offset + channels].copy_from_slice(&value[..channels]),
            TexelStorage::U32(_) => panic!("store() on a uint image; use store_u()"),
        }
    }

    pub fn load_u(&self, mip: u16, coord: [u32; 3]) -> [u32; 4] {
        let offset = self.texel_offset(mip, coord);
        let channels = self.desc.format.channel_count();
        let mut result = [0u32; 4];
        match &self.mips[mip as usize] {
            TexelStorage::U32(data) => result[..channels].copy_from_slice(&data[offset..offset + channels]),
            TexelStorage::F32(_) => panic!("load_u() on a float image; use load()"),
        }
        result
    }

    pub fn store_u(&mut self, mip: u16, coord: [u32; 3], value: [u32; 4]) {
        let offset = self.texel_offset(mip, coord);
        let channels = self.desc.format.channel_count();
        match &mut self.mips[mip as usize] {
            TexelStorage::U32(data) => data[offset..offset + channels].copy_from_slice(&value[..channels]),
            TexelStorage::F32(_) => panic!("store_u() on a float image; use store()"),
        }
    }

    /// Clamped load; out-of-bounds coordinates read the nearest edge texel.
    pub fn load_clamped(&self, mip: u16, coord: [i32; 3]) -> [f32; 4] {
        let e = self.desc.mip_extent(mip);
        let layers = e[2] * self.desc.array_elements;
        self.load(
            mip,
            [
                coord[0].clamp(0, e[0] as i32 - 1) as u32,
                coord[1].clamp(0, e[1] as i32 - 1) as u32,
                coord[2].clamp(0, layers as i32 - 1) as u32,
            ],
        )
    }

    pub fn fill(&mut self, value: [f32; 4]) {
        let channels = self.desc.format.channel_count();
        for mip in &mut self.mips {
            match mip {
                TexelStorage::F32(data) => {
                    for (i, v) in data.iter_mut().enumerate() {
                        *v = value[i % channels];
                    }
                }
                TexelStorage::U32(data) => data.fill(0),
            }
        }
    }

    pub fn fill_u(&mut self, value: u32) {
        for mip in &mut self.mips {
            match mip {
                TexelStorage::U32(data) => data.fill(value),
                TexelStorage::F32(_) => panic!("fill_u() on a float image"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn div_up_extent_rounds_up_and_clamps() {
        let desc = ImageDesc::new_2d(Format::Rgba16Float, [1920, 1080]).div_up_extent([8, 4, 1]);
        assert_eq!(desc.extent, [240, 270, 1]);

        let tiny = ImageDesc::new_2d(Format::R8Unorm, [1, 1]).half_res();
        assert_eq!(tiny.extent, [1, 1, 1]);
    }

    #[test]
    fn fresh_images_read_zero() {
        let img = CpuImage::new(ImageDesc::new_2d(Format::Rgba16Float, [4, 4]));
        assert_eq!(img.load(0, [3, 3, 0]), [0.0; 4]);

        let img = CpuImage::new(ImageDesc::new_2d(Format::R32Uint, [4, 4]));
        assert_eq!(img.load_u(0, [0, 0, 0]), [0; 4]);
    }

    #[test]
    fn mip_extents_shrink_by_powers_of_two() {
        let desc = ImageDesc::new_2d(Format::R32Float, [64, 32]).all_mip_levels();
        assert_eq!(desc.mip_levels, 7);
        assert_eq!(desc.mip_extent(0), [64, 32, 1]);
        assert_eq!(desc.mip_extent(5), [2, 1, 1]);
        assert_eq!(desc.mip_extent(6), [1, 1, 1]);
    }
}
