use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    buffer::{BufferDesc, CpuBuffer},
    error::GpuError,
    image::{CpuImage, ImageDesc, ImageType},
};

/// Platform feature gates consulted *before* graph construction. Recording a
/// pass that needs a missing capability is a programming error, not a
/// runtime-recoverable one.
#[derive(Clone, Copy, Debug)]
pub struct DeviceCapabilities {
    pub ray_tracing: bool,
    pub texture_cube_array: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            ray_tracing: false,
            texture_cube_array: true,
        }
    }
}

pub type SharedImage = Arc<Mutex<CpuImage>>;
pub type SharedBuffer = Arc<Mutex<CpuBuffer>>;

pub struct Device {
    capabilities: DeviceCapabilities,
}

impl Device {
    pub fn new(capabilities: DeviceCapabilities) -> Self {
        Self { capabilities }
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    pub fn ray_tracing_enabled(&self) -> bool {
        self.capabilities.ray_tracing
    }

    pub fn create_image(&self, desc: ImageDesc) -> Result<SharedImage, GpuError> {
        if matches!(desc.image_type, ImageType::Cube) && desc.array_elements > 6 {
            assert!(
                self.capabilities.texture_cube_array,
                "cube array image requested without texture_cube_array support"
            );
        }
        Ok(Arc::new(Mutex::new(CpuImage::new(desc))))
    }

    pub fn create_buffer(
        &self,
        desc: BufferDesc,
        _name: &str,
        initial_data: Option<&[u8]>,
    ) -> Result<SharedBuffer, GpuError> {
        Ok(Arc::new(Mutex::new(CpuBuffer::new(desc, initial_data))))
    }
}
