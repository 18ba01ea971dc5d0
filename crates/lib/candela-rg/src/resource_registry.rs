use candela_gpu::{Device, GpuError, SharedBuffer, SharedImage};

use crate::graph::GraphResourceInfo;
use crate::resource::GraphResourceDesc;

#[derive(Clone)]
pub enum AnySharedResource {
    Image(SharedImage),
    Buffer(SharedBuffer),
}

/// Backing storage for one graph execution. Transient resources are
/// materialized on first bind; imported resources alias their external
/// storage.
pub struct ResourceRegistry {
    descs: Vec<Option<GraphResourceDesc>>,
    resources: Vec<Option<AnySharedResource>>,
}

impl ResourceRegistry {
    pub(crate) fn new(infos: &[GraphResourceInfo]) -> Self {
        let mut descs = Vec::with_capacity(infos.len());
        let mut resources = Vec::with_capacity(infos.len());

        for info in infos {
            match info {
                GraphResourceInfo::Created(desc) => {
                    descs.push(Some(*desc));
                    resources.push(None);
                }
                GraphResourceInfo::ImportedImage(image, _) => {
                    descs.push(None);
                    resources.push(Some(AnySharedResource::Image(image.clone())));
                }
                GraphResourceInfo::ImportedBuffer(buffer, _) => {
                    descs.push(None);
                    resources.push(Some(AnySharedResource::Buffer(buffer.clone())));
                }
            }
        }

        Self { descs, resources }
    }

    pub fn materialize(&mut self, device: &Device, id: u32) -> Result<AnySharedResource, GpuError> {
        let slot = &mut self.resources[id as usize];
        if let Some(resource) = slot {
            return Ok(resource.clone());
        }

        let resource = match self.descs[id as usize].expect("transient resource desc") {
            GraphResourceDesc::Image(desc) => AnySharedResource::Image(device.create_image(desc)?),
            GraphResourceDesc::Buffer(desc) => {
                AnySharedResource::Buffer(device.create_buffer(desc, "rg transient", None)?)
            }
        };

        *slot = Some(resource.clone());
        Ok(resource)
    }
}
