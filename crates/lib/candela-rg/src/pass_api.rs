use std::sync::Arc;

use candela_gpu::{
    BoundResource, CpuBuffer, CpuImage, Device, DispatchIndirectArgs, DynamicConstants, GpuError,
    Kernel, KernelCtx, KernelRegistry,
};
use parking_lot::MutexGuard;

use crate::{
    graph::{RgComputePipeline, RgComputePipelineHandle},
    resource::*,
    resource_registry::{AnySharedResource, ResourceRegistry},
};

#[derive(Clone, Copy, Debug)]
pub enum RenderPassBinding {
    Image(GraphRawResourceHandle),
    ImageUav(GraphRawResourceHandle),
    Buffer(GraphRawResourceHandle),
    BufferUav(GraphRawResourceHandle),
    DynamicConstants(u32),
    DynamicConstantsStorageBuffer(u32),
}

impl RenderPassBinding {
    fn resource_id(&self) -> Option<u32> {
        match self {
            RenderPassBinding::Image(h)
            | RenderPassBinding::ImageUav(h)
            | RenderPassBinding::Buffer(h)
            | RenderPassBinding::BufferUav(h) => Some(h.id),
            _ => None,
        }
    }
}

pub trait BindRgRef {
    fn bind(&self) -> RenderPassBinding;
}

impl BindRgRef for Ref<Image, GpuSrv> {
    fn bind(&self) -> RenderPassBinding {
        RenderPassBinding::Image(self.handle)
    }
}

impl BindRgRef for Ref<Image, GpuUav> {
    fn bind(&self) -> RenderPassBinding {
        RenderPassBinding::ImageUav(self.handle)
    }
}

impl BindRgRef for Ref<Buffer, GpuSrv> {
    fn bind(&self) -> RenderPassBinding {
        RenderPassBinding::Buffer(self.handle)
    }
}

impl BindRgRef for Ref<Buffer, GpuUav> {
    fn bind(&self) -> RenderPassBinding {
        RenderPassBinding::BufferUav(self.handle)
    }
}

pub struct RenderPassPipelineBinding<'a> {
    pipeline: RgComputePipelineHandle,
    bindings: &'a [RenderPassBinding],
}

impl RgComputePipelineHandle {
    pub fn into_binding<'a>(self, bindings: &'a [RenderPassBinding]) -> RenderPassPipelineBinding<'a> {
        RenderPassPipelineBinding {
            pipeline: self,
            bindings,
        }
    }
}

pub struct RenderPassApi<'exec> {
    pub(crate) device: &'exec Device,
    pub(crate) kernels: &'exec KernelRegistry,
    pub(crate) pipelines: &'exec [RgComputePipeline],
    pub(crate) dynamic_constants: &'exec mut DynamicConstants,
    pub(crate) resources: &'exec mut ResourceRegistry,
}

impl<'exec> RenderPassApi<'exec> {
    pub fn dynamic_constants(&mut self) -> &mut DynamicConstants {
        self.dynamic_constants
    }

    pub fn bind_compute_pipeline<'api>(
        &'api mut self,
        binding: RenderPassPipelineBinding<'_>,
    ) -> Result<BoundComputePipeline<'api, 'exec>, GpuError> {
        let kernel_name = &self.pipelines[binding.pipeline.idx].kernel_name;
        let kernel = self.kernels.resolve(kernel_name)?;

        Ok(BoundComputePipeline {
            kernel,
            bindings: binding.bindings.to_vec(),
            api: self,
        })
    }
}

enum ResGuard<'g> {
    Image(MutexGuard<'g, CpuImage>),
    Buffer(MutexGuard<'g, CpuBuffer>),
}

pub struct BoundComputePipeline<'api, 'exec> {
    api: &'api mut RenderPassApi<'exec>,
    kernel: Arc<dyn Kernel>,
    bindings: Vec<RenderPassBinding>,
}

impl<'api, 'exec> BoundComputePipeline<'api, 'exec> {
    pub fn dispatch(self, extent: [u32; 3]) -> Result<(), GpuError> {
        self.run(extent)
    }

    pub fn dispatch_indirect(
        self,
        args_buffer: Ref<Buffer, GpuSrv>,
        args_buffer_offset: u64,
    ) -> Result<(), GpuError> {
        let group_count = {
            let resource = self
                .api
                .resources
                .materialize(self.api.device, args_buffer.handle.id)?;
            let buffer = match &resource {
                AnySharedResource::Buffer(buffer) => buffer.clone(),
                _ => {
                    return Err(GpuError::ResourceAccess {
                        info: "indirect args bound to a non-buffer resource".to_owned(),
                    })
                }
            };
            let args: DispatchIndirectArgs =
                buffer.lock().read_at(args_buffer_offset as usize);
            args.group_count
        };

        // A zero group count is a valid no-op dispatch.
        if group_count.iter().any(|&c| c == 0) {
            return Ok(());
        }

        self.run(group_count)
    }

    fn run(self, extent: [u32; 3]) -> Result<(), GpuError> {
        let Self {
            api,
            kernel,
            bindings,
        } = self;

        // Each resource may be bound at most once per dispatch; the graph's
        // cross-pass aliasing story (write_no_sync) never aliases within
        // one pass.
        let ids: Vec<u32> = bindings.iter().filter_map(|b| b.resource_id()).collect();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                if a == b {
                    return Err(GpuError::ResourceAccess {
                        info: format!("resource {} bound more than once in one dispatch", a),
                    });
                }
            }
        }

        let shared: Vec<Option<AnySharedResource>> = bindings
            .iter()
            .map(|binding| {
                binding
                    .resource_id()
                    .map(|id| api.resources.materialize(api.device, id))
                    .transpose()
            })
            .collect::<Result<_, _>>()?;

        let mut guards: Vec<Option<ResGuard>> = shared
            .iter()
            .map(|resource| {
                resource.as_ref().map(|resource| match resource {
                    AnySharedResource::Image(image) => ResGuard::Image(image.lock()),
                    AnySharedResource::Buffer(buffer) => ResGuard::Buffer(buffer.lock()),
                })
            })
            .collect();

        let dynamic_constants: &DynamicConstants = api.dynamic_constants;

        let mut bound: Vec<BoundResource> = Vec::with_capacity(bindings.len());
        for (binding, guard) in bindings.iter().zip(guards.iter_mut()) {
            let view = match (binding, guard) {
                (RenderPassBinding::Image(_), Some(ResGuard::Image(g))) => {
                    BoundResource::ImageSrv(&**g)
                }
                (RenderPassBinding::ImageUav(_), Some(ResGuard::Image(g))) => {
                    BoundResource::ImageUav(&mut **g)
                }
                (RenderPassBinding::Buffer(_), Some(ResGuard::Buffer(g))) => {
                    BoundResource::BufferSrv(&**g)
                }
                (RenderPassBinding::BufferUav(_), Some(ResGuard::Buffer(g))) => {
                    BoundResource::BufferUav(&mut **g)
                }
                (RenderPassBinding::DynamicConstants(offset), None)
                | (RenderPassBinding::DynamicConstantsStorageBuffer(offset), None) => {
                    BoundResource::Constants(dynamic_constants.slice_from(*offset))
                }
                _ => {
                    return Err(GpuError::ResourceAccess {
                        info: "binding/resource type mismatch".to_owned(),
                    })
                }
            };
            bound.push(view);
        }

        let mut ctx = KernelCtx::new(extent, &mut bound);
        kernel.dispatch(&mut ctx)
    }
}
