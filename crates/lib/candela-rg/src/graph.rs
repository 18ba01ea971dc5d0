use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

use candela_gpu::{Device, DynamicConstants, GpuError, KernelRegistry, SharedBuffer, SharedImage};

use crate::{
    pass_api::RenderPassApi,
    pass_builder::PassBuilder,
    resource::*,
    resource_registry::{AnySharedResource, ResourceRegistry},
};

pub(crate) enum GraphResourceInfo {
    Created(GraphResourceDesc),
    ImportedImage(SharedImage, AccessType),
    ImportedBuffer(SharedBuffer, AccessType),
}

impl GraphResourceInfo {
    pub(crate) fn is_imported(&self) -> bool {
        !matches!(self, GraphResourceInfo::Created(_))
    }
}

pub(crate) enum ExportableGraphResource {
    Image(Handle<Image>),
    Buffer(Handle<Buffer>),
}

#[derive(Clone, Copy, Debug)]
pub struct RgComputePipelineHandle {
    pub(crate) idx: usize,
}

pub(crate) struct RgComputePipeline {
    pub(crate) kernel_name: String,
}

pub(crate) struct RecordedPass {
    pub(crate) name: String,
    pub(crate) reads: Vec<(GraphRawResourceHandle, AccessType)>,
    pub(crate) writes: Vec<(GraphRawResourceHandle, AccessType)>,
    pub(crate) render_fn: Option<Box<dyn FnOnce(&mut RenderPassApi) -> Result<(), GpuError>>>,
}

impl RecordedPass {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            reads: Vec::new(),
            writes: Vec::new(),
            render_fn: None,
        }
    }
}

/// Deferred-execution builder for one frame's GPU work. Passes are recorded
/// as closures together with their declared resource accesses, then run in
/// declared order by `execute`. Resources written by no live consumer are
/// pass-culled; side effects must never depend on a culled pass running.
#[derive(Default)]
pub struct RenderGraph {
    pub(crate) resources: Vec<GraphResourceInfo>,
    pub(crate) passes: Vec<RecordedPass>,
    pub(crate) compute_pipelines: Vec<RgComputePipeline>,
    pub(crate) exports: Vec<(u32, AccessType)>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pass<'s>(&'s mut self, name: &str) -> PassBuilder<'s> {
        PassBuilder::new(self, RecordedPass::new(name))
    }

    pub fn create<Desc: ResourceDesc>(&mut self, desc: Desc) -> Handle<Desc::Resource>
    where
        Desc::Resource: Resource<Desc = Desc>,
    {
        let id = self.resources.len() as u32;
        self.resources
            .push(GraphResourceInfo::Created(desc.clone().into()));

        Handle {
            raw: GraphRawResourceHandle { id, version: 0 },
            desc,
            marker: PhantomData,
        }
    }

    pub fn import_image(&mut self, resource: SharedImage, access_type: AccessType) -> Handle<Image> {
        let desc = *resource.lock().desc();
        let id = self.resources.len() as u32;
        self.resources
            .push(GraphResourceInfo::ImportedImage(resource, access_type));

        Handle {
            // Imported resources carry externally produced contents, so
            // they are born at version 1 and are legal to read immediately.
            raw: GraphRawResourceHandle { id, version: 1 },
            desc,
            marker: PhantomData,
        }
    }

    pub fn import_buffer(
        &mut self,
        resource: SharedBuffer,
        access_type: AccessType,
    ) -> Handle<Buffer> {
        let desc = *resource.lock().desc();
        let id = self.resources.len() as u32;
        self.resources
            .push(GraphResourceInfo::ImportedBuffer(resource, access_type));

        Handle {
            raw: GraphRawResourceHandle { id, version: 1 },
            desc,
            marker: PhantomData,
        }
    }

    /// Marks a resource as externally observable after execution. Exported
    /// resources survive the graph and are fetchable from the retired graph;
    /// exporting does not consume the handle, so a pass may still read the
    /// resource after the export is declared.
    pub fn export<Res: Resource>(
        &mut self,
        handle: &Handle<Res>,
        access_type: AccessType,
    ) -> ExportedHandle<Res> {
        self.exports.push((handle.raw.id, access_type));
        ExportedHandle {
            raw: handle.raw,
            marker: PhantomData,
        }
    }

    pub(crate) fn is_imported(&self, id: u32) -> bool {
        self.resources[id as usize].is_imported()
    }

    pub(crate) fn record_pass(&mut self, pass: RecordedPass) {
        self.passes.push(pass);
    }

    /// Which recorded passes survive culling: a pass is live if it writes a
    /// resource that a later live pass reads, an exported resource, or an
    /// imported resource (imported writes are externally observable).
    fn live_pass_mask(&self) -> Vec<bool> {
        let mut live_resources: HashSet<u32> = self.exports.iter().map(|(id, _)| *id).collect();
        for (id, info) in self.resources.iter().enumerate() {
            if info.is_imported() {
                live_resources.insert(id as u32);
            }
        }

        let mut mask = vec![false; self.passes.len()];
        for (idx, pass) in self.passes.iter().enumerate().rev() {
            let live = pass
                .writes
                .iter()
                .any(|(handle, _)| live_resources.contains(&handle.id));
            mask[idx] = live;
            if live {
                for (handle, _) in &pass.reads {
                    live_resources.insert(handle.id);
                }
            }
        }
        mask
    }
}

pub struct RenderGraphExecutionParams<'a> {
    pub device: &'a Device,
    pub kernels: &'a KernelRegistry,
}

pub struct RetiredRenderGraph {
    exported: HashMap<u32, (AnySharedResource, AccessType)>,
}

impl RetiredRenderGraph {
    pub fn exported_resource<Res: Resource>(
        &self,
        handle: ExportedHandle<Res>,
    ) -> (AnySharedResource, AccessType) {
        let (resource, access) = self
            .exported
            .get(&handle.raw.id)
            .expect("exported resource");
        (resource.clone(), *access)
    }
}

impl RenderGraph {
    /// Runs all live recorded passes in declared order against the
    /// reference executor. Per-frame dynamic constants live only for the
    /// duration of this call.
    pub fn execute(self, params: RenderGraphExecutionParams<'_>) -> Result<RetiredRenderGraph, GpuError> {
        let live = self.live_pass_mask();

        let mut registry = ResourceRegistry::new(&self.resources);
        let mut dynamic_constants = DynamicConstants::default();
        let mut current_access: Vec<AccessType> = self
            .resources
            .iter()
            .map(|info| match info {
                GraphResourceInfo::Created(_) => AccessType::Nothing,
                GraphResourceInfo::ImportedImage(_, access)
                | GraphResourceInfo::ImportedBuffer(_, access) => *access,
            })
            .collect();

        let pipelines = self.compute_pipelines;

        for (pass, live) in self.passes.into_iter().zip(live) {
            if !live {
                log::trace!("render graph: culled pass {:?}", pass.name);
                continue;
            }

            // Transition bookkeeping. The reference executor has no real
            // barriers; declared order is the ordering guarantee.
            for (handle, access) in pass.reads.iter().chain(pass.writes.iter()) {
                current_access[handle.id as usize] = *access;
            }

            let mut api = RenderPassApi {
                device: params.device,
                kernels: params.kernels,
                pipelines: &pipelines,
                dynamic_constants: &mut dynamic_constants,
                resources: &mut registry,
            };

            if let Some(render_fn) = pass.render_fn {
                log::trace!("render graph: executing pass {:?}", pass.name);
                render_fn(&mut api)?;
            }
        }

        let mut exported = HashMap::new();
        for (id, access) in self.exports {
            let resource = registry.materialize(params.device, id)?;
            exported.insert(id, (resource, access));
        }

        Ok(RetiredRenderGraph { exported })
    }
}
