use std::marker::PhantomData;

use candela_gpu::GpuError;

use crate::{
    graph::{RecordedPass, RenderGraph, RgComputePipeline, RgComputePipelineHandle},
    pass_api::RenderPassApi,
    resource::*,
};

pub struct PassBuilder<'rg> {
    rg: &'rg mut RenderGraph,
    pass: Option<RecordedPass>,
}

impl<'rg> Drop for PassBuilder<'rg> {
    fn drop(&mut self) {
        if let Some(pass) = self.pass.take() {
            self.rg.record_pass(pass);
        }
    }
}

impl<'rg> PassBuilder<'rg> {
    pub(crate) fn new(rg: &'rg mut RenderGraph, pass: RecordedPass) -> Self {
        Self {
            rg,
            pass: Some(pass),
        }
    }

    pub fn create<Desc: ResourceDesc>(&mut self, desc: Desc) -> Handle<Desc::Resource>
    where
        Desc::Resource: Resource<Desc = Desc>,
    {
        self.rg.create(desc)
    }

    pub fn read<Res: Resource>(
        &mut self,
        handle: &Handle<Res>,
        access_type: AccessType,
    ) -> Ref<Res, GpuSrv> {
        debug_assert!(!access_type.is_write());

        // Reading a transient resource that no prior pass has written is a
        // graph construction error; imported resources arrive pre-written.
        debug_assert!(
            handle.raw.version > 0 || self.rg.is_imported(handle.raw.id),
            "pass {:?} reads resource {} before any pass wrote it",
            self.pass.as_ref().map(|p| p.name.as_str()).unwrap_or(""),
            handle.raw.id,
        );

        let pass = self.pass.as_mut().unwrap();
        pass.reads.push((handle.raw, access_type));

        Ref {
            handle: handle.raw,
            desc: handle.desc.clone(),
            marker: PhantomData,
        }
    }

    pub fn write<Res: Resource>(
        &mut self,
        handle: &mut Handle<Res>,
        access_type: AccessType,
    ) -> Ref<Res, GpuUav> {
        debug_assert!(access_type.is_write());

        handle.raw = handle.raw.next_version();

        let pass = self.pass.as_mut().unwrap();
        pass.writes.push((handle.raw, access_type));

        Ref {
            handle: handle.raw,
            desc: handle.desc.clone(),
            marker: PhantomData,
        }
    }

    /// Write access without a version bump: the pass promises not to depend
    /// on any other pass's concurrent writes to the same resource, letting
    /// the graph overlap it with neighbors. Used for atomic scratch buffers
    /// shared by consecutive passes.
    pub fn write_no_sync<Res: Resource>(
        &mut self,
        handle: &mut Handle<Res>,
        access_type: AccessType,
    ) -> Ref<Res, GpuUav> {
        debug_assert!(access_type.is_write());

        let pass = self.pass.as_mut().unwrap();
        pass.writes.push((handle.raw, access_type));

        Ref {
            handle: handle.raw,
            desc: handle.desc.clone(),
            marker: PhantomData,
        }
    }

    pub fn register_compute_pipeline(&mut self, kernel_name: &str) -> RgComputePipelineHandle {
        let idx = self.rg.compute_pipelines.len();
        self.rg.compute_pipelines.push(RgComputePipeline {
            kernel_name: kernel_name.to_owned(),
        });
        RgComputePipelineHandle { idx }
    }

    pub fn render(
        mut self,
        render: impl (FnOnce(&mut RenderPassApi) -> Result<(), GpuError>) + 'static,
    ) {
        let prev = self
            .pass
            .as_mut()
            .unwrap()
            .render_fn
            .replace(Box::new(render));
        assert!(prev.is_none());
    }
}
