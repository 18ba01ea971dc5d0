use bytemuck::Pod;
use candela_gpu::DynamicConstants;

use crate::{
    pass_api::{BindRgRef, RenderPassBinding},
    pass_builder::PassBuilder,
    permutation::{permuted_kernel_name, KernelPermutation},
    resource::*,
};

pub trait ConstBlob {
    fn push_self(self: Box<Self>, dynamic_constants: &mut DynamicConstants) -> u32;
}

impl<T> ConstBlob for T
where
    T: Pod + 'static,
{
    fn push_self(self: Box<Self>, dynamic_constants: &mut DynamicConstants) -> u32 {
        dynamic_constants.push(&*self)
    }
}

struct VecBlob<T>(Vec<T>);

impl<T> ConstBlob for VecBlob<T>
where
    T: Pod + 'static,
{
    fn push_self(self: Box<Self>, dynamic_constants: &mut DynamicConstants) -> u32 {
        dynamic_constants.push_from_iter(self.0.into_iter())
    }
}

struct SimplePassState {
    kernel_name: String,
    bindings: Vec<RenderPassBinding>,
    const_blobs: Vec<(usize, Box<dyn ConstBlob>)>,
}

/// Chained builder for the common "bind some resources and a constant block,
/// then dispatch a compute kernel" pass shape.
pub struct SimpleComputePass<'rg> {
    pass: PassBuilder<'rg>,
    state: SimplePassState,
}

impl<'rg> SimpleComputePass<'rg> {
    pub fn new_compute(pass: PassBuilder<'rg>, kernel_name: &str) -> Self {
        Self {
            pass,
            state: SimplePassState {
                kernel_name: kernel_name.to_owned(),
                bindings: Vec::new(),
                const_blobs: Vec::new(),
            },
        }
    }

    /// Selects a compiled kernel variant. The vector is canonicalized via
    /// `KernelPermutation::remap` before it ever reaches the registry.
    pub fn permutation<P: KernelPermutation>(mut self, permutation: P) -> Self {
        self.state.kernel_name = permuted_kernel_name(&self.state.kernel_name, permutation);
        self
    }

    pub fn read<Res>(mut self, handle: &Handle<Res>) -> Self
    where
        Res: Resource + 'static,
        Ref<Res, GpuSrv>: BindRgRef,
    {
        let handle_ref = self.pass.read(
            handle,
            AccessType::AnyShaderReadSampledImageOrUniformTexelBuffer,
        );

        self.state.bindings.push(BindRgRef::bind(&handle_ref));

        self
    }

    pub fn write<Res>(mut self, handle: &mut Handle<Res>) -> Self
    where
        Res: Resource + 'static,
        Ref<Res, GpuUav>: BindRgRef,
    {
        let handle_ref = self.pass.write(handle, AccessType::AnyShaderWrite);

        self.state.bindings.push(BindRgRef::bind(&handle_ref));

        self
    }

    pub fn write_no_sync<Res>(mut self, handle: &mut Handle<Res>) -> Self
    where
        Res: Resource + 'static,
        Ref<Res, GpuUav>: BindRgRef,
    {
        let handle_ref = self.pass.write_no_sync(handle, AccessType::AnyShaderWrite);

        self.state.bindings.push(BindRgRef::bind(&handle_ref));

        self
    }

    pub fn constants<T: ConstBlob + 'static>(mut self, consts: T) -> Self {
        let binding_idx = self.state.bindings.len();

        self.state
            .bindings
            .push(RenderPassBinding::DynamicConstants(0));
        self.state.const_blobs.push((binding_idx, Box::new(consts)));

        self
    }

    pub fn dynamic_storage_buffer_vec<T: Pod + 'static>(mut self, consts: Vec<T>) -> Self {
        let binding_idx = self.state.bindings.len();

        self.state
            .bindings
            .push(RenderPassBinding::DynamicConstantsStorageBuffer(0));
        self.state
            .const_blobs
            .push((binding_idx, Box::new(VecBlob(consts))));

        self
    }

    pub fn bind<Binding>(self, binding: &Binding) -> Self
    where
        Binding: BindToSimpleComputePass<'rg>,
    {
        binding.bind(self)
    }

    pub fn bind_mut<Binding>(self, binding: &mut Binding) -> Self
    where
        Binding: BindMutToSimpleComputePass<'rg>,
    {
        binding.bind_mut(self)
    }

    pub fn dispatch(self, extent: [u32; 3]) {
        let mut pass = self.pass;
        let mut state = self.state;

        let pipeline = pass.register_compute_pipeline(&state.kernel_name);

        pass.render(move |api| {
            patch_const_blobs(&mut state, api.dynamic_constants());

            let pipeline = api.bind_compute_pipeline(pipeline.into_binding(&state.bindings))?;
            pipeline.dispatch(extent)
        });
    }

    pub fn dispatch_indirect(self, args_buffer: &Handle<Buffer>, args_buffer_offset: u64) {
        let mut pass = self.pass;
        let mut state = self.state;

        let pipeline = pass.register_compute_pipeline(&state.kernel_name);
        let args_buffer_ref = pass.read(args_buffer, AccessType::IndirectBuffer);

        pass.render(move |api| {
            patch_const_blobs(&mut state, api.dynamic_constants());

            let pipeline = api.bind_compute_pipeline(pipeline.into_binding(&state.bindings))?;
            pipeline.dispatch_indirect(args_buffer_ref, args_buffer_offset)
        });
    }
}

fn patch_const_blobs(state: &mut SimplePassState, dynamic_constants: &mut DynamicConstants) {
    let const_blobs = std::mem::take(&mut state.const_blobs);
    for (binding_idx, blob) in const_blobs {
        let offset = ConstBlob::push_self(blob, dynamic_constants);
        match &mut state.bindings[binding_idx] {
            RenderPassBinding::DynamicConstants(slot)
            | RenderPassBinding::DynamicConstantsStorageBuffer(slot) => {
                *slot = offset;
            }
            _ => unreachable!(),
        }
    }
}

pub trait BindToSimpleComputePass<'rg> {
    fn bind(&self, pass: SimpleComputePass<'rg>) -> SimpleComputePass<'rg>;
}

pub trait BindMutToSimpleComputePass<'rg> {
    fn bind_mut(&mut self, pass: SimpleComputePass<'rg>) -> SimpleComputePass<'rg>;
}
