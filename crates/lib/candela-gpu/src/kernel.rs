use std::{collections::HashMap, sync::Arc};

use bytemuck::{Pod, Zeroable};

use crate::{
    buffer::CpuBuffer,
    error::GpuError,
    image::CpuImage,
};

/// One indirect dispatch record. Args buffers are arrays of these; a zero
/// group count is a valid no-op dispatch, never a launch failure.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct DispatchIndirectArgs {
    pub group_count: [u32; 3],
    pub _pad: u32,
}

pub const INDIRECT_DISPATCH_STRIDE: u64 = std::mem::size_of::<DispatchIndirectArgs>() as u64;

pub fn dispatch_groups(extent: [u32; 3], group_size: [u32; 3]) -> [u32; 3] {
    [
        (extent[0] + group_size[0] - 1) / group_size[0],
        (extent[1] + group_size[1] - 1) / group_size[1],
        (extent[2] + group_size[2] - 1) / group_size[2],
    ]
}

/// A resource as seen by an executing kernel, in declared binding order.
pub enum BoundResource<'a> {
    ImageSrv(&'a CpuImage),
    ImageUav(&'a mut CpuImage),
    BufferSrv(&'a CpuBuffer),
    BufferUav(&'a mut CpuBuffer),
    Constants(&'a [u8]),
}

/// Execution context handed to a kernel: its bindings in the order the pass
/// declared them, and the dispatch extent. For direct dispatches the extent
/// is the thread extent the pass asked for; for indirect dispatches it is
/// the group count fetched from the args buffer.
pub struct KernelCtx<'a, 'b> {
    pub extent: [u32; 3],
    bindings: &'b mut [BoundResource<'a>],
}

impl<'a, 'b> KernelCtx<'a, 'b> {
    pub fn new(extent: [u32; 3], bindings: &'b mut [BoundResource<'a>]) -> Self {
        Self { extent, bindings }
    }

    pub fn image(&self, binding: usize) -> &CpuImage {
        match &self.bindings[binding] {
            BoundResource::ImageSrv(img) => img,
            BoundResource::ImageUav(img) => img,
            _ => panic!("binding {} is not an image", binding),
        }
    }

    pub fn image_mut(&mut self, binding: usize) -> &mut CpuImage {
        match &mut self.bindings[binding] {
            BoundResource::ImageUav(img) => img,
            BoundResource::ImageSrv(_) => panic!("binding {} is not writable", binding),
            _ => panic!("binding {} is not an image", binding),
        }
    }

    pub fn buffer(&self, binding: usize) -> &CpuBuffer {
        match &self.bindings[binding] {
            BoundResource::BufferSrv(buf) => buf,
            BoundResource::BufferUav(buf) => buf,
            _ => panic!("binding {} is not a buffer", binding),
        }
    }

    pub fn buffer_mut(&mut self, binding: usize) -> &mut CpuBuffer {
        match &mut self.bindings[binding] {
            BoundResource::BufferUav(buf) => buf,
            BoundResource::BufferSrv(_) => panic!("binding {} is not writable", binding),
            _ => panic!("binding {} is not a buffer", binding),
        }
    }

    pub fn constants<T: Pod>(&self, binding: usize) -> T {
        match &self.bindings[binding] {
            BoundResource::Constants(bytes) => {
                bytemuck::pod_read_unaligned(&bytes[..std::mem::size_of::<T>()])
            }
            _ => panic!("binding {} is not a constants block", binding),
        }
    }

    /// Constants pushed from an iterator/vec; reads `count` consecutive
    /// records starting at the binding's offset.
    pub fn constants_array<T: Pod>(&self, binding: usize, count: usize) -> Vec<T> {
        match &self.bindings[binding] {
            BoundResource::Constants(bytes) => {
                let stride = std::mem::size_of::<T>();
                (0..count)
                    .map(|i| bytemuck::pod_read_unaligned(&bytes[i * stride..(i + 1) * stride]))
                    .collect()
            }
            _ => panic!("binding {} is not a constants block", binding),
        }
    }
}

pub trait Kernel: Send + Sync {
    fn dispatch(&self, ctx: &mut KernelCtx) -> Result<(), GpuError>;
}

impl<F> Kernel for F
where
    F: Fn(&mut KernelCtx) -> Result<(), GpuError> + Send + Sync,
{
    fn dispatch(&self, ctx: &mut KernelCtx) -> Result<(), GpuError> {
        (self)(ctx)
    }
}

/// Explicit name -> kernel registration map. Variant selection for permuted
/// kernels happens through the mangled name produced by the invocation
/// layer; only canonical permutation vectors may be registered or resolved.
#[derive(Default)]
pub struct KernelRegistry {
    kernels: HashMap<String, Arc<dyn Kernel>>,
}

impl KernelRegistry {
    pub fn register(&mut self, name: impl Into<String>, kernel: impl Kernel + 'static) {
        let name = name.into();
        let prev = self.kernels.insert(name.clone(), Arc::new(kernel));
        assert!(prev.is_none(), "kernel {:?} registered twice", name);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Kernel>, GpuError> {
        self.kernels
            .get(name)
            .cloned()
            .ok_or_else(|| GpuError::KernelMissing {
                name: name.to_owned(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kernels.contains_key(name)
    }
}
