use std::marker::PhantomData;

pub use candela_gpu::{BufferDesc, ImageDesc};

/// GPU-side access intent of a declared resource use. The graph uses these
/// to order state transitions between passes; the reference executor only
/// validates them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessType {
    Nothing,
    AnyShaderReadSampledImageOrUniformTexelBuffer,
    AnyShaderWrite,
    IndirectBuffer,
    TransferWrite,
}

impl AccessType {
    pub fn is_write(self) -> bool {
        matches!(self, AccessType::AnyShaderWrite | AccessType::TransferWrite)
    }
}

/// Marker type for graph image resources.
#[derive(Debug)]
pub struct Image;

/// Marker type for graph buffer resources.
#[derive(Debug)]
pub struct Buffer;

pub trait Resource {
    type Desc: ResourceDesc;
}

impl Resource for Image {
    type Desc = ImageDesc;
}

impl Resource for Buffer {
    type Desc = BufferDesc;
}

#[derive(Clone, Copy, Debug)]
pub enum GraphResourceDesc {
    Image(ImageDesc),
    Buffer(BufferDesc),
}

impl From<ImageDesc> for GraphResourceDesc {
    fn from(desc: ImageDesc) -> Self {
        Self::Image(desc)
    }
}

impl From<BufferDesc> for GraphResourceDesc {
    fn from(desc: BufferDesc) -> Self {
        Self::Buffer(desc)
    }
}

pub trait ResourceDesc: Clone + std::fmt::Debug + Into<GraphResourceDesc> {
    type Resource: Resource;
}

impl ResourceDesc for ImageDesc {
    type Resource = Image;
}

impl ResourceDesc for BufferDesc {
    type Resource = Buffer;
}

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct GraphRawResourceHandle {
    pub(crate) id: u32,
    pub(crate) version: u32,
}

impl GraphRawResourceHandle {
    pub(crate) fn next_version(self) -> Self {
        Self {
            id: self.id,
            version: self.version + 1,
        }
    }
}

#[derive(Debug)]
pub struct Handle<ResType: Resource> {
    pub(crate) raw: GraphRawResourceHandle,
    pub(crate) desc: <ResType as Resource>::Desc,
    pub(crate) marker: PhantomData<ResType>,
}

impl<ResType: Resource> PartialEq for Handle<ResType> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<ResType: Resource> Eq for Handle<ResType> {}

impl<ResType: Resource> Handle<ResType> {
    pub fn desc(&self) -> &<ResType as Resource>::Desc {
        &self.desc
    }

    pub(crate) fn clone_unchecked(&self) -> Self {
        Self {
            raw: self.raw,
            desc: self.desc.clone(),
            marker: PhantomData,
        }
    }
}

#[derive(Debug)]
pub struct ExportedHandle<ResType: Resource> {
    pub(crate) raw: GraphRawResourceHandle,
    pub(crate) marker: PhantomData<ResType>,
}

impl<ResType: Resource> Clone for ExportedHandle<ResType> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw,
            marker: PhantomData,
        }
    }
}

impl<ResType: Resource> Copy for ExportedHandle<ResType> {}

/// A handle whose owner has finished writing; consumers may only read.
pub struct ReadOnlyHandle<ResType: Resource>(Handle<ResType>);

impl<ResType: Resource> std::ops::Deref for ReadOnlyHandle<ResType> {
    type Target = Handle<ResType>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<ResType: Resource> From<Handle<ResType>> for ReadOnlyHandle<ResType> {
    fn from(h: Handle<ResType>) -> Self {
        Self(h)
    }
}

#[derive(Debug)]
pub struct Ref<ResType: Resource, ViewType: GpuViewType> {
    pub(crate) handle: GraphRawResourceHandle,
    pub(crate) desc: <ResType as Resource>::Desc,
    pub(crate) marker: PhantomData<(ResType, ViewType)>,
}

impl<ResType: Resource, ViewType: GpuViewType> Ref<ResType, ViewType> {
    pub fn desc(&self) -> &<ResType as Resource>::Desc {
        &self.desc
    }
}

impl<ResType: Resource, ViewType: GpuViewType> Clone for Ref<ResType, ViewType>
where
    <ResType as Resource>::Desc: Clone,
{
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            desc: self.desc.clone(),
            marker: PhantomData,
        }
    }
}

impl<ResType: Resource, ViewType: GpuViewType> Copy for Ref<ResType, ViewType> where
    <ResType as Resource>::Desc: Copy
{
}

#[derive(Clone, Copy)]
pub struct GpuSrv;
pub struct GpuUav;

pub trait GpuViewType {
    const IS_WRITABLE: bool;
}

impl GpuViewType for GpuSrv {
    const IS_WRITABLE: bool = false;
}

impl GpuViewType for GpuUav {
    const IS_WRITABLE: bool = true;
}
