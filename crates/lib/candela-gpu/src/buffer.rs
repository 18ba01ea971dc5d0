use bitflags::bitflags;
use bytemuck::Pod;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BufferUsageFlags: u32 {
        const STORAGE_BUFFER = 1 << 0;
        const INDIRECT_BUFFER = 1 << 1;
        const TRANSFER_SRC = 1 << 2;
        const TRANSFER_DST = 1 << 3;
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BufferDesc {
    pub size: usize,
    pub usage: BufferUsageFlags,
}

impl BufferDesc {
    pub fn new_gpu_only(size: usize, usage: BufferUsageFlags) -> Self {
        Self { size, usage }
    }
}

pub struct CpuBuffer {
    pub desc: BufferDesc,
    data: Vec<u8>,
}

impl CpuBuffer {
    pub fn new(desc: BufferDesc, initial_data: Option<&[u8]>) -> Self {
        let mut data = vec![0u8; desc.size];
        if let Some(initial) = initial_data {
            data[..initial.len()].copy_from_slice(initial);
        }
        Self { desc, data }
    }

    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    pub fn as_slice<T: Pod>(&self) -> &[T] {
        let len = self.data.len() / std::mem::size_of::<T>() * std::mem::size_of::<T>();
        bytemuck::cast_slice(&self.data[..len])
    }

    pub fn as_mut_slice<T: Pod>(&mut self) -> &mut [T] {
        let len = self.data.len() / std::mem::size_of::<T>() * std::mem::size_of::<T>();
        bytemuck::cast_slice_mut(&mut self.data[..len])
    }

    pub fn read_at<T: Pod>(&self, byte_offset: usize) -> T {
        let size = std::mem::size_of::<T>();
        *bytemuck::from_bytes(&self.data[byte_offset..byte_offset + size])
    }

    pub fn write_at<T: Pod>(&mut self, byte_offset: usize, value: T) {
        let size = std::mem::size_of::<T>();
        self.data[byte_offset..byte_offset + size].copy_from_slice(bytemuck::bytes_of(&value));
    }
}
