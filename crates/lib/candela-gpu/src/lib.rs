pub mod buffer;
pub mod device;
pub mod dynamic_constants;
pub mod error;
pub mod image;
pub mod kernel;

pub use buffer::*;
pub use device::*;
pub use dynamic_constants::DynamicConstants;
pub use error::GpuError;
pub use image::*;
pub use kernel::*;
