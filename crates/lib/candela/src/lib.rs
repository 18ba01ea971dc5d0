pub mod frame_constants;
pub mod frame_desc;
pub mod indirect_renderer;
pub mod kernels;
pub mod logging;
pub mod render_passes;
pub mod renderers;
pub mod scene;
pub mod settings;
pub mod view;

pub use candela_gpu as gpu;
pub use candela_rg as rg;

pub use indirect_renderer::{render_frame, FrameOutputs, IndirectLightingRenderer};
pub use kernels::default_registry;
pub use settings::{GiMethod, RayTracingConfig, RenderSettings};
pub use view::ViewState;
