#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("No kernel registered for {name:?}")]
    KernelMissing { name: String },

    #[error("Invalid resource access: {info:?}")]
    ResourceAccess { info: String },

    #[error("Invalid dispatch: {info:?}")]
    InvalidDispatch { info: String },

    #[error("Allocation failed for {name:?}: {info:?}")]
    Allocation { name: String, info: String },
}
