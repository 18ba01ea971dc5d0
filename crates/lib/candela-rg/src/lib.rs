mod graph;
mod hl;
mod pass_api;
mod pass_builder;
mod permutation;
mod resource;
mod resource_registry;
mod temporal;

pub mod imageops;

pub use graph::*;
pub use hl::*;
pub use pass_api::*;
pub use pass_builder::*;
pub use permutation::*;
pub use resource::*;
pub use resource_registry::ResourceRegistry;
pub use temporal::*;
