pub mod backend;
pub mod context;
pub mod pipeline_builder;
pub mod recording;
pub mod shader_cache;
pub mod shaders;
pub mod wgpu_backend;

pub use backend::{BackendError, GpuBackend};
pub use recording::RecordingBackend;
pub use wgpu_backend::WgpuBackend;
