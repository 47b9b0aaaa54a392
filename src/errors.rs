//! Error types shared by the batchers, the shader cache and settings loading.

use thiserror::Error;

use crate::renderer::backend::BackendError;
use crate::renderer::shaders::{ShaderType, VertexAttribute};

#[derive(Error, Debug)]
pub enum BatchError {
    /// A submission's attribute streams do not describe the same vertices.
    #[error("{shader}: attribute streams have mismatched lengths {lengths:?}")]
    MismatchedStreams {
        shader: ShaderType,
        lengths: Vec<usize>,
    },

    /// A submission references a vertex it did not supply.
    #[error(
        "{shader}: index {index} at position {position} is out of range for {vertex_count} submitted vertices"
    )]
    IndexOutOfRange {
        shader: ShaderType,
        position: usize,
        index: u32,
        vertex_count: usize,
    },

    /// Accepting the submission would make the frame's vertex count exceed `u32` indices.
    #[error("{shader}: {requested} vertices cannot be addressed with 32-bit indices")]
    VertexCountOverflow { shader: ShaderType, requested: u64 },

    #[error("{shader}: {requested} indices exceed the per-frame index limit")]
    IndexCountOverflow { shader: ShaderType, requested: u64 },

    #[error("Shader {0} has not been compiled")]
    ShaderNotCompiled(ShaderType),

    #[error("Shader {shader} does not consume vertex attribute {attribute}")]
    AttributeNotUsed {
        shader: ShaderType,
        attribute: VertexAttribute,
    },

    #[error("Pipeline {0} is not enabled in this batcher")]
    PipelineNotEnabled(ShaderType),

    #[error("Unknown shader type '{0}'")]
    UnknownShader(String),

    #[error("GPU backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings parse error: {0}")]
    Settings(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BatchError>;
