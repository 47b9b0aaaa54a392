//! Narrow GPU command interface used by the batchers.
//!
//! The batchers only ever create buffers, replace their contents wholesale,
//! bind vertex arrays and issue indexed triangle draws. Everything else
//! (surfaces, passes, submission) belongs to the backend implementation.

use thiserror::Error;

use crate::renderer::shaders::{ShaderType, VertexAttribute};

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to create buffer '{0}'")]
    BufferCreationFailed(String),
    #[error("Failed to create vertex array '{0}'")]
    VertexArrayCreationFailed(String),
    #[error("Failed to create pipeline '{label}': {reason}")]
    PipelineCreationFailed { label: String, reason: String },
    #[error("Unknown buffer {0:?}")]
    UnknownBuffer(BufferHandle),
    #[error("Unknown vertex array {0:?}")]
    UnknownVertexArray(VertexArrayHandle),
    #[error("Unknown pipeline {0:?}")]
    UnknownPipeline(PipelineHandle),
    #[error("Buffer {buffer:?} is a {actual:?} buffer, expected {expected:?}")]
    WrongBufferKind {
        buffer: BufferHandle,
        expected: BufferKind,
        actual: BufferKind,
    },
    #[error("Draw issued without a bound vertex array")]
    NoVertexArrayBound,
    #[error("Draw issued without an active pipeline")]
    NoActivePipeline,
    #[error("Vertex array {0:?} has no index buffer attached")]
    MissingIndexBuffer(VertexArrayHandle),
    #[error("Vertex array {vertex_array:?} has no buffer for shader location {location}")]
    MissingVertexBuffer {
        vertex_array: VertexArrayHandle,
        location: u32,
    },
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a vertex array: the set of buffers wired to one pipeline's inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexArrayHandle(pub(crate) u64);

/// Handle to a compiled render pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineHandle(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Index,
    Vertex,
}

/// Everything a backend needs to compile one batcher pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PipelineDescriptor<'a> {
    pub label: &'a str,
    pub shader: ShaderType,
    pub source: &'a str,
    /// One vertex buffer per attribute, in slot order.
    pub attributes: &'a [VertexAttribute],
}

impl<'a> PipelineDescriptor<'a> {
    pub fn for_shader(shader: ShaderType) -> Self {
        Self {
            label: shader.name(),
            shader,
            source: shader.source(),
            attributes: shader.vertex_attributes(),
        }
    }
}

/// GPU command interface.
///
/// All methods take `&self`: commands are issued from the rendering thread
/// only and are ordered by the backend in submission order.
pub trait GpuBackend {
    fn create_vertex_array(&self, label: &str) -> BackendResult<VertexArrayHandle>;

    fn create_buffer(&self, label: &str, kind: BufferKind) -> BackendResult<BufferHandle>;

    fn create_pipeline(&self, desc: &PipelineDescriptor<'_>) -> BackendResult<PipelineHandle>;

    /// Binds `vertex_array` for subsequent draws, or unbinds with `None`.
    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayHandle>);

    /// Wires `buffer` as the data source of shader input `location`.
    fn attach_vertex_buffer(
        &self,
        vertex_array: VertexArrayHandle,
        buffer: BufferHandle,
        location: u32,
    ) -> BackendResult<()>;

    fn attach_index_buffer(
        &self,
        vertex_array: VertexArrayHandle,
        buffer: BufferHandle,
    ) -> BackendResult<()>;

    /// Replaces the entire contents of `buffer`. The previous contents are
    /// discarded and the buffer grows when `contents` does not fit.
    fn replace_buffer_data(&self, buffer: BufferHandle, contents: &[u8]) -> BackendResult<()>;

    fn use_pipeline(&self, pipeline: Option<PipelineHandle>);

    /// Draws `index_count` indices of the bound vertex array as a triangle
    /// list with the active pipeline. Indices are `u32`.
    fn draw_indexed_triangles(&self, index_count: u32) -> BackendResult<()>;

    fn delete_buffer(&self, buffer: BufferHandle);

    fn delete_vertex_array(&self, vertex_array: VertexArrayHandle);
}

impl<B: GpuBackend + ?Sized> GpuBackend for &B {
    fn create_vertex_array(&self, label: &str) -> BackendResult<VertexArrayHandle> {
        (**self).create_vertex_array(label)
    }

    fn create_buffer(&self, label: &str, kind: BufferKind) -> BackendResult<BufferHandle> {
        (**self).create_buffer(label, kind)
    }

    fn create_pipeline(&self, desc: &PipelineDescriptor<'_>) -> BackendResult<PipelineHandle> {
        (**self).create_pipeline(desc)
    }

    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayHandle>) {
        (**self).bind_vertex_array(vertex_array)
    }

    fn attach_vertex_buffer(
        &self,
        vertex_array: VertexArrayHandle,
        buffer: BufferHandle,
        location: u32,
    ) -> BackendResult<()> {
        (**self).attach_vertex_buffer(vertex_array, buffer, location)
    }

    fn attach_index_buffer(
        &self,
        vertex_array: VertexArrayHandle,
        buffer: BufferHandle,
    ) -> BackendResult<()> {
        (**self).attach_index_buffer(vertex_array, buffer)
    }

    fn replace_buffer_data(&self, buffer: BufferHandle, contents: &[u8]) -> BackendResult<()> {
        (**self).replace_buffer_data(buffer, contents)
    }

    fn use_pipeline(&self, pipeline: Option<PipelineHandle>) {
        (**self).use_pipeline(pipeline)
    }

    fn draw_indexed_triangles(&self, index_count: u32) -> BackendResult<()> {
        (**self).draw_indexed_triangles(index_count)
    }

    fn delete_buffer(&self, buffer: BufferHandle) {
        (**self).delete_buffer(buffer)
    }

    fn delete_vertex_array(&self, vertex_array: VertexArrayHandle) {
        (**self).delete_vertex_array(vertex_array)
    }
}
