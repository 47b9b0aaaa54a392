//! Headless backend that records every command instead of talking to a GPU.
//!
//! Used by the test-suite: it enforces the same preconditions as the wgpu
//! backend (known handles, bound vertex array, active pipeline, attached
//! buffers) and keeps the latest contents of every buffer so uploads can be
//! inspected.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::renderer::backend::{
    BackendError, BackendResult, BufferHandle, BufferKind, GpuBackend, PipelineDescriptor,
    PipelineHandle, VertexArrayHandle,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuCommand {
    CreateVertexArray(VertexArrayHandle),
    CreateBuffer(BufferHandle, BufferKind),
    CreatePipeline(PipelineHandle, String),
    BindVertexArray(Option<VertexArrayHandle>),
    AttachVertexBuffer {
        vertex_array: VertexArrayHandle,
        buffer: BufferHandle,
        location: u32,
    },
    AttachIndexBuffer {
        vertex_array: VertexArrayHandle,
        buffer: BufferHandle,
    },
    ReplaceBufferData {
        buffer: BufferHandle,
        len: usize,
    },
    UsePipeline(Option<PipelineHandle>),
    DrawIndexedTriangles {
        vertex_array: VertexArrayHandle,
        pipeline: PipelineHandle,
        index_count: u32,
    },
    DeleteBuffer(BufferHandle),
    DeleteVertexArray(VertexArrayHandle),
}

#[derive(Debug)]
struct RecordedBuffer {
    kind: BufferKind,
    contents: Vec<u8>,
}

#[derive(Debug, Default)]
struct RecordedVertexArray {
    vertex_buffers: HashMap<u32, BufferHandle>,
    index_buffer: Option<BufferHandle>,
}

#[derive(Debug, Default)]
struct RecordingState {
    commands: Vec<GpuCommand>,
    buffers: HashMap<u64, RecordedBuffer>,
    vertex_arrays: HashMap<u64, RecordedVertexArray>,
    pipelines: HashMap<u64, Vec<u32>>,
    bound_vertex_array: Option<VertexArrayHandle>,
    active_pipeline: Option<PipelineHandle>,
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    state: RefCell<RecordingState>,
    next_id: Cell<u64>,
    allocation_limit: Option<usize>,
    allocations: Cell<usize>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose object creation fails once `limit` buffers and vertex
    /// arrays have been allocated.
    pub fn with_allocation_limit(limit: usize) -> Self {
        Self {
            allocation_limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Vec<GpuCommand> {
        self.state.borrow().commands.clone()
    }

    pub fn take_commands(&self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.state.borrow_mut().commands)
    }

    pub fn draw_calls(&self) -> Vec<u32> {
        self.state
            .borrow()
            .commands
            .iter()
            .filter_map(|command| match command {
                GpuCommand::DrawIndexedTriangles { index_count, .. } => Some(*index_count),
                _ => None,
            })
            .collect()
    }

    /// Latest uploaded contents of `buffer`, or `None` once it was deleted.
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.state
            .borrow()
            .buffers
            .get(&buffer.0)
            .map(|recorded| recorded.contents.clone())
    }

    /// Latest contents of `buffer` reinterpreted as elements of `T`.
    pub fn buffer_elements<T: bytemuck::Pod>(&self, buffer: BufferHandle) -> Option<Vec<T>> {
        self.buffer_contents(buffer).map(|bytes| {
            bytes
                .chunks_exact(std::mem::size_of::<T>())
                .map(bytemuck::pod_read_unaligned)
                .collect()
        })
    }

    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    pub fn live_vertex_arrays(&self) -> usize {
        self.state.borrow().vertex_arrays.len()
    }

    /// Buffer wired to `location` of `vertex_array`.
    pub fn vertex_buffer_at(
        &self,
        vertex_array: VertexArrayHandle,
        location: u32,
    ) -> Option<BufferHandle> {
        self.state
            .borrow()
            .vertex_arrays
            .get(&vertex_array.0)
            .and_then(|vao| vao.vertex_buffers.get(&location).copied())
    }

    pub fn index_buffer_of(&self, vertex_array: VertexArrayHandle) -> Option<BufferHandle> {
        self.state
            .borrow()
            .vertex_arrays
            .get(&vertex_array.0)
            .and_then(|vao| vao.index_buffer)
    }

    fn next_handle(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    fn reserve_allocation(&self) -> bool {
        let used = self.allocations.get();
        if self.allocation_limit.is_some_and(|limit| used >= limit) {
            return false;
        }
        self.allocations.set(used + 1);
        true
    }
}

impl GpuBackend for RecordingBackend {
    fn create_vertex_array(&self, label: &str) -> BackendResult<VertexArrayHandle> {
        if !self.reserve_allocation() {
            return Err(BackendError::VertexArrayCreationFailed(label.to_owned()));
        }
        let handle = VertexArrayHandle(self.next_handle());
        let mut state = self.state.borrow_mut();
        state
            .vertex_arrays
            .insert(handle.0, RecordedVertexArray::default());
        state.commands.push(GpuCommand::CreateVertexArray(handle));
        Ok(handle)
    }

    fn create_buffer(&self, label: &str, kind: BufferKind) -> BackendResult<BufferHandle> {
        if !self.reserve_allocation() {
            return Err(BackendError::BufferCreationFailed(label.to_owned()));
        }
        let handle = BufferHandle(self.next_handle());
        let mut state = self.state.borrow_mut();
        state.buffers.insert(
            handle.0,
            RecordedBuffer {
                kind,
                contents: Vec::new(),
            },
        );
        state.commands.push(GpuCommand::CreateBuffer(handle, kind));
        Ok(handle)
    }

    fn create_pipeline(&self, desc: &PipelineDescriptor<'_>) -> BackendResult<PipelineHandle> {
        let handle = PipelineHandle(self.next_handle());
        let locations = desc
            .attributes
            .iter()
            .map(|attribute| attribute.location())
            .collect();
        let mut state = self.state.borrow_mut();
        state.pipelines.insert(handle.0, locations);
        state
            .commands
            .push(GpuCommand::CreatePipeline(handle, desc.label.to_owned()));
        Ok(handle)
    }

    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayHandle>) {
        let mut state = self.state.borrow_mut();
        state.bound_vertex_array = vertex_array;
        state
            .commands
            .push(GpuCommand::BindVertexArray(vertex_array));
    }

    fn attach_vertex_buffer(
        &self,
        vertex_array: VertexArrayHandle,
        buffer: BufferHandle,
        location: u32,
    ) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        expect_kind(&state, buffer, BufferKind::Vertex)?;
        state
            .vertex_arrays
            .get_mut(&vertex_array.0)
            .ok_or(BackendError::UnknownVertexArray(vertex_array))?
            .vertex_buffers
            .insert(location, buffer);
        state.commands.push(GpuCommand::AttachVertexBuffer {
            vertex_array,
            buffer,
            location,
        });
        Ok(())
    }

    fn attach_index_buffer(
        &self,
        vertex_array: VertexArrayHandle,
        buffer: BufferHandle,
    ) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        expect_kind(&state, buffer, BufferKind::Index)?;
        state
            .vertex_arrays
            .get_mut(&vertex_array.0)
            .ok_or(BackendError::UnknownVertexArray(vertex_array))?
            .index_buffer = Some(buffer);
        state.commands.push(GpuCommand::AttachIndexBuffer {
            vertex_array,
            buffer,
        });
        Ok(())
    }

    fn replace_buffer_data(&self, buffer: BufferHandle, contents: &[u8]) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let recorded = state
            .buffers
            .get_mut(&buffer.0)
            .ok_or(BackendError::UnknownBuffer(buffer))?;
        recorded.contents.clear();
        recorded.contents.extend_from_slice(contents);
        state.commands.push(GpuCommand::ReplaceBufferData {
            buffer,
            len: contents.len(),
        });
        Ok(())
    }

    fn use_pipeline(&self, pipeline: Option<PipelineHandle>) {
        let mut state = self.state.borrow_mut();
        state.active_pipeline = pipeline;
        state.commands.push(GpuCommand::UsePipeline(pipeline));
    }

    fn draw_indexed_triangles(&self, index_count: u32) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let vertex_array = state
            .bound_vertex_array
            .ok_or(BackendError::NoVertexArrayBound)?;
        let pipeline = state.active_pipeline.ok_or(BackendError::NoActivePipeline)?;
        let locations = state
            .pipelines
            .get(&pipeline.0)
            .ok_or(BackendError::UnknownPipeline(pipeline))?;
        let vao = state
            .vertex_arrays
            .get(&vertex_array.0)
            .ok_or(BackendError::UnknownVertexArray(vertex_array))?;
        if vao.index_buffer.is_none() {
            return Err(BackendError::MissingIndexBuffer(vertex_array));
        }
        if let Some(&location) = locations
            .iter()
            .find(|location| !vao.vertex_buffers.contains_key(location))
        {
            return Err(BackendError::MissingVertexBuffer {
                vertex_array,
                location,
            });
        }
        state.commands.push(GpuCommand::DrawIndexedTriangles {
            vertex_array,
            pipeline,
            index_count,
        });
        Ok(())
    }

    fn delete_buffer(&self, buffer: BufferHandle) {
        let mut state = self.state.borrow_mut();
        if state.buffers.remove(&buffer.0).is_some() {
            state.commands.push(GpuCommand::DeleteBuffer(buffer));
        } else {
            log::warn!("Ignoring delete of unknown buffer {:?}", buffer);
        }
    }

    fn delete_vertex_array(&self, vertex_array: VertexArrayHandle) {
        let mut state = self.state.borrow_mut();
        if state.vertex_arrays.remove(&vertex_array.0).is_some() {
            if state.bound_vertex_array == Some(vertex_array) {
                state.bound_vertex_array = None;
            }
            state
                .commands
                .push(GpuCommand::DeleteVertexArray(vertex_array));
        } else {
            log::warn!("Ignoring delete of unknown vertex array {:?}", vertex_array);
        }
    }
}

fn expect_kind(
    state: &RecordingState,
    buffer: BufferHandle,
    expected: BufferKind,
) -> BackendResult<()> {
    let actual = state
        .buffers
        .get(&buffer.0)
        .ok_or(BackendError::UnknownBuffer(buffer))?
        .kind;
    if actual != expected {
        return Err(BackendError::WrongBufferKind {
            buffer,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::shaders::ShaderType;

    #[test]
    fn replace_discards_previous_contents() {
        let backend = RecordingBackend::new();
        let buffer = backend.create_buffer("b", BufferKind::Vertex).unwrap();

        backend.replace_buffer_data(buffer, &[1, 2, 3, 4]).unwrap();
        backend.replace_buffer_data(buffer, &[9]).unwrap();

        assert_eq!(backend.buffer_contents(buffer), Some(vec![9]));
    }

    #[test]
    fn draw_requires_bound_vertex_array_and_pipeline() {
        let backend = RecordingBackend::new();
        assert_eq!(
            backend.draw_indexed_triangles(3),
            Err(BackendError::NoVertexArrayBound)
        );

        let vao = backend.create_vertex_array("vao").unwrap();
        backend.bind_vertex_array(Some(vao));
        assert_eq!(
            backend.draw_indexed_triangles(3),
            Err(BackendError::NoActivePipeline)
        );
    }

    #[test]
    fn draw_requires_every_pipeline_input_to_be_wired() {
        let backend = RecordingBackend::new();
        let shader = ShaderType::AbsolutePositionWithSolidColor;
        let pipeline = backend
            .create_pipeline(&PipelineDescriptor::for_shader(shader))
            .unwrap();
        let vao = backend.create_vertex_array("vao").unwrap();
        let indices = backend.create_buffer("indices", BufferKind::Index).unwrap();
        let positions = backend.create_buffer("positions", BufferKind::Vertex).unwrap();
        backend.attach_index_buffer(vao, indices).unwrap();
        backend.attach_vertex_buffer(vao, positions, 0).unwrap();

        backend.bind_vertex_array(Some(vao));
        backend.use_pipeline(Some(pipeline));

        assert_eq!(
            backend.draw_indexed_triangles(3),
            Err(BackendError::MissingVertexBuffer {
                vertex_array: vao,
                location: 1
            })
        );
    }

    #[test]
    fn index_buffers_cannot_feed_vertex_inputs() {
        let backend = RecordingBackend::new();
        let vao = backend.create_vertex_array("vao").unwrap();
        let indices = backend.create_buffer("indices", BufferKind::Index).unwrap();

        assert!(matches!(
            backend.attach_vertex_buffer(vao, indices, 0),
            Err(BackendError::WrongBufferKind { .. })
        ));
    }

    #[test]
    fn allocation_limit_fails_further_creation() {
        let backend = RecordingBackend::with_allocation_limit(1);
        backend.create_vertex_array("first").unwrap();
        assert_eq!(
            backend.create_buffer("second", BufferKind::Vertex),
            Err(BackendError::BufferCreationFailed("second".into()))
        );
    }
}
