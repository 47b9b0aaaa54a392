use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::renderer::backend::{
    BackendError, BackendResult, BufferHandle, BufferKind, GpuBackend, PipelineDescriptor,
    PipelineHandle, VertexArrayHandle,
};
use crate::renderer::pipeline_builder::PipelineBuilder;

const MIN_BUFFER_CAPACITY: u64 = 256;

struct GpuBuffer {
    label: String,
    kind: BufferKind,
    buffer: wgpu::Buffer,
    capacity: u64,
    len: u64,
    written_this_frame: bool,
}

impl GpuBuffer {
    fn grow(&mut self, device: &wgpu::Device, required: u64) -> BackendResult<()> {
        let new_capacity = required
            .max(self.capacity * 2)
            .max(MIN_BUFFER_CAPACITY);
        log::info!(
            "Growing buffer '{}': {} -> {} bytes",
            self.label,
            self.capacity,
            new_capacity
        );

        let buffer = allocate_buffer(device, &self.label, new_capacity, buffer_usage(self.kind))?;
        self.buffer = buffer;
        self.capacity = new_capacity;
        Ok(())
    }

    /// Bound slice covering the last upload, `None` while nothing was uploaded.
    fn uploaded(&self) -> Option<wgpu::BufferSlice<'_>> {
        (self.len > 0).then(|| self.buffer.slice(..self.len))
    }
}

fn buffer_usage(kind: BufferKind) -> wgpu::BufferUsages {
    let usage = match kind {
        BufferKind::Index => wgpu::BufferUsages::INDEX,
        BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
    };
    usage | wgpu::BufferUsages::COPY_DST
}

/// Creates a buffer inside error scopes, so a failed allocation is returned
/// instead of reaching the device's uncaptured-error handler.
fn allocate_buffer(
    device: &wgpu::Device,
    label: &str,
    size: u64,
    usage: wgpu::BufferUsages,
) -> BackendResult<wgpu::Buffer> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage,
        mapped_at_creation: false,
    });

    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    match validation.or(out_of_memory) {
        Some(err) => {
            log::error!("Failed to allocate {} bytes for '{}': {}", size, label, err);
            Err(BackendError::BufferCreationFailed(label.to_owned()))
        }
        None => Ok(buffer),
    }
}

#[derive(Default)]
struct VertexArray {
    vertex_buffers: HashMap<u32, BufferHandle>,
    index_buffer: Option<BufferHandle>,
}

struct CompiledPipeline {
    pipeline: wgpu::RenderPipeline,
    /// Shader location fed by each vertex buffer slot.
    locations: Vec<u32>,
}

#[derive(Debug, Clone, Copy)]
struct DrawCommand {
    pipeline: PipelineHandle,
    vertex_array: VertexArrayHandle,
    index_count: u32,
}

#[derive(Default)]
struct WgpuState {
    buffers: HashMap<u64, GpuBuffer>,
    vertex_arrays: HashMap<u64, VertexArray>,
    pipelines: HashMap<u64, CompiledPipeline>,
    bound_vertex_array: Option<VertexArrayHandle>,
    active_pipeline: Option<PipelineHandle>,
    draws: Vec<DrawCommand>,
}

/// [`GpuBackend`] over a wgpu device.
///
/// Uploads go straight to the queue. Draws are recorded and replayed into a
/// render pass by [`WgpuBackend::encode`]; since queue writes land before the
/// frame's command buffer executes, each buffer should be uploaded at most
/// once per frame.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target_format: wgpu::TextureFormat,
    sample_count: u32,
    state: RefCell<WgpuState>,
    next_id: Cell<u64>,
}

impl WgpuBackend {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        target_format: wgpu::TextureFormat,
        sample_count: u32,
    ) -> Self {
        Self {
            device,
            queue,
            target_format,
            sample_count,
            state: RefCell::new(WgpuState::default()),
            next_id: Cell::new(0),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Number of draws recorded since the last [`WgpuBackend::finish_frame`].
    pub fn pending_draws(&self) -> usize {
        self.state.borrow().draws.len()
    }

    /// Replays the draws recorded this frame into `pass`.
    pub fn encode(&self, pass: &mut wgpu::RenderPass<'_>) {
        let state = self.state.borrow();
        for draw in &state.draws {
            if let Err(err) = encode_draw(&state, draw, pass) {
                log::warn!("Skipping recorded draw {:?}: {}", draw, err);
            }
        }
    }

    /// Drops the recorded draws once the frame has been encoded.
    pub fn finish_frame(&self) {
        let mut state = self.state.borrow_mut();
        state.draws.clear();
        for buffer in state.buffers.values_mut() {
            buffer.written_this_frame = false;
        }
    }

    fn next_handle(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }
}

fn encode_draw(
    state: &WgpuState,
    draw: &DrawCommand,
    pass: &mut wgpu::RenderPass<'_>,
) -> BackendResult<()> {
    let compiled = state
        .pipelines
        .get(&draw.pipeline.0)
        .ok_or(BackendError::UnknownPipeline(draw.pipeline))?;
    let vertex_array = state
        .vertex_arrays
        .get(&draw.vertex_array.0)
        .ok_or(BackendError::UnknownVertexArray(draw.vertex_array))?;

    let index_handle = vertex_array
        .index_buffer
        .ok_or(BackendError::MissingIndexBuffer(draw.vertex_array))?;
    let index_slice = state
        .buffers
        .get(&index_handle.0)
        .and_then(GpuBuffer::uploaded)
        .ok_or(BackendError::UnknownBuffer(index_handle))?;

    let mut vertex_slices = Vec::with_capacity(compiled.locations.len());
    for &location in &compiled.locations {
        let handle = vertex_array.vertex_buffers.get(&location).copied().ok_or(
            BackendError::MissingVertexBuffer {
                vertex_array: draw.vertex_array,
                location,
            },
        )?;
        let slice = state
            .buffers
            .get(&handle.0)
            .and_then(GpuBuffer::uploaded)
            .ok_or(BackendError::UnknownBuffer(handle))?;
        vertex_slices.push(slice);
    }

    pass.set_pipeline(&compiled.pipeline);
    pass.set_index_buffer(index_slice, wgpu::IndexFormat::Uint32);
    for (slot, slice) in vertex_slices.into_iter().enumerate() {
        pass.set_vertex_buffer(slot as u32, slice);
    }
    pass.draw_indexed(0..draw.index_count, 0, 0..1);
    Ok(())
}

impl GpuBackend for WgpuBackend {
    fn create_vertex_array(&self, label: &str) -> BackendResult<VertexArrayHandle> {
        let handle = VertexArrayHandle(self.next_handle());
        log::debug!("Created vertex array '{}' ({:?})", label, handle);
        self.state
            .borrow_mut()
            .vertex_arrays
            .insert(handle.0, VertexArray::default());
        Ok(handle)
    }

    fn create_buffer(&self, label: &str, kind: BufferKind) -> BackendResult<BufferHandle> {
        let buffer = allocate_buffer(&self.device, label, MIN_BUFFER_CAPACITY, buffer_usage(kind))?;
        let handle = BufferHandle(self.next_handle());
        self.state.borrow_mut().buffers.insert(
            handle.0,
            GpuBuffer {
                label: label.to_owned(),
                kind,
                buffer,
                capacity: MIN_BUFFER_CAPACITY,
                len: 0,
                written_this_frame: false,
            },
        );
        Ok(handle)
    }

    fn create_pipeline(&self, desc: &PipelineDescriptor<'_>) -> BackendResult<PipelineHandle> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label),
                source: wgpu::ShaderSource::Wgsl(desc.source.into()),
            });

        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &[],
                push_constant_ranges: &[],
            });

        let mut builder = PipelineBuilder::new(&self.device, &layout, &shader)
            .with_label(desc.label)
            .with_color_target(self.target_format, Some(wgpu::BlendState::ALPHA_BLENDING))
            .with_multisample(self.sample_count);
        for attribute in desc.attributes {
            builder = builder.with_vertex_buffer(attribute.layout());
        }
        let pipeline = builder.build();

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::PipelineCreationFailed {
                label: desc.label.to_owned(),
                reason: err.to_string(),
            });
        }

        let handle = PipelineHandle(self.next_handle());
        self.state.borrow_mut().pipelines.insert(
            handle.0,
            CompiledPipeline {
                pipeline,
                locations: desc
                    .attributes
                    .iter()
                    .map(|attribute| attribute.location())
                    .collect(),
            },
        );
        Ok(handle)
    }

    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayHandle>) {
        self.state.borrow_mut().bound_vertex_array = vertex_array;
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
        Ok(())
    }

    fn replace_buffer_data(&self, buffer: BufferHandle, contents: &[u8]) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let entry = state
            .buffers
            .get_mut(&buffer.0)
            .ok_or(BackendError::UnknownBuffer(buffer))?;

        if entry.written_this_frame {
            log::warn!(
                "Buffer '{}' uploaded twice in one frame; earlier draws will see the latest contents",
                entry.label
            );
        }

        let len = contents.len() as u64;
        let aligned = wgpu::util::align_to(len, wgpu::COPY_BUFFER_ALIGNMENT);
        if aligned > entry.capacity {
            entry.grow(&self.device, aligned)?;
        }

        if len == aligned {
            if len > 0 {
                self.queue.write_buffer(&entry.buffer, 0, contents);
            }
        } else {
            let mut padded = contents.to_vec();
            padded.resize(aligned as usize, 0);
            self.queue.write_buffer(&entry.buffer, 0, &padded);
        }

        entry.len = len;
        entry.written_this_frame = true;
        Ok(())
    }

    fn use_pipeline(&self, pipeline: Option<PipelineHandle>) {
        self.state.borrow_mut().active_pipeline = pipeline;
    }

    fn draw_indexed_triangles(&self, index_count: u32) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let vertex_array = state
            .bound_vertex_array
            .ok_or(BackendError::NoVertexArrayBound)?;
        let pipeline = state.active_pipeline.ok_or(BackendError::NoActivePipeline)?;
        if !state.pipelines.contains_key(&pipeline.0) {
            return Err(BackendError::UnknownPipeline(pipeline));
        }
        state.draws.push(DrawCommand {
            pipeline,
            vertex_array,
            index_count,
        });
        Ok(())
    }

    fn delete_buffer(&self, buffer: BufferHandle) {
        if let Some(entry) = self.state.borrow_mut().buffers.remove(&buffer.0) {
            entry.buffer.destroy();
        }
    }

    fn delete_vertex_array(&self, vertex_array: VertexArrayHandle) {
        let mut state = self.state.borrow_mut();
        state.vertex_arrays.remove(&vertex_array.0);
        if state.bound_vertex_array == Some(vertex_array) {
            state.bound_vertex_array = None;
        }
    }
}

fn expect_kind(state: &WgpuState, buffer: BufferHandle, expected: BufferKind) -> BackendResult<()> {
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
