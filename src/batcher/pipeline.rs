use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::ops::{AddAssign, Range};

use crate::batcher::indices::{append_offset_indices, validate_local_indices};
use crate::batcher::streams::{DrawData, VertexStreams};
use crate::errors::{BatchError, Result};
use crate::renderer::backend::{BufferHandle, BufferKind, GpuBackend, VertexArrayHandle};
use crate::renderer::shader_cache::PipelineResourceProvider;
use crate::renderer::shaders::ShaderType;

/// What a flush sent to the GPU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub submissions: usize,
    pub vertices: usize,
    pub indices: usize,
    pub draw_calls: usize,
}

impl AddAssign for FlushStats {
    fn add_assign(&mut self, rhs: Self) {
        self.submissions += rhs.submissions;
        self.vertices += rhs.vertices;
        self.indices += rhs.indices;
        self.draw_calls += rhs.draw_calls;
    }
}

/// Owns the vertex array and every buffer created for one pipeline and
/// deletes them exactly once when dropped, including when construction
/// fails half way.
struct PipelineBuffers<'p, P: PipelineResourceProvider> {
    resources: &'p P,
    vertex_array: VertexArrayHandle,
    owned: Vec<BufferHandle>,
}

impl<'p, P: PipelineResourceProvider> PipelineBuffers<'p, P> {
    fn new(resources: &'p P, shader: ShaderType) -> Result<Self> {
        let vertex_array = resources.backend().create_vertex_array(shader.name())?;
        Ok(Self {
            resources,
            vertex_array,
            owned: Vec::new(),
        })
    }

    fn create_buffer(&mut self, label: &str, kind: BufferKind) -> Result<BufferHandle> {
        let buffer = self.resources.backend().create_buffer(label, kind)?;
        self.owned.push(buffer);
        Ok(buffer)
    }
}

impl<'p, P: PipelineResourceProvider> Drop for PipelineBuffers<'p, P> {
    fn drop(&mut self) {
        let backend = self.resources.backend();
        for buffer in self.owned.drain(..) {
            backend.delete_buffer(buffer);
        }
        backend.delete_vertex_array(self.vertex_array);
    }
}

/// Position of one accepted submission inside the frame's accumulation state.
#[derive(Debug, Clone)]
struct QueuedSubmission {
    indices: Range<usize>,
    vertices: Range<usize>,
}

/// Remembers this frame's submissions by content so exact repeats can be skipped.
#[derive(Debug, Default)]
struct SubmissionDedupe {
    queued: HashMap<u64, Vec<QueuedSubmission>>,
}

impl SubmissionDedupe {
    fn fingerprint(local_indices: &[u32], streams: &[&[u8]]) -> u64 {
        let mut hasher = DefaultHasher::new();
        local_indices.hash(&mut hasher);
        for stream in streams {
            stream.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Fingerprints can collide, so candidates are compared against the
    /// accumulated data itself.
    fn contains<S: VertexStreams>(
        &self,
        fingerprint: u64,
        local_indices: &[u32],
        submitted: &[&[u8]],
        merged_indices: &[u32],
        streams: &S,
    ) -> bool {
        let Some(candidates) = self.queued.get(&fingerprint) else {
            return false;
        };
        let accumulated = streams.stream_bytes();

        candidates.iter().any(|candidate| {
            let base = candidate.vertices.start as u32;
            let same_indices = candidate.indices.len() == local_indices.len()
                && merged_indices[candidate.indices.clone()]
                    .iter()
                    .zip(local_indices)
                    .all(|(&merged, &local)| merged == local + base);

            same_indices
                && accumulated
                    .iter()
                    .zip(submitted)
                    .zip(S::ELEMENT_SIZES)
                    .all(|((stream, submission), &size)| {
                        let bytes = candidate.vertices.start * size..candidate.vertices.end * size;
                        stream[bytes] == **submission
                    })
        })
    }

    fn insert(&mut self, fingerprint: u64, submission: QueuedSubmission) {
        self.queued.entry(fingerprint).or_default().push(submission);
    }

    fn clear(&mut self) {
        self.queued.clear();
    }
}

/// Accumulates one frame of geometry for a single pipeline and flushes it
/// with one indexed draw.
///
/// `queue_draw` only touches CPU memory; all GPU work happens in
/// [`PipelineBatcher::draw_everything`], which also resets the batcher for
/// the next frame.
pub struct PipelineBatcher<'p, P: PipelineResourceProvider, S: VertexStreams> {
    gpu: PipelineBuffers<'p, P>,
    index_buffer: BufferHandle,
    stream_buffers: Vec<BufferHandle>,
    indices: Vec<u32>,
    streams: S,
    submissions: usize,
    dedupe: Option<SubmissionDedupe>,
}

impl<'p, P: PipelineResourceProvider, S: VertexStreams> PipelineBatcher<'p, P, S> {
    pub fn new(resources: &'p P) -> Result<Self> {
        Self::with_deduplication(resources, false)
    }

    /// Like [`PipelineBatcher::new`]; with `deduplicate` set, a submission
    /// identical to one already queued this frame is drawn only once.
    pub fn with_deduplication(resources: &'p P, deduplicate: bool) -> Result<Self> {
        let shader = S::SHADER;
        let mut gpu = PipelineBuffers::new(resources, shader)?;

        let backend = resources.backend();
        backend.bind_vertex_array(Some(gpu.vertex_array));
        let configured = Self::configure_buffers(resources, &mut gpu);
        backend.bind_vertex_array(None);
        let (index_buffer, stream_buffers) = configured?;

        log::info!(
            "Created {} batcher with {} attribute streams",
            shader,
            stream_buffers.len()
        );

        Ok(Self {
            gpu,
            index_buffer,
            stream_buffers,
            indices: Vec::new(),
            streams: S::default(),
            submissions: 0,
            dedupe: deduplicate.then(SubmissionDedupe::default),
        })
    }

    fn configure_buffers(
        resources: &'p P,
        gpu: &mut PipelineBuffers<'p, P>,
    ) -> Result<(BufferHandle, Vec<BufferHandle>)> {
        let shader = S::SHADER;
        let backend = resources.backend();

        let index_buffer = gpu.create_buffer(&format!("{shader} indices"), BufferKind::Index)?;
        backend.attach_index_buffer(gpu.vertex_array, index_buffer)?;

        let mut stream_buffers = Vec::with_capacity(shader.vertex_attributes().len());
        for &attribute in shader.vertex_attributes() {
            let buffer = gpu.create_buffer(&format!("{shader} {attribute}"), BufferKind::Vertex)?;
            resources.bind_attribute(gpu.vertex_array, buffer, shader, attribute)?;
            stream_buffers.push(buffer);
        }

        Ok((index_buffer, stream_buffers))
    }

    fn resources(&self) -> &'p P {
        self.gpu.resources
    }

    pub fn shader(&self) -> ShaderType {
        S::SHADER
    }

    /// Queues one submission. `indices` are local to `vertices`.
    ///
    /// Malformed submissions are rejected before any accumulated state
    /// changes, so one bad caller cannot corrupt the rest of the frame.
    pub fn queue_draw(&mut self, indices: &[u32], vertices: S::Submission<'_>) -> Result<()> {
        let shader = S::SHADER;
        let vertex_count = S::submission_vertex_count(&vertices).map_err(rejected)?;
        validate_local_indices(shader, indices, vertex_count).map_err(rejected)?;

        let base_vertex = self.streams.len();
        let total_vertices = (base_vertex + vertex_count) as u64;
        if total_vertices > u64::from(u32::MAX) {
            return Err(rejected(BatchError::VertexCountOverflow {
                shader,
                requested: total_vertices,
            }));
        }
        let total_indices = (self.indices.len() + indices.len()) as u64;
        if total_indices > u64::from(u32::MAX) {
            return Err(rejected(BatchError::IndexCountOverflow {
                shader,
                requested: total_indices,
            }));
        }

        let mut fingerprint = None;
        if let Some(dedupe) = &self.dedupe {
            let submitted = S::submission_bytes(&vertices);
            let hash = SubmissionDedupe::fingerprint(indices, &submitted);
            if dedupe.contains(hash, indices, &submitted, &self.indices, &self.streams) {
                log::trace!("{}: skipping repeated submission", shader);
                return Ok(());
            }
            fingerprint = Some(hash);
        }

        let first_index = self.indices.len();
        append_offset_indices(&mut self.indices, base_vertex as u32, indices);
        self.streams.append(vertices);
        self.submissions += 1;

        if let (Some(dedupe), Some(hash)) = (&mut self.dedupe, fingerprint) {
            dedupe.insert(
                hash,
                QueuedSubmission {
                    indices: first_index..self.indices.len(),
                    vertices: base_vertex..self.streams.len(),
                },
            );
        }

        Ok(())
    }

    pub fn queue_draw_data(&mut self, data: &DrawData<S>) -> Result<()> {
        self.queue_draw(&data.indices, data.vertices.as_submission())
    }

    /// Uploads everything queued this frame, issues a single indexed draw and
    /// resets the batcher. With nothing queued no draw is issued.
    ///
    /// The accumulated state is cleared even when the upload or draw fails.
    pub fn draw_everything(&mut self) -> Result<FlushStats> {
        let stats = FlushStats {
            submissions: self.submissions,
            vertices: self.streams.len(),
            indices: self.indices.len(),
            draw_calls: 0,
        };

        let result = if self.indices.is_empty() {
            log::trace!("{}: nothing to draw", S::SHADER);
            Ok(stats)
        } else {
            self.upload_and_draw().map(|()| FlushStats {
                draw_calls: 1,
                ..stats
            })
        };

        self.reset();

        match &result {
            Ok(stats) => log::trace!("{}: flushed {:?}", S::SHADER, stats),
            Err(err) => log::error!("{}: flush failed: {}", S::SHADER, err),
        }
        result
    }

    fn upload_and_draw(&self) -> Result<()> {
        let shader = S::SHADER;
        let index_count =
            u32::try_from(self.indices.len()).map_err(|_| BatchError::IndexCountOverflow {
                shader,
                requested: self.indices.len() as u64,
            })?;

        self.resources().activate(shader)?;
        let backend = self.resources().backend();
        backend.bind_vertex_array(Some(self.gpu.vertex_array));

        let result = self.upload_and_draw_bound(index_count);

        backend.bind_vertex_array(None);
        self.resources().deactivate();
        result
    }

    fn upload_and_draw_bound(&self, index_count: u32) -> Result<()> {
        let backend = self.resources().backend();
        backend.replace_buffer_data(self.index_buffer, bytemuck::cast_slice(&self.indices))?;
        for (&buffer, bytes) in self.stream_buffers.iter().zip(self.streams.stream_bytes()) {
            backend.replace_buffer_data(buffer, bytes)?;
        }
        backend.draw_indexed_triangles(index_count)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.indices.clear();
        self.streams.clear();
        self.submissions = 0;
        if let Some(dedupe) = &mut self.dedupe {
            dedupe.clear();
        }
    }

    /// Merged indices queued this frame.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Merged vertex streams queued this frame.
    pub fn streams(&self) -> &S {
        &self.streams
    }

    pub fn vertex_count(&self) -> usize {
        self.streams.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions
    }

    pub fn is_empty(&self) -> bool {
        self.submissions == 0
    }

    pub fn deduplicates(&self) -> bool {
        self.dedupe.is_some()
    }

    pub fn vertex_array(&self) -> VertexArrayHandle {
        self.gpu.vertex_array
    }

    pub fn index_buffer(&self) -> BufferHandle {
        self.index_buffer
    }

    /// One buffer per attribute, in the shader's attribute order.
    pub fn stream_buffers(&self) -> &[BufferHandle] {
        &self.stream_buffers
    }
}

fn rejected(err: BatchError) -> BatchError {
    log::warn!("Rejected submission: {}", err);
    err
}
