pub mod indices;
pub mod pipeline;
pub mod registry;
pub mod streams;

pub use indices::{append_offset_indices, merge_indices};
pub use pipeline::{FlushStats, PipelineBatcher};
pub use registry::{Batcher, RegisteredStreams};
pub use streams::{DrawData, SolidColorStreams, TexturedStreams, VertexStreams};
