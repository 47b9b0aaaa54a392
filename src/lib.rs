//! Per-pipeline draw batching.
//!
//! Callers queue many small, locally indexed submissions per frame; each
//! pipeline merges them into one vertex/index set and flushes it with a
//! single indexed draw.

pub mod app;
pub mod batcher;
pub mod errors;
pub mod renderer;
pub mod settings;

pub use batcher::{
    Batcher, DrawData, FlushStats, PipelineBatcher, SolidColorStreams, TexturedStreams,
    VertexStreams,
};
pub use errors::{BatchError, Result};
pub use renderer::shader_cache::{PipelineResourceProvider, ShaderCache};
pub use renderer::shaders::{ShaderType, VertexAttribute};
pub use settings::BatcherSettings;

use app::App;
use winit::event_loop::EventLoop;

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

pub fn run(settings: BatcherSettings) -> std::result::Result<(), winit::error::EventLoopError> {
    init_logging();

    log::info!("Starting shader batcher demo");

    let event_loop = EventLoop::new()?;
    let mut app = App::new(settings);

    let result = event_loop.run_app(&mut app);

    if let Err(ref err) = result {
        log::error!("Application error: {}", err);
    }

    log::info!("Application shutdown complete");

    result
}
