use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::Instant;

use glam::{Vec2, Vec3};
use thiserror::Error;
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::ActiveEventLoop,
    keyboard::{Key, NamedKey},
    window::{Window, WindowId},
};

use crate::batcher::{Batcher, DrawData, FlushStats, SolidColorStreams, TexturedStreams};
use crate::errors::BatchError;
use crate::renderer::context::{ContextError, RenderContext};
use crate::renderer::shader_cache::{PipelineResourceProvider, ShaderCache};
use crate::renderer::wgpu_backend::WgpuBackend;
use crate::settings::BatcherSettings;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.05,
    g: 0.07,
    b: 0.10,
    a: 1.0,
};

const ORBITING_TRIANGLES: usize = 6;

#[derive(Error, Debug)]
enum StartupError {
    #[error("Failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Batch(#[from] BatchError),
}

type DemoShaders = ShaderCache<WgpuBackend>;

struct DemoState {
    window: Arc<Window>,
    context: RenderContext,
    shaders: &'static DemoShaders,
    batcher: Batcher<'static, DemoShaders>,
    checker_quad: DrawData<TexturedStreams>,
    started: Instant,
}

impl DemoState {
    fn new(event_loop: &ActiveEventLoop, settings: &BatcherSettings) -> Result<Self, StartupError> {
        let window = Arc::new(
            event_loop.create_window(Window::default_attributes().with_title("shader batcher"))?,
        );
        let (context, device, queue) =
            pollster::block_on(RenderContext::new(window.clone(), settings))?;

        let backend = WgpuBackend::new(device, queue, context.format(), 1);
        // Batchers borrow the cache for as long as the window lives, which is
        // the rest of the process.
        let shaders: &'static DemoShaders =
            Box::leak(Box::new(ShaderCache::new(backend, &settings.requested_shaders)?));
        let batcher = Batcher::new(shaders, settings)?;

        Ok(Self {
            window,
            context,
            shaders,
            batcher,
            checker_quad: checker_quad(),
            started: Instant::now(),
        })
    }

    fn queue_scene(&mut self) {
        let t = self.started.elapsed().as_secs_f32();

        if let Ok(solid) = self.batcher.pipeline_mut::<SolidColorStreams>() {
            for i in 0..ORBITING_TRIANGLES {
                let (positions, colors) = orbiting_triangle(i, t);
                if let Err(err) = solid.queue_draw(&[0, 1, 2], (&positions[..], &colors[..])) {
                    log::warn!("Dropped triangle {}: {}", i, err);
                }
            }
        }

        if let Ok(textured) = self.batcher.pipeline_mut::<TexturedStreams>() {
            if let Err(err) = textured.queue_draw_data(&self.checker_quad) {
                log::warn!("Dropped checker quad: {}", err);
            }
        }
    }

    fn render(&mut self) {
        self.queue_scene();
        let stats = self.batcher.draw_all().unwrap_or_else(|err| {
            log::error!("Batch flush failed: {}", err);
            FlushStats::default()
        });
        log::trace!("Frame flushed {:?}", stats);

        let backend = self.shaders.backend();
        let frame = match self.context.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.context.reconfigure(backend.device());
                backend.finish_frame();
                return;
            }
            Err(err) => {
                log::warn!("Skipping frame: {}", err);
                backend.finish_frame();
                return;
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = backend
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Encoder"),
            });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("BatchPass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            backend.encode(&mut rpass);
        }

        backend.queue().submit(Some(encoder.finish()));
        frame.present();
        backend.finish_frame();
    }
}

fn orbiting_triangle(i: usize, t: f32) -> ([Vec3; 3], [Vec3; 3]) {
    let phase = i as f32 / ORBITING_TRIANGLES as f32;
    let angle = t * 0.5 + phase * TAU;
    let center = Vec2::from_angle(angle) * 0.6;
    let corner = |offset: f32| {
        let p = center + Vec2::from_angle(angle * 2.0 + offset * TAU / 3.0) * 0.15;
        p.extend(0.0)
    };

    let color = Vec3::new(
        0.5 + 0.5 * (phase * TAU).cos(),
        0.5 + 0.5 * (phase * TAU + TAU / 3.0).cos(),
        0.5 + 0.5 * (phase * TAU + 2.0 * TAU / 3.0).cos(),
    );

    ([corner(0.0), corner(1.0), corner(2.0)], [color; 3])
}

fn checker_quad() -> DrawData<TexturedStreams> {
    DrawData::new(
        vec![0, 1, 2, 2, 3, 0],
        TexturedStreams {
            positions: vec![
                Vec3::new(-0.3, -0.3, 0.0),
                Vec3::new(0.3, -0.3, 0.0),
                Vec3::new(0.3, 0.3, 0.0),
                Vec3::new(-0.3, 0.3, 0.0),
            ],
            texture_coordinates: vec![
                Vec2::new(0.0, 1.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(0.0, 0.0),
            ],
        },
    )
}

pub struct App {
    settings: BatcherSettings,
    state: Option<DemoState>,
}

impl App {
    pub fn new(settings: BatcherSettings) -> Self {
        Self {
            settings,
            state: None,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match DemoState::new(event_loop, &self.settings) {
            Ok(state) => {
                state.window.request_redraw();
                self.state = Some(state);
            }
            Err(err) => {
                log::error!("Failed to start: {}", err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        if id != state.window.id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                state.context.resize(state.shaders.backend().device(), size);
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = state.window.inner_size();
                state.context.resize(state.shaders.backend().device(), size);
            }
            WindowEvent::RedrawRequested => {
                state.render();
                state.window.request_redraw();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                event_loop.exit();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_geometry_is_well_formed() {
        let quad = checker_quad();
        assert_eq!(quad.vertex_count(), 4);
        assert!(quad.indices.iter().all(|&i| (i as usize) < quad.vertex_count()));

        let (positions, _) = orbiting_triangle(2, 1.5);
        assert!(positions.iter().all(|p| p.x.abs() <= 1.0 && p.y.abs() <= 1.0));
    }
}
