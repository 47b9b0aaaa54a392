use crate::batcher::pipeline::{FlushStats, PipelineBatcher};
use crate::batcher::streams::{SolidColorStreams, TexturedStreams, VertexStreams};
use crate::errors::{BatchError, Result};
use crate::renderer::shader_cache::PipelineResourceProvider;
use crate::renderer::shaders::ShaderType;
use crate::settings::BatcherSettings;

/// One pipeline batcher per enabled shader, all sharing one resource provider.
///
/// The provider must be fully initialized (shaders compiled) before the
/// registry is built and must outlive it.
pub struct Batcher<'p, P: PipelineResourceProvider> {
    pub absolute_position_with_solid_color: Option<PipelineBatcher<'p, P, SolidColorStreams>>,
    pub transform_v_with_textures: Option<PipelineBatcher<'p, P, TexturedStreams>>,
}

/// Stream sets that have a slot in [`Batcher`].
pub trait RegisteredStreams: VertexStreams + Sized {
    fn slot<'b, 'p, P: PipelineResourceProvider>(
        batcher: &'b Batcher<'p, P>,
    ) -> &'b Option<PipelineBatcher<'p, P, Self>>;

    fn slot_mut<'b, 'p, P: PipelineResourceProvider>(
        batcher: &'b mut Batcher<'p, P>,
    ) -> &'b mut Option<PipelineBatcher<'p, P, Self>>;
}

impl RegisteredStreams for SolidColorStreams {
    fn slot<'b, 'p, P: PipelineResourceProvider>(
        batcher: &'b Batcher<'p, P>,
    ) -> &'b Option<PipelineBatcher<'p, P, Self>> {
        &batcher.absolute_position_with_solid_color
    }

    fn slot_mut<'b, 'p, P: PipelineResourceProvider>(
        batcher: &'b mut Batcher<'p, P>,
    ) -> &'b mut Option<PipelineBatcher<'p, P, Self>> {
        &mut batcher.absolute_position_with_solid_color
    }
}

impl RegisteredStreams for TexturedStreams {
    fn slot<'b, 'p, P: PipelineResourceProvider>(
        batcher: &'b Batcher<'p, P>,
    ) -> &'b Option<PipelineBatcher<'p, P, Self>> {
        &batcher.transform_v_with_textures
    }

    fn slot_mut<'b, 'p, P: PipelineResourceProvider>(
        batcher: &'b mut Batcher<'p, P>,
    ) -> &'b mut Option<PipelineBatcher<'p, P, Self>> {
        &mut batcher.transform_v_with_textures
    }
}

impl<'p, P: PipelineResourceProvider> Batcher<'p, P> {
    /// Builds a batcher for every shader in `settings.requested_shaders`.
    /// Fails if the provider cannot serve one of them.
    pub fn new(resources: &'p P, settings: &BatcherSettings) -> Result<Self> {
        let deduplicate = settings.deduplicate_submissions;
        let mut batcher = Self {
            absolute_position_with_solid_color: None,
            transform_v_with_textures: None,
        };

        for &shader in &settings.requested_shaders {
            match shader {
                ShaderType::AbsolutePositionWithSolidColor => {
                    if batcher.absolute_position_with_solid_color.is_none() {
                        batcher.absolute_position_with_solid_color =
                            Some(PipelineBatcher::with_deduplication(resources, deduplicate)?);
                    }
                }
                ShaderType::TransformVWithTextures => {
                    if batcher.transform_v_with_textures.is_none() {
                        batcher.transform_v_with_textures =
                            Some(PipelineBatcher::with_deduplication(resources, deduplicate)?);
                    }
                }
            }
        }

        log::info!("Batcher ready for {:?}", batcher.requested_shaders());
        Ok(batcher)
    }

    pub fn pipeline<S: RegisteredStreams>(&self) -> Result<&PipelineBatcher<'p, P, S>> {
        S::slot(self)
            .as_ref()
            .ok_or(BatchError::PipelineNotEnabled(S::SHADER))
    }

    pub fn pipeline_mut<S: RegisteredStreams>(&mut self) -> Result<&mut PipelineBatcher<'p, P, S>> {
        S::slot_mut(self)
            .as_mut()
            .ok_or(BatchError::PipelineNotEnabled(S::SHADER))
    }

    /// Queues a submission on the pipeline that carries `S`.
    pub fn queue_draw<S: RegisteredStreams>(
        &mut self,
        indices: &[u32],
        vertices: S::Submission<'_>,
    ) -> Result<()> {
        self.pipeline_mut::<S>()?.queue_draw(indices, vertices)
    }

    pub fn is_enabled(&self, shader: ShaderType) -> bool {
        match shader {
            ShaderType::AbsolutePositionWithSolidColor => {
                self.absolute_position_with_solid_color.is_some()
            }
            ShaderType::TransformVWithTextures => self.transform_v_with_textures.is_some(),
        }
    }

    /// Enabled pipelines in flush order.
    pub fn requested_shaders(&self) -> Vec<ShaderType> {
        ShaderType::ALL
            .into_iter()
            .filter(|&shader| self.is_enabled(shader))
            .collect()
    }

    /// Flushes every enabled pipeline in [`ShaderType::ALL`] order.
    ///
    /// A failing pipeline does not stop the others from flushing; the first
    /// error is returned once all of them have run.
    pub fn draw_all(&mut self) -> Result<FlushStats> {
        let results = [
            self.absolute_position_with_solid_color
                .as_mut()
                .map(PipelineBatcher::draw_everything),
            self.transform_v_with_textures
                .as_mut()
                .map(PipelineBatcher::draw_everything),
        ];

        let mut total = FlushStats::default();
        let mut first_error = None;
        for result in results.into_iter().flatten() {
            match result {
                Ok(stats) => total += stats,
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(total),
        }
    }
}
