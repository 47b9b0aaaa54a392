use glam::{Vec2, Vec3};
use shader_batcher::renderer::recording::{GpuCommand, RecordingBackend};
use shader_batcher::settings::parse_requested_shaders;
use shader_batcher::{
    BatchError, Batcher, BatcherSettings, ShaderCache, ShaderType, SolidColorStreams,
    TexturedStreams,
};

const TRIANGLE: [Vec3; 3] = [Vec3::ZERO, Vec3::X, Vec3::Y];

fn settings_for(shaders: &[ShaderType]) -> BatcherSettings {
    BatcherSettings {
        requested_shaders: shaders.to_vec(),
        ..BatcherSettings::default()
    }
}

#[test]
fn draw_all_flushes_each_pipeline_once_in_shader_order() {
    let backend = RecordingBackend::new();
    let cache = ShaderCache::with_all_shaders(&backend).unwrap();
    let mut batcher = Batcher::new(&cache, &BatcherSettings::default()).unwrap();
    let solid_program = cache
        .program(ShaderType::AbsolutePositionWithSolidColor)
        .unwrap();
    let textured_program = cache.program(ShaderType::TransformVWithTextures).unwrap();

    // Queue the textured pipeline first; flush order is still fixed.
    batcher
        .queue_draw::<TexturedStreams>(&[0, 1, 2], (&TRIANGLE[..], &[Vec2::ONE; 3][..]))
        .unwrap();
    batcher
        .queue_draw::<SolidColorStreams>(&[0, 1, 2], (&TRIANGLE[..], &[Vec3::X; 3][..]))
        .unwrap();
    batcher
        .queue_draw::<SolidColorStreams>(&[2, 1, 0], (&TRIANGLE[..], &[Vec3::Y; 3][..]))
        .unwrap();
    backend.take_commands();

    let stats = batcher.draw_all().unwrap();

    assert_eq!(stats.submissions, 3);
    assert_eq!(stats.vertices, 9);
    assert_eq!(stats.indices, 9);
    assert_eq!(stats.draw_calls, 2);

    let drawn: Vec<_> = backend
        .commands()
        .into_iter()
        .filter_map(|command| match command {
            GpuCommand::DrawIndexedTriangles {
                pipeline,
                index_count,
                ..
            } => Some((pipeline, index_count)),
            _ => None,
        })
        .collect();
    assert_eq!(drawn, vec![(solid_program, 6), (textured_program, 3)]);
}

#[test]
fn pipelines_keep_independent_accumulation_state() {
    let backend = RecordingBackend::new();
    let cache = ShaderCache::with_all_shaders(&backend).unwrap();
    let mut batcher = Batcher::new(&cache, &BatcherSettings::default()).unwrap();

    batcher
        .queue_draw::<SolidColorStreams>(&[0, 1, 2], (&TRIANGLE[..], &[Vec3::X; 3][..]))
        .unwrap();
    batcher
        .queue_draw::<TexturedStreams>(&[0, 1, 2], (&TRIANGLE[..], &[Vec2::ONE; 3][..]))
        .unwrap();

    // The second pipeline's indices start at zero, not after the first's vertices.
    assert_eq!(
        batcher.pipeline::<TexturedStreams>().unwrap().indices(),
        &[0, 1, 2]
    );
    assert_eq!(
        batcher.pipeline::<SolidColorStreams>().unwrap().vertex_count(),
        3
    );
}

#[test]
fn absent_pipelines_are_reported_and_skipped() {
    let backend = RecordingBackend::new();
    let cache = ShaderCache::with_all_shaders(&backend).unwrap();
    let mut batcher = Batcher::new(
        &cache,
        &settings_for(&[ShaderType::AbsolutePositionWithSolidColor]),
    )
    .unwrap();

    let result =
        batcher.queue_draw::<TexturedStreams>(&[0, 1, 2], (&TRIANGLE[..], &[Vec2::ONE; 3][..]));
    assert!(matches!(
        result,
        Err(BatchError::PipelineNotEnabled(ShaderType::TransformVWithTextures))
    ));
    assert!(!batcher.is_enabled(ShaderType::TransformVWithTextures));

    batcher
        .queue_draw::<SolidColorStreams>(&[0, 1, 2], (&TRIANGLE[..], &[Vec3::X; 3][..]))
        .unwrap();
    let stats = batcher.draw_all().unwrap();
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(backend.draw_calls(), vec![3]);
}

#[test]
fn empty_frame_draws_nothing() {
    let backend = RecordingBackend::new();
    let cache = ShaderCache::with_all_shaders(&backend).unwrap();
    let mut batcher = Batcher::new(&cache, &BatcherSettings::default()).unwrap();

    let stats = batcher.draw_all().unwrap();

    assert_eq!(stats.draw_calls, 0);
    assert!(backend.draw_calls().is_empty());
}

#[test]
fn dropping_the_registry_releases_every_pipeline() {
    let backend = RecordingBackend::new();
    let cache = ShaderCache::with_all_shaders(&backend).unwrap();
    {
        let _batcher = Batcher::new(&cache, &BatcherSettings::default()).unwrap();
        // Two pipelines, each with an index buffer and two attribute streams.
        assert_eq!(backend.live_vertex_arrays(), 2);
        assert_eq!(backend.live_buffers(), 6);
    }
    assert_eq!(backend.live_vertex_arrays(), 0);
    assert_eq!(backend.live_buffers(), 0);
}

#[test]
fn deduplication_drops_repeats_within_a_frame_only() {
    let backend = RecordingBackend::new();
    let cache = ShaderCache::with_all_shaders(&backend).unwrap();
    let settings = BatcherSettings {
        deduplicate_submissions: true,
        ..BatcherSettings::default()
    };
    let mut batcher = Batcher::new(&cache, &settings).unwrap();
    let colors = [Vec3::new(0.2, 0.4, 0.6); 3];

    for _ in 0..3 {
        batcher
            .queue_draw::<SolidColorStreams>(&[0, 1, 2], (&TRIANGLE[..], &colors[..]))
            .unwrap();
    }
    // Same positions, different color: not a repeat.
    batcher
        .queue_draw::<SolidColorStreams>(&[0, 1, 2], (&TRIANGLE[..], &[Vec3::ONE; 3][..]))
        .unwrap();

    let stats = batcher.draw_all().unwrap();
    assert_eq!(stats.submissions, 2);
    assert_eq!(stats.vertices, 6);

    batcher
        .queue_draw::<SolidColorStreams>(&[0, 1, 2], (&TRIANGLE[..], &colors[..]))
        .unwrap();
    assert_eq!(batcher.draw_all().unwrap().submissions, 1);
}

#[test]
fn requested_shader_list_selects_pipelines() {
    let backend = RecordingBackend::new();
    let requested = parse_requested_shaders("Transform_V_With_Textures\n").unwrap();
    let cache = ShaderCache::new(&backend, &requested).unwrap();

    let batcher = Batcher::new(&cache, &settings_for(&requested)).unwrap();

    assert_eq!(
        batcher.requested_shaders(),
        vec![ShaderType::TransformVWithTextures]
    );
    assert!(batcher.absolute_position_with_solid_color.is_none());
}

#[test]
fn requesting_a_shader_the_cache_lacks_fails() {
    let backend = RecordingBackend::new();
    let cache = ShaderCache::new(&backend, &[ShaderType::TransformVWithTextures]).unwrap();

    let result = Batcher::new(&cache, &BatcherSettings::default());

    assert!(matches!(
        result,
        Err(BatchError::ShaderNotCompiled(
            ShaderType::AbsolutePositionWithSolidColor
        ))
    ));
    assert_eq!(backend.live_buffers(), 0);
    assert_eq!(backend.live_vertex_arrays(), 0);
}
