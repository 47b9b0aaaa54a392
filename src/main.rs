use shader_batcher::BatcherSettings;

/// Usage: `shader-batcher-demo [requested-shaders.txt]`
fn main() {
    shader_batcher::init_logging();

    let mut settings = BatcherSettings::load();
    if let Some(path) = std::env::args().nth(1) {
        match settings.load_requested_shaders(&path) {
            Ok(loaded) => settings = loaded,
            Err(err) => {
                log::error!("Failed to load requested shaders from {}: {}", path, err);
                std::process::exit(1);
            }
        }
    }

    if let Err(err) = shader_batcher::run(settings) {
        eprintln!("Application error: {err}");
    }
}
