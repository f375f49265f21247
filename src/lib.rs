pub mod asset;
pub mod renderer;
pub mod settings;

pub use renderer::{Material, Renderer, RendererStats};
pub use settings::RendererSettings;

/// Installs `env_logger` with an `Info` default. `RUST_LOG` overrides it;
/// calling this more than once is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
