//! Layered configuration loading.
//!
//! Priority, lowest to highest:
//! 1. built-in defaults
//! 2. `default.toml`
//! 3. `{environment}.toml`
//! 4. `local.toml` (not committed)
//! 5. `BATCHLINE_*` environment variables

pub mod error;
pub mod settings;

use std::path::Path;

pub use error::ConfigError;
pub use settings::EngineSettings;

/// Load settings from `config_dir` for the given environment name. Missing
/// files are fine; environment variables win.
pub fn load(config_dir: &Path, environment: &str) -> Result<EngineSettings, ConfigError> {
    let settings: EngineSettings = config::Config::builder()
        .add_source(config::File::from(config_dir.join("default.toml")).required(false))
        .add_source(
            config::File::from(config_dir.join(format!("{environment}.toml"))).required(false),
        )
        .add_source(config::File::from(config_dir.join("local.toml")).required(false))
        .add_source(config::Environment::with_prefix("BATCHLINE"))
        .build()?
        .try_deserialize()?;

    settings.validate()?;
    Ok(settings)
}
