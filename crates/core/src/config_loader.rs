use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/whale-watch.toml";

/// Environment variable prefix; nested keys use `__` (`WHALE_WATCH_SCAN__CONCURRENCY=4`).
pub const ENV_PREFIX: &str = "WHALE_WATCH_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration from the default file (if present) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed or fails validation.
    pub fn load() -> Result<AppConfig> {
        Self::load_from(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Loads configuration layering built-in defaults, `path` and the environment.
    ///
    /// A missing file is not an error; every field has a default. Defaults are
    /// merged per field, so a partial `[options]` table keeps the option defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed or fails validation.
    pub fn load_from(path: &Path) -> Result<AppConfig> {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }
}
