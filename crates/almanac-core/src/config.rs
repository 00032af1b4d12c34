use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use config::{Config, ConfigBuilder, builder::DefaultState};
use serde::Deserialize;

use crate::constants::{CONFIG_FILE_STEM, ENV_PREFIX};
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub logging: LoggingConfig,
    pub engine: EngineConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Knobs for filter evaluation and recurrence expansion.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// IANA zone used for floating date-times and all-day dates.
    pub default_timezone: String,
    /// Upper bound on occurrences produced by a single expansion.
    pub max_instances: u32,
    /// Skip unparseable stored objects instead of failing the whole query.
    pub skip_corrupt_objects: bool,
    /// Number of URIs fetched per storage round-trip.
    pub batch_size: usize,
}

impl EngineConfig {
    /// ## Summary
    /// Resolves `default_timezone` to a `chrono_tz::Tz`.
    ///
    /// ## Errors
    /// Returns `CoreError::ConfigError` if the name is not a known IANA zone.
    pub fn default_tz(&self) -> CoreResult<chrono_tz::Tz> {
        chrono_tz::Tz::from_str(&self.default_timezone).map_err(|e| {
            CoreError::ConfigError(format!(
                "engine.default_timezone `{}`: {e}",
                self.default_timezone
            ))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one sub-directory per calendar.
    pub root: PathBuf,
}

impl Settings {
    fn with_defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder()
            .set_default("logging.level", "info")?
            .set_default("engine.default_timezone", "UTC")?
            .set_default("engine.max_instances", 10_000)?
            .set_default("engine.skip_corrupt_objects", true)?
            .set_default("engine.batch_size", 128)?
            .set_default("storage.root", "./calendars")?)
    }

    /// ## Summary
    /// Loads configuration from defaults, an optional `almanac.toml` and
    /// `ALMANAC_`-prefixed environment variables, in increasing precedence.
    ///
    /// ## Errors
    /// Returns an error if building the configuration or deserializing it fails.
    pub fn load() -> Result<Self> {
        Ok(Self::with_defaults()?
            // TOML file
            .add_source(config::File::with_name(CONFIG_FILE_STEM).required(false))
            // Env vars, e.g. ALMANAC_ENGINE__DEFAULT_TIMEZONE
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Settings>()?)
    }

    /// ## Summary
    /// Loads configuration from defaults overlaid with an inline TOML document.
    ///
    /// ## Errors
    /// Returns an error if the TOML is invalid or deserializing fails.
    pub fn from_toml(toml: &str) -> Result<Self> {
        Ok(Self::with_defaults()?
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize::<Settings>()?)
    }
}

/// ## Summary
/// Loads configuration from environment variables, `.env` and `almanac.toml`.
///
/// ## Errors
/// Returns an error if loading or deserializing the configuration fails.
pub fn load_config() -> Result<Settings> {
    dotenvy::dotenv().ok();

    Settings::load()
}
