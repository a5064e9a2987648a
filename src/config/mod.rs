//! Application configuration.
//!
//! Aggregates configuration from all components into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod sections;

pub use sections::{ApiConfig, ChannelConfig, SyncConfig};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "COMPLAINT_SYNC_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "COMPLAINT_SYNC";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "COMPLAINT_SYNC_LOG";
/// Environment variable selecting the log format (`text` or `json`).
pub const LOG_FORMAT_ENV_VAR: &str = "COMPLAINT_SYNC_LOG_FORMAT";

use serde::Deserialize;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// REST backend.
    pub api: ApiConfig,
    /// Push-event channel.
    pub channel: ChannelConfig,
    /// Reconciliation timing.
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix, `__` between
    ///    path segments (e.g. `COMPLAINT_SYNC__API__BASE_URL`)
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }

    /// Auth token shared by the REST client and the push channel.
    pub fn auth_token(&self) -> &str {
        self.api.auth_token.as_deref().unwrap_or_default()
    }
}
