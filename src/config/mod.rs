//! Application configuration.
//!
//! Collects the subscriber and messaging settings into a single Config
//! struct that can be loaded from YAML files or environment variables.

use serde::Deserialize;

use crate::bus::MessagingConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "pubsub.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "PUBSUB_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "PUBSUB";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "PUBSUB_LOG";

/// Default batch size for pulls.
pub const DEFAULT_MESSAGES_PER_PULL: usize = 10;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Subscriber configuration.
    pub subscriber: SubscriberConfig,
    /// Messaging configuration.
    pub messaging: MessagingConfig,
}

/// Subscriber configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
    /// Events requested from the bus per pull.
    pub messages_per_pull: usize,
    /// Channel to subscribe to, when the application binds from config.
    pub channel: Option<String>,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            messages_per_pull: DEFAULT_MESSAGES_PER_PULL,
            channel: None,
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `DEFAULT_CONFIG_FILE` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
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
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from an in-memory YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, File, FileFormat};

        let config: Config = ConfigLib::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.subscriber.messages_per_pull == 0 {
            return Err(ConfigError::Invalid(
                "subscriber.messages_per_pull must be greater than zero".to_string(),
            ));
        }
        if matches!(self.subscriber.channel.as_deref(), Some("")) {
            return Err(ConfigError::Invalid(
                "subscriber.channel must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
