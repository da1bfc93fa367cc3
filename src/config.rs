use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_PUSH_BATCH_SIZE: usize = 500;

/// Application configuration, layered from `config/{environment}.toml`
/// (optional) and `APP_*` environment variables.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Hard ceiling on device tokens per multicast push, imposed by the
    /// push gateway
    #[serde(default = "default_push_batch_size")]
    pub push_batch_size: usize,
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_push_batch_size() -> usize {
    DEFAULT_PUSH_BATCH_SIZE
}

impl AppConfig {
    /// Builds a configuration directly, bypassing file/env layering.
    /// Used by tests and embedding applications.
    pub fn new(database_url: String, environment: String) -> Self {
        Self {
            database_url,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            push_batch_size: default_push_batch_size(),
        }
    }

    /// Loads configuration from the config directory and environment.
    ///
    /// `APP_ENV` selects the file (`config/{env}.toml`); `APP_*` variables
    /// override individual keys.
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let settings = Config::builder()
            .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_mode)).required(false))
            .add_source(Environment::with_prefix("APP"))
            .build()?;

        let cfg: AppConfig = settings.try_deserialize()?;
        cfg.validate()
            .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

        info!(environment = %cfg.environment, "Configuration loaded");
        Ok(cfg)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_config_uses_defaults() {
        let cfg = AppConfig::new("sqlite::memory:".into(), "test".into());
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.push_batch_size, 500);
        assert!(!cfg.is_production());
        assert!(cfg.validate().is_ok());
    }
}
