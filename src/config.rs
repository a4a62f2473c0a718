//! Application configuration
//!
//! Loaded from YAML, then overridden by environment variables (a `.env`
//! file is honoured when present).

use hublink::ManagerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

pub const ENV_NEGOTIATE_URL: &str = "HUB_NEGOTIATE_URL";
pub const ENV_IDENTITY: &str = "HUB_IDENTITY";
pub const ENV_ACCESS_KEY: &str = "HUB_ACCESS_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Chat client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    pub hub: HubEndpoint,

    /// Connection manager tuning
    #[serde(default)]
    pub manager: ManagerConfig,
}

/// Where and as whom to connect
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubEndpoint {
    /// Negotiate endpoint returning `{url, accessToken}`
    #[serde(default)]
    pub negotiate_url: String,

    /// Signed-in user (email or id)
    #[serde(default)]
    pub identity: Option<String>,

    /// Bearer key for the negotiate call. Prefer `HUB_ACCESS_KEY` over the file.
    #[serde(default)]
    pub access_key: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load from `config_path`, apply environment overrides and validate
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config = Self::from_yaml(&yaml_content)?;

        // Don't fail if .env doesn't exist
        dotenv::dotenv().ok();
        config.apply_overrides(|key| std::env::var(key).ok());

        config.validate()?;
        Ok(config)
    }

    /// Parse without touching the environment or validating
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Override hub settings from `lookup` (normally the process environment)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_NEGOTIATE_URL) {
            info!("Overriding negotiate URL from environment variable");
            self.hub.negotiate_url = url;
        }
        if let Some(identity) = lookup(ENV_IDENTITY) {
            self.hub.identity = Some(identity).filter(|value| !value.is_empty());
        }
        if let Some(key) = lookup(ENV_ACCESS_KEY) {
            self.hub.access_key = Some(key).filter(|value| !value.is_empty());
        }
    }

    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        let url = self.hub.negotiate_url.trim();
        if url.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "hub.negotiate_url cannot be empty (set it in the file or via {})",
                ENV_NEGOTIATE_URL
            )));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "hub.negotiate_url must be an http(s) URL, got {}",
                url
            )));
        }

        self.manager
            .transport
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(())
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Chat Client Configuration:");
        info!("  Log level: {}", self.log_level);
        info!("  Negotiate URL: {}", self.hub.negotiate_url);
        info!(
            "  Identity: {}",
            self.hub.identity.as_deref().unwrap_or("<none>")
        );
        info!(
            "  Access key: {}",
            if self.hub.access_key.is_some() { "set" } else { "not set" }
        );
        info!("  Retry policy: {:?}", self.manager.retry);
        info!(
            "  Keep-alive: {}ms, server timeout: {}ms",
            self.manager.transport.keep_alive_interval_ms, self.manager.transport.server_timeout_ms
        );
    }
}
