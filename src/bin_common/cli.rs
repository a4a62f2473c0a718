//! Command line helpers shared by the binaries
//!
//! Resolves configuration paths from the environment.

use std::path::PathBuf;

/// Which configuration file a binary reads
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// Chat client configuration (config/chat_client.yaml)
    ChatClient,
    /// Custom path
    Custom(String),
}

impl ConfigType {
    /// Path used when the environment does not name one
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::ChatClient => "config/chat_client.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Environment variable that overrides the default path
    pub fn env_var_name(&self) -> &str {
        "CONFIG_PATH"
    }
}

/// Resolve the configuration path
///
/// A custom path always wins over the environment.
///
/// # Examples
/// ```
/// use chat_realtime::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Custom("hub.yaml".into()));
/// assert_eq!(path.to_str(), Some("hub.yaml"));
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    if let ConfigType::Custom(path) = config_type {
        return path.into();
    }

    std::env::var(config_type.env_var_name())
        .unwrap_or_else(|_| config_type.default_path().to_string())
        .into()
}

/// Positional arguments after the program name
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}
