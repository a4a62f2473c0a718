//! Chat Realtime - Main Library
//!
//! Application layer around the `hublink` connection manager.
//!
//! ## Architecture
//!
//! - **config**: YAML application configuration with `.env` overrides
//! - **bin_common**: Common utilities for binary executables (CLI, logging, shutdown)
//! - **hublink**: Hub connection library (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,no_run
//! use chat_realtime::bin_common::{load_config_from_env, ConfigType};
//! use chat_realtime::config::AppConfig;
//!
//! let path = load_config_from_env(ConfigType::ChatClient);
//! let config = AppConfig::load(&path).unwrap();
//! ```

// Re-export workspace libraries for convenience
pub use hublink;

pub mod config;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod logging;
    pub mod shutdown;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use logging::init_tracing_with_level;
    pub use shutdown::ShutdownManager;
}
