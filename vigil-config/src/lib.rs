//! Configuration for the Vigil agent.
//!
//! A [`Config`] is assembled once at startup from, in order of precedence,
//! environment variables (after an optional `.env` file), a TOML file, and
//! built-in defaults. Guard rails run on the composed value and either fail
//! the load or attach [`ConfigWarnings`].

pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{
    AgentConfig, AlertsConfig, Config, ConfigMetadata, LoggingConfig, StorageConfig,
    WatchSettings,
};
pub use sources::{EnvConfig, FileConfig};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
