use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use url::Url;
use vigil_core::config::{PipelineConfig, ReconcileConfig, WatchConfig};

pub const DEFAULT_ALERT_ENDPOINT: &str = "http://localhost:7000/api/alerts";
pub const DEFAULT_DATABASE_PATH: &str = "./vigil.db";
pub const DEFAULT_ALERT_TIMEOUT_SECS: u64 = 10;

/// Fully resolved agent configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub agent: AgentConfig,
    pub watch: WatchSettings,
    pub reconcile: ReconcileConfig,
    pub alerts: AlertsConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
    #[serde(skip)]
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentConfig {
    /// Pre-assigned identity; skips the stored identity and registration.
    pub agent_id: Option<String>,
    pub registration_url: Option<Url>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatchSettings {
    pub roots: Vec<PathBuf>,
    #[serde(flatten)]
    pub tuning: WatchConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertsConfig {
    pub endpoint: Url,
    pub timeout_secs: u64,
    /// Collector inventory API; reporting is off when unset.
    pub inventory_endpoint: Option<Url>,
}

impl AlertsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoggingConfig {
    /// Extra plain-text log sink next to stdout.
    pub file: Option<PathBuf>,
}

/// Where the values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

impl Config {
    /// Make every relative path absolute against `base`. Roots that exist are
    /// canonicalized so notification paths and stored keys agree.
    pub fn normalize_paths(&mut self, base: &Path) {
        for root in &mut self.watch.roots {
            let absolute = absolutize(base, root);
            *root = std::fs::canonicalize(&absolute).unwrap_or(absolute);
        }
        self.storage.database_path = absolutize(base, &self.storage.database_path);
        if let Some(file) = self.logging.file.as_mut() {
            *file = absolutize(base, file);
        }
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
