use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub agent: FileAgentConfig,
    #[serde(default)]
    pub watch: FileWatchConfig,
    #[serde(default)]
    pub reconcile: FileReconcileConfig,
    #[serde(default)]
    pub alerts: FileAlertsConfig,
    #[serde(default)]
    pub storage: FileStorageConfig,
    #[serde(default)]
    pub pipeline: FilePipelineConfig,
    #[serde(default)]
    pub logging: FileLoggingConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileAgentConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_url: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileWatchConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<Vec<PathBuf>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_window_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_batch_events: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileReconcileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileAlertsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventory_endpoint: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileStorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FilePipelineConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_evaluations: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileLoggingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub agent_id: Option<String>,
    pub registration_url: Option<String>,
    pub watch_paths: Option<Vec<String>>,
    pub debounce_ms: Option<u64>,
    pub scan_interval_minutes: Option<u64>,
    pub alert_url: Option<String>,
    pub inventory_url: Option<String>,
    pub database_path: Option<PathBuf>,
    pub max_concurrency: Option<usize>,
    pub log_file: Option<PathBuf>,
    /// Variables that were set but could not be parsed.
    pub invalid: Vec<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env_config = Self::default();
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        env_config.config_path = var("VIGIL_CONFIG").map(PathBuf::from);
        env_config.agent_id = var("VIGIL_AGENT_ID");
        env_config.registration_url = var("VIGIL_REGISTRATION_URL");
        env_config.watch_paths = var("VIGIL_WATCH_PATHS").map(|raw| parse_csv(&raw));
        env_config.debounce_ms = parse_number(&var, "VIGIL_DEBOUNCE_MS", &mut env_config.invalid);
        env_config.scan_interval_minutes = parse_number(
            &var,
            "VIGIL_SCAN_INTERVAL_MINUTES",
            &mut env_config.invalid,
        );
        env_config.alert_url = var("VIGIL_ALERT_URL");
        env_config.inventory_url = var("VIGIL_INVENTORY_URL");
        env_config.database_path = var("VIGIL_DATABASE_PATH").map(PathBuf::from);
        env_config.max_concurrency =
            parse_number(&var, "VIGIL_MAX_CONCURRENCY", &mut env_config.invalid);
        env_config.log_file = var("VIGIL_LOG_FILE").map(PathBuf::from);

        env_config
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|part| {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

fn parse_number<T, F>(var: &F, name: &str, invalid: &mut Vec<String>) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = var(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            invalid.push(name.to_string());
            None
        }
    }
}
