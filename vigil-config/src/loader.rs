use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use url::Url;
use vigil_core::config::{PipelineConfig, ReconcileConfig, WatchConfig};

use super::models::{
    AgentConfig, AlertsConfig, Config, ConfigMetadata, DEFAULT_ALERT_ENDPOINT,
    DEFAULT_ALERT_TIMEOUT_SECS, DEFAULT_DATABASE_PATH, LoggingConfig, StorageConfig,
    WatchSettings,
};
use super::sources::{EnvConfig, FileConfig};
use super::validation::{self, ConfigGuardRailError, ConfigWarnings};

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] = ["vigil.toml", "config/vigil.toml"];

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Directory relative paths resolve against. Defaults to the working
    /// directory.
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn with_base_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.base_dir = Some(path.into());
        self
    }

    /// Load `.env`, read the process environment, then compose.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path)
                .map(|_| true)
                .map_err(|source| ConfigLoadError::EnvFile {
                    path: path.clone(),
                    source,
                })?,
            None => dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                source => Err(ConfigLoadError::EnvFile {
                    path: PathBuf::from(".env"),
                    source,
                }),
            })?,
        };

        self.load_from(EnvConfig::gather(), env_file_loaded)
    }

    /// Compose from an already gathered environment.
    pub fn load_from(
        &self,
        env_config: EnvConfig,
        env_file_loaded: bool,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let base_dir = self.base_dir()?;
        let (file_config, config_path) = self.load_file_config(&env_config, &base_dir)?;

        let (config, warnings) = self.compose_config(
            file_config,
            env_config,
            ConfigMetadata {
                config_path,
                env_file_loaded,
            },
            &base_dir,
        )?;

        Ok(ConfigLoad { config, warnings })
    }

    fn base_dir(&self) -> Result<PathBuf, ConfigLoadError> {
        match &self.options.base_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir()
                .map_err(|source| ConfigLoadError::WorkingDirectory { source }),
        }
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
        base_dir: &Path,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let requested = self
            .options
            .config_path
            .clone()
            .or_else(|| env_config.config_path.clone());

        let path = match requested {
            Some(path) => {
                let path = if path.is_absolute() {
                    path
                } else {
                    base_dir.join(path)
                };
                if !path.exists() {
                    return Err(ConfigLoadError::MissingConfig { path });
                }
                path
            }
            None => {
                let found = DEFAULT_CONFIG_LOCATIONS
                    .iter()
                    .map(|candidate| base_dir.join(candidate))
                    .find(|candidate| candidate.exists());
                match found {
                    Some(path) => path,
                    None => return Ok((None, None)),
                }
            }
        };

        debug!(path = %path.display(), "reading configuration file");
        let contents = fs::read_to_string(&path).map_err(|err| ConfigLoadError::Io {
            path: path.clone(),
            source: err,
        })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
                path: path.clone(),
                source: err,
            })?;

        Ok((Some(file_config), Some(path)))
    }

    /// Merge environment over file over defaults, normalize paths, and run
    /// the guard rails.
    pub fn compose_config(
        &self,
        file_config: Option<FileConfig>,
        env: EnvConfig,
        metadata: ConfigMetadata,
        base_dir: &Path,
    ) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        if metadata.config_path.is_none() {
            warnings.push_with_hint(
                "No vigil.toml detected; using environment variables and defaults",
                "Pass --config or set VIGIL_CONFIG to point at a configuration file",
            );
        }
        for name in &env.invalid {
            warnings.push(format!("ignoring {name}: not a valid number"));
        }

        let FileConfig {
            agent: file_agent,
            watch: file_watch,
            reconcile: file_reconcile,
            alerts: file_alerts,
            storage: file_storage,
            pipeline: file_pipeline,
            logging: file_logging,
        } = file_config.unwrap_or_default();

        let watch_defaults = WatchConfig::default();
        let pipeline_defaults = PipelineConfig::default();

        let agent = AgentConfig {
            agent_id: env
                .agent_id
                .clone()
                .or(file_agent.agent_id)
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
            registration_url: env
                .registration_url
                .clone()
                .or(file_agent.registration_url)
                .map(|raw| parse_url("agent.registration_url", &raw))
                .transpose()?,
        };

        let roots = match env.watch_paths.clone() {
            Some(paths) => paths.into_iter().map(PathBuf::from).collect(),
            None => file_watch.roots.unwrap_or_default(),
        };
        let watch = WatchSettings {
            roots,
            tuning: WatchConfig {
                debounce_window_ms: env
                    .debounce_ms
                    .or(file_watch.debounce_window_ms)
                    .unwrap_or(watch_defaults.debounce_window_ms),
                max_batch_events: file_watch
                    .max_batch_events
                    .unwrap_or(watch_defaults.max_batch_events),
            },
        };

        let reconcile = ReconcileConfig {
            interval_minutes: env
                .scan_interval_minutes
                .or(file_reconcile.interval_minutes)
                .unwrap_or_else(|| ReconcileConfig::default().interval_minutes),
        };

        let endpoint = env
            .alert_url
            .clone()
            .or(file_alerts.endpoint)
            .unwrap_or_else(|| DEFAULT_ALERT_ENDPOINT.to_string());
        let alerts = AlertsConfig {
            endpoint: parse_url("alerts.endpoint", &endpoint)?,
            timeout_secs: file_alerts
                .timeout_secs
                .unwrap_or(DEFAULT_ALERT_TIMEOUT_SECS),
            inventory_endpoint: env
                .inventory_url
                .clone()
                .or(file_alerts.inventory_endpoint)
                .map(|raw| parse_url("alerts.inventory_endpoint", &raw))
                .transpose()?,
        };

        let storage = StorageConfig {
            database_path: env
                .database_path
                .clone()
                .or(file_storage.database_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
        };

        let pipeline = PipelineConfig {
            max_concurrent_evaluations: env
                .max_concurrency
                .or(file_pipeline.max_concurrent_evaluations)
                .unwrap_or(pipeline_defaults.max_concurrent_evaluations),
            queue_capacity: file_pipeline
                .queue_capacity
                .unwrap_or(pipeline_defaults.queue_capacity),
        };

        let logging = LoggingConfig {
            file: env.log_file.clone().or(file_logging.file),
        };

        let mut config = Config {
            agent,
            watch,
            reconcile,
            alerts,
            storage,
            pipeline,
            logging,
            metadata,
        };
        config.normalize_paths(base_dir);

        let guard_warnings = validation::apply_guard_rails(&config)?;
        warnings.extend(guard_warnings);

        Ok((config, warnings))
    }
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigLoadError> {
    Url::parse(raw.trim()).map_err(|source| ConfigLoadError::InvalidUrl {
        field,
        value: raw.to_string(),
        source,
    })
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid URL for {field}: '{value}'")]
    InvalidUrl {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to load environment file {path}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
    #[error("cannot determine working directory")]
    WorkingDirectory {
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}
