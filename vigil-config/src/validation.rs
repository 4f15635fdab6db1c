use thiserror::Error;

use vigil_core::config::MAX_RECONCILE_INTERVAL_MINUTES;

use super::models::Config;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigGuardRailError {
    #[error("no watch roots configured; set watch.roots or VIGIL_WATCH_PATHS")]
    NoWatchRoots,
    #[error("reconcile.interval_minutes must be at least 1")]
    ZeroReconcileInterval,
    #[error("reconcile.interval_minutes must be at most {max} (one week)")]
    ReconcileIntervalTooLarge { max: u64 },
    #[error("pipeline.max_concurrent_evaluations must be at least 1")]
    ZeroConcurrency,
    #[error("pipeline.queue_capacity must be at least 1")]
    ZeroQueueCapacity,
    #[error("{field} must use http or https, got '{scheme}'")]
    UnsupportedScheme { field: &'static str, scheme: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(&mut self, message: S, hint: H) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn mentions(&self, needle: &str) -> bool {
        self.items.iter().any(|item| item.message.contains(needle))
    }
}

/// Fatal misconfigurations become errors; anything the agent can run with
/// becomes a warning.
pub fn apply_guard_rails(config: &Config) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    if config.watch.roots.is_empty() {
        return Err(ConfigGuardRailError::NoWatchRoots);
    }
    if config.reconcile.interval_minutes == 0 {
        return Err(ConfigGuardRailError::ZeroReconcileInterval);
    }
    if config.reconcile.interval_minutes > MAX_RECONCILE_INTERVAL_MINUTES {
        return Err(ConfigGuardRailError::ReconcileIntervalTooLarge {
            max: MAX_RECONCILE_INTERVAL_MINUTES,
        });
    }
    if config.pipeline.max_concurrent_evaluations == 0 {
        return Err(ConfigGuardRailError::ZeroConcurrency);
    }
    if config.pipeline.queue_capacity == 0 {
        return Err(ConfigGuardRailError::ZeroQueueCapacity);
    }

    require_http("alerts.endpoint", config.alerts.endpoint.scheme())?;
    if let Some(url) = &config.agent.registration_url {
        require_http("agent.registration_url", url.scheme())?;
    }
    if let Some(url) = &config.alerts.inventory_endpoint {
        require_http("alerts.inventory_endpoint", url.scheme())?;
    }

    for root in &config.watch.roots {
        if !root.exists() {
            warnings.push_with_hint(
                format!("watch root {} does not exist", root.display()),
                "It stays unsubscribed until restart; periodic sweeps pick up files once it appears",
            );
        } else if !root.is_dir() {
            warnings.push(format!("watch root {} is not a directory", root.display()));
        }
    }

    if config.agent.agent_id.is_none() && config.agent.registration_url.is_none() {
        warnings.push_with_hint(
            "No agent_id or registration_url configured; startup requires a stored identity",
            "Set VIGIL_AGENT_ID or agent.registration_url",
        );
    }

    if config.watch.tuning.debounce_window_ms > 10_000 {
        warnings.push(format!(
            "watch.debounce_window_ms is {}ms; changes will be reported late",
            config.watch.tuning.debounce_window_ms
        ));
    }

    Ok(warnings)
}

fn require_http(field: &'static str, scheme: &str) -> Result<(), ConfigGuardRailError> {
    match scheme {
        "http" | "https" => Ok(()),
        other => Err(ConfigGuardRailError::UnsupportedScheme {
            field,
            scheme: other.to_string(),
        }),
    }
}
