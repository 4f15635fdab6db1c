//! Tuning knobs owned by the core: debounce, sweep cadence, pool sizing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Filesystem watch debounce and batching configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period before coalesced notifications are handed to the
    /// pipeline.
    pub debounce_window_ms: u64,
    /// Flush early once this many distinct paths are pending.
    pub max_batch_events: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: 250,
            max_batch_events: 1024,
        }
    }
}

/// Periodic consistency sweep cadence.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Minutes between sweeps. Zero is treated as one.
    pub interval_minutes: u64,
}

/// Longest accepted sweep cadence: one week.
pub const MAX_RECONCILE_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 10,
        }
    }
}

impl ReconcileConfig {
    /// Sweep period, clamped to `1..=MAX_RECONCILE_INTERVAL_MINUTES` minutes.
    pub fn interval(&self) -> Duration {
        let minutes = self
            .interval_minutes
            .clamp(1, MAX_RECONCILE_INTERVAL_MINUTES);
        Duration::from_secs(minutes.saturating_mul(60))
    }
}

/// Worker pool sizing for diff evaluations.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on concurrently running evaluations.
    pub max_concurrent_evaluations: usize,
    /// Capacity of the raw event channel shared by the watcher and the
    /// reconciler.
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_evaluations: 8,
            queue_capacity: 4096,
        }
    }
}
