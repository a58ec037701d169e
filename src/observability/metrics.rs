//! Prometheus metrics snapshot.
//!
//! Curator is a short-lived CLI, so instead of serving a scrape endpoint the
//! recorder's rendering is written to a file when the process exits.

use crate::config::MetricsSettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::{Path, PathBuf};

/// Metrics configuration.
#[derive(Debug, Clone, Default)]
pub struct MetricsConfig {
    /// Where to write the Prometheus text snapshot. Metrics are disabled when unset.
    pub snapshot_path: Option<PathBuf>,
}

impl MetricsConfig {
    /// Builds metrics configuration from settings.
    ///
    /// `CURATOR_METRICS_SNAPSHOT` overrides the configured path.
    #[must_use]
    pub fn from_settings(settings: &MetricsSettings) -> Self {
        let snapshot_path = std::env::var("CURATOR_METRICS_SNAPSHOT")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| settings.snapshot_path.clone());
        Self { snapshot_path }
    }
}

/// Installed recorder plus the snapshot target.
#[derive(Debug)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
    snapshot_path: PathBuf,
}

impl MetricsHandle {
    /// Renders the current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus.render()
    }

    /// Returns the snapshot path.
    #[must_use]
    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }
}

/// Installs the global Prometheus recorder when a snapshot path is configured.
///
/// # Errors
///
/// Returns an error if a recorder is already installed.
pub fn install_prometheus(config: &MetricsConfig) -> Result<Option<MetricsHandle>> {
    let Some(snapshot_path) = config.snapshot_path.clone() else {
        return Ok(None);
    };
    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::operation("metrics_recorder_install", e))?;
    Ok(Some(MetricsHandle {
        prometheus,
        snapshot_path,
    }))
}

/// Writes the current rendering to the snapshot path.
pub fn flush(handle: &MetricsHandle) {
    let mut payload = handle.render();
    if !payload.ends_with('\n') {
        payload.push('\n');
    }
    if let Some(parent) = handle.snapshot_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match std::fs::write(&handle.snapshot_path, payload) {
        Ok(()) => tracing::debug!(path = %handle.snapshot_path.display(), "Metrics snapshot written"),
        Err(e) => tracing::warn!(path = %handle.snapshot_path.display(), error = %e, "Metrics snapshot failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_path() {
        let config = MetricsConfig::default();
        assert!(install_prometheus(&config).unwrap().is_none());
    }
}
