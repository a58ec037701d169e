//! Structured logging configuration.

use crate::config::{LogFormat, LoggingSettings};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Default filter directive.
const DEFAULT_DIRECTIVE: &str = "curator=info";
/// Filter directive used with `--verbose`.
const VERBOSE_DIRECTIVE: &str = "curator=debug";

/// Resolved logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Event filter.
    pub filter: EnvFilter,
    /// Append-mode log file; stderr when absent.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds logging configuration from settings.
    ///
    /// The filter comes from `CURATOR_LOG`, then `RUST_LOG`, then the
    /// configured level. `verbose` overrides all of them with debug output.
    #[must_use]
    pub fn from_settings(settings: &LoggingSettings, verbose: bool) -> Self {
        Self {
            format: settings.format,
            filter: build_filter(settings.level.as_deref(), verbose),
            file: settings.file.clone(),
        }
    }
}

fn build_filter(level: Option<&str>, verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new(VERBOSE_DIRECTIVE);
    }
    let directive = std::env::var("CURATOR_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| level.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string());
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}
