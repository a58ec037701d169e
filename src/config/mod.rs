//! Configuration management.
//!
//! Configuration is layered: built-in defaults, then a TOML file, then
//! `CURATOR_*` environment variables, then CLI flags.
//!
//! ```toml
//! inventory = "~/.claude/skills"
//!
//! [analysis]
//! threshold = 0.4
//! report_floor = 0.15
//!
//! [analysis.weights]
//! trigger = 2.0
//! workflow = 2.0
//! domain = 2.0
//! tools = 1.0
//! keyword = 1.0
//!
//! [scheduler]
//! max_concurrent_clusters = 4
//! task_timeout_ms = 120000
//!
//! [evaluator]
//! backend = "command"
//! command = "my-agent"
//! args = ["--json"]
//!
//! [restructure]
//! max_body_lines = 500
//! ```

mod sections;

pub use sections::{
    AnalysisConfig, EvaluatorBackend, EvaluatorConfig, LogFormat, LoggingSettings,
    MetricsSettings, RestructureConfig, SchedulerConfig, ScoringWeights,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for curator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CuratorConfig {
    /// Default inventory directory, used when no path is given on the command line.
    pub inventory: Option<PathBuf>,
    /// Overlap analysis settings.
    pub analysis: AnalysisConfig,
    /// Evaluation scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Evaluator backend settings.
    pub evaluator: EvaluatorConfig,
    /// Restructuring executor settings.
    pub restructure: RestructureConfig,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Metrics settings.
    pub metrics: MetricsSettings,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Inventory directory.
    pub inventory: Option<String>,
    /// Analysis section.
    pub analysis: Option<ConfigFileAnalysis>,
    /// Scheduler section.
    pub scheduler: Option<ConfigFileScheduler>,
    /// Evaluator section.
    pub evaluator: Option<ConfigFileEvaluator>,
    /// Restructure section.
    pub restructure: Option<ConfigFileRestructure>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
    /// Metrics section.
    pub metrics: Option<ConfigFileMetrics>,
}

/// Analysis section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileAnalysis {
    /// Cluster threshold.
    pub threshold: Option<f64>,
    /// Minimum composite listed in the overlap report.
    pub report_floor: Option<f64>,
    /// Sub-score weights.
    pub weights: Option<ConfigFileWeights>,
}

/// Weights sub-section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileWeights {
    /// Trigger weight.
    pub trigger: Option<f64>,
    /// Workflow weight.
    pub workflow: Option<f64>,
    /// Domain weight.
    pub domain: Option<f64>,
    /// Tools weight.
    pub tools: Option<f64>,
    /// Keyword weight.
    pub keyword: Option<f64>,
}

/// Scheduler section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileScheduler {
    /// Clusters evaluated at once.
    pub max_concurrent_clusters: Option<usize>,
    /// Per-task timeout.
    pub task_timeout_ms: Option<u64>,
}

/// Evaluator section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileEvaluator {
    /// Backend name: "heuristic" or "command".
    pub backend: Option<String>,
    /// External command for the command backend.
    pub command: Option<String>,
    /// Arguments passed to the command.
    pub args: Option<Vec<String>>,
}

/// Restructure section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileRestructure {
    /// Archive namespace directory.
    pub archive_dir: Option<String>,
    /// Maximum body lines of a mutated unit.
    pub max_body_lines: Option<usize>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// "pretty" or "json".
    pub format: Option<String>,
    /// Filter directive, e.g. "info" or "curator=debug".
    pub level: Option<String>,
    /// Optional log file.
    pub file: Option<String>,
}

/// Metrics section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileMetrics {
    /// Where to write the Prometheus snapshot on exit.
    pub snapshot_path: Option<String>,
}

impl CuratorConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::operation("read_config_file", e))?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or a score setting is not a
    /// finite number.
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| crate::Error::operation("parse_config_file", e))?;
        Ok(Self::from_config_file(file)?.with_env_overrides())
    }

    /// Loads configuration from the default location.
    ///
    /// Checks `CURATOR_CONFIG_PATH`, then the platform config dir (`~/.config/curator/config.toml` on
    /// Linux) and falls back to defaults when no readable file is found.
    #[must_use]
    pub fn load_default() -> Self {
        if let Ok(path) = std::env::var("CURATOR_CONFIG_PATH") {
            let path = expand_home(&path);
            match Self::load_from_file(&path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                },
            }
        }

        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default().with_env_overrides();
        };

        let platform_config = base_dirs.config_dir().join("curator").join("config.toml");
        if platform_config.exists() {
            match Self::load_from_file(&platform_config) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %platform_config.display(), error = %e, "Ignoring unreadable config file");
                },
            }
        }

        Self::default().with_env_overrides()
    }

    /// Converts a `ConfigFile` to `CuratorConfig`.
    fn from_config_file(file: ConfigFile) -> crate::Result<Self> {
        let mut config = Self::default();

        if let Some(inventory) = file.inventory {
            config.inventory = Some(expand_home(&inventory));
        }
        if let Some(analysis) = file.analysis {
            if let Some(v) = analysis.threshold {
                config.analysis.threshold = unit_interval("analysis.threshold", v)?;
            }
            if let Some(v) = analysis.report_floor {
                config.analysis.report_floor = unit_interval("analysis.report_floor", v)?;
            }
            if let Some(weights) = analysis.weights {
                let w = &mut config.analysis.weights;
                w.trigger = weight("trigger", weights.trigger, w.trigger)?;
                w.workflow = weight("workflow", weights.workflow, w.workflow)?;
                w.domain = weight("domain", weights.domain, w.domain)?;
                w.tools = weight("tools", weights.tools, w.tools)?;
                w.keyword = weight("keyword", weights.keyword, w.keyword)?;
            }
        }
        if let Some(scheduler) = file.scheduler {
            if let Some(v) = scheduler.max_concurrent_clusters {
                config.scheduler.max_concurrent_clusters = v.max(1);
            }
            if let Some(v) = scheduler.task_timeout_ms {
                config.scheduler.task_timeout_ms = v;
            }
        }
        if let Some(evaluator) = file.evaluator {
            if let Some(backend) = evaluator.backend {
                config.evaluator.backend = EvaluatorBackend::parse(&backend);
            }
            config.evaluator.command = evaluator.command;
            config.evaluator.args = evaluator.args.unwrap_or_default();
        }
        if let Some(restructure) = file.restructure {
            config.restructure.archive_dir = restructure.archive_dir.map(|d| expand_home(&d));
            if let Some(v) = restructure.max_body_lines {
                config.restructure.max_body_lines = v;
            }
        }
        if let Some(logging) = file.logging {
            if let Some(format) = logging.format {
                config.logging.format = LogFormat::parse(&format);
            }
            config.logging.level = logging.level;
            config.logging.file = logging.file.map(|f| expand_home(&f));
        }
        if let Some(metrics) = file.metrics {
            config.metrics.snapshot_path = metrics.snapshot_path.map(|p| expand_home(&p));
        }

        Ok(config)
    }

    /// Applies environment variable overrides.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `CURATOR_INVENTORY` | Default inventory directory |
    /// | `CURATOR_THRESHOLD` | Cluster threshold |
    /// | `CURATOR_MAX_CONCURRENT_CLUSTERS` | Scheduler bulkhead size |
    /// | `CURATOR_TASK_TIMEOUT_MS` | Per-task timeout |
    /// | `CURATOR_MAX_BODY_LINES` | Size limit for mutated units |
    /// | `CURATOR_LOG_FORMAT` | `pretty` or `json` |
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("CURATOR_INVENTORY") {
            if !v.trim().is_empty() {
                self.inventory = Some(expand_home(&v));
            }
        }
        if let Ok(v) = std::env::var("CURATOR_THRESHOLD") {
            match v.parse::<f64>().map(|parsed| unit_interval("CURATOR_THRESHOLD", parsed)) {
                Ok(Ok(threshold)) => self.analysis.threshold = threshold,
                Ok(Err(e)) => tracing::warn!(error = %e, "Ignoring threshold override"),
                Err(_) => {},
            }
        }
        if let Ok(v) = std::env::var("CURATOR_MAX_CONCURRENT_CLUSTERS") {
            if let Ok(parsed) = v.parse::<usize>() {
                self.scheduler.max_concurrent_clusters = parsed.max(1);
            }
        }
        if let Ok(v) = std::env::var("CURATOR_TASK_TIMEOUT_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.scheduler.task_timeout_ms = parsed;
            }
        }
        if let Ok(v) = std::env::var("CURATOR_MAX_BODY_LINES") {
            if let Ok(parsed) = v.parse::<usize>() {
                self.restructure.max_body_lines = parsed;
            }
        }
        if let Ok(v) = std::env::var("CURATOR_LOG_FORMAT") {
            self.logging.format = LogFormat::parse(&v);
        }
        self
    }

    /// Sets the cluster threshold.
    #[must_use]
    ///
    /// Non-finite values are ignored.
    pub const fn with_threshold(mut self, threshold: f64) -> Self {
        if threshold.is_finite() {
            self.analysis.threshold = threshold.clamp(0.0, 1.0);
        }
        self
    }

    /// Resolves the archive namespace for an inventory.
    ///
    /// Defaults to `<inventory>/.archive`, which the scanner never reads.
    #[must_use]
    pub fn archive_dir_for(&self, inventory: &Path) -> PathBuf {
        self.restructure
            .archive_dir
            .clone()
            .unwrap_or_else(|| inventory.join(".archive"))
    }
}

/// Expands a leading `~/` using the user's home directory.
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = directories::BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

/// Checks that a score setting is finite and clamps it to `0.0..=1.0`.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidInput`] for NaN or infinite values.
pub fn unit_interval(key: &str, value: f64) -> crate::Result<f64> {
    if value.is_finite() {
        Ok(value.clamp(0.0, 1.0))
    } else {
        Err(crate::Error::InvalidInput(format!(
            "{key} must be a finite number, got {value}"
        )))
    }
}

fn weight(key: &str, value: Option<f64>, default: f64) -> crate::Result<f64> {
    match value {
        None => Ok(default),
        Some(v) if v.is_finite() => Ok(v.max(0.0)),
        Some(v) => Err(crate::Error::InvalidInput(format!(
            "analysis.weights.{key} must be a finite number, got {v}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CuratorConfig::default();
        assert!((config.analysis.threshold - 0.4).abs() < f64::EPSILON);
        assert_eq!(config.scheduler.max_concurrent_clusters, 4);
        assert_eq!(config.restructure.max_body_lines, 500);
        assert_eq!(config.evaluator.backend, EvaluatorBackend::Heuristic);
    }

    #[test]
    fn test_parse_toml_sections() {
        let config = CuratorConfig::from_config_file(
            toml::from_str(
                r#"
                inventory = "/srv/skills"

                [analysis]
                threshold = 0.55

                [analysis.weights]
                tools = 0.0

                [scheduler]
                max_concurrent_clusters = 0
                task_timeout_ms = 500

                [evaluator]
                backend = "command"
                command = "agent"
                args = ["--json"]

                [restructure]
                max_body_lines = 120
                "#,
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(config.inventory, Some(PathBuf::from("/srv/skills")));
        assert!((config.analysis.threshold - 0.55).abs() < f64::EPSILON);
        assert!(config.analysis.weights.tools.abs() < f64::EPSILON);
        assert!((config.analysis.weights.trigger - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.scheduler.max_concurrent_clusters, 1);
        assert_eq!(config.scheduler.task_timeout_ms, 500);
        assert_eq!(config.evaluator.backend, EvaluatorBackend::Command);
        assert_eq!(config.evaluator.command.as_deref(), Some("agent"));
        assert_eq!(config.restructure.max_body_lines, 120);
    }

    #[test]
    fn test_non_finite_scores_are_rejected() {
        let err = CuratorConfig::from_toml("[analysis]\nthreshold = nan\n").unwrap_err();
        assert!(matches!(err, crate::Error::InvalidInput(_)));
        assert!(CuratorConfig::from_toml("[analysis.weights]\ntools = inf\n").is_err());
        assert!(unit_interval("threshold", f64::NEG_INFINITY).is_err());
        assert!((unit_interval("threshold", 1.5).unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_with_threshold_ignores_nan() {
        let config = CuratorConfig::default().with_threshold(f64::NAN);
        assert!((config.analysis.threshold - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        assert!(CuratorConfig::from_toml("analysis = [").is_err());
    }

    #[test]
    fn test_archive_dir_defaults_inside_inventory() {
        let config = CuratorConfig::default();
        assert_eq!(
            config.archive_dir_for(Path::new("/inv")),
            PathBuf::from("/inv/.archive")
        );
    }
}
