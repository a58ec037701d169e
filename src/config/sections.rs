//! Runtime configuration sections.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Weights of the five similarity sub-scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Trigger-phrase overlap.
    pub trigger: f64,
    /// Body keyword overlap.
    pub workflow: f64,
    /// Domain-object overlap.
    pub domain: f64,
    /// Tool overlap.
    pub tools: f64,
    /// Description keyword overlap.
    pub keyword: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            trigger: 2.0,
            workflow: 2.0,
            domain: 2.0,
            tools: 1.0,
            keyword: 1.0,
        }
    }
}

impl ScoringWeights {
    /// Sum of all weights.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.trigger + self.workflow + self.domain + self.tools + self.keyword
    }
}

/// Overlap analysis settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Composite score at or above which a pair joins a cluster.
    pub threshold: f64,
    /// Composite score at or above which a pair is listed in the report.
    pub report_floor: f64,
    /// Sub-score weights.
    pub weights: ScoringWeights,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            threshold: 0.4,
            report_floor: 0.15,
            weights: ScoringWeights::default(),
        }
    }
}

/// Evaluation scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Clusters whose pipelines may run at once.
    pub max_concurrent_clusters: usize,
    /// Timeout applied to every evaluator task.
    pub task_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_clusters: 4,
            task_timeout_ms: 120_000,
        }
    }
}

impl SchedulerConfig {
    /// Creates a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the concurrency limit (minimum 1).
    #[must_use]
    pub fn with_max_concurrent_clusters(mut self, max: usize) -> Self {
        self.max_concurrent_clusters = max.max(1);
        self
    }

    /// Sets the per-task timeout.
    #[must_use]
    pub const fn with_task_timeout_ms(mut self, ms: u64) -> Self {
        self.task_timeout_ms = ms;
        self
    }
}

/// Evaluator backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluatorBackend {
    /// Built-in score-driven evaluator.
    #[default]
    Heuristic,
    /// External process speaking JSON over stdin/stdout.
    Command,
}

impl EvaluatorBackend {
    /// Parses a backend name; unknown names fall back to heuristic.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "command" | "external" => Self::Command,
            _ => Self::Heuristic,
        }
    }
}

/// Evaluator backend settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Which backend to use.
    pub backend: EvaluatorBackend,
    /// Program for the command backend.
    pub command: Option<String>,
    /// Arguments for the command backend.
    pub args: Vec<String>,
}

/// Restructuring executor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestructureConfig {
    /// Archive namespace; defaults to `<inventory>/.archive`.
    pub archive_dir: Option<PathBuf>,
    /// Maximum body lines of a mutated unit.
    pub max_body_lines: usize,
}

impl Default for RestructureConfig {
    fn default() -> Self {
        Self {
            archive_dir: None,
            max_body_lines: 500,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Structured JSON lines.
    Json,
    /// Human-readable output.
    #[default]
    Pretty,
}

impl LogFormat {
    /// Parses a format name; unknown names fall back to pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Output format.
    pub format: LogFormat,
    /// Filter directive used when `CURATOR_LOG`/`RUST_LOG` are unset.
    pub level: Option<String>,
    /// Optional log file; stderr when absent.
    pub file: Option<PathBuf>,
}

/// Metrics settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Prometheus text snapshot written on exit.
    pub snapshot_path: Option<PathBuf>,
}
