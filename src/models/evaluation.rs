//! Evaluation task types exchanged with the evaluator backend.

use super::{ClusterId, UnitId, UnitKind, Verdict};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One of the three fixed evaluator roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluatorRole {
    /// Argues for merging.
    Consolidator,
    /// Argues for keeping units separate.
    Preservationist,
    /// Weighs both arguments and emits verdicts.
    Synthesizer,
}

impl EvaluatorRole {
    /// Returns the role as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Consolidator => "consolidator",
            Self::Preservationist => "preservationist",
            Self::Synthesizer => "synthesizer",
        }
    }
}

impl fmt::Display for EvaluatorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Condensed view of a unit handed to the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitExcerpt {
    /// Unit identifier.
    pub id: UnitId,
    /// Description text.
    pub description: String,
    /// Trigger phrases.
    pub triggers: Vec<String>,
    /// Declared tools.
    pub tools: Vec<String>,
    /// Body length in lines.
    pub body_lines: usize,
    /// Declared kind.
    pub kind: UnitKind,
}

impl From<&super::Unit> for UnitExcerpt {
    fn from(unit: &super::Unit) -> Self {
        Self {
            id: unit.id.clone(),
            description: unit.description.clone(),
            triggers: unit.triggers.clone(),
            tools: unit.tools.clone(),
            body_lines: unit.body_lines,
            kind: unit.kind,
        }
    }
}

/// Pairwise similarity handed to the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    /// The pair, ascending.
    pub pair: (UnitId, UnitId),
    /// Composite score.
    pub score: f64,
    /// Domain-object overlap.
    pub domain: f64,
}

/// The two predecessor outputs handed to the synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorOutputs {
    /// Consolidator output.
    pub consolidator: EvaluationOutput,
    /// Preservationist output.
    pub preservationist: EvaluationOutput,
}

/// Structured request sent to the evaluator backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// Role being evaluated.
    pub role: EvaluatorRole,
    /// Cluster under evaluation.
    pub cluster_id: ClusterId,
    /// Member identifiers.
    pub unit_ids: Vec<UnitId>,
    /// Member excerpts, in member order.
    pub unit_excerpts: Vec<UnitExcerpt>,
    /// Internal edges of the cluster.
    pub pair_scores: Vec<PairScore>,
    /// Predecessor outputs, present for the synthesizer only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_outputs: Option<Box<PriorOutputs>>,
    /// The role brief.
    pub instructions: String,
}

/// Structured response returned by the evaluator backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutput {
    /// Role that produced the output.
    pub role: EvaluatorRole,
    /// Score on the 0-10 scale (merge case for the consolidator, keep case
    /// for the preservationist). Larger values are clamped to 10.
    #[serde(default, deserialize_with = "clamped_score")]
    pub merge_score: Option<u8>,
    /// Short summary of the argument.
    #[serde(default)]
    pub summary: String,
    /// Per-pair verdicts; only the synthesizer is expected to fill these.
    #[serde(default)]
    pub pair_verdicts: Vec<Verdict>,
}

impl EvaluationOutput {
    /// Creates an output with no verdicts.
    #[must_use]
    pub fn new(role: EvaluatorRole, score: Option<u8>, summary: impl Into<String>) -> Self {
        Self {
            role,
            merge_score: score.map(|s| s.min(MAX_SCORE)),
            summary: summary.into(),
            pair_verdicts: Vec::new(),
        }
    }
}

const MAX_SCORE: u8 = 10;

fn clamped_score<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let score = Option::<u64>::deserialize(deserializer)?;
    Ok(score.map(|s| u8::try_from(s.min(u64::from(MAX_SCORE))).unwrap_or(MAX_SCORE)))
}

/// Lifecycle state of one evaluation task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    /// Not started.
    Pending,
    /// In flight.
    Running,
    /// Finished with an output.
    Completed {
        /// The task output.
        output: EvaluationOutput,
    },
    /// Finished with an error.
    Failed {
        /// Human-readable cause.
        cause: String,
    },
    /// Exceeded the per-task timeout.
    TimedOut,
    /// Never run because a predecessor did not complete.
    Skipped,
    /// Aborted by the user.
    Cancelled,
}

impl TaskState {
    /// Returns the state label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::TimedOut => "timed_out",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns the output if the task completed.
    #[must_use]
    pub const fn output(&self) -> Option<&EvaluationOutput> {
        match self {
            Self::Completed { output } => Some(output),
            _ => None,
        }
    }

    /// Returns true for terminal states.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

/// Record of one task run within a cluster pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Role of the task.
    pub role: EvaluatorRole,
    /// Final state.
    pub state: TaskState,
    /// Wall-clock duration in milliseconds (0 when never started).
    pub elapsed_ms: u64,
}

impl TaskRecord {
    /// Creates a pending record.
    #[must_use]
    pub const fn pending(role: EvaluatorRole) -> Self {
        Self {
            role,
            state: TaskState::Pending,
            elapsed_ms: 0,
        }
    }
}

/// Why a cluster produced no synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconclusiveReason {
    /// Consolidator or preservationist failed or timed out.
    PredecessorFailed,
    /// The synthesizer failed or timed out.
    SynthesisFailed,
    /// The run was aborted.
    Cancelled,
    /// The pipeline itself crashed.
    PipelinePanicked,
}

impl InconclusiveReason {
    /// Returns the reason as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PredecessorFailed => "predecessor_failed",
            Self::SynthesisFailed => "synthesis_failed",
            Self::Cancelled => "cancelled",
            Self::PipelinePanicked => "pipeline_panicked",
        }
    }
}

/// Final outcome of a cluster pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClusterOutcome {
    /// The synthesizer completed.
    Concluded {
        /// Synthesizer output.
        synthesis: EvaluationOutput,
    },
    /// No synthesis; partial task records are kept for diagnostics.
    Inconclusive {
        /// Why.
        reason: InconclusiveReason,
    },
}

/// Evaluation result for one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterEvaluation {
    /// Cluster identifier.
    pub cluster_id: ClusterId,
    /// Task records in role order: consolidator, preservationist, synthesizer.
    pub tasks: Vec<TaskRecord>,
    /// Outcome.
    pub outcome: ClusterOutcome,
}

impl ClusterEvaluation {
    /// Returns the record for a role.
    #[must_use]
    pub fn task(&self, role: EvaluatorRole) -> Option<&TaskRecord> {
        self.tasks.iter().find(|task| task.role == role)
    }

    /// Returns the synthesis if the cluster concluded.
    #[must_use]
    pub const fn synthesis(&self) -> Option<&EvaluationOutput> {
        match &self.outcome {
            ClusterOutcome::Concluded { synthesis } => Some(synthesis),
            ClusterOutcome::Inconclusive { .. } => None,
        }
    }

    /// Returns true if the cluster ended inconclusive.
    #[must_use]
    pub const fn is_inconclusive(&self) -> bool {
        matches!(self.outcome, ClusterOutcome::Inconclusive { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_score_is_clamped() {
        let output = EvaluationOutput::new(EvaluatorRole::Consolidator, Some(42), "x");
        assert_eq!(output.merge_score, Some(10));
    }

    #[test]
    fn test_deserialized_score_is_clamped() {
        let output: EvaluationOutput =
            serde_json::from_str(r#"{"role":"consolidator","merge_score":42}"#).unwrap();
        assert_eq!(output.merge_score, Some(10));

        let output: EvaluationOutput =
            serde_json::from_str(r#"{"role":"consolidator","merge_score":300}"#).unwrap();
        assert_eq!(output.merge_score, Some(10));

        let output: EvaluationOutput =
            serde_json::from_str(r#"{"role":"consolidator","merge_score":null}"#).unwrap();
        assert!(output.merge_score.is_none());
    }

    #[test]
    fn test_task_state_serialization() {
        let state = TaskState::Failed {
            cause: "boom".to_string(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["cause"], "boom");
        assert!(state.is_terminal());
        assert!(!TaskState::Running.is_terminal());
    }

    #[test]
    fn test_output_parses_with_defaults() {
        let output: EvaluationOutput =
            serde_json::from_str(r#"{"role":"preservationist"}"#).unwrap();
        assert_eq!(output.role, EvaluatorRole::Preservationist);
        assert!(output.merge_score.is_none());
        assert!(output.pair_verdicts.is_empty());
    }
}
