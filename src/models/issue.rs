//! Per-run issue reporting.
//!
//! Every per-unit, per-cluster and per-op failure is isolated and collected
//! here so that it can be reported in aggregate once the run finishes.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a run issue, mirroring the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A unit descriptor could not be parsed.
    Parse,
    /// An evaluator task failed or timed out.
    TaskFailure,
    /// A verdict referenced a vanished unit.
    StaleReference,
    /// A mutated unit failed validation.
    ValidationFailure,
    /// Two ops overlapped on unit identity.
    ConcurrencyConflict,
    /// An op was rolled back.
    RolledBack,
    /// Anything else.
    Other,
}

impl IssueKind {
    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::TaskFailure => "task_failure",
            Self::StaleReference => "stale_reference",
            Self::ValidationFailure => "validation_failure",
            Self::ConcurrencyConflict => "concurrency_conflict",
            Self::RolledBack => "rolled_back",
            Self::Other => "other",
        }
    }
}

/// One isolated failure, identified by the unit, cluster, row or op it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIssue {
    /// Category.
    pub kind: IssueKind,
    /// Identifier of the affected unit, cluster, row or op.
    pub subject: String,
    /// Human-readable cause.
    pub cause: String,
}

impl RunIssue {
    /// Creates an issue.
    #[must_use]
    pub fn new(kind: IssueKind, subject: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            cause: cause.into(),
        }
    }

    /// Classifies an error raised while handling `subject`.
    #[must_use]
    pub fn from_error(subject: impl Into<String>, error: &Error) -> Self {
        let kind = match error {
            Error::Parse { .. } => IssueKind::Parse,
            Error::TaskFailure { .. } => IssueKind::TaskFailure,
            Error::StaleReference { .. } => IssueKind::StaleReference,
            Error::ValidationFailure { .. } => IssueKind::ValidationFailure,
            Error::ConcurrencyConflict { .. } => IssueKind::ConcurrencyConflict,
            _ => IssueKind::Other,
        };
        Self::new(kind, subject, error.to_string())
    }
}

impl fmt::Display for RunIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind.as_str(), self.subject, self.cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_error_classifies() {
        let err = Error::Parse {
            unit: "broken".to_string(),
            cause: "not utf-8".to_string(),
        };
        let issue = RunIssue::from_error("broken", &err);
        assert_eq!(issue.kind, IssueKind::Parse);
        assert!(issue.to_string().starts_with("[parse] broken:"));
    }

    #[test]
    fn test_other_errors_fall_back() {
        let err = Error::InvalidInput("x".to_string());
        assert_eq!(RunIssue::from_error("s", &err).kind, IssueKind::Other);
    }
}
