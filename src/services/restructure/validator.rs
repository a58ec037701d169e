//! Post-mutation validation of candidate units.

use crate::models::{AudienceMode, Unit};
use serde::Serialize;

/// Default body size limit, in lines.
pub const DEFAULT_MAX_BODY_LINES: usize = 500;

/// A unit written by an op, as re-read from disk.
#[derive(Debug, Clone)]
pub struct UnitCandidate {
    /// Name of the directory the unit was written to.
    pub dir_name: String,
    /// Parsed unit.
    pub unit: Unit,
}

/// Outcome of validating one candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// True when no constraint was violated.
    pub passed: bool,
    /// Violated constraints.
    pub violations: Vec<String>,
}

impl ValidationReport {
    /// Builds a report from a list of violations.
    #[must_use]
    pub fn from_violations(violations: Vec<String>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }
}

/// Checks a candidate unit against inventory constraints.
pub trait Validator: Send + Sync {
    /// Validates a candidate.
    fn validate(&self, candidate: &UnitCandidate) -> ValidationReport;
}

/// Built-in structural checks.
#[derive(Debug, Clone, Copy)]
pub struct DefaultValidator {
    max_body_lines: usize,
}

impl DefaultValidator {
    /// Creates a validator with the given body size limit.
    #[must_use]
    pub const fn new(max_body_lines: usize) -> Self {
        Self { max_body_lines }
    }
}

impl Default for DefaultValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BODY_LINES)
    }
}

impl Validator for DefaultValidator {
    fn validate(&self, candidate: &UnitCandidate) -> ValidationReport {
        let unit = &candidate.unit;
        let mut violations = Vec::new();

        if unit.id.as_str().is_empty() {
            violations.push("missing name".to_string());
        } else if unit.id.as_str() != candidate.dir_name {
            violations.push(format!(
                "name '{}' does not match directory '{}'",
                unit.id, candidate.dir_name
            ));
        }
        if unit.description.trim().is_empty() {
            violations.push("missing description".to_string());
        }
        if unit.body_lines > self.max_body_lines {
            violations.push(format!(
                "size explosion: body has {} lines, limit is {}",
                unit.body_lines, self.max_body_lines
            ));
        }
        if unit.audience == AudienceMode::AutoInvoked && unit.triggers.is_empty() {
            violations.push("auto-invoked unit declares no trigger phrases".to_string());
        }

        ValidationReport::from_violations(violations)
    }
}
