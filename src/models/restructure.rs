//! Restructure operation types.

use super::{DecisionRow, SplitPart, UnitId, VerdictKind};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of inventory mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// Combine sources into one target.
    Merge,
    /// Partition one source into several targets.
    Split,
    /// Remove one source.
    Retire,
}

impl OpKind {
    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Split => "split",
            Self::Retire => "retire",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of an operation as it moves through the executor.
///
/// ```text
/// Queued ─▶ Archived ─▶ Applied ─▶ Validated
///    │          │           │
///    └──────────┴───────────┴──▶ Failed ─▶ RolledBack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpStatus {
    /// Approved and waiting.
    #[default]
    Queued,
    /// Every source has been snapshotted.
    Archived,
    /// The mutation has been written.
    Applied,
    /// The result passed validation. Terminal success.
    Validated,
    /// A step failed; see the report for the cause.
    Failed,
    /// The sources were restored from the snapshot.
    RolledBack,
}

impl OpStatus {
    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Archived => "archived",
            Self::Applied => "applied",
            Self::Validated => "validated",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for OpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An approved, queued mutation of the inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestructureOp {
    /// Operation identifier.
    pub id: String,
    /// Kind of mutation.
    pub kind: OpKind,
    /// Units read (and archived) by the op.
    pub sources: Vec<UnitId>,
    /// Units written by the op.
    pub targets: Vec<UnitId>,
    /// Split layout, for split ops.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub split_parts: Vec<SplitPart>,
    /// Decision row that approved the op.
    pub row_id: String,
    /// Current status.
    pub status: OpStatus,
}

impl RestructureOp {
    /// Plans an op from an approved decision row.
    ///
    /// Returns `Ok(None)` for `KEEP` verdicts, which need no mutation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotApproved`] for unapproved rows and
    /// [`Error::InvalidInput`] when a retire or split names no subject, a
    /// split has no parts, or an identifier is not path-safe.
    pub fn from_row(row: &DecisionRow) -> Result<Option<Self>> {
        if !row.is_approved() {
            return Err(Error::NotApproved(row.row_id.clone()));
        }
        let verdict = &row.verdict;
        let (kind, sources, targets, split_parts) = match verdict.kind {
            VerdictKind::Keep => return Ok(None),
            VerdictKind::Merge => {
                let target = verdict
                    .proposed_id
                    .clone()
                    .unwrap_or_else(|| verdict.units.0.clone());
                (
                    OpKind::Merge,
                    vec![verdict.units.0.clone(), verdict.units.1.clone()],
                    vec![target],
                    Vec::new(),
                )
            },
            VerdictKind::Retire => {
                let subject = Self::subject_of(row)?;
                (OpKind::Retire, vec![subject], Vec::new(), Vec::new())
            },
            VerdictKind::Split => {
                let subject = Self::subject_of(row)?;
                if verdict.split_parts.is_empty() {
                    return Err(Error::InvalidInput(format!(
                        "split verdict in row '{}' lists no parts",
                        row.row_id
                    )));
                }
                let targets = verdict
                    .split_parts
                    .iter()
                    .map(|part| part.id.clone())
                    .collect();
                (
                    OpKind::Split,
                    vec![subject],
                    targets,
                    verdict.split_parts.clone(),
                )
            },
        };

        if let Some(bad) = sources
            .iter()
            .chain(targets.iter())
            .find(|id| !id.is_path_safe())
        {
            return Err(Error::InvalidInput(format!(
                "row '{}' names unsafe unit id '{bad}'",
                row.row_id
            )));
        }

        Ok(Some(Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            sources,
            targets,
            split_parts,
            row_id: row.row_id.clone(),
            status: OpStatus::Queued,
        }))
    }

    fn subject_of(row: &DecisionRow) -> Result<UnitId> {
        row.verdict.subject.clone().ok_or_else(|| {
            Error::InvalidInput(format!(
                "{} verdict in row '{}' names no subject",
                row.verdict.kind, row.row_id
            ))
        })
    }

    /// Every unit identifier the op touches, sorted and de-duplicated.
    #[must_use]
    pub fn touched_units(&self) -> Vec<UnitId> {
        let mut ids: Vec<UnitId> = self
            .sources
            .iter()
            .chain(self.targets.iter())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Returns true if the two ops share any unit.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        let theirs = other.touched_units();
        self.touched_units()
            .iter()
            .any(|id| theirs.binary_search(id).is_ok())
    }
}
