//! Verdicts and the human decision table.

use super::{ClusterId, UnitId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Recommended action for a unit pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictKind {
    /// Combine both units into one.
    Merge,
    /// Leave both units as they are.
    Keep,
    /// Partition one unit into several.
    Split,
    /// Remove one unit.
    Retire,
}

impl VerdictKind {
    /// Returns the verdict as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Merge => "MERGE",
            Self::Keep => "KEEP",
            Self::Split => "SPLIT",
            Self::Retire => "RETIRE",
        }
    }

    /// Returns true if applying the verdict mutates the inventory.
    #[must_use]
    pub const fn is_destructive(&self) -> bool {
        !matches!(self, Self::Keep)
    }
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Confidence attached to a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Weak signal.
    Low,
    /// Moderate signal.
    Medium,
    /// Strong signal.
    High,
}

impl Confidence {
    /// Returns the confidence as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// One part of a proposed split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPart {
    /// Identifier of the new unit.
    pub id: UnitId,
    /// Trigger phrases assigned to the part.
    #[serde(default)]
    pub triggers: Vec<String>,
    /// Body section headings (`## ...` text) moved into the part.
    #[serde(default)]
    pub sections: Vec<String>,
}

/// Advisory recommendation for a unit pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// The pair the verdict addresses.
    pub units: (UnitId, UnitId),
    /// Recommended action.
    pub kind: VerdictKind,
    /// Confidence level.
    pub confidence: Confidence,
    /// Free-text reasoning.
    #[serde(default)]
    pub reasoning: String,
    /// Combined identifier proposed for a merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_id: Option<UnitId>,
    /// The unit a retire or split acts on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<UnitId>,
    /// Parts of a proposed split.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub split_parts: Vec<SplitPart>,
}

impl Verdict {
    /// Creates a verdict without merge or split details.
    #[must_use]
    pub fn new(
        a: UnitId,
        b: UnitId,
        kind: VerdictKind,
        confidence: Confidence,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            units: super::ordered_pair(&a, &b),
            kind,
            confidence,
            reasoning: reasoning.into(),
            proposed_id: None,
            subject: None,
            split_parts: Vec::new(),
        }
    }

    /// Sets the proposed merged identifier.
    #[must_use]
    pub fn with_proposed_id(mut self, id: impl Into<UnitId>) -> Self {
        self.proposed_id = Some(id.into());
        self
    }

    /// Sets the subject unit of a retire or split.
    #[must_use]
    pub fn with_subject(mut self, id: impl Into<UnitId>) -> Self {
        self.subject = Some(id.into());
        self
    }

    /// Every unit identifier the verdict references.
    #[must_use]
    pub fn referenced_units(&self) -> Vec<&UnitId> {
        let mut ids = vec![&self.units.0, &self.units.1];
        if let Some(subject) = &self.subject {
            ids.push(subject);
        }
        ids
    }
}

/// Record of a human approving a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    /// Who approved.
    pub approved_by: String,
    /// When the approval was recorded.
    pub approved_at: DateTime<Utc>,
}

/// One row of the decision table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRow {
    /// Row identifier: `<cluster>/<a>+<b>`.
    pub row_id: String,
    /// Cluster the verdict came from.
    pub cluster_id: ClusterId,
    /// The advisory verdict.
    pub verdict: Verdict,
    /// Approval, once recorded.
    #[serde(default)]
    pub approval: Option<Approval>,
}

impl DecisionRow {
    /// Builds the row identifier for a cluster and pair.
    #[must_use]
    pub fn make_id(cluster: &ClusterId, pair: &(UnitId, UnitId)) -> String {
        format!("{cluster}/{}+{}", pair.0, pair.1)
    }

    /// Returns true once a human approved the row.
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        self.approval.is_some()
    }
}

/// A verdict dropped because it referenced a unit that vanished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedVerdict {
    /// Row identifier the verdict would have had.
    pub row_id: String,
    /// The missing or foreign unit.
    pub unit: UnitId,
    /// Why the verdict was dropped.
    pub cause: String,
}

/// A cluster whose evaluation produced no verdicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InconclusiveCluster {
    /// Cluster identifier.
    pub cluster_id: ClusterId,
    /// Why no verdicts were produced.
    pub reason: String,
}

/// Decision table presented to a human for approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionTable {
    /// When the table was generated.
    pub generated_at: DateTime<Utc>,
    /// Rows in deterministic cluster/pair order.
    pub rows: Vec<DecisionRow>,
    /// Verdicts dropped as stale.
    #[serde(default)]
    pub dropped: Vec<DroppedVerdict>,
    /// Clusters that ended inconclusive.
    #[serde(default)]
    pub inconclusive: Vec<InconclusiveCluster>,
}

impl DecisionTable {
    /// Creates an empty table stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            generated_at: Utc::now(),
            rows: Vec::new(),
            dropped: Vec::new(),
            inconclusive: Vec::new(),
        }
    }

    /// Looks up a row by identifier.
    #[must_use]
    pub fn row(&self, row_id: &str) -> Option<&DecisionRow> {
        self.rows.iter().find(|row| row.row_id == row_id)
    }

    /// Records an approval against a row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the row does not exist.
    pub fn approve(&mut self, row_id: &str, approved_by: &str) -> Result<&DecisionRow> {
        let row = self
            .rows
            .iter_mut()
            .find(|row| row.row_id == row_id)
            .ok_or_else(|| Error::InvalidInput(format!("unknown decision row: {row_id}")))?;
        row.approval = Some(Approval {
            approved_by: approved_by.to_string(),
            approved_at: Utc::now(),
        });
        tracing::info!(row_id, approved_by, "Recorded approval");
        Ok(row)
    }

    /// Returns the approved rows in table order.
    pub fn approved_rows(&self) -> impl Iterator<Item = &DecisionRow> {
        self.rows.iter().filter(|row| row.is_approved())
    }

    /// Loads a table from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::operation("read_decision_table", format!("{}: {e}", path.display())))?;
        serde_json::from_str(&contents).map_err(|e| Error::operation("parse_decision_table", e))
    }

    /// Writes the table to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::operation("serialize_decision_table", e))?;
        std::fs::write(path, json)
            .map_err(|e| Error::operation("write_decision_table", format!("{}: {e}", path.display())))
    }
}

impl Default for DecisionTable {
    fn default() -> Self {
        Self::new()
    }
}
