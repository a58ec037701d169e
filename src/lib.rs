//! # Curator
//!
//! Overlap analysis and safe restructuring for inventories of independently
//! authored capability units.
//!
//! Curator scans an inventory directory, scores every pair of units for
//! lexical and structural overlap, clusters the redundant ones, runs a fixed
//! three-role evaluation over every cluster and, once a human approves a
//! verdict, merges, splits or retires units with archival and rollback.
//!
//! ## Pipeline
//!
//! ```text
//! extract ─▶ score ─▶ cluster ─▶ evaluate ─▶ aggregate ─▶ (approve) ─▶ restructure
//!    ▲                                                                    │
//!    └──────────────────────── re-verification ◀──────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use curator::services::AnalysisService;
//! use curator::config::CuratorConfig;
//!
//! let config = CuratorConfig::default();
//! let report = AnalysisService::new(config.analysis.clone()).analyze("~/.claude/skills".as_ref())?;
//! println!("{} clusters", report.clusters.len());
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod cli;
pub mod config;
pub mod evaluator;
pub mod models;
pub mod observability;
pub mod services;

pub use config::CuratorConfig;
pub use evaluator::Evaluator;
pub use models::{
    Cluster, ClusterId, DecisionTable, RestructureOp, SimilarityEdge, Unit, UnitId, Verdict,
};
pub use services::{
    AnalysisService, ClusterBuilder, EvaluationScheduler, MetadataExtractor,
    RestructuringExecutor, SimilarityScorer, VerdictAggregator,
};

/// Error type for curator operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When | Effect on the run |
/// |---------|-------------|-------------------|
/// | `InventoryUnreadable` | Inventory root missing or not a directory | Fatal |
/// | `Parse` | A unit descriptor cannot be read | Unit excluded |
/// | `TaskFailure` | An evaluator task fails or times out | Cluster inconclusive |
/// | `StaleReference` | A verdict names a unit that vanished | Verdict dropped |
/// | `ValidationFailure` | A mutated unit violates a constraint | Op rolled back |
/// | `ConcurrencyConflict` | Two ops touch the same unit | Second op rejected |
/// | `NotApproved` | An op is planned from an unapproved row | Op refused |
/// | `RollbackFailed` | Restoring an archive snapshot fails | Op left failed |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised for filesystem I/O, serialization and process failures that
    /// have no more specific variant.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The inventory root cannot be read. The only fatal condition of a run.
    #[error("inventory '{path}' is unreadable: {cause}")]
    InventoryUnreadable {
        /// Inventory root path.
        path: String,
        /// The underlying cause.
        cause: String,
    },

    /// A unit descriptor could not be parsed.
    #[error("unit '{unit}' could not be parsed: {cause}")]
    Parse {
        /// Unit directory or identifier.
        unit: String,
        /// The underlying cause.
        cause: String,
    },

    /// An evaluator task failed or timed out.
    #[error("{role} task for cluster '{cluster}' failed: {cause}")]
    TaskFailure {
        /// Cluster identifier.
        cluster: String,
        /// Evaluator role.
        role: String,
        /// The underlying cause.
        cause: String,
    },

    /// A verdict references a unit that no longer exists.
    #[error("row '{row}' references missing unit '{unit}'")]
    StaleReference {
        /// Decision row identifier.
        row: String,
        /// The unit that could not be found.
        unit: String,
    },

    /// A mutated unit failed validation.
    #[error("unit '{unit}' failed validation: {violations}")]
    ValidationFailure {
        /// Unit identifier.
        unit: String,
        /// Violated constraints, joined for display.
        violations: String,
    },

    /// Two restructure operations overlap on unit identity.
    #[error("op '{op}' conflicts on units [{units}]")]
    ConcurrencyConflict {
        /// Rejected op identifier.
        op: String,
        /// Overlapping unit identifiers.
        units: String,
    },

    /// A restructure operation was requested for an unapproved row.
    #[error("row '{0}' has not been approved")]
    NotApproved(String),

    /// Restoring from the archive failed; the inventory needs manual attention.
    #[error("rollback of op '{op}' failed: {cause}")]
    RollbackFailed {
        /// Op identifier.
        op: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Wraps an I/O style failure for the named operation.
    pub fn operation(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for curator operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::operation("copy_dir", "permission denied");
        assert_eq!(
            err.to_string(),
            "operation 'copy_dir' failed: permission denied"
        );

        let err = Error::TaskFailure {
            cluster: "c-1".to_string(),
            role: "consolidator".to_string(),
            cause: "timed out".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "consolidator task for cluster 'c-1' failed: timed out"
        );
    }

    #[test]
    fn test_conflict_display_names_units() {
        let err = Error::ConcurrencyConflict {
            op: "op-2".to_string(),
            units: "alpha, beta".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("op-2"));
        assert!(display.contains("alpha, beta"));
    }
}
