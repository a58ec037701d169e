//! Overlap analysis pipeline: extract, score, cluster.
//!
//! The same pipeline backs the `analyze` command and the re-verification pass
//! that runs after restructuring.

use crate::config::AnalysisConfig;
use crate::models::{Cluster, ClusterId, InventorySnapshot, RunIssue, SimilarityEdge, UnitId};
use crate::services::{ClusterBuilder, MetadataExtractor, SimilarityScorer};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::instrument;

/// One row of the inventory summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    /// Unit identifier.
    pub id: UnitId,
    /// Declared version, if any.
    pub version: Option<String>,
    /// Body length in lines.
    pub body_lines: usize,
    /// Declared tools.
    pub tools: Vec<String>,
}

/// Result of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Number of units read.
    pub total_units: usize,
    /// Cluster threshold in effect.
    pub threshold: f64,
    /// Edges above the reporting floor, strongest first.
    pub overlaps: Vec<SimilarityEdge>,
    /// Clusters in deterministic order.
    pub clusters: Vec<Cluster>,
    /// Inventory summary, sorted by identifier.
    pub inventory: Vec<InventoryEntry>,
    /// Units excluded from the run.
    pub issues: Vec<RunIssue>,
}

/// Outcome of re-running the analysis after restructuring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// True if no cluster contains a restructured unit.
    pub converged: bool,
    /// Clusters that still contain a restructured unit.
    pub reappeared: Vec<ClusterId>,
    /// Fresh analysis of the mutated inventory.
    pub report: AnalysisReport,
}

/// Runs the extract, score and cluster stages over an inventory.
#[derive(Debug, Clone, Default)]
pub struct AnalysisService {
    config: AnalysisConfig,
    extractor: MetadataExtractor,
}

impl AnalysisService {
    /// Creates a service with the given analysis settings.
    #[must_use]
    pub const fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            extractor: MetadataExtractor::new(),
        }
    }

    /// Returns the analysis settings.
    #[must_use]
    pub const fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Scans and analyzes an inventory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InventoryUnreadable`] if the root cannot be read.
    pub fn analyze(&self, root: &Path) -> Result<AnalysisReport> {
        self.scan_and_analyze(root).map(|(_, report)| report)
    }

    /// Scans an inventory and returns both the snapshot and its analysis.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InventoryUnreadable`] if the root cannot be read.
    pub fn scan_and_analyze(&self, root: &Path) -> Result<(InventorySnapshot, AnalysisReport)> {
        let snapshot = self.extractor.scan(root)?;
        let report = self.analyze_snapshot(&snapshot);
        Ok((snapshot, report))
    }

    /// Analyzes an already scanned inventory.
    #[instrument(skip(self, snapshot), fields(root = %snapshot.root.display(), unit_count = snapshot.len()))]
    #[allow(clippy::cast_precision_loss)]
    pub fn analyze_snapshot(&self, snapshot: &InventorySnapshot) -> AnalysisReport {
        let start = Instant::now();
        let scorer = SimilarityScorer::new(self.config.weights);
        let edges = scorer.score_all(&snapshot.units);

        let ids: Vec<UnitId> = snapshot.units.iter().map(|u| u.id.clone()).collect();
        let clusters = ClusterBuilder::new(self.config.threshold).build(&ids, &edges);

        let mut overlaps: Vec<SimilarityEdge> = edges
            .into_iter()
            .filter(|e| e.score > self.config.report_floor)
            .collect();
        overlaps.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.pair.cmp(&b.pair)));

        let inventory = snapshot
            .units
            .iter()
            .map(|u| InventoryEntry {
                id: u.id.clone(),
                version: u.version.clone(),
                body_lines: u.body_lines,
                tools: u.tools.clone(),
            })
            .collect();

        metrics::histogram!("curator_analysis_duration_ms")
            .record(start.elapsed().as_millis() as f64);
        tracing::info!(
            units = snapshot.len(),
            overlaps = overlaps.len(),
            clusters = clusters.len(),
            "Analysis complete"
        );

        AnalysisReport {
            total_units: snapshot.len(),
            threshold: self.config.threshold,
            overlaps,
            clusters,
            inventory,
            issues: snapshot.issues.clone(),
        }
    }

    /// Re-runs the analysis and checks that no unit touched by an applied op
    /// still sits in a cluster.
    ///
    /// Membership is matched by unit id, so a merged target that clusters
    /// with a leftover unit counts even though the cluster id is new.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InventoryUnreadable`] if the root cannot be read.
    #[instrument(skip(self, touched), fields(root = %root.display(), touched = touched.len()))]
    pub fn verify(&self, root: &Path, touched: &[UnitId]) -> Result<VerificationReport> {
        let report = self.analyze(root)?;
        let reappeared: Vec<ClusterId> = report
            .clusters
            .iter()
            .filter(|c| c.members.iter().any(|m| touched.contains(m)))
            .map(|c| c.id.clone())
            .collect();
        let converged = reappeared.is_empty();
        if !converged {
            tracing::warn!(count = reappeared.len(), "Restructured units still overlap");
        }
        Ok(VerificationReport {
            converged,
            reappeared,
            report,
        })
    }
}
