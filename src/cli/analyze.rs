//! Analyze CLI command.

use super::{output_error, write_json};
use crate::Result;
use crate::config::{CuratorConfig, unit_interval};
use crate::models::RunIssue;
use crate::services::{AnalysisReport, AnalysisService};
use std::io::Write;
use std::path::PathBuf;

/// Scans an inventory and reports overlaps and clusters.
#[derive(Debug, Clone)]
pub struct AnalyzeCommand {
    /// Inventory root.
    pub inventory: PathBuf,
    /// Emit the full report as JSON.
    pub json: bool,
    /// Overrides the configured cluster threshold.
    pub threshold: Option<f64>,
}

impl AnalyzeCommand {
    /// Runs the analysis and writes the report.
    ///
    /// # Errors
    ///
    /// Returns an error if the threshold is not finite, the inventory root is
    /// unreadable or output fails.
    pub fn run(&self, config: &CuratorConfig, out: &mut impl Write) -> Result<AnalysisReport> {
        let mut analysis = config.analysis;
        if let Some(threshold) = self.threshold {
            analysis.threshold = unit_interval("threshold", threshold)?;
        }
        let report = AnalysisService::new(analysis).analyze(&self.inventory)?;

        if self.json {
            write_json(out, &report)?;
        } else {
            write_summary(&report, out)?;
        }
        Ok(report)
    }
}

/// Writes the plain-text summary of a report.
pub(crate) fn write_summary(report: &AnalysisReport, out: &mut impl Write) -> Result<()> {
    writeln!(
        out,
        "Scanned {} units (threshold {:.2})",
        report.total_units, report.threshold
    )
    .map_err(output_error)?;
    writeln!(out, "Overlapping pairs: {}", report.overlaps.len()).map_err(output_error)?;
    writeln!(out, "Clusters: {}", report.clusters.len()).map_err(output_error)?;

    for cluster in &report.clusters {
        let members = cluster
            .members
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(out, "  {}: {members}", cluster.id).map_err(output_error)?;
        for edge in &cluster.edges {
            let s = &edge.sub_scores;
            writeln!(
                out,
                "    {} <-> {}  {:.2} (trigger {:.2}, workflow {:.2}, domain {:.2}, tools {:.2}, keyword {:.2})",
                edge.pair.0, edge.pair.1, edge.score, s.trigger, s.workflow, s.domain, s.tools, s.keyword
            )
            .map_err(output_error)?;
        }
    }
    write_issues(&report.issues, out)
}

/// Writes a run's issues, if any.
pub(crate) fn write_issues(issues: &[RunIssue], out: &mut impl Write) -> Result<()> {
    if issues.is_empty() {
        return Ok(());
    }
    writeln!(out, "Issues: {}", issues.len()).map_err(output_error)?;
    for issue in issues {
        writeln!(out, "  {issue}").map_err(output_error)?;
    }
    Ok(())
}
