//! Evaluate CLI command.

use super::analyze::write_issues;
use super::{output_error, write_json};
use crate::config::CuratorConfig;
use crate::models::{DecisionTable, RunIssue};
use crate::services::{AnalysisService, EvaluationScheduler, VerdictAggregator};
use crate::{Result, evaluator};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Default decision table path.
const DEFAULT_TABLE: &str = "decision-table.json";

/// Runs the three-role review over every cluster and writes a decision table.
#[derive(Debug, Clone)]
pub struct EvaluateCommand {
    /// Inventory root.
    pub inventory: PathBuf,
    /// Where to write the decision table.
    pub out: Option<PathBuf>,
    /// Emit the outcome as JSON.
    pub json: bool,
}

/// What an evaluation run produced.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluateOutcome {
    /// Where the table was written.
    pub table_path: PathBuf,
    /// The decision table.
    pub table: DecisionTable,
    /// Parse, task and stale-reference issues of the run.
    pub issues: Vec<RunIssue>,
}

impl EvaluateCommand {
    /// Runs the review. Cancelling `cancel` aborts evaluator tasks still running.
    ///
    /// # Errors
    ///
    /// Returns an error if the inventory root is unreadable, the evaluator
    /// backend is misconfigured, or the table cannot be written.
    pub async fn run(
        &self,
        config: &CuratorConfig,
        cancel: CancellationToken,
        out: &mut impl Write,
    ) -> Result<EvaluateOutcome> {
        let (snapshot, report) =
            AnalysisService::new(config.analysis).scan_and_analyze(&self.inventory)?;

        let scheduler = EvaluationScheduler::new(
            evaluator::from_config(&config.evaluator)?,
            config.scheduler.clone(),
        )
        .with_cancellation_token(cancel);
        let evaluations = scheduler.run(&snapshot, &report.clusters).await;
        let aggregation = VerdictAggregator::new().aggregate(&snapshot, &report.clusters, &evaluations);

        let table_path = self.out.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_TABLE));
        aggregation.table.save(&table_path)?;

        let mut issues = report.issues;
        issues.extend(aggregation.issues);
        let outcome = EvaluateOutcome {
            table_path,
            table: aggregation.table,
            issues,
        };

        if self.json {
            write_json(out, &outcome)?;
        } else {
            write_summary(&outcome, out)?;
        }
        Ok(outcome)
    }
}

fn write_summary(outcome: &EvaluateOutcome, out: &mut impl Write) -> Result<()> {
    let table = &outcome.table;
    writeln!(
        out,
        "Decision table: {} ({} rows, {} inconclusive, {} dropped)",
        outcome.table_path.display(),
        table.rows.len(),
        table.inconclusive.len(),
        table.dropped.len()
    )
    .map_err(output_error)?;
    for row in &table.rows {
        let v = &row.verdict;
        writeln!(
            out,
            "  {}  {} ({})  {}",
            row.row_id,
            v.kind,
            v.confidence.as_str(),
            v.reasoning
        )
        .map_err(output_error)?;
    }
    for cluster in &table.inconclusive {
        writeln!(out, "  {}  inconclusive: {}", cluster.cluster_id, cluster.reason)
            .map_err(output_error)?;
    }
    write_issues(&outcome.issues, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_unit(root: &std::path::Path, id: &str, description: &str) {
        let dir = root.join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("SKILL.md"),
            format!("---\nname: {id}\ndescription: {description}\nallowed-tools: Write\n---\nWrite email copy.\n"),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_evaluate_writes_table() {
        let tmp = TempDir::new().unwrap();
        let inventory = tmp.path().join("skills");
        let shared = "Use when asked to \"write email subject\" or \"write email copy\".";
        write_unit(&inventory, "email-subject-writer", shared);
        write_unit(&inventory, "email-body-writer", shared);

        let command = EvaluateCommand {
            inventory,
            out: Some(tmp.path().join("table.json")),
            json: false,
        };
        let mut out = Vec::new();
        let outcome = command
            .run(&CuratorConfig::default(), CancellationToken::new(), &mut out)
            .await
            .unwrap();

        assert_eq!(outcome.table.rows.len(), 1);
        let loaded = DecisionTable::load(&tmp.path().join("table.json")).unwrap();
        assert_eq!(loaded.rows, outcome.table.rows);
        assert!(String::from_utf8(out).unwrap().contains("MERGE"));
    }

    #[tokio::test]
    async fn test_cancelled_run_is_inconclusive() {
        let tmp = TempDir::new().unwrap();
        let inventory = tmp.path().join("skills");
        let shared = "Use when asked to \"write email subject\" or \"write email copy\".";
        write_unit(&inventory, "email-subject-writer", shared);
        write_unit(&inventory, "email-body-writer", shared);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let command = EvaluateCommand {
            inventory,
            out: Some(tmp.path().join("table.json")),
            json: true,
        };
        let mut out = Vec::new();
        let outcome = command
            .run(&CuratorConfig::default(), cancel, &mut out)
            .await
            .unwrap();
        assert!(outcome.table.rows.is_empty());
        assert_eq!(outcome.table.inconclusive.len(), 1);
    }
}
