//! Apply CLI command.

use super::analyze::write_issues;
use super::{output_error, write_json};
use crate::Result;
use crate::config::CuratorConfig;
use crate::models::{DecisionTable, RestructureOp, RunIssue, UnitId};
use crate::services::{AnalysisService, ExecutionReport, RestructuringExecutor, VerificationReport};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

/// Executes approved rows of a decision table, then re-verifies the inventory.
#[derive(Debug, Clone)]
pub struct ApplyCommand {
    /// Inventory root.
    pub inventory: PathBuf,
    /// Decision table file.
    pub table: PathBuf,
    /// Emit the outcome as JSON.
    pub json: bool,
}

/// What an apply run did.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutcome {
    /// Rows that could not be planned.
    pub plan_issues: Vec<RunIssue>,
    /// Per-op results.
    pub execution: ExecutionReport,
    /// Re-analysis of the inventory after the ops ran.
    pub verification: VerificationReport,
}

impl ApplyOutcome {
    /// Returns true when every planned op validated and every row could be planned.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.plan_issues.is_empty() && self.execution.ops.iter().all(|r| r.succeeded())
    }
}

impl ApplyCommand {
    /// Plans, executes and re-verifies.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read or the inventory becomes unreadable.
    pub fn run(&self, config: &CuratorConfig, out: &mut impl Write) -> Result<ApplyOutcome> {
        let table = DecisionTable::load(&self.table)?;
        let (ops, plan_issues) = RestructuringExecutor::plan(&table);
        tracing::info!(ops = ops.len(), "Planned restructure ops");

        let executor = RestructuringExecutor::from_config(&self.inventory, config);
        let execution = executor.execute_batch(ops);

        let mut touched: Vec<UnitId> = execution
            .validated()
            .flat_map(RestructureOp::touched_units)
            .collect();
        touched.sort();
        touched.dedup();
        let verification = AnalysisService::new(config.analysis).verify(&self.inventory, &touched)?;

        let outcome = ApplyOutcome {
            plan_issues,
            execution,
            verification,
        };
        if self.json {
            write_json(out, &outcome)?;
        } else {
            write_summary(&outcome, out)?;
        }
        Ok(outcome)
    }
}

fn write_summary(outcome: &ApplyOutcome, out: &mut impl Write) -> Result<()> {
    for report in &outcome.execution.ops {
        let op = &report.op;
        let units = op
            .touched_units()
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(out, "{} {} [{units}]: {}", op.kind, op.row_id, op.status).map_err(output_error)?;
        if let Some(error) = &report.error {
            writeln!(out, "    {error}").map_err(output_error)?;
        }
    }
    write_issues(&outcome.plan_issues, out)?;
    write_issues(&outcome.execution.issues, out)?;

    let verification = &outcome.verification;
    writeln!(
        out,
        "Re-verification: {} clusters remain, converged: {}",
        verification.report.clusters.len(),
        verification.converged
    )
    .map_err(output_error)?;
    for id in &verification.reappeared {
        writeln!(out, "  cluster {id} is still present").map_err(output_error)?;
    }
    Ok(())
}
