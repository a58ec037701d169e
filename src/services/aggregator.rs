//! Verdict aggregation into the decision table.

use crate::Error;
use crate::models::{
    Cluster, ClusterEvaluation, ClusterOutcome, DecisionRow, DecisionTable, DroppedVerdict,
    InconclusiveCluster, InventorySnapshot, IssueKind, RunIssue, TaskState, UnitId, Verdict,
    ordered_pair,
};
use std::collections::{HashMap, HashSet};
use tracing::instrument;

/// Decision table plus the issues found while building it.
#[derive(Debug, Clone)]
pub struct Aggregation {
    /// Table for human review.
    pub table: DecisionTable,
    /// Failed tasks and dropped verdicts.
    pub issues: Vec<RunIssue>,
}

/// Flattens per-cluster syntheses into per-pair decision rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerdictAggregator;

impl VerdictAggregator {
    /// Creates a new aggregator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Builds the decision table.
    ///
    /// Every verdict is checked against the current snapshot and its cluster:
    /// a verdict naming a unit that vanished, or a unit outside the cluster, is
    /// dropped and flagged. Inconclusive clusters are listed without rows.
    /// Rows follow cluster order, then pair order.
    #[instrument(skip_all, fields(cluster_count = clusters.len()))]
    pub fn aggregate(
        &self,
        snapshot: &InventorySnapshot,
        clusters: &[Cluster],
        evaluations: &[ClusterEvaluation],
    ) -> Aggregation {
        let by_id: HashMap<_, _> = clusters.iter().map(|c| (&c.id, c)).collect();
        let order: HashMap<_, _> = clusters
            .iter()
            .enumerate()
            .map(|(i, c)| (&c.id, i))
            .collect();
        let mut sorted: Vec<&ClusterEvaluation> = evaluations.iter().collect();
        sorted.sort_by_key(|e| order.get(&e.cluster_id).copied().unwrap_or(usize::MAX));

        let mut table = DecisionTable::new();
        let mut issues = Vec::new();

        for evaluation in sorted {
            let cluster_id = &evaluation.cluster_id;
            for task in &evaluation.tasks {
                let cause = match &task.state {
                    TaskState::Failed { cause } => cause.clone(),
                    TaskState::TimedOut => "timed out".to_string(),
                    _ => continue,
                };
                let err = Error::TaskFailure {
                    cluster: cluster_id.to_string(),
                    role: task.role.to_string(),
                    cause,
                };
                issues.push(RunIssue::from_error(cluster_id.as_str(), &err));
            }

            let synthesis = match &evaluation.outcome {
                ClusterOutcome::Concluded { synthesis } => synthesis,
                ClusterOutcome::Inconclusive { reason } => {
                    table.inconclusive.push(InconclusiveCluster {
                        cluster_id: cluster_id.clone(),
                        reason: reason.as_str().to_string(),
                    });
                    continue;
                },
            };
            let Some(cluster) = by_id.get(cluster_id) else {
                issues.push(RunIssue::new(
                    IssueKind::Other,
                    cluster_id.as_str(),
                    "evaluation for an unknown cluster",
                ));
                continue;
            };

            let mut rows: Vec<DecisionRow> = Vec::new();
            let mut seen: HashSet<String> = HashSet::new();
            for verdict in &synthesis.pair_verdicts {
                let mut verdict: Verdict = verdict.clone();
                verdict.units = ordered_pair(&verdict.units.0, &verdict.units.1);
                let row_id = DecisionRow::make_id(cluster_id, &verdict.units);

                if let Some((unit, cause)) = stale_unit(&verdict, cluster, snapshot) {
                    let err = Error::StaleReference {
                        row: row_id.clone(),
                        unit: unit.to_string(),
                    };
                    tracing::warn!(row_id = %row_id, unit = %unit, cause, "Dropping stale verdict");
                    issues.push(RunIssue::from_error(row_id.clone(), &err));
                    table.dropped.push(DroppedVerdict {
                        row_id,
                        unit,
                        cause: cause.to_string(),
                    });
                    continue;
                }
                if verdict.units.0 == verdict.units.1 {
                    issues.push(RunIssue::new(
                        IssueKind::Other,
                        row_id,
                        "verdict pairs a unit with itself",
                    ));
                    continue;
                }
                if !seen.insert(row_id.clone()) {
                    issues.push(RunIssue::new(
                        IssueKind::Other,
                        row_id,
                        "duplicate verdict for the pair, keeping the first",
                    ));
                    continue;
                }

                rows.push(DecisionRow {
                    row_id,
                    cluster_id: cluster_id.clone(),
                    verdict,
                    approval: None,
                });
            }
            rows.sort_by(|a, b| a.verdict.units.cmp(&b.verdict.units));
            table.rows.extend(rows);
        }

        tracing::info!(
            rows = table.rows.len(),
            dropped = table.dropped.len(),
            inconclusive = table.inconclusive.len(),
            "Decision table built"
        );
        Aggregation { table, issues }
    }
}

/// Returns the first referenced unit that no longer exists or is outside the cluster.
fn stale_unit(
    verdict: &Verdict,
    cluster: &Cluster,
    snapshot: &InventorySnapshot,
) -> Option<(UnitId, &'static str)> {
    verdict.referenced_units().into_iter().find_map(|id| {
        if !snapshot.contains(id) {
            Some((id.clone(), "unit no longer exists"))
        } else if !cluster.contains(id) {
            Some((id.clone(), "unit is not a member of the cluster"))
        } else {
            None
        }
    })
}
