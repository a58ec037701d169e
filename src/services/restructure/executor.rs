//! Restructuring executor.
//!
//! Drives each approved op through
//! `Queued -> Archived -> Applied -> Validated`. Any failure after the
//! snapshot restores the sources from the archive and removes whatever the op
//! wrote, so the inventory never holds a half-applied unit.
//!
//! New units are first written to a hidden staging directory inside the
//! inventory and moved into place only after every source has been removed.

use super::archive::{ArchiveManifest, ArchiveStore};
use super::locks::UnitLocks;
use super::mutation::{copy_aux_files, merge_units, split_unit, write_descriptor};
use super::validator::{DefaultValidator, UnitCandidate, Validator};
use crate::config::CuratorConfig;
use crate::models::{
    DecisionTable, IssueKind, OpKind, OpStatus, RestructureOp, RunIssue, Unit, UnitId,
};
use crate::services::{DESCRIPTOR_FILE, MetadataExtractor};
use crate::{Error, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Outcome of one op.
#[derive(Debug, Clone, Serialize)]
pub struct OpReport {
    /// The op, carrying its final status.
    pub op: RestructureOp,
    /// Snapshot directory, once archived.
    pub archive_dir: Option<PathBuf>,
    /// Validation violations, if validation failed.
    pub violations: Vec<String>,
    /// Error that stopped the op, if any.
    pub error: Option<String>,
    /// Issues raised by this op, including rollback events.
    pub issues: Vec<RunIssue>,
}

impl OpReport {
    fn new(op: RestructureOp) -> Self {
        Self {
            op,
            archive_dir: None,
            violations: Vec::new(),
            error: None,
            issues: Vec::new(),
        }
    }

    fn record_error(&mut self, err: &Error) {
        self.issues.push(RunIssue::from_error(self.op.id.clone(), err));
        self.error = Some(err.to_string());
    }

    /// Returns true if the op reached `Validated`.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.op.status == OpStatus::Validated
    }
}

/// Outcome of a batch, in submission order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionReport {
    /// Per-op reports.
    pub ops: Vec<OpReport>,
    /// Every issue raised across the batch.
    pub issues: Vec<RunIssue>,
}

impl ExecutionReport {
    /// Ops that reached `Validated`.
    pub fn validated(&self) -> impl Iterator<Item = &RestructureOp> {
        self.ops.iter().filter(|r| r.succeeded()).map(|r| &r.op)
    }

    /// Ops that were rolled back.
    pub fn rolled_back(&self) -> impl Iterator<Item = &RestructureOp> {
        self.ops
            .iter()
            .filter(|r| r.op.status == OpStatus::RolledBack)
            .map(|r| &r.op)
    }
}

/// Sole writer of the inventory.
pub struct RestructuringExecutor {
    inventory: PathBuf,
    archive: ArchiveStore,
    validator: Box<dyn Validator>,
    locks: UnitLocks,
    extractor: MetadataExtractor,
}

impl std::fmt::Debug for RestructuringExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestructuringExecutor")
            .field("inventory", &self.inventory)
            .field("archive", &self.archive)
            .finish_non_exhaustive()
    }
}

impl RestructuringExecutor {
    /// Creates an executor for `inventory` that archives under `archive_root`.
    #[must_use]
    pub fn new(
        inventory: impl Into<PathBuf>,
        archive_root: impl Into<PathBuf>,
        validator: Box<dyn Validator>,
    ) -> Self {
        Self {
            inventory: inventory.into(),
            archive: ArchiveStore::new(archive_root),
            validator,
            locks: UnitLocks::new(),
            extractor: MetadataExtractor::new(),
        }
    }

    /// Creates an executor with the configured archive and body limit.
    #[must_use]
    pub fn from_config(inventory: &Path, config: &CuratorConfig) -> Self {
        Self::new(
            inventory,
            config.archive_dir_for(inventory),
            Box::new(DefaultValidator::new(config.restructure.max_body_lines)),
        )
    }

    /// Returns the inventory root.
    #[must_use]
    pub fn inventory(&self) -> &Path {
        &self.inventory
    }

    /// Returns the archive store.
    #[must_use]
    pub const fn archive(&self) -> &ArchiveStore {
        &self.archive
    }

    /// Returns the unit lock registry.
    #[must_use]
    pub const fn locks(&self) -> &UnitLocks {
        &self.locks
    }

    /// Plans ops for every approved row of `table`.
    ///
    /// `KEEP` rows plan nothing; rows that cannot be planned become issues.
    #[must_use]
    pub fn plan(table: &DecisionTable) -> (Vec<RestructureOp>, Vec<RunIssue>) {
        let mut ops = Vec::new();
        let mut issues = Vec::new();
        for row in table.approved_rows() {
            match RestructureOp::from_row(row) {
                Ok(Some(op)) => ops.push(op),
                Ok(None) => {},
                Err(e) => issues.push(RunIssue::from_error(row.row_id.clone(), &e)),
            }
        }
        (ops, issues)
    }

    /// Executes a batch.
    ///
    /// An op sharing a unit with an earlier op of the batch is rejected and
    /// stays `Queued`. The remaining ops are disjoint and run concurrently.
    #[instrument(skip_all, fields(op_count = ops.len()))]
    pub fn execute_batch(&self, ops: Vec<RestructureOp>) -> ExecutionReport {
        let mut accepted: Vec<(usize, RestructureOp)> = Vec::new();
        let mut slots: Vec<Option<OpReport>> = Vec::with_capacity(ops.len());

        for (index, op) in ops.into_iter().enumerate() {
            let touched = op.touched_units();
            let mut shared: Vec<&UnitId> = accepted
                .iter()
                .flat_map(|(_, earlier)| earlier.touched_units())
                .filter_map(|id| touched.iter().find(|t| **t == id))
                .collect();
            shared.sort();
            shared.dedup();

            if shared.is_empty() {
                accepted.push((index, op));
                slots.push(None);
                continue;
            }
            let err = Error::ConcurrencyConflict {
                op: op.id.clone(),
                units: shared
                    .iter()
                    .map(|id| id.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            };
            tracing::warn!(op_id = %op.id, error = %err, "Rejecting overlapping op");
            let mut report = OpReport::new(op);
            report.record_error(&err);
            record_metric(&report.op);
            slots.push(Some(report));
        }

        let finished: Vec<(usize, OpReport)> = std::thread::scope(|scope| {
            let handles: Vec<_> = accepted
                .into_iter()
                .map(|(index, op)| {
                    let fallback = op.clone();
                    (index, fallback, scope.spawn(move || self.execute(op)))
                })
                .collect();
            handles
                .into_iter()
                .map(|(index, fallback, handle)| {
                    let report = handle.join().unwrap_or_else(|_| {
                        let mut report = OpReport::new(fallback);
                        report.op.status = OpStatus::Failed;
                        report.record_error(&Error::operation("execute_op", "op panicked"));
                        record_metric(&report.op);
                        report
                    });
                    (index, report)
                })
                .collect()
        });
        for (index, report) in finished {
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(report);
            }
        }

        let ops: Vec<OpReport> = slots.into_iter().flatten().collect();
        let issues = ops.iter().flat_map(|r| r.issues.iter().cloned()).collect();
        let report = ExecutionReport { ops, issues };
        tracing::info!(
            validated = report.validated().count(),
            rolled_back = report.rolled_back().count(),
            "Restructure batch finished"
        );
        report
    }

    /// Executes one op.
    ///
    /// A lock conflict leaves the op `Queued`. Failures before the snapshot
    /// leave it `Failed` with nothing touched; failures after it roll back.
    #[instrument(skip(self, op), fields(op_id = %op.id, kind = %op.kind))]
    pub fn execute(&self, op: RestructureOp) -> OpReport {
        let mut report = OpReport::new(op);
        let touched = report.op.touched_units();

        let _guard = match self.locks.try_acquire(&report.op.id, &touched) {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!(error = %e, "Op rejected");
                report.record_error(&e);
                record_metric(&report.op);
                return report;
            },
        };

        if let Err(e) = self.precheck(&report.op) {
            tracing::warn!(error = %e, "Op refused before archival");
            report.op.status = OpStatus::Failed;
            report.record_error(&e);
            record_metric(&report.op);
            return report;
        }

        let sources: Vec<(UnitId, PathBuf)> = report
            .op
            .sources
            .iter()
            .map(|id| (id.clone(), self.unit_dir(id)))
            .collect();
        let manifest = match self.archive.snapshot(&report.op.id, &sources) {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::error!(error = %e, "Archival failed");
                report.op.status = OpStatus::Failed;
                report.record_error(&e);
                record_metric(&report.op);
                return report;
            },
        };
        report.archive_dir = Some(manifest.dir.clone());
        advance(&mut report.op, OpStatus::Archived);

        if let Err(e) = self.apply(&report.op) {
            self.roll_back(&mut report, &manifest, &e);
            return report;
        }
        advance(&mut report.op, OpStatus::Applied);

        match self.validate_targets(&report.op) {
            Ok(()) => advance(&mut report.op, OpStatus::Validated),
            Err((violations, e)) => {
                report.violations = violations;
                self.roll_back(&mut report, &manifest, &e);
                return report;
            },
        }

        tracing::info!(targets = ?report.op.targets, "Op validated");
        record_metric(&report.op);
        report
    }

    fn unit_dir(&self, id: &UnitId) -> PathBuf {
        self.inventory.join(id.as_str())
    }

    fn staging_dir(&self, op: &RestructureOp) -> PathBuf {
        self.inventory.join(format!(".staging-{}", op.id))
    }

    fn precheck(&self, op: &RestructureOp) -> Result<()> {
        for source in &op.sources {
            self.load_source(op, source)?;
        }
        let fresh: Vec<&UnitId> = op
            .targets
            .iter()
            .filter(|t| !op.sources.contains(t))
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }
        let snapshot = self.extractor.scan(&self.inventory)?;
        for target in fresh {
            if self.unit_dir(target).exists() || snapshot.contains(target) {
                return Err(Error::InvalidInput(format!(
                    "target unit '{target}' already exists"
                )));
            }
        }
        Ok(())
    }

    /// Loads a source from its directory; the descriptor must name the same unit.
    fn load_source(&self, op: &RestructureOp, id: &UnitId) -> Result<Unit> {
        let stale = || Error::StaleReference {
            row: op.row_id.clone(),
            unit: id.to_string(),
        };
        let unit = self
            .extractor
            .load_unit(&self.unit_dir(id))?
            .ok_or_else(stale)?;
        if unit.id != *id {
            tracing::warn!(
                dir = %unit.path.display(),
                expected = %id,
                found = %unit.id,
                "Unit directory names a different unit"
            );
            return Err(stale());
        }
        Ok(unit)
    }

    fn apply(&self, op: &RestructureOp) -> Result<()> {
        let sources = op
            .sources
            .iter()
            .map(|id| self.load_source(op, id))
            .collect::<Result<Vec<_>>>()?;
        let staging = self.staging_dir(op);

        let staged: Vec<Unit> = match op.kind {
            OpKind::Retire => Vec::new(),
            OpKind::Merge => {
                let target = op.targets.first().ok_or_else(|| {
                    Error::InvalidInput(format!("merge op '{}' has no target", op.id))
                })?;
                let refs: Vec<&Unit> = sources.iter().collect();
                vec![merge_units(target, &refs)]
            },
            OpKind::Split => {
                let source = sources.first().ok_or_else(|| {
                    Error::InvalidInput(format!("split op '{}' has no source", op.id))
                })?;
                split_unit(source, &op.split_parts)
            },
        };

        for unit in &staged {
            let dir = staging.join(unit.id.as_str());
            write_descriptor(&dir, unit)?;
            for source in &sources {
                copy_aux_files(&source.path, &dir)?;
            }
        }

        for source in &sources {
            fs::remove_dir_all(&source.path).map_err(|e| {
                Error::operation("remove_source", format!("{}: {e}", source.path.display()))
            })?;
        }
        for unit in &staged {
            let from = staging.join(unit.id.as_str());
            let to = self.unit_dir(&unit.id);
            fs::rename(&from, &to).map_err(|e| {
                Error::operation("install_target", format!("{}: {e}", to.display()))
            })?;
        }
        if staging.exists() {
            fs::remove_dir_all(&staging)
                .map_err(|e| Error::operation("remove_staging", e))?;
        }
        Ok(())
    }

    fn validate_targets(
        &self,
        op: &RestructureOp,
    ) -> std::result::Result<(), (Vec<String>, Error)> {
        let mut violations = Vec::new();
        let mut first_failed: Option<&UnitId> = None;

        for target in &op.targets {
            let dir = self.unit_dir(target);
            let found = match self.extractor.load_unit(&dir) {
                Ok(unit) => unit,
                Err(e) => {
                    violations.push(format!("{target}: {e}"));
                    first_failed.get_or_insert(target);
                    continue;
                },
            };
            let Some(unit) = found else {
                violations.push(format!("{target}: descriptor missing"));
                first_failed.get_or_insert(target);
                continue;
            };
            let candidate = UnitCandidate {
                dir_name: target.to_string(),
                unit,
            };
            let outcome = self.validator.validate(&candidate);
            if !outcome.passed {
                first_failed.get_or_insert(target);
                violations.extend(outcome.violations);
            }
        }

        match first_failed {
            None => Ok(()),
            Some(unit) => {
                let err = Error::ValidationFailure {
                    unit: unit.to_string(),
                    violations: violations.join("; "),
                };
                Err((violations, err))
            },
        }
    }

    fn roll_back(&self, report: &mut OpReport, manifest: &ArchiveManifest, cause: &Error) {
        let op_id = report.op.id.clone();
        tracing::warn!(op_id = %op_id, error = %cause, "Rolling back op");
        report.op.status = OpStatus::Failed;
        report.record_error(cause);

        match self.undo(&report.op, manifest) {
            Ok(()) => {
                advance(&mut report.op, OpStatus::RolledBack);
                report.issues.push(RunIssue::new(
                    IssueKind::RolledBack,
                    op_id,
                    format!("restored {} unit(s) from archive", manifest.units.len()),
                ));
            },
            Err(e) => {
                let err = Error::RollbackFailed {
                    op: op_id.clone(),
                    cause: e.to_string(),
                };
                tracing::error!(op_id = %op_id, error = %err, "Rollback failed");
                report.issues.push(RunIssue::new(IssueKind::Other, op_id, err.to_string()));
                report.error = Some(err.to_string());
            },
        }
        record_metric(&report.op);
    }

    fn undo(&self, op: &RestructureOp, manifest: &ArchiveManifest) -> Result<()> {
        let staging = self.staging_dir(op);
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| Error::operation("remove_staging", e))?;
        }
        for target in op.targets.iter().filter(|t| !op.sources.contains(t)) {
            let dir = self.unit_dir(target);
            if dir.exists() {
                fs::remove_dir_all(&dir).map_err(|e| {
                    Error::operation("remove_target", format!("{}: {e}", dir.display()))
                })?;
            }
        }
        self.archive.restore(manifest)
    }
}

fn advance(op: &mut RestructureOp, status: OpStatus) {
    tracing::debug!(op_id = %op.id, from = %op.status, to = %status, "Op status");
    op.status = status;
}

fn record_metric(op: &RestructureOp) {
    metrics::counter!(
        "curator_restructure_ops_total",
        "kind" => op.kind.as_str(),
        "status" => op.status.as_str()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Approval, ClusterId, Confidence, DecisionRow, Verdict, VerdictKind};
    use tempfile::TempDir;

    fn write_unit(root: &Path, id: &str, triggers: &[&str], body: &str) {
        let dir = root.join(id);
        fs::create_dir_all(&dir).unwrap();
        let triggers = triggers
            .iter()
            .map(|t| format!("  - {t}\n"))
            .collect::<String>();
        fs::write(
            dir.join(DESCRIPTOR_FILE),
            format!("---\nname: {id}\ndescription: About {id}.\ntriggers:\n{triggers}allowed-tools: Bash, Read\n---\n{body}\n"),
        )
        .unwrap();
    }

    fn merge_op(a: &str, b: &str, target: &str) -> RestructureOp {
        let verdict = Verdict::new(
            UnitId::new(a),
            UnitId::new(b),
            VerdictKind::Merge,
            Confidence::High,
            "",
        )
        .with_proposed_id(target);
        let row = DecisionRow {
            row_id: DecisionRow::make_id(&ClusterId::new("c-1"), &verdict.units),
            cluster_id: ClusterId::new("c-1"),
            verdict,
            approval: Some(Approval {
                approved_by: "tester".to_string(),
                approved_at: chrono::Utc::now(),
            }),
        };
        RestructureOp::from_row(&row).unwrap().unwrap()
    }

    fn executor(tmp: &TempDir, max_body_lines: usize) -> RestructuringExecutor {
        RestructuringExecutor::new(
            tmp.path(),
            tmp.path().join(".archive"),
            Box::new(DefaultValidator::new(max_body_lines)),
        )
    }

    #[test]
    fn test_merge_validates_and_removes_sources() {
        let tmp = TempDir::new().unwrap();
        write_unit(tmp.path(), "a", &["edit pdf"], "A body");
        write_unit(tmp.path(), "b", &["Edit PDF", "merge pdf"], "B body");

        let report = executor(&tmp, 500).execute(merge_op("a", "b", "pdf"));
        assert_eq!(report.op.status, OpStatus::Validated, "{:?}", report.error);
        assert!(!tmp.path().join("a").exists());
        assert!(!tmp.path().join("b").exists());
        assert!(!tmp.path().join(format!(".staging-{}", report.op.id)).exists());

        let merged = MetadataExtractor::new()
            .load_unit(&tmp.path().join("pdf"))
            .unwrap()
            .unwrap();
        assert_eq!(merged.triggers, vec!["edit pdf", "merge pdf"]);
        assert_eq!(merged.tools, vec!["Bash", "Read"]);
    }

    #[test]
    fn test_size_explosion_rolls_back() {
        let tmp = TempDir::new().unwrap();
        write_unit(tmp.path(), "a", &["edit pdf"], "one\ntwo");
        write_unit(tmp.path(), "b", &["merge pdf"], "three\nfour");
        let before = fs::read(tmp.path().join("a").join(DESCRIPTOR_FILE)).unwrap();

        let report = executor(&tmp, 3).execute(merge_op("a", "b", "pdf"));
        assert_eq!(report.op.status, OpStatus::RolledBack);
        assert!(report.violations[0].starts_with("size explosion"));
        assert!(!tmp.path().join("pdf").exists());
        assert_eq!(
            fs::read(tmp.path().join("a").join(DESCRIPTOR_FILE)).unwrap(),
            before
        );
        let kinds: Vec<IssueKind> = report.issues.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![IssueKind::ValidationFailure, IssueKind::RolledBack]);
    }

    #[test]
    fn test_existing_target_is_refused_before_archival() {
        let tmp = TempDir::new().unwrap();
        write_unit(tmp.path(), "a", &["x y"], "A");
        write_unit(tmp.path(), "b", &["x z"], "B");
        write_unit(tmp.path(), "taken", &["q r"], "T");

        let report = executor(&tmp, 500).execute(merge_op("a", "b", "taken"));
        assert_eq!(report.op.status, OpStatus::Failed);
        assert!(report.archive_dir.is_none());
        assert!(!tmp.path().join(".archive").exists());
        assert!(tmp.path().join("a").exists());
    }

    #[test]
    fn test_batch_rejects_overlap_and_runs_disjoint() {
        let tmp = TempDir::new().unwrap();
        for id in ["a", "b", "c", "d"] {
            write_unit(tmp.path(), id, &[&format!("use {id}")], id);
        }
        let ops = vec![
            merge_op("a", "b", "ab"),
            merge_op("b", "c", "bc"),
            merge_op("c", "d", "cd"),
        ];
        let report = executor(&tmp, 500).execute_batch(ops);
        let statuses: Vec<OpStatus> = report.ops.iter().map(|r| r.op.status).collect();
        assert_eq!(
            statuses,
            vec![OpStatus::Validated, OpStatus::Queued, OpStatus::Validated]
        );
        assert_eq!(report.issues[0].kind, IssueKind::ConcurrencyConflict);
        assert!(report.issues[0].cause.contains("[b]"));
    }

    #[test]
    fn test_plan_skips_keep_and_unapproved() {
        let mut table = DecisionTable::new();
        let rows = [
            ("a", "b", VerdictKind::Merge),
            ("c", "d", VerdictKind::Keep),
            ("e", "f", VerdictKind::Merge),
        ];
        for (a, b, kind) in rows {
            let verdict =
                Verdict::new(UnitId::new(a), UnitId::new(b), kind, Confidence::High, "");
            table.rows.push(DecisionRow {
                row_id: DecisionRow::make_id(&ClusterId::new("c-1"), &verdict.units),
                cluster_id: ClusterId::new("c-1"),
                verdict,
                approval: None,
            });
        }
        table.approve("c-1/a+b", "me").unwrap();
        table.approve("c-1/c+d", "me").unwrap();

        let (ops, issues) = RestructuringExecutor::plan(&table);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].row_id, "c-1/a+b");
        assert!(issues.is_empty());
    }
}
