//! End-to-end analysis scenarios over on-disk inventories.
//!
//! Each test writes a small inventory into a temp directory and drives the
//! public pipeline: analyze, evaluate, aggregate and, where a verdict is
//! approved, restructure and re-verify.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use curator::config::{AnalysisConfig, SchedulerConfig};
use curator::evaluator::HeuristicEvaluator;
use curator::models::{
    Confidence, DecisionRow, DecisionTable, EvaluatorRole, IssueKind, OpStatus, Verdict,
    VerdictKind,
};
use curator::services::restructure::DefaultValidator;
use curator::{
    AnalysisService, ClusterId, EvaluationScheduler, Error, RestructureOp, RestructuringExecutor,
    UnitId, VerdictAggregator,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const EMAIL_DESCRIPTION: &str = "Use when asked to \"write email subject\" or \"write email copy\".";

fn write_descriptor(root: &Path, dir: &str, text: &str) {
    let path = root.join(dir);
    fs::create_dir_all(&path).unwrap();
    fs::write(path.join("SKILL.md"), text).unwrap();
}

fn write_unit(root: &Path, id: &str, description: &str, tools: &str, body: &str) {
    write_descriptor(
        root,
        id,
        &format!("---\nname: {id}\ndescription: '{description}'\nallowed-tools: {tools}\n---\n{body}\n"),
    );
}

fn email_inventory() -> TempDir {
    let tmp = TempDir::new().unwrap();
    write_unit(tmp.path(), "email-subject-writer", EMAIL_DESCRIPTION, "Write", "Write email copy.");
    write_unit(tmp.path(), "email-body-writer", EMAIL_DESCRIPTION, "Write", "Write email copy.");
    tmp
}

fn service() -> AnalysisService {
    AnalysisService::new(AnalysisConfig::default())
}

#[test]
fn test_distinct_document_tools_do_not_cluster() {
    let tmp = TempDir::new().unwrap();
    write_unit(
        tmp.path(),
        "pdf-tools",
        "Use when the user says \"edit pdf\" or \"merge pdf\".",
        "Bash, Read",
        "Edit and merge PDF documents.",
    );
    write_unit(
        tmp.path(),
        "docx-tools",
        "Use when the user says \"edit docx\".",
        "Bash, Read",
        "Edit DOCX documents.",
    );

    let report = service().analyze(tmp.path()).unwrap();
    assert_eq!(report.total_units, 2);
    assert!(report.clusters.is_empty());
    assert!(report.issues.is_empty());
}

#[test]
fn test_identical_email_writers_form_one_cluster() {
    let tmp = email_inventory();
    let report = service().analyze(tmp.path()).unwrap();

    assert_eq!(report.clusters.len(), 1);
    let cluster = &report.clusters[0];
    assert_eq!(
        cluster.members,
        vec![
            UnitId::new("email-body-writer"),
            UnitId::new("email-subject-writer")
        ]
    );
    assert!(cluster.strongest_edge().unwrap().score >= 0.9);
}

#[test]
fn test_empty_inventory_has_no_clusters() {
    let tmp = TempDir::new().unwrap();
    let report = service().analyze(tmp.path()).unwrap();
    assert_eq!(report.total_units, 0);
    assert!(report.clusters.is_empty());
    assert!(report.overlaps.is_empty());
}

#[test]
fn test_missing_root_is_unreadable() {
    let tmp = TempDir::new().unwrap();
    let result = service().analyze(&tmp.path().join("nowhere"));
    assert!(matches!(result, Err(Error::InventoryUnreadable { .. })));
}

#[test]
fn test_unreadable_unit_is_excluded_and_run_continues() {
    let tmp = email_inventory();
    let bad = tmp.path().join("broken");
    fs::create_dir_all(&bad).unwrap();
    fs::write(bad.join("SKILL.md"), [0xc3, 0x28, 0xa0, 0xa1]).unwrap();

    let report = service().analyze(tmp.path()).unwrap();
    assert_eq!(report.total_units, 2);
    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].subject, "broken");
    assert_eq!(report.issues[0].kind, IssueKind::Parse);
}

#[tokio::test]
async fn test_email_pair_is_recommended_for_merge() {
    let tmp = email_inventory();
    let (snapshot, report) = service().scan_and_analyze(tmp.path()).unwrap();

    let scheduler =
        EvaluationScheduler::new(Arc::new(HeuristicEvaluator::new()), SchedulerConfig::default());
    let evaluations = scheduler.run(&snapshot, &report.clusters).await;
    assert_eq!(evaluations.len(), 1);

    let consolidator = evaluations[0]
        .task(EvaluatorRole::Consolidator)
        .and_then(|task| task.state.output())
        .unwrap();
    assert!(consolidator.merge_score.unwrap() >= 5);

    let aggregation = VerdictAggregator::new().aggregate(&snapshot, &report.clusters, &evaluations);
    assert!(aggregation.issues.is_empty());
    let rows = &aggregation.table.rows;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].verdict.kind, VerdictKind::Merge);
    assert_eq!(rows[0].verdict.proposed_id, Some(UnitId::new("email")));
    assert!(rows[0].approval.is_none());
}

#[tokio::test]
async fn test_approved_merge_resolves_cluster_on_reverification() {
    let tmp = email_inventory();
    let archive = TempDir::new().unwrap();
    let service = service();
    let (snapshot, report) = service.scan_and_analyze(tmp.path()).unwrap();

    let scheduler =
        EvaluationScheduler::new(Arc::new(HeuristicEvaluator::new()), SchedulerConfig::default());
    let evaluations = scheduler.run(&snapshot, &report.clusters).await;
    let mut table = VerdictAggregator::new()
        .aggregate(&snapshot, &report.clusters, &evaluations)
        .table;

    let (unapproved, _) = RestructuringExecutor::plan(&table);
    assert!(unapproved.is_empty());

    let row_id = table.rows[0].row_id.clone();
    table.approve(&row_id, "reviewer").unwrap();
    let (ops, issues) = RestructuringExecutor::plan(&table);
    assert!(issues.is_empty());

    let executor = RestructuringExecutor::new(
        tmp.path(),
        archive.path(),
        Box::new(DefaultValidator::default()),
    );
    let execution = executor.execute_batch(ops);
    assert_eq!(execution.ops[0].op.status, OpStatus::Validated);
    assert!(tmp.path().join("email").join("SKILL.md").is_file());
    assert!(!tmp.path().join("email-body-writer").exists());

    let touched: Vec<UnitId> = execution
        .validated()
        .flat_map(RestructureOp::touched_units)
        .collect();
    let verification = service.verify(tmp.path(), &touched).unwrap();
    assert!(verification.converged);
    assert_eq!(verification.report.total_units, 1);
    assert!(verification.report.clusters.is_empty());
}

#[test]
fn test_merged_unit_still_overlapping_is_not_converged() {
    let tmp = email_inventory();
    write_unit(tmp.path(), "email-footer-writer", EMAIL_DESCRIPTION, "Write", "Write email copy.");
    let archive = TempDir::new().unwrap();

    let verdict = Verdict::new(
        UnitId::new("email-body-writer"),
        UnitId::new("email-subject-writer"),
        VerdictKind::Merge,
        Confidence::High,
        "same triggers",
    )
    .with_proposed_id("email");
    let cluster = ClusterId::new("c-000000000001");
    let mut table = DecisionTable::new();
    let row_id = DecisionRow::make_id(&cluster, &verdict.units);
    table.rows.push(DecisionRow {
        row_id: row_id.clone(),
        cluster_id: cluster,
        verdict,
        approval: None,
    });
    table.approve(&row_id, "reviewer").unwrap();
    let (ops, _) = RestructuringExecutor::plan(&table);

    let execution = RestructuringExecutor::new(
        tmp.path(),
        archive.path(),
        Box::new(DefaultValidator::default()),
    )
    .execute_batch(ops);
    assert_eq!(execution.ops[0].op.status, OpStatus::Validated);

    let touched: Vec<UnitId> = execution
        .validated()
        .flat_map(RestructureOp::touched_units)
        .collect();
    let verification = service().verify(tmp.path(), &touched).unwrap();
    assert!(!verification.converged);
    assert_eq!(verification.reappeared.len(), 1);
    let remaining = &verification.report.clusters[0];
    assert_eq!(remaining.id, verification.reappeared[0]);
    assert_eq!(
        remaining.members,
        vec![UnitId::new("email"), UnitId::new("email-footer-writer")]
    );
}
