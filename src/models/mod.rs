//! Data models for curator.
//!
//! This module contains the core data structures passed between pipeline stages.

mod cluster;
mod evaluation;
mod inventory;
mod issue;
mod restructure;
mod similarity;
mod unit;
mod verdict;

pub use cluster::{Cluster, ClusterId};
pub use evaluation::{
    ClusterEvaluation, ClusterOutcome, EvaluationOutput, EvaluationRequest, EvaluatorRole,
    InconclusiveReason, PairScore, PriorOutputs, TaskRecord, TaskState, UnitExcerpt,
};
pub use inventory::InventorySnapshot;
pub use issue::{IssueKind, RunIssue};
pub use restructure::{OpKind, OpStatus, RestructureOp};
pub use similarity::{SimilarityEdge, SubScores, ordered_pair};
pub use unit::{AudienceMode, Unit, UnitId, UnitKind, count_body_lines};
pub use verdict::{
    Approval, Confidence, DecisionRow, DecisionTable, DroppedVerdict, InconclusiveCluster,
    SplitPart, Verdict, VerdictKind,
};
