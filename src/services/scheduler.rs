//! Evaluation scheduler.
//!
//! Runs the fixed three-role review for every cluster:
//!
//! ```text
//! Consolidator ──┐
//!                ├──▶ Synthesizer
//! Preservationist┘
//! ```
//!
//! The two predecessors start together and never see each other's output.
//! The synthesizer starts only once both have completed; otherwise it is
//! skipped and the cluster is inconclusive. Each cluster pipeline runs in its
//! own task behind a semaphore bulkhead, so a failure, timeout or panic in one
//! cluster never delays or alters another. A panicking evaluator call is
//! recorded as a failed task, so its sibling's output is kept.

use crate::config::SchedulerConfig;
use crate::evaluator::{Evaluator, prompts};
use crate::models::{
    Cluster, ClusterEvaluation, ClusterId, ClusterOutcome, EvaluationRequest, EvaluatorRole,
    InconclusiveReason, InventorySnapshot, PairScore, PriorOutputs, TaskRecord, TaskState,
    UnitExcerpt, UnitId,
};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, instrument};

/// Owned inputs of one cluster pipeline.
#[derive(Debug, Clone)]
struct ClusterJob {
    cluster_id: ClusterId,
    unit_ids: Vec<UnitId>,
    unit_excerpts: Vec<UnitExcerpt>,
    pair_scores: Vec<PairScore>,
}

impl ClusterJob {
    fn new(cluster: &Cluster, snapshot: &InventorySnapshot) -> Self {
        Self {
            cluster_id: cluster.id.clone(),
            unit_ids: cluster.members.clone(),
            unit_excerpts: cluster
                .members
                .iter()
                .filter_map(|id| snapshot.get(id))
                .map(UnitExcerpt::from)
                .collect(),
            pair_scores: cluster
                .edges
                .iter()
                .map(|edge| PairScore {
                    pair: edge.pair.clone(),
                    score: edge.score,
                    domain: edge.sub_scores.domain,
                })
                .collect(),
        }
    }

    fn request(&self, role: EvaluatorRole, prior: Option<PriorOutputs>) -> EvaluationRequest {
        EvaluationRequest {
            role,
            cluster_id: self.cluster_id.clone(),
            unit_ids: self.unit_ids.clone(),
            unit_excerpts: self.unit_excerpts.clone(),
            pair_scores: self.pair_scores.clone(),
            prior_outputs: prior.map(Box::new),
            instructions: prompts::brief_for(role),
        }
    }
}

/// Fans the three-role review out across clusters with bounded concurrency.
pub struct EvaluationScheduler {
    evaluator: Arc<dyn Evaluator>,
    config: SchedulerConfig,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl EvaluationScheduler {
    /// Creates a scheduler around an evaluator backend.
    #[must_use]
    pub fn new(evaluator: Arc<dyn Evaluator>, config: SchedulerConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_clusters.max(1)));
        Self {
            evaluator,
            config,
            semaphore,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses an externally owned cancellation token, such as one wired to Ctrl-C.
    #[must_use]
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Returns the scheduler configuration.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Returns the number of idle cluster slots.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Returns a token that aborts the run when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Aborts pipelines that have not started and tasks that are in flight.
    pub fn abort(&self) {
        tracing::warn!("Evaluation aborted");
        self.cancel.cancel();
    }

    /// Evaluates every cluster and returns one result per cluster, in input order.
    #[instrument(skip(self, snapshot, clusters), fields(cluster_count = clusters.len(), evaluator = self.evaluator.name()))]
    pub async fn run(
        &self,
        snapshot: &InventorySnapshot,
        clusters: &[Cluster],
    ) -> Vec<ClusterEvaluation> {
        let timeout = Duration::from_millis(self.config.task_timeout_ms);
        let mut handles = Vec::with_capacity(clusters.len());

        for cluster in clusters {
            let job = ClusterJob::new(cluster, snapshot);
            let evaluator = Arc::clone(&self.evaluator);
            let semaphore = Arc::clone(&self.semaphore);
            let cancel = self.cancel.clone();
            let span = tracing::info_span!("cluster_pipeline", cluster_id = %cluster.id);

            let handle = tokio::spawn(
                async move {
                    let permit = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        permit = semaphore.acquire_owned() => permit.ok(),
                    };
                    let Some(_permit) = permit else {
                        return never_started(job.cluster_id);
                    };
                    run_pipeline(evaluator.as_ref(), &job, timeout, &cancel).await
                }
                .instrument(span),
            );
            handles.push((cluster.id.clone(), handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (cluster_id, handle) in handles {
            match handle.await {
                Ok(evaluation) => results.push(evaluation),
                Err(e) => {
                    tracing::error!(cluster_id = %cluster_id, error = %e, "Cluster pipeline crashed");
                    results.push(crashed(cluster_id));
                },
            }
        }

        let inconclusive = results.iter().filter(|r| r.is_inconclusive()).count();
        tracing::info!(
            clusters = results.len(),
            inconclusive,
            "Evaluation complete"
        );
        results
    }
}

async fn run_pipeline(
    evaluator: &dyn Evaluator,
    job: &ClusterJob,
    timeout: Duration,
    cancel: &CancellationToken,
) -> ClusterEvaluation {
    let (consolidator, preservationist) = tokio::join!(
        run_task(evaluator, job.request(EvaluatorRole::Consolidator, None), timeout, cancel),
        run_task(evaluator, job.request(EvaluatorRole::Preservationist, None), timeout, cancel),
    );

    let synthesizer = match (consolidator.state.output(), preservationist.state.output()) {
        (Some(c), Some(p)) => {
            let prior = PriorOutputs {
                consolidator: c.clone(),
                preservationist: p.clone(),
            };
            run_task(
                evaluator,
                job.request(EvaluatorRole::Synthesizer, Some(prior)),
                timeout,
                cancel,
            )
            .await
        },
        _ => {
            tracing::debug!("Skipping synthesis after predecessor failure");
            finish(EvaluatorRole::Synthesizer, TaskState::Skipped, 0)
        },
    };

    let outcome = match &synthesizer.state {
        TaskState::Completed { output } => ClusterOutcome::Concluded {
            synthesis: output.clone(),
        },
        _ => {
            let cancelled = [&consolidator, &preservationist, &synthesizer]
                .iter()
                .any(|t| t.state == TaskState::Cancelled);
            let reason = if cancelled {
                InconclusiveReason::Cancelled
            } else if synthesizer.state == TaskState::Skipped {
                InconclusiveReason::PredecessorFailed
            } else {
                InconclusiveReason::SynthesisFailed
            };
            ClusterOutcome::Inconclusive { reason }
        },
    };

    ClusterEvaluation {
        cluster_id: job.cluster_id.clone(),
        tasks: vec![consolidator, preservationist, synthesizer],
        outcome,
    }
}

async fn run_task(
    evaluator: &dyn Evaluator,
    request: EvaluationRequest,
    timeout: Duration,
    cancel: &CancellationToken,
) -> TaskRecord {
    let role = request.role;
    if cancel.is_cancelled() {
        return finish(role, TaskState::Cancelled, 0);
    }

    let start = Instant::now();
    tracing::debug!(role = %role, "Task running");
    let state = tokio::select! {
        biased;
        () = cancel.cancelled() => TaskState::Cancelled,
        result = tokio::time::timeout(
            timeout,
            AssertUnwindSafe(evaluator.evaluate(request)).catch_unwind(),
        ) => match result {
            Ok(Ok(Ok(output))) => TaskState::Completed { output },
            Ok(Ok(Err(e))) => TaskState::Failed { cause: e.to_string() },
            Ok(Err(panic)) => TaskState::Failed {
                cause: format!("evaluator panicked: {}", panic_message(panic.as_ref())),
            },
            Err(_) => TaskState::TimedOut,
        },
    };
    let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    match &state {
        TaskState::Failed { cause } => {
            tracing::warn!(role = %role, cause = %cause, "Task failed");
        },
        TaskState::TimedOut => {
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            tracing::warn!(role = %role, timeout_ms, "Task timed out");
        },
        _ => {},
    }
    finish(role, state, elapsed_ms)
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn finish(role: EvaluatorRole, state: TaskState, elapsed_ms: u64) -> TaskRecord {
    metrics::counter!(
        "curator_evaluation_tasks_total",
        "role" => role.as_str(),
        "state" => state.label()
    )
    .increment(1);
    TaskRecord {
        role,
        state,
        elapsed_ms,
    }
}

fn never_started(cluster_id: ClusterId) -> ClusterEvaluation {
    ClusterEvaluation {
        cluster_id,
        tasks: vec![
            finish(EvaluatorRole::Consolidator, TaskState::Cancelled, 0),
            finish(EvaluatorRole::Preservationist, TaskState::Cancelled, 0),
            finish(EvaluatorRole::Synthesizer, TaskState::Skipped, 0),
        ],
        outcome: ClusterOutcome::Inconclusive {
            reason: InconclusiveReason::Cancelled,
        },
    }
}

fn crashed(cluster_id: ClusterId) -> ClusterEvaluation {
    ClusterEvaluation {
        cluster_id,
        tasks: vec![
            TaskRecord::pending(EvaluatorRole::Consolidator),
            TaskRecord::pending(EvaluatorRole::Preservationist),
            TaskRecord::pending(EvaluatorRole::Synthesizer),
        ],
        outcome: ClusterOutcome::Inconclusive {
            reason: InconclusiveReason::PipelinePanicked,
        },
    }
}
