//! External process evaluator.

use super::{Evaluator, parse_output};
use crate::models::{EvaluationOutput, EvaluationRequest};
use crate::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::instrument;

/// Evaluator that delegates to an external command.
///
/// The request is written to the child's stdin as JSON; the child replies on
/// stdout with an output object, optionally wrapped in prose or a fenced code
/// block. The child is killed if the task is dropped by a timeout or an abort.
#[derive(Debug, Clone)]
pub struct CommandEvaluator {
    program: String,
    args: Vec<String>,
}

impl CommandEvaluator {
    /// Creates an evaluator that runs `program` with `args`.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn failure(request: &EvaluationRequest, cause: impl std::fmt::Display) -> Error {
        Error::TaskFailure {
            cluster: request.cluster_id.to_string(),
            role: request.role.to_string(),
            cause: cause.to_string(),
        }
    }
}

#[async_trait]
impl Evaluator for CommandEvaluator {
    fn name(&self) -> &'static str {
        "command"
    }

    #[instrument(skip(self, request), fields(program = %self.program, cluster_id = %request.cluster_id, role = %request.role))]
    async fn evaluate(&self, request: EvaluationRequest) -> Result<EvaluationOutput> {
        let payload = serde_json::to_vec(&request)
            .map_err(|e| Error::operation("serialize_evaluation_request", e))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Self::failure(&request, format!("failed to spawn: {e}")))?;

        // Feed stdin while draining stdout, or a chatty child blocks on a full pipe.
        let stdin = child.stdin.take();
        let feed = async move {
            match stdin {
                Some(mut stdin) => stdin.write_all(&payload).await,
                None => Ok(()),
            }
        };
        let (written, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| Self::failure(&request, e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Self::failure(
                &request,
                format!("exited with {}: {}", output.status, stderr.trim()),
            ));
        }
        if let Err(e) = written {
            tracing::debug!(error = %e, "Evaluator closed stdin before reading the request");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed = parse_output(&stdout).map_err(|e| Self::failure(&request, e))?;
        if parsed.role != request.role {
            return Err(Self::failure(
                &request,
                format!("replied as {} instead of {}", parsed.role, request.role),
            ));
        }
        tracing::debug!(score = ?parsed.merge_score, verdicts = parsed.pair_verdicts.len(), "Evaluator replied");
        Ok(parsed)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::{ClusterId, EvaluatorRole, UnitId};

    fn request() -> EvaluationRequest {
        EvaluationRequest {
            role: EvaluatorRole::Consolidator,
            cluster_id: ClusterId::new("c-cmd"),
            unit_ids: vec![UnitId::new("a"), UnitId::new("b")],
            unit_excerpts: Vec::new(),
            pair_scores: Vec::new(),
            prior_outputs: None,
            instructions: String::new(),
        }
    }

    fn shell(script: &str) -> CommandEvaluator {
        CommandEvaluator::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_reads_fenced_reply() {
        let evaluator = shell(
            "cat >/dev/null; printf '```json\\n{\"role\":\"consolidator\",\"merge_score\":6}\\n```\\n'",
        );
        let output = evaluator.evaluate(request()).await.unwrap();
        assert_eq!(output.merge_score, Some(6));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_task_failure() {
        let evaluator = shell("cat >/dev/null; echo boom >&2; exit 3");
        let err = evaluator.evaluate(request()).await.unwrap_err();
        assert!(matches!(err, Error::TaskFailure { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_wrong_role_is_rejected() {
        let evaluator = shell("cat >/dev/null; echo '{\"role\":\"synthesizer\"}'");
        assert!(evaluator.evaluate(request()).await.is_err());
    }

    #[tokio::test]
    async fn test_large_request_with_chatty_child() {
        let mut request = request();
        request.instructions = "x".repeat(1 << 20);
        let evaluator = shell(
            "head -c 262144 /dev/zero | tr '\\0' ' '; cat >/dev/null; printf '{\"role\":\"consolidator\",\"merge_score\":4}'",
        );
        let output = tokio::time::timeout(std::time::Duration::from_secs(20), evaluator.evaluate(request))
            .await
            .expect("evaluator stalled on full pipes")
            .unwrap();
        assert_eq!(output.merge_score, Some(4));
    }
}
