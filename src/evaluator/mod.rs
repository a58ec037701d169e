//! Evaluator backends.
//!
//! An evaluator runs one role of the three-role review for one cluster. The
//! scheduler treats it as opaque: a request goes in, a structured output or an
//! error comes out. Backends:
//!
//! - [`HeuristicEvaluator`]: deterministic and offline, driven by pair scores
//! - [`CommandEvaluator`]: an external process speaking JSON over stdin/stdout

mod command;
mod heuristic;
pub mod prompts;

pub use command::CommandEvaluator;
pub use heuristic::HeuristicEvaluator;

use crate::config::{EvaluatorBackend, EvaluatorConfig};
use crate::models::{EvaluationOutput, EvaluationRequest};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Runs one evaluator role over one cluster.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// The backend name.
    fn name(&self) -> &'static str;

    /// Evaluates a request.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or replies with malformed output.
    async fn evaluate(&self, request: EvaluationRequest) -> Result<EvaluationOutput>;
}

/// Builds the evaluator selected by configuration.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the command backend is selected without a command.
pub fn from_config(config: &EvaluatorConfig) -> Result<Arc<dyn Evaluator>> {
    match config.backend {
        EvaluatorBackend::Heuristic => Ok(Arc::new(HeuristicEvaluator::new())),
        EvaluatorBackend::Command => {
            let program = config.command.clone().ok_or_else(|| {
                Error::InvalidInput("evaluator backend 'command' needs evaluator.command".to_string())
            })?;
            Ok(Arc::new(CommandEvaluator::new(program, config.args.clone())))
        },
    }
}

/// Parses an evaluator reply, tolerating prose and markdown code fences around the JSON.
///
/// # Errors
///
/// Returns an error if no valid output object can be found.
pub fn parse_output(response: &str) -> Result<EvaluationOutput> {
    let json = extract_json_from_response(response);
    serde_json::from_str(json).map_err(|e| Error::operation("parse_evaluator_output", e))
}

/// Extracts JSON from a response that may contain markdown code blocks.
fn extract_json_from_response(response: &str) -> &str {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let json_start = start + 7;
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let content_start = start + 3;
        let json_start = trimmed[content_start..]
            .find('{')
            .map_or(content_start, |pos| content_start + pos);
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }

    trimmed
}
