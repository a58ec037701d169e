//! Deterministic evaluator driven by pair scores.

use super::Evaluator;
use crate::models::{
    Confidence, EvaluationOutput, EvaluationRequest, EvaluatorRole, PairScore, UnitId, Verdict,
    VerdictKind,
};
use crate::{Error, Result};
use async_trait::async_trait;

/// Minimum pair merge score for a MERGE verdict.
const MERGE_FLOOR: u8 = 7;

/// Offline evaluator that argues from similarity scores alone.
///
/// - Consolidator: merge score is ten times the strongest pair composite.
/// - Preservationist: keep score is ten times one minus the mean domain overlap.
/// - Synthesizer: per pair, MERGE when the pair's merge score reaches 7, beats
///   its keep score, and the consolidator out-scored the preservationist;
///   KEEP otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEvaluator;

impl HeuristicEvaluator {
    /// Creates a new heuristic evaluator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn consolidate(request: &EvaluationRequest) -> EvaluationOutput {
        let strongest = request
            .pair_scores
            .iter()
            .map(|p| p.score)
            .fold(0.0_f64, f64::max);
        let score = to_scale(strongest);
        EvaluationOutput::new(
            EvaluatorRole::Consolidator,
            Some(score),
            format!(
                "Strongest pair composite is {strongest:.2} across {} units.",
                request.unit_ids.len()
            ),
        )
    }

    #[allow(clippy::cast_precision_loss)]
    fn preserve(request: &EvaluationRequest) -> EvaluationOutput {
        let pairs = &request.pair_scores;
        let mean_domain = if pairs.is_empty() {
            0.0
        } else {
            pairs.iter().map(|p| p.domain).sum::<f64>() / pairs.len() as f64
        };
        let score = to_scale(1.0 - mean_domain);
        EvaluationOutput::new(
            EvaluatorRole::Preservationist,
            Some(score),
            format!("Mean domain-object overlap is {mean_domain:.2}."),
        )
    }

    fn synthesize(request: &EvaluationRequest) -> Result<EvaluationOutput> {
        let prior = request.prior_outputs.as_ref().ok_or_else(|| {
            Error::InvalidInput(format!(
                "synthesis for cluster '{}' needs both prior outputs",
                request.cluster_id
            ))
        })?;
        let merge_case = prior.consolidator.merge_score.unwrap_or(0);
        let keep_case = prior.preservationist.merge_score.unwrap_or(0);

        let pair_verdicts = request
            .pair_scores
            .iter()
            .map(|pair| judge_pair(pair, merge_case >= keep_case))
            .collect::<Vec<_>>();
        let merges = pair_verdicts
            .iter()
            .filter(|v| v.kind == VerdictKind::Merge)
            .count();

        let mut output = EvaluationOutput::new(
            EvaluatorRole::Synthesizer,
            Some(merge_case),
            format!(
                "Merge case {merge_case}/10 against keep case {keep_case}/10; {merges} of {} pairs recommended for merge.",
                pair_verdicts.len()
            ),
        );
        output.pair_verdicts = pair_verdicts;
        Ok(output)
    }
}

fn judge_pair(pair: &PairScore, merge_case_holds: bool) -> Verdict {
    let merge = to_scale(pair.score);
    let keep = to_scale(1.0 - pair.domain);
    let (a, b) = (pair.pair.0.clone(), pair.pair.1.clone());

    if merge_case_holds && merge >= MERGE_FLOOR && merge > keep {
        let proposed = common_prefix_id(&a, &b).unwrap_or_else(|| a.clone());
        Verdict::new(
            a,
            b,
            VerdictKind::Merge,
            confidence_for(merge - keep),
            format!("Merge score {merge}/10 exceeds keep score {keep}/10."),
        )
        .with_proposed_id(proposed)
    } else {
        Verdict::new(
            a,
            b,
            VerdictKind::Keep,
            confidence_for(keep.abs_diff(merge)),
            format!("Keep score {keep}/10 against merge score {merge}/10."),
        )
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_scale(value: f64) -> u8 {
    (value.clamp(0.0, 1.0) * 10.0).round() as u8
}

const fn confidence_for(margin: u8) -> Confidence {
    match margin {
        0..=1 => Confidence::Low,
        2..=3 => Confidence::Medium,
        _ => Confidence::High,
    }
}

/// Longest shared run of leading `-` segments, e.g. `email` for
/// `email-subject-writer` and `email-body-writer`.
fn common_prefix_id(a: &UnitId, b: &UnitId) -> Option<UnitId> {
    let shared: Vec<&str> = a
        .as_str()
        .split('-')
        .zip(b.as_str().split('-'))
        .take_while(|(x, y)| x == y && !x.is_empty())
        .map(|(x, _)| x)
        .collect();
    if shared.is_empty() {
        None
    } else {
        Some(UnitId::new(shared.join("-")))
    }
}

#[async_trait]
impl Evaluator for HeuristicEvaluator {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn evaluate(&self, request: EvaluationRequest) -> Result<EvaluationOutput> {
        match request.role {
            EvaluatorRole::Consolidator => Ok(Self::consolidate(&request)),
            EvaluatorRole::Preservationist => Ok(Self::preserve(&request)),
            EvaluatorRole::Synthesizer => Self::synthesize(&request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClusterId, PriorOutputs};

    fn request(role: EvaluatorRole, score: f64, domain: f64) -> EvaluationRequest {
        EvaluationRequest {
            role,
            cluster_id: ClusterId::new("c-test"),
            unit_ids: vec![
                UnitId::new("email-body-writer"),
                UnitId::new("email-subject-writer"),
            ],
            unit_excerpts: Vec::new(),
            pair_scores: vec![PairScore {
                pair: (
                    UnitId::new("email-body-writer"),
                    UnitId::new("email-subject-writer"),
                ),
                score,
                domain,
            }],
            prior_outputs: None,
            instructions: String::new(),
        }
    }

    #[tokio::test]
    async fn test_consolidator_scales_strongest_pair() {
        let output = HeuristicEvaluator::new()
            .evaluate(request(EvaluatorRole::Consolidator, 0.72, 0.8))
            .await
            .unwrap();
        assert_eq!(output.merge_score, Some(7));
        assert!(output.pair_verdicts.is_empty());
    }

    #[tokio::test]
    async fn test_synthesizer_merges_strong_pair() {
        let evaluator = HeuristicEvaluator::new();
        let consolidator = evaluator
            .evaluate(request(EvaluatorRole::Consolidator, 0.72, 0.8))
            .await
            .unwrap();
        let preservationist = evaluator
            .evaluate(request(EvaluatorRole::Preservationist, 0.72, 0.8))
            .await
            .unwrap();
        assert_eq!(preservationist.merge_score, Some(2));

        let mut synth = request(EvaluatorRole::Synthesizer, 0.72, 0.8);
        synth.prior_outputs = Some(Box::new(PriorOutputs {
            consolidator,
            preservationist,
        }));
        let output = evaluator.evaluate(synth).await.unwrap();
        let verdict = &output.pair_verdicts[0];
        assert_eq!(verdict.kind, VerdictKind::Merge);
        assert_eq!(verdict.confidence, Confidence::High);
        assert_eq!(verdict.proposed_id, Some(UnitId::new("email")));
    }

    #[tokio::test]
    async fn test_synthesizer_without_priors_fails() {
        let result = HeuristicEvaluator::new()
            .evaluate(request(EvaluatorRole::Synthesizer, 0.9, 0.9))
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_weak_pair_is_kept() {
        let pair = PairScore {
            pair: (UnitId::new("docx-tools"), UnitId::new("pdf-tools")),
            score: 0.34,
            domain: 0.0,
        };
        let verdict = judge_pair(&pair, true);
        assert_eq!(verdict.kind, VerdictKind::Keep);
        assert_eq!(verdict.confidence, Confidence::High);
    }

    #[test]
    fn test_common_prefix() {
        assert_eq!(
            common_prefix_id(&UnitId::new("pdf-edit"), &UnitId::new("pdf-merge")),
            Some(UnitId::new("pdf"))
        );
        assert_eq!(
            common_prefix_id(&UnitId::new("alpha"), &UnitId::new("beta")),
            None
        );
    }
}
