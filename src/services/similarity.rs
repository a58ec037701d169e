//! Pairwise similarity scoring.
//!
//! Five lexical signals are compared per pair of units, each as a Jaccard
//! index in `0.0..=1.0`:
//!
//! | Signal | Compared sets |
//! |--------|---------------|
//! | trigger | tokens of all trigger phrases |
//! | workflow | body keywords |
//! | tools | declared tool names |
//! | domain | objects the unit operates on |
//! | keyword | description keywords |
//!
//! The composite is the weighted mean of the signals.

use crate::config::ScoringWeights;
use crate::models::{SimilarityEdge, SubScores, Unit, ordered_pair};
use crate::services::keywords::{
    is_generic_domain_word, jaccard, keywords, normalize_phrase, tokens,
};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::instrument;

/// Maximum shared keywords recorded on an edge.
const MAX_SHARED_KEYWORDS: usize = 10;

/// Pre-computed comparison sets for one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitFeatures {
    /// Normalized trigger phrases.
    pub triggers: BTreeSet<String>,
    /// Tokens of all trigger phrases.
    pub trigger_tokens: BTreeSet<String>,
    /// Body keywords.
    pub body_keywords: BTreeSet<String>,
    /// Tool names.
    pub tools: BTreeSet<String>,
    /// Domain objects.
    pub domain: BTreeSet<String>,
    /// Description keywords.
    pub description_keywords: BTreeSet<String>,
}

impl UnitFeatures {
    /// Extracts the comparison sets of a unit.
    #[must_use]
    pub fn of(unit: &Unit) -> Self {
        let triggers: BTreeSet<String> = unit
            .triggers
            .iter()
            .map(|t| normalize_phrase(t))
            .filter(|t| !t.is_empty())
            .collect();
        let trigger_tokens = unit.triggers.iter().flat_map(|t| tokens(t)).collect();
        let tools = unit
            .tools
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        Self {
            triggers,
            trigger_tokens,
            body_keywords: keywords(&unit.body),
            tools,
            domain: domain_objects(unit),
            description_keywords: keywords(&unit.description),
        }
    }
}

/// Derives the objects a unit operates on.
///
/// Uses the declared domain list when present; otherwise every trigger token
/// after the leading verb plus the identifier segments. Packaging words such
/// as `tools` or `helper` are dropped.
#[must_use]
pub fn domain_objects(unit: &Unit) -> BTreeSet<String> {
    let candidates: Vec<String> = if unit.domain.is_empty() {
        unit.triggers
            .iter()
            .flat_map(|t| tokens(t).into_iter().skip(1))
            .chain(unit.id.segments().map(str::to_lowercase))
            .collect()
    } else {
        unit.domain.iter().map(|d| normalize_phrase(d)).collect()
    };
    candidates
        .into_iter()
        .filter(|word| !word.is_empty() && !is_generic_domain_word(word))
        .collect()
}

/// Computes weighted similarity edges between units.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityScorer {
    weights: ScoringWeights,
}

impl SimilarityScorer {
    /// Creates a scorer with the given weights.
    #[must_use]
    pub const fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Returns the weights in use.
    #[must_use]
    pub const fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Scores two units.
    ///
    /// Returns `None` when both carry the same identifier; a unit is never
    /// compared with itself.
    #[must_use]
    pub fn score(&self, a: &Unit, b: &Unit) -> Option<SimilarityEdge> {
        if a.id == b.id {
            return None;
        }
        Some(self.score_features(a, &UnitFeatures::of(a), b, &UnitFeatures::of(b)))
    }

    /// Scores every distinct pair, in ascending pair order for sorted input.
    #[instrument(skip(self, units), fields(unit_count = units.len()))]
    #[allow(clippy::cast_precision_loss)]
    pub fn score_all(&self, units: &[Unit]) -> Vec<SimilarityEdge> {
        let start = Instant::now();
        let features: Vec<UnitFeatures> = units.iter().map(UnitFeatures::of).collect();

        let mut edges = Vec::with_capacity(units.len().saturating_sub(1) * units.len() / 2);
        for (i, a) in units.iter().enumerate() {
            for (j, b) in units.iter().enumerate().skip(i + 1) {
                if a.id == b.id {
                    continue;
                }
                edges.push(self.score_features(a, &features[i], b, &features[j]));
            }
        }
        edges.sort_by(|x, y| x.pair.cmp(&y.pair));

        metrics::histogram!("curator_scoring_duration_ms")
            .record(start.elapsed().as_millis() as f64);
        tracing::debug!(edge_count = edges.len(), "Scored unit pairs");
        edges
    }

    fn score_features(
        &self,
        a: &Unit,
        fa: &UnitFeatures,
        b: &Unit,
        fb: &UnitFeatures,
    ) -> SimilarityEdge {
        let sub_scores = SubScores {
            trigger: jaccard(&fa.trigger_tokens, &fb.trigger_tokens),
            workflow: jaccard(&fa.body_keywords, &fb.body_keywords),
            tools: jaccard(&fa.tools, &fb.tools),
            domain: jaccard(&fa.domain, &fb.domain),
            keyword: jaccard(&fa.description_keywords, &fb.description_keywords),
        };

        SimilarityEdge {
            pair: ordered_pair(&a.id, &b.id),
            score: self.composite(&sub_scores),
            sub_scores,
            shared_triggers: fa.triggers.intersection(&fb.triggers).cloned().collect(),
            shared_keywords: fa
                .description_keywords
                .intersection(&fb.description_keywords)
                .take(MAX_SHARED_KEYWORDS)
                .cloned()
                .collect(),
        }
    }

    /// Weighted mean of the sub-scores; 0 when every weight is 0.
    #[must_use]
    pub fn composite(&self, s: &SubScores) -> f64 {
        let w = &self.weights;
        let total = w.total();
        if total <= 0.0 {
            return 0.0;
        }
        let weighted = w.trigger.mul_add(
            s.trigger,
            w.workflow.mul_add(
                s.workflow,
                w.domain
                    .mul_add(s.domain, w.tools.mul_add(s.tools, w.keyword * s.keyword)),
            ),
        );
        (weighted / total).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf() -> Unit {
        Unit::new("pdf-tools")
            .with_description(r#"Use when the user says "edit pdf" or "merge pdf"."#)
            .with_triggers(["edit pdf", "merge pdf"])
            .with_tools(["Bash", "Read"])
            .with_body("Edit and merge PDF documents.")
    }

    fn docx() -> Unit {
        Unit::new("docx-tools")
            .with_description(r#"Use when the user says "edit docx"."#)
            .with_triggers(["edit docx"])
            .with_tools(["Bash", "Read"])
            .with_body("Edit DOCX documents.")
    }

    #[test]
    fn test_self_pair_is_never_scored() {
        let scorer = SimilarityScorer::default();
        assert!(scorer.score(&pdf(), &pdf()).is_none());
    }

    #[test]
    fn test_distinct_domains_stay_below_default_threshold() {
        let scorer = SimilarityScorer::new(ScoringWeights::default());
        let edge = scorer.score(&pdf(), &docx()).unwrap();
        assert!((edge.sub_scores.tools - 1.0).abs() < f64::EPSILON);
        assert!(edge.sub_scores.domain.abs() < f64::EPSILON);
        assert!(edge.score < 0.4, "score was {}", edge.score);
        assert_eq!(edge.pair.0.as_str(), "docx-tools");
    }

    #[test]
    fn test_domain_objects_skip_leading_verb_and_generic_words() {
        let domain = domain_objects(&pdf());
        assert_eq!(domain.into_iter().collect::<Vec<_>>(), vec!["pdf"]);
    }

    #[test]
    fn test_declared_domain_wins() {
        let mut unit = pdf();
        unit.domain = vec!["Portable Documents".to_string()];
        let domain = domain_objects(&unit);
        assert_eq!(
            domain.into_iter().collect::<Vec<_>>(),
            vec!["portable documents"]
        );
    }

    #[test]
    fn test_zero_weights_yield_zero() {
        let weights = ScoringWeights {
            trigger: 0.0,
            workflow: 0.0,
            domain: 0.0,
            tools: 0.0,
            keyword: 0.0,
        };
        let edge = SimilarityScorer::new(weights).score(&pdf(), &docx()).unwrap();
        assert!(edge.score.abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_fields_contribute_zero() {
        let scorer = SimilarityScorer::default();
        let edge = scorer.score(&Unit::new("a"), &Unit::new("b")).unwrap();
        assert!(edge.score.abs() < f64::EPSILON);
    }

    #[test]
    fn test_score_all_covers_each_pair_once() {
        let units = vec![docx(), pdf(), Unit::new("zzz")];
        let edges = SimilarityScorer::default().score_all(&units);
        assert_eq!(edges.len(), 3);
        assert!(edges.windows(2).all(|w| w[0].pair < w[1].pair));
    }
}
