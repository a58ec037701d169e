//! Similarity edge types.

use super::UnitId;
use serde::{Deserialize, Serialize};

/// Per-signal similarity components, each normalized to 0.0..=1.0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    /// Token-set overlap of trigger phrases.
    pub trigger: f64,
    /// Keyword overlap of bodies.
    pub workflow: f64,
    /// Overlap of declared tool sets.
    pub tools: f64,
    /// Overlap of the objects each unit operates on.
    pub domain: f64,
    /// Keyword overlap of descriptions.
    pub keyword: f64,
}

/// Undirected similarity relation between two distinct units.
///
/// The pair is always stored in ascending identifier order so that an edge
/// computed for `(a, b)` is identical to one computed for `(b, a)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    /// The two units, ascending.
    pub pair: (UnitId, UnitId),
    /// Weighted composite score (0.0 to 1.0).
    pub score: f64,
    /// Decomposed sub-scores.
    pub sub_scores: SubScores,
    /// Normalized trigger phrases declared by both units.
    pub shared_triggers: Vec<String>,
    /// Up to ten keywords shared by both descriptions.
    pub shared_keywords: Vec<String>,
}

impl SimilarityEdge {
    /// Returns true if the edge touches the given unit.
    #[must_use]
    pub fn touches(&self, id: &UnitId) -> bool {
        &self.pair.0 == id || &self.pair.1 == id
    }

    /// Returns the score rounded to three decimals, as reported.
    #[must_use]
    pub fn rounded_score(&self) -> f64 {
        (self.score * 1000.0).round() / 1000.0
    }
}

/// Orders two identifiers ascending.
#[must_use]
pub fn ordered_pair(a: &UnitId, b: &UnitId) -> (UnitId, UnitId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_pair() {
        let a = UnitId::new("alpha");
        let b = UnitId::new("beta");
        assert_eq!(ordered_pair(&b, &a), (a.clone(), b.clone()));
        assert_eq!(ordered_pair(&a, &b), (a, b));
    }

    #[test]
    fn test_rounded_score() {
        let edge = SimilarityEdge {
            pair: (UnitId::new("a"), UnitId::new("b")),
            score: 0.123_456,
            sub_scores: SubScores::default(),
            shared_triggers: Vec::new(),
            shared_keywords: Vec::new(),
        };
        assert!((edge.rounded_score() - 0.123).abs() < f64::EPSILON);
        assert!(edge.touches(&UnitId::new("b")));
        assert!(!edge.touches(&UnitId::new("c")));
    }
}
