//! Property-based tests for scoring, clustering and phrase normalization.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use curator::config::ScoringWeights;
use curator::services::keywords::normalize_phrase;
use curator::{ClusterBuilder, SimilarityScorer, Unit, UnitId};
use proptest::prelude::*;
use std::collections::HashSet;

const WORDS: &[&str] = &[
    "edit", "merge", "pdf", "docx", "email", "subject", "copy", "deploy", "review", "draft",
];
const TOOLS: &[&str] = &["Bash", "Read", "Write", "Edit", "Grep"];

fn phrase() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(WORDS), 1..4).prop_map(|words| words.join(" "))
}

fn unit_strategy(id: String) -> impl Strategy<Value = Unit> {
    (
        prop::collection::vec(phrase(), 0..4),
        prop::collection::vec(prop::sample::select(TOOLS), 0..3),
        phrase(),
        prop::collection::vec(phrase(), 0..5),
    )
        .prop_map(move |(triggers, tools, description, body)| {
            Unit::new(id.as_str())
                .with_triggers(triggers)
                .with_tools(tools)
                .with_description(description)
                .with_body(body.join("\n"))
        })
}

fn inventory() -> impl Strategy<Value = Vec<Unit>> {
    (2_usize..8).prop_flat_map(|n| {
        (0..n)
            .map(|i| unit_strategy(format!("unit-{i}")))
            .collect::<Vec<_>>()
    })
}

proptest! {
    #[test]
    fn prop_score_is_symmetric_and_bounded(units in inventory()) {
        let scorer = SimilarityScorer::new(ScoringWeights::default());
        let a = &units[0];
        let b = &units[1];
        let ab = scorer.score(a, b);
        let ba = scorer.score(b, a);
        prop_assert_eq!(ab.is_some(), ba.is_some());
        if let (Some(ab), Some(ba)) = (ab, ba) {
            prop_assert!((ab.score - ba.score).abs() < 1e-12);
            prop_assert!((0.0..=1.0).contains(&ab.score));
            prop_assert_eq!(ab.pair, ba.pair);
        }
    }

    #[test]
    fn prop_self_pair_is_never_scored(units in inventory()) {
        let scorer = SimilarityScorer::new(ScoringWeights::default());
        prop_assert!(scorer.score(&units[0], &units[0]).is_none());
    }

    #[test]
    fn prop_clustering_is_deterministic_and_disjoint(
        units in inventory(),
        threshold in 0.05_f64..0.95,
    ) {
        let edges = SimilarityScorer::new(ScoringWeights::default()).score_all(&units);
        let ids: Vec<UnitId> = units.iter().map(|u| u.id.clone()).collect();
        let builder = ClusterBuilder::new(threshold);

        let first = builder.build(&ids, &edges);
        let mut reversed = edges.clone();
        reversed.reverse();
        let second = builder.build(&ids, &reversed);
        prop_assert_eq!(&first, &second);

        let mut seen = HashSet::new();
        for cluster in &first {
            prop_assert!(cluster.len() >= 2);
            for member in &cluster.members {
                prop_assert!(seen.insert(member.clone()), "{} in two clusters", member);
            }
        }
    }

    #[test]
    fn prop_raising_threshold_never_grows_clusters(units in inventory()) {
        let edges = SimilarityScorer::new(ScoringWeights::default()).score_all(&units);
        let ids: Vec<UnitId> = units.iter().map(|u| u.id.clone()).collect();
        let loose: usize = ClusterBuilder::new(0.2).build(&ids, &edges).iter().map(|c| c.len()).sum();
        let strict: usize = ClusterBuilder::new(0.6).build(&ids, &edges).iter().map(|c| c.len()).sum();
        prop_assert!(strict <= loose);
    }

    #[test]
    fn prop_normalize_phrase_is_idempotent(raw in "[ A-Za-z'\"-]{0,40}") {
        let once = normalize_phrase(&raw);
        prop_assert_eq!(normalize_phrase(&once), once);
    }
}
