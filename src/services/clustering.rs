//! Threshold clustering of similarity edges.

use crate::models::{Cluster, ClusterId, SimilarityEdge, UnitId};
use std::collections::{BTreeMap, HashMap};
use tracing::instrument;

/// Groups units into connected components of edges at or above a threshold.
#[derive(Debug, Clone, Copy)]
pub struct ClusterBuilder {
    threshold: f64,
}

impl Default for ClusterBuilder {
    fn default() -> Self {
        Self::new(0.4)
    }
}

impl ClusterBuilder {
    /// Creates a builder with the given threshold.
    #[must_use]
    pub const fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Returns the threshold.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Builds clusters from the units and their pairwise edges.
    ///
    /// Singletons are discarded. Members are sorted ascending, clusters are
    /// sorted by their first member, and each cluster carries every input edge
    /// between two of its members, so identical input always yields identical
    /// output.
    #[instrument(skip(self, units, edges), fields(threshold = self.threshold, edge_count = edges.len()))]
    pub fn build(&self, units: &[UnitId], edges: &[SimilarityEdge]) -> Vec<Cluster> {
        let mut index: HashMap<&UnitId, usize> = HashMap::with_capacity(units.len());
        for id in units {
            let next = index.len();
            index.entry(id).or_insert(next);
        }
        let mut sets = DisjointSet::new(index.len());

        for edge in edges.iter().filter(|e| e.score >= self.threshold) {
            if let (Some(&a), Some(&b)) = (index.get(&edge.pair.0), index.get(&edge.pair.1)) {
                sets.union(a, b);
            }
        }

        let mut groups: BTreeMap<usize, Vec<UnitId>> = BTreeMap::new();
        for (id, &i) in &index {
            groups.entry(sets.find(i)).or_default().push((*id).clone());
        }

        let mut clusters: Vec<Cluster> = groups
            .into_values()
            .filter(|members| members.len() > 1)
            .map(|mut members| {
                members.sort();
                let mut internal: Vec<SimilarityEdge> = edges
                    .iter()
                    .filter(|e| {
                        members.binary_search(&e.pair.0).is_ok()
                            && members.binary_search(&e.pair.1).is_ok()
                    })
                    .cloned()
                    .collect();
                internal.sort_by(|a, b| a.pair.cmp(&b.pair));
                Cluster {
                    id: ClusterId::from_members(&members),
                    members,
                    edges: internal,
                }
            })
            .collect();
        clusters.sort_by(|a, b| a.members.cmp(&b.members));

        tracing::debug!(cluster_count = clusters.len(), "Built clusters");
        clusters
    }
}

/// Union-find with path halving and union by size.
struct DisjointSet {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        let (big, small) = if self.size[ra] >= self.size[rb] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[small] = big;
        self.size[big] += self.size[small];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubScores;

    fn edge(a: &str, b: &str, score: f64) -> SimilarityEdge {
        SimilarityEdge {
            pair: (UnitId::new(a), UnitId::new(b)),
            score,
            sub_scores: SubScores::default(),
            shared_triggers: Vec::new(),
            shared_keywords: Vec::new(),
        }
    }

    fn ids(names: &[&str]) -> Vec<UnitId> {
        names.iter().map(|n| UnitId::new(*n)).collect()
    }

    #[test]
    fn test_transitive_components() {
        let units = ids(&["a", "b", "c", "d", "e"]);
        let edges = vec![
            edge("a", "b", 0.5),
            edge("b", "c", 0.41),
            edge("a", "c", 0.1),
            edge("d", "e", 0.39),
        ];
        let clusters = ClusterBuilder::new(0.4).build(&units, &edges);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, ids(&["a", "b", "c"]));
        assert_eq!(clusters[0].edges.len(), 3);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let units = ids(&["a", "b"]);
        let clusters = ClusterBuilder::new(0.4).build(&units, &[edge("a", "b", 0.4)]);
        assert_eq!(clusters.len(), 1);
    }

    #[test]
    fn test_clusters_sorted_by_first_member() {
        let units = ids(&["x", "y", "a", "b"]);
        let edges = vec![edge("x", "y", 0.9), edge("a", "b", 0.9)];
        let clusters = ClusterBuilder::default().build(&units, &edges);
        assert_eq!(clusters[0].members, ids(&["a", "b"]));
        assert_eq!(clusters[1].members, ids(&["x", "y"]));
    }

    #[test]
    fn test_edges_to_unknown_units_are_ignored() {
        let units = ids(&["a"]);
        let clusters = ClusterBuilder::default().build(&units, &[edge("a", "ghost", 1.0)]);
        assert!(clusters.is_empty());
    }
}
