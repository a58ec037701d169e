//! Cluster types.

use super::{SimilarityEdge, UnitId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identifier of a cluster, derived from its membership.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(String);

impl ClusterId {
    /// Creates a cluster ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives the ID from the (sorted) member identifiers.
    ///
    /// Identical membership always yields the identical ID.
    #[must_use]
    pub fn from_members(members: &[UnitId]) -> Self {
        let mut hasher = Sha256::new();
        for (i, member) in members.iter().enumerate() {
            if i > 0 {
                hasher.update(b"\n");
            }
            hasher.update(member.as_str().as_bytes());
        }
        let digest = hex::encode(hasher.finalize());
        Self(format!("c-{}", &digest[..12]))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A maximal set of units connected through edges at or above the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Membership-derived identifier.
    pub id: ClusterId,
    /// Member identifiers, ascending.
    pub members: Vec<UnitId>,
    /// Edges between members, sorted by pair.
    pub edges: Vec<SimilarityEdge>,
}

impl Cluster {
    /// Returns true if the unit is a member.
    #[must_use]
    pub fn contains(&self, id: &UnitId) -> bool {
        self.members.binary_search(id).is_ok()
    }

    /// Returns the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the cluster has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns the strongest internal edge, if any.
    #[must_use]
    pub fn strongest_edge(&self) -> Option<&SimilarityEdge> {
        self.edges.iter().max_by(|a, b| a.score.total_cmp(&b.score))
    }
}
