//! Inventory snapshot produced by a scan.

use super::{RunIssue, Unit, UnitId};
use std::path::PathBuf;

/// Every unit successfully read from an inventory, plus the per-unit issues.
#[derive(Debug, Clone, Default)]
pub struct InventorySnapshot {
    /// Inventory root directory.
    pub root: PathBuf,
    /// Parsed units, sorted by identifier.
    pub units: Vec<Unit>,
    /// Units that could not be read or were excluded.
    pub issues: Vec<RunIssue>,
}

impl InventorySnapshot {
    /// Looks up a unit by identifier.
    #[must_use]
    pub fn get(&self, id: &UnitId) -> Option<&Unit> {
        self.units
            .binary_search_by(|unit| unit.id.cmp(id))
            .ok()
            .map(|idx| &self.units[idx])
    }

    /// Returns true if the snapshot holds a unit with this identifier.
    #[must_use]
    pub fn contains(&self, id: &UnitId) -> bool {
        self.get(id).is_some()
    }

    /// Number of units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if no unit was read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_id() {
        let snapshot = InventorySnapshot {
            units: vec![Unit::new("a"), Unit::new("c")],
            ..InventorySnapshot::default()
        };
        assert!(snapshot.contains(&UnitId::new("c")));
        assert!(!snapshot.contains(&UnitId::new("b")));
        assert_eq!(snapshot.len(), 2);
    }
}
