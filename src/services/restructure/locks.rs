//! Mutual exclusion on unit identity.
//!
//! An op locks every unit it reads or writes. Acquisition never waits: if any
//! requested unit is already held the op is rejected with a conflict.

use crate::models::UnitId;
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::Mutex;

/// Registry of unit identifiers currently held by an op.
#[derive(Debug, Default)]
pub struct UnitLocks {
    held: Mutex<HashSet<UnitId>>,
}

impl UnitLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks every id in `ids` for `op_id`, or none of them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConcurrencyConflict`] listing the ids already held.
    pub fn try_acquire(&self, op_id: &str, ids: &[UnitId]) -> Result<UnitLockGuard<'_>> {
        let mut held = self
            .held
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut conflicts: Vec<&UnitId> = ids.iter().filter(|id| held.contains(*id)).collect();
        if !conflicts.is_empty() {
            conflicts.sort();
            conflicts.dedup();
            let units = conflicts
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::ConcurrencyConflict {
                op: op_id.to_string(),
                units,
            });
        }

        held.extend(ids.iter().cloned());
        Ok(UnitLockGuard {
            locks: self,
            ids: ids.to_vec(),
        })
    }

    /// Returns true if the unit is currently held.
    #[must_use]
    pub fn is_held(&self, id: &UnitId) -> bool {
        self.held
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(id)
    }
}

/// Releases its units when dropped.
#[derive(Debug)]
pub struct UnitLockGuard<'a> {
    locks: &'a UnitLocks,
    ids: Vec<UnitId>,
}

impl Drop for UnitLockGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for id in &self.ids {
            held.remove(id);
        }
    }
}
