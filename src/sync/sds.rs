use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::history::HistoryVector;
use crate::types::{FilterKey, InstanceId};

/// Per-node coverage summary: filter key -> history vector.
///
/// Each entry summarizes, for every record whose partition lies under the
/// keyed filter, which instance/counter writes have been incorporated. The
/// universal key `"+"` always exists; its entry for the owning instance
/// tracks the node's own write counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDataStructure {
    entries: BTreeMap<FilterKey, HistoryVector>,
}

impl SyncDataStructure {
    /// Creates the structure for a node, seeding the universal entry with
    /// the instance's counter at zero.
    pub fn new(own: InstanceId) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(FilterKey::universal(), HistoryVector::single(own, 0));
        Self { entries }
    }

    /// The universal entry. Its absence indicates internal corruption and is
    /// surfaced as a fatal error rather than papered over.
    pub fn universal(&self) -> Result<&HistoryVector> {
        self.entries
            .get(&FilterKey::universal())
            .ok_or(SyncError::MissingUniversalFilter)
    }

    pub fn get(&self, key: &FilterKey) -> Option<&HistoryVector> {
        self.entries.get(key)
    }

    /// Records the node's own counter in the universal entry.
    pub fn set_own_counter(&mut self, own: &InstanceId, counter: u64) -> Result<()> {
        self.entries
            .get_mut(&FilterKey::universal())
            .ok_or(SyncError::MissingUniversalFilter)?
            .set(own.clone(), counter);
        Ok(())
    }

    /// Applies a received FSIC delta under the given filter key.
    ///
    /// Entries are overwritten pointwise rather than maxed: the sender's
    /// FSIC is an upper bound over the filter, and per-session delivery is
    /// ordered, so a delta never carries stale counters. A new key is
    /// installed as-is.
    pub fn apply_delta(&mut self, delta: &HistoryVector, key: FilterKey) {
        match self.entries.get_mut(&key) {
            Some(existing) => existing.overwrite_from(delta),
            None => {
                self.entries.insert(key, delta.clone());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FilterKey, &HistoryVector)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
