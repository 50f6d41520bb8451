// # Causal History
//
// A history vector maps instance ids to the highest write counter whose
// effects have been incorporated, either by a single record or by a whole
// filter scope. Comparing two record versions through their history vectors
// classifies them as equal, ordered, or concurrent; concurrent versions are
// handed to the merge-conflict resolver.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::InstanceId;

/// A saved version: which instance wrote it, and at which counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionStamp {
    pub instance: InstanceId,
    pub counter: u64,
}

impl VersionStamp {
    pub fn new(instance: InstanceId, counter: u64) -> Self {
        Self { instance, counter }
    }
}

/// Mapping instance -> counter. Merging is pointwise maximum, so a vector
/// never decreases over a record's lifetime at any node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryVector(BTreeMap<InstanceId, u64>);

impl HistoryVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A vector with a single entry.
    pub fn single(instance: InstanceId, counter: u64) -> Self {
        let mut map = BTreeMap::new();
        map.insert(instance, counter);
        Self(map)
    }

    /// Counter recorded for `instance`; absent instances read as 0.
    pub fn get(&self, instance: &InstanceId) -> u64 {
        self.0.get(instance).copied().unwrap_or(0)
    }

    pub fn set(&mut self, instance: InstanceId, counter: u64) {
        self.0.insert(instance, counter);
    }

    /// True when this vector has incorporated `stamp`, i.e. it lists the
    /// stamp's instance at a counter at or past the stamp's.
    pub fn contains_at_least(&self, stamp: &VersionStamp) -> bool {
        self.0
            .get(&stamp.instance)
            .is_some_and(|&counter| counter >= stamp.counter)
    }

    /// Pointwise maximum with `other`.
    pub fn merge_max(&mut self, other: &HistoryVector) {
        for (instance, &counter) in &other.0 {
            let entry = self.0.entry(instance.clone()).or_insert(0);
            if counter > *entry {
                *entry = counter;
            }
        }
    }

    /// Pointwise overwrite from `other`. Entries absent from `other` are
    /// kept as-is.
    pub fn overwrite_from(&mut self, other: &HistoryVector) {
        for (instance, &counter) in &other.0 {
            self.0.insert(instance.clone(), counter);
        }
    }

    /// True when every entry of `other` is covered by this vector.
    pub fn dominates(&self, other: &HistoryVector) -> bool {
        other
            .0
            .iter()
            .all(|(instance, &counter)| self.get(instance) >= counter)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InstanceId, u64)> {
        self.0.iter().map(|(instance, &counter)| (instance, counter))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(InstanceId, u64)> for HistoryVector {
    fn from_iter<T: IntoIterator<Item = (InstanceId, u64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Outcome of comparing two record versions through their histories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrdering {
    /// Same stamp: the versions are one and the same.
    Equal,
    /// The first version is an ancestor of the second.
    Before,
    /// The second version is an ancestor of the first.
    After,
    /// Neither history has seen the other's version: merge conflict.
    Concurrent,
}

/// Classifies version `v1` (with history `h1`) against version `v2` (with
/// history `h2`).
pub fn compare_versions(
    h1: &HistoryVector,
    h2: &HistoryVector,
    v1: &VersionStamp,
    v2: &VersionStamp,
) -> VersionOrdering {
    if v1 == v2 {
        return VersionOrdering::Equal;
    }
    let v1_seen_by_h2 = h2.contains_at_least(v1);
    let v2_seen_by_h1 = h1.contains_at_least(v2);
    match (v1_seen_by_h2, v2_seen_by_h1) {
        (true, false) => VersionOrdering::Before,
        (false, true) => VersionOrdering::After,
        _ => VersionOrdering::Concurrent,
    }
}
