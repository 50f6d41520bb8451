// # Store
//
// The authoritative versioned side of a node: the record table holding one
// immutable snapshot per record id, and the application-facing working set
// with its dirty flags.

mod appdata;
mod record;

pub use appdata::{AppData, AppRecord, DirtyState};
pub use record::StoreRecord;

use std::collections::BTreeMap;

use crate::types::{Filter, InstanceId, RecordId};

/// Record table: record id -> latest locally known version.
///
/// Records are created by the serializer or by first-time integration and
/// replaced only through integrator transitions; they are never deleted.
#[derive(Debug, Clone, Default)]
pub struct Store {
    records: BTreeMap<RecordId, StoreRecord>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &RecordId) -> Option<&StoreRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.records.contains_key(id)
    }

    /// Inserts or replaces the record under its id.
    pub fn insert(&mut self, record: StoreRecord) {
        self.records.insert(record.record_id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RecordId, &StoreRecord)> {
        self.records.iter()
    }

    /// Records authored by `instance` with counters in `(low, high]` whose
    /// partition lies under `scope`, ordered by counter. This is the
    /// selection a sender ships when its FSIC is ahead of the peer's;
    /// counters falling outside the scope simply produce no record.
    pub fn authored_in_range(
        &self,
        instance: &InstanceId,
        low: u64,
        high: u64,
        scope: &Filter,
    ) -> Vec<StoreRecord> {
        let mut selected: Vec<StoreRecord> = self
            .records
            .values()
            .filter(|record| {
                record.last_saved_by.instance == *instance
                    && record.last_saved_by.counter > low
                    && record.last_saved_by.counter <= high
                    && record.partition.is_subset_of(scope)
            })
            .cloned()
            .collect();
        selected.sort_by_key(|record| record.last_saved_by.counter);
        selected
    }
}
