use serde::{Deserialize, Serialize};

use crate::store::StoreRecord;
use crate::types::{Filter, RecordId};

/// Relationship of a working-set entry to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirtyState {
    /// Matches the store version.
    Clean,
    /// Local edit pending serialization.
    Dirty,
    /// Transient marker while a merge conflict is being resolved; never
    /// survives an integration pass.
    Merging,
}

/// One application record in the working set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRecord {
    pub record_id: RecordId,
    pub record_data: String,
    pub dirty: DirtyState,
    pub partition: Filter,
}

/// Application-facing working set, ordered by insertion so serialization
/// assigns counters in a stable order.
#[derive(Debug, Clone, Default)]
pub struct AppData {
    entries: Vec<AppRecord>,
}

impl AppData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts an application record and marks it dirty. Re-adding an
    /// existing id replaces its payload and partition in place, keeping the
    /// entry's insertion position.
    pub fn upsert(&mut self, record_id: RecordId, record_data: impl Into<String>, partition: Filter) {
        let record_data = record_data.into();
        match self.position(&record_id) {
            Some(index) => {
                let entry = &mut self.entries[index];
                entry.record_data = record_data;
                entry.partition = partition;
                entry.dirty = DirtyState::Dirty;
            }
            None => self.entries.push(AppRecord {
                record_id,
                record_data,
                dirty: DirtyState::Dirty,
                partition,
            }),
        }
    }

    /// Appends a clean copy inflated from a store record, used when
    /// integration installs a record the application has never seen.
    pub fn push_clean(&mut self, record: &StoreRecord) {
        self.entries.push(AppRecord {
            record_id: record.record_id.clone(),
            record_data: record.record_data.clone(),
            dirty: DirtyState::Clean,
            partition: record.partition.clone(),
        });
    }

    /// Index of the entry with the given id, if present.
    pub fn position(&self, record_id: &RecordId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.record_id == *record_id)
    }

    pub fn get(&self, index: usize) -> Option<&AppRecord> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut AppRecord> {
        self.entries.get_mut(index)
    }

    pub fn find(&self, record_id: &RecordId) -> Option<&AppRecord> {
        self.position(record_id).and_then(|index| self.get(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AppRecord> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AppRecord> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
