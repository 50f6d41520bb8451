use serde::{Deserialize, Serialize};

use crate::history::{HistoryVector, VersionStamp};
use crate::types::{Filter, InstanceId, RecordId};

/// Immutable snapshot of one versioned value.
///
/// `last_saved_by` uniquely names this version and `history` lists, per
/// instance, every counter whose writes the version has incorporated. The
/// stamp is always covered by the history:
/// `history[last_saved_by.instance] >= last_saved_by.counter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRecord {
    pub record_id: RecordId,
    pub record_data: String,
    pub last_saved_by: VersionStamp,
    pub history: HistoryVector,
    pub partition: Filter,
}

impl StoreRecord {
    pub fn new(
        record_id: RecordId,
        record_data: impl Into<String>,
        saved_by: InstanceId,
        counter: u64,
        history: HistoryVector,
        partition: Filter,
    ) -> Self {
        Self {
            record_id,
            record_data: record_data.into(),
            last_saved_by: VersionStamp::new(saved_by, counter),
            history,
            partition,
        }
    }
}
