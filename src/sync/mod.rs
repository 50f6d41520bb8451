// # Sync Engine
//
// The replication core: per-filter coverage summaries (sync data structure),
// FSIC computation and diffing, promotion of dirty application records into
// the store, and integration of incoming records with merge-conflict
// resolution.

mod fsic;
mod integrator;
mod sds;
mod serializer;

pub use fsic::{calc_diff_fsic, calc_fsic, fsic_diff_and_snapshot};
pub use integrator::{resolve_merge_conflict, ConflictWinner, Integrator};
pub use sds::SyncDataStructure;
pub use serializer::serialize_dirty;
