// Incoming-record integration.
//
// Every record arriving through a transfer lands here and is classified
// against the local store and working set: installed fresh, discarded as
// already-known, fast-forwarded, or resolved as a merge conflict. Conflict
// resolution is a deterministic digest tiebreak, so any two nodes observing
// the same pair of concurrent versions pick the same winner, and the merge
// is stamped with a fresh local counter so the resolution itself propagates.

use crate::digest::md5_hex;
use crate::error::{Result, SyncError};
use crate::history::{compare_versions, HistoryVector, VersionOrdering, VersionStamp};
use crate::protocol::TransferPayload;
use crate::store::{AppData, DirtyState, Store, StoreRecord};
use crate::sync::SyncDataStructure;
use crate::types::InstanceId;

/// Which side survives a merge conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictWinner {
    /// The local working-set payload wins.
    AppData,
    /// The incoming buffered payload wins.
    Buffer,
}

/// Deterministic tiebreak between an incoming payload and the local
/// working-set payload: compare MD5 hex digests lexicographically, local
/// side winning ties.
pub fn resolve_merge_conflict(incoming_data: &str, app_data: &str) -> ConflictWinner {
    if md5_hex(incoming_data) <= md5_hex(app_data) {
        ConflictWinner::AppData
    } else {
        ConflictWinner::Buffer
    }
}

/// Borrowed view over the node state the integrator mutates.
pub struct Integrator<'a> {
    own: &'a InstanceId,
    counter: &'a mut u64,
    store: &'a mut Store,
    app_data: &'a mut AppData,
    sds: &'a mut SyncDataStructure,
}

impl<'a> Integrator<'a> {
    pub fn new(
        own: &'a InstanceId,
        counter: &'a mut u64,
        store: &'a mut Store,
        app_data: &'a mut AppData,
        sds: &'a mut SyncDataStructure,
    ) -> Self {
        Self {
            own,
            counter,
            store,
            app_data,
            sds,
        }
    }

    /// Integrates one drained transfer: every shipped record, then the FSIC
    /// delta under the transfer's filter key.
    pub fn integrate_transfer(&mut self, payload: TransferPayload) -> Result<()> {
        let record_count = payload.records.len();
        for record in payload.records {
            self.integrate_record(record)?;
        }
        self.sds.apply_delta(&payload.delta, payload.filter.key());
        tracing::debug!(
            instance = %self.own,
            records = record_count,
            scope = %payload.filter,
            "integrated transfer"
        );
        Ok(())
    }

    /// Applies one incoming record through the integration state machine.
    pub fn integrate_record(&mut self, incoming: StoreRecord) -> Result<()> {
        let app_index = self.app_data.position(&incoming.record_id);
        let in_store = self.store.contains(&incoming.record_id);

        match (in_store, app_index) {
            // Never seen: install and inflate a clean working-set copy.
            (false, None) => {
                self.app_data.push_clean(&incoming);
                self.store.insert(incoming);
                Ok(())
            }

            (false, Some(index)) => {
                let entry = self.app_data.get(index).expect("index from position");
                match entry.dirty {
                    DirtyState::Dirty => {
                        // Unserialized local edit against a record the store
                        // has never held: the incoming version becomes the
                        // store baseline and the edit is merged against it.
                        self.store.insert(incoming.clone());
                        let stamp = self.bump_counter()?;
                        self.app_data
                            .get_mut(index)
                            .expect("index from position")
                            .dirty = DirtyState::Merging;
                        self.resolve_and_apply(incoming, index, stamp)
                    }
                    _ => Err(SyncError::InconsistentState(format!(
                        "record '{}' present in working set but absent from store",
                        incoming.record_id
                    ))),
                }
            }

            (true, None) => Err(SyncError::InconsistentState(format!(
                "record '{}' present in store but absent from working set",
                incoming.record_id
            ))),

            (true, Some(index)) => {
                let dirty = self.app_data.get(index).expect("index from position").dirty;
                match dirty {
                    DirtyState::Clean => self.integrate_against_clean(incoming, index),
                    DirtyState::Dirty => {
                        let stamp = self.bump_counter()?;
                        self.app_data
                            .get_mut(index)
                            .expect("index from position")
                            .dirty = DirtyState::Merging;
                        self.resolve_and_apply(incoming, index, stamp)
                    }
                    DirtyState::Merging => Err(SyncError::InconsistentState(format!(
                        "record '{}' still carries the mid-merge marker",
                        incoming.record_id
                    ))),
                }
            }
        }
    }

    /// Store and working set agree; order the incoming version against the
    /// stored one.
    fn integrate_against_clean(&mut self, incoming: StoreRecord, index: usize) -> Result<()> {
        let stored = self
            .store
            .get(&incoming.record_id)
            .expect("caller checked store membership");
        let ordering = compare_versions(
            &stored.history,
            &incoming.history,
            &stored.last_saved_by,
            &incoming.last_saved_by,
        );
        match ordering {
            VersionOrdering::Equal | VersionOrdering::After => {
                tracing::debug!(record_id = %incoming.record_id, "incoming version already known");
                Ok(())
            }
            VersionOrdering::Before => self.buffer_data_chosen(incoming, index, None),
            VersionOrdering::Concurrent => {
                let stamp = self.bump_counter()?;
                self.resolve_and_apply(incoming, index, stamp)
            }
        }
    }

    /// Runs the digest tiebreak and applies the winning side, folding the
    /// merge stamp into the record's history.
    fn resolve_and_apply(
        &mut self,
        incoming: StoreRecord,
        index: usize,
        stamp: VersionStamp,
    ) -> Result<()> {
        let entry = self.app_data.get(index).expect("index from position");
        let winner = resolve_merge_conflict(&incoming.record_data, &entry.record_data);
        tracing::debug!(
            record_id = %incoming.record_id,
            winner = ?winner,
            merge_counter = stamp.counter,
            "resolved merge conflict"
        );
        match winner {
            ConflictWinner::AppData => self.app_data_chosen(incoming, index, Some(stamp)),
            ConflictWinner::Buffer => self.buffer_data_chosen(incoming, index, Some(stamp)),
        }
    }

    /// The incoming payload survives: the store record is rewritten with it
    /// and the working set follows. With a merge stamp the rewritten record
    /// is a new local version; without one this is a plain fast-forward and
    /// the incoming stamp is kept.
    fn buffer_data_chosen(
        &mut self,
        incoming: StoreRecord,
        index: usize,
        merge_stamp: Option<VersionStamp>,
    ) -> Result<()> {
        let history = self.merged_history(&incoming, merge_stamp.as_ref());
        let last_saved_by = merge_stamp.unwrap_or_else(|| incoming.last_saved_by.clone());

        let entry = self.app_data.get_mut(index).expect("index from position");
        entry.record_data = incoming.record_data.clone();
        entry.partition = incoming.partition.clone();
        entry.dirty = DirtyState::Clean;

        self.store.insert(StoreRecord {
            record_id: incoming.record_id,
            record_data: incoming.record_data,
            last_saved_by,
            history,
            partition: incoming.partition,
        });
        Ok(())
    }

    /// The local working-set payload survives: the store record is rewritten
    /// with it under the merge stamp, histories merged the same way as for a
    /// buffer win.
    fn app_data_chosen(
        &mut self,
        incoming: StoreRecord,
        index: usize,
        merge_stamp: Option<VersionStamp>,
    ) -> Result<()> {
        let history = self.merged_history(&incoming, merge_stamp.as_ref());
        let last_saved_by = merge_stamp.unwrap_or_else(|| incoming.last_saved_by.clone());

        let entry = self.app_data.get_mut(index).expect("index from position");
        entry.dirty = DirtyState::Clean;
        let record_data = entry.record_data.clone();
        let partition = entry.partition.clone();

        self.store.insert(StoreRecord {
            record_id: incoming.record_id,
            record_data,
            last_saved_by,
            history,
            partition,
        });
        Ok(())
    }

    /// Pointwise max of the incoming history, the stored history (if any),
    /// and the merge stamp.
    fn merged_history(
        &self,
        incoming: &StoreRecord,
        merge_stamp: Option<&VersionStamp>,
    ) -> HistoryVector {
        let mut history = incoming.history.clone();
        if let Some(stored) = self.store.get(&incoming.record_id) {
            history.merge_max(&stored.history);
        }
        if let Some(stamp) = merge_stamp {
            history.merge_max(&HistoryVector::single(
                stamp.instance.clone(),
                stamp.counter,
            ));
        }
        history
    }

    /// Consumes the next local counter value for a merge resolution and
    /// keeps the universal coverage entry in step with it.
    fn bump_counter(&mut self) -> Result<VersionStamp> {
        *self.counter += 1;
        self.sds.set_own_counter(self.own, *self.counter)?;
        Ok(VersionStamp::new(self.own.clone(), *self.counter))
    }
}
