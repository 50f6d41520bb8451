use crate::error::Result;
use crate::history::HistoryVector;
use crate::store::{AppData, DirtyState, Store, StoreRecord};
use crate::sync::SyncDataStructure;
use crate::types::{Filter, InstanceId};

/// Promotes dirty working-set entries under `filter` into the store.
///
/// Entries are visited in insertion order and each promotion consumes one
/// counter value, so no two records ever share an `(instance, counter)`
/// stamp. An updated record keeps its accumulated history with the new own
/// counter folded in; a new record starts its history at the new counter.
/// Returns the number of records promoted.
pub fn serialize_dirty(
    own: &InstanceId,
    counter: &mut u64,
    app_data: &mut AppData,
    store: &mut Store,
    sds: &mut SyncDataStructure,
    filter: &Filter,
) -> Result<usize> {
    let mut promoted = 0;
    for entry in app_data.iter_mut() {
        if entry.dirty != DirtyState::Dirty || !entry.partition.is_subset_of(filter) {
            continue;
        }
        *counter += 1;

        let mut history = match store.get(&entry.record_id) {
            Some(existing) => existing.history.clone(),
            None => HistoryVector::new(),
        };
        history.merge_max(&HistoryVector::single(own.clone(), *counter));

        let record = StoreRecord::new(
            entry.record_id.clone(),
            entry.record_data.clone(),
            own.clone(),
            *counter,
            history,
            entry.partition.clone(),
        );
        tracing::debug!(
            record_id = %record.record_id,
            counter = *counter,
            "serialized working-set record into store"
        );
        store.insert(record);
        entry.dirty = DirtyState::Clean;
        sds.set_own_counter(own, *counter)?;
        promoted += 1;
    }
    if promoted > 0 {
        tracing::info!(
            instance = %own,
            promoted,
            scope = %filter,
            "serialize pass complete"
        );
    }
    Ok(promoted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordId;

    fn inst(id: &str) -> InstanceId {
        InstanceId::new(id).unwrap()
    }

    fn id(s: &str) -> RecordId {
        RecordId::new(s).unwrap()
    }

    struct Fixture {
        own: InstanceId,
        counter: u64,
        app_data: AppData,
        store: Store,
        sds: SyncDataStructure,
    }

    impl Fixture {
        fn new(instance: &str) -> Self {
            let own = inst(instance);
            Self {
                sds: SyncDataStructure::new(own.clone()),
                own,
                counter: 0,
                app_data: AppData::new(),
                store: Store::new(),
            }
        }

        fn serialize(&mut self, filter: &Filter) -> usize {
            serialize_dirty(
                &self.own,
                &mut self.counter,
                &mut self.app_data,
                &mut self.store,
                &mut self.sds,
                filter,
            )
            .unwrap()
        }
    }

    #[test]
    fn test_serialize_promotes_in_insertion_order() {
        let mut fx = Fixture::new("A");
        fx.app_data.upsert(id("record1"), "Record1 data", Filter::all());
        fx.app_data.upsert(id("record2"), "Record2 data", Filter::all());
        assert_eq!(fx.serialize(&Filter::all()), 2);

        let r1 = fx.store.get(&id("record1")).unwrap();
        assert_eq!(r1.last_saved_by.counter, 1);
        assert_eq!(r1.history, HistoryVector::single(inst("A"), 1));
        let r2 = fx.store.get(&id("record2")).unwrap();
        assert_eq!(r2.last_saved_by.counter, 2);

        assert!(fx.app_data.iter().all(|e| e.dirty == DirtyState::Clean));
        assert_eq!(fx.sds.universal().unwrap().get(&inst("A")), 2);
    }

    #[test]
    fn test_serialize_respects_partition_scope() {
        let facility = Filter::new("Facility1", "").unwrap();
        let scoped = Filter::new("Facility1", "UserX").unwrap();
        let mut fx = Fixture::new("A");
        fx.app_data.upsert(id("generic"), "data", Filter::all());
        fx.app_data.upsert(id("scoped"), "data", scoped);

        // A facility scope covers scoped records under it but not generic
        // ones.
        assert_eq!(fx.serialize(&facility), 1);
        assert!(fx.store.contains(&id("scoped")));
        assert!(!fx.store.contains(&id("generic")));

        assert_eq!(fx.serialize(&Filter::all()), 1);
        assert!(fx.store.contains(&id("generic")));
    }

    #[test]
    fn test_reserializing_keeps_history() {
        let mut fx = Fixture::new("A");
        fx.app_data.upsert(id("record1"), "v1", Filter::all());
        fx.serialize(&Filter::all());

        fx.app_data.upsert(id("record1"), "v2", Filter::all());
        fx.serialize(&Filter::all());

        let record = fx.store.get(&id("record1")).unwrap();
        assert_eq!(record.record_data, "v2");
        assert_eq!(record.last_saved_by.counter, 2);
        assert_eq!(record.history, HistoryVector::single(inst("A"), 2));
    }

    #[test]
    fn test_clean_entries_are_skipped() {
        let mut fx = Fixture::new("A");
        fx.app_data.upsert(id("record1"), "v1", Filter::all());
        fx.serialize(&Filter::all());
        assert_eq!(fx.serialize(&Filter::all()), 0);
        assert_eq!(fx.counter, 1);
    }
}
