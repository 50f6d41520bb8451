// Filter-specific instance counters.
//
// An FSIC is the pointwise maximum over the sync data structure entries
// whose filters are supersets of the requested one: the highest counter per
// instance the node is known to have incorporated for records under that
// filter. Diffing a local FSIC against a remote one selects exactly the
// records the peer lacks.

use crate::error::Result;
use crate::history::HistoryVector;
use crate::protocol::TransferPayload;
use crate::store::Store;
use crate::sync::SyncDataStructure;
use crate::types::Filter;

/// Computes the FSIC for `filter` from the node's sync data structure.
///
/// Candidate entries are the universal key, the facility key, and the fully
/// scoped key, each taken only if present; the universal entry must exist.
pub fn calc_fsic(sds: &SyncDataStructure, filter: &Filter) -> Result<HistoryVector> {
    sds.universal()?;
    let mut fsic = HistoryVector::new();
    for key in filter.superset_keys() {
        if let Some(vector) = sds.get(&key) {
            fsic.merge_max(vector);
        }
    }
    Ok(fsic)
}

/// Diffs a local FSIC against a remote one and collects the store records
/// the remote side lacks.
///
/// For each instance the local side is ahead on, ships every record authored
/// by that instance with a counter in `(remote, local]` whose partition lies
/// under `scope`, and advertises the local counter in the returned delta.
/// Instances present only remotely contribute nothing.
pub fn calc_diff_fsic(
    store: &Store,
    local: &HistoryVector,
    remote: &HistoryVector,
    scope: &Filter,
) -> (HistoryVector, Vec<crate::store::StoreRecord>) {
    let mut changes = HistoryVector::new();
    let mut records = Vec::new();
    for (instance, local_counter) in local.iter() {
        let remote_counter = remote.get(instance);
        if local_counter > remote_counter {
            records.extend(store.authored_in_range(
                instance,
                remote_counter,
                local_counter,
                scope,
            ));
            changes.set(instance.clone(), local_counter);
        }
    }
    (changes, records)
}

/// Computes the local FSIC for `filter`, diffs it against `remote`, and
/// packages the result for transfer.
pub fn fsic_diff_and_snapshot(
    store: &Store,
    sds: &SyncDataStructure,
    filter: &Filter,
    remote: &HistoryVector,
) -> Result<TransferPayload> {
    let local = calc_fsic(sds, filter)?;
    let (delta, records) = calc_diff_fsic(store, &local, remote, filter);
    Ok(TransferPayload {
        filter: filter.clone(),
        delta,
        records,
    })
}
