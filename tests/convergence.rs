//! Topology-level convergence: rings, stars, and full meshes of nodes
//! repeatedly replicating until every store is identical. Randomized
//! exchange orders are driven by a seeded generator so the runs stay
//! reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use syncstore::{Filter, InstanceId, Network, Node, RecordId, SessionId};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn all() -> Filter {
    Filter::all()
}

fn rid(s: &str) -> RecordId {
    RecordId::new(s).unwrap()
}

/// A network of `size` nodes named "0".."size-1".
fn create_network(size: usize) -> (Network, Vec<InstanceId>) {
    let mut network = Network::new();
    let ids = (0..size)
        .map(|i| network.add_node(Node::new(i.to_string()).unwrap()))
        .collect();
    (network, ids)
}

/// Every node serializes one record with a distinct id.
fn add_distinct_records(network: &mut Network, ids: &[InstanceId]) {
    for id in ids {
        let node = network.node_mut(id).unwrap();
        let record_id = format!("record{}", id);
        let record_data = format!("recordData{}", id);
        node.add_app_data(record_id, record_data, all()).unwrap();
        node.serialize(&all()).unwrap();
    }
}

/// Every node serializes a conflicting edit to the same record id.
fn add_conflicting_records(network: &mut Network, ids: &[InstanceId]) {
    for id in ids {
        let node = network.node_mut(id).unwrap();
        node.add_app_data("id", format!("data {}", id), all()).unwrap();
        node.serialize(&all()).unwrap();
    }
}

/// Sessions between adjacent ring members; entry `i` connects node `i` as
/// client to node `(i + 1) % n` as server.
fn sessions_ring(network: &mut Network, ids: &[InstanceId]) -> Vec<(usize, usize, SessionId)> {
    (0..ids.len())
        .map(|i| {
            let j = (i + 1) % ids.len();
            let session = network.connect(&ids[i], &ids[j]).unwrap();
            (i, j, session)
        })
        .collect()
}

/// Sessions from every outer node to the hub (the last node).
fn sessions_star(network: &mut Network, ids: &[InstanceId]) -> Vec<(usize, usize, SessionId)> {
    let hub = ids.len() - 1;
    (0..hub)
        .map(|i| {
            let session = network.connect(&ids[i], &ids[hub]).unwrap();
            (i, hub, session)
        })
        .collect()
}

/// Sessions between every ordered pair of nodes.
fn sessions_full(network: &mut Network, ids: &[InstanceId]) -> Vec<(usize, usize, SessionId)> {
    let mut sessions = Vec::new();
    for i in 0..ids.len() {
        for j in 0..ids.len() {
            if i != j {
                let session = network.connect(&ids[i], &ids[j]).unwrap();
                sessions.push((i, j, session));
            }
        }
    }
    sessions
}

/// True when every node holds the same record ids with identical versions.
fn stores_identical(network: &Network, ids: &[InstanceId]) -> bool {
    let first = network.node(&ids[0]).unwrap().store();
    ids.iter().skip(1).all(|id| {
        let store = network.node(id).unwrap().store();
        store.len() == first.len()
            && first
                .iter()
                .all(|(record_id, record)| store.get(record_id) == Some(record))
    })
}

/// True when every node resolved the shared record to the same history.
fn merge_settled(network: &Network, ids: &[InstanceId]) -> bool {
    let reference = &network
        .node(&ids[0])
        .unwrap()
        .store()
        .get(&rid("id"))
        .unwrap()
        .history;
    ids.iter().skip(1).all(|id| {
        network
            .node(id)
            .unwrap()
            .store()
            .get(&rid("id"))
            .map(|record| &record.history == reference)
            .unwrap_or(false)
    })
}

fn check_all(network: &Network) {
    for node in network.nodes() {
        node.check_invariants().unwrap();
    }
}

#[test]
fn ring_converges_after_two_passes() {
    init_tracing();
    const RING_SIZE: usize = 6;
    let (mut network, ids) = create_network(RING_SIZE);
    add_distinct_records(&mut network, &ids);
    let sessions = sessions_ring(&mut network, &ids);

    for _ in 0..2 {
        for (client, _, session) in &sessions {
            network.full_replication(&ids[*client], session).unwrap();
        }
    }

    assert!(stores_identical(&network, &ids));
    for id in &ids {
        assert_eq!(network.node(id).unwrap().store().len(), RING_SIZE);
    }
    check_all(&network);
}

#[test]
fn star_converges_after_two_rounds() {
    init_tracing();
    const STAR_SIZE: usize = 8;
    let (mut network, ids) = create_network(STAR_SIZE);
    add_distinct_records(&mut network, &ids);
    let sessions = sessions_star(&mut network, &ids);

    for _ in 0..2 {
        for (client, _, session) in &sessions {
            network.full_replication(&ids[*client], session).unwrap();
        }
    }

    assert!(stores_identical(&network, &ids));
    for id in &ids {
        assert_eq!(network.node(id).unwrap().store().len(), STAR_SIZE);
    }
    check_all(&network);
}

#[test]
fn ring_merge_conflicts_settle_in_random_order() {
    init_tracing();
    const RING_SIZE: usize = 5;
    let (mut network, ids) = create_network(RING_SIZE);
    add_conflicting_records(&mut network, &ids);
    let sessions = sessions_ring(&mut network, &ids);

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut passes = 0;
    while !merge_settled(&network, &ids) {
        // One pass exchanges over every ring edge once, in random order.
        let mut remaining: Vec<usize> = (0..sessions.len()).collect();
        while !remaining.is_empty() {
            let pick = rng.random_range(0..remaining.len());
            let (client, server, session) = &sessions[remaining.swap_remove(pick)];
            network.full_replication(&ids[*client], session).unwrap();

            // A full exchange leaves both endpoints with the same version.
            assert_eq!(
                network
                    .node(&ids[*client])
                    .unwrap()
                    .store()
                    .get(&rid("id"))
                    .unwrap()
                    .history,
                network
                    .node(&ids[*server])
                    .unwrap()
                    .store()
                    .get(&rid("id"))
                    .unwrap()
                    .history
            );
        }
        passes += 1;
        assert!(
            passes <= RING_SIZE * RING_SIZE,
            "ring failed to settle within {} passes",
            RING_SIZE * RING_SIZE
        );
    }

    // Converged: one payload everywhere.
    let reference = network
        .node(&ids[0])
        .unwrap()
        .store()
        .get(&rid("id"))
        .unwrap()
        .record_data
        .clone();
    for id in &ids {
        assert_eq!(
            network.node(id).unwrap().store().get(&rid("id")).unwrap().record_data,
            reference
        );
    }
    check_all(&network);
}

#[test]
fn full_mesh_settles_under_random_pulls() {
    init_tracing();
    const MESH_SIZE: usize = 4;
    const MAX_EXCHANGES: usize = 500;
    let (mut network, ids) = create_network(MESH_SIZE);
    add_conflicting_records(&mut network, &ids);
    let sessions = sessions_full(&mut network, &ids);

    let mut rng = StdRng::seed_from_u64(42);
    let mut exchanges = 0;
    while !merge_settled(&network, &ids) {
        let (client, _, session) = &sessions[rng.random_range(0..sessions.len())];
        network.pull(&ids[*client], session, &all()).unwrap();
        exchanges += 1;
        assert!(
            exchanges <= MAX_EXCHANGES,
            "mesh failed to settle within {} pulls",
            MAX_EXCHANGES
        );
    }

    assert!(stores_identical(&network, &ids));
    check_all(&network);
}

#[test]
fn counters_and_coverage_stay_monotone() {
    init_tracing();
    const RING_SIZE: usize = 4;
    let (mut network, ids) = create_network(RING_SIZE);
    add_conflicting_records(&mut network, &ids);
    let sessions = sessions_ring(&mut network, &ids);

    let mut last_counters: Vec<u64> = ids
        .iter()
        .map(|id| network.node(id).unwrap().counter())
        .collect();
    let mut last_universal: Vec<Vec<(InstanceId, u64)>> = ids
        .iter()
        .map(|id| {
            network
                .node(id)
                .unwrap()
                .sync_ds()
                .universal()
                .unwrap()
                .iter()
                .map(|(instance, counter)| (instance.clone(), counter))
                .collect()
        })
        .collect();

    for _ in 0..3 {
        for (client, _, session) in &sessions {
            network.full_replication(&ids[*client], session).unwrap();

            for (index, id) in ids.iter().enumerate() {
                let node = network.node(id).unwrap();
                assert!(node.counter() >= last_counters[index]);
                last_counters[index] = node.counter();

                let universal = node.sync_ds().universal().unwrap();
                for (instance, counter) in &last_universal[index] {
                    assert!(universal.get(instance) >= *counter);
                }
                last_universal[index] = universal
                    .iter()
                    .map(|(instance, counter)| (instance.clone(), counter))
                    .collect();
            }
        }
    }
    check_all(&network);
}
