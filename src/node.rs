// # Node
//
// One replication endpoint: the working set, the versioned store, the
// coverage summary, the session table, and the transfer buffers, together
// with the receive loop that drives the pull/push protocol. A node owns its
// state exclusively; the only way in is a received envelope and the only way
// out is `Transport::send`.

use std::collections::BTreeMap;

use crate::error::{Result, SyncError};
use crate::history::HistoryVector;
use crate::protocol::{Envelope, Message, SyncSession, TransferPayload};
use crate::store::{AppData, DirtyState, Store};
use crate::sync::{fsic_diff_and_snapshot, Integrator, SyncDataStructure};
use crate::transport::Transport;
use crate::types::{Filter, InstanceId, RecordId, SessionId, TransferId};

pub struct Node {
    instance_id: InstanceId,
    counter: u64,
    store: Store,
    app_data: AppData,
    sync_ds: SyncDataStructure,
    sessions: BTreeMap<SessionId, SyncSession>,
    incoming_buffer: BTreeMap<TransferId, TransferPayload>,
    outgoing_buffer: BTreeMap<TransferId, TransferPayload>,
}

impl Node {
    /// Creates a node with the given identity. The id is opaque but must be
    /// non-empty and must stay unique within a deployment.
    pub fn new(instance_id: impl Into<String>) -> Result<Self> {
        let instance_id = InstanceId::new(instance_id)?;
        Ok(Self {
            sync_ds: SyncDataStructure::new(instance_id.clone()),
            instance_id,
            counter: 0,
            store: Store::new(),
            app_data: AppData::new(),
            sessions: BTreeMap::new(),
            incoming_buffer: BTreeMap::new(),
            outgoing_buffer: BTreeMap::new(),
        })
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    /// The node's write counter: the ordinal of its latest local write.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn app_data(&self) -> &AppData {
        &self.app_data
    }

    pub fn sync_ds(&self) -> &SyncDataStructure {
        &self.sync_ds
    }

    pub fn session(&self, session_id: &SessionId) -> Option<&SyncSession> {
        self.sessions.get(session_id)
    }

    // ------------------------------------------------------------------
    // Application surface
    // ------------------------------------------------------------------

    /// Upserts an application record into the working set, marked dirty
    /// until the next serialize pass under a covering filter.
    pub fn add_app_data(
        &mut self,
        record_id: impl Into<String>,
        record_data: impl Into<String>,
        partition: Filter,
    ) -> Result<()> {
        let record_id = RecordId::new(record_id)?;
        self.app_data.upsert(record_id, record_data, partition);
        Ok(())
    }

    /// Promotes dirty working-set entries under `filter` into the store,
    /// assigning fresh counters in insertion order.
    pub fn serialize(&mut self, filter: &Filter) -> Result<usize> {
        crate::sync::serialize_dirty(
            &self.instance_id,
            &mut self.counter,
            &mut self.app_data,
            &mut self.store,
            &mut self.sync_ds,
            filter,
        )
    }

    /// The node's FSIC for `filter`: its advertised coverage.
    pub fn calc_fsic(&self, filter: &Filter) -> Result<HistoryVector> {
        crate::sync::calc_fsic(&self.sync_ds, filter)
    }

    // ------------------------------------------------------------------
    // Session management
    // ------------------------------------------------------------------

    /// Installs the client-side session record for syncing against
    /// `server`. Creating the same session twice overwrites, which resets
    /// the request counter and any abandoned request slot.
    pub fn create_sync_session(&mut self, server: InstanceId) -> SessionId {
        let session = SyncSession::new(self.instance_id.clone(), server);
        let session_id = session.session_id.clone();
        tracing::info!(
            instance = %self.instance_id,
            session = %session_id,
            "sync session created"
        );
        self.sessions.insert(session_id.clone(), session);
        session_id
    }

    /// Installs the mirrored server-side session record for `client`.
    pub fn accept_sync_session(&mut self, client: InstanceId) -> SessionId {
        let session = SyncSession::new(client, self.instance_id.clone());
        let session_id = session.session_id.clone();
        self.sessions.insert(session_id.clone(), session);
        session_id
    }

    // ------------------------------------------------------------------
    // Protocol
    // ------------------------------------------------------------------

    /// Starts a pull on a session: advertises local coverage for `filter`
    /// and asks the peer for everything missing from it.
    pub fn pull_initiation(
        &mut self,
        session_id: &SessionId,
        filter: &Filter,
        transport: &dyn Transport,
    ) -> Result<()> {
        let fsic = self.calc_fsic(filter)?;
        let (peer, transfer_id) = self.begin_request(session_id)?;
        tracing::debug!(
            instance = %self.instance_id,
            transfer = %transfer_id,
            scope = %filter,
            "initiating pull"
        );
        transport.send(Envelope {
            sender: self.instance_id.clone(),
            receiver: peer,
            session_id: session_id.clone(),
            message: Message::Pull {
                transfer_id,
                filter: filter.clone(),
                fsic,
            },
        })
    }

    /// Starts a push on a session: announces intent to send records under
    /// `filter`; the peer answers with its coverage and the data follows.
    pub fn push_initiation(
        &mut self,
        session_id: &SessionId,
        filter: &Filter,
        transport: &dyn Transport,
    ) -> Result<()> {
        let (peer, transfer_id) = self.begin_request(session_id)?;
        tracing::debug!(
            instance = %self.instance_id,
            transfer = %transfer_id,
            scope = %filter,
            "initiating push"
        );
        transport.send(Envelope {
            sender: self.instance_id.clone(),
            receiver: peer,
            session_id: session_id.clone(),
            message: Message::Push {
                transfer_id,
                filter: filter.clone(),
            },
        })
    }

    fn begin_request(&mut self, session_id: &SessionId) -> Result<(InstanceId, TransferId)> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| SyncError::UnknownSession(session_id.to_string()))?;
        let peer = session.peer_of(&self.instance_id)?.clone();
        let transfer_id = session.next_transfer_id();
        Ok((peer, transfer_id))
    }

    /// Handles one delivered envelope to completion, including any
    /// integration and outgoing sends it triggers.
    pub fn receive(&mut self, envelope: Envelope, transport: &dyn Transport) -> Result<()> {
        if envelope.receiver != self.instance_id {
            return Err(SyncError::Transport(format!(
                "envelope for '{}' delivered to '{}'",
                envelope.receiver, self.instance_id
            )));
        }
        tracing::debug!(
            instance = %self.instance_id,
            from = %envelope.sender,
            tag = envelope.message.tag(),
            "received message"
        );
        match envelope.message {
            request @ (Message::Pull { .. } | Message::Push { .. }) => {
                let session = self
                    .sessions
                    .get_mut(&envelope.session_id)
                    .ok_or_else(|| SyncError::UnknownSession(envelope.session_id.to_string()))?;
                session.park_request(request);
                self.service_requests(&envelope.session_id, transport)
            }
            Message::Push2 {
                transfer_id,
                filter,
                fsic,
            } => self.answer_push2(&envelope.session_id, transfer_id, &filter, &fsic, transport),
            Message::Data {
                transfer_id,
                payload,
            } => {
                self.incoming_buffer.insert(transfer_id, payload);
                self.integrate()
            }
        }
    }

    /// Services the session's parked request, if any. Only the two
    /// request-initiating tags belong in the slot; anything else is a
    /// protocol violation.
    fn service_requests(
        &mut self,
        session_id: &SessionId,
        transport: &dyn Transport,
    ) -> Result<()> {
        let (request, peer) = {
            let session = self
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| SyncError::UnknownSession(session_id.to_string()))?;
            let peer = session.peer_of(&self.instance_id)?.clone();
            match session.take_request() {
                Some(request) => (request, peer),
                None => return Ok(()),
            }
        };
        match request {
            Message::Pull {
                transfer_id,
                filter,
                fsic,
            } => {
                let payload =
                    fsic_diff_and_snapshot(&self.store, &self.sync_ds, &filter, &fsic)?;
                self.outgoing_buffer
                    .insert(transfer_id.clone(), payload.clone());
                transport.send(Envelope {
                    sender: self.instance_id.clone(),
                    receiver: peer,
                    session_id: session_id.clone(),
                    message: Message::Data {
                        transfer_id: transfer_id.clone(),
                        payload,
                    },
                })?;
                self.outgoing_buffer.remove(&transfer_id);
                Ok(())
            }
            Message::Push {
                transfer_id,
                filter,
            } => {
                let fsic = self.calc_fsic(&filter)?;
                transport.send(Envelope {
                    sender: self.instance_id.clone(),
                    receiver: peer,
                    session_id: session_id.clone(),
                    message: Message::Push2 {
                        transfer_id,
                        filter,
                        fsic,
                    },
                })
            }
            other => Err(SyncError::UnknownMessage(other.tag().to_string())),
        }
    }

    /// Client side of a push: the peer has advertised its coverage, so diff
    /// against it and ship the snapshot.
    fn answer_push2(
        &mut self,
        session_id: &SessionId,
        transfer_id: TransferId,
        filter: &Filter,
        remote_fsic: &HistoryVector,
        transport: &dyn Transport,
    ) -> Result<()> {
        let peer = {
            let session = self
                .sessions
                .get(session_id)
                .ok_or_else(|| SyncError::UnknownSession(session_id.to_string()))?;
            session.peer_of(&self.instance_id)?.clone()
        };
        let payload = fsic_diff_and_snapshot(&self.store, &self.sync_ds, filter, remote_fsic)?;
        self.outgoing_buffer
            .insert(transfer_id.clone(), payload.clone());
        transport.send(Envelope {
            sender: self.instance_id.clone(),
            receiver: peer,
            session_id: session_id.clone(),
            message: Message::Data {
                transfer_id: transfer_id.clone(),
                payload,
            },
        })?;
        self.outgoing_buffer.remove(&transfer_id);
        Ok(())
    }

    /// Drains the incoming buffer, integrating every pending transfer.
    pub fn integrate(&mut self) -> Result<()> {
        let transfers = std::mem::take(&mut self.incoming_buffer);
        for (transfer_id, payload) in transfers {
            tracing::debug!(
                instance = %self.instance_id,
                transfer = %transfer_id,
                "integrating transfer"
            );
            Integrator::new(
                &self.instance_id,
                &mut self.counter,
                &mut self.store,
                &mut self.app_data,
                &mut self.sync_ds,
            )
            .integrate_transfer(payload)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Auditing
    // ------------------------------------------------------------------

    /// Audits the node's structural invariants. Intended for tests and
    /// debugging; a healthy node upholds these after every public
    /// operation.
    pub fn check_invariants(&self) -> Result<()> {
        let universal = self.sync_ds.universal()?;
        if universal.get(&self.instance_id) != self.counter {
            return Err(SyncError::InconsistentState(format!(
                "universal coverage lists own counter {} but node is at {}",
                universal.get(&self.instance_id),
                self.counter
            )));
        }
        for (record_id, record) in self.store.iter() {
            if !record.history.contains_at_least(&record.last_saved_by) {
                return Err(SyncError::InconsistentState(format!(
                    "record '{}' has a stamp its history does not cover",
                    record_id
                )));
            }
        }
        for entry in self.app_data.iter() {
            match entry.dirty {
                DirtyState::Clean => match self.store.get(&entry.record_id) {
                    Some(record) if record.record_data == entry.record_data => {}
                    _ => {
                        return Err(SyncError::InconsistentState(format!(
                            "clean working-set entry '{}' diverges from store",
                            entry.record_id
                        )))
                    }
                },
                DirtyState::Dirty => {}
                DirtyState::Merging => {
                    return Err(SyncError::InconsistentState(format!(
                        "working-set entry '{}' left with mid-merge marker",
                        entry.record_id
                    )))
                }
            }
        }
        Ok(())
    }
}
