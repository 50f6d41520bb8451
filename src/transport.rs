// # Transport
//
// Nodes never hold references to each other; everything between them moves
// as envelopes through a `Transport`. The in-memory implementation is a
// serial FIFO queue, which gives the delivery ordering the engine assumes:
// one `receive` runs to completion before the next envelope is handed over,
// and per-session order matches send order.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, SyncError};
use crate::node::Node;
use crate::protocol::Envelope;
use crate::types::{Filter, InstanceId, SessionId};

/// Capability for sending an envelope toward its receiver.
pub trait Transport {
    fn send(&self, envelope: Envelope) -> Result<()>;
}

/// Shared in-process envelope queue.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    queue: Arc<Mutex<VecDeque<Envelope>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the oldest undelivered envelope, if any.
    pub fn pop(&self) -> Option<Envelope> {
        self.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, envelope: Envelope) -> Result<()> {
        tracing::debug!(
            from = %envelope.sender,
            to = %envelope.receiver,
            tag = envelope.message.tag(),
            "queued envelope"
        );
        self.queue.lock().push_back(envelope);
        Ok(())
    }
}

/// A set of nodes wired to one shared in-memory transport, with delivery
/// driven to quiescence after every initiated exchange. This is the harness
/// drivers and tests run against; a production deployment replaces it with
/// a real transport that preserves the same serial-delivery contract.
#[derive(Default)]
pub struct Network {
    transport: MemoryTransport,
    nodes: BTreeMap<InstanceId, Node>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node and returns its identity.
    pub fn add_node(&mut self, node: Node) -> InstanceId {
        let instance_id = node.instance_id().clone();
        self.nodes.insert(instance_id.clone(), node);
        instance_id
    }

    pub fn node(&self, instance_id: &InstanceId) -> Option<&Node> {
        self.nodes.get(instance_id)
    }

    pub fn node_mut(&mut self, instance_id: &InstanceId) -> Option<&mut Node> {
        self.nodes.get_mut(instance_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Establishes a sync session between two registered nodes, installing
    /// the mirrored session records on both.
    pub fn connect(&mut self, client: &InstanceId, server: &InstanceId) -> Result<SessionId> {
        if !self.nodes.contains_key(server) {
            return Err(SyncError::UnknownPeer(server.to_string()));
        }
        let session_id = self
            .nodes
            .get_mut(client)
            .ok_or_else(|| SyncError::UnknownPeer(client.to_string()))?
            .create_sync_session(server.clone());
        self.nodes
            .get_mut(server)
            .expect("server presence checked above")
            .accept_sync_session(client.clone());
        Ok(session_id)
    }

    /// Initiates a pull on behalf of `client` and delivers envelopes until
    /// the exchange has fully settled.
    pub fn pull(
        &mut self,
        client: &InstanceId,
        session_id: &SessionId,
        filter: &Filter,
    ) -> Result<()> {
        self.nodes
            .get_mut(client)
            .ok_or_else(|| SyncError::UnknownPeer(client.to_string()))?
            .pull_initiation(session_id, filter, &self.transport)?;
        self.deliver_all()
    }

    /// Initiates a push on behalf of `client` and delivers envelopes until
    /// the exchange has fully settled.
    pub fn push(
        &mut self,
        client: &InstanceId,
        session_id: &SessionId,
        filter: &Filter,
    ) -> Result<()> {
        self.nodes
            .get_mut(client)
            .ok_or_else(|| SyncError::UnknownPeer(client.to_string()))?
            .push_initiation(session_id, filter, &self.transport)?;
        self.deliver_all()
    }

    /// Full replication over a session: pull everything, then push
    /// everything, under the universal filter.
    pub fn full_replication(&mut self, client: &InstanceId, session_id: &SessionId) -> Result<()> {
        self.pull(client, session_id, &Filter::all())?;
        self.push(client, session_id, &Filter::all())
    }

    /// Delivers queued envelopes in FIFO order until the queue is empty.
    /// Each delivery runs the receiver to completion and may enqueue
    /// follow-up envelopes.
    pub fn deliver_all(&mut self) -> Result<()> {
        while let Some(envelope) = self.transport.pop() {
            let receiver = self
                .nodes
                .get_mut(&envelope.receiver)
                .ok_or_else(|| SyncError::UnknownPeer(envelope.receiver.to_string()))?;
            receiver.receive(envelope, &self.transport)?;
        }
        Ok(())
    }
}
