//! Message definitions for peer synchronization.
//!
//! A pull ships the requester's FSIC so the server can answer with data in
//! one round trip; a push first asks the server for its FSIC (`Push2`
//! reply) and then ships data. `Data` carries the snapshot either way.

use serde::{Deserialize, Serialize};

use crate::history::HistoryVector;
use crate::store::StoreRecord;
use crate::types::{Filter, InstanceId, SessionId, TransferId};

/// Snapshot carried by a `Data` message: the transfer's filter scope, the
/// FSIC delta the receiver should adopt for it, and the shipped records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferPayload {
    pub filter: Filter,
    pub delta: HistoryVector,
    pub records: Vec<StoreRecord>,
}

/// All messages exchanged inside a sync session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Client asks the server for records it lacks under `filter`,
    /// advertising its own coverage.
    Pull {
        transfer_id: TransferId,
        filter: Filter,
        fsic: HistoryVector,
    },
    /// Client announces it wants to send records under `filter`.
    Push {
        transfer_id: TransferId,
        filter: Filter,
    },
    /// Server's reply to a push: its own coverage, so the client can diff.
    Push2 {
        transfer_id: TransferId,
        filter: Filter,
        fsic: HistoryVector,
    },
    /// The snapshot itself, in either direction.
    Data {
        transfer_id: TransferId,
        payload: TransferPayload,
    },
}

impl Message {
    pub fn transfer_id(&self) -> &TransferId {
        match self {
            Message::Pull { transfer_id, .. }
            | Message::Push { transfer_id, .. }
            | Message::Push2 { transfer_id, .. }
            | Message::Data { transfer_id, .. } => transfer_id,
        }
    }

    /// Wire tag, used for dispatch logging and error reporting.
    pub fn tag(&self) -> &'static str {
        match self {
            Message::Pull { .. } => "PULL",
            Message::Push { .. } => "PUSH",
            Message::Push2 { .. } => "PUSH2",
            Message::Data { .. } => "DATA",
        }
    }
}

/// A message in flight between two nodes, addressed by instance identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub sender: InstanceId,
    pub receiver: InstanceId,
    pub session_id: SessionId,
    pub message: Message,
}
