use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::protocol::Message;
use crate::types::{InstanceId, SessionId, TransferId};

/// State of a sync session between two nodes.
///
/// Both endpoints hold a mirrored copy keyed by the same session id. The
/// request counter produces unique transfer ids across the session's
/// lifetime, and the ongoing-request slot holds at most one parked request
/// awaiting service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSession {
    pub session_id: SessionId,
    pub client_instance: InstanceId,
    pub server_instance: InstanceId,
    pub request_counter: u64,
    pub ongoing_request: Option<Message>,
}

impl SyncSession {
    /// Builds the session record for a client/server pair; both sides call
    /// this with the same arguments and obtain identical state.
    pub fn new(client_instance: InstanceId, server_instance: InstanceId) -> Self {
        let session_id = SessionId::for_pair(&client_instance, &server_instance);
        Self {
            session_id,
            client_instance,
            server_instance,
            request_counter: 0,
            ongoing_request: None,
        }
    }

    /// The other endpoint as seen from `own`.
    pub fn peer_of(&self, own: &InstanceId) -> Result<&InstanceId> {
        if *own == self.client_instance {
            Ok(&self.server_instance)
        } else if *own == self.server_instance {
            Ok(&self.client_instance)
        } else {
            Err(SyncError::UnknownPeer(format!(
                "instance '{}' is not an endpoint of session {}",
                own, self.session_id
            )))
        }
    }

    /// Consumes the next request ordinal and returns the transfer id for it.
    pub fn next_transfer_id(&mut self) -> TransferId {
        self.request_counter += 1;
        TransferId::new(&self.session_id, self.request_counter)
    }

    /// Parks a request in the ongoing slot for servicing.
    pub fn park_request(&mut self, message: Message) {
        self.ongoing_request = Some(message);
    }

    /// Takes the parked request, leaving the slot free.
    pub fn take_request(&mut self) -> Option<Message> {
        self.ongoing_request.take()
    }
}
