// # Sync Protocol
//
// Message definitions for the pull/push exchange, per-peer session state,
// and the wire codec used when envelopes leave the process.

mod codec;
mod message;
mod session;

pub use codec::EnvelopeCodec;
pub use message::{Envelope, Message, TransferPayload};
pub use session::SyncSession;
