// SyncStore - Partition-aware replicated record store
// Core library module

pub mod digest;
pub mod error;
pub mod history;
pub mod node;
pub mod protocol;
pub mod store;
pub mod sync;
pub mod transport;
pub mod types;

pub use error::{Result, SyncError};
pub use history::{compare_versions, HistoryVector, VersionOrdering, VersionStamp};
pub use node::Node;
pub use protocol::{Envelope, Message, SyncSession, TransferPayload};
pub use store::{AppData, AppRecord, DirtyState, Store, StoreRecord};
pub use transport::{MemoryTransport, Network, Transport};
pub use types::{Filter, FilterKey, InstanceId, RecordId, SessionId, TransferId};
