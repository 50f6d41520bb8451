use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Sync data structure is missing the universal filter entry")]
    MissingUniversalFilter,

    #[error("Inconsistent state: {0}")]
    InconsistentState(String),

    #[error("Unknown message in request slot: {0}")]
    UnknownMessage(String),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

// Error conversions for common error types

impl From<bincode::error::EncodeError> for SyncError {
    fn from(e: bincode::error::EncodeError) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for SyncError {
    fn from(e: bincode::error::DecodeError) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}
