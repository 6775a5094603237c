//! Error types for the timetable engine.

use thiserror::Error;

/// All possible errors from the timetable engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Lookup errors
    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("ambiguous reference: code '{code}' matches {matches} entities")]
    AmbiguousReference { code: String, matches: usize },

    #[error("unknown day: {0}")]
    UnknownDay(String),

    // Boundary errors
    #[error("invalid pairing token: {0}")]
    InvalidToken(String),

    #[error("import produced no profiles")]
    ImportEmpty,

    #[error("invalid import payload: {0}")]
    InvalidImport(String),

    #[error("replication failure: {0}")]
    ReplicationFailure(String),

    #[error("invalid remote notification: {0}")]
    InvalidNotification(String),

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
