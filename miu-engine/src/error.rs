//! Error types for miu-engine
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use crate::collaborators::{ResolverError, TransportError};
use crate::playback::queue::EnqueueRejection;
use thiserror::Error;

/// Main error type for miu-engine
#[derive(Error, Debug)]
pub enum Error {
    /// Errors bubbled up from miu-common (config loading, shared db helpers)
    #[error(transparent)]
    Common(#[from] miu_common::Error),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Queue management errors
    #[error("Queue error: {0}")]
    Queue(String),

    /// Enqueue refused by the duplicate / cooldown guard
    #[error("Request rejected: {0}")]
    Rejected(EnqueueRejection),

    /// Playback engine errors
    #[error("Playback error: {0}")]
    Playback(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Voice transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Media resolver errors
    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    /// Audio cache errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Command sent after shutdown
    #[error("Engine is stopped")]
    EngineStopped,

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<EnqueueRejection> for Error {
    fn from(rejection: EnqueueRejection) -> Self {
        Error::Rejected(rejection)
    }
}

/// Convenience Result type using miu-engine Error
pub type Result<T> = std::result::Result<T, Error>;
