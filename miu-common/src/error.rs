//! Common error types for MIU

use thiserror::Error;

/// Common result type for MIU operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by shared MIU code
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}
