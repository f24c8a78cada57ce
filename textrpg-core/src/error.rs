//! Error types for textrpg-core

use thiserror::Error;

/// Main error type for the textrpg-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// REST call to the backend failed or returned a non-success status
    #[error("backend error: {0}")]
    Backend(String),

    /// Session not found on the backend
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Message was empty after trimming
    #[error("message is empty")]
    EmptyMessage,
}

/// Result type alias for textrpg-core
pub type Result<T> = std::result::Result<T, Error>;
