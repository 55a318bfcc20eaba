use std::sync::Arc;
use thiserror::Error;

use crate::dns::ParseError;

/// Unified error type for the whole crate
#[derive(Debug, Clone, Error)]
pub enum GungnirError {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    // Configuration / session-state errors
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Session error: {0}")]
    Session(String),

    // Query data errors
    #[error("Query data error: {0}")]
    Repository(String),

    // Network errors
    #[error("Socket error: {0}")]
    Socket(String),

    // Wire format errors
    #[error("Wire format error: {0}")]
    Wire(#[from] ParseError),
}

impl From<std::io::Error> for GungnirError {
    fn from(err: std::io::Error) -> Self {
        GungnirError::Io(Arc::new(err))
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, GungnirError>;
