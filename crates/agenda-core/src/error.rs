//! Error types for agenda-core

use thiserror::Error;

use crate::config::ConfigError;
use crate::remote::RemoteError;

/// Result type alias using agenda-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in agenda-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Item or conflict not found (or conflict no longer open)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote provider failure
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Retry ceiling reached; the item needs a manual reset
    #[error("Sync attempts exceeded for item {item_id} ({attempts} attempts)")]
    AttemptsExceeded { item_id: String, attempts: u32 },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
