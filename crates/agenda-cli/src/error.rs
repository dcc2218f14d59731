use std::io;

use agenda_core::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] agenda_core::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No item title provided")]
    EmptyTitle,
    #[error("ID cannot be empty")]
    EmptyId,
    #[error("Item not found for id/prefix: {0}")]
    ItemNotFound(String),
    #[error("Conflict not found for id/prefix: {0}")]
    ConflictNotFound(String),
    #[error("{0}")]
    AmbiguousId(String),
    #[error("Invalid start time '{0}': expected RFC 3339, e.g. 2026-03-01T10:00:00Z")]
    InvalidTime(String),
    #[error("Invalid patch: {0}")]
    InvalidPatch(String),
}
