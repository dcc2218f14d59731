//! Remote calendar provider interface.
//!
//! The engine only talks to the provider through [`RemoteProvider`]; the
//! HTTP implementation lives in [`http`] and tests use an in-memory fake.
//! Every operation returns a structured value or a typed [`RemoteError`].

pub mod correlation;
pub mod http;
pub mod resolver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::util::compact_text;

pub use correlation::CorrelationKey;
pub use http::HttpCalendarProvider;
pub use resolver::RemoteResolver;

/// Failures reported by a remote provider
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Timeouts, rate limits and server errors; retry with backoff
    #[error("Transient remote failure: {0}")]
    Transient(String),
    /// Create refused because an object with the same identity exists
    #[error("Remote object already exists: {0}")]
    AlreadyExists(String),
    #[error("Remote object not found: {0}")]
    NotFound(String),
    /// The provider answered but the body could not be used
    #[error("Malformed remote response: {0}")]
    MalformedResponse(String),
    #[error("Remote rejected request with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
    /// Network-level failure before any response arrived
    #[error("Remote provider unreachable: {0}")]
    Unreachable(String),
}

impl RemoteError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = compact_text(body);
        match status {
            404 | 410 => Self::NotFound(message),
            409 | 412 => Self::AlreadyExists(message),
            408 | 425 | 429 | 500..=599 => Self::Transient(format!("HTTP {status}: {message}")),
            _ => Self::Rejected { status, message },
        }
    }

    /// Whether a later attempt may succeed without operator action
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Unreachable(_))
    }

    /// Whether a create collided with an existing object
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Identifier of a remote object found by a lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRef {
    pub id: String,
}

impl RemoteRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Outcome of a create call; `id` is `None` when the body carried no usable id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateResponse {
    pub id: Option<String>,
}

/// Remote object state observed by a verification pull
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub id: String,
    /// Provider status, e.g. `confirmed` or `cancelled`
    pub status: Option<String>,
    /// Raw start timestamp as reported by the provider
    pub start: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
}

impl RemoteObject {
    /// Cancelled objects linger in some providers but count as gone
    pub fn is_live(&self) -> bool {
        !self
            .status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case("cancelled"))
    }
}

/// Operations the engine needs from a calendar/task provider
///
/// Lookups return at most one object. `get_object` returns `Ok(None)` when the
/// provider reports the object as gone.
#[async_trait]
pub trait RemoteProvider: Send + Sync {
    async fn lookup_by_uid(&self, container_id: &str, uid: &str)
        -> RemoteResult<Option<RemoteRef>>;

    async fn lookup_by_private_key(
        &self,
        container_id: &str,
        key: &str,
        value: &str,
    ) -> RemoteResult<Option<RemoteRef>>;

    async fn create_object(&self, container_id: &str, payload: &Value)
        -> RemoteResult<CreateResponse>;

    async fn get_object(
        &self,
        container_id: &str,
        remote_id: &str,
    ) -> RemoteResult<Option<RemoteObject>>;

    async fn update_object(
        &self,
        container_id: &str,
        remote_id: &str,
        payload: &Value,
    ) -> RemoteResult<()>;
}
