use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Note, NoteId};

mod http;
pub mod normalize;
#[cfg(test)]
pub(crate) mod testing;

pub use http::HttpRemote;

/// Expected outcomes of a remote call.
///
/// `Unconfigured` and `Unavailable` are not errors: the engine treats both as
/// "the local copy is authoritative" and carries on silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome<T> {
    /// No base URL was configured for this session; nothing was sent.
    Unconfigured,
    /// Every candidate endpoint was unreachable or answered with a non-2xx
    /// status, or a 2xx answer had a shape that could not be used.
    Unavailable,
    Value(T),
}

/// Unexpected failures. Only these surface as a user-visible error, and only
/// these roll back an optimistic delete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Transport(String),
    #[error("Malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },
    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Transport(err.to_string())
    }
}

pub type RemoteResult<T> = Result<RemoteOutcome<T>, RemoteError>;

/// Operations the sync engine needs from a note service.
#[async_trait]
pub trait NoteRemote: Send + Sync {
    async fn fetch_all(&self) -> RemoteResult<Vec<Note>>;
    async fn create(&self, title: &str, content: &str) -> RemoteResult<Note>;
    async fn update(&self, id: &NoteId, title: &str, content: &str) -> RemoteResult<Note>;
    async fn delete(&self, id: &NoteId) -> RemoteResult<()>;
}
