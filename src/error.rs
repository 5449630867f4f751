//! Error types for the indexing and search paths.
//!
//! Configuration, storage and CLI plumbing use `anyhow`; the types here are
//! the ones callers have to branch on.

use thiserror::Error;

/// Failure reported by a [`SearchEngineClient`](crate::engine::SearchEngineClient).
#[derive(Error, Debug)]
pub enum EngineError {
    /// Engine unreachable or the request timed out.
    #[error("Search engine connection error: {0}")]
    Connection(String),

    /// The collection or document already exists.
    #[error("Already exists: {0}")]
    Conflict(String),

    /// The collection or document does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success response.
    #[error("Search engine rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("Invalid search engine response: {0}")]
    Decode(String),
}

impl EngineError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Conflict(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, EngineError::Connection(_))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            EngineError::Connection(err.to_string())
        } else if err.is_decode() {
            EngineError::Decode(err.to_string())
        } else {
            EngineError::Rejected {
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                message: err.to_string(),
            }
        }
    }
}

/// A catalog item that cannot be turned into a search document.
#[derive(Error, Debug, PartialEq)]
pub enum TransformError {
    #[error("catalog item has an empty identifier")]
    MissingId,

    #[error("item {item_id}: invalid {field} timestamp '{value}'")]
    InvalidTimestamp {
        item_id: String,
        field: &'static str,
        value: String,
    },

    #[error("item {item_id}: {field} is not a finite number")]
    InvalidNumber {
        item_id: String,
        field: &'static str,
    },
}

/// Why a single item was not indexed.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("Progress store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// A failed search request. Shown to users as one message, never as
/// partial results.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("An error occurred while performing the search: {0}")]
    Engine(#[from] EngineError),

    #[error("An error occurred while performing the search: {0}")]
    Catalog(#[from] anyhow::Error),
}
