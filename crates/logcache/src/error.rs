//! Error types for the tail and query engine.

use thiserror::Error;

use crate::types::TimeRange;

/// Errors returned by a fetch primitive.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// The response could not be decoded into envelopes.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Errors that can occur while tailing or querying.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed bounds or conflicting filters, rejected before any fetch.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A single fetch failed.
    #[error("fetch for source {source_id} over {window} failed: {source}")]
    Fetch {
        /// Source being fetched
        source_id: String,
        /// Window being fetched
        window: TimeRange,
        /// Underlying failure
        #[source]
        source: FetchError,
    },

    /// Follow mode gave up after too many consecutive failed fetches.
    #[error("giving up on source {source_id} after {attempts} consecutive failed fetches from {from}: {source}")]
    RetriesExhausted {
        /// Source being followed
        source_id: String,
        /// Consecutive failures observed
        attempts: u32,
        /// Window start of the last attempt
        from: i64,
        /// Last failure
        #[source]
        source: FetchError,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Writing to the output sink failed.
    #[error("sink error: {0}")]
    Sink(#[from] std::io::Error),

    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Returns true for errors caused by the caller's input.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    /// Returns true if the caller cancelled the operation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
