//! Error types for the subscription manager.
//!
//! Only configuration errors are surfaced synchronously at
//! [`subscribe`](crate::supervisor::subscribe) time. Transport-level
//! failures are converted into [`ConnectionState`](crate::state::ConnectionState)
//! transitions by the supervisor and never escape as errors or panics.

use thiserror::Error;

/// Errors that can occur while opening or driving a subscription.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The subscription spec names no table.
    #[error("subscription spec has an empty table name")]
    EmptyTableName,

    /// The subscription spec requests no event kinds.
    #[error("subscription spec requests no event kinds")]
    NoEventKinds,

    /// The transport failed to open or maintain a channel.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

impl FeedError {
    /// Returns `true` if this error is a local configuration error that
    /// is never retried.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, FeedError::EmptyTableName | FeedError::NoEventKinds)
    }
}
