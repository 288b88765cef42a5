use std::io;

use thiserror::Error;

/// Error taxonomy for the boundary API.
#[derive(Debug, Error)]
pub enum RudpError {
    #[error("invalid profile value for `{field}`: {value}")]
    Config { field: &'static str, value: String },

    #[error("malformed segment: {0}")]
    Malformed(String),

    #[error("operation on a closed connection")]
    Closed,

    #[error("accept timed out")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, RudpError>;

/// Reason an established connection asynchronously failed. Delivered to
/// [`crate::listener::ConnectionListener::connection_failure`]; distinct
/// from [`RudpError`] because it is never returned from a call, only
/// observed by a listener after the engine has already torn the
/// connection down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    RetransmissionLimitExceeded,
    UnexpectedReset,
    NullSegmentTimeout,
}
