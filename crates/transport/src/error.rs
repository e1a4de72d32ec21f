//! Transport Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! None of these errors are shown to the person running the scan directly:
//! the session layer decides whether a failure means "fall back to polling",
//! "retry on the next tick", or (only when nothing else is left) "give up".

use derive_more::{Display, Error};

/// A transport error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The configured endpoint could not be turned into a request URL.
    #[display("invalid endpoint: {_0}")]
    InvalidEndpoint(#[error(not(source))] String),
    /// No connection could be established (DNS, TLS, refused, timed out).
    #[display("connection failed")]
    Connect,
    /// The server answered, but not with a success status.
    #[display("unexpected HTTP status: {_0}")]
    Status(#[error(not(source))] u16),
    /// The server answered successfully, but not with an event stream.
    #[display("server does not support event streaming")]
    Unsupported,
    /// An established connection failed mid-flight.
    #[display("network error")]
    Network,
    /// A response body could not be understood.
    #[display("invalid response body")]
    InvalidResponse,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect | Self::Network => true,
            Self::Status(code) => *code == 429 || (500..600).contains(code),
            Self::InvalidEndpoint(_) | Self::Unsupported | Self::InvalidResponse => false,
        }
    }
}
