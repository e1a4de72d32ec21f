//! Protocol Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Every error raised here describes a
//! single frame or payload; none of them should end a scan.

use derive_more::{Display, Error};

/// A decode error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;
/// The error produced when a frame cannot be turned into a
/// [`ProgressEvent`](crate::ProgressEvent).
pub type DecodeError = Error;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
/// For every variant the answer is the same: log it and move on to the next frame.
#[derive(Debug, Display, Error, Clone, PartialEq)]
pub enum ErrorKind {
    /// The frame did not contain a single `data:` line.
    #[display("frame carries no payload")]
    MissingPayload,
    /// The payload was not valid structured data.
    #[display("malformed payload")]
    MalformedPayload,
    /// A field required for the event variant was absent.
    #[display("missing field: {_0}")]
    MissingField(#[error(not(source))] &'static str),
    /// Percentages must be finite and within `0..=100`.
    #[display("percent out of range: {_0}")]
    PercentOutOfRange(#[error(not(source))] f64),
    /// The `event_type` discriminator named a variant this client does not know.
    #[display("unknown event type: {_0}")]
    UnknownEventType(#[error(not(source))] String),
    /// A provider name that does not map onto [`Provider`](crate::Provider).
    #[display("unknown provider: {_0}")]
    UnknownProvider(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
