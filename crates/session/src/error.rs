//! Session Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Most failures below the session are absorbed (a broken stream falls back
//! to polling, a failed poll is retried on the next tick), so the only errors
//! that surface from a session are the ones left once every delivery
//! mechanism has been tried.

use derive_more::{Display, Error};

/// A session error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a session failure.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The event stream could not be opened.
    #[display("event stream unavailable")]
    Stream,
    /// The non-streaming job start request failed.
    #[display("scan job could not be started")]
    StartJob,
    /// The polling driver's first status request failed.
    #[display("scan status unavailable")]
    Poll,
    /// Neither the stream nor polling could start or follow the job.
    #[display("scan could not be started or monitored")]
    Exhausted,
    /// The task running the session panicked or was aborted.
    #[display("scan task aborted")]
    Aborted,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Stream | Self::StartJob | Self::Poll | Self::Exhausted)
    }
}
