//! Scan progress sessions.
//!
//! A [`ScanSession`] follows one scan from request to terminal state. It
//! prefers the server's event stream ([`StreamDriver`]) and falls back to
//! polling the job's status ([`PollingDriver`]) when the stream is unavailable
//! or ends early. Both feed the same state machine, so callers implementing
//! [`ScanObserver`] cannot tell which mechanism delivered an update.
//!
//! [`ScanController`] is the front door for interactive callers: it runs one
//! session at a time in the background and exposes cancellation and status.

pub mod controller;
pub mod error;
pub mod observer;
pub mod poll;
pub mod session;
pub mod state;
pub mod stream;

pub use crate::controller::{ScanController, ScanTicket};
pub use crate::observer::{ScanObserver, SessionEvent};
pub use crate::poll::{PollOutcome, PollingDriver};
pub use crate::session::{Outcome, ScanSession, SessionHandle, SessionOptions, SessionToken};
pub use crate::state::{ScanStatus, SessionState};
pub use crate::stream::{StreamDriver, StreamOutcome};
