//! Wire model and event-stream decoding for scan progress.
//!
//! The scan server reports progress in two shapes:
//!
//! - **Event stream**: a long-lived response body made of blank-line
//!   delimited frames, each with a `data:` line holding a JSON payload. Bytes
//!   go through a [`FrameParser`] and each frame through [`decode`].
//! - **Status snapshots**: the polling endpoint's [`StatusSnapshot`].
//!
//! Both end up as a [`ProgressEvent`], the single message type every
//! downstream consumer works with.

mod decode;
pub mod error;
mod frame;
pub mod models;

pub use crate::decode::{PAYLOAD_MARKER, decode};
pub use crate::frame::FrameParser;
pub use crate::models::{JobId, JobStatus, Percent, ProgressEvent, Provider, ScanConfig, StatusSnapshot};
