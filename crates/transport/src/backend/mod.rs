//! Scan transport trait and implementations.
//!
//! This module defines the `ScanTransport` trait, which hides how the client
//! talks to the scan server (HTTP in production, a scripted in-memory double
//! in tests) behind the three operations the session layer needs.

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "http")]
pub use self::http::{Endpoints, HttpTransport};
#[cfg(feature = "mock")]
pub use self::mock::{MockTransport, StatusReply, StreamStep};
use crate::error::Result;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use tfscan_protocol::{JobId, ScanConfig, StatusSnapshot};

/// A live response body, yielded chunk by chunk as it arrives.
///
/// Dropping the stream releases the underlying connection.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send + 'static>>;

/// Unified interface to the scan server.
///
/// # Examples
///
/// ```no_run
/// use futures::StreamExt;
/// use tfscan_protocol::{FrameParser, Provider, ScanConfig};
/// use tfscan_transport::{ScanTransport, error::Result};
///
/// async fn count_frames(transport: &dyn ScanTransport) -> Result<usize> {
///     let config = ScanConfig::new(Provider::Aws, "default");
///     let mut body = transport.open_stream(&config).await?;
///     let mut parser = FrameParser::new();
///     let mut frames = 0;
///     while let Some(chunk) = body.next().await {
///         frames += parser.feed(&chunk?).len();
///     }
///     Ok(frames)
/// }
/// ```
#[async_trait]
pub trait ScanTransport: Send + Sync {
    /// Name of the transport, for logging only.
    fn name(&self) -> &str;

    /// Start a scan and return its progress as a live event-stream body.
    ///
    /// Resolves as soon as the response headers arrive; the body is never
    /// buffered in full. Fails with
    /// [`Unsupported`](crate::error::ErrorKind::Unsupported) if the server
    /// answers without an event stream, and with
    /// [`Connect`](crate::error::ErrorKind::Connect) if the request could not
    /// be sent at all.
    async fn open_stream(&self, config: &ScanConfig) -> Result<ChunkStream>;

    /// Start a scan without streaming, returning the job identifier to poll.
    async fn start_job(&self, config: &ScanConfig) -> Result<JobId>;

    /// Fetch one status snapshot for a job.
    async fn status(&self, job_id: &JobId) -> Result<StatusSnapshot>;
}
