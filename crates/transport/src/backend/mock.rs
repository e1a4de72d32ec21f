//! Scripted in-memory transport for testing.

use crate::backend::ChunkStream;
use crate::error::{ErrorKind, Result};
use crate::ScanTransport;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tfscan_protocol::{JobId, JobStatus, Percent, ProgressEvent, ScanConfig, StatusSnapshot};
use tokio::sync::Mutex;

/// One step of a scripted event-stream response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStep {
    /// Deliver these bytes as one chunk.
    Chunk(Vec<u8>),
    /// Wait before the next step (use with a paused Tokio clock).
    Delay(Duration),
    /// Fail the connection mid-body.
    Disconnect,
    /// Never deliver anything else, never close.
    Hang,
}
impl StreamStep {
    /// A chunk holding exactly one encoded event frame.
    pub fn frame(event: &ProgressEvent) -> Self {
        Self::Chunk(event.encode().into_bytes())
    }

    /// A chunk holding arbitrary text (partial frames, garbage, ...).
    pub fn text(text: impl AsRef<str>) -> Self {
        Self::Chunk(text.as_ref().as_bytes().to_vec())
    }
}

/// One scripted answer from the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReply {
    Snapshot(StatusSnapshot),
    /// The request fails at the network level.
    Fail,
}
impl StatusReply {
    pub fn running(job_id: impl Into<JobId>, percent: u8, message: impl Into<String>) -> Self {
        Self::snapshot(job_id, JobStatus::Running, percent, message)
    }

    pub fn completed(job_id: impl Into<JobId>) -> Self {
        Self::snapshot(job_id, JobStatus::Completed, 100, "")
    }

    pub fn failed(job_id: impl Into<JobId>, message: impl Into<String>) -> Self {
        Self::snapshot(job_id, JobStatus::Failed, 0, message)
    }

    fn snapshot(job_id: impl Into<JobId>, status: JobStatus, percent: u8, message: impl Into<String>) -> Self {
        Self::Snapshot(StatusSnapshot {
            job_id: job_id.into(),
            status,
            percent: Percent::saturating(percent),
            message: message.into(),
        })
    }
}

enum StreamScript {
    Refused,
    Unsupported,
    Steps(Vec<StreamStep>),
}

struct ReleaseGuard(Arc<AtomicUsize>);
impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scripted in-memory transport for testing.
///
/// By default every operation fails: the stream connection is refused, no job
/// can be started and the status endpoint answers `404`. Each behaviour is then
/// scripted with a `with_*` builder. Status replies are served in order, and
/// the last one repeats forever.
///
/// The transport also counts calls, and how many stream bodies have been
/// released (dropped), so tests can assert on side effects.
///
/// # Examples
///
/// ```
/// use tfscan_protocol::{JobId, ProgressEvent};
/// use tfscan_transport::backend::{MockTransport, StatusReply, StreamStep};
///
/// let transport = MockTransport::default()
///     .with_stream([
///         StreamStep::text("data: {\"job_id\":\"j1\",\"perc"),
///         StreamStep::text("ent\":40,\"message\":\"s3\"}\n\n"),
///         StreamStep::frame(&ProgressEvent::Completed { job_id: JobId::new("j1") }),
///     ])
///     .with_statuses([StatusReply::running("j1", 40, "s3"), StatusReply::completed("j1")]);
/// assert_eq!(transport.stream_opens(), 0);
/// ```
pub struct MockTransport {
    name: String,
    stream: StreamScript,
    job: Option<JobId>,
    statuses: Mutex<VecDeque<StatusReply>>,
    status_delay: Option<Duration>,
    stream_opens: AtomicUsize,
    start_calls: AtomicUsize,
    status_calls: AtomicUsize,
    released: Arc<AtomicUsize>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            stream: StreamScript::Refused,
            job: None,
            statuses: Mutex::new(VecDeque::new()),
            status_delay: None,
            stream_opens: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockTransport {
    /// Change the name of the mock transport.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Serve this body on every stream request.
    pub fn with_stream(mut self, steps: impl IntoIterator<Item = StreamStep>) -> Self {
        self.stream = StreamScript::Steps(steps.into_iter().collect());
        self
    }

    /// Answer stream requests successfully, but without an event stream.
    pub fn with_unsupported_stream(mut self) -> Self {
        self.stream = StreamScript::Unsupported;
        self
    }

    /// Allow non-streaming job starts, returning this identifier.
    pub fn with_job(mut self, job_id: impl Into<JobId>) -> Self {
        self.job = Some(job_id.into());
        self
    }

    pub fn with_statuses(mut self, replies: impl IntoIterator<Item = StatusReply>) -> Self {
        self.statuses = Mutex::new(replies.into_iter().collect());
        self
    }

    /// Delay every status reply, simulating a slow request.
    pub fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = Some(delay);
        self
    }

    pub fn stream_opens(&self) -> usize {
        self.stream_opens.load(Ordering::SeqCst)
    }

    /// Number of stream bodies that have been dropped by their consumer.
    pub fn released_streams(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScanTransport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open_stream(&self, _config: &ScanConfig) -> Result<ChunkStream> {
        self.stream_opens.fetch_add(1, Ordering::SeqCst);
        let steps = match &self.stream {
            StreamScript::Refused => exn::bail!(ErrorKind::Connect),
            StreamScript::Unsupported => exn::bail!(ErrorKind::Unsupported),
            StreamScript::Steps(steps) => steps.clone(),
        };
        let guard = ReleaseGuard(Arc::clone(&self.released));
        Ok(Box::pin(stream! {
            let _guard = guard;
            for step in steps {
                match step {
                    StreamStep::Chunk(bytes) => {
                        yield Ok(bytes);
                    },
                    StreamStep::Delay(delay) => tokio::time::sleep(delay).await,
                    StreamStep::Disconnect => {
                        yield Err(exn::Exn::from(ErrorKind::Network));
                        return;
                    },
                    StreamStep::Hang => std::future::pending::<()>().await,
                }
            }
        }))
    }

    async fn start_job(&self, _config: &ScanConfig) -> Result<JobId> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        match &self.job {
            Some(job_id) => Ok(job_id.clone()),
            None => exn::bail!(ErrorKind::Connect),
        }
    }

    async fn status(&self, _job_id: &JobId) -> Result<StatusSnapshot> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.status_delay {
            tokio::time::sleep(delay).await;
        }
        let reply = {
            let mut queue = self.statuses.lock().await;
            if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() }
        };
        match reply {
            Some(StatusReply::Snapshot(snapshot)) => Ok(snapshot),
            Some(StatusReply::Fail) => exn::bail!(ErrorKind::Network),
            None => exn::bail!(ErrorKind::Status(404)),
        }
    }
}
