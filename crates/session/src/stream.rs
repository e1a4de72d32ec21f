use exn::ResultExt;
use futures::StreamExt;
use tfscan_protocol::{FrameParser, JobId, ProgressEvent, ScanConfig, decode};
use tfscan_transport::TransportHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// How an opened event stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// A terminal event was dispatched. The connection has been released
    /// without waiting for the server to close it.
    Terminal,
    /// The connection closed or broke before any terminal event. This is the
    /// fallback trigger, not a failure: the job may well still be running.
    /// Carries the job identifier if at least one event revealed it.
    Inconclusive { job_id: Option<JobId> },
    /// Cancellation was observed; nothing was dispatched after it.
    Cancelled,
}

/// Delivers a scan's progress from the live event stream.
///
/// Chunks are read strictly one after the other, fed to a [`FrameParser`]
/// owned by this call (and therefore by this one connection), and every frame
/// is decoded and dispatched before the next chunk is requested. Malformed
/// frames are logged and skipped.
///
/// Cancellation is cooperative: the token is checked before every dispatch,
/// so once it is set the sink goes silent even if decoded frames from an
/// already-received chunk are still pending. A read that is waiting on the
/// network is abandoned as soon as the token fires.
pub struct StreamDriver<'a> {
    transport: &'a TransportHandle,
    cancel: &'a CancellationToken,
}

impl<'a> StreamDriver<'a> {
    pub fn new(transport: &'a TransportHandle, cancel: &'a CancellationToken) -> Self {
        Self { transport, cancel }
    }

    /// Open the stream for `config` and dispatch its events, in arrival order,
    /// to `sink` until the stream ends.
    ///
    /// `sink` returns whether it accepted the event. Only an accepted terminal
    /// event ends the stream; a rejected one (for another job, say) is skipped
    /// like any other event the caller had no use for.
    ///
    /// Returns an error only if the connection could not be established at
    /// all. Every other ending is described by the [`StreamOutcome`], and the
    /// connection is released on every path.
    #[instrument(skip_all, fields(transport = self.transport.name()))]
    pub async fn open(&self, config: &ScanConfig, mut sink: impl FnMut(ProgressEvent) -> bool) -> Result<StreamOutcome> {
        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(StreamOutcome::Cancelled),
            opened = self.transport.open_stream(config) => opened,
        };
        let mut body = opened.or_raise(|| ErrorKind::Stream)?;
        let mut parser = FrameParser::new();
        let mut job_id: Option<JobId> = None;

        loop {
            let chunk = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ok(StreamOutcome::Cancelled),
                chunk = body.next() => chunk,
            };
            let chunk = match chunk {
                Some(Ok(chunk)) => chunk,
                Some(Err(err)) => {
                    tracing::warn!(error = ?err, "Event stream broke before a terminal event");
                    return Ok(StreamOutcome::Inconclusive { job_id });
                },
                None => break,
            };
            for frame in parser.feed(&chunk) {
                if self.cancel.is_cancelled() {
                    return Ok(StreamOutcome::Cancelled);
                }
                let event = match decode(&frame) {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = ?err, frame_len = frame.len(), "Skipping malformed frame");
                        continue;
                    },
                };
                let event_job = event.job_id().clone();
                let terminal = event.is_terminal();
                if !sink(event) {
                    tracing::debug!(job_id = %event_job, terminal, "Event rejected by sink");
                    continue;
                }
                if job_id.is_none() {
                    job_id = Some(event_job);
                }
                if terminal {
                    return Ok(StreamOutcome::Terminal);
                }
            }
        }

        if let Some(rest) = parser.finish() {
            tracing::debug!(bytes = rest.len(), "Discarding unterminated frame at end of stream");
        }
        tracing::info!(job_id = ?job_id, "Event stream closed without a terminal event");
        Ok(StreamOutcome::Inconclusive { job_id })
    }
}
