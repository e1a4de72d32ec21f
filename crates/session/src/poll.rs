use std::time::Duration;
use tfscan_protocol::{JobId, ProgressEvent};
use tfscan_transport::TransportHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A terminal snapshot was dispatched.
    Terminal,
    Cancelled,
}

/// Delivers a scan's progress by periodically requesting its status.
///
/// The first request is issued immediately and each following one waits for
/// the previous to finish and for the next tick, so there is never more than
/// one request in flight. A tick missed because of a slow request is not made
/// up for with a burst. Transient request failures are retried on the next
/// tick.
pub struct PollingDriver<'a> {
    transport: &'a TransportHandle,
    cancel: &'a CancellationToken,
    interval: Duration,
}

impl<'a> PollingDriver<'a> {
    pub fn new(transport: &'a TransportHandle, cancel: &'a CancellationToken, interval: Duration) -> Self {
        Self { transport, cancel, interval }
    }

    /// Poll `job_id` until it reaches a terminal status, dispatching every
    /// snapshot to `sink` as a [`ProgressEvent`].
    ///
    /// `sink` returns whether it accepted the event. A terminal snapshot the
    /// sink rejected does not stop polling.
    ///
    /// With `strict_first`, a failure of the very first request is returned as
    /// an error instead of being retried.
    #[instrument(skip_all, fields(job_id = %job_id, interval_ms = self.interval.as_millis() as u64))]
    pub async fn run(&self, job_id: &JobId, strict_first: bool, mut sink: impl FnMut(ProgressEvent) -> bool) -> Result<PollOutcome> {
        let mut ticks = tokio::time::interval(self.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempt: u64 = 0;

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ok(PollOutcome::Cancelled),
                _ = ticks.tick() => {},
            }
            attempt += 1;
            let reply = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ok(PollOutcome::Cancelled),
                reply = self.transport.status(job_id) => reply,
            };
            let snapshot = match reply {
                Ok(snapshot) => snapshot,
                Err(err) if strict_first && attempt == 1 => return Err(err.raise(ErrorKind::Poll)),
                Err(err) => {
                    tracing::debug!(error = ?err, attempt, retryable = err.is_retryable(), "Status request failed");
                    continue;
                },
            };
            if self.cancel.is_cancelled() {
                return Ok(PollOutcome::Cancelled);
            }
            tracing::trace!(attempt, status = ?snapshot.status, percent = %snapshot.percent, "Status received");
            let event = snapshot.into_event();
            let terminal = event.is_terminal();
            if !sink(event) {
                tracing::debug!(attempt, terminal, "Snapshot rejected by sink");
                continue;
            }
            if terminal {
                return Ok(PollOutcome::Terminal);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tfscan_transport::backend::{MockTransport, StatusReply};

    const INTERVAL: Duration = Duration::from_millis(500);

    fn job() -> JobId {
        JobId::new("job-9")
    }

    async fn poll(mock: MockTransport, strict_first: bool) -> (Result<PollOutcome>, Vec<ProgressEvent>, Arc<MockTransport>) {
        let mock = Arc::new(mock);
        let transport: TransportHandle = mock.clone();
        let cancel = CancellationToken::new();
        let mut events = Vec::new();
        let outcome = PollingDriver::new(&transport, &cancel, INTERVAL)
            .run(&job(), strict_first, |event| {
                events.push(event);
                true
            })
            .await;
        (outcome, events, mock)
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_completed() {
        let mock = MockTransport::default().with_statuses([
            StatusReply::running("job-9", 10, "iam"),
            StatusReply::running("job-9", 40, "s3"),
            StatusReply::running("job-9", 70, "ec2"),
            StatusReply::completed("job-9"),
        ]);
        let (outcome, events, mock) = poll(mock, false).await;
        assert_eq!(outcome.unwrap(), PollOutcome::Terminal);
        let kinds: Vec<_> = events.iter().map(ProgressEvent::event_type).collect();
        assert_eq!(kinds, vec!["progress", "progress", "progress", "completed"]);
        assert_eq!(mock.status_calls(), 4);

        tokio::time::sleep(INTERVAL * 10).await;
        assert_eq!(mock.status_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_request_is_immediate() {
        let start = tokio::time::Instant::now();
        let mock = MockTransport::default().with_statuses([StatusReply::completed("job-9")]);
        let (outcome, _, _) = poll(mock, false).await;
        assert_eq!(outcome.unwrap(), PollOutcome::Terminal);
        assert!(start.elapsed() < INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_is_terminal() {
        let mock = MockTransport::default().with_statuses([StatusReply::failed("job-9", "credentials expired")]);
        let (outcome, events, _) = poll(mock, false).await;
        assert_eq!(outcome.unwrap(), PollOutcome::Terminal);
        assert_eq!(events, vec![ProgressEvent::Error { job_id: job(), message: "credentials expired".to_string() }]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let mock = MockTransport::default().with_statuses([
            StatusReply::Fail,
            StatusReply::Fail,
            StatusReply::running("job-9", 50, "half"),
            StatusReply::completed("job-9"),
        ]);
        let (outcome, events, mock) = poll(mock, false).await;
        assert_eq!(outcome.unwrap(), PollOutcome::Terminal);
        assert_eq!(events.len(), 2);
        assert_eq!(mock.status_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_first_failure() {
        let mock = MockTransport::default().with_statuses([StatusReply::Fail, StatusReply::completed("job-9")]);
        let (outcome, events, mock) = poll(mock, true).await;
        assert_eq!(*outcome.unwrap_err(), ErrorKind::Poll);
        assert!(events.is_empty());
        assert_eq!(mock.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_only_applies_to_first_request() {
        let mock = MockTransport::default().with_statuses([
            StatusReply::running("job-9", 5, "a"),
            StatusReply::Fail,
            StatusReply::completed("job-9"),
        ]);
        let (outcome, events, _) = poll(mock, true).await;
        assert_eq!(outcome.unwrap(), PollOutcome::Terminal);
        assert_eq!(events.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_terminal_snapshot_keeps_polling() {
        let mock = Arc::new(
            MockTransport::default().with_statuses([StatusReply::completed("job-other"), StatusReply::completed("job-9")]),
        );
        let transport: TransportHandle = mock.clone();
        let cancel = CancellationToken::new();
        let mut accepted = Vec::new();
        let outcome = PollingDriver::new(&transport, &cancel, INTERVAL)
            .run(&job(), true, |event| {
                let ours = event.job_id() == &job();
                if ours {
                    accepted.push(event);
                }
                ours
            })
            .await;
        assert_eq!(outcome.unwrap(), PollOutcome::Terminal);
        assert_eq!(accepted, vec![ProgressEvent::Completed { job_id: job() }]);
        assert_eq!(mock.status_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_request() {
        let mock = Arc::new(
            MockTransport::default()
                .with_statuses([StatusReply::completed("job-9")])
                .with_status_delay(Duration::from_secs(2)),
        );
        let transport: TransportHandle = mock.clone();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let mut events = Vec::new();
        let outcome = PollingDriver::new(&transport, &cancel, INTERVAL)
            .run(&job(), false, |event| {
                events.push(event);
                true
            })
            .await;
        assert_eq!(outcome.unwrap(), PollOutcome::Cancelled);
        assert!(events.is_empty());
        assert_eq!(mock.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled() {
        let mock = Arc::new(MockTransport::default().with_statuses([StatusReply::completed("job-9")]));
        let transport: TransportHandle = mock.clone();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = PollingDriver::new(&transport, &cancel, INTERVAL).run(&job(), false, |_| true).await;
        assert_eq!(outcome.unwrap(), PollOutcome::Cancelled);
        assert_eq!(mock.status_calls(), 0);
    }
}
