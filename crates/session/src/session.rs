use derive_more::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tfscan_protocol::{JobId, ProgressEvent, ScanConfig};
use tfscan_transport::TransportHandle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::error::{Error, ErrorKind, Result};
use crate::observer::{ScanObserver, SessionEvent};
use crate::poll::{PollOutcome, PollingDriver};
use crate::state::{ScanStatus, SessionState, Tracker};
use crate::stream::{StreamDriver, StreamOutcome};

/// Tunables for a single session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Delay between two status requests once polling.
    pub poll_interval: Duration,
    /// Try the event stream first. When disabled the session goes straight
    /// to starting the job and polling it.
    pub streaming: bool,
}
impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            streaming: true,
        }
    }
}

/// Identifies one session among all sessions created by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("session-{_0}")]
pub struct SessionToken(u64);
impl SessionToken {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Decides whether a session may still talk to its observer.
///
/// A session is live while it has not been cancelled and its token is the one
/// recorded in `current`. Sessions created through a controller share the
/// controller's `current`, so starting a new scan silences the previous one
/// even before it notices its cancellation.
#[derive(Debug, Clone)]
pub(crate) struct Gate {
    token: SessionToken,
    current: Arc<AtomicU64>,
    cancel: CancellationToken,
}
impl Gate {
    fn standalone() -> Self {
        let token = SessionToken::next();
        Self {
            token,
            current: Arc::new(AtomicU64::new(token.get())),
            cancel: CancellationToken::new(),
        }
    }

    /// Mint a new token and make it the current one in `current`.
    pub(crate) fn claim(current: &Arc<AtomicU64>) -> Self {
        let token = SessionToken::next();
        current.store(token.get(), Ordering::SeqCst);
        Self {
            token,
            current: Arc::clone(current),
            cancel: CancellationToken::new(),
        }
    }

    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && self.current.load(Ordering::SeqCst) == self.token.get()
    }
}

/// Cheap, cloneable remote control for a running [`ScanSession`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    token: SessionToken,
    cancel: CancellationToken,
    status: watch::Receiver<ScanStatus>,
}
impl SessionHandle {
    pub fn token(&self) -> SessionToken {
        self.token
    }

    /// Request cancellation. Idempotent, and a no-op once the session ended.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Latest status published by the session.
    pub fn status(&self) -> ScanStatus {
        self.status.borrow().clone()
    }

    /// Watch the session's status as it changes.
    pub fn subscribe(&self) -> watch::Receiver<ScanStatus> {
        self.status.clone()
    }
}

/// How a session ended, when it ended without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed { job_id: JobId },
    /// The server reported the job as failed.
    Failed { message: String },
    Cancelled,
}

/// One scan, from request to terminal state.
///
/// The session first asks for the scan's event stream. If the stream cannot be
/// opened, or ends before a terminal event, it falls back to polling the job's
/// status; when no job identifier was learned from the stream a job is started
/// explicitly first. Whichever way progress is delivered, the observer sees the
/// same sequence of hooks, and at most one of `on_completed`/`on_error`.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tfscan_protocol::{Provider, ScanConfig};
/// use tfscan_session::{Outcome, ScanSession, SessionOptions};
/// use tfscan_transport::TransportHandle;
///
/// # async fn example(transport: TransportHandle) -> tfscan_session::error::Result<()> {
/// let config = ScanConfig::new(Provider::Aws, "profile:prod").with_regions(["eu-west-1"]);
/// let session = ScanSession::new(transport, SessionOptions::default());
/// let handle = session.handle();
/// match session.run(&config, &mut ()).await? {
///     Outcome::Completed { job_id } => println!("done: {job_id}"),
///     Outcome::Failed { message } => eprintln!("failed: {message}"),
///     Outcome::Cancelled => {},
/// }
/// # let _ = handle;
/// # Ok(())
/// # }
/// ```
pub struct ScanSession {
    transport: TransportHandle,
    options: SessionOptions,
    gate: Gate,
    status: watch::Sender<ScanStatus>,
    tracker: Tracker,
}

impl ScanSession {
    pub fn new(transport: TransportHandle, options: SessionOptions) -> Self {
        Self::with_gate(transport, options, Gate::standalone())
    }

    pub(crate) fn with_gate(transport: TransportHandle, options: SessionOptions, gate: Gate) -> Self {
        let (status, _) = watch::channel(ScanStatus::default());
        Self {
            transport,
            options,
            gate,
            status,
            tracker: Tracker::default(),
        }
    }

    pub fn token(&self) -> SessionToken {
        self.gate.token
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            token: self.gate.token,
            cancel: self.gate.cancel.clone(),
            status: self.status.subscribe(),
        }
    }

    /// Run the scan described by `config` to completion.
    ///
    /// Returns an error only when the job could neither be followed over the
    /// stream nor started and polled; the observer has then already received
    /// `on_error` with a generic message.
    #[instrument(skip_all, fields(session = %self.gate.token, transport = self.transport.name(), provider = %config.provider()))]
    pub async fn run(mut self, config: &ScanConfig, observer: &mut impl ScanObserver) -> Result<Outcome> {
        let mut seen_job: Option<JobId> = None;
        let mut stream_connected = false;

        if self.options.streaming {
            self.transition(SessionState::Streaming);
            let driver = StreamDriver::new(&self.transport, &self.gate.cancel);
            let outcome = driver
                .open(config, |event| deliver(&self.gate, &mut self.tracker, &self.status, &mut *observer, event))
                .await;
            match outcome {
                Ok(StreamOutcome::Terminal) => {
                    stream_connected = true;
                },
                Ok(StreamOutcome::Inconclusive { job_id }) => {
                    stream_connected = true;
                    seen_job = job_id;
                },
                Ok(StreamOutcome::Cancelled) => return Ok(self.cancelled()),
                Err(err) => tracing::warn!(error = ?err, "Event stream unavailable, falling back to polling"),
            }
            if let Some(outcome) = self.settled() {
                return Ok(outcome);
            }
        }

        let job_id = match self.tracker.job_id().cloned().or(seen_job) {
            Some(job_id) => job_id,
            None => {
                let started = tokio::select! {
                    biased;
                    () = self.gate.cancel.cancelled() => None,
                    started = self.transport.start_job(config) => Some(started),
                };
                match started {
                    None => return Ok(self.cancelled()),
                    Some(Ok(job_id)) => job_id,
                    Some(Err(err)) => return self.exhausted(observer, err.raise(ErrorKind::StartJob)),
                }
            },
        };
        if !self.tracker.bind(&job_id) {
            tracing::warn!(bound = ?self.tracker.job_id(), %job_id, "Session already bound to another job");
        }

        self.transition(SessionState::Polling);
        let driver = PollingDriver::new(&self.transport, &self.gate.cancel, self.options.poll_interval);
        let outcome = driver
            .run(&job_id, !stream_connected, |event| {
                deliver(&self.gate, &mut self.tracker, &self.status, &mut *observer, event)
            })
            .await;
        match outcome {
            Ok(PollOutcome::Terminal) => match self.settled() {
                Some(outcome) => Ok(outcome),
                None => self.exhausted(observer, Error::from(ErrorKind::Poll)),
            },
            Ok(PollOutcome::Cancelled) => Ok(self.cancelled()),
            Err(err) => self.exhausted(observer, err),
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.tracker.transition(next) {
            self.publish();
        }
    }

    fn publish(&self) {
        self.status.send_replace(self.tracker.status().clone());
    }

    /// The outcome, if the session has already reached a terminal state.
    fn settled(&mut self) -> Option<Outcome> {
        let status = self.tracker.status();
        match status.state {
            SessionState::Completed => Some(Outcome::Completed { job_id: status.job_id.clone()? }),
            SessionState::Failed => Some(Outcome::Failed { message: status.message.clone() }),
            SessionState::Cancelled => Some(Outcome::Cancelled),
            _ if !self.gate.is_live() => Some(self.cancelled()),
            _ => None,
        }
    }

    fn cancelled(&mut self) -> Outcome {
        if self.tracker.cancel() {
            self.publish();
        }
        Outcome::Cancelled
    }

    fn exhausted(&mut self, observer: &mut impl ScanObserver, err: Error) -> Result<Outcome> {
        if !self.gate.is_live() {
            return Ok(self.cancelled());
        }
        tracing::error!(error = ?err, "Scan could not be started or monitored");
        if let Some(notice) = self.tracker.fail(ErrorKind::Exhausted.to_string()) {
            self.publish();
            observer.notify(notice);
        }
        Err(err.raise(ErrorKind::Exhausted))
    }
}

/// Hand `event` to the tracker and, if it changed anything, to the observer.
/// Returns whether the event was accepted.
fn deliver(
    gate: &Gate,
    tracker: &mut Tracker,
    status: &watch::Sender<ScanStatus>,
    observer: &mut impl ScanObserver,
    event: ProgressEvent,
) -> bool {
    if !gate.is_live() {
        tracing::debug!(session = %gate.token, event_type = event.event_type(), "Discarding event for stale session");
        return false;
    }
    let Some(notice) = tracker.apply(event) else {
        return false;
    };
    status.send_replace(tracker.status().clone());
    if let SessionEvent::Completed { job_id } = &notice {
        tracing::info!(%job_id, "Scan completed");
    }
    observer.notify(notice);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfscan_protocol::{Percent, Provider};
    use tfscan_transport::backend::{MockTransport, StatusReply, StreamStep};

    #[derive(Debug, Default)]
    struct Recorder(Vec<SessionEvent>);
    impl ScanObserver for Recorder {
        fn notify(&mut self, event: SessionEvent) {
            self.0.push(event);
        }
    }

    fn config() -> ScanConfig {
        ScanConfig::new(Provider::Gcp, "project:sandbox")
    }

    fn progress(job: &str, percent: u8, message: &str) -> ProgressEvent {
        ProgressEvent::Progress {
            job_id: JobId::new(job),
            percent: Percent::saturating(percent),
            message: message.to_string(),
        }
    }

    fn session(mock: &Arc<MockTransport>, options: SessionOptions) -> ScanSession {
        let transport: TransportHandle = mock.clone();
        ScanSession::new(transport, options)
    }

    fn no_stream() -> SessionOptions {
        SessionOptions { streaming: false, ..SessionOptions::default() }
    }

    #[tokio::test(start_paused = true)]
    async fn test_streamed_completion_never_polls() {
        let mock = Arc::new(MockTransport::default().with_stream([
            StreamStep::frame(&progress("job-1", 30, "iam")),
            StreamStep::frame(&ProgressEvent::Completed { job_id: JobId::new("job-1") }),
        ]));
        let mut recorder = Recorder::default();
        let session = session(&mock, SessionOptions::default());
        let handle = session.handle();
        let outcome = session.run(&config(), &mut recorder).await.unwrap();

        assert_eq!(outcome, Outcome::Completed { job_id: JobId::new("job-1") });
        assert_eq!(
            recorder.0,
            vec![
                SessionEvent::Progress { percent: Percent::saturating(30), message: "iam".to_string() },
                SessionEvent::Completed { job_id: JobId::new("job-1") },
            ]
        );
        assert_eq!(mock.status_calls(), 0);
        assert_eq!(mock.start_calls(), 0);
        assert_eq!(handle.status().state, SessionState::Completed);
        assert_eq!(handle.status().percent, Percent::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_streamed_failure() {
        let mock = Arc::new(MockTransport::default().with_stream([StreamStep::frame(&ProgressEvent::Error {
            job_id: JobId::new("job-1"),
            message: "AccessDenied".to_string(),
        })]));
        let mut recorder = Recorder::default();
        let outcome = session(&mock, SessionOptions::default()).run(&config(), &mut recorder).await.unwrap();
        assert_eq!(outcome, Outcome::Failed { message: "AccessDenied".to_string() });
        assert_eq!(recorder.0, vec![SessionEvent::Failed { message: "AccessDenied".to_string() }]);
        assert_eq!(mock.status_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inconclusive_stream_falls_back_to_polling() {
        let mock = Arc::new(
            MockTransport::default()
                .with_stream([StreamStep::frame(&progress("job-1", 40, "s3"))])
                .with_statuses([StatusReply::running("job-1", 20, "ec2"), StatusReply::completed("job-1")]),
        );
        let mut recorder = Recorder::default();
        let start = tokio::time::Instant::now();
        let session = session(&mock, SessionOptions::default());
        let mut status = session.handle().subscribe();
        let outcome = session.run(&config(), &mut recorder).await.unwrap();

        assert_eq!(outcome, Outcome::Completed { job_id: JobId::new("job-1") });
        assert_eq!(mock.start_calls(), 0);
        assert_eq!(mock.status_calls(), 2);
        // First status request immediately, the second one tick later.
        assert!(start.elapsed() < SessionOptions::default().poll_interval * 2);
        assert_eq!(
            recorder.0,
            vec![
                SessionEvent::Progress { percent: Percent::saturating(40), message: "s3".to_string() },
                // Never goes backwards.
                SessionEvent::Progress { percent: Percent::saturating(40), message: "ec2".to_string() },
                SessionEvent::Completed { job_id: JobId::new("job-1") },
            ]
        );
        assert_eq!(status.borrow_and_update().state, SessionState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_stream_starts_job() {
        let mock = Arc::new(
            MockTransport::default()
                .with_job("job-5")
                .with_statuses([StatusReply::running("job-5", 50, "gke"), StatusReply::completed("job-5")]),
        );
        let mut recorder = Recorder::default();
        let outcome = session(&mock, SessionOptions::default()).run(&config(), &mut recorder).await.unwrap();
        assert_eq!(outcome, Outcome::Completed { job_id: JobId::new("job-5") });
        assert_eq!(mock.stream_opens(), 1);
        assert_eq!(mock.start_calls(), 1);
        assert_eq!(recorder.0.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_streaming_disabled() {
        let mock = Arc::new(
            MockTransport::default()
                .with_stream([StreamStep::frame(&progress("job-1", 1, "unused"))])
                .with_job("job-2")
                .with_statuses([StatusReply::completed("job-2")]),
        );
        let outcome = session(&mock, no_stream()).run(&config(), &mut ()).await.unwrap();
        assert_eq!(outcome, Outcome::Completed { job_id: JobId::new("job-2") });
        assert_eq!(mock.stream_opens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_when_nothing_works() {
        let mock = Arc::new(MockTransport::default());
        let mut recorder = Recorder::default();
        let session = session(&mock, SessionOptions::default());
        let handle = session.handle();
        let err = session.run(&config(), &mut recorder).await.unwrap_err();

        assert_eq!(*err, ErrorKind::Exhausted);
        assert_eq!(recorder.0, vec![SessionEvent::Failed { message: "scan could not be started or monitored".to_string() }]);
        assert_eq!(handle.status().state, SessionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_when_first_poll_fails() {
        let mock = Arc::new(MockTransport::default().with_job("job-3").with_statuses([StatusReply::Fail]));
        let mut recorder = Recorder::default();
        let err = session(&mock, SessionOptions::default()).run(&config(), &mut recorder).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Exhausted);
        assert_eq!(mock.status_calls(), 1);
        assert_eq!(recorder.0.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_stream() {
        let mock = Arc::new(
            MockTransport::default()
                .with_stream([StreamStep::frame(&progress("job-1", 10, "iam")), StreamStep::Hang])
                .with_statuses([StatusReply::completed("job-1")]),
        );
        let session = session(&mock, SessionOptions::default());
        let handle = session.handle();
        let trigger = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });
        let mut recorder = Recorder::default();
        let outcome = session.run(&config(), &mut recorder).await.unwrap();

        assert_eq!(outcome, Outcome::Cancelled);
        assert_eq!(recorder.0.len(), 1);
        assert_eq!(mock.status_calls(), 0);
        assert_eq!(mock.released_streams(), 1);
        assert_eq!(handle.status().state, SessionState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_for_other_jobs_are_ignored() {
        let mock = Arc::new(MockTransport::default().with_stream([
            StreamStep::frame(&progress("job-1", 10, "mine")),
            StreamStep::frame(&progress("job-0", 90, "stale")),
            StreamStep::frame(&ProgressEvent::Completed { job_id: JobId::new("job-1") }),
        ]));
        let mut recorder = Recorder::default();
        let outcome = session(&mock, SessionOptions::default()).run(&config(), &mut recorder).await.unwrap();
        assert_eq!(outcome, Outcome::Completed { job_id: JobId::new("job-1") });
        assert_eq!(recorder.0.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_completion_does_not_end_stream() {
        let mock = Arc::new(
            MockTransport::default()
                .with_stream([
                    StreamStep::frame(&progress("job-1", 10, "iam")),
                    StreamStep::frame(&ProgressEvent::Completed { job_id: JobId::new("job-0") }),
                    StreamStep::frame(&progress("job-1", 60, "s3")),
                    StreamStep::frame(&ProgressEvent::Completed { job_id: JobId::new("job-1") }),
                ])
                .with_statuses([StatusReply::completed("job-1")]),
        );
        let mut recorder = Recorder::default();
        let outcome = session(&mock, SessionOptions::default()).run(&config(), &mut recorder).await.unwrap();

        assert_eq!(outcome, Outcome::Completed { job_id: JobId::new("job-1") });
        assert_eq!(
            recorder.0,
            vec![
                SessionEvent::Progress { percent: Percent::saturating(10), message: "iam".to_string() },
                SessionEvent::Progress { percent: Percent::saturating(60), message: "s3".to_string() },
                SessionEvent::Completed { job_id: JobId::new("job-1") },
            ]
        );
        assert_eq!(mock.status_calls(), 0);
        assert_eq!(mock.released_streams(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_terminal_snapshot_keeps_polling() {
        let mock = Arc::new(
            MockTransport::default()
                .with_stream([StreamStep::frame(&progress("job-1", 20, "iam"))])
                .with_statuses([StatusReply::completed("job-other"), StatusReply::completed("job-1")]),
        );
        let mut recorder = Recorder::default();
        let outcome = session(&mock, SessionOptions::default()).run(&config(), &mut recorder).await.unwrap();

        assert_eq!(outcome, Outcome::Completed { job_id: JobId::new("job-1") });
        assert_eq!(mock.status_calls(), 2);
        assert!(!recorder.0.iter().any(|event| matches!(event, SessionEvent::Failed { .. })));
        assert_eq!(recorder.0.last(), Some(&SessionEvent::Completed { job_id: JobId::new("job-1") }));
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = SessionToken::next();
        let b = SessionToken::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_superseded_gate_is_not_live() {
        let current = Arc::new(AtomicU64::new(0));
        let first = Gate::claim(&current);
        assert!(first.is_live());
        let second = Gate::claim(&current);
        assert!(!first.is_live());
        assert!(second.is_live());
        second.cancel.cancel();
        assert!(!second.is_live());
    }
}
