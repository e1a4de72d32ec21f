use tfscan_protocol::{JobId, Percent};
use tokio::sync::mpsc::UnboundedSender;

/// What a session reports to its caller.
///
/// Unlike [`ProgressEvent`](tfscan_protocol::ProgressEvent) these carry the
/// session's view (percent already floored, message already resolved) and are
/// only produced for events the session accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Progress {
        percent: Percent,
        message: String,
    },
    Resource {
        percent: Percent,
        resource_type: String,
        resource_count: u64,
        message: String,
    },
    /// Emitted at most once per session.
    Completed {
        job_id: JobId,
    },
    /// A failure attributed to the job by the server, or the generic message
    /// used once every delivery mechanism has been exhausted.
    Failed {
        message: String,
    },
}

/// Receives progress from a running session.
///
/// Every hook defaults to doing nothing, so implementors only override what
/// they render. Hooks are called synchronously from the session's task, in
/// arrival order, and must not block: a slow hook stalls event delivery.
/// Cancellation never produces a hook call.
///
/// Implementations are provided for `()` (ignore everything) and for an
/// unbounded channel sender, for callers that prefer to receive
/// [`SessionEvent`] messages.
pub trait ScanObserver {
    fn on_progress(&mut self, _percent: Percent, _message: &str) {}

    fn on_resource(&mut self, _percent: Percent, _resource_type: &str, _resource_count: u64) {}

    /// The "advance to results" hook. Called exactly once, and only for a
    /// session that completed.
    fn on_completed(&mut self, _job_id: &JobId) {}

    fn on_error(&mut self, _message: &str) {}

    /// Route an event to the matching hook.
    fn notify(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Progress { percent, message } => self.on_progress(percent, &message),
            SessionEvent::Resource { percent, resource_type, resource_count, .. } => {
                self.on_resource(percent, &resource_type, resource_count)
            },
            SessionEvent::Completed { job_id } => self.on_completed(&job_id),
            SessionEvent::Failed { message } => self.on_error(&message),
        }
    }
}

impl ScanObserver for () {}

impl ScanObserver for UnboundedSender<SessionEvent> {
    fn notify(&mut self, event: SessionEvent) {
        // Nobody listening any more is not the session's problem.
        if self.send(event).is_err() {
            tracing::trace!("Session event receiver dropped");
        }
    }
}

impl<O: ScanObserver + ?Sized> ScanObserver for &mut O {
    fn notify(&mut self, event: SessionEvent) {
        (**self).notify(event)
    }
}
