//! Session state machine.
//!
//! Pure bookkeeping with no I/O: the drivers feed [`ProgressEvent`]s in, and
//! the [`Tracker`] decides whether each one is accepted, what the caller sees,
//! and which state the session moves to. Keeping this separate from the
//! drivers makes every transition testable without a transport.

use derive_more::Display;
use tfscan_protocol::{JobId, Percent, ProgressEvent};

use crate::observer::SessionEvent;

/// Lifecycle of one scan session.
///
/// ```text
/// idle ──> streaming ──> completed | failed
///   │          │
///   │          └──> polling ──> completed | failed
///   └─────────────────^        (only when streaming is disabled)
///
/// any non-terminal state ──> cancelled
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display)]
pub enum SessionState {
    #[default]
    #[display("idle")]
    Idle,
    #[display("streaming")]
    Streaming,
    #[display("polling")]
    Polling,
    #[display("completed")]
    Completed,
    #[display("failed")]
    Failed,
    #[display("cancelled")]
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// A delivery mechanism is attached and events are being accepted.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Streaming | Self::Polling)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use SessionState::*;
        match (self, next) {
            (Idle, Streaming | Polling) => true,
            (Streaming, Polling | Completed | Failed) => true,
            (Polling, Completed | Failed) => true,
            (current, Cancelled) => !current.is_terminal(),
            _ => false,
        }
    }
}

/// Everything a caller needs to render a running scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStatus {
    pub state: SessionState,
    /// Never decreases within a session.
    pub percent: Percent,
    pub message: String,
    /// The job this session is bound to, once known.
    pub job_id: Option<JobId>,
}

#[derive(Debug, Default)]
pub(crate) struct Tracker {
    status: ScanStatus,
}

impl Tracker {
    pub(crate) fn status(&self) -> &ScanStatus {
        &self.status
    }

    pub(crate) fn state(&self) -> SessionState {
        self.status.state
    }

    pub(crate) fn job_id(&self) -> Option<&JobId> {
        self.status.job_id.as_ref()
    }

    /// Move to `next` if the state machine allows it.
    pub(crate) fn transition(&mut self, next: SessionState) -> bool {
        let current = self.status.state;
        if !current.can_transition_to(next) {
            tracing::debug!(%current, %next, "Ignoring invalid session transition");
            return false;
        }
        tracing::info!(from = %current, to = %next, job_id = ?self.status.job_id, "Session state changed");
        self.status.state = next;
        true
    }

    /// Bind the session to a job. Returns `false` (and changes nothing) if it
    /// is already bound to a different one.
    pub(crate) fn bind(&mut self, job_id: &JobId) -> bool {
        match &self.status.job_id {
            Some(bound) => bound == job_id,
            None => {
                self.status.job_id = Some(job_id.clone());
                true
            },
        }
    }

    fn raise(&mut self, percent: Percent) {
        self.status.percent = self.status.percent.max(percent);
    }

    /// Apply an event from either driver, returning what the caller should be
    /// told (if anything).
    ///
    /// Events are discarded when no driver is active (including after any
    /// terminal state) or when they belong to a job other than the bound one.
    pub(crate) fn apply(&mut self, event: ProgressEvent) -> Option<SessionEvent> {
        if !self.status.state.is_active() {
            tracing::debug!(state = %self.status.state, event_type = event.event_type(), "Discarding event for inactive session");
            return None;
        }
        if !self.bind(event.job_id()) {
            tracing::debug!(expected = ?self.status.job_id, received = %event.job_id(), "Discarding event for another job");
            return None;
        }
        match event {
            ProgressEvent::Progress { percent, message, .. } => {
                self.raise(percent);
                if !message.is_empty() {
                    self.status.message = message;
                }
                Some(SessionEvent::Progress {
                    percent: self.status.percent,
                    message: self.status.message.clone(),
                })
            },
            ProgressEvent::Resource { percent, resource_type, resource_count, message, .. } => {
                self.raise(percent);
                self.status.message = if message.is_empty() {
                    format!("Found {resource_count} {resource_type}")
                } else {
                    message
                };
                Some(SessionEvent::Resource {
                    percent: self.status.percent,
                    resource_type,
                    resource_count,
                    message: self.status.message.clone(),
                })
            },
            ProgressEvent::Completed { job_id } => {
                self.transition(SessionState::Completed).then(|| {
                    self.status.percent = Percent::MAX;
                    self.status.message = "Scan completed".to_string();
                    SessionEvent::Completed { job_id }
                })
            },
            ProgressEvent::Error { message, .. } => self.fail(message),
        }
    }

    /// Enter the failed state with `message`.
    pub(crate) fn fail(&mut self, message: impl Into<String>) -> Option<SessionEvent> {
        self.transition(SessionState::Failed).then(|| {
            self.status.message = message.into();
            SessionEvent::Failed { message: self.status.message.clone() }
        })
    }

    pub(crate) fn cancel(&mut self) -> bool {
        self.transition(SessionState::Cancelled)
    }
}
