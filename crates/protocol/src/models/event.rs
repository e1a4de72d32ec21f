use serde_json::{Value, json};

use crate::models::{JobId, Percent};

/// A single typed progress report for a scan job.
///
/// This is the one message shape shared by every delivery mechanism: frames
/// decoded from the event stream and status snapshots returned by the polling
/// endpoint both end up as a `ProgressEvent`. Every variant carries the
/// [`JobId`] it belongs to so that consumers can discard events for stale jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The job is still running.
    Progress { job_id: JobId, percent: Percent, message: String },
    /// The job discovered resources of a given type.
    Resource {
        job_id: JobId,
        percent: Percent,
        resource_type: String,
        resource_count: u64,
        /// Human-readable description (empty when the server sent none).
        message: String,
    },
    /// The job finished successfully. Terminal.
    Completed { job_id: JobId },
    /// The server attributed a failure to the job itself. Terminal.
    Error { job_id: JobId, message: String },
}

impl ProgressEvent {
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Progress { job_id, .. }
            | Self::Resource { job_id, .. }
            | Self::Completed { job_id }
            | Self::Error { job_id, .. } => job_id,
        }
    }

    /// Terminal events end a job's lifecycle: nothing after them matters.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }

    pub fn percent(&self) -> Option<Percent> {
        match self {
            Self::Progress { percent, .. } | Self::Resource { percent, .. } => Some(*percent),
            Self::Completed { .. } => Some(Percent::MAX),
            Self::Error { .. } => None,
        }
    }

    /// The wire discriminator (`event_type`) for this variant.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Resource { .. } => "resource",
            Self::Completed { .. } => "completed",
            Self::Error { .. } => "error",
        }
    }

    fn payload(&self) -> Value {
        match self {
            Self::Progress { job_id, percent, message } => json!({
                "job_id": job_id,
                "event_type": self.event_type(),
                "percent": percent,
                "message": message,
            }),
            Self::Resource { job_id, percent, resource_type, resource_count, message } => json!({
                "job_id": job_id,
                "event_type": self.event_type(),
                "percent": percent,
                "message": message,
                "resource_type": resource_type,
                "resource_count": resource_count,
            }),
            Self::Completed { job_id } => json!({
                "job_id": job_id,
                "event_type": self.event_type(),
                "percent": Percent::MAX,
                "message": "",
            }),
            Self::Error { job_id, message } => json!({
                "job_id": job_id,
                "event_type": self.event_type(),
                "message": message,
            }),
        }
    }

    /// Render this event as one complete wire frame, blank-line terminator
    /// included.
    ///
    /// ```
    /// use tfscan_protocol::{JobId, Percent, ProgressEvent};
    ///
    /// let event = ProgressEvent::Completed { job_id: JobId::new("job-1") };
    /// assert!(event.encode().starts_with("data: {"));
    /// assert!(event.encode().ends_with("}\n\n"));
    /// ```
    pub fn encode(&self) -> String {
        format!("data: {}\n\n", self.payload())
    }
}
