use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{JobId, Percent, ProgressEvent};

/// Server-side lifecycle of a scan job, as reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Error,
}
impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }
}

/// One answer from the polling endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Clamped into `0..=100` rather than validated.
    #[serde(default, deserialize_with = "clamped_percent")]
    pub percent: Percent,
    #[serde(default)]
    pub message: String,
}

fn clamped_percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Percent, D::Error> {
    f64::deserialize(deserializer).map(Percent::clamped)
}

impl StatusSnapshot {
    /// Map the snapshot onto the same event shape the stream produces:
    /// `running` becomes [`Progress`](ProgressEvent::Progress), `completed`
    /// becomes [`Completed`](ProgressEvent::Completed), and both `failed` and
    /// `error` become [`Error`](ProgressEvent::Error).
    pub fn into_event(self) -> ProgressEvent {
        let Self { job_id, status, percent, message } = self;
        match status {
            JobStatus::Running => ProgressEvent::Progress { job_id, percent, message },
            JobStatus::Completed => ProgressEvent::Completed { job_id },
            JobStatus::Failed | JobStatus::Error if message.trim().is_empty() => ProgressEvent::Error {
                job_id,
                message: "scan failed".to_string(),
            },
            JobStatus::Failed | JobStatus::Error => ProgressEvent::Error { job_id, message },
        }
    }
}
