//! Frame payload decoding.

use exn::{OptionExt, ResultExt};
use serde::Deserialize;
use tracing::instrument;

use crate::error::{ErrorKind, Result};
use crate::models::{JobId, Percent, ProgressEvent};

/// Line prefix that marks payload lines. Everything else in a frame (comments,
/// `event:`/`id:`/`retry:` fields) is auxiliary and ignored.
pub const PAYLOAD_MARKER: &str = "data:";

#[derive(Debug, Deserialize)]
struct Payload {
    job_id: Option<String>,
    #[serde(default, alias = "type")]
    event_type: Option<String>,
    percent: Option<f64>,
    message: Option<String>,
    resource_type: Option<String>,
    resource_count: Option<u64>,
}

/// Collect the payload from a frame's `data:` lines.
///
/// Multiple payload lines are joined with `\n`, and a single space after the
/// marker is not part of the payload.
fn extract_payload(frame: &str) -> Option<String> {
    let mut lines = frame
        .lines()
        .filter_map(|line| line.strip_prefix(PAYLOAD_MARKER))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .peekable();
    lines.peek()?;
    Some(lines.collect::<Vec<_>>().join("\n"))
}

fn percent(value: Option<f64>) -> Result<Percent> {
    let value = value.ok_or_raise(|| ErrorKind::MissingField("percent"))?;
    Ok(Percent::try_from(value)?)
}

/// Decode one frame into a [`ProgressEvent`].
///
/// The payload must be a JSON object carrying at least a `job_id`. The
/// `event_type` discriminator selects the variant and defaults to `progress`
/// when absent. `progress` and `resource` events require a numeric `percent`
/// in `0..=100`; `completed` and `error` events do not.
///
/// Errors are per-frame: callers are expected to log them and keep reading.
///
/// ```
/// use tfscan_protocol::{ProgressEvent, decode};
///
/// let event = decode("data: {\"job_id\":\"a\",\"percent\":55,\"message\":\"scanning users\"}").unwrap();
/// assert!(matches!(event, ProgressEvent::Progress { ref message, .. } if message == "scanning users"));
/// assert!(decode(": just a comment").is_err());
/// ```
#[instrument(level = "trace", skip_all, fields(frame_len = frame.len()))]
pub fn decode(frame: &str) -> Result<ProgressEvent> {
    let payload = extract_payload(frame).ok_or_raise(|| ErrorKind::MissingPayload)?;
    let payload: Payload = serde_json::from_str(&payload).or_raise(|| ErrorKind::MalformedPayload)?;
    let job_id = payload
        .job_id
        .filter(|id| !id.trim().is_empty())
        .map(JobId::from)
        .ok_or_raise(|| ErrorKind::MissingField("job_id"))?;
    let message = payload.message.unwrap_or_default();

    let event = match payload.event_type.as_deref().map(str::trim) {
        None | Some("") | Some("progress") => ProgressEvent::Progress {
            job_id,
            percent: percent(payload.percent)?,
            message,
        },
        Some("resource") => ProgressEvent::Resource {
            job_id,
            percent: percent(payload.percent)?,
            resource_type: payload.resource_type.ok_or_raise(|| ErrorKind::MissingField("resource_type"))?,
            resource_count: payload.resource_count.unwrap_or(0),
            message,
        },
        Some("completed") | Some("complete") => ProgressEvent::Completed { job_id },
        Some("error") | Some("failed") => ProgressEvent::Error { job_id, message },
        Some(other) => exn::bail!(ErrorKind::UnknownEventType(other.to_string())),
    };
    tracing::trace!(job_id = %event.job_id(), event_type = event.event_type(), "Decoded frame");
    Ok(event)
}
