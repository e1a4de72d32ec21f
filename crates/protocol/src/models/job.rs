use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Server-issued identifier of a scan job.
///
/// Opaque to the client: it is only ever compared for equality (to discard
/// events for stale jobs) and echoed back to the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}
