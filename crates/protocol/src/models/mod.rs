mod config;
mod event;
mod job;
mod percent;
mod status;

pub use self::config::{Provider, ScanConfig};
pub use self::event::ProgressEvent;
pub use self::job::JobId;
pub use self::percent::Percent;
pub use self::status::{JobStatus, StatusSnapshot};
