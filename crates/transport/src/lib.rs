pub mod backend;
pub mod error;

pub use crate::backend::{ChunkStream, ScanTransport};
use std::sync::Arc;

pub type TransportHandle = Arc<dyn ScanTransport + Send + Sync>;
