use exn::ResultExt;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tfscan_protocol::ScanConfig;
use tfscan_transport::TransportHandle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{ErrorKind, Result};
use crate::observer::ScanObserver;
use crate::session::{Gate, Outcome, ScanSession, SessionHandle, SessionOptions};
use crate::state::ScanStatus;

/// Runs at most one scan at a time on behalf of a user interface.
///
/// Starting a scan while another is running cancels the previous one, and its
/// observer hears nothing more from it. Dropping the controller cancels the
/// running scan.
pub struct ScanController {
    transport: TransportHandle,
    options: SessionOptions,
    current: Arc<AtomicU64>,
    active: Mutex<Option<SessionHandle>>,
}

impl ScanController {
    pub fn new(transport: TransportHandle, options: SessionOptions) -> Self {
        Self {
            transport,
            options,
            current: Arc::new(AtomicU64::new(0)),
            active: Mutex::new(None),
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<SessionHandle>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start scanning in a background task. Must be called from within a
    /// Tokio runtime.
    pub fn start_scan<O>(&self, config: ScanConfig, observer: O) -> ScanTicket
    where
        O: ScanObserver + Send + 'static,
    {
        let session = ScanSession::with_gate(Arc::clone(&self.transport), self.options.clone(), Gate::claim(&self.current));
        let handle = session.handle();
        if let Some(previous) = self.active().replace(handle.clone()) {
            tracing::info!(previous = %previous.token(), next = %handle.token(), "Superseding running scan");
            previous.cancel();
        }
        let task = tokio::spawn(async move {
            let mut observer = observer;
            session.run(&config, &mut observer).await
        });
        ScanTicket { handle, task }
    }

    /// Cancel the running scan, if any. Safe to call repeatedly.
    pub fn cancel_scan(&self) {
        if let Some(handle) = self.active().as_ref() {
            tracing::debug!(session = %handle.token(), "Cancelling scan");
            handle.cancel();
        }
    }

    /// Status of the most recently started scan.
    pub fn status(&self) -> Option<ScanStatus> {
        self.active().as_ref().map(SessionHandle::status)
    }

    pub fn subscribe(&self) -> Option<watch::Receiver<ScanStatus>> {
        self.active().as_ref().map(SessionHandle::subscribe)
    }
}

impl Drop for ScanController {
    fn drop(&mut self) {
        self.cancel_scan();
    }
}

/// A scan started by a [`ScanController`].
pub struct ScanTicket {
    handle: SessionHandle,
    task: JoinHandle<Result<Outcome>>,
}

impl ScanTicket {
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Wait for the scan to finish.
    pub async fn outcome(self) -> Result<Outcome> {
        self.task.await.or_raise(|| ErrorKind::Aborted)?
    }
}
