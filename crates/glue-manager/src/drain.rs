//! Process-wide drain signalling.
//!
//! A [`DrainController`] broadcasts a drain to every stream driver, which
//! returns [`glue_core::XdsError::Draining`] so the transport can close the
//! stream. Modelled as a broadcast cancellation, not a global flag.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Controller that initiates process-wide draining.
#[derive(Debug, Clone)]
pub struct DrainController {
    inner: Arc<DrainInner>,
}

#[derive(Debug)]
struct DrainInner {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Default for DrainController {
    fn default() -> Self {
        Self::new()
    }
}

impl DrainController {
    /// Create a new controller in the serving state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            inner: Arc::new(DrainInner { tx, rx }),
        }
    }

    /// Get a signal for a stream driver to select on.
    #[must_use]
    pub fn signal(&self) -> DrainSignal {
        DrainSignal {
            rx: self.inner.rx.clone(),
        }
    }

    /// Begin draining. Every driver observing a signal returns promptly.
    pub fn drain(&self) {
        info!("draining discovery streams");
        let _ = self.inner.tx.send(true);
    }

    /// Whether draining has begun.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        *self.inner.rx.borrow()
    }
}

/// Observer half of the drain broadcast.
#[derive(Debug, Clone)]
pub struct DrainSignal {
    rx: watch::Receiver<bool>,
}

impl DrainSignal {
    /// Wait until draining begins. A dropped controller counts as a drain.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Whether draining has begun.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Wait for OS shutdown signals (SIGTERM, SIGINT).
///
/// Returns when either signal is received; callers typically follow up with
/// [`DrainController::drain`].
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint =
            signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        info!("received Ctrl+C");
    }
}
