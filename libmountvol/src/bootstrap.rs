//! One-shot completion signal gating the first mount.
//!
//! Some variants install their mount helper in the background at start-up.
//! The installer holds a [`BootstrapSignal`]; `pre_mount` awaits a
//! [`BootstrapGate`]. Waiting never re-runs the bootstrap, and once the
//! signal fires every wait returns immediately.

use tokio::sync::watch;
use tracing::debug;

use crate::error::VolumeError;

/// Create a connected signal/gate pair.
pub fn gate() -> (BootstrapSignal, BootstrapGate) {
    let (tx, rx) = watch::channel(false);
    (BootstrapSignal { tx }, BootstrapGate { rx })
}

/// Completion side. Dropping it without calling [`complete`](Self::complete)
/// marks the bootstrap as failed.
#[derive(Debug)]
pub struct BootstrapSignal {
    tx: watch::Sender<bool>,
}

impl BootstrapSignal {
    pub fn complete(self) {
        // send_replace stores the value even when no gate is listening yet.
        self.tx.send_replace(true);
    }
}

/// Waiting side; cheap to clone.
#[derive(Debug, Clone)]
pub struct BootstrapGate {
    rx: watch::Receiver<bool>,
}

impl BootstrapGate {
    /// A gate that is already open, for variants without a bootstrap step.
    pub fn ready() -> Self {
        let (signal, gate) = gate();
        signal.complete();
        gate
    }

    pub fn is_complete(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the bootstrap has completed.
    pub async fn wait(&self) -> Result<(), VolumeError> {
        let mut rx = self.rx.clone();
        match rx.wait_for(|done| *done).await {
            Ok(_) => {
                debug!("bootstrap complete");
                Ok(())
            }
            Err(_) => Err(VolumeError::Internal(
                "bootstrap did not complete".to_owned(),
            )),
        }
    }
}
