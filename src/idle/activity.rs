//! Scoped activity listening.
//!
//! Input sources publish interactions on an [`ActivityHub`]. A screen that
//! wants an inactivity timeout attaches its controller with
//! [`IdleGuard::attach`]; dropping the guard stops listening and cancels the
//! countdown on every exit path.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::controller::{IdleController, IdleStatus};
use super::policy::ActivityKind;

const DEFAULT_CAPACITY: usize = 64;

/// Fan-out of user interactions to whichever screens are listening.
#[derive(Debug, Clone)]
pub struct ActivityHub {
    tx: broadcast::Sender<ActivityKind>,
}

impl ActivityHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish one interaction. Returns how many listeners received it.
    pub fn emit(&self, kind: ActivityKind) -> usize {
        self.tx.send(kind).unwrap_or(0)
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn subscribe(&self) -> broadcast::Receiver<ActivityKind> {
        self.tx.subscribe()
    }
}

impl Default for ActivityHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Live registration of an idle controller on an activity hub.
pub struct IdleGuard {
    controller: Arc<IdleController>,
    listener: JoinHandle<()>,
}

impl IdleGuard {
    /// Register on `hub` and start the first countdown.
    pub fn attach(hub: &ActivityHub, controller: IdleController) -> Self {
        let controller = Arc::new(controller);
        let mut rx = hub.subscribe();
        let forward = controller.clone();

        let listener = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(kind) => {
                        forward.activity(kind);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Missed events still mean someone is at the kiosk.
                        trace!("Activity listener lagged by {}", skipped);
                        forward.start();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        controller.start();
        debug!("Idle guard attached");
        Self {
            controller,
            listener,
        }
    }

    pub fn controller(&self) -> &Arc<IdleController> {
        &self.controller
    }

    pub fn status(&self) -> IdleStatus {
        self.controller.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<IdleStatus> {
        self.controller.subscribe()
    }
}

impl Drop for IdleGuard {
    fn drop(&mut self) {
        self.listener.abort();
        self.controller.shutdown();
        debug!("Idle guard released");
    }
}
