//! Start/stop state shared by all long-running components.
//!
//! Every transport owns a [`Lifecycle`]: an atomic running flag plus a
//! broadcast-on-close stop signal. `start` transitions Stopped to Running
//! exactly once; a second call fails with `AlreadyRunning` rather than
//! panicking. Shutdown is two-phase: `halt` refuses new sends immediately,
//! `mark_stopped` closes the [`StopChan`] once the grace period has
//! elapsed and the receivers are gone.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

use crate::common::QpError;

/// Shared start/stop state.
#[derive(Debug)]
pub struct Lifecycle {
    running: AtomicBool,
    stop_tx: watch::Sender<bool>,
}

impl Lifecycle {
    /// Create a lifecycle in the Stopped state.
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Lifecycle {
            running: AtomicBool::new(false),
            stop_tx,
        }
    }

    /// Transition from Stopped to Running.
    pub fn start(&self) -> Result<(), QpError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Ok(())
        } else {
            Err(QpError::AlreadyRunning)
        }
    }

    /// Whether the component currently accepts work.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Refuse new sends. The first phase of shutdown.
    pub fn halt(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Broadcast that shutdown has completed, closing every [`StopChan`].
    pub fn mark_stopped(&self) {
        self.stop_tx.send_replace(true);
    }

    /// A new stop signal observer.
    pub fn stop_chan(&self) -> StopChan {
        StopChan {
            rx: self.stop_tx.subscribe(),
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// A broadcast-on-close shutdown signal.
///
/// Observable by any number of waiters; it fires exactly once and never
/// carries a value.
#[derive(Debug, Clone)]
pub struct StopChan {
    rx: watch::Receiver<bool>,
}

impl StopChan {
    /// Resolve once shutdown has completed.
    pub async fn stopped(mut self) {
        if *self.rx.borrow() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
    }

    /// Whether shutdown has already completed.
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }
}
