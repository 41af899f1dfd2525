//! A periodic task. [Poller::schedule] runs an action over and over on a
//! thread of its own, waiting `interval` after each run returns before
//! starting the next, so runs never overlap. [Poller::cancel] stops it and
//! waits for a run already in flight.

use log::{info, warn};
use std::{
    sync::mpsc::{self, RecvTimeoutError, TryRecvError},
    thread::{self, JoinHandle},
    time::Duration,
};

/// Handle on a scheduled action.
pub struct Poller {
    // Dropping the sender is the cancel signal; it also wakes the timer.
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    /// Run `action` every `interval` until cancelled.
    pub fn schedule<F>(interval: Duration, mut action: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                match stop_rx.try_recv() {
                    Err(TryRecvError::Empty) => {}
                    _ => break,
                }

                action();

                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => break,
                }
            }
            info!("Poller : terminated.");
        });

        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Whether the action is still being scheduled.
    pub fn is_scheduled(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop scheduling. Once this returns the action will not start again;
    /// a run in progress is allowed to finish first. Idempotent.
    pub fn cancel(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Poller : action panicked.");
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel();
    }
}
