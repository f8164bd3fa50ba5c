//! One-shot asynchronous completions delivered back to the UI thread.
//!
//! Work runs on a short-lived worker thread; the UI thread polls once per
//! frame and picks the result up when it lands.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use log::error;
use std::thread;

/// Poll result of a [`Pending`]
#[derive(Debug, PartialEq, Eq)]
pub enum Settled<T> {
    /// Still running
    Waiting,
    /// Completed with a value
    Ready(T),
    /// The producer went away without a value (worker panicked)
    Abandoned,
}

/// Value that will be available later
#[derive(Debug)]
pub struct Pending<T> {
    rx: Receiver<T>,
}

/// Producer half of [`Pending::channel`]
#[derive(Debug)]
pub struct Completer<T> {
    tx: Sender<T>,
}

impl<T> Completer<T> {
    pub fn complete(self, value: T) {
        // Receiver may already be gone; nothing left to notify
        let _ = self.tx.send(value);
    }
}

impl<T: Send + 'static> Pending<T> {
    /// Run `work` on a named worker thread
    pub fn spawn<F>(name: &str, work: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let (completer, pending) = Self::channel();
        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || completer.complete(work()));

        if let Err(e) = spawned {
            // Completer was dropped with the closure: reads as Abandoned
            error!("Failed to spawn {} thread: {}", name, e);
        }
        pending
    }
}

impl<T> Pending<T> {
    pub fn channel() -> (Completer<T>, Self) {
        let (tx, rx) = bounded(1);
        (Completer { tx }, Self { rx })
    }

    /// Already-resolved value
    pub fn ready(value: T) -> Self {
        let (completer, pending) = Self::channel();
        completer.complete(value);
        pending
    }

    /// Non-blocking check
    pub fn poll(&self) -> Settled<T> {
        match self.rx.try_recv() {
            Ok(value) => Settled::Ready(value),
            Err(TryRecvError::Empty) => Settled::Waiting,
            Err(TryRecvError::Disconnected) => Settled::Abandoned,
        }
    }

    /// Block until settled (`None` if abandoned)
    pub fn wait(self) -> Option<T> {
        self.rx.recv().ok()
    }
}
