use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;
use crate::plugin::{Error, Result};

/// Shutdown signal that can only be raised once. Closing drops the
/// sole sender, so every receiver sees the channel disconnect and
/// nothing is ever sent on it.
pub struct Stop {
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl Stop {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            tx: Mutex::new(Some(tx)),
            rx: rx,
        }
    }

    /// Returns false if already closed.
    pub fn close(&self) -> bool {
        self.tx.lock().take().is_some()
    }

    pub fn stopped(&self) -> bool {
        self.tx.lock().is_none()
    }

    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

impl Default for Stop {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded FIFO shared by any number of producers and consumers.
pub struct Queue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Queue<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    /// Blocks while the queue is full. Fails with `Stopped` once `stop`
    /// is closed, even if still waiting for room.
    pub fn push(&self, item: T, stop: &Stop) -> Result<()> {
        if stop.stopped() {
            return Err(Error::Stopped);
        }

        select! {
            send(self.tx, item)   -> res => res.map_err(|_| Error::Stopped),
            recv(stop.receiver()) -> _   => Err(Error::Stopped),
        }
    }

    /// Blocks until an item is available or `stop` is closed.
    pub fn pop(&self, stop: &Stop) -> Result<T> {
        select! {
            recv(self.rx)         -> item => item.map_err(|_| Error::Stopped),
            recv(stop.receiver()) -> _    => Err(Error::Stopped),
        }
    }

    pub fn receiver(&self) -> &Receiver<T> {
        &self.rx
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
