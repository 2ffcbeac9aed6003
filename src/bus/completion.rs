use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use super::Peripheral;

/// Per-peripheral table: routes transfer completions to the thread waiting
/// on them, one pending transfer per peripheral, and serializes the drivers
/// attached to the same peripheral.
#[derive(Debug, Default)]
pub struct TransferRouter {
    pending: [AtomicBool; 2],
    buses: [Mutex<()>; 2],
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WaitError {
    TimedOut,
    Abandoned,
}

impl TransferRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Process-wide table, used by every driver not given its own.
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<TransferRouter>> = OnceLock::new();
        SHARED.get_or_init(Self::new).clone()
    }

    /// Held for a whole driver operation on `peripheral`.
    pub(crate) fn lock_bus(&self, peripheral: Peripheral) -> MutexGuard<'_, ()> {
        self.buses[peripheral.index()].lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_pending(&self, peripheral: Peripheral) -> bool {
        self.pending[peripheral.index()].load(Ordering::Acquire)
    }

    /// Claims `peripheral`, `None` while it still has a transfer in flight.
    pub(crate) fn register(self: &Arc<Self>, peripheral: Peripheral) -> Option<(Completion, Pending)> {
        let slot = &self.pending[peripheral.index()];
        slot.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).ok()?;
        let (signal, waiter) = mpsc::sync_channel(1);
        let done = Completion { router: self.clone(), peripheral, signal, released: false };
        Some((done, Pending(waiter)))
    }

    fn release(&self, peripheral: Peripheral) {
        self.pending[peripheral.index()].store(false, Ordering::Release);
    }
}

/// Completion handle given to the host with every transfer.
#[derive(Debug)]
pub struct Completion {
    router: Arc<TransferRouter>,
    peripheral: Peripheral,
    signal: SyncSender<()>,
    released: bool,
}

impl Completion {
    pub fn peripheral(&self) -> Peripheral {
        self.peripheral
    }

    /// Wakes the waiting driver. Safe to call from any thread.
    pub fn complete(mut self) {
        self.release();
        self.signal.try_send(()).ok();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.router.release(self.peripheral);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.release()
    }
}

/// Waiting side of a registered transfer.
pub(crate) struct Pending(Receiver<()>);

impl Pending {
    pub(crate) fn wait(self, timeout: Option<Duration>) -> Result<(), WaitError> {
        match timeout {
            None => self.0.recv().map_err(|_| WaitError::Abandoned),
            Some(timeout) => self.0.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => WaitError::TimedOut,
                RecvTimeoutError::Disconnected => WaitError::Abandoned,
            }),
        }
    }
}
