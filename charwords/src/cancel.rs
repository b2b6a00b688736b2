//! Broadcast cancellation shared by every pipeline stage.
//!
//! The signal is a zero-capacity channel that nobody ever sends on. Firing
//! the [`CancelTrigger`] drops the only sender, which disconnects the channel;
//! from then on every `recv` on a [`CancelSignal`] returns immediately. That
//! makes the signal usable as one arm of a `crossbeam_channel::select!`, so a
//! blocked hand-off always has a way out once shutdown is requested.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

/// Read-only, cloneable view of the cancellation state
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: Receiver<()>,
}

/// The single owner able to raise cancellation.
///
/// Dropping the trigger fires it, so a coordinator that returns early (or
/// unwinds) always releases the stages it started.
#[derive(Debug)]
pub struct CancelTrigger {
    tx: Option<Sender<()>>,
}

/// Creates a connected trigger/signal pair
pub fn cancellation() -> (CancelTrigger, CancelSignal) {
    let (tx, rx) = bounded(0);
    (CancelTrigger { tx: Some(tx) }, CancelSignal { rx })
}

impl CancelTrigger {
    /// Raises cancellation. Idempotent.
    pub fn fire(&mut self) {
        self.tx.take();
    }

    pub fn is_fired(&self) -> bool {
        self.tx.is_none()
    }
}

impl Drop for CancelTrigger {
    fn drop(&mut self) {
        self.fire();
    }
}

impl CancelSignal {
    /// Non-blocking check
    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Receiver that becomes ready (disconnected) once cancellation fires.
    ///
    /// Only meant for `select!` arms; it never yields a value.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
