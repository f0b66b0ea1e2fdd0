//! Cancellation state of one in-flight single-result call.
//!
//! ```text
//! Pending ──activate──▶ Active(handle)
//!    │                      │
//!    └──────cancel──────────┴──cancel──▶ Cancelled (absorbing)
//! ```
//!
//! Transitions happen under a short `parking_lot` lock. Cancelling the
//! handle always happens after the lock is released, because a task's cancel
//! may synchronously run its completion callback, which could re-enter.

use bridge_traits::TransportTask;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// Something whose work can be cancelled.
pub trait Cancel {
    fn cancel(&self);
}

impl<T: TransportTask + ?Sized> Cancel for Arc<T> {
    fn cancel(&self) {
        TransportTask::cancel(&**self)
    }
}

enum Phase<H> {
    Pending,
    Active(H),
    Cancelled,
}

/// Monotonic `Pending → Active → Cancelled` state machine.
pub struct CancellationState<H: Cancel> {
    phase: Mutex<Phase<H>>,
}

impl<H: Cancel> CancellationState<H> {
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(Phase::Pending),
        }
    }

    /// Record the running handle. If cancellation was requested before
    /// activation, the handle is cancelled right away instead.
    ///
    /// # Panics
    ///
    /// Panics when called twice; a call activates exactly one task.
    pub fn activate(&self, handle: H) {
        let mut phase = self.phase.lock();
        if matches!(*phase, Phase::Pending) {
            *phase = Phase::Active(handle);
            return;
        }
        let cancelled = matches!(*phase, Phase::Cancelled);
        drop(phase);

        if cancelled {
            trace!("Activated after cancellation; cancelling immediately");
            handle.cancel();
        } else {
            panic!("cannot activate twice");
        }
    }

    /// Request cancellation. Forwards to the handle when active; idempotent.
    pub fn cancel(&self) {
        let previous = std::mem::replace(&mut *self.phase.lock(), Phase::Cancelled);
        match previous {
            Phase::Active(handle) => {
                trace!("Cancelling active handle");
                handle.cancel();
            }
            Phase::Pending => trace!("Cancelled before activation"),
            Phase::Cancelled => {}
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.phase.lock(), Phase::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.phase.lock(), Phase::Active(_))
    }
}

impl<H: Cancel> Default for CancellationState<H> {
    fn default() -> Self {
        Self::new()
    }
}
