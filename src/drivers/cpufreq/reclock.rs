//! Deferred reclock task
//!
//! Setting the ARM clock is a blocking mailbox round trip, but performance
//! requests may arrive from contexts that must not sleep. The request path
//! therefore only flips this task from idle to scheduled and pokes a
//! [`WorkQueue`]; the worker later takes the task and performs the firmware
//! call.
//!
//! ```text
//!            schedule()                take()
//!   Idle ─────────────────▶ Scheduled ───────▶ Idle (worker applies target)
//!    ▲                        │   ▲
//!    └── worker done          └───┘ schedule() again: coalesced, no-op
//! ```
//!
//! The task carries no payload. The worker re-reads the latest target when
//! it runs, so a burst of requests collapses into one apply of the newest.

use core::sync::atomic::{AtomicU8, Ordering};

/// Worker-context scheduling seam
///
/// `queue_work` is called from the performance request path and must not
/// block. The implementation arranges for the owner's `reclock()` to run on
/// a context that may sleep.
pub trait WorkQueue {
    fn queue_work(&self);
}

/// Polled operation: the host calls `reclock()` on its own schedule.
impl WorkQueue for () {
    fn queue_work(&self) {}
}

impl<Q: WorkQueue + ?Sized> WorkQueue for &Q {
    fn queue_work(&self) {
        (**self).queue_work()
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle = 0,
    Scheduled = 1,
}

/// Single reusable pending-apply marker
pub struct ReclockTask {
    state: AtomicU8,
}

impl ReclockTask {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(TaskState::Idle as u8),
        }
    }

    /// Mark the task scheduled
    ///
    /// Returns `true` only for the caller that moved it out of idle; that
    /// caller is the one that must queue the worker.
    pub fn schedule(&self) -> bool {
        self.state
            .compare_exchange(
                TaskState::Idle as u8,
                TaskState::Scheduled as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Claim the scheduled task for the worker
    ///
    /// The task returns to idle before the apply runs, so a request that
    /// lands during the firmware call schedules a fresh run.
    pub fn take(&self) -> bool {
        self.state
            .compare_exchange(
                TaskState::Scheduled as u8,
                TaskState::Idle as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub fn state(&self) -> TaskState {
        match self.state.load(Ordering::SeqCst) {
            0 => TaskState::Idle,
            _ => TaskState::Scheduled,
        }
    }
}

impl Default for ReclockTask {
    fn default() -> Self {
        Self::new()
    }
}
