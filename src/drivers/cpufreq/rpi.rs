//! Raspberry Pi 4 / 400 ARM clock scaling
//!
//! The firmware exposes the ARM core clock range and accepts rate changes
//! over the property mailbox. Attach identifies the board and reads the
//! range once; after that a performance level 0-100 is mapped linearly onto
//! `[min_hz, max_hz]`.
//!
//! # Contexts
//!
//! - [`RpiCpu::set_performance`] and [`RpiCpu::clockspeed`] never block and
//!   never touch the firmware. They only read or write `target_hz`.
//! - [`RpiCpu::reclock`] does the blocking `SET_CLOCKRATE` round trip and
//!   must run on the worker queued through [`WorkQueue`].
//!
//! `target_hz` is a single atomic word. A reader may see a value one update
//! old; the pending reclock reconciles it. The target store and the task
//! state share one sequentially consistent order, so a request that finds
//! the task already scheduled is still seen by the run that takes it.
//! Nothing else is mutable after attach, apart from the apply bookkeeping
//! the worker owns.

use core::sync::atomic::{AtomicU32, Ordering};

use spin::Mutex;

use super::reclock::{ReclockTask, WorkQueue};
use super::{CpuFreqError, PerfControl};
use crate::drivers::firmware::board::{self, BoardModel};
use crate::drivers::firmware::clock::{self, ClockId, ClockRange, RateQuery, hz_to_mhz};
use crate::drivers::mailbox::{MailboxTransport, PropertyMailbox};

/// Highest performance level
pub const PERF_MAX: u32 = 100;

/// Map a performance level onto a clock range
///
/// Levels above [`PERF_MAX`] saturate. Truncation rounds toward `min_hz`,
/// so the result never leaves the range.
pub const fn level_to_hz(range: &ClockRange, level: u32) -> u32 {
    let level = if level > PERF_MAX { PERF_MAX } else { level };
    let min = range.min_hz() as u64;
    let max = range.max_hz() as u64;
    (min + (max - min) * level as u64 / PERF_MAX as u64) as u32
}

/// ARM clock scaling driver
pub struct RpiCpu<T, Q> {
    fw: PropertyMailbox<T>,
    queue: Q,
    model: BoardModel,
    range: ClockRange,
    target_hz: AtomicU32,
    task: ReclockTask,
    /// Last rate the firmware confirmed, 0 if unknown
    applied_hz: AtomicU32,
    last_error: Mutex<Option<CpuFreqError>>,
}

impl<T: MailboxTransport, Q: WorkQueue> RpiCpu<T, Q> {
    /// Identify the board and read the ARM clock range
    ///
    /// Blocks for several firmware round trips. Any failure aborts the
    /// attach; there is no degraded mode without a verified range.
    pub fn attach(transport: T, queue: Q) -> Result<Self, CpuFreqError> {
        let fw = PropertyMailbox::new(transport);

        let revision = board::get_board_revision(&fw).map_err(|e| {
            log::error!("rpicpu: failed to get board revision: {}", e);
            CpuFreqError::from(e)
        })?;
        let model = BoardModel::from_code(board::model_code(revision)).map_err(|model| {
            log::error!("rpicpu: unsupported board revision {:#x}", model);
            CpuFreqError::UnsupportedBoard { model }
        })?;

        let min_hz = clock::get_frequency(&fw, ClockId::Arm, RateQuery::Min).map_err(|e| {
            log::error!("rpicpu: failed to get min clock frequency: {}", e);
            CpuFreqError::from(e)
        })?;
        let max_hz = clock::get_frequency(&fw, ClockId::Arm, RateQuery::Max).map_err(|e| {
            log::error!("rpicpu: failed to get max clock frequency: {}", e);
            CpuFreqError::from(e)
        })?;
        let range = ClockRange::new(min_hz, max_hz).ok_or_else(|| {
            log::error!("rpicpu: invalid clock range {}-{} Hz", min_hz, max_hz);
            CpuFreqError::InvalidRange { min_hz, max_hz }
        })?;

        // Start from the rate the firmware already runs at when it is sane
        let current = match clock::get_frequency(&fw, ClockId::Arm, RateQuery::Current) {
            Ok(hz) if range.contains(hz) => hz,
            Ok(hz) => {
                log::warn!("rpicpu: current clock {} Hz outside {}, assuming minimum", hz, range);
                0
            }
            Err(e) => {
                log::warn!("rpicpu: failed to get current clock frequency: {}", e);
                0
            }
        };
        let target = if current == 0 { range.min_hz() } else { current };

        log::info!("rpicpu: {}, {}", model, range);

        Ok(Self {
            fw,
            queue,
            model,
            range,
            target_hz: AtomicU32::new(target),
            task: ReclockTask::new(),
            applied_hz: AtomicU32::new(current),
            last_error: Mutex::new(None),
        })
    }

    /// Request a performance level, 0 (slowest) to 100 (fastest)
    ///
    /// Stores the new target and queues the reclock task if it is not
    /// already pending. Safe from contexts that cannot sleep.
    pub fn set_performance(&self, level: u32) {
        let hz = level_to_hz(&self.range, level);
        self.target_hz.store(hz, Ordering::SeqCst);
        log::trace!("rpicpu: setperf {} -> {} Hz", level, hz);

        if self.task.schedule() {
            self.queue.queue_work();
        }
    }

    /// Run the pending reclock, if any
    ///
    /// Worker context only: blocks for the `SET_CLOCKRATE` round trip.
    /// Returns `Ok(None)` when nothing was pending and `Ok(Some(hz))` with
    /// the rate the firmware applied. Failures are also recorded in
    /// [`last_error`](Self::last_error); the requester never sees them.
    ///
    /// # Panics
    ///
    /// If the stored target lies outside the clock range. Every writer
    /// clamps, so this means memory corruption or a logic error.
    pub fn reclock(&self) -> Result<Option<u32>, CpuFreqError> {
        if !self.task.take() {
            return Ok(None);
        }

        let target = self.target_hz.load(Ordering::SeqCst);
        assert!(
            self.range.contains(target),
            "rpicpu: target {} Hz outside {}",
            target,
            self.range
        );

        match clock::set_frequency(&self.fw, ClockId::Arm, target) {
            Ok(applied) => {
                log::debug!("rpicpu: reclocked to {} Hz", applied);
                self.applied_hz.store(applied, Ordering::Release);
                *self.last_error.lock() = None;
                Ok(Some(applied))
            }
            Err(e) => {
                log::error!("rpicpu: failed to set clock to {} Hz: {}", target, e);
                let err = CpuFreqError::from(e);
                *self.last_error.lock() = Some(err);
                Err(err)
            }
        }
    }
}

impl<T, Q> RpiCpu<T, Q> {
    /// Current target in MHz; no firmware access
    pub fn clockspeed(&self) -> u32 {
        hz_to_mhz(self.target_hz())
    }

    pub fn target_hz(&self) -> u32 {
        self.target_hz.load(Ordering::SeqCst)
    }

    /// Last rate the firmware confirmed, if any
    pub fn applied_hz(&self) -> Option<u32> {
        match self.applied_hz.load(Ordering::Acquire) {
            0 => None,
            hz => Some(hz),
        }
    }

    /// Error from the most recent reclock, cleared by the next success
    pub fn last_error(&self) -> Option<CpuFreqError> {
        *self.last_error.lock()
    }

    pub fn is_reclock_pending(&self) -> bool {
        self.task.state() == super::TaskState::Scheduled
    }

    pub fn range(&self) -> ClockRange {
        self.range
    }

    pub fn model(&self) -> BoardModel {
        self.model
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }
}

impl<T, Q> PerfControl for RpiCpu<T, Q>
where
    T: MailboxTransport + Sync,
    Q: WorkQueue + Sync,
{
    fn clockspeed(&self) -> u32 {
        RpiCpu::clockspeed(self)
    }

    fn set_performance(&self, level: u32) {
        RpiCpu::set_performance(self, level)
    }
}
