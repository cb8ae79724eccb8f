//! ARM clock scaling for Raspberry Pi 4 / 400
//!
//! Talks to the VideoCore firmware over the property mailbox to read the
//! board revision and ARM clock limits, then maps a 0-100 performance level
//! onto that range. Rate changes are deferred to a worker because the
//! mailbox round trip blocks.
//!
//! ```ignore
//! let cpu = rpicpu::init(&SYSTQ)?;
//! HOOKS.register(&cpu)?;
//! HOOKS.setperf(100);       // any context
//! cpu.reclock()?;           // worker context
//! ```

#![cfg_attr(not(test), no_std)]

pub mod drivers;

pub use drivers::cpufreq::{CpuFreqError, PerfControl, PerfHooks, RpiCpu, WorkQueue};
pub use drivers::mailbox::{Mailbox, MailboxTransport};

use spin::Mutex;

/// Attach the clock scaling driver to the shared hardware mailbox
///
/// Blocks for the attach round trips; call it from a context that may sleep.
pub fn init<Q: WorkQueue>(queue: Q) -> Result<RpiCpu<&'static Mutex<Mailbox>, Q>, CpuFreqError> {
    RpiCpu::attach(&*drivers::mailbox::VIDEOCORE, queue)
}
