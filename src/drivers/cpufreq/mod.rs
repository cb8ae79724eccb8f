//! CPU frequency scaling
//!
//! - `rpi`: ARM clock scaling for BCM2711 boards via the firmware
//! - `reclock`: deferred apply task that keeps firmware calls off
//!   non-sleeping contexts
//!
//! The host power-management policy talks to a driver through
//! [`PerfControl`]. Instead of a global device pointer the host owns a
//! [`PerfHooks`] and the attached driver is registered into it once; every
//! hook invocation dispatches to that registered instance.

pub mod reclock;
pub mod rpi;

pub use reclock::{ReclockTask, TaskState, WorkQueue};
pub use rpi::RpiCpu;

use core::fmt;

use spin::Once;

use crate::drivers::mailbox::property::DecodeError;
use crate::drivers::mailbox::{MailboxError, PropertyError};

// errno values handed back through the host hooks
const EIO: i32 = 5;
const ENXIO: i32 = 6;
const EBUSY: i32 = 16;
const ENODEV: i32 = 19;
const EINVAL: i32 = 22;

/// Clock scaling errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuFreqError {
    /// Mailbox round trip failed
    Transport(MailboxError),
    /// Firmware rejected a tag despite a good round trip
    Protocol { tag: u32 },
    /// Firmware answered with a malformed buffer
    Malformed(DecodeError),
    /// Board model is not one we can scale
    UnsupportedBoard { model: u32 },
    /// Firmware clock limits are unusable
    InvalidRange { min_hz: u32, max_hz: u32 },
    /// No driver attached to the hooks
    NotAttached,
    /// Hooks already carry a driver
    AlreadyRegistered,
}

impl CpuFreqError {
    /// errno equivalent for the host's status-returning hooks
    pub fn errno(&self) -> i32 {
        match self {
            CpuFreqError::Transport(_) => EIO,
            CpuFreqError::Protocol { .. } => EINVAL,
            CpuFreqError::Malformed(_) => EIO,
            CpuFreqError::UnsupportedBoard { .. } => ENODEV,
            CpuFreqError::InvalidRange { .. } => EINVAL,
            CpuFreqError::NotAttached => ENXIO,
            CpuFreqError::AlreadyRegistered => EBUSY,
        }
    }
}

impl From<PropertyError> for CpuFreqError {
    fn from(e: PropertyError) -> Self {
        match e {
            PropertyError::Mailbox(e) => CpuFreqError::Transport(e),
            PropertyError::Decode(e) => CpuFreqError::Malformed(e),
            PropertyError::PayloadTooLarge => CpuFreqError::Malformed(DecodeError::PayloadTooLarge),
            PropertyError::TagFailed { tag } => CpuFreqError::Protocol { tag },
            PropertyError::TagMismatch { expected, .. } => CpuFreqError::Protocol { tag: expected },
        }
    }
}

impl fmt::Display for CpuFreqError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CpuFreqError::Transport(e) => write!(f, "mailbox transport failed: {}", e),
            CpuFreqError::Protocol { tag } => write!(f, "firmware rejected tag {:#010x}", tag),
            CpuFreqError::Malformed(e) => write!(f, "malformed firmware response: {}", e),
            CpuFreqError::UnsupportedBoard { model } => {
                write!(f, "unsupported board revision {:#x}", model)
            }
            CpuFreqError::InvalidRange { min_hz, max_hz } => {
                write!(f, "invalid clock range {}-{} Hz", min_hz, max_hz)
            }
            CpuFreqError::NotAttached => write!(f, "no cpu frequency driver attached"),
            CpuFreqError::AlreadyRegistered => write!(f, "cpu frequency hooks already registered"),
        }
    }
}

/// Capability handed to the host power-management policy
///
/// Both calls must be safe from contexts that cannot sleep.
pub trait PerfControl: Sync {
    /// Current target clock speed in MHz
    fn clockspeed(&self) -> u32;

    /// Request a performance level, 0 (slowest) to 100 (fastest)
    fn set_performance(&self, level: u32);
}

/// Host-side hook table for one cpu frequency driver
pub struct PerfHooks<'a> {
    ctl: Once<&'a dyn PerfControl>,
}

impl<'a> PerfHooks<'a> {
    pub const fn new() -> Self {
        Self { ctl: Once::new() }
    }

    /// Install the driver; only the first registration wins
    pub fn register(&self, ctl: &'a dyn PerfControl) -> Result<(), CpuFreqError> {
        let mut installed = false;
        self.ctl.call_once(|| {
            installed = true;
            ctl
        });
        if installed {
            Ok(())
        } else {
            Err(CpuFreqError::AlreadyRegistered)
        }
    }

    pub fn is_attached(&self) -> bool {
        self.ctl.get().is_some()
    }

    /// `hw.cpuspeed` hook
    pub fn cpuspeed(&self) -> Result<u32, CpuFreqError> {
        self.ctl
            .get()
            .map(|ctl| ctl.clockspeed())
            .ok_or(CpuFreqError::NotAttached)
    }

    /// `hw.setperf` hook; ignored until a driver is registered
    pub fn setperf(&self, level: u32) {
        if let Some(ctl) = self.ctl.get() {
            ctl.set_performance(level);
        }
    }
}

impl Default for PerfHooks<'_> {
    fn default() -> Self {
        Self::new()
    }
}
