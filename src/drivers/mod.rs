//! Device drivers subsystem
//!
//! Organized by device class:
//! - `mailbox`: VideoCore mailbox interface
//! - `firmware`: typed firmware services over the property channel
//! - `cpufreq`: CPU frequency scaling

pub mod cpufreq;
pub mod firmware;
pub mod mailbox;
