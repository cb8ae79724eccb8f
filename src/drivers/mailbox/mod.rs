//! VideoCore Mailbox Interface
//!
//! The BCM2711 SoC contains the VideoCore GPU which controls initial boot
//! and provides various system services via a mailbox protocol. The mailbox
//! hardware supports passing 32-bit messages between the ARM CPU and VideoCore.
//!
//! The property channel (channel 8) carries the structured requests the
//! clock scaling driver needs: board revision and ARM clock rates.
//!
//! # References
//!
//! - U-Boot: arch/arm/mach-bcm283x/mbox.c
//! - Firmware docs: <https://github.com/raspberrypi/firmware/wiki/Mailboxes>

pub mod property;
pub mod videocore;

#[cfg(test)]
pub(crate) mod fake;

pub use property::{PropertyBuffer, PropertyError, PropertyMailbox, PropertyTag};
pub use videocore::{Mailbox, MailboxError, MailboxTransport, VIDEOCORE};
