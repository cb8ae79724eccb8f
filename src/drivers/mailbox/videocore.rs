//! VideoCore Mailbox Hardware Interface
//!
//! Low-level transport for the BCM2711 mailbox used to exchange property
//! buffers with the VideoCore firmware.
//!
//! # Protocol
//!
//! The mailbox passes 32-bit values where:
//! - Lower 4 bits: channel ID (0-15)
//! - Upper 28 bits: bus address of a 16-byte aligned property buffer
//!
//! A round trip blocks until the firmware has rewritten the buffer in place,
//! so [`MailboxTransport::post`] must never be called from a context that is
//! not allowed to sleep.
//!
//! # References
//!
//! - U-Boot: arch/arm/mach-bcm283x/mbox.c
//! - BCM2711 ARM Peripherals §1.3

use core::fmt;

use lazy_static::lazy_static;
use spin::Mutex;
use volatile::Volatile;

use super::property::PropertyBuffer;

/// Mailbox base address (BCM2711)
/// Source: BCM2711 ARM Peripherals §1.3
const MAILBOX_BASE: usize = 0xFE00_B880;

/// VideoCore sees ARM DRAM through the uncached 0xC0000000 alias
/// Source: U-Boot arch/arm/mach-bcm283x/phys2bus.c
const BUS_ALIAS: u32 = 0xC000_0000;

/// Mailbox status flags
const STATUS_READ_EMPTY: u32 = 0x4000_0000;
const STATUS_WRITE_FULL: u32 = 0x8000_0000;

/// Channel mask (lower 4 bits)
const CHANNEL_MASK: u32 = 0xF;

/// Status polls before a wait is declared timed out
const SPIN_LIMIT: u32 = 1_000_000;

/// Cache line size of the Cortex-A72
const CACHE_LINE: usize = 64;

lazy_static! {
    /// Shared mailbox instance; the lock serializes round trips from
    /// different callers onto the single hardware FIFO.
    pub static ref VIDEOCORE: Mutex<Mailbox> = Mutex::new(Mailbox::new());
}

/// Mailbox error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxError {
    /// Timeout while draining stale responses
    DrainTimeout,
    /// Timeout waiting for space to send
    SendTimeout,
    /// Timeout waiting for response
    ReceiveTimeout,
    /// Response channel mismatch
    ChannelMismatch,
    /// Buffer address has its channel bits set
    InvalidData,
    /// Firmware answered with a different buffer than the one posted
    ResponseMismatch,
}

impl fmt::Display for MailboxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MailboxError::DrainTimeout => write!(f, "timed out draining stale responses"),
            MailboxError::SendTimeout => write!(f, "timed out waiting for mailbox space"),
            MailboxError::ReceiveTimeout => write!(f, "timed out waiting for firmware response"),
            MailboxError::ChannelMismatch => write!(f, "response arrived on the wrong channel"),
            MailboxError::InvalidData => write!(f, "buffer address is not 16-byte aligned"),
            MailboxError::ResponseMismatch => write!(f, "firmware returned a different buffer"),
        }
    }
}

/// Blocking firmware round trip.
///
/// The firmware rewrites `buffer` in place. `Ok` carries the result word
/// the firmware handed back; any `Err` means the round trip itself failed,
/// independent of what the tags inside the buffer report.
pub trait MailboxTransport {
    fn post(&self, channel: u32, buffer: &mut PropertyBuffer) -> Result<u32, MailboxError>;
}

impl<T: MailboxTransport + ?Sized> MailboxTransport for &T {
    fn post(&self, channel: u32, buffer: &mut PropertyBuffer) -> Result<u32, MailboxError> {
        (**self).post(channel, buffer)
    }
}

impl<T: MailboxTransport> MailboxTransport for Mutex<T> {
    fn post(&self, channel: u32, buffer: &mut PropertyBuffer) -> Result<u32, MailboxError> {
        self.lock().post(channel, buffer)
    }
}

/// Mailbox hardware registers
#[repr(C)]
struct MailboxRegisters {
    read: Volatile<u32>, // 0x00: Mailbox 0 read (ARM receives)
    _reserved0: [u32; 5],
    status0: Volatile<u32>, // 0x18: Mailbox 0 status
    _config0: u32,          // 0x1C: Mailbox 0 config
    write: Volatile<u32>,   // 0x20: Mailbox 1 write (ARM sends)
    _reserved1: [u32; 5],
    status1: Volatile<u32>, // 0x38: Mailbox 1 status
    _config1: u32,          // 0x3C: Mailbox 1 config
}

/// BCM2711 mailbox hardware driver
pub struct Mailbox {
    base_addr: usize,
}

#[allow(clippy::new_without_default)] // Hardware drivers shouldn't have Default - explicit new() is clearer
impl Mailbox {
    /// Create new mailbox instance
    pub const fn new() -> Self {
        Self {
            base_addr: MAILBOX_BASE,
        }
    }

    /// Get pointer to mailbox registers
    #[allow(clippy::mut_from_ref)]
    fn regs(&self) -> &'static mut MailboxRegisters {
        // SAFETY: Mailbox registers are memory-mapped at valid MMIO address
        unsafe { &mut *(self.base_addr as *mut MailboxRegisters) }
    }

    /// Pack channel and data into mailbox value
    #[inline]
    fn pack(channel: u32, data: u32) -> u32 {
        (data & !CHANNEL_MASK) | (channel & CHANNEL_MASK)
    }

    /// Extract channel from mailbox value
    #[inline]
    fn unpack_channel(value: u32) -> u32 {
        value & CHANNEL_MASK
    }

    /// Extract data from mailbox value
    #[inline]
    fn unpack_data(value: u32) -> u32 {
        value & !CHANNEL_MASK
    }

    /// Spin until `done` holds or the poll budget runs out
    fn wait(mut done: impl FnMut() -> bool, err: MailboxError) -> Result<(), MailboxError> {
        for _ in 0..SPIN_LIMIT {
            if done() {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(err)
    }

    /// Send raw mailbox value and receive the response data
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Data has lower 4 bits set (not aligned)
    /// - Timeout occurs during any operation
    /// - Response channel doesn't match request channel
    pub fn call(&self, channel: u32, data: u32) -> Result<u32, MailboxError> {
        let regs = self.regs();

        if (data & CHANNEL_MASK) != 0 {
            return Err(MailboxError::InvalidData);
        }

        // Drain any stale responses
        Self::wait(
            || {
                if (regs.status0.read() & STATUS_READ_EMPTY) != 0 {
                    return true;
                }
                let _ = regs.read.read();
                false
            },
            MailboxError::DrainTimeout,
        )?;

        Self::wait(
            || (regs.status1.read() & STATUS_WRITE_FULL) == 0,
            MailboxError::SendTimeout,
        )?;

        barrier();
        regs.write.write(Self::pack(channel, data));

        Self::wait(
            || (regs.status0.read() & STATUS_READ_EMPTY) == 0,
            MailboxError::ReceiveTimeout,
        )?;

        let response = regs.read.read();
        if Self::unpack_channel(response) != channel {
            return Err(MailboxError::ChannelMismatch);
        }

        Ok(Self::unpack_data(response))
    }
}

impl MailboxTransport for Mailbox {
    // On a timeout after the write the firmware may still own the buffer and
    // write into it later; callers' buffers must outlive a failed round trip.
    fn post(&self, channel: u32, buffer: &mut PropertyBuffer) -> Result<u32, MailboxError> {
        let bytes = core::mem::size_of::<PropertyBuffer>();
        let addr = buffer as *mut PropertyBuffer as usize;

        // Flush cache so VideoCore sees our request
        clean_dcache(addr, bytes);

        let bus_addr = BUS_ALIAS | (addr as u32);
        let response = self.call(channel, bus_addr)?;

        // Invalidate cache so we see VideoCore's response
        invalidate_dcache(addr, bytes);

        if response != bus_addr {
            return Err(MailboxError::ResponseMismatch);
        }
        Ok(response)
    }
}

/// Cache line range covering `[addr, addr + size)`
#[cfg_attr(not(target_arch = "aarch64"), allow(dead_code))]
fn lines(addr: usize, size: usize) -> impl Iterator<Item = usize> {
    let start = addr & !(CACHE_LINE - 1);
    let end = (addr + size + CACHE_LINE - 1) & !(CACHE_LINE - 1);
    (start..end).step_by(CACHE_LINE)
}

#[cfg(target_arch = "aarch64")]
#[inline]
fn barrier() {
    // SAFETY: Data Memory Barrier only orders memory accesses
    unsafe { core::arch::asm!("dmb sy", options(nostack)) };
}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
fn barrier() {
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}

#[cfg(target_arch = "aarch64")]
fn clean_dcache(addr: usize, size: usize) {
    // SAFETY: Cleaning cache lines of a live buffer has no memory effects
    unsafe {
        for line in lines(addr, size) {
            core::arch::asm!("dc cvac, {addr}", addr = in(reg) line, options(nostack));
        }
        core::arch::asm!("dsb sy", options(nostack));
    }
}

#[cfg(target_arch = "aarch64")]
fn invalidate_dcache(addr: usize, size: usize) {
    // SAFETY: The buffer was written by VideoCore; dropping our stale lines
    // is exactly what we want
    unsafe {
        core::arch::asm!("dsb sy", options(nostack));
        for line in lines(addr, size) {
            core::arch::asm!("dc ivac, {addr}", addr = in(reg) line, options(nostack));
        }
        core::arch::asm!("dsb sy", options(nostack));
    }
}

#[cfg(not(target_arch = "aarch64"))]
fn clean_dcache(_addr: usize, _size: usize) {
    barrier();
}

#[cfg(not(target_arch = "aarch64"))]
fn invalidate_dcache(_addr: usize, _size: usize) {
    barrier();
}
