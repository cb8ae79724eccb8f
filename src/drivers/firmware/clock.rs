//! ARM clock rate requests
//!
//! The firmware owns the clock tree; the ARM core runs at whatever rate it
//! was last asked for, within the board's min/max limits. Rates are in Hz.

use core::fmt;

use crate::drivers::mailbox::{MailboxTransport, PropertyError, PropertyMailbox, PropertyTag};

/// Firmware clock IDs
///
/// Only the ARM core clock is driven here.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockId {
    /// ARM core clock (0x00000003)
    Arm = 0x0000_0003,
}

/// Which rate to ask the firmware for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateQuery {
    /// Lowest rate the firmware will accept
    Min,
    /// Highest rate the firmware will accept
    Max,
    /// Rate the clock currently runs at
    Current,
}

impl RateQuery {
    fn tag(self) -> PropertyTag {
        match self {
            RateQuery::Min => PropertyTag::GetMinClockRate,
            RateQuery::Max => PropertyTag::GetMaxClockRate,
            RateQuery::Current => PropertyTag::GetClockRate,
        }
    }
}

#[inline]
pub const fn hz_to_mhz(hz: u32) -> u32 {
    hz / 1_000_000
}

/// Supported frequency range of a clock
///
/// Always satisfies `0 < min_hz <= max_hz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockRange {
    min_hz: u32,
    max_hz: u32,
}

impl ClockRange {
    /// Range from firmware limits, `None` if they are unusable
    pub const fn new(min_hz: u32, max_hz: u32) -> Option<Self> {
        if min_hz == 0 || min_hz > max_hz {
            return None;
        }
        Some(Self { min_hz, max_hz })
    }

    pub const fn min_hz(&self) -> u32 {
        self.min_hz
    }

    pub const fn max_hz(&self) -> u32 {
        self.max_hz
    }

    pub const fn contains(&self, hz: u32) -> bool {
        hz >= self.min_hz && hz <= self.max_hz
    }
}

impl fmt::Display for ClockRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{} MHz", hz_to_mhz(self.min_hz), hz_to_mhz(self.max_hz))
    }
}

/// Query one of a clock's rates
pub fn get_frequency<T: MailboxTransport>(
    fw: &PropertyMailbox<T>,
    clock: ClockId,
    query: RateQuery,
) -> Result<u32, PropertyError> {
    let resp = fw.request(query.tag(), &[clock as u32, 0])?;
    Ok(resp.word(1))
}

/// Ask the firmware to run `clock` at `hz`
///
/// Blocks for the round trip. Returns the rate the firmware actually
/// applied; a zero answer means the clock does not exist.
pub fn set_frequency<T: MailboxTransport>(
    fw: &PropertyMailbox<T>,
    clock: ClockId,
    hz: u32,
) -> Result<u32, PropertyError> {
    // Third word: 0 = let the firmware apply turbo settings as usual
    let resp = fw.request(PropertyTag::SetClockRate, &[clock as u32, hz, 0])?;
    match resp.word(1) {
        0 => Err(PropertyError::TagFailed {
            tag: PropertyTag::SetClockRate as u32,
        }),
        applied => Ok(applied),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mailbox::fake::FakeFirmware;

    #[test]
    fn test_clock_range_validation() {
        assert!(ClockRange::new(600_000_000, 1_500_000_000).is_some());
        assert!(ClockRange::new(1_500_000_000, 1_500_000_000).is_some());
        assert_eq!(ClockRange::new(0, 1_500_000_000), None);
        assert_eq!(ClockRange::new(1_500_000_000, 600_000_000), None);
    }

    #[test]
    fn test_clock_range_contains() {
        let range = ClockRange::new(600_000_000, 1_500_000_000).unwrap();
        assert!(range.contains(600_000_000));
        assert!(range.contains(1_500_000_000));
        assert!(!range.contains(599_999_999));
        assert!(!range.contains(1_500_000_001));
    }

    #[test]
    fn test_clock_range_display() {
        let range = ClockRange::new(600_000_000, 1_500_000_000).unwrap();
        assert_eq!(format!("{}", range), "600-1500 MHz");
    }

    #[test]
    fn test_get_frequency_bounds() {
        let fw = PropertyMailbox::new(FakeFirmware::pi4());
        assert_eq!(get_frequency(&fw, ClockId::Arm, RateQuery::Min), Ok(600_000_000));
        assert_eq!(get_frequency(&fw, ClockId::Arm, RateQuery::Max), Ok(1_500_000_000));
        assert_eq!(get_frequency(&fw, ClockId::Arm, RateQuery::Current), Ok(600_000_000));
    }

    #[test]
    fn test_get_frequency_tag_failure() {
        let fake = FakeFirmware::pi4();
        fake.state().failing_tag = Some(PropertyTag::GetMaxClockRate);
        let fw = PropertyMailbox::new(&fake);

        assert_eq!(
            get_frequency(&fw, ClockId::Arm, RateQuery::Max),
            Err(PropertyError::TagFailed {
                tag: PropertyTag::GetMaxClockRate as u32
            })
        );
        assert!(get_frequency(&fw, ClockId::Arm, RateQuery::Min).is_ok());
    }

    #[test]
    fn test_set_frequency() {
        let fake = FakeFirmware::pi4();
        let fw = PropertyMailbox::new(&fake);

        assert_eq!(set_frequency(&fw, ClockId::Arm, 1_200_000_000), Ok(1_200_000_000));
        assert_eq!(fake.set_calls(), [1_200_000_000]);
        assert_eq!(get_frequency(&fw, ClockId::Arm, RateQuery::Current), Ok(1_200_000_000));
    }

    #[test]
    fn test_set_frequency_rejected() {
        let fake = FakeFirmware::pi4();
        fake.state().failing_tag = Some(PropertyTag::SetClockRate);
        let fw = PropertyMailbox::new(&fake);

        assert!(set_frequency(&fw, ClockId::Arm, 1_200_000_000).is_err());
        assert!(fake.set_calls().is_empty());
    }

    #[test]
    fn test_set_frequency_zero_answer() {
        let fake = FakeFirmware::pi4();
        let fw = PropertyMailbox::new(&fake);

        assert_eq!(
            set_frequency(&fw, ClockId::Arm, 0),
            Err(PropertyError::TagFailed {
                tag: PropertyTag::SetClockRate as u32
            })
        );
    }
}
