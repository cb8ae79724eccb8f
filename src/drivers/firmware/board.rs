//! Board identification
//!
//! The firmware reports a 32-bit revision word. For new-style revision codes
//! bits 4..=11 hold the board type; clock scaling is only known to be safe on
//! the BCM2711 boards listed in [`SUPPORTED_MODELS`].
//!
//! Reference: <https://www.raspberrypi.com/documentation/computers/raspberry-pi.html#new-style-revision-codes>

use core::fmt;

use crate::drivers::mailbox::{MailboxTransport, PropertyError, PropertyMailbox, PropertyTag};

/// Model field of the revision word
pub const REV_MODEL_MASK: u32 = 0x0000_0FF0;

/// Shift that moves the model field down to bit 0
const REV_MODEL_SHIFT: u32 = 4;

/// Boards with a supported ARM clock range
pub const SUPPORTED_MODELS: [BoardModel; 2] = [BoardModel::Model4B, BoardModel::Model400];

/// Supported board types
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardModel {
    /// Raspberry Pi 4 Model B
    Model4B = 0x11,
    /// Raspberry Pi 400
    Model400 = 0x13,
}

impl BoardModel {
    /// Gate a raw model code against [`SUPPORTED_MODELS`]
    ///
    /// Returns the unsupported code back on failure.
    pub fn from_code(code: u32) -> Result<Self, u32> {
        SUPPORTED_MODELS
            .iter()
            .copied()
            .find(|m| *m as u32 == code)
            .ok_or(code)
    }
}

impl fmt::Display for BoardModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BoardModel::Model4B => write!(f, "Raspberry Pi 4 Model B"),
            BoardModel::Model400 => write!(f, "Raspberry Pi 400"),
        }
    }
}

/// Extract the model code from a revision word
#[inline]
pub const fn model_code(revision: u32) -> u32 {
    (revision & REV_MODEL_MASK) >> REV_MODEL_SHIFT
}

/// Fetch the raw board revision word
pub fn get_board_revision<T: MailboxTransport>(
    fw: &PropertyMailbox<T>,
) -> Result<u32, PropertyError> {
    let resp = fw.request(PropertyTag::GetBoardRevision, &[0])?;
    Ok(resp.word(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mailbox::fake::{FakeFirmware, REV_CM4, REV_PI3BPLUS, REV_PI4B, REV_PI400};

    #[test]
    fn test_model_code_extraction() {
        assert_eq!(model_code(REV_PI4B), 0x11);
        assert_eq!(model_code(REV_PI400), 0x13);
        assert_eq!(model_code(REV_PI3BPLUS), 0x0d);
        assert_eq!(model_code(REV_CM4), 0x14);
    }

    #[test]
    fn test_supported_models() {
        assert_eq!(BoardModel::from_code(0x11), Ok(BoardModel::Model4B));
        assert_eq!(BoardModel::from_code(0x13), Ok(BoardModel::Model400));
        assert_eq!(BoardModel::from_code(0x14), Err(0x14));
        assert_eq!(BoardModel::from_code(0x0d), Err(0x0d));
        assert_eq!(BoardModel::from_code(0), Err(0));
    }

    #[test]
    fn test_get_board_revision() {
        let fw = PropertyMailbox::new(FakeFirmware::with_revision(REV_PI400));
        assert_eq!(get_board_revision(&fw), Ok(REV_PI400));
    }

    #[test]
    fn test_get_board_revision_tag_failure() {
        let fake = FakeFirmware::pi4();
        fake.state().failing_tag = Some(PropertyTag::GetBoardRevision);
        let fw = PropertyMailbox::new(&fake);

        assert_eq!(
            get_board_revision(&fw),
            Err(PropertyError::TagFailed {
                tag: PropertyTag::GetBoardRevision as u32
            })
        );
    }

    #[test]
    fn test_get_board_revision_transport_failure() {
        let fake = FakeFirmware::pi4();
        fake.state().fail_post = true;
        let fw = PropertyMailbox::new(&fake);

        assert!(matches!(get_board_revision(&fw), Err(PropertyError::Mailbox(_))));
    }
}
