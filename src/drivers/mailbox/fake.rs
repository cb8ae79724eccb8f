//! In-memory VideoCore firmware for tests
//!
//! Interprets the single-tag property requests the driver sends and answers
//! them the way the real firmware does: in place, with the message status and
//! the tag response bit set.

use spin::{Mutex, MutexGuard};

use super::property::{PROPERTY_CHANNEL, PropertyBuffer, PropertyTag, RESPONSE_SUCCESS, TAG_RESPONSE};
use super::videocore::{MailboxError, MailboxTransport};
use crate::drivers::firmware::clock::ClockId;

/// Raspberry Pi 4 Model B, 4GB, revision 1.1
pub const REV_PI4B: u32 = 0x00c0_3111;
/// Raspberry Pi 400
pub const REV_PI400: u32 = 0x00c0_3130;
/// Raspberry Pi 3 Model B+
pub const REV_PI3BPLUS: u32 = 0x00a0_20d3;
/// Compute Module 4
pub const REV_CM4: u32 = 0x00b0_3140;

pub struct FirmwareState {
    pub board_revision: u32,
    pub min_hz: u32,
    pub max_hz: u32,
    pub current_hz: u32,
    /// Fail every round trip at the transport level
    pub fail_post: bool,
    /// Leave the response bit clear for this tag
    pub failing_tag: Option<PropertyTag>,
    /// Answer the first tag under the second tag's ID
    pub mismatched_tag: Option<(PropertyTag, PropertyTag)>,
    /// Rates requested through SET_CLOCKRATE, in order
    pub set_calls: Vec<u32>,
    pub posts: usize,
}

pub struct FakeFirmware {
    state: Mutex<FirmwareState>,
}

impl FakeFirmware {
    /// Pi 4B with the stock 600-1500 MHz ARM range, idling at 600 MHz
    pub fn pi4() -> Self {
        Self::with_revision(REV_PI4B)
    }

    pub fn with_revision(board_revision: u32) -> Self {
        Self {
            state: Mutex::new(FirmwareState {
                board_revision,
                min_hz: 600_000_000,
                max_hz: 1_500_000_000,
                current_hz: 600_000_000,
                fail_post: false,
                failing_tag: None,
                mismatched_tag: None,
                set_calls: Vec::new(),
                posts: 0,
            }),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FirmwareState> {
        self.state.lock()
    }

    pub fn set_calls(&self) -> Vec<u32> {
        self.state.lock().set_calls.clone()
    }
}

impl MailboxTransport for FakeFirmware {
    fn post(&self, channel: u32, buffer: &mut PropertyBuffer) -> Result<u32, MailboxError> {
        let mut st = self.state.lock();
        st.posts += 1;
        if st.fail_post {
            return Err(MailboxError::ReceiveTimeout);
        }
        assert_eq!(channel, PROPERTY_CHANNEL);

        buffer.set_word(1, RESPONSE_SUCCESS);

        let tag = buffer.word(2);
        if st.failing_tag.is_some_and(|t| t as u32 == tag) {
            return Ok(0);
        }

        let arm = buffer.word(5) == ClockId::Arm as u32;
        let response_len = if tag == PropertyTag::GetBoardRevision as u32 {
            buffer.set_word(5, st.board_revision);
            4
        } else if tag == PropertyTag::GetMinClockRate as u32 && arm {
            buffer.set_word(6, st.min_hz);
            8
        } else if tag == PropertyTag::GetMaxClockRate as u32 && arm {
            buffer.set_word(6, st.max_hz);
            8
        } else if tag == PropertyTag::GetClockRate as u32 && arm {
            buffer.set_word(6, st.current_hz);
            8
        } else if tag == PropertyTag::SetClockRate as u32 && arm {
            let hz = buffer.word(6);
            st.set_calls.push(hz);
            st.current_hz = hz;
            8
        } else {
            return Ok(0);
        };

        buffer.set_word(4, TAG_RESPONSE | response_len);
        if let Some((asked, answered)) = st.mismatched_tag {
            if asked as u32 == tag {
                buffer.set_word(2, answered as u32);
            }
        }
        Ok(0)
    }
}
