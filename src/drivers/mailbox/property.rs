//! Property Mailbox Channel
//!
//! Codec and request helper for the VideoCore property mailbox (channel 8).
//!
//! # Protocol
//!
//! Messages consist of:
//! 1. Header (buffer size + request/response code)
//! 2. One tag (tag ID + value buffer size + request/response code + value)
//! 3. End tag (0x00000000)
//!
//! All fields are little-endian 32-bit words. Value buffers are padded to a
//! whole number of words. The firmware answers in place: the header code
//! becomes `0x80000000` (or `0x80000001` on a parse error) and every tag it
//! processed gets bit 31 of its code set, with the response length in the
//! low bits.
//!
//! This driver only ever sends single-tag messages, so the codec encodes and
//! inspects exactly one tag.
//!
//! # References
//!
//! - U-Boot: arch/arm/mach-bcm283x/include/mach/mbox.h
//! - Firmware wiki: <https://github.com/raspberrypi/firmware/wiki/Mailbox-property-interface>

use core::fmt;

use super::videocore::{MailboxError, MailboxTransport};

/// Property channel ID (ARM to VideoCore)
pub const PROPERTY_CHANNEL: u32 = 8;

/// Request code (sent by ARM)
pub const PROCESS_REQUEST: u32 = 0x0000_0000;

/// Success response code (set by VideoCore)
pub const RESPONSE_SUCCESS: u32 = 0x8000_0000;

/// Failure response code (set by VideoCore when it could not parse the buffer)
pub const RESPONSE_FAILURE: u32 = 0x8000_0001;

/// Tag code for an unprocessed request
pub const TAG_REQUEST: u32 = 0x0000_0000;

/// Response bit in a tag code
pub const TAG_RESPONSE: u32 = 0x8000_0000;

/// Terminating tag ID
pub const TAG_NULL: u32 = 0x0000_0000;

/// Largest value buffer any tag sent by this driver needs (SET_CLOCKRATE)
pub const MAX_VALUE_WORDS: usize = 3;

/// Words in a property buffer (one 64-byte cache line)
pub const BUFFER_WORDS: usize = 16;

/// Bytes in a property buffer
pub const BUFFER_BYTES: usize = BUFFER_WORDS * 4;

const HEADER_WORDS: usize = 2;
const TAG_HEADER_WORDS: usize = 3;

/// Smallest valid message: header, tag header, terminator
const MIN_MESSAGE_BYTES: usize = (HEADER_WORDS + TAG_HEADER_WORDS + 1) * 4;

// Word offsets inside a single-tag message
const W_LENGTH: usize = 0;
const W_STATUS: usize = 1;
const W_TAG: usize = 2;
const W_TAG_LEN: usize = 3;
const W_TAG_CODE: usize = 4;
const W_VALUE: usize = 5;

/// Property mailbox tag IDs used by the clock scaling driver
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyTag {
    /// Get board revision (0x00010002)
    GetBoardRevision = 0x0001_0002,
    /// Get current clock rate (0x00030002)
    GetClockRate = 0x0003_0002,
    /// Get maximum supported clock rate (0x00030004)
    GetMaxClockRate = 0x0003_0004,
    /// Get minimum supported clock rate (0x00030007)
    GetMinClockRate = 0x0003_0007,
    /// Set clock rate (0x00038002)
    SetClockRate = 0x0003_8002,
}

/// Malformed property buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes than the header says, or too few for one tag
    Undersized,
    /// Header length disagrees with the tag layout it describes
    LengthMismatch,
    /// No NULL tag after the first tag
    MissingTerminator,
    /// Value buffer larger than a property buffer can carry
    PayloadTooLarge,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::Undersized => write!(f, "property buffer is undersized"),
            DecodeError::LengthMismatch => write!(f, "property buffer length mismatch"),
            DecodeError::MissingTerminator => write!(f, "property buffer lacks end tag"),
            DecodeError::PayloadTooLarge => write!(f, "tag value buffer too large"),
        }
    }
}

/// Property mailbox errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyError {
    /// Underlying mailbox error
    Mailbox(MailboxError),
    /// Firmware handed back a malformed buffer
    Decode(DecodeError),
    /// Request value does not fit in a property buffer
    PayloadTooLarge,
    /// Tag response bit not set, or the message status reports failure
    TagFailed { tag: u32 },
    /// Firmware answered a different tag than the one requested
    TagMismatch { expected: u32, found: u32 },
}

impl fmt::Display for PropertyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PropertyError::Mailbox(e) => write!(f, "mailbox: {}", e),
            PropertyError::Decode(e) => write!(f, "decode: {}", e),
            PropertyError::PayloadTooLarge => write!(f, "request value too large"),
            PropertyError::TagFailed { tag } => write!(f, "tag {:#010x} failed", tag),
            PropertyError::TagMismatch { expected, found } => {
                write!(f, "expected tag {:#010x}, got {:#010x}", expected, found)
            }
        }
    }
}

/// Property message buffer
/// Aligned to cache line size (64 bytes) as required by VideoCore firmware
#[repr(C, align(64))]
#[derive(Clone, PartialEq, Eq)]
pub struct PropertyBuffer {
    words: [u32; BUFFER_WORDS],
}

impl PropertyBuffer {
    /// Zeroed buffer
    pub const fn zeroed() -> Self {
        Self {
            words: [0; BUFFER_WORDS],
        }
    }

    /// Rebuild a buffer from wire bytes
    ///
    /// `bytes` must hold at least the length announced in the header.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < 4 {
            return Err(DecodeError::Undersized);
        }
        let total = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if total > BUFFER_BYTES {
            return Err(DecodeError::PayloadTooLarge);
        }
        if total < MIN_MESSAGE_BYTES || bytes.len() < total {
            return Err(DecodeError::Undersized);
        }
        if total % 4 != 0 {
            return Err(DecodeError::LengthMismatch);
        }

        let mut buf = Self::zeroed();
        for (i, chunk) in bytes[..total].chunks_exact(4).enumerate() {
            buf.words[i] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]).to_le();
        }
        Ok(buf)
    }

    /// Wire bytes of the whole buffer
    pub fn to_bytes(&self) -> [u8; BUFFER_BYTES] {
        let mut bytes = [0u8; BUFFER_BYTES];
        for (i, chunk) in bytes.chunks_exact_mut(4).enumerate() {
            chunk.copy_from_slice(&self.word(i).to_le_bytes());
        }
        bytes
    }

    /// Total message length in bytes as announced by the header
    pub fn len(&self) -> usize {
        self.word(W_LENGTH) as usize
    }

    /// Whether the header announces an empty message
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Message status code
    pub fn status(&self) -> u32 {
        self.word(W_STATUS)
    }

    #[inline]
    pub(crate) fn word(&self, index: usize) -> u32 {
        u32::from_le(self.words[index])
    }

    #[inline]
    pub(crate) fn set_word(&mut self, index: usize, value: u32) {
        self.words[index] = value.to_le();
    }
}

impl fmt::Debug for PropertyBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let words = (self.len() / 4).clamp(HEADER_WORDS, BUFFER_WORDS);
        f.debug_list()
            .entries((0..words).map(|i| self.word(i)))
            .finish()
    }
}

/// Decoded single-tag response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagResponse {
    /// Tag ID found in the buffer
    pub tag_id: u32,
    /// Tag was processed and the message status is success
    pub success: bool,
    value: [u32; MAX_VALUE_WORDS],
    value_words: usize,
}

impl TagResponse {
    /// Value buffer words, as sized by the request
    pub fn value(&self) -> &[u32] {
        &self.value[..self.value_words]
    }

    /// Word `index` of the value buffer, zero when out of range
    pub fn word(&self, index: usize) -> u32 {
        self.value().get(index).copied().unwrap_or(0)
    }
}

/// Encode a single-tag request
///
/// The value buffer is `payload`; it doubles as the space the firmware writes
/// the response into, so callers pass zero placeholders for response words.
pub fn encode_request(tag_id: u32, payload: &[u32]) -> Result<PropertyBuffer, PropertyError> {
    if payload.len() > MAX_VALUE_WORDS {
        return Err(PropertyError::PayloadTooLarge);
    }

    let end = W_VALUE + payload.len();
    let mut buf = PropertyBuffer::zeroed();
    buf.set_word(W_LENGTH, ((end + 1) * 4) as u32);
    buf.set_word(W_STATUS, PROCESS_REQUEST);
    buf.set_word(W_TAG, tag_id);
    buf.set_word(W_TAG_LEN, (payload.len() * 4) as u32);
    buf.set_word(W_TAG_CODE, TAG_REQUEST);
    for (i, word) in payload.iter().enumerate() {
        buf.set_word(W_VALUE + i, *word);
    }
    buf.set_word(end, TAG_NULL);
    Ok(buf)
}

/// Decode the single tag of a response buffer
///
/// Only the first tag is inspected. A tag counts as successful when the
/// firmware set its response bit and the message status is success.
pub fn decode_response(buf: &PropertyBuffer) -> Result<TagResponse, DecodeError> {
    let total = buf.len();
    if total < MIN_MESSAGE_BYTES {
        return Err(DecodeError::Undersized);
    }
    if total > BUFFER_BYTES {
        return Err(DecodeError::PayloadTooLarge);
    }

    // Value buffers are padded to whole words
    let value_bytes = buf.word(W_TAG_LEN) as usize;
    let value_words = value_bytes.div_ceil(4);
    if value_words > MAX_VALUE_WORDS {
        return Err(DecodeError::PayloadTooLarge);
    }
    let end = W_VALUE + value_words;
    if total != (end + 1) * 4 {
        return Err(DecodeError::LengthMismatch);
    }
    if buf.word(end) != TAG_NULL {
        return Err(DecodeError::MissingTerminator);
    }

    let mut value = [0u32; MAX_VALUE_WORDS];
    for (i, slot) in value.iter_mut().take(value_words).enumerate() {
        *slot = buf.word(W_VALUE + i);
    }

    let responded = buf.word(W_TAG_CODE) & TAG_RESPONSE != 0;
    Ok(TagResponse {
        tag_id: buf.word(W_TAG),
        success: responded && buf.status() == RESPONSE_SUCCESS,
        value,
        value_words,
    })
}

/// Property mailbox interface
///
/// Posts single-tag requests over a [`MailboxTransport`] and checks the
/// answer. Every call blocks for a firmware round trip.
pub struct PropertyMailbox<T> {
    mbox: T,
}

impl<T: MailboxTransport> PropertyMailbox<T> {
    /// Create new property mailbox interface
    pub const fn new(mbox: T) -> Self {
        Self { mbox }
    }

    /// Send one tag and return its decoded, successful response
    ///
    /// # Errors
    ///
    /// - [`PropertyError::Mailbox`] if the round trip failed
    /// - [`PropertyError::Decode`] if the firmware returned garbage
    /// - [`PropertyError::TagFailed`] if the firmware rejected the tag
    pub fn request(&self, tag: PropertyTag, payload: &[u32]) -> Result<TagResponse, PropertyError> {
        let mut msg = encode_request(tag as u32, payload)?;

        self.mbox
            .post(PROPERTY_CHANNEL, &mut msg)
            .map_err(|e| {
                log::error!("rpicpu: post failed for tag {:#010x}: {}", tag as u32, e);
                PropertyError::Mailbox(e)
            })?;

        let resp = decode_response(&msg).map_err(PropertyError::Decode)?;
        if resp.tag_id != tag as u32 {
            return Err(PropertyError::TagMismatch {
                expected: tag as u32,
                found: resp.tag_id,
            });
        }
        if !resp.success {
            return Err(PropertyError::TagFailed { tag: tag as u32 });
        }
        Ok(resp)
    }
}
