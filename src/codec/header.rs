//! Fixed header: the first byte of every message plus its remaining length.
//!
//! ```text
//! | bit   |  7  6  5  4  |  3  |  2  1  |   0    |
//! | byte1 | message type | dup |  QoS   | retain |
//! | byte2+|        remaining length (1-4)        |
//! ```

use super::types::{HeaderFlags, MessageType, QoS, DEFAULT_MAX_LEN, PUBLISH_MAX_LEN};
use crate::error::{Error, Result};

/// Upper bounds on the remaining length accepted from a peer.
///
/// Checked before any payload buffer is allocated, so a corrupt or hostile
/// length field costs at most this much memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_publish_length: u32,
    pub max_length: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_publish_length: PUBLISH_MAX_LEN,
            max_length: DEFAULT_MAX_LEN,
        }
    }
}

impl Limits {
    pub fn max_for(&self, message_type: MessageType) -> u32 {
        match message_type {
            MessageType::Publish => self.max_publish_length,
            _ => self.max_length,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub message_type: MessageType,
    pub flags: HeaderFlags,
    pub remaining_length: u32,
}

impl FixedHeader {
    pub fn new(message_type: MessageType, flags: HeaderFlags, remaining_length: u32) -> Self {
        Self {
            message_type,
            flags,
            remaining_length,
        }
    }

    /// Unpacks the first byte and checks it, together with the remaining
    /// length, against `limits`.
    pub fn parse(first_byte: u8, remaining_length: u32, limits: &Limits) -> Result<Self> {
        let type_bits = (first_byte & 0b1111_0000) >> 4;
        let message_type =
            MessageType::try_from(type_bits).map_err(|_| Error::BadMessageType(type_bits))?;
        let qos = QoS::from_bits((first_byte & 0b0000_0110) >> 1)?;

        let max = limits.max_for(message_type);
        if remaining_length > max {
            return Err(Error::MessageTooLong {
                message_type,
                length: remaining_length,
                max,
            });
        }

        let flags = HeaderFlags {
            dup: first_byte & 0b0000_1000 != 0,
            qos,
            retain: first_byte & 0b0000_0001 != 0,
        };

        Ok(Self::new(message_type, flags, remaining_length))
    }

    pub fn to_byte(&self) -> u8 {
        let mut byte = (self.message_type as u8) << 4;
        if self.flags.dup {
            byte |= 0b0000_1000;
        }
        byte |= ((self.flags.qos as u8) << 1) & 0b0000_0110;
        if self.flags.retain {
            byte |= 0b0000_0001;
        }
        byte
    }
}
