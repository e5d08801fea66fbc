//! Wireless frame and channel types
//!
//! A [`Frame`] is one validated unit of the stick's serial protocol:
//!
//! ```text
//! [sync][length][message id][payload: length bytes][checksum]
//! ```
//!
//! The low three bits of the first payload byte carry the channel number.

use serde::{Deserialize, Serialize};

/// Number of logical channels on the stick
pub const CHANNEL_COUNT: usize = 8;

/// Logical wireless channel (0-7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Channel(u8);

impl Channel {
    /// Create a channel, rejecting numbers outside 0-7
    pub fn new(number: u8) -> Option<Self> {
        if (number as usize) < CHANNEL_COUNT {
            Some(Self(number))
        } else {
            None
        }
    }

    /// Extract the channel from a payload's leading byte (low 3 bits)
    pub fn from_leading_byte(byte: u8) -> Self {
        Self(byte & 0x07)
    }

    /// Channel number
    pub fn number(self) -> u8 {
        self.0
    }

    /// Index into per-channel tables
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// A checksum-validated frame
///
/// Only the frame assembler produces these from inbound bytes, so holding a
/// `Frame` means the checksum matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Message type byte
    pub message_id: u8,
    /// Payload bytes (never empty for inbound frames)
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame from its parts
    pub fn new(message_id: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            message_id,
            payload: payload.into(),
        }
    }

    /// Channel addressed by this frame, if it has a payload
    pub fn channel(&self) -> Option<Channel> {
        self.payload.first().map(|b| Channel::from_leading_byte(*b))
    }

    /// Payload byte at `offset`
    pub fn payload_byte(&self, offset: usize) -> Option<u8> {
        self.payload.get(offset).copied()
    }
}
