//! Wireless frame encoding and byte-synchronous assembly
//!
//! # Frame Format
//!
//! ```text
//! [Sync: 0xA4][Length: 1..=9][Message id][Payload: Length bytes][Checksum]
//! ```
//!
//! The checksum is the running XOR of every byte before it, sync included.
//!
//! [`FrameAssembler`] consumes one byte at a time. Malformed input never
//! produces an error: a candidate with an out-of-range length or a checksum
//! mismatch is dropped and the assembler goes back to hunting for a sync byte.
//! The bytes that followed the rejected sync are re-examined, so a stray sync
//! byte in line noise cannot swallow the start of the next genuine frame.

use crate::error::{ProtocolError, Result};
use crate::types::Frame;
use std::collections::VecDeque;

/// Start-of-frame marker
pub const SYNC_BYTE: u8 = 0xA4;

/// Largest payload a frame may declare
pub const MAX_LENGTH: usize = 9;

/// Sync, length, id and checksum bytes around the payload
pub const FRAME_OVERHEAD: usize = 4;

/// Running XOR over `bytes`
#[inline]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Encode a frame for the wire
///
/// # Example
/// ```
/// use protocol::{encode_frame, SYNC_BYTE};
///
/// let bytes = encode_frame(0x4E, &[0x02, 0x11, 0x22]).unwrap();
/// assert_eq!(bytes[0], SYNC_BYTE);
/// assert_eq!(bytes[1], 3);
/// assert_eq!(bytes.len(), 7);
/// ```
pub fn encode_frame(message_id: u8, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.is_empty() {
        return Err(ProtocolError::EmptyPayload);
    }
    if payload.len() > MAX_LENGTH {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_LENGTH,
        });
    }

    let mut frame = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    frame.push(SYNC_BYTE);
    frame.push(payload.len() as u8);
    frame.push(message_id);
    frame.extend_from_slice(payload);
    frame.push(checksum(&frame));

    Ok(frame)
}

/// Assembler state; exactly one is active and only the next byte moves it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    WaitForSync,
    GetLength,
    GetMessageId,
    GetData,
    ValidatePacket,
}

/// Running totals kept by the assembler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    /// Frames that passed validation
    pub frames: u64,
    /// Candidates dropped for a bad length or checksum
    pub rejected: u64,
}

enum Step {
    Pending,
    Complete(Frame),
    Rejected,
}

/// Byte-at-a-time frame assembler
///
/// # Example
/// ```
/// use protocol::{encode_frame, FrameAssembler};
///
/// let mut assembler = FrameAssembler::new();
/// let mut frames = Vec::new();
/// let bytes = encode_frame(0x4E, &[0x02, 0x11, 0x22]).unwrap();
/// assembler.feed(&bytes, |frame| frames.push(frame));
///
/// assert_eq!(frames.len(), 1);
/// assert_eq!(frames[0].payload, vec![0x02, 0x11, 0x22]);
/// ```
#[derive(Debug)]
pub struct FrameAssembler {
    state: ParserState,
    checksum: u8,
    length: usize,
    message_id: u8,
    payload: Vec<u8>,
    /// Raw bytes of the candidate in progress, sync first
    window: Vec<u8>,
    /// Bytes waiting to be (re)examined
    pending: VecDeque<u8>,
    stats: AssemblerStats,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    /// Create an assembler waiting for a sync byte
    pub fn new() -> Self {
        Self {
            state: ParserState::WaitForSync,
            checksum: 0,
            length: 0,
            message_id: 0,
            payload: Vec::with_capacity(MAX_LENGTH),
            window: Vec::with_capacity(MAX_LENGTH + FRAME_OVERHEAD),
            pending: VecDeque::with_capacity(MAX_LENGTH + FRAME_OVERHEAD),
            stats: AssemblerStats::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Totals since creation
    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    /// Drop any partial candidate and wait for the next sync byte
    pub fn reset(&mut self) {
        self.state = ParserState::WaitForSync;
        self.window.clear();
        self.payload.clear();
        self.pending.clear();
    }

    /// Feed one byte; validated frames are handed to `on_frame` before this returns
    pub fn push<F>(&mut self, byte: u8, on_frame: &mut F)
    where
        F: FnMut(Frame),
    {
        self.pending.push_back(byte);

        while let Some(next) = self.pending.pop_front() {
            match self.step(next) {
                Step::Pending => {}
                Step::Complete(frame) => {
                    self.stats.frames += 1;
                    on_frame(frame);
                }
                Step::Rejected => {
                    self.stats.rejected += 1;
                    let mut window = std::mem::take(&mut self.window);
                    // Everything after the rejected sync goes back to the front
                    for &b in window[1..].iter().rev() {
                        self.pending.push_front(b);
                    }
                    window.clear();
                    self.window = window;
                }
            }
        }
    }

    /// Feed a slice of bytes
    pub fn feed<F>(&mut self, bytes: &[u8], mut on_frame: F)
    where
        F: FnMut(Frame),
    {
        for &byte in bytes {
            self.push(byte, &mut on_frame);
        }
    }

    fn step(&mut self, byte: u8) -> Step {
        match self.state {
            ParserState::WaitForSync => {
                if byte == SYNC_BYTE {
                    self.checksum = byte;
                    self.window.clear();
                    self.window.push(byte);
                    self.state = ParserState::GetLength;
                }
                Step::Pending
            }

            ParserState::GetLength => {
                self.window.push(byte);
                if byte == 0 || byte as usize > MAX_LENGTH {
                    self.state = ParserState::WaitForSync;
                    return Step::Rejected;
                }
                self.length = byte as usize;
                self.checksum ^= byte;
                self.payload.clear();
                self.state = ParserState::GetMessageId;
                Step::Pending
            }

            ParserState::GetMessageId => {
                self.window.push(byte);
                self.message_id = byte;
                self.checksum ^= byte;
                self.state = ParserState::GetData;
                Step::Pending
            }

            ParserState::GetData => {
                self.window.push(byte);
                self.payload.push(byte);
                self.checksum ^= byte;
                if self.payload.len() >= self.length {
                    self.state = ParserState::ValidatePacket;
                }
                Step::Pending
            }

            ParserState::ValidatePacket => {
                self.window.push(byte);
                self.state = ParserState::WaitForSync;
                if byte == self.checksum {
                    self.window.clear();
                    let payload = std::mem::replace(&mut self.payload, Vec::with_capacity(MAX_LENGTH));
                    Step::Complete(Frame {
                        message_id: self.message_id,
                        payload,
                    })
                } else {
                    Step::Rejected
                }
            }
        }
    }
}
