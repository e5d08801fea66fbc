//! Protocol error types

use thiserror::Error;

/// Protocol-level errors
///
/// Only raised when *building* outbound data. Inbound corruption is never an
/// error: the frame assembler drops bad candidates and resynchronizes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload does not fit in a single frame
    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Frames must carry at least one payload byte (the channel byte)
    #[error("Empty payload")]
    EmptyPayload,

    /// Ergometer command text that is not part of the command set
    #[error("Unknown ergometer command: {0:?}")]
    UnknownCommand(String),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
