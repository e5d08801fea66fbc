//! Routing decisions for validated frames
//!
//! Pure classification; the driver owns the handlers these decisions feed.

use crate::messages::{
    ACK_DATA, BROADCAST_DATA, BURST_DATA, CAPABILITIES, CHANNEL_EVENT, CHANNEL_ID,
    CHANNEL_STATUS, EVENT_CODE_OFFSET, EVENT_TRANSFER_TX_FAILED, SERIAL_NUMBER, STARTUP, VERSION,
};
use crate::types::Frame;

/// What the router does with a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Hand to channel-event handling
    Channel,
    /// Recognised notification, not processed further
    Accepted,
    /// Dropped (startup notification, failed transmit, unknown id)
    Ignored,
}

/// Classify a validated frame by its message id
pub fn classify(frame: &Frame) -> Route {
    match frame.message_id {
        STARTUP => Route::Ignored,
        ACK_DATA | BROADCAST_DATA | CHANNEL_STATUS | CHANNEL_ID | BURST_DATA => Route::Channel,
        CHANNEL_EVENT => match frame.payload_byte(EVENT_CODE_OFFSET) {
            Some(EVENT_TRANSFER_TX_FAILED) => Route::Ignored,
            _ => Route::Channel,
        },
        VERSION | CAPABILITIES | SERIAL_NUMBER => Route::Accepted,
        _ => Route::Ignored,
    }
}

/// Per-channel message subtype
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMessage {
    Event,
    AckData,
    BroadcastData,
    ChannelId,
    BurstData,
    /// No channel handler for this id (e.g. channel status)
    Unhandled,
}

impl ChannelMessage {
    /// Subtype of a frame already routed to a channel
    pub fn of(frame: &Frame) -> Self {
        match frame.message_id {
            CHANNEL_EVENT => Self::Event,
            ACK_DATA => Self::AckData,
            BROADCAST_DATA => Self::BroadcastData,
            CHANNEL_ID => Self::ChannelId,
            BURST_DATA => Self::BurstData,
            _ => Self::Unhandled,
        }
    }
}
