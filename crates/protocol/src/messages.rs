//! Wireless message identifiers and event codes
//!
//! Values follow the stick's serial message protocol. Only the subset the
//! driver routes (or must recognise to ignore) is listed here.

use crate::codec::encode_frame;
use crate::error::Result;

// Notifications
/// Stick has (re)started
pub const STARTUP: u8 = 0x6F;

// Channel data
/// Broadcast data on a channel
pub const BROADCAST_DATA: u8 = 0x4E;
/// Acknowledged data on a channel
pub const ACK_DATA: u8 = 0x4F;
/// Burst data on a channel
pub const BURST_DATA: u8 = 0x50;

// Channel responses and events
/// Channel response / RF event
pub const CHANNEL_EVENT: u8 = 0x40;
/// Channel id (device number, type, transmission type)
pub const CHANNEL_ID: u8 = 0x51;
/// Channel status
pub const CHANNEL_STATUS: u8 = 0x52;

// Requested messages
/// Firmware version string
pub const VERSION: u8 = 0x3E;
/// Stick capabilities
pub const CAPABILITIES: u8 = 0x54;
/// Stick serial number
pub const SERIAL_NUMBER: u8 = 0x61;

// Configuration
/// Assign a channel to a network
pub const ASSIGN_CHANNEL: u8 = 0x42;
/// Set the channel message period
pub const SET_CHANNEL_PERIOD: u8 = 0x43;
/// Set the channel RF frequency
pub const SET_CHANNEL_RF_FREQ: u8 = 0x45;
/// Set network key
pub const SET_NETWORK: u8 = 0x46;
/// Open a configured channel
pub const OPEN_CHANNEL: u8 = 0x4B;

/// Channel type: bidirectional master (transmitter)
pub const CHANNEL_TYPE_MASTER: u8 = 0x10;

/// Event code: a broadcast slot just went out; time to queue the next page
pub const EVENT_TX: u8 = 0x03;
/// Event code: acknowledged/burst transfer completed
pub const EVENT_TRANSFER_TX_COMPLETED: u8 = 0x05;
/// Event code: acknowledged/burst transfer failed
pub const EVENT_TRANSFER_TX_FAILED: u8 = 0x06;

/// Payload offset of the event code in a channel event
pub const EVENT_CODE_OFFSET: usize = 2;

/// Public network key used by the sport sensor profiles
pub const NETWORK_KEY: [u8; 8] = [0xB9, 0xA5, 0x21, 0xFB, 0xBD, 0x72, 0xC3, 0x45];

/// Encoded set-network-key message for `network`
///
/// Payload is the network number followed by the 8-byte key, so the frame
/// always carries a length of 9.
pub fn set_network_key(network: u8, key: &[u8; 8]) -> Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(1 + key.len());
    payload.push(network);
    payload.extend_from_slice(key);
    encode_frame(SET_NETWORK, &payload)
}

/// Encoded assign-channel message
pub fn assign_channel(channel: u8, channel_type: u8, network: u8) -> Result<Vec<u8>> {
    encode_frame(ASSIGN_CHANNEL, &[channel, channel_type, network])
}

/// Encoded set-channel-id message
pub fn set_channel_id(
    channel: u8,
    device_number: u16,
    device_type: u8,
    transmission_type: u8,
) -> Result<Vec<u8>> {
    let [lo, hi] = device_number.to_le_bytes();
    encode_frame(CHANNEL_ID, &[channel, lo, hi, device_type, transmission_type])
}

/// Encoded set-channel-period message (period in 1/32768 s units)
pub fn set_channel_period(channel: u8, period: u16) -> Result<Vec<u8>> {
    let [lo, hi] = period.to_le_bytes();
    encode_frame(SET_CHANNEL_PERIOD, &[channel, lo, hi])
}

/// Encoded set-RF-frequency message (offset from 2400 MHz)
pub fn set_channel_rf_freq(channel: u8, frequency: u8) -> Result<Vec<u8>> {
    encode_frame(SET_CHANNEL_RF_FREQ, &[channel, frequency])
}

/// Encoded open-channel message
pub fn open_channel(channel: u8) -> Result<Vec<u8>> {
    encode_frame(OPEN_CHANNEL, &[channel])
}

/// Encoded broadcast of one 8-byte data page
pub fn broadcast_data(channel: u8, page: &[u8; 8]) -> Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(1 + page.len());
    payload.push(channel);
    payload.extend_from_slice(page);
    encode_frame(BROADCAST_DATA, &payload)
}

/// Human-readable name for a message id (logging only)
pub fn message_name(message_id: u8) -> &'static str {
    match message_id {
        STARTUP => "startup",
        BROADCAST_DATA => "broadcast-data",
        ACK_DATA => "ack-data",
        BURST_DATA => "burst-data",
        CHANNEL_EVENT => "channel-event",
        CHANNEL_ID => "channel-id",
        CHANNEL_STATUS => "channel-status",
        VERSION => "version",
        CAPABILITIES => "capabilities",
        SERIAL_NUMBER => "serial-number",
        ASSIGN_CHANNEL => "assign-channel",
        SET_CHANNEL_PERIOD => "set-channel-period",
        SET_CHANNEL_RF_FREQ => "set-channel-rf-freq",
        SET_NETWORK => "set-network",
        OPEN_CHANNEL => "open-channel",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{MAX_LENGTH, SYNC_BYTE};

    #[test]
    fn test_set_network_key_layout() {
        let bytes = set_network_key(0, &NETWORK_KEY).unwrap();
        assert_eq!(bytes.len(), 13);
        assert_eq!(bytes[0], SYNC_BYTE);
        assert_eq!(bytes[1] as usize, MAX_LENGTH);
        assert_eq!(bytes[2], SET_NETWORK);
        assert_eq!(bytes[3], 0);
        assert_eq!(&bytes[4..12], &NETWORK_KEY);

        let xor = bytes[..12].iter().fold(0u8, |acc, b| acc ^ b);
        assert_eq!(bytes[12], xor);
    }

    #[test]
    fn test_channel_config_messages() {
        assert_eq!(
            assign_channel(1, CHANNEL_TYPE_MASTER, 0).unwrap()[1..6],
            [3, ASSIGN_CHANNEL, 1, CHANNEL_TYPE_MASTER, 0]
        );
        assert_eq!(
            set_channel_id(1, 0x1234, 0x0B, 0x05).unwrap()[2..8],
            [CHANNEL_ID, 1, 0x34, 0x12, 0x0B, 0x05]
        );
        assert_eq!(
            set_channel_period(1, 8182).unwrap()[3..6],
            [1, 0xF6, 0x1F]
        );
        assert_eq!(open_channel(1).unwrap()[..4], [SYNC_BYTE, 1, OPEN_CHANNEL, 1]);
    }

    #[test]
    fn test_broadcast_data_is_full_length() {
        let bytes = broadcast_data(2, &[0x10, 1, 0xFF, 90, 0, 0, 200, 0]).unwrap();
        assert_eq!(bytes[1] as usize, MAX_LENGTH);
        assert_eq!(bytes[2], BROADCAST_DATA);
        assert_eq!(bytes[3], 2);
    }

    #[test]
    fn test_message_names() {
        assert_eq!(message_name(BROADCAST_DATA), "broadcast-data");
        assert_eq!(message_name(0x01), "unknown");
    }
}
