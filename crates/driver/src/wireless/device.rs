//! Power meter device proxy
//!
//! Opens a transmit channel with the bicycle power sensor profile and, on
//! every transmit slot, broadcasts the latest power and cadence handed in by
//! the application.

use super::dispatch::DeviceProxy;
use common::transport::WirelessLink;
use protocol::messages::{
    CHANNEL_TYPE_MASTER, EVENT_CODE_OFFSET, EVENT_TX, assign_channel, broadcast_data,
    open_channel, set_channel_id, set_channel_period, set_channel_rf_freq,
};
use protocol::{Channel, Frame};
use std::io;
use tracing::{debug, info, trace, warn};

/// Bicycle power sensor device type
pub const DEVICE_TYPE_POWER: u8 = 0x0B;
/// Transmission type for an independent sensor
pub const TRANSMISSION_TYPE: u8 = 0x05;
/// 8182 / 32768 s, roughly 4 Hz
pub const POWER_CHANNEL_PERIOD: u16 = 8182;
/// 2457 MHz
pub const SPORT_RF_FREQUENCY: u8 = 57;
/// Standard power-only data page
pub const PAGE_POWER_ONLY: u8 = 0x10;

pub struct PowerMeterProxy {
    channel: Channel,
    network: u8,
    device_number: u16,
    power: u16,
    cadence: u8,
    event_count: u8,
    accumulated_power: u16,
    acks: u64,
}

impl PowerMeterProxy {
    pub fn new(channel: Channel, network: u8, device_number: u16) -> Self {
        Self {
            channel,
            network,
            device_number,
            power: 0,
            cadence: 0,
            event_count: 0,
            accumulated_power: 0,
            acks: 0,
        }
    }

    pub fn power(&self) -> u16 {
        self.power
    }

    pub fn cadence(&self) -> u8 {
        self.cadence
    }

    pub fn acks(&self) -> u64 {
        self.acks
    }

    /// Current power-only page
    pub fn power_page(&self) -> [u8; 8] {
        let [acc_lo, acc_hi] = self.accumulated_power.to_le_bytes();
        let [pow_lo, pow_hi] = self.power.to_le_bytes();
        [
            PAGE_POWER_ONLY,
            self.event_count,
            0xFF, // pedal balance not measured
            self.cadence,
            acc_lo,
            acc_hi,
            pow_lo,
            pow_hi,
        ]
    }

    fn broadcast_power(&mut self, link: &mut dyn WirelessLink) {
        self.event_count = self.event_count.wrapping_add(1);
        self.accumulated_power = self.accumulated_power.wrapping_add(self.power);

        let result = broadcast_data(self.channel.number(), &self.power_page())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
            .and_then(|bytes| link.write(&bytes));
        if let Err(e) = result {
            warn!("Power broadcast on {} failed: {}", self.channel, e);
        }
    }
}

impl DeviceProxy for PowerMeterProxy {
    fn configure_channel(&mut self, link: &mut dyn WirelessLink) -> io::Result<()> {
        let ch = self.channel.number();
        let messages = [
            assign_channel(ch, CHANNEL_TYPE_MASTER, self.network),
            set_channel_id(ch, self.device_number, DEVICE_TYPE_POWER, TRANSMISSION_TYPE),
            set_channel_period(ch, POWER_CHANNEL_PERIOD),
            set_channel_rf_freq(ch, SPORT_RF_FREQUENCY),
            open_channel(ch),
        ];
        for message in messages {
            let bytes = message.map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            link.write(&bytes)?;
        }
        info!(
            "Power meter on {} (device number {})",
            self.channel, self.device_number
        );
        Ok(())
    }

    fn on_channel_event(&mut self, frame: &Frame, link: &mut dyn WirelessLink) {
        match frame.payload_byte(EVENT_CODE_OFFSET) {
            Some(EVENT_TX) => self.broadcast_power(link),
            code => debug!("Power meter channel event {:?}", code),
        }
    }

    fn on_ack_data(&mut self, frame: &Frame, _link: &mut dyn WirelessLink) {
        self.acks += 1;
        debug!(
            "Power meter ack data: {:02x?}",
            frame.payload.get(1..).unwrap_or_default()
        );
    }

    fn set_current_power(&mut self, power: u16) {
        trace!("Power meter power {}", power);
        self.power = power;
    }

    fn set_current_cadence(&mut self, cadence: u8) {
        trace!("Power meter cadence {}", cadence);
        self.cadence = cadence;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::MockStick;
    use protocol::messages::{ACK_DATA, BROADCAST_DATA, CHANNEL_EVENT, OPEN_CHANNEL};

    fn proxy() -> PowerMeterProxy {
        PowerMeterProxy::new(Channel::new(1).unwrap(), 0, 12)
    }

    #[test]
    fn test_configure_channel_writes_setup_then_open() {
        let mut stick = MockStick::new();
        proxy().configure_channel(&mut stick).unwrap();

        let written = stick.written();
        assert_eq!(written.len(), 5);
        assert_eq!(written[4][2], OPEN_CHANNEL);
        assert!(written.iter().all(|m| m[3] == 1));
    }

    #[test]
    fn test_tx_event_broadcasts_latest_values() {
        let mut stick = MockStick::new();
        let mut pm = proxy();
        pm.set_current_power(250);
        pm.set_current_cadence(88);

        pm.on_channel_event(&Frame::new(CHANNEL_EVENT, vec![1, 1, EVENT_TX]), &mut stick);
        pm.on_channel_event(&Frame::new(CHANNEL_EVENT, vec![1, 1, EVENT_TX]), &mut stick);

        let written = stick.written();
        assert_eq!(written.len(), 2);
        let last = &written[1];
        assert_eq!(last[2], BROADCAST_DATA);
        // [sync, len, id, channel, page...]
        assert_eq!(
            &last[4..12],
            &[PAGE_POWER_ONLY, 2, 0xFF, 88, 0xF4, 0x01, 0xFA, 0x00]
        );
    }

    #[test]
    fn test_other_events_send_nothing() {
        let mut stick = MockStick::new();
        let mut pm = proxy();
        pm.on_channel_event(&Frame::new(CHANNEL_EVENT, vec![1, 1, 0x05]), &mut stick);
        pm.on_ack_data(&Frame::new(ACK_DATA, vec![1, 0xAA]), &mut stick);
        assert!(stick.written().is_empty());
        assert_eq!(pm.acks(), 1);
    }
}
