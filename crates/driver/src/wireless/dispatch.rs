//! Message router and per-channel dispatch
//!
//! Validated frames are classified by message id. Frames that belong to a
//! channel are handed to the device proxy registered for that channel;
//! anything unexpected is dropped without error.

use common::LinkMetrics;
use common::transport::WirelessLink;
use protocol::messages::message_name;
use protocol::{CHANNEL_COUNT, Channel, ChannelMessage, Frame, Route, classify};
use std::io;
use std::sync::Arc;
use tracing::{debug, trace};

/// Handler for the traffic of one channel
///
/// The worker calls these synchronously from its read loop, so a slow
/// handler stalls input.
pub trait DeviceProxy: Send {
    /// Send the channel setup messages; called once at startup
    fn configure_channel(&mut self, _link: &mut dyn WirelessLink) -> io::Result<()> {
        Ok(())
    }

    /// Channel event (response or RF event)
    fn on_channel_event(&mut self, frame: &Frame, link: &mut dyn WirelessLink);

    /// Acknowledged data
    fn on_ack_data(&mut self, frame: &Frame, link: &mut dyn WirelessLink);

    fn on_broadcast_data(&mut self, _frame: &Frame) {}

    fn on_channel_id(&mut self, _frame: &Frame) {}

    fn on_burst_data(&mut self, _frame: &Frame) {}

    fn set_current_power(&mut self, power: u16);

    fn set_current_cadence(&mut self, cadence: u8);
}

/// Fixed table of proxies indexed by channel number
pub struct ChannelTable {
    slots: [Option<Box<dyn DeviceProxy>>; CHANNEL_COUNT],
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelTable {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Bind `proxy` to `channel`, returning any proxy it replaces
    pub fn register(
        &mut self,
        channel: Channel,
        proxy: Box<dyn DeviceProxy>,
    ) -> Option<Box<dyn DeviceProxy>> {
        self.slots[channel.index()].replace(proxy)
    }

    pub fn get_mut(&mut self, channel: Channel) -> Option<&mut (dyn DeviceProxy + 'static)> {
        self.slots[channel.index()].as_deref_mut()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every registered proxy, in channel order
    pub fn proxies_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn DeviceProxy>> {
        self.slots.iter_mut().flatten()
    }
}

/// Routes validated frames to channel proxies
pub struct Router {
    table: ChannelTable,
    metrics: Arc<LinkMetrics>,
}

impl Router {
    pub fn new(table: ChannelTable, metrics: Arc<LinkMetrics>) -> Self {
        Self { table, metrics }
    }

    pub fn table_mut(&mut self) -> &mut ChannelTable {
        &mut self.table
    }

    /// Classify and deliver one frame
    pub fn route(&mut self, frame: &Frame, link: &mut dyn WirelessLink) -> Route {
        let route = classify(frame);
        match route {
            Route::Channel => {
                if !self.handle_channel_event(frame, link) {
                    self.metrics.frame_unrouted();
                }
            }
            Route::Accepted => debug!("Received {}", message_name(frame.message_id)),
            Route::Ignored => trace!(
                "Ignoring {} ({:#04x})",
                message_name(frame.message_id),
                frame.message_id
            ),
        }
        route
    }

    /// Hand a channel frame to its proxy; false if nothing took it
    fn handle_channel_event(&mut self, frame: &Frame, link: &mut dyn WirelessLink) -> bool {
        let Some(channel) = frame.channel() else {
            return false;
        };
        let Some(proxy) = self.table.get_mut(channel) else {
            trace!("No device on {}", channel);
            return false;
        };

        match ChannelMessage::of(frame) {
            ChannelMessage::Event => proxy.on_channel_event(frame, link),
            ChannelMessage::AckData => proxy.on_ack_data(frame, link),
            ChannelMessage::BroadcastData => {
                debug!("Channel broadcast data on {}", channel);
                proxy.on_broadcast_data(frame);
            }
            ChannelMessage::ChannelId => {
                debug!("Channel id on {}", channel);
                proxy.on_channel_id(frame);
            }
            ChannelMessage::BurstData => {
                debug!("Channel burst data on {}", channel);
                proxy.on_burst_data(frame);
            }
            ChannelMessage::Unhandled => return false,
        }
        true
    }
}
