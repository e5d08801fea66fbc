//! Async channel bridges between the application runtime and the worker threads
//!
//! Each driver runs on its own blocking thread. The application side holds a
//! cheap-to-clone bridge for commands and events; the worker side holds the
//! other ends and never blocks on the application except when delivering an
//! event to a full queue.

use crate::session::ErgometerSession;
use async_channel::{Receiver, Sender, TryRecvError, bounded};
use std::sync::Arc;

/// Queue depth for commands and events
const CHANNEL_CAPACITY: usize = 256;

/// Events from the ergometer driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErgometerEvent {
    /// Connected (true) or lost (false)
    ConnectionStatus(bool),
    /// Watts
    Power(u16),
    /// Heart rate
    Pulse(u8),
    /// Pedal revolutions per minute
    Cadence(u8),
}

/// Commands from the application to the ergometer worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErgometerCommand {
    /// Re-arm the poll timer with a new interval
    SetPollInterval(u64),
    /// Stop the worker loop
    Shutdown,
}

/// Commands from the application to the wireless worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WirelessCommand {
    /// Latest power to hand to the device proxies
    SetCurrentPower(u16),
    /// Latest cadence to hand to the device proxies
    SetCurrentCadence(u8),
    /// Stop the worker loop
    Shutdown,
}

/// Application-side handle for the ergometer driver
#[derive(Clone)]
pub struct ErgometerBridge {
    session: Arc<ErgometerSession>,
    cmd_tx: Sender<ErgometerCommand>,
    event_rx: Receiver<ErgometerEvent>,
}

impl ErgometerBridge {
    /// Request a new target load; applied on the next poll cycle
    pub fn set_load(&self, load: u32) {
        self.session.set_pending_load(load);
    }

    /// Change the poll interval
    pub fn set_poll_interval(&self, interval_ms: u64) -> crate::Result<()> {
        if self.session.set_poll_interval_ms(interval_ms) {
            self.cmd_tx
                .try_send(ErgometerCommand::SetPollInterval(interval_ms))
                .map_err(|e| crate::Error::Channel(e.to_string()))?;
        }
        Ok(())
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.session.poll_interval_ms()
    }

    /// Set the preferred serial port; fails once the driver has started
    pub fn set_serial_port(&self, name: impl Into<String>) -> crate::Result<()> {
        self.session.set_port_name(name)
    }

    pub fn session(&self) -> &Arc<ErgometerSession> {
        &self.session
    }

    /// Send a command to the worker
    pub async fn send_command(&self, cmd: ErgometerCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Ask the worker to stop
    pub async fn shutdown(&self) -> crate::Result<()> {
        self.send_command(ErgometerCommand::Shutdown).await
    }

    /// Receive the next event
    pub async fn recv_event(&self) -> crate::Result<ErgometerEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Take an event if one is queued
    pub fn try_recv_event(&self) -> Option<ErgometerEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Drain every queued event
    pub fn drain_events(&self) -> Vec<ErgometerEvent> {
        std::iter::from_fn(|| self.try_recv_event()).collect()
    }
}

/// Worker-side handle for the ergometer driver
pub struct ErgometerWorker {
    session: Arc<ErgometerSession>,
    cmd_rx: Receiver<ErgometerCommand>,
    event_tx: Sender<ErgometerEvent>,
}

impl ErgometerWorker {
    pub fn session(&self) -> &Arc<ErgometerSession> {
        &self.session
    }

    /// Take a command without blocking
    ///
    /// A closed command channel reads as `Shutdown`: nobody is left to
    /// consume events.
    pub fn try_recv_command(&self) -> Option<ErgometerCommand> {
        match self.cmd_rx.try_recv() {
            Ok(cmd) => Some(cmd),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(ErgometerCommand::Shutdown),
        }
    }

    /// Deliver an event (blocking while the queue is full)
    pub fn send_event(&self, event: ErgometerEvent) -> crate::Result<()> {
        self.event_tx
            .send_blocking(event)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Create the ergometer bridge
///
/// Returns (ErgometerBridge for the application, ErgometerWorker for the worker thread)
pub fn create_ergometer_bridge(session: Arc<ErgometerSession>) -> (ErgometerBridge, ErgometerWorker) {
    let (cmd_tx, cmd_rx) = bounded(CHANNEL_CAPACITY);
    let (event_tx, event_rx) = bounded(CHANNEL_CAPACITY);

    (
        ErgometerBridge {
            session: Arc::clone(&session),
            cmd_tx,
            event_rx,
        },
        ErgometerWorker {
            session,
            cmd_rx,
            event_tx,
        },
    )
}

/// Application-side handle for the wireless driver
#[derive(Clone)]
pub struct WirelessBridge {
    cmd_tx: Sender<WirelessCommand>,
}

impl WirelessBridge {
    /// Send a command to the worker
    pub async fn send_command(&self, cmd: WirelessCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    pub async fn set_current_power(&self, power: u16) -> crate::Result<()> {
        self.send_command(WirelessCommand::SetCurrentPower(power)).await
    }

    pub async fn set_current_cadence(&self, cadence: u8) -> crate::Result<()> {
        self.send_command(WirelessCommand::SetCurrentCadence(cadence))
            .await
    }

    /// Ask the worker to stop
    pub async fn shutdown(&self) -> crate::Result<()> {
        self.send_command(WirelessCommand::Shutdown).await
    }
}

/// Worker-side handle for the wireless driver
pub struct WirelessWorker {
    cmd_rx: Receiver<WirelessCommand>,
}

impl WirelessWorker {
    /// Take a command without blocking; a closed channel reads as `Shutdown`
    pub fn try_recv_command(&self) -> Option<WirelessCommand> {
        match self.cmd_rx.try_recv() {
            Ok(cmd) => Some(cmd),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(WirelessCommand::Shutdown),
        }
    }
}

/// Create the wireless bridge
pub fn create_wireless_bridge() -> (WirelessBridge, WirelessWorker) {
    let (cmd_tx, cmd_rx) = bounded(CHANNEL_CAPACITY);
    (WirelessBridge { cmd_tx }, WirelessWorker { cmd_rx })
}
