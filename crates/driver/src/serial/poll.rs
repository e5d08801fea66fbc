//! Poll cycle: power, pulse and cadence queries plus the load command

use super::reader::read_answer;
use super::supervisor::ErgometerDriver;
use common::ErgometerEvent;
use common::transport::{PortProvider, SerialLink, is_timeout};
use protocol::Command;
use protocol::ergometer::{parse_power, parse_u8_reading};
use std::sync::TryLockError;
use tracing::{debug, trace, warn};

/// Outcome of one command/reply exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply text, empty when the bike stayed silent
    pub text: String,
    /// True when the write or the read failed and the loss was reported
    pub lost: bool,
}

impl<P: PortProvider> ErgometerDriver<P> {
    /// Run one poll cycle
    ///
    /// Skipped outright if the previous cycle still holds the poll guard.
    /// A failed write reports the loss but the remaining queries of the
    /// cycle are still sent.
    pub fn request_all(&mut self) {
        let guard = std::sync::Arc::clone(&self.poll_guard);
        let _cycle = match guard.try_lock() {
            Ok(cycle) => cycle,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("Previous poll cycle still running, skipping tick");
                self.metrics.poll_skipped();
                return;
            }
        };

        let Some(mut link) = self.link.take() else {
            return;
        };

        let power = self.exchange(&mut link, Command::Power);
        self.emit(ErgometerEvent::Power(parse_power(&power.text)));

        let pulse = self.exchange(&mut link, Command::Pulse);
        self.emit(ErgometerEvent::Pulse(parse_u8_reading(&pulse.text)));

        let cadence = self.exchange(&mut link, Command::Pedal);
        self.emit(ErgometerEvent::Cadence(parse_u8_reading(&cadence.text)));

        self.apply_load(&mut link);

        self.link = Some(link);
    }

    /// Send the pending load if it changed and the bike accepts it
    fn apply_load(&mut self, link: &mut P::Link) {
        let pending = self.worker.session().pending_load();
        if pending == self.applied_load || !self.can_control_power {
            return;
        }

        let command = Command::SetPower(pending);
        debug!("Setting load: {}", command);
        if let Err(e) = link.write_all_timeout(&command.encode(), self.settings.write_timeout) {
            self.write_failed(&command, &e);
        }
        // Recorded whether or not the write went through
        self.applied_load = pending;

        if let Err(e) = link.discard_input() {
            trace!("Discarding load reply failed: {}", e);
        }
    }

    /// Flush stale input, send `command`, read its reply
    pub(super) fn exchange(&mut self, link: &mut P::Link, command: Command) -> Reply {
        if let Err(e) = link.discard_input() {
            trace!("Discarding stale input failed: {}", e);
        }

        let mut lost = false;
        if let Err(e) = link.write_all_timeout(&command.encode(), self.settings.write_timeout) {
            lost = true;
            self.write_failed(&command, &e);
        }

        let text = match read_answer(link, self.settings.read_timeout) {
            Ok(text) => text,
            Err(e) => {
                warn!("Reading reply to {:?} failed: {}", command.to_string(), e);
                lost = true;
                self.metrics.read_failure();
                self.connection_lost();
                String::new()
            }
        };
        trace!("{} -> {:?}", command, text);

        Reply { text, lost }
    }

    fn write_failed(&mut self, command: &Command, e: &std::io::Error) {
        if is_timeout(e) {
            self.metrics.write_timeout();
        }
        warn!("Failed to write {:?} to bike: {}", command.to_string(), e);
        self.connection_lost();
    }
}
