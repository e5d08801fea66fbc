//! Finding the serial port a bike is attached to
//!
//! Each candidate is opened, primed and asked for its id. A reply naming a
//! known model family selects the port; the probe link is closed either way
//! and the supervisor opens the selected port again.

use super::port::configure_port;
use super::reader::read_answer;
use common::LinkMetrics;
use common::transport::{PortProvider, SerialLink};
use protocol::Command;
use protocol::ergometer::is_known_signature;
use std::io;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timings and port filters for a discovery run
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Tried first when present
    pub preferred: Option<String>,
    /// Never probed
    pub excluded: Vec<String>,
    pub probe_write_timeout: Duration,
    pub probe_read_timeout: Duration,
    /// Pause between unsuccessful sweeps
    pub sweep_delay: Duration,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            preferred: None,
            excluded: Vec::new(),
            probe_write_timeout: Duration::from_millis(2000),
            probe_read_timeout: Duration::from_millis(1000),
            sweep_delay: Duration::from_millis(500),
        }
    }
}

/// Order in which one sweep probes the visible ports
pub fn candidate_order(
    visible: Vec<String>,
    preferred: Option<&str>,
    excluded: &[String],
) -> Vec<String> {
    let mut candidates: Vec<String> = visible
        .into_iter()
        .filter(|name| !excluded.contains(name))
        .collect();

    if let Some(preferred) = preferred {
        if let Some(pos) = candidates.iter().position(|name| name == preferred) {
            let name = candidates.remove(pos);
            candidates.insert(0, name);
        }
    }

    candidates
}

/// Probe one port; true if a known bike answered
pub fn probe_port<P>(ports: &mut P, name: &str, settings: &DiscoverySettings) -> io::Result<bool>
where
    P: PortProvider,
{
    let mut link = ports.open(name)?;
    configure_port(&mut link, settings.probe_write_timeout)?;
    link.discard_input()?;

    // A stalled write still gets its read window
    if let Err(e) = link.write_all_timeout(&Command::Id.encode(), settings.probe_write_timeout) {
        debug!("Id probe write on {} failed: {}", name, e);
    }
    let id = read_answer(&mut link, settings.probe_read_timeout)?;
    debug!("Port {} answered {:?}", name, id);

    Ok(is_known_signature(&id))
}

/// Sweep until a bike is found
///
/// `cancelled` is polled before every candidate and before every pause
/// between sweeps; when it returns true the search ends with
/// [`common::Error::Cancelled`].
pub fn discover<P, C>(
    ports: &mut P,
    settings: &DiscoverySettings,
    metrics: &LinkMetrics,
    mut cancelled: C,
) -> common::Result<String>
where
    P: PortProvider,
    C: FnMut() -> bool,
{
    loop {
        metrics.discovery_sweep();
        debug!("Refreshing list of serial ports");

        let visible = match ports.available_ports() {
            Ok(visible) => visible,
            Err(e) => {
                warn!("Failed to enumerate serial ports: {}", e);
                Vec::new()
            }
        };

        for name in candidate_order(visible, settings.preferred.as_deref(), &settings.excluded) {
            if cancelled() {
                return Err(common::Error::Cancelled);
            }

            debug!("Looking for a bike on {}", name);
            match probe_port(ports, &name, settings) {
                Ok(true) => {
                    info!("Found bike on {}", name);
                    return Ok(name);
                }
                Ok(false) => {}
                Err(e) => debug!("Probe of {} failed: {}", name, e),
            }
        }

        if cancelled() {
            return Err(common::Error::Cancelled);
        }
        std::thread::sleep(settings.sweep_delay);
    }
}
