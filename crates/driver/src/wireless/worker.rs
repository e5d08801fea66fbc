//! Wireless worker thread
//!
//! Owns the stick. Startup sends the network key and lets every registered
//! proxy configure its channel; then the thread reads one byte at a time,
//! feeding the frame assembler and routing each validated frame before the
//! next byte is read.

use super::dispatch::{ChannelTable, Router};
use common::transport::WirelessLink;
use common::{LinkMetrics, WirelessCommand, WirelessWorker};
use protocol::FrameAssembler;
use protocol::messages::{NETWORK_KEY, set_network_key};
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Pause after the network key before channels are configured
const NETWORK_KEY_SETTLE: Duration = Duration::from_millis(100);

/// Worker settings, normally built from the config file
#[derive(Debug, Clone)]
pub struct WirelessSettings {
    pub network: u8,
    /// Sleep when the stick has nothing to read
    pub idle_sleep: Duration,
    /// Consecutive failed reads after which the stick is considered gone
    pub max_read_failures: u32,
}

impl Default for WirelessSettings {
    fn default() -> Self {
        Self {
            network: 0,
            idle_sleep: Duration::from_millis(5),
            max_read_failures: 200,
        }
    }
}

pub struct WirelessWorkerThread<L: WirelessLink> {
    link: L,
    worker: WirelessWorker,
    router: Router,
    assembler: FrameAssembler,
    settings: WirelessSettings,
    metrics: Arc<LinkMetrics>,
}

impl<L: WirelessLink> WirelessWorkerThread<L> {
    pub fn new(
        link: L,
        worker: WirelessWorker,
        table: ChannelTable,
        settings: WirelessSettings,
        metrics: Arc<LinkMetrics>,
    ) -> Self {
        Self {
            link,
            worker,
            router: Router::new(table, Arc::clone(&metrics)),
            assembler: FrameAssembler::new(),
            settings,
            metrics,
        }
    }

    /// Network key, settle delay, channel setup
    pub fn start(&mut self) -> common::Result<()> {
        let key = set_network_key(self.settings.network, &NETWORK_KEY)
            .map_err(|e| common::Error::Usb(e.to_string()))?;
        self.link.write(&key)?;
        debug!("Network key set for network {}", self.settings.network);

        std::thread::sleep(NETWORK_KEY_SETTLE);

        for proxy in self.router.table_mut().proxies_mut() {
            proxy.configure_channel(&mut self.link)?;
        }
        Ok(())
    }

    /// Apply queued commands; false once shutdown was requested
    fn handle_commands(&mut self) -> bool {
        while let Some(cmd) = self.worker.try_recv_command() {
            match cmd {
                WirelessCommand::Shutdown => return false,
                WirelessCommand::SetCurrentPower(power) => {
                    for proxy in self.router.table_mut().proxies_mut() {
                        proxy.set_current_power(power);
                    }
                }
                WirelessCommand::SetCurrentCadence(cadence) => {
                    for proxy in self.router.table_mut().proxies_mut() {
                        proxy.set_current_cadence(cadence);
                    }
                }
            }
        }
        true
    }

    /// Read and route whatever is available; false if nothing was read
    pub fn poll_once(&mut self) -> io::Result<bool> {
        let mut byte = [0u8; 1];
        if self.link.read(&mut byte)? == 0 {
            return Ok(false);
        }

        let Self {
            link,
            router,
            assembler,
            ..
        } = self;
        assembler.push(byte[0], &mut |frame| {
            router.route(&frame, link);
        });
        self.metrics.record_assembler(self.assembler.stats());
        Ok(true)
    }

    /// Run until shutdown
    pub fn run(mut self) -> common::Result<()> {
        info!("Wireless worker started");
        self.start()?;

        let mut failures = 0u32;
        while self.handle_commands() {
            match self.poll_once() {
                Ok(true) => failures = 0,
                Ok(false) => {
                    failures = 0;
                    std::thread::sleep(self.settings.idle_sleep);
                }
                Err(e) => {
                    failures += 1;
                    if failures == 1 {
                        warn!("Stick read failed: {}", e);
                    }
                    if failures >= self.settings.max_read_failures {
                        error!(
                            "Stick failed {} reads in a row, stopping wireless worker: {}",
                            failures, e
                        );
                        return Err(common::Error::Usb(format!("stick stopped responding: {}", e)));
                    }
                    std::thread::sleep(self.settings.idle_sleep);
                }
            }
        }

        info!("Wireless worker stopped");
        Ok(())
    }
}

/// Spawn the wireless worker thread
///
/// `open` runs on the new thread so the stick handle never leaves it.
pub fn spawn_wireless_worker<L, F>(
    open: F,
    worker: WirelessWorker,
    table: ChannelTable,
    settings: WirelessSettings,
    metrics: Arc<LinkMetrics>,
) -> io::Result<JoinHandle<common::Result<()>>>
where
    L: WirelessLink,
    F: FnOnce() -> common::Result<L> + Send + 'static,
{
    std::thread::Builder::new()
        .name("ant-worker".to_string())
        .spawn(move || {
            let link = open().inspect_err(|e| error!("Cannot open wireless stick: {}", e))?;
            WirelessWorkerThread::new(link, worker, table, settings, metrics).run()
        })
}
