//! Ergometer connection supervisor and worker loop
//!
//! The worker thread owns the serial link. A single loop drives two timers:
//! the one-shot startup timer runs discovery, and the repeating poll timer
//! runs a poll cycle (see `poll.rs`). Any write failure after discovery is
//! treated as losing the bike, which re-arms the startup timer.

use super::discovery::{DiscoverySettings, discover};
use super::port::configure_port;
use super::timer::{OneShotTimer, RepeatingTimer, next_wait};
use common::transport::{PortProvider, SerialLink};
use common::{ErgometerCommand, ErgometerEvent, ErgometerWorker, LinkMetrics};
use protocol::{Command, ModelFamily};
use std::io;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Longest the loop sleeps before looking at commands again
const LOOP_TICK: Duration = Duration::from_millis(50);

/// Supervisor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Discovering,
    Opening,
    Identifying,
    Polling,
}

/// Worker settings, normally built from the config file
#[derive(Debug, Clone)]
pub struct ErgometerSettings {
    /// Delay before the first (and every repeated) discovery
    pub startup_delay: Duration,
    pub write_timeout: Duration,
    pub read_timeout: Duration,
    /// Load queued when a bike with load control is identified
    pub default_load: u32,
    pub discovery: DiscoverySettings,
}

impl Default for ErgometerSettings {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_millis(200),
            write_timeout: Duration::from_millis(500),
            read_timeout: Duration::from_millis(500),
            default_load: 100,
            discovery: DiscoverySettings::default(),
        }
    }
}

/// Ergometer driver state, owned by the worker thread
pub struct ErgometerDriver<P: PortProvider> {
    pub(super) ports: P,
    pub(super) link: Option<P::Link>,
    pub(super) worker: ErgometerWorker,
    pub(super) settings: ErgometerSettings,
    pub(super) metrics: Arc<LinkMetrics>,
    pub(super) state: ConnectionState,
    pub(super) startup_timer: OneShotTimer,
    pub(super) poll_timer: RepeatingTimer,
    pub(super) poll_guard: Arc<Mutex<()>>,
    pub(super) model: Option<ModelFamily>,
    pub(super) can_control_power: bool,
    pub(super) applied_load: u32,
    pub(super) connected: bool,
}

impl<P: PortProvider> ErgometerDriver<P> {
    pub fn new(
        ports: P,
        worker: ErgometerWorker,
        settings: ErgometerSettings,
        metrics: Arc<LinkMetrics>,
    ) -> Self {
        let poll_interval = worker.session().poll_interval();
        Self {
            ports,
            link: None,
            worker,
            settings,
            metrics,
            state: ConnectionState::Discovering,
            startup_timer: OneShotTimer::new(),
            poll_timer: RepeatingTimer::new(poll_interval),
            poll_guard: Arc::new(Mutex::new(())),
            model: None,
            can_control_power: false,
            applied_load: 0,
            connected: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Model family of the connected bike
    pub fn model(&self) -> Option<ModelFamily> {
        self.model
    }

    pub fn can_control_power(&self) -> bool {
        self.can_control_power
    }

    /// Load most recently sent (or attempted) to the bike
    pub fn applied_load(&self) -> u32 {
        self.applied_load
    }

    /// True while rediscovery is pending
    pub fn rediscovery_armed(&self) -> bool {
        self.startup_timer.is_armed()
    }

    pub fn is_polling(&self) -> bool {
        self.poll_timer.is_running()
    }

    /// Guard held for the duration of a poll cycle
    pub fn poll_guard(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.poll_guard)
    }

    /// Run the worker loop until shutdown
    pub fn run(mut self) -> common::Result<()> {
        if !self.worker.session().mark_started() {
            return Err(common::Error::AlreadyRunning);
        }
        info!("Ergometer worker started");

        self.startup_timer
            .arm(Instant::now(), self.settings.startup_delay);

        loop {
            while let Some(cmd) = self.worker.try_recv_command() {
                match cmd {
                    ErgometerCommand::Shutdown => {
                        info!("Ergometer worker shutting down");
                        return Ok(());
                    }
                    ErgometerCommand::SetPollInterval(ms) => {
                        debug!("Poll interval set to {} ms", ms);
                        self.poll_timer
                            .set_interval(Instant::now(), Duration::from_millis(ms));
                    }
                }
            }

            if self.startup_timer.fire(Instant::now()) {
                match self.connect() {
                    Ok(()) => {}
                    Err(common::Error::Cancelled) => {
                        info!("Ergometer worker shutting down during discovery");
                        return Ok(());
                    }
                    Err(e) => {
                        error!("Ergometer worker aborted: {}", e);
                        return Err(e);
                    }
                }
            }

            if self.poll_timer.fire(Instant::now()) {
                self.request_all();
            }

            let wait = next_wait(
                Instant::now(),
                &[self.startup_timer.deadline(), self.poll_timer.deadline()],
                LOOP_TICK,
            );
            std::thread::sleep(wait);
        }
    }

    /// Discover, open and identify the bike, then start polling
    ///
    /// Failures after discovery leave the driver in `Discovering` with the
    /// startup timer armed; only cancellation is returned as an error.
    pub fn connect(&mut self) -> common::Result<()> {
        self.state = ConnectionState::Discovering;
        self.poll_timer.stop();
        self.link = None;

        let mut discovery = self.settings.discovery.clone();
        if let Some(port) = self.worker.session().port_name() {
            discovery.preferred = Some(port);
        }

        let worker = &self.worker;
        let name = discover(&mut self.ports, &discovery, &self.metrics, || {
            matches!(worker.try_recv_command(), Some(ErgometerCommand::Shutdown))
        })?;
        self.worker.session().record_port_name(&name);

        self.state = ConnectionState::Opening;
        let mut link = match self.open_link(&name) {
            Ok(link) => link,
            Err(e) => {
                warn!("Error opening serial port {}: {}", name, e);
                self.connection_lost();
                return Ok(());
            }
        };

        self.state = ConnectionState::Identifying;
        let identified = self.identify_model(&mut link);
        self.link = Some(link);
        if !identified || self.state != ConnectionState::Identifying {
            return Ok(());
        }

        self.poll_timer
            .set_interval(Instant::now(), self.worker.session().poll_interval());
        self.poll_timer.start(Instant::now());
        self.state = ConnectionState::Polling;
        self.set_connected(true);
        Ok(())
    }

    fn open_link(&mut self, name: &str) -> io::Result<P::Link> {
        let mut link = self.ports.open(name)?;
        configure_port(&mut link, self.settings.write_timeout)?;
        link.discard_input()?;
        Ok(link)
    }

    /// Ask the bike what it is and whether it takes load commands
    ///
    /// Returns false if an exchange failed, in which case the loss has
    /// already been handled.
    fn identify_model(&mut self, link: &mut P::Link) -> bool {
        let id = self.exchange(link, Command::Id);
        if id.lost {
            return false;
        }
        let family = ModelFamily::classify(&id.text);

        let mut servo = None;
        if family.needs_servo_query() {
            let reply = self.exchange(link, Command::Servo);
            if reply.lost {
                return false;
            }
            servo = Some(reply.text);
        }

        info!("Connected to bike: {:?} ({})", id.text.trim(), family);
        if let Some(mode) = &servo {
            info!("Servo mode: {:?}", mode.trim());
        }

        self.model = Some(family);
        self.can_control_power = family.can_control_power(servo.as_deref());
        if self.can_control_power {
            self.worker
                .session()
                .set_pending_load(self.settings.default_load);
        }
        true
    }

    /// Treat the bike as gone and schedule rediscovery
    ///
    /// Repeated failures before rediscovery runs are folded into one loss.
    /// A loss while identifying or polling is always reported, even if the
    /// bike was never reported connected; an open failure is not.
    pub(super) fn connection_lost(&mut self) {
        if self.state == ConnectionState::Discovering && self.startup_timer.is_armed() {
            return;
        }
        warn!("Lost connection to bike");
        let talking = matches!(
            self.state,
            ConnectionState::Identifying | ConnectionState::Polling
        );
        self.metrics.connection_lost();
        self.state = ConnectionState::Discovering;
        self.poll_timer.stop();
        self.startup_timer
            .arm(Instant::now(), self.settings.startup_delay);
        if talking {
            self.connected = false;
            self.emit(ErgometerEvent::ConnectionStatus(false));
        } else {
            self.set_connected(false);
        }
    }

    /// Report connection status on transitions only
    fn set_connected(&mut self, connected: bool) {
        if self.connected == connected {
            return;
        }
        self.connected = connected;
        self.emit(ErgometerEvent::ConnectionStatus(connected));
    }

    pub(super) fn emit(&self, event: ErgometerEvent) {
        if let Err(e) = self.worker.send_event(event) {
            debug!("Dropping {:?}: {}", event, e);
        }
    }
}

/// Spawn the ergometer worker thread
pub fn spawn_ergometer_worker<P>(
    ports: P,
    worker: ErgometerWorker,
    settings: ErgometerSettings,
    metrics: Arc<LinkMetrics>,
) -> io::Result<JoinHandle<common::Result<()>>>
where
    P: PortProvider + 'static,
{
    std::thread::Builder::new()
        .name("ergo-worker".to_string())
        .spawn(move || ErgometerDriver::new(ports, worker, settings, metrics).run())
}
