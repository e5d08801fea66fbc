//! Ergometer Driver Tests
//!
//! Drives the supervisor and poll cycle against scripted serial ports.
//!
//! # Test Scenarios
//! - Discovery picks the port whose bike answers with a known id
//! - Identification and load control per model family
//! - Poll cycle behaviour on write and read failures
//! - Load command bookkeeping
//! - Worker thread lifecycle
//!
//! Run with: `cargo test -p driver --test ergometer_tests`

use common::test_utils::{DEFAULT_TEST_TIMEOUT, MockPorts, MockSerialDevice, with_timeout};
use common::{
    Error, ErgometerBridge, ErgometerEvent, ErgometerSession, LinkMetrics, create_ergometer_bridge,
};
use driver::serial::{
    ConnectionState, DiscoverySettings, ErgometerDriver, ErgometerSettings, discover,
    spawn_ergometer_worker,
};
use protocol::ModelFamily;
use std::sync::Arc;
use std::time::Duration;

const FAST: Duration = Duration::from_millis(1);

fn fast_settings() -> ErgometerSettings {
    ErgometerSettings {
        startup_delay: FAST,
        write_timeout: FAST,
        read_timeout: FAST,
        default_load: 100,
        discovery: DiscoverySettings {
            preferred: None,
            excluded: Vec::new(),
            probe_write_timeout: FAST,
            probe_read_timeout: FAST,
            sweep_delay: FAST,
        },
    }
}

fn driver_for(
    ports: MockPorts,
) -> (
    ErgometerDriver<MockPorts>,
    ErgometerBridge,
    Arc<LinkMetrics>,
) {
    let session = Arc::new(ErgometerSession::default());
    let (bridge, worker) = create_ergometer_bridge(session);
    let metrics = Arc::new(LinkMetrics::new());
    let driver = ErgometerDriver::new(ports, worker, fast_settings(), Arc::clone(&metrics));
    (driver, bridge, metrics)
}

/// Driver already polling an "LC7" bike, with startup events drained
fn polling_lc() -> (
    ErgometerDriver<MockPorts>,
    ErgometerBridge,
    Arc<LinkMetrics>,
    MockSerialDevice,
) {
    let bike = MockSerialDevice::ergometer("LC7");
    let (mut driver, bridge, metrics) =
        driver_for(MockPorts::new().with_port("/dev/ttyUSB0", bike.clone()));
    driver.connect().unwrap();
    assert_eq!(driver.state(), ConnectionState::Polling);
    bridge.drain_events();
    bike.clear_commands();
    (driver, bridge, metrics, bike)
}

fn load_commands(bike: &MockSerialDevice) -> Vec<String> {
    bike.commands()
        .into_iter()
        .filter(|c| c.starts_with("power "))
        .collect()
}

fn lost_reports(events: &[ErgometerEvent]) -> usize {
    events
        .iter()
        .filter(|e| **e == ErgometerEvent::ConnectionStatus(false))
        .count()
}

// ============================================================================
// Discovery
// ============================================================================

#[test]
fn test_discovery_selects_the_lc_port() {
    let silent = MockSerialDevice::new();
    let other = MockSerialDevice::ergometer("XR-200");
    let bike = MockSerialDevice::ergometer("LC7");
    let mut ports = MockPorts::new()
        .with_port("/dev/ttyS0", silent.clone())
        .with_port("/dev/ttyUSB0", other.clone())
        .with_port("/dev/ttyUSB1", bike.clone());
    let metrics = LinkMetrics::new();

    let found = discover(&mut ports, &fast_settings().discovery, &metrics, || false).unwrap();

    assert_eq!(found, "/dev/ttyUSB1");
    assert_eq!(silent.open_count(), 1);
    assert_eq!(other.open_count(), 1);
    assert_eq!(bike.open_count(), 1);
    assert_eq!(metrics.snapshot().discovery_sweeps, 1);
}

#[test]
fn test_discovery_probe_primes_and_asks_for_id() {
    let bike = MockSerialDevice::ergometer("lc 4");
    let mut ports = MockPorts::new().with_port("a", bike.clone());

    discover(&mut ports, &fast_settings().discovery, &LinkMetrics::new(), || false).unwrap();

    assert_eq!(bike.blank_lines(), 1);
    assert_eq!(bike.commands(), vec!["id"]);
}

#[test]
fn test_discovery_skips_excluded_and_prefers_configured_port() {
    let reserved = MockSerialDevice::ergometer("LC7");
    let first = MockSerialDevice::ergometer("LC7");
    let second = MockSerialDevice::ergometer("NOVO");
    let mut ports = MockPorts::new()
        .with_port("/dev/ttyAMA0", reserved.clone())
        .with_port("/dev/ttyUSB0", first.clone())
        .with_port("/dev/ttyUSB1", second.clone());

    let mut settings = fast_settings().discovery;
    settings.excluded = vec!["/dev/ttyAMA0".to_string()];
    settings.preferred = Some("/dev/ttyUSB1".to_string());

    let found = discover(&mut ports, &settings, &LinkMetrics::new(), || false).unwrap();

    assert_eq!(found, "/dev/ttyUSB1");
    assert_eq!(reserved.open_count(), 0);
    assert_eq!(first.open_count(), 0);
}

#[test]
fn test_discovery_keeps_sweeping_until_cancelled() {
    let silent = MockSerialDevice::new();
    let mut ports = MockPorts::new().with_port("a", silent.clone());
    let metrics = LinkMetrics::new();

    let mut checks = 0;
    let result = discover(&mut ports, &fast_settings().discovery, &metrics, || {
        checks += 1;
        checks > 6
    });

    assert!(matches!(result, Err(Error::Cancelled)));
    // One check before the candidate and one before the pause, per sweep
    assert_eq!(metrics.snapshot().discovery_sweeps, 4);
    assert_eq!(silent.open_count(), 3);
}

// ============================================================================
// Identification
// ============================================================================

#[test]
fn test_connect_lc_enables_load_control() {
    let bike = MockSerialDevice::ergometer("LC7");
    let (mut driver, bridge, _) = driver_for(MockPorts::new().with_port("/dev/ttyUSB3", bike));

    driver.connect().unwrap();

    assert_eq!(driver.state(), ConnectionState::Polling);
    assert_eq!(driver.model(), Some(ModelFamily::Lc));
    assert!(driver.can_control_power());
    assert!(driver.is_polling());
    assert_eq!(bridge.session().pending_load(), 100);
    assert_eq!(bridge.session().port_name().as_deref(), Some("/dev/ttyUSB3"));
    assert_eq!(
        bridge.drain_events(),
        vec![ErgometerEvent::ConnectionStatus(true)]
    );
}

#[test]
fn test_novo_manual_servo_disables_load_control() {
    let bike = MockSerialDevice::ergometer("Novo 1").with_reply("servo", "MANUAL");
    let (mut driver, bridge, _) = driver_for(MockPorts::new().with_port("p", bike.clone()));

    driver.connect().unwrap();

    assert_eq!(driver.model(), Some(ModelFamily::Novo));
    assert!(!driver.can_control_power());
    assert_eq!(bridge.session().pending_load(), 0);
    assert!(bike.commands().contains(&"servo".to_string()));

    bridge.set_load(200);
    driver.request_all();
    assert!(load_commands(&bike).is_empty());
}

#[test]
fn test_novo_automatic_servo_enables_load_control() {
    let bike = MockSerialDevice::ergometer("novo").with_reply("servo", "auto");
    let (mut driver, bridge, _) = driver_for(MockPorts::new().with_port("p", bike));

    driver.connect().unwrap();

    assert!(driver.can_control_power());
    assert_eq!(bridge.session().pending_load(), 100);
}

#[test]
fn test_lt_has_no_servo_query_and_no_load_control() {
    let bike = MockSerialDevice::ergometer("LT2");
    let (mut driver, _bridge, _) = driver_for(MockPorts::new().with_port("p", bike.clone()));

    driver.connect().unwrap();

    assert_eq!(driver.model(), Some(ModelFamily::Lt));
    assert!(!driver.can_control_power());
    assert!(!bike.commands().contains(&"servo".to_string()));
}

#[test]
fn test_identification_write_failure_rediscovers() {
    let bike = MockSerialDevice::ergometer("NOVO").with_reply("servo", "auto");
    bike.fail_writes_of("servo", 1);
    let (mut driver, bridge, metrics) = driver_for(MockPorts::new().with_port("p", bike));

    driver.connect().unwrap();

    assert_eq!(driver.state(), ConnectionState::Discovering);
    assert!(driver.rediscovery_armed());
    assert!(!driver.is_polling());
    assert_eq!(metrics.snapshot().connection_losses, 1);
    assert_eq!(
        bridge.drain_events(),
        vec![ErgometerEvent::ConnectionStatus(false)]
    );
}

#[test]
fn test_identification_read_error_never_reports_connected() {
    let bike = MockSerialDevice::ergometer("LC7");
    // First open is the discovery probe, second the identifying open
    bike.fail_reads_on_open(2, 1);
    let (mut driver, bridge, metrics) = driver_for(MockPorts::new().with_port("p", bike.clone()));

    driver.connect().unwrap();

    assert_eq!(bike.open_count(), 2);
    assert_eq!(driver.state(), ConnectionState::Discovering);
    assert!(driver.rediscovery_armed());
    assert!(!driver.is_polling());
    assert_eq!(driver.model(), None);
    assert_eq!(
        bridge.drain_events(),
        vec![ErgometerEvent::ConnectionStatus(false)]
    );
    let snap = metrics.snapshot();
    assert_eq!(snap.read_failures, 1);
    assert_eq!(snap.connection_losses, 1);

    driver.connect().unwrap();
    assert_eq!(driver.state(), ConnectionState::Polling);
    assert_eq!(
        bridge.drain_events(),
        vec![ErgometerEvent::ConnectionStatus(true)]
    );
}

#[test]
fn test_open_failure_returns_to_discovery() {
    let bike = MockSerialDevice::ergometer("LC7");
    bike.set_open_limit(1);
    let (mut driver, bridge, metrics) = driver_for(MockPorts::new().with_port("p", bike.clone()));

    driver.connect().unwrap();

    assert_eq!(bike.open_count(), 1);
    assert_eq!(driver.state(), ConnectionState::Discovering);
    assert!(driver.rediscovery_armed());
    assert_eq!(metrics.snapshot().connection_losses, 1);
    assert!(bridge.drain_events().is_empty());
}

// ============================================================================
// Poll cycle
// ============================================================================

#[test]
fn test_poll_cycle_order_and_readings() {
    let (mut driver, bridge, _, bike) = polling_lc();
    bike.set_reply("power", "215");
    bike.set_reply("pulse", "131");
    bike.set_reply("pedal", "87");

    driver.request_all();

    assert_eq!(bike.commands(), vec!["power", "pulse", "pedal", "power 100"]);
    assert_eq!(
        bridge.drain_events(),
        vec![
            ErgometerEvent::Power(215),
            ErgometerEvent::Pulse(131),
            ErgometerEvent::Cadence(87),
        ]
    );
}

#[test]
fn test_unparseable_and_oversized_readings() {
    let (mut driver, bridge, _, bike) = polling_lc();
    bike.set_reply("power", "abc");
    bike.set_reply("pulse", "300");
    bike.set_reply("pedal", " 42 ");

    driver.request_all();

    assert_eq!(
        bridge.drain_events(),
        vec![
            ErgometerEvent::Power(0),
            ErgometerEvent::Pulse(255),
            ErgometerEvent::Cadence(42),
        ]
    );
}

#[test]
fn test_first_write_failure_reports_one_loss_and_continues() {
    let (mut driver, bridge, metrics, bike) = polling_lc();
    bike.fail_next_writes(1);

    driver.request_all();

    let events = bridge.drain_events();
    assert_eq!(lost_reports(&events), 1);
    assert_eq!(events[0], ErgometerEvent::ConnectionStatus(false));
    // Remaining queries of the tick still went out
    assert_eq!(bike.commands(), vec!["power", "pulse", "pedal", "power 100"]);
    assert_eq!(driver.state(), ConnectionState::Discovering);
    assert!(driver.rediscovery_armed());
    assert!(!driver.is_polling());

    let snap = metrics.snapshot();
    assert_eq!(snap.connection_losses, 1);
    assert_eq!(snap.write_timeouts, 1);
}

#[test]
fn test_every_write_failing_still_one_loss() {
    let (mut driver, bridge, metrics, bike) = polling_lc();
    bike.fail_next_writes(10);

    driver.request_all();

    assert_eq!(lost_reports(&bridge.drain_events()), 1);
    assert_eq!(bike.commands().len(), 4);
    assert_eq!(metrics.snapshot().connection_losses, 1);
    assert_eq!(metrics.snapshot().write_timeouts, 4);
}

#[test]
fn test_read_error_during_poll_reports_one_loss() {
    let (mut driver, bridge, metrics, bike) = polling_lc();
    bike.set_reply("pulse", "120");
    bike.fail_next_reads(1);

    driver.request_all();

    assert_eq!(
        bridge.drain_events(),
        vec![
            ErgometerEvent::ConnectionStatus(false),
            ErgometerEvent::Power(0),
            ErgometerEvent::Pulse(120),
            ErgometerEvent::Cadence(0),
        ]
    );
    assert_eq!(driver.state(), ConnectionState::Discovering);
    assert!(driver.rediscovery_armed());
    assert!(!driver.is_polling());

    let snap = metrics.snapshot();
    assert_eq!(snap.read_failures, 1);
    assert_eq!(snap.connection_losses, 1);
}

#[test]
fn test_every_read_failing_still_one_loss() {
    let (mut driver, bridge, metrics, bike) = polling_lc();
    bike.fail_next_reads(10);

    driver.request_all();

    assert_eq!(lost_reports(&bridge.drain_events()), 1);
    let snap = metrics.snapshot();
    assert_eq!(snap.read_failures, 3);
    assert_eq!(snap.connection_losses, 1);
}

#[test]
fn test_rediscovery_reconnects() {
    let (mut driver, bridge, _, bike) = polling_lc();
    bike.fail_next_writes(1);
    driver.request_all();
    bridge.drain_events();

    driver.connect().unwrap();

    assert_eq!(driver.state(), ConnectionState::Polling);
    assert_eq!(
        bridge.drain_events(),
        vec![ErgometerEvent::ConnectionStatus(true)]
    );
}

#[test]
fn test_tick_skipped_while_cycle_in_flight() {
    let (mut driver, bridge, metrics, bike) = polling_lc();

    let guard = driver.poll_guard();
    let held = guard.lock().unwrap();
    driver.request_all();
    drop(held);

    assert!(bike.commands().is_empty());
    assert!(bridge.drain_events().is_empty());
    assert_eq!(metrics.snapshot().skipped_polls, 1);

    driver.request_all();
    assert_eq!(bike.commands().len(), 4);
}

// ============================================================================
// Load control
// ============================================================================

#[test]
fn test_load_change_sends_exactly_one_command() {
    let (mut driver, bridge, _, bike) = polling_lc();
    driver.request_all();
    assert_eq!(driver.applied_load(), 100);
    bike.clear_commands();

    bridge.set_load(150);
    driver.request_all();
    assert_eq!(load_commands(&bike), vec!["power 150"]);
    assert_eq!(driver.applied_load(), 150);

    driver.request_all();
    assert_eq!(load_commands(&bike), vec!["power 150"]);
}

#[test]
fn test_applied_load_updates_even_when_write_fails() {
    let (mut driver, bridge, metrics, bike) = polling_lc();
    driver.request_all();
    bridge.drain_events();

    bike.fail_writes_of("power 180", 1);
    bridge.set_load(180);
    driver.request_all();

    assert_eq!(driver.applied_load(), 180);
    assert_eq!(lost_reports(&bridge.drain_events()), 1);
    assert_eq!(metrics.snapshot().connection_losses, 1);
}

#[test]
fn test_same_load_sends_nothing() {
    let (mut driver, bridge, _, bike) = polling_lc();
    driver.request_all();
    bike.clear_commands();

    bridge.set_load(100);
    driver.request_all();

    assert!(load_commands(&bike).is_empty());
}

// ============================================================================
// Worker thread
// ============================================================================

#[tokio::test]
async fn test_worker_connects_polls_and_shuts_down() {
    let bike = MockSerialDevice::ergometer("LC7").with_reply("power", "120");
    let ports = MockPorts::new().with_port("/dev/ttyUSB0", bike);
    let session = Arc::new(ErgometerSession::new(10));
    let (bridge, worker) = create_ergometer_bridge(session);

    let handle = spawn_ergometer_worker(
        ports,
        worker,
        fast_settings(),
        Arc::new(LinkMetrics::new()),
    )
    .unwrap();

    let first = with_timeout(DEFAULT_TEST_TIMEOUT, bridge.recv_event())
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(first, ErgometerEvent::ConnectionStatus(true));

    let second = with_timeout(DEFAULT_TEST_TIMEOUT, bridge.recv_event())
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(second, ErgometerEvent::Power(120));

    let result = bridge.set_serial_port("/dev/ttyUSB9");
    assert!(matches!(result, Err(Error::AlreadyRunning)));

    bridge.shutdown().await.unwrap();
    let outcome = tokio::task::spawn_blocking(move || handle.join())
        .await
        .unwrap()
        .expect("worker panicked");
    assert!(outcome.is_ok());
}

#[tokio::test]
async fn test_worker_shutdown_during_discovery() {
    let ports = MockPorts::new().with_port("a", MockSerialDevice::new());
    let (bridge, worker) = create_ergometer_bridge(Arc::new(ErgometerSession::default()));

    let handle = spawn_ergometer_worker(
        ports,
        worker,
        fast_settings(),
        Arc::new(LinkMetrics::new()),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    bridge.shutdown().await.unwrap();

    let outcome = with_timeout(
        DEFAULT_TEST_TIMEOUT,
        tokio::task::spawn_blocking(move || handle.join()),
    )
    .await
    .expect("worker did not stop")
    .unwrap()
    .expect("worker panicked");
    assert!(outcome.is_ok());
}
