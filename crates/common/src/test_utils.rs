//! Test utilities for trainer-driver
//!
//! Mock transports and helpers shared by the crates' tests.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{MockPorts, MockSerialDevice};
//! use common::transport::{PortProvider, SerialLink};
//! use std::time::Duration;
//!
//! let bike = MockSerialDevice::ergometer("LC7");
//! let mut ports = MockPorts::new().with_port("/dev/ttyUSB0", bike.clone());
//!
//! let mut link = ports.open("/dev/ttyUSB0").unwrap();
//! link.write_all_timeout(b"id\r", Duration::from_millis(10)).unwrap();
//!
//! let mut buf = [0u8; 16];
//! let n = link.read_timeout(&mut buf, Duration::from_millis(10)).unwrap();
//! assert_eq!(&buf[..n], b"LC7\r");
//! assert_eq!(bike.commands(), vec!["id".to_string()]);
//! ```

use crate::transport::{PortProvider, SerialLink, WirelessLink};
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Serial
// ============================================================================

#[derive(Debug, Default)]
struct SerialState {
    replies: HashMap<String, String>,
    commands: Vec<String>,
    line: Vec<u8>,
    rx: VecDeque<u8>,
    fail_writes: usize,
    fail_commands: HashMap<String, usize>,
    fail_reads: usize,
    fail_reads_on_open: Option<(usize, usize)>,
    fail_open: bool,
    open_limit: Option<usize>,
    opens: usize,
}

/// Scripted serial device
///
/// Every CR-terminated command written to it is recorded (including ones
/// whose write was made to time out). A command with a scripted reply queues
/// that reply, CR-terminated, on the input side.
#[derive(Debug, Clone, Default)]
pub struct MockSerialDevice {
    state: Arc<Mutex<SerialState>>,
}

impl MockSerialDevice {
    /// A device that answers nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// A bike answering `id` with `id` and zero for every reading
    pub fn ergometer(id: &str) -> Self {
        Self::new()
            .with_reply("id", id)
            .with_reply("power", "0")
            .with_reply("pulse", "0")
            .with_reply("pedal", "0")
    }

    pub fn with_reply(self, command: &str, reply: &str) -> Self {
        self.set_reply(command, reply);
        self
    }

    pub fn set_reply(&self, command: &str, reply: &str) {
        lock(&self.state)
            .replies
            .insert(command.to_string(), reply.to_string());
    }

    /// Make the next `count` writes time out
    pub fn fail_next_writes(&self, count: usize) {
        lock(&self.state).fail_writes = count;
    }

    /// Make the next `count` writes of exactly `command` time out
    pub fn fail_writes_of(&self, command: &str, count: usize) {
        lock(&self.state)
            .fail_commands
            .insert(command.to_string(), count);
    }

    /// Make the next `count` reads fail with a broken pipe
    pub fn fail_next_reads(&self, count: usize) {
        lock(&self.state).fail_reads = count;
    }

    /// Once the port has been opened `open` times, fail the next `count` reads
    pub fn fail_reads_on_open(&self, open: usize, count: usize) {
        lock(&self.state).fail_reads_on_open = Some((open, count));
    }

    /// Make opening this port fail
    pub fn set_fail_open(&self, fail: bool) {
        lock(&self.state).fail_open = fail;
    }

    /// Allow `limit` successful opens; later ones fail
    pub fn set_open_limit(&self, limit: usize) {
        lock(&self.state).open_limit = Some(limit);
    }

    /// Non-empty commands written so far, terminator stripped
    pub fn commands(&self) -> Vec<String> {
        lock(&self.state)
            .commands
            .iter()
            .filter(|c| !c.is_empty())
            .cloned()
            .collect()
    }

    /// Number of blank (priming) terminators written
    pub fn blank_lines(&self) -> usize {
        lock(&self.state).commands.iter().filter(|c| c.is_empty()).count()
    }

    pub fn clear_commands(&self) {
        lock(&self.state).commands.clear();
    }

    pub fn open_count(&self) -> usize {
        lock(&self.state).opens
    }

    /// Queue unsolicited input (stale bytes)
    pub fn push_input(&self, bytes: &[u8]) {
        lock(&self.state).rx.extend(bytes.iter().copied());
    }

    pub fn pending_input(&self) -> usize {
        lock(&self.state).rx.len()
    }
}

/// Link handed out by [`MockPorts::open`]
#[derive(Debug)]
pub struct MockSerialLink {
    device: MockSerialDevice,
}

impl SerialLink for MockSerialLink {
    fn discard_input(&mut self) -> io::Result<()> {
        lock(&self.device.state).rx.clear();
        Ok(())
    }

    fn write_all_timeout(&mut self, data: &[u8], _timeout: Duration) -> io::Result<()> {
        let mut state = lock(&self.device.state);
        let text = String::from_utf8_lossy(data);
        let command = text.trim_end_matches(char::from(protocol::ergometer::TERMINATOR));
        let failing = if state.fail_writes > 0 {
            state.fail_writes -= 1;
            true
        } else if let Some(remaining) = state.fail_commands.get_mut(command).filter(|n| **n > 0) {
            *remaining -= 1;
            true
        } else {
            false
        };

        for &byte in data {
            if byte != protocol::ergometer::TERMINATOR {
                state.line.push(byte);
                continue;
            }
            let command = String::from_utf8_lossy(&state.line).into_owned();
            state.line.clear();
            if !failing {
                if let Some(reply) = state.replies.get(&command).cloned() {
                    state.rx.extend(reply.bytes());
                    state.rx.push_back(protocol::ergometer::TERMINATOR);
                }
            }
            state.commands.push(command);
        }

        if failing {
            Err(io::Error::new(io::ErrorKind::TimedOut, "mock write timed out"))
        } else {
            Ok(())
        }
    }

    fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        let mut state = lock(&self.device.state);
        if state.fail_reads > 0 {
            state.fail_reads -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock read failed"));
        }
        let mut n = 0;
        while n < buf.len() {
            match state.rx.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

/// Scripted set of serial ports
#[derive(Debug, Clone, Default)]
pub struct MockPorts {
    ports: Vec<(String, MockSerialDevice)>,
}

impl MockPorts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, name: &str, device: MockSerialDevice) -> Self {
        self.ports.push((name.to_string(), device));
        self
    }
}

impl PortProvider for MockPorts {
    type Link = MockSerialLink;

    fn available_ports(&mut self) -> io::Result<Vec<String>> {
        Ok(self.ports.iter().map(|(name, _)| name.clone()).collect())
    }

    fn open(&mut self, name: &str) -> io::Result<MockSerialLink> {
        let device = self
            .ports
            .iter()
            .find(|(port, _)| port == name)
            .map(|(_, device)| device.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, name.to_string()))?;

        {
            let mut state = lock(&device.state);
            let over_limit = state.open_limit.is_some_and(|limit| state.opens >= limit);
            if state.fail_open || over_limit {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, name.to_string()));
            }
            state.opens += 1;
            if let Some((open, count)) = state.fail_reads_on_open
                && open == state.opens
            {
                state.fail_reads = count;
            }
            state.rx.clear();
            state.line.clear();
        }

        Ok(MockSerialLink { device })
    }
}

// ============================================================================
// Wireless
// ============================================================================

#[derive(Debug, Default)]
struct StickState {
    rx: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    unplugged: bool,
}

/// Scripted wireless stick; clones share state
#[derive(Debug, Clone, Default)]
pub struct MockStick {
    state: Arc<Mutex<StickState>>,
}

impl MockStick {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the driver to read
    pub fn push_bytes(&self, bytes: &[u8]) {
        lock(&self.state).rx.extend(bytes.iter().copied());
    }

    /// Bytes not yet read by the driver
    pub fn pending(&self) -> usize {
        lock(&self.state).rx.len()
    }

    /// Every message written by the driver
    pub fn written(&self) -> Vec<Vec<u8>> {
        lock(&self.state).written.clone()
    }

    /// Make every later read fail as if the stick was pulled out
    pub fn unplug(&self) {
        lock(&self.state).unplugged = true;
    }
}

impl WirelessLink for MockStick {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        if state.unplugged {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "mock stick unplugged"));
        }
        let mut n = 0;
        while n < buf.len() {
            match state.rx.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        lock(&self.state).written.push(data.to_vec());
        Ok(())
    }
}

/// Random line noise that never contains `excluded`
pub fn random_noise(len: usize, excluded: u8) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| loop {
            let byte: u8 = rng.random();
            if byte != excluded {
                break byte;
            }
        })
        .collect()
}

// ============================================================================
// Async helpers
// ============================================================================

/// Timeout wrapper for async tests
///
/// # Example
/// ```ignore
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// #[tokio::test]
/// async fn test_with_timeout() {
///     let value = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await.unwrap();
///     assert_eq!(value, 42);
/// }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}
