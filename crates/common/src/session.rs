//! Ergometer session control shared between the application and the worker
//!
//! The pending load is written by the application and read by the poll cycle
//! on the worker thread, so it lives in an atomic. The port name may only
//! change before the worker starts.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Default poll interval
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug)]
pub struct ErgometerSession {
    pending_load: AtomicU32,
    poll_interval_ms: AtomicU64,
    started: AtomicBool,
    port_name: Mutex<Option<String>>,
}

impl Default for ErgometerSession {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL_MS)
    }
}

impl ErgometerSession {
    pub fn new(poll_interval_ms: u64) -> Self {
        Self {
            pending_load: AtomicU32::new(0),
            poll_interval_ms: AtomicU64::new(poll_interval_ms),
            started: AtomicBool::new(false),
            port_name: Mutex::new(None),
        }
    }

    /// Load the next poll cycle should apply
    pub fn pending_load(&self) -> u32 {
        self.pending_load.load(Ordering::Acquire)
    }

    pub fn set_pending_load(&self, load: u32) {
        self.pending_load.store(load, Ordering::Release);
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms.load(Ordering::Acquire)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms())
    }

    /// Returns true if the value changed
    pub fn set_poll_interval_ms(&self, interval_ms: u64) -> bool {
        self.poll_interval_ms.swap(interval_ms, Ordering::AcqRel) != interval_ms
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Mark the worker as running; false if it already was
    pub fn mark_started(&self) -> bool {
        // Serialised with set_port_name so a late rename cannot slip in
        let _port = self.port_name.lock().unwrap_or_else(PoisonError::into_inner);
        !self.started.swap(true, Ordering::AcqRel)
    }

    /// Preferred port, if one was set
    pub fn port_name(&self) -> Option<String> {
        self.port_name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Set the preferred port; rejected once the worker has started
    pub fn set_port_name(&self, name: impl Into<String>) -> crate::Result<()> {
        let mut port = self.port_name.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_started() {
            tracing::warn!("Cannot set serial port while the ergometer driver is running");
            return Err(crate::Error::AlreadyRunning);
        }
        *port = Some(name.into());
        Ok(())
    }

    /// Record the port discovery settled on (worker side)
    pub fn record_port_name(&self, name: &str) {
        *self.port_name.lock().unwrap_or_else(PoisonError::into_inner) = Some(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_defaults() {
        let session = ErgometerSession::default();
        assert_eq!(session.pending_load(), 0);
        assert_eq!(session.poll_interval_ms(), DEFAULT_POLL_INTERVAL_MS);
        assert!(!session.is_started());
        assert!(session.port_name().is_none());
    }

    #[test]
    fn test_port_name_rejected_after_start() {
        let session = ErgometerSession::default();
        session.set_port_name("/dev/ttyUSB0").unwrap();
        assert!(session.mark_started());
        assert!(!session.mark_started());

        let result = session.set_port_name("/dev/ttyUSB1");
        assert!(matches!(result, Err(crate::Error::AlreadyRunning)));
        assert_eq!(session.port_name().as_deref(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn test_poll_interval_change_detection() {
        let session = ErgometerSession::new(1000);
        assert!(!session.set_poll_interval_ms(1000));
        assert!(session.set_poll_interval_ms(250));
        assert_eq!(session.poll_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_pending_load_across_threads() {
        let session = Arc::new(ErgometerSession::default());
        let writer = Arc::clone(&session);
        std::thread::spawn(move || writer.set_pending_load(180))
            .join()
            .unwrap();
        assert_eq!(session.pending_load(), 180);
    }
}
