//! Common utilities for trainer-driver
//!
//! This crate provides shared functionality between the two hardware drivers
//! and the application: transport traits, the async channel bridges that
//! connect blocking worker threads to the application runtime, shared session
//! control, diagnostic metrics, error handling and logging setup.

pub mod channel;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod session;
pub mod test_utils;
pub mod transport;

pub use channel::{
    ErgometerBridge, ErgometerCommand, ErgometerEvent, ErgometerWorker, WirelessBridge,
    WirelessCommand, WirelessWorker, create_ergometer_bridge, create_wireless_bridge,
};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use metrics::{LinkMetrics, MetricsSnapshot};
pub use session::ErgometerSession;
pub use transport::{PortProvider, SerialLink, WirelessLink};
