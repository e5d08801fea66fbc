//! Wireless stick driver
//!
//! Frame assembly lives in `protocol`; this module owns the stick transport,
//! the router with its channel table, the device proxies and the worker
//! thread.

pub mod device;
pub mod dispatch;
pub mod stick;
pub mod worker;

pub use device::PowerMeterProxy;
pub use dispatch::{ChannelTable, DeviceProxy, Router};
pub use stick::{DEFAULT_USB_IDS, UsbStick};
pub use worker::{WirelessSettings, WirelessWorkerThread, spawn_wireless_worker};
