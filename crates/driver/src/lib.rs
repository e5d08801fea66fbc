//! Drivers for an ANT+ wireless stick and a Monark ergometer
//!
//! Each driver runs on its own blocking worker thread and talks to the
//! application through the bridges in [`common::channel`]. The
//! `trainer-driver` binary wires both together.

pub mod config;
pub mod serial;
pub mod wireless;

pub use config::DriverConfig;
