//! Ergometer serial driver
//!
//! Blocking implementation that runs in a dedicated thread and talks to the
//! application through an [`common::ErgometerWorker`].

pub mod discovery;
pub mod poll;
pub mod port;
pub mod reader;
pub mod supervisor;
pub mod timer;

pub use discovery::{DiscoverySettings, discover};
pub use port::{SystemPorts, configure_port, describe_ports};
pub use reader::read_answer;
pub use supervisor::{ConnectionState, ErgometerDriver, ErgometerSettings, spawn_ergometer_worker};
