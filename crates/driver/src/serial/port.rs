//! Serial port transport built on `serialport`

use common::transport::{PortProvider, SerialLink, is_timeout};
use protocol::ergometer::TERMINATOR;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::debug;

/// Line speed every supported bike uses
pub const BAUD_RATE: u32 = 4800;

/// Timeout applied at open time; every exchange sets its own afterwards
const OPEN_TIMEOUT: Duration = Duration::from_millis(500);

/// Prime a freshly configured port
///
/// The bike can misread the first command after the line settings change;
/// an empty terminator clears that.
pub fn configure_port<L>(link: &mut L, timeout: Duration) -> io::Result<()>
where
    L: SerialLink + ?Sized,
{
    link.write_all_timeout(&[TERMINATOR], timeout)
}

/// An open system serial port
pub struct SystemSerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink for SystemSerialLink {
    fn discard_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input).map_err(io::Error::from)
    }

    fn write_all_timeout(&mut self, data: &[u8], timeout: Duration) -> io::Result<()> {
        self.port.set_timeout(timeout).map_err(io::Error::from)?;
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.port.set_timeout(timeout).map_err(io::Error::from)?;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if is_timeout(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }
}

/// Ports visible to the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl SystemPorts {
    pub fn new() -> Self {
        Self
    }
}

impl PortProvider for SystemPorts {
    type Link = SystemSerialLink;

    fn available_ports(&mut self) -> io::Result<Vec<String>> {
        let ports = serialport::available_ports().map_err(io::Error::from)?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn open(&mut self, name: &str) -> io::Result<SystemSerialLink> {
        debug!("Opening serial port {}", name);
        let port = serialport::new(name, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::Software)
            .timeout(OPEN_TIMEOUT)
            .open()
            .map_err(io::Error::from)?;
        Ok(SystemSerialLink { port })
    }
}

fn serial_error(e: serialport::Error) -> common::Error {
    common::Error::Serial(e.to_string())
}

/// One line per visible port, for `--list-ports`
pub fn describe_ports() -> common::Result<Vec<String>> {
    let ports = serialport::available_ports().map_err(serial_error)?;
    Ok(ports
        .into_iter()
        .map(|info| match info.port_type {
            SerialPortType::UsbPort(usb) => format!(
                "{} (USB {:04x}:{:04x} {})",
                info.port_name,
                usb.vid,
                usb.pid,
                usb.product.as_deref().unwrap_or("unknown product")
            ),
            SerialPortType::PciPort => format!("{} (PCI)", info.port_name),
            SerialPortType::BluetoothPort => format!("{} (Bluetooth)", info.port_name),
            SerialPortType::Unknown => info.port_name,
        })
        .collect())
}
