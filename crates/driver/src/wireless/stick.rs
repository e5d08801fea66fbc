//! USB wireless stick transport built on `rusb`

use bytes::{Buf, BytesMut};
use common::transport::WirelessLink;
use rusb::{Context, Device, DeviceHandle, Direction, TransferType, UsbContext};
use std::io;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Vendor/product ids of the supported sticks
pub const DEFAULT_USB_IDS: [(u16, u16); 2] = [(0x0fcf, 0x1008), (0x0fcf, 0x1009)];

const INTERFACE: u8 = 0;
/// Short so the worker loop keeps checking for commands
const READ_TIMEOUT: Duration = Duration::from_millis(10);
const WRITE_TIMEOUT: Duration = Duration::from_millis(1000);
const READ_CHUNK: usize = 64;

fn usb_error(e: rusb::Error) -> common::Error {
    common::Error::Usb(e.to_string())
}

/// An open, claimed stick
pub struct UsbStick {
    handle: DeviceHandle<Context>,
    endpoint_in: u8,
    endpoint_out: u8,
    rx: BytesMut,
}

impl UsbStick {
    /// Open the first attached stick matching `ids`
    pub fn open(ids: &[(u16, u16)]) -> common::Result<Self> {
        let context = Context::new().map_err(usb_error)?;
        for device in context.devices().map_err(usb_error)?.iter() {
            let Ok(desc) = device.device_descriptor() else {
                continue;
            };
            if ids.contains(&(desc.vendor_id(), desc.product_id())) {
                info!(
                    "Found wireless stick {:04x}:{:04x} on bus {:03} device {:03}",
                    desc.vendor_id(),
                    desc.product_id(),
                    device.bus_number(),
                    device.address()
                );
                return Self::from_device(device);
            }
        }
        Err(common::Error::Usb("no wireless stick found".to_string()))
    }

    fn from_device(device: Device<Context>) -> common::Result<Self> {
        let handle = device.open().map_err(usb_error)?;

        match handle.kernel_driver_active(INTERFACE) {
            Ok(true) => {
                debug!("Detaching kernel driver from interface {}", INTERFACE);
                if let Err(e) = handle.detach_kernel_driver(INTERFACE) {
                    warn!("Failed to detach kernel driver: {}", e);
                }
            }
            Ok(false) => {}
            Err(e) => debug!("Could not check kernel driver status: {}", e),
        }
        handle.claim_interface(INTERFACE).map_err(usb_error)?;

        let (endpoint_in, endpoint_out) = bulk_endpoints(&device)?;
        debug!(
            "Using bulk endpoints in={:#04x} out={:#04x}",
            endpoint_in, endpoint_out
        );

        Ok(Self {
            handle,
            endpoint_in,
            endpoint_out,
            rx: BytesMut::with_capacity(READ_CHUNK),
        })
    }

    /// Attached sticks matching `ids`, one line each
    pub fn list(ids: &[(u16, u16)]) -> common::Result<Vec<String>> {
        let context = Context::new().map_err(usb_error)?;
        let mut found = Vec::new();
        for device in context.devices().map_err(usb_error)?.iter() {
            let Ok(desc) = device.device_descriptor() else {
                continue;
            };
            if ids.contains(&(desc.vendor_id(), desc.product_id())) {
                found.push(format!(
                    "{:04x}:{:04x} bus {:03} device {:03}",
                    desc.vendor_id(),
                    desc.product_id(),
                    device.bus_number(),
                    device.address()
                ));
            }
        }
        Ok(found)
    }
}

/// Bulk IN and OUT endpoint addresses of the claimed interface
fn bulk_endpoints(device: &Device<Context>) -> common::Result<(u8, u8)> {
    let config = device.active_config_descriptor().map_err(usb_error)?;
    let mut endpoint_in = None;
    let mut endpoint_out = None;

    for interface in config.interfaces().filter(|i| i.number() == INTERFACE) {
        for desc in interface.descriptors() {
            for endpoint in desc.endpoint_descriptors() {
                if endpoint.transfer_type() != TransferType::Bulk {
                    continue;
                }
                match endpoint.direction() {
                    Direction::In => endpoint_in = endpoint_in.or(Some(endpoint.address())),
                    Direction::Out => endpoint_out = endpoint_out.or(Some(endpoint.address())),
                }
            }
        }
    }

    match (endpoint_in, endpoint_out) {
        (Some(input), Some(output)) => Ok((input, output)),
        _ => Err(common::Error::Usb(
            "stick has no bulk endpoint pair".to_string(),
        )),
    }
}

impl WirelessLink for UsbStick {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.rx.is_empty() {
            let mut chunk = [0u8; READ_CHUNK];
            match self
                .handle
                .read_bulk(self.endpoint_in, &mut chunk, READ_TIMEOUT)
            {
                Ok(n) => self.rx.extend_from_slice(&chunk[..n]),
                Err(rusb::Error::Timeout) => return Ok(0),
                Err(e) => return Err(io::Error::other(e)),
            }
        }

        let n = buf.len().min(self.rx.len());
        buf[..n].copy_from_slice(&self.rx[..n]);
        self.rx.advance(n);
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        let written = self
            .handle
            .write_bulk(self.endpoint_out, data, WRITE_TIMEOUT)
            .map_err(|e| match e {
                rusb::Error::Timeout => io::Error::new(io::ErrorKind::TimedOut, e),
                other => io::Error::other(other),
            })?;
        if written < data.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {} of {} bytes", written, data.len()),
            ));
        }
        Ok(())
    }
}

impl Drop for UsbStick {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(INTERFACE) {
            debug!("Failed to release stick interface: {}", e);
        }
    }
}
