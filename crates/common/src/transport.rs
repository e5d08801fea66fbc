//! Transport seams for the two hardware links
//!
//! The drivers only talk to hardware through these traits. Production
//! implementations live in the driver crate (serialport, rusb); mocks live in
//! [`crate::test_utils`].

use std::io;
use std::time::Duration;

/// An open, configured serial connection to an ergometer
pub trait SerialLink: Send {
    /// Drop anything already buffered on the input side
    fn discard_input(&mut self) -> io::Result<()>;

    /// Write `data` completely within `timeout`
    ///
    /// Returns an `io::ErrorKind::TimedOut` error when the write does not
    /// complete in time.
    fn write_all_timeout(&mut self, data: &[u8], timeout: Duration) -> io::Result<()>;

    /// Wait up to `timeout` for input
    ///
    /// Returns `Ok(0)` when the wait elapses with nothing received.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;
}

impl<T: SerialLink + ?Sized> SerialLink for Box<T> {
    fn discard_input(&mut self) -> io::Result<()> {
        (**self).discard_input()
    }

    fn write_all_timeout(&mut self, data: &[u8], timeout: Duration) -> io::Result<()> {
        (**self).write_all_timeout(data, timeout)
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        (**self).read_timeout(buf, timeout)
    }
}

/// Source of serial ports
pub trait PortProvider: Send {
    type Link: SerialLink;

    /// Names of every currently visible port
    fn available_ports(&mut self) -> io::Result<Vec<String>>;

    /// Open `name` with the ergometer line settings applied
    fn open(&mut self, name: &str) -> io::Result<Self::Link>;
}

/// Byte pipe to the wireless stick
pub trait WirelessLink: Send {
    /// Read whatever is available; `Ok(0)` when nothing is
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write a complete encoded message
    fn write(&mut self, data: &[u8]) -> io::Result<()>;
}

impl<T: WirelessLink + ?Sized> WirelessLink for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).write(data)
    }
}

/// True for the error kinds a bounded wait produces
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}
