//! Terminator-bounded reads from the ergometer

use common::transport::{SerialLink, is_timeout};
use protocol::ergometer::{TERMINATOR, normalize_reply};
use std::io;
use std::time::Duration;
use tracing::trace;

/// Read one reply
///
/// Bytes accumulate until a carriage return arrives. A wait of `timeout`
/// that yields nothing counts as the terminator, so the call always ends.
/// Input is consumed one byte at a time; anything after the first
/// terminator stays queued on the link.
pub fn read_answer<L>(link: &mut L, timeout: Duration) -> io::Result<String>
where
    L: SerialLink + ?Sized,
{
    let mut data = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        let received = match link.read_timeout(&mut byte, timeout) {
            Ok(n) => n,
            Err(e) if is_timeout(&e) => 0,
            Err(e) => return Err(e),
        };

        if received == 0 {
            trace!("Reply wait elapsed after {} bytes", data.len());
            data.push(TERMINATOR);
        } else {
            data.push(byte[0]);
        }

        if data.last() == Some(&TERMINATOR) {
            break;
        }
    }

    Ok(normalize_reply(&data))
}
