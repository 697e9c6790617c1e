//! Transport abstraction
//!
//! The programmer exposes two logical channels: a message channel for
//! command frames and their replies, and a payload channel for bulk block
//! data. Every send on the message channel is answered (if at all) before the
//! next command is issued; the transport does not need to support overlap.

use crate::error::Result;
use crate::message::hex_dump;

/// Byte-oriented link to one programmer
///
/// Implementations own the underlying device handle. They must not be shared
/// between threads without external locking.
pub trait Transport {
    /// Send one command frame on the message channel
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive exactly `buf.len()` bytes from the message channel
    fn recv(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Write bulk data on the payload channel
    fn write_payload(&mut self, data: &[u8]) -> Result<()>;

    /// Read exactly `buf.len()` bytes from the payload channel
    fn read_payload(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Reset the device and reopen it in place
    ///
    /// The previous device handle is invalid after this call; on success the
    /// transport talks to the re-enumerated device.
    fn reset_and_reopen(&mut self) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        (**self).send(data)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).recv(buf)
    }

    fn write_payload(&mut self, data: &[u8]) -> Result<()> {
        (**self).write_payload(data)
    }

    fn read_payload(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read_payload(buf)
    }

    fn reset_and_reopen(&mut self) -> Result<()> {
        (**self).reset_and_reopen()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        (**self).send(data)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).recv(buf)
    }

    fn write_payload(&mut self, data: &[u8]) -> Result<()> {
        (**self).write_payload(data)
    }

    fn read_payload(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read_payload(buf)
    }

    fn reset_and_reopen(&mut self) -> Result<()> {
        (**self).reset_and_reopen()
    }
}

/// Send a frame, tracing it
pub(crate) fn send_frame(transport: &mut dyn Transport, frame: &[u8]) -> Result<()> {
    log::trace!("msg_send [{}]: {}", frame.len(), hex_dump(frame));
    transport.send(frame)
}

/// Receive a reply, tracing it
pub(crate) fn recv_frame(transport: &mut dyn Transport, buf: &mut [u8]) -> Result<()> {
    transport.recv(buf)?;
    log::trace!("msg_recv [{}]: {}", buf.len(), hex_dump(buf));
    Ok(())
}
