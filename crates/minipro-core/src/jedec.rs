//! JEDEC fuse row I/O for GAL/PAL style devices
//!
//! These frames were defined for the older TL866II family; T48/T56 firmware
//! accepts them but results on some devices may differ. No family check is
//! done here.

use crate::descriptor::DeviceDescriptor;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::{jedec as f, Command, FRAME_LEN, HEADER_LEN, REPLY_LEN};
use crate::transport::{recv_frame, send_frame, Transport};

/// Bytes needed to hold `size_bits` packed bits
pub fn row_bytes(size_bits: u8) -> usize {
    (size_bits as usize).div_ceil(8)
}

fn header<const N: usize>(
    opcode: Command,
    device: &DeviceDescriptor,
    row: u8,
    flags: u8,
    size_bits: u8,
) -> Message<N> {
    Message::<N>::new(opcode as u8)
        .with(f::PROTOCOL_ID, device.protocol_id.into())
        .with(f::SIZE_BITS, size_bits.into())
        .with(f::ROW, row.into())
        .with(f::FLAGS, flags.into())
}

/// Write one row of `size_bits` fuse bits
pub fn write_jedec_row(
    transport: &mut dyn Transport,
    device: &DeviceDescriptor,
    data: &[u8],
    row: u8,
    flags: u8,
    size_bits: u8,
) -> Result<()> {
    let len = row_bytes(size_bits);
    if data.len() < len {
        return Err(Error::Protocol(format!(
            "row {} needs {} bytes, got {}",
            row,
            len,
            data.len()
        )));
    }
    let mut msg = header::<FRAME_LEN>(Command::WriteJedec, device, row, flags, size_bits);
    msg.put_bytes(f::PAYLOAD, &data[..len]);
    send_frame(transport, msg.as_bytes())
}

/// Read one row of `size_bits` fuse bits into the front of `buf`
pub fn read_jedec_row(
    transport: &mut dyn Transport,
    device: &DeviceDescriptor,
    buf: &mut [u8],
    row: u8,
    flags: u8,
    size_bits: u8,
) -> Result<()> {
    let len = row_bytes(size_bits);
    if len > REPLY_LEN || buf.len() < len {
        return Err(Error::Protocol(format!(
            "row {} of {} bits does not fit a {} byte buffer",
            row,
            size_bits,
            buf.len()
        )));
    }
    let msg = header::<HEADER_LEN>(Command::ReadJedec, device, row, flags, size_bits);
    send_frame(transport, msg.as_bytes())?;

    let mut reply = Message::<REPLY_LEN>::zeroed();
    recv_frame(transport, reply.as_mut_bytes())?;
    buf[..len].copy_from_slice(reply.bytes(0, len));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    fn device() -> DeviceDescriptor {
        DeviceDescriptor {
            protocol_id: 0x2B,
            ..Default::default()
        }
    }

    #[test]
    fn test_row_bytes() {
        assert_eq!(row_bytes(0), 0);
        assert_eq!(row_bytes(1), 1);
        assert_eq!(row_bytes(8), 1);
        assert_eq!(row_bytes(9), 2);
        assert_eq!(row_bytes(132), 17);
    }

    #[test]
    fn test_write_row_frame() {
        let mut t = MockTransport::new();
        write_jedec_row(&mut t, &device(), &[0xFF, 0x01, 0xEE], 7, 0x80, 10).unwrap();
        let sent = t.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), 64);
        assert_eq!(&sent[0][..11], &[0x1E, 0x2B, 10, 0, 7, 0x80, 0, 0, 0xFF, 0x01, 0]);
        assert_eq!(t.pending_replies(), 0);
    }

    #[test]
    fn test_read_row_copies_from_reply_start() {
        let mut t = MockTransport::new();
        t.reply(&[0x12, 0x34, 0x56]);
        let mut buf = [0u8; 4];
        read_jedec_row(&mut t, &device(), &mut buf, 3, 0, 12).unwrap();
        assert_eq!(t.sent(), vec![&[0x1D, 0x2B, 12, 0, 3, 0, 0, 0][..]]);
        assert_eq!(buf, [0x12, 0x34, 0, 0]);
    }

    #[test]
    fn test_short_write_buffer_rejected() {
        let mut t = MockTransport::new();
        assert!(write_jedec_row(&mut t, &device(), &[0], 0, 0, 16).is_err());
        assert!(t.log.is_empty());
    }
}
