//! Native block read/write framing

use crate::descriptor::{DeviceDescriptor, MemoryType};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::{block as f, Command, HEADER_LEN};
use crate::transport::{send_frame, Transport};

fn read_opcode(kind: MemoryType) -> Result<Command> {
    match kind {
        MemoryType::Code => Ok(Command::ReadCode),
        MemoryType::Data => Ok(Command::ReadData),
        MemoryType::User => Ok(Command::ReadUserData),
        other => Err(Error::Protocol(format!("unknown type for read_block ({})", other))),
    }
}

fn write_opcode(kind: MemoryType) -> Result<Command> {
    match kind {
        MemoryType::Code => Ok(Command::WriteCode),
        MemoryType::Data => Ok(Command::WriteData),
        MemoryType::User => Ok(Command::WriteUserData),
        other => Err(Error::Protocol(format!("unknown type for write_block ({})", other))),
    }
}

fn header(opcode: Command, addr: u32, len: usize) -> Message<HEADER_LEN> {
    Message::<HEADER_LEN>::new(opcode as u8)
        .with(f::LENGTH, len as u64)
        .with(f::ADDRESS, addr.into())
}

/// Read `buf.len()` bytes of `kind` memory starting at `addr`
pub fn read_block(
    transport: &mut dyn Transport,
    kind: MemoryType,
    addr: u32,
    buf: &mut [u8],
) -> Result<()> {
    let opcode = read_opcode(kind)?;
    log::trace!("read_block {} @ 0x{:08X}, {} bytes", kind, addr, buf.len());
    send_frame(transport, header(opcode, addr, buf.len()).as_bytes())?;
    transport.read_payload(buf)
}

/// Write a block of `kind` memory at `addr`
///
/// The header carries `data.len()`, but the payload is always the device's
/// `write_buffer_size` bytes. This mirrors the vendor firmware's expectation
/// and is kept as-is; whether the firmware actually wants the fixed size is
/// unverified. A short `data` is zero-padded up to that size.
pub fn write_block(
    transport: &mut dyn Transport,
    device: &DeviceDescriptor,
    kind: MemoryType,
    addr: u32,
    data: &[u8],
) -> Result<()> {
    let opcode = write_opcode(kind)?;
    log::trace!("write_block {} @ 0x{:08X}, {} bytes", kind, addr, data.len());
    send_frame(transport, header(opcode, addr, data.len()).as_bytes())?;

    let size = device.write_buffer_size as usize;
    if data.len() >= size {
        transport.write_payload(&data[..size])
    } else {
        log::debug!(
            "write_block: padding {} byte block to write buffer size {}",
            data.len(),
            size
        );
        let mut padded = data.to_vec();
        padded.resize(size, 0);
        transport.write_payload(&padded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Channel, MockTransport};

    fn device() -> DeviceDescriptor {
        DeviceDescriptor {
            write_buffer_size: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_read_block_frames() {
        let mut t = MockTransport::new();
        t.payload(&[1, 2, 3]);
        let mut buf = [0u8; 3];
        read_block(&mut t, MemoryType::Data, 0x0001_0203, &mut buf).unwrap();
        assert_eq!(t.sent(), vec![&[0x10, 0, 3, 0, 0x03, 0x02, 0x01, 0x00][..]]);
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn test_user_block_uses_user_data_opcodes() {
        let mut t = MockTransport::new();
        t.payload(&[0]);
        read_block(&mut t, MemoryType::User, 0, &mut [0u8; 1]).unwrap();
        write_block(&mut t, &device(), MemoryType::User, 0, &[0; 4]).unwrap();
        let sent = t.sent();
        assert_eq!(sent[0][0], 0x0B);
        assert_eq!(sent[1][0], 0x0A);
    }

    #[test]
    fn test_write_block_sends_fixed_buffer_size() {
        let mut t = MockTransport::new();
        let data = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
        write_block(&mut t, &device(), MemoryType::Code, 0x100, &data).unwrap();
        assert_eq!(t.sent(), vec![&[0x0C, 0, 6, 0, 0x00, 0x01, 0, 0][..]]);
        assert_eq!(t.frames(Channel::PayloadOut), vec![&data[..4]]);

        let mut t = MockTransport::new();
        write_block(&mut t, &device(), MemoryType::Code, 0, &[0x11]).unwrap();
        assert_eq!(t.frames(Channel::PayloadOut), vec![&[0x11, 0, 0, 0][..]]);
    }

    #[test]
    fn test_unsupported_type_does_no_io() {
        for kind in [MemoryType::FuseUser, MemoryType::FuseConfig, MemoryType::FuseLock] {
            let mut t = MockTransport::new();
            let err = read_block(&mut t, kind, 0, &mut [0u8; 4]).unwrap_err();
            assert!(matches!(err, Error::Protocol(_)));
            let err = write_block(&mut t, &device(), kind, 0, &[0; 4]).unwrap_err();
            assert!(matches!(err, Error::Protocol(_)));
            assert!(t.log.is_empty());
        }
    }
}
