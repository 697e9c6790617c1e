//! Native fuse read/write framing

use crate::descriptor::{DeviceDescriptor, MemoryType};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::{fuse as f, Command, FRAME_LEN, HEADER_LEN};
use crate::transport::{recv_frame, send_frame, Transport};

/// Largest fuse payload that fits a 64-byte frame
pub const MAX_FUSE_LEN: usize = FRAME_LEN - f::PAYLOAD;

fn opcodes(kind: MemoryType) -> Result<(Command, Command)> {
    match kind {
        MemoryType::FuseUser => Ok((Command::ReadUser, Command::WriteUser)),
        MemoryType::FuseConfig => Ok((Command::ReadCfg, Command::WriteCfg)),
        MemoryType::FuseLock => Ok((Command::ReadLock, Command::WriteLock)),
        other => Err(Error::Protocol(format!("unknown fuse type ({})", other))),
    }
}

fn check_len(len: usize) -> Result<()> {
    if len > MAX_FUSE_LEN {
        return Err(Error::Protocol(format!(
            "fuse length {} exceeds {} bytes",
            len, MAX_FUSE_LEN
        )));
    }
    Ok(())
}

/// Read `buf.len()` bytes of fuse data
pub fn read_fuses(
    transport: &mut dyn Transport,
    device: &DeviceDescriptor,
    kind: MemoryType,
    items_count: u8,
    buf: &mut [u8],
) -> Result<()> {
    let (opcode, _) = opcodes(kind)?;
    check_len(buf.len())?;

    let msg = Message::<HEADER_LEN>::new(opcode as u8)
        .with(f::PROTOCOL_ID, device.protocol_id.into())
        .with(f::ITEMS_COUNT, items_count.into())
        .with(f::CODE_MEMORY_SIZE, device.code_memory_size.into());
    send_frame(transport, msg.as_bytes())?;

    let mut reply = Message::<FRAME_LEN>::zeroed();
    recv_frame(transport, reply.as_mut_bytes())?;
    buf.copy_from_slice(reply.bytes(f::PAYLOAD, buf.len()));
    Ok(())
}

/// Write fuse data, or send the bare opcode when `data` is `None`
///
/// The size field carries `code_memory_size - 0x38` rather than the raw
/// size. The vendor firmware has always been sent this value; the intent
/// behind the offset is unverified.
pub fn write_fuses(
    transport: &mut dyn Transport,
    device: &DeviceDescriptor,
    kind: MemoryType,
    items_count: u8,
    data: Option<&[u8]>,
) -> Result<()> {
    let (_, opcode) = opcodes(kind)?;

    let mut msg = Message::<FRAME_LEN>::new(opcode as u8);
    if let Some(data) = data {
        check_len(data.len())?;
        msg.set(f::PROTOCOL_ID, device.protocol_id.into())
            .set(f::ITEMS_COUNT, items_count.into())
            .set(
                f::CODE_MEMORY_SIZE,
                device.code_memory_size.wrapping_sub(f::WRITE_SIZE_OFFSET).into(),
            )
            .put_bytes(f::PAYLOAD, data);
    }
    send_frame(transport, msg.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    fn device() -> DeviceDescriptor {
        DeviceDescriptor {
            protocol_id: 0x42,
            code_memory_size: 0x1000,
            ..Default::default()
        }
    }

    #[test]
    fn test_write_fuses_frame() {
        let mut t = MockTransport::new();
        write_fuses(&mut t, &device(), MemoryType::FuseConfig, 3, Some(&[0xDE, 0xAD])).unwrap();
        let sent = t.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), 64);
        assert_eq!(&sent[0][..10], &[0x09, 0x42, 3, 0, 0xC8, 0x0F, 0, 0, 0xDE, 0xAD]);
    }

    #[test]
    fn test_write_fuses_without_buffer_sends_opcode_only() {
        let mut t = MockTransport::new();
        write_fuses(&mut t, &device(), MemoryType::FuseLock, 1, None).unwrap();
        let sent = t.sent();
        assert_eq!(sent[0][0], 0x14);
        assert!(sent[0][1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_read_fuses_frame() {
        let mut t = MockTransport::new();
        let mut reply = [0u8; 64];
        reply[8..11].copy_from_slice(&[1, 2, 3]);
        t.reply(&reply);

        let mut buf = [0u8; 3];
        read_fuses(&mut t, &device(), MemoryType::FuseUser, 2, &mut buf).unwrap();
        assert_eq!(t.sent(), vec![&[0x06, 0x42, 2, 0, 0x00, 0x10, 0, 0][..]]);
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn test_fuse_loopback() {
        let dev = device();
        let data = [0x5A, 0xA5, 0x0F, 0xF0];

        let mut t = MockTransport::new();
        write_fuses(&mut t, &dev, MemoryType::FuseConfig, 4, Some(&data)).unwrap();
        let written = t.sent()[0].to_vec();
        t.reply(&written);

        let mut back = [0u8; 4];
        read_fuses(&mut t, &dev, MemoryType::FuseConfig, 4, &mut back).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_non_fuse_type_rejected() {
        let mut t = MockTransport::new();
        let err = read_fuses(&mut t, &device(), MemoryType::Code, 1, &mut [0u8; 1]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        let err = write_fuses(&mut t, &device(), MemoryType::Data, 1, None).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(t.log.is_empty());
    }

    #[test]
    fn test_oversized_fuse_buffer_rejected() {
        let mut t = MockTransport::new();
        let data = [0u8; MAX_FUSE_LEN + 1];
        assert!(write_fuses(&mut t, &device(), MemoryType::FuseUser, 1, Some(&data)).is_err());
        assert!(t.log.is_empty());
    }
}
