//! Chip identity detection

use crate::descriptor::DeviceDescriptor;
use crate::error::Result;
use crate::family::ProgrammerFamily;
use crate::message::{load, Endian, Message};
use crate::protocol::{chip_id as f, Command, FRAME_LEN, HEADER_LEN, REPLY_LEN};
use crate::transport::{recv_frame, send_frame, Transport};

/// ID type tags whose identity bytes are little-endian
const LITTLE_ENDIAN_TYPES: [u8; 2] = [3, 4];

/// Identity reported by the chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipId {
    /// ID type tag (1..=5)
    pub id_type: u8,
    /// Identity value
    pub id: u32,
}

/// Decode a read-ID reply for a device with `id_len` significant bytes
pub fn decode_chip_id(reply: &[u8], id_len: u8) -> ChipId {
    let id_type = reply[0];
    let len = (id_len as usize).min(f::MAX_ID_LEN);
    let endian = if LITTLE_ENDIAN_TYPES.contains(&id_type) {
        Endian::Little
    } else {
        Endian::Big
    };

    let id = if len == 0 {
        0
    } else {
        load(reply, f::ID.with_width(len).with_endian(endian)) as u32
    };
    ChipId { id_type, id }
}

/// Read the chip identity
///
/// The unused bytes of the request carry the family's fill pattern.
pub fn get_chip_id(
    transport: &mut dyn Transport,
    family: ProgrammerFamily,
    device: &DeviceDescriptor,
) -> Result<ChipId> {
    let msg = Message::<HEADER_LEN>::filled(Command::ReadId as u8, family.read_id_fill());
    send_frame(transport, msg.as_bytes())?;

    let mut reply = Message::<REPLY_LEN>::zeroed();
    recv_frame(transport, reply.as_mut_bytes())?;

    let chip = decode_chip_id(reply.as_bytes(), device.chip_id_bytes_count);
    log::debug!("Chip ID type {}: 0x{:08X}", chip.id_type, chip.id);
    Ok(chip)
}

/// Probe for a serial flash of the given `probe` type and return its 3-byte ID
pub fn spi_autodetect(transport: &mut dyn Transport, probe: u8) -> Result<u32> {
    let msg = Message::<FRAME_LEN>::new(Command::Autodetect as u8)
        .with(f::AUTODETECT_PROBE, probe.into());
    send_frame(transport, msg.frame(f::AUTODETECT_FRAME_LEN))?;

    let mut reply = Message::<REPLY_LEN>::zeroed();
    recv_frame(transport, reply.as_mut_bytes())?;
    Ok(reply.get(f::AUTODETECT_ID) as u32)
}
