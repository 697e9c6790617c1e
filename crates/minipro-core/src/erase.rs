//! Chip erase and write protection

use crate::descriptor::DeviceDescriptor;
use crate::error::Result;
use crate::message::Message;
use crate::protocol::{erase as f, Command, FRAME_LEN, HEADER_LEN};
use crate::transport::{recv_frame, send_frame, Transport};

/// Erase the whole chip
///
/// Byte 2 is 1 unless the device declares a fuse table with zero entries.
pub fn erase(transport: &mut dyn Transport, device: &DeviceDescriptor) -> Result<()> {
    let fuses = match device.fuse_count {
        Some(0) => 0,
        _ => 1,
    };
    let msg = Message::<FRAME_LEN>::new(Command::Erase as u8).with(f::FUSE_COUNT, fuses);
    send_frame(transport, msg.frame(f::FRAME_LEN))?;

    let mut reply = Message::<FRAME_LEN>::zeroed();
    recv_frame(transport, reply.as_mut_bytes())
}

fn opcode_only(transport: &mut dyn Transport, opcode: Command) -> Result<()> {
    let msg = Message::<HEADER_LEN>::new(opcode as u8);
    send_frame(transport, msg.as_bytes())
}

/// Disable the chip's write protection
pub fn protect_off(transport: &mut dyn Transport) -> Result<()> {
    opcode_only(transport, Command::ProtectOff)
}

/// Enable the chip's write protection
pub fn protect_on(transport: &mut dyn Transport) -> Result<()> {
    opcode_only(transport, Command::ProtectOn)
}
