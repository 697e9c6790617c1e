//! System information and status queries

use std::fmt;

use crate::error::Result;
use crate::message::Message;
use crate::protocol::{self, Command, HEADER_LEN, REPLY_LEN};
use crate::transport::{recv_frame, send_frame, Transport};

/// Operating mode reported by the programmer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    /// Normal firmware running
    Normal,
    /// Bootloader running, ready for reflashing
    Bootloader,
    /// Any other status byte
    Unknown(u8),
}

impl DeviceMode {
    /// Decode the status byte of the system-info reply
    pub fn from_status(status: u8) -> Self {
        match status {
            1 => DeviceMode::Normal,
            2 => DeviceMode::Bootloader,
            other => DeviceMode::Unknown(other),
        }
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMode::Normal => write!(f, "normal"),
            DeviceMode::Bootloader => write!(f, "bootloader"),
            DeviceMode::Unknown(s) => write!(f, "unknown (0x{:02X})", s),
        }
    }
}

/// Identity and mode of the attached programmer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    /// Operating mode
    pub mode: DeviceMode,
    /// Firmware version (major in the high byte)
    pub firmware: u16,
    /// Hardware model byte
    pub model: u8,
    /// Device code string
    pub device_code: String,
    /// Serial number string
    pub serial: String,
}

impl SystemInfo {
    /// Firmware version as "00.MM.mm"
    pub fn firmware_string(&self) -> String {
        format_version(self.firmware as u32)
    }
}

/// Render a 16-bit firmware version the way the vendor tools print it
pub fn format_version(version: u32) -> String {
    format!("{:02}.{:02}.{:02}", 0, (version >> 8) & 0xFF, version & 0xFF)
}

fn ascii_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\0', ' '])
        .to_string()
}

/// Query system information
pub fn get_system_info(transport: &mut dyn Transport) -> Result<SystemInfo> {
    use protocol::system_info as f;

    let msg = Message::<HEADER_LEN>::new(Command::GetSystemInfo as u8);
    send_frame(transport, msg.as_bytes())?;

    let mut reply = Message::<{ protocol::FRAME_LEN }>::zeroed();
    recv_frame(transport, reply.as_mut_bytes())?;

    Ok(SystemInfo {
        mode: DeviceMode::from_status(reply.get(f::STATUS) as u8),
        firmware: reply.get(f::FIRMWARE) as u16,
        model: reply.get(f::MODEL) as u8,
        device_code: ascii_field(reply.bytes(f::DEVICE_CODE, f::DEVICE_CODE_LEN)),
        serial: ascii_field(reply.bytes(f::SERIAL, f::SERIAL_LEN)),
    })
}

/// Programmer status after an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status {
    /// Verify-while-writing error flag
    pub error: u8,
    /// Address of the first mismatch
    pub address: u32,
    /// First compared word
    pub c1: u16,
    /// Second compared word
    pub c2: u16,
    /// Overcurrent protection state (nonzero = tripped)
    pub overcurrent: u8,
}

impl Status {
    /// Whether overcurrent protection tripped
    pub fn is_overcurrent(&self) -> bool {
        self.overcurrent != 0
    }
}

/// Request status and overcurrent state
pub fn get_status(transport: &mut dyn Transport) -> Result<Status> {
    use protocol::status as f;

    let msg = Message::<HEADER_LEN>::new(Command::RequestStatus as u8);
    send_frame(transport, msg.as_bytes())?;

    let mut reply = Message::<REPLY_LEN>::zeroed();
    recv_frame(transport, reply.as_mut_bytes())?;

    Ok(Status {
        error: reply.get(f::ERROR) as u8,
        address: reply.get(f::ADDRESS) as u32,
        c1: reply.get(f::C1) as u16,
        c2: reply.get(f::C2) as u16,
        overcurrent: reply.get(f::OVERCURRENT) as u8,
    })
}
