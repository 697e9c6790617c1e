//! Wire protocol constants and frame layouts
//!
//! Opcodes are shared by the T48 and T56 families. Each submodule declares
//! the named fields of one frame type; all multi-byte integers are
//! little-endian unless the field says otherwise.

use crate::message::Field;

/// Command opcodes (byte 0 of every frame)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GetSystemInfo = 0x00,
    BeginTrans = 0x03,
    EndTrans = 0x04,
    ReadId = 0x05,
    ReadUser = 0x06,
    WriteUser = 0x07,
    ReadCfg = 0x08,
    WriteCfg = 0x09,
    WriteUserData = 0x0A,
    ReadUserData = 0x0B,
    WriteCode = 0x0C,
    ReadCode = 0x0D,
    Erase = 0x0E,
    ReadData = 0x10,
    WriteData = 0x11,
    WriteLock = 0x14,
    ReadLock = 0x15,
    ProtectOff = 0x18,
    ProtectOn = 0x19,
    ReadJedec = 0x1D,
    WriteJedec = 0x1E,
    WriteBitstream = 0x26,
    LogicIcTestVector = 0x28,
    Autodetect = 0x37,
    RequestStatus = 0x39,
    BootloaderWrite = 0x3B,
    BootloaderErase = 0x3C,
    Switch = 0x3D,
}

impl Command {
    /// Parse an opcode byte
    pub fn from_u8(value: u8) -> Option<Self> {
        use Command::*;
        Some(match value {
            0x00 => GetSystemInfo,
            0x03 => BeginTrans,
            0x04 => EndTrans,
            0x05 => ReadId,
            0x06 => ReadUser,
            0x07 => WriteUser,
            0x08 => ReadCfg,
            0x09 => WriteCfg,
            0x0A => WriteUserData,
            0x0B => ReadUserData,
            0x0C => WriteCode,
            0x0D => ReadCode,
            0x0E => Erase,
            0x10 => ReadData,
            0x11 => WriteData,
            0x14 => WriteLock,
            0x15 => ReadLock,
            0x18 => ProtectOff,
            0x19 => ProtectOn,
            0x1D => ReadJedec,
            0x1E => WriteJedec,
            0x26 => WriteBitstream,
            0x28 => LogicIcTestVector,
            0x37 => Autodetect,
            0x39 => RequestStatus,
            0x3B => BootloaderWrite,
            0x3C => BootloaderErase,
            0x3D => Switch,
            _ => return None,
        })
    }
}

/// Length of the short command header used by most requests
pub const HEADER_LEN: usize = 8;
/// Full-size command frame
pub const FRAME_LEN: usize = 64;
/// Standard reply length for identity/status/logic frames
pub const REPLY_LEN: usize = 32;

/// Begin-transaction frame (64 bytes)
pub mod begin {
    use super::Field;

    pub const PROTOCOL_ID: Field = Field::byte(1);
    pub const VARIANT: Field = Field::byte(2);
    pub const ICSP: Field = Field::byte(3);
    pub const VOLTAGES: Field = Field::le(4, 2);
    pub const CHIP_INFO: Field = Field::byte(6);
    pub const PIN_MAP: Field = Field::byte(7);
    pub const DATA_MEMORY_SIZE: Field = Field::le(8, 2);
    pub const PAGE_SIZE: Field = Field::le(10, 2);
    pub const PULSE_DELAY: Field = Field::le(12, 2);
    pub const DATA_MEMORY2_SIZE: Field = Field::le(14, 2);
    pub const CODE_MEMORY_SIZE: Field = Field::le(16, 4);
    /// Third byte of the packed voltage word
    pub const VOLTAGE_SELECT: Field = Field::byte(20);
    /// Low nibble of the voltage word (non-special families only)
    pub const VOLTAGE_LOW: Field = Field::byte(21);
    /// High nibble, whole low byte, or override value
    pub const VOLTAGE_HIGH: Field = Field::byte(22);
    pub const PACKED_PACKAGE: Field = Field::le(40, 4);
    pub const READ_BUFFER_SIZE: Field = Field::le(44, 2);
    pub const FLAGS: Field = Field::le(56, 4);
}

/// Block read/write header (8 bytes)
pub mod block {
    use super::Field;

    pub const LENGTH: Field = Field::le(2, 2);
    pub const ADDRESS: Field = Field::le(4, 4);
}

/// Fuse read/write frame (8-byte header, 64-byte frame)
pub mod fuse {
    use super::Field;

    pub const PROTOCOL_ID: Field = Field::byte(1);
    pub const ITEMS_COUNT: Field = Field::byte(2);
    pub const CODE_MEMORY_SIZE: Field = Field::le(4, 4);
    pub const PAYLOAD: usize = 8;
    /// Subtracted from the code memory size in write frames
    pub const WRITE_SIZE_OFFSET: u32 = 0x38;
}

/// Chip-ID request/reply and autodetect
pub mod chip_id {
    use super::Field;

    pub const ID_TYPE: Field = Field::byte(0);
    /// Start of the identity value; width comes from the descriptor
    pub const ID: Field = Field::be(2, 4);
    pub const MAX_ID_LEN: usize = 4;
    pub const AUTODETECT_PROBE: Field = Field::byte(8);
    pub const AUTODETECT_FRAME_LEN: usize = 10;
    pub const AUTODETECT_ID: Field = Field::be(2, 3);
}

/// JEDEC row read/write frame
pub mod jedec {
    use super::Field;

    pub const PROTOCOL_ID: Field = Field::byte(1);
    pub const SIZE_BITS: Field = Field::byte(2);
    pub const ROW: Field = Field::byte(4);
    pub const FLAGS: Field = Field::byte(5);
    pub const PAYLOAD: usize = 8;
}

/// Logic IC test vector frame (32 bytes, 0xFF filled)
pub mod logic {
    use super::Field;

    /// VCC selector; bit 7 selects the pull-down bias
    pub const VCC: Field = Field::byte(1);
    pub const PIN_COUNT: Field = Field::le(2, 2);
    pub const ROW: Field = Field::le(4, 4);
    pub const PINS: usize = 8;
    pub const PULL_DOWN_BIT: u8 = 0x80;
}

/// Status reply (32 bytes)
pub mod status {
    use super::Field;

    pub const ERROR: Field = Field::byte(0);
    pub const C1: Field = Field::le(2, 2);
    pub const C2: Field = Field::le(4, 2);
    pub const ADDRESS: Field = Field::le(8, 4);
    pub const OVERCURRENT: Field = Field::byte(12);
}

/// System information reply (64 bytes)
pub mod system_info {
    use super::Field;

    pub const STATUS: Field = Field::byte(1);
    pub const FIRMWARE: Field = Field::le(4, 2);
    pub const MODEL: Field = Field::byte(6);
    pub const DEVICE_CODE: usize = 8;
    pub const DEVICE_CODE_LEN: usize = 8;
    pub const SERIAL: usize = 16;
    pub const SERIAL_LEN: usize = 24;
}

/// Erase frame (15 bytes sent, 64-byte reply)
pub mod erase {
    use super::Field;

    pub const FUSE_COUNT: Field = Field::byte(2);
    pub const FRAME_LEN: usize = 15;
}

/// FPGA bitstream upload header (8 bytes)
pub mod bitstream {
    use super::Field;

    pub const LENGTH: Field = Field::le(4, 4);
}

/// Bootloader frames used by the firmware updater
pub mod bootloader {
    use super::Field;

    pub const MAGIC: u64 = 0xCDEF_89AB_4567_0123;
    pub const MAGIC_FIELD: Field = Field::le(8, 8);
    pub const CONTROL_FRAME_LEN: usize = 16;

    /// Ack byte of the switch reply
    pub const SWITCH_ACK: Field = Field::byte(0);
    /// Ack byte of erase and write replies
    pub const ACK: Field = Field::byte(1);

    /// Write-mode selector in byte 1 of a write frame
    pub const WRITE_MODE: Field = Field::byte(1);
    pub const WRITE_MODE_BLOCK: u64 = 0;
    pub const WRITE_MODE_START: u64 = 1;
    pub const WRITE_MODE_COMPLETE: u64 = 2;
    pub const WRITE_MODE_FINAL: u64 = 3;

    pub const BLOCK_LENGTH: Field = Field::le(2, 2);
    pub const BLOCK_PAYLOAD: usize = 8;
    pub const BLOCK_SIZE: usize = 0x114;
    pub const BLOCK_FRAME_LEN: usize = BLOCK_PAYLOAD + BLOCK_SIZE;

    pub const FINAL_LENGTH: u64 = 0x100;
    pub const FINAL_MARKER: Field = Field::le(5, 3);
    pub const FINAL_MARKER_VALUE: u64 = 0x08_03_FF;
    pub const FINAL_MAGIC: Field = Field::le(260, 4);
    pub const FINAL_MAGIC_VALUE: u64 = 0xCDEF_8668;
    pub const FINAL_FRAME_LEN: usize = 264;

    /// Buffer large enough for every bootloader frame
    pub const BUFFER_LEN: usize = 288;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_roundtrip() {
        for cmd in [
            Command::BeginTrans,
            Command::ReadCode,
            Command::WriteJedec,
            Command::LogicIcTestVector,
            Command::Switch,
        ] {
            assert_eq!(Command::from_u8(cmd as u8), Some(cmd));
        }
        assert_eq!(Command::from_u8(0xFF), None);
        assert_eq!(Command::from_u8(0x02), None);
    }

    #[test]
    fn test_bootloader_frame_sizes() {
        assert_eq!(bootloader::BLOCK_FRAME_LEN, 0x11C);
        assert!(bootloader::FINAL_MAGIC.end() <= bootloader::FINAL_FRAME_LEN);
        assert!(bootloader::BLOCK_FRAME_LEN <= bootloader::BUFFER_LEN);
    }
}
