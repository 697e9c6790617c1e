//! Programmer hardware families

use std::fmt;
use std::str::FromStr;

/// Programmer family sharing the native command set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgrammerFamily {
    /// T48: native protocol, firmware update supported
    T48,
    /// T56: FPGA based, needs an algorithm bitstream before each transaction
    T56,
}

impl ProgrammerFamily {
    /// Whether an algorithm bitstream must be uploaded before `begin`
    pub fn requires_bitstream(&self) -> bool {
        matches!(self, ProgrammerFamily::T56)
    }

    /// High half of the version word in this family's update image
    pub fn firmware_magic(&self) -> Option<u32> {
        match self {
            ProgrammerFamily::T48 => Some(0xF048_0000),
            ProgrammerFamily::T56 => None,
        }
    }

    /// Filler for the unused bytes of a read-ID request
    pub fn read_id_fill(&self) -> u8 {
        match self {
            ProgrammerFamily::T48 => 0x00,
            ProgrammerFamily::T56 => 0xD0,
        }
    }

    /// Latest firmware version known to work with this crate
    pub fn expected_firmware(&self) -> Option<(u16, &'static str)> {
        match self {
            ProgrammerFamily::T48 => None,
            ProgrammerFamily::T56 => Some((0x0147, "1.1.71")),
        }
    }
}

impl fmt::Display for ProgrammerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgrammerFamily::T48 => write!(f, "T48"),
            ProgrammerFamily::T56 => write!(f, "T56"),
        }
    }
}

impl FromStr for ProgrammerFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "t48" => Ok(ProgrammerFamily::T48),
            "t56" => Ok(ProgrammerFamily::T56),
            _ => Err(format!("unknown programmer family: {}", s)),
        }
    }
}
