//! Device descriptors
//!
//! A [`DeviceDescriptor`] is everything the programmer firmware needs to
//! know about the target chip. It is supplied by the caller (normally from a
//! device database) and never modified by this crate.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Logical memory region or fuse group addressed by an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryType {
    /// Main program memory
    Code,
    /// Data EEPROM
    Data,
    /// User/ID area
    User,
    /// User fuse group
    FuseUser,
    /// Configuration fuse group
    FuseConfig,
    /// Lock bits
    FuseLock,
}

impl MemoryType {
    /// Whether this is one of the fuse groups
    pub fn is_fuse(&self) -> bool {
        matches!(
            self,
            MemoryType::FuseUser | MemoryType::FuseConfig | MemoryType::FuseLock
        )
    }
}

impl TryFrom<u8> for MemoryType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(MemoryType::Code),
            1 => Ok(MemoryType::Data),
            2 => Ok(MemoryType::User),
            3 => Ok(MemoryType::FuseUser),
            4 => Ok(MemoryType::FuseConfig),
            5 => Ok(MemoryType::FuseLock),
            _ => Err(Error::Protocol(format!("unknown memory type {}", value))),
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryType::Code => "code",
            MemoryType::Data => "data",
            MemoryType::User => "user",
            MemoryType::FuseUser => "user fuses",
            MemoryType::FuseConfig => "config fuses",
            MemoryType::FuseLock => "lock bits",
        };
        f.write_str(name)
    }
}

/// Per-pin symbol of a logic test vector
///
/// The discriminant is the code the firmware expects in the packed vector.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicState {
    /// Drive the input low
    Zero = 0,
    /// Drive the input high
    One = 1,
    /// Output must read low
    Low = 2,
    /// Output must read high
    High = 3,
    /// Clock pulse
    Clock = 4,
    /// Output must be high impedance
    HighZ = 5,
    /// Don't care, left unconnected
    DontCare = 6,
    /// Ground supply pin
    Ground = 7,
    /// VCC supply pin
    Vcc = 8,
}

impl LogicState {
    /// Symbols in code order, as printed in test reports
    pub const SYMBOLS: &'static [u8; 9] = b"01LHCZXGV";

    /// Parse a vector symbol
    pub fn from_char(c: char) -> Option<Self> {
        Some(match c.to_ascii_uppercase() {
            '0' => LogicState::Zero,
            '1' => LogicState::One,
            'L' => LogicState::Low,
            'H' => LogicState::High,
            'C' => LogicState::Clock,
            'Z' => LogicState::HighZ,
            'X' => LogicState::DontCare,
            'G' => LogicState::Ground,
            'V' => LogicState::Vcc,
            _ => return None,
        })
    }

    /// Parse a raw firmware code
    pub fn from_code(code: u8) -> Option<Self> {
        Self::SYMBOLS
            .get(code as usize)
            .and_then(|&c| Self::from_char(c as char))
    }

    /// Symbol character
    pub fn symbol(self) -> char {
        Self::SYMBOLS[self as usize] as char
    }
}

/// One row of expected per-pin symbols
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TestVector(pub Vec<LogicState>);

impl TestVector {
    /// Symbols of this row
    pub fn pins(&self) -> &[LogicState] {
        &self.0
    }
}

impl std::str::FromStr for TestVector {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        s.chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| LogicState::from_char(c).ok_or_else(|| format!("invalid vector symbol '{}'", c)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(TestVector)
    }
}

impl TryFrom<String> for TestVector {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, String> {
        s.parse()
    }
}

impl From<TestVector> for String {
    fn from(v: TestVector) -> String {
        v.0.iter().map(|s| s.symbol()).collect()
    }
}

/// Packed programming voltages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Voltages {
    /// Raw packed word as stored in the device database
    pub raw: u32,
    /// VCC selector nibble
    pub vcc: u8,
    /// VPP selector nibble
    pub vpp: u8,
}

/// Package details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Package {
    /// Number of package pins
    pub pin_count: u8,
    /// Packed package code forwarded to the firmware
    pub packed_package: u32,
}

/// Device flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceFlags {
    /// Raw flag word forwarded in the begin frame
    pub raw: u32,
    /// Device is driven through the bit-bang backend
    pub custom_protocol: bool,
}

/// Immutable description of a target chip
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceDescriptor {
    /// Display name
    pub name: String,
    /// Programming algorithm id
    pub protocol_id: u8,
    /// Algorithm variant
    pub variant: u16,
    /// Packed voltages
    pub voltages: Voltages,
    /// Chip info byte
    pub chip_info: u8,
    /// Pin map byte
    pub pin_map: u8,
    /// Code memory size in bytes
    pub code_memory_size: u32,
    /// Data memory size in bytes
    pub data_memory_size: u16,
    /// Secondary data memory size in bytes
    pub data_memory2_size: u16,
    /// Page size in bytes
    pub page_size: u16,
    /// Programming pulse delay
    pub pulse_delay: u16,
    /// Package details
    pub package: Package,
    /// Number of significant chip-ID bytes
    pub chip_id_bytes_count: u8,
    /// Expected chip ID
    pub chip_id: u32,
    /// Read chunk size
    pub read_buffer_size: u16,
    /// Write chunk size; every write-block payload has this length
    pub write_buffer_size: u16,
    /// Flag bits
    pub flags: DeviceFlags,
    /// Number of declared fuses, if the device has a fuse table
    pub fuse_count: Option<u8>,
    /// Logic test vectors, one row per test step
    pub vectors: Vec<TestVector>,
}

impl DeviceDescriptor {
    /// Number of pins in each test vector row
    pub fn pin_count(&self) -> usize {
        self.package.pin_count as usize
    }

    /// Whether this device can run the logic IC test
    pub fn is_logic_ic(&self) -> bool {
        !self.vectors.is_empty()
    }

    /// Check that every vector row covers every package pin
    pub fn validate_vectors(&self) -> Result<()> {
        let pins = self.pin_count();
        for (n, row) in self.vectors.iter().enumerate() {
            if row.0.len() != pins {
                return Err(Error::Protocol(format!(
                    "vector {} has {} pins, package has {}",
                    n,
                    row.0.len(),
                    pins
                )));
            }
        }
        Ok(())
    }
}
