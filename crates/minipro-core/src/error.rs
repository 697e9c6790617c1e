//! Error types for minipro-core
//!
//! The failure kinds are flat: every operation either succeeds
//! or stops at the first failing step and reports which step failed.

use thiserror::Error;

use crate::status::DeviceMode;

/// Reasons a firmware image is rejected before any device I/O
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    /// File is smaller than the header or larger than the accepted maximum
    #[error("file size {0} is outside the accepted range")]
    FileSize(u64),
    /// Version word does not carry the family magic in its high half
    #[error("file version 0x{found:08X} does not match family magic 0x{expected:08X}")]
    Version {
        /// Magic expected in the high 16 bits
        expected: u32,
        /// Version word found in the header
        found: u32,
    },
    /// Declared block count does not match the file length
    #[error("{blocks} blocks declared but file is {size} bytes")]
    BlockCount {
        /// Block count from the header
        blocks: u32,
        /// Actual file size
        size: u64,
    },
    /// Payload checksum does not match the header
    #[error("CRC mismatch: header 0x{expected:08X}, computed 0x{actual:08X}")]
    Crc {
        /// CRC stored in the header
        expected: u32,
        /// CRC computed over the payload
        actual: u32,
    },
}

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Send or receive on the transport failed
    #[error("transport error: {0}")]
    Transport(String),

    /// The programmer reported overcurrent right after the begin frame
    #[error("overcurrent protection tripped")]
    Overcurrent,

    /// A block or fuse type the requested operation cannot handle
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Malformed firmware image
    #[error("invalid firmware image: {0}")]
    Validation(#[from] ImageError),

    /// A step's ack/status byte was nonzero
    #[error("{step} failed (device code {code})")]
    DeviceAck {
        /// Name of the failed step
        step: &'static str,
        /// Raw ack byte returned by the device
        code: u8,
    },

    /// Device did not come back in the expected operating mode
    #[error("device reports {actual} mode, expected {expected} mode")]
    UnexpectedMode {
        /// Mode the sequence required
        expected: DeviceMode,
        /// Mode the device reported
        actual: DeviceMode,
    },

    /// FPGA algorithm could not be resolved or uploaded
    #[error("bitstream error: {0}")]
    Bitstream(String),

    /// Operation not available for this programmer family or backend
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// User declined a destructive operation
    #[error("aborted by user")]
    Aborted,

    /// Local file I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using the core Error type
pub type Result<T> = std::result::Result<T, Error>;
