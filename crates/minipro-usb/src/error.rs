//! Error types for the USB transport

use thiserror::Error;

use crate::location::UsbLocation;

/// Result type for USB transport operations
pub type Result<T> = std::result::Result<T, UsbError>;

/// Errors that can occur talking to the programmer over USB
#[derive(Debug, Error)]
pub enum UsbError {
    /// Nothing is attached at the requested location
    #[error("no USB device at {0}")]
    NotFound(UsbLocation),
    /// Location string could not be parsed
    #[error("invalid USB location: {0}")]
    InvalidLocation(String),
    /// Failed to open the device
    #[error("failed to open device: {0}")]
    OpenFailed(String),
    /// Failed to claim the interface
    #[error("failed to claim interface: {0}")]
    ClaimFailed(String),
    /// Bulk transfer failed
    #[error("USB transfer failed: {0}")]
    TransferFailed(String),
    /// Device returned fewer bytes than requested
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Requested length
        expected: usize,
        /// Received length
        actual: usize,
    },
    /// Device did not come back after a reset
    #[error("device at {0} did not re-enumerate after reset")]
    ReopenTimeout(UsbLocation),
}

impl From<nusb::Error> for UsbError {
    fn from(e: nusb::Error) -> Self {
        UsbError::TransferFailed(e.to_string())
    }
}

impl From<UsbError> for minipro_core::Error {
    fn from(e: UsbError) -> Self {
        minipro_core::Error::Transport(e.to_string())
    }
}
