//! minipro-core - Protocol core for T48/T56 universal programmers
//!
//! This crate turns a [`DeviceDescriptor`] and a requested operation into
//! the byte frames the programmer firmware expects, and interprets its
//! replies. It performs no I/O of its own: everything goes through a
//! [`Transport`] supplied by the caller (see `minipro-usb` for the USB
//! implementation and `minipro-dummy` for an emulator).
//!
//! ```ignore
//! let mut handle = Handle::open(transport, ProgrammerFamily::T48)?;
//! let mut session = handle.begin(&device, false)?;
//! let mut buf = vec![0u8; 256];
//! let result = session.read_block(MemoryType::Code, 0, &mut buf);
//! session.finish(result)?;
//! ```

pub mod backend;
pub mod bitstream;
pub mod block;
pub mod chip_id;
pub mod descriptor;
pub mod erase;
pub mod error;
pub mod family;
pub mod firmware;
pub mod fuse;
pub mod handle;
pub mod jedec;
pub mod logic;
pub mod message;
pub mod protocol;
pub mod session;
pub mod status;
pub mod transaction;
pub mod transport;

#[cfg(test)]
mod mock;

pub use backend::{NativeProtocol, TransactionBackend};
pub use bitstream::AlgorithmSource;
pub use chip_id::ChipId;
pub use descriptor::{DeviceDescriptor, LogicState, MemoryType, TestVector};
pub use error::{Error, ImageError, Result};
pub use family::ProgrammerFamily;
pub use firmware::{FirmwareImage, FirmwareUpdater, UpdateProgress, UpdateStage, UpdateSummary};
pub use handle::Handle;
pub use logic::TestResult;
pub use session::Session;
pub use status::{DeviceMode, Status, SystemInfo};
pub use transport::Transport;
