//! minipro-usb - USB transport for T48/T56 programmers
//!
//! Opens a programmer by its physical location (bus id and hub port chain)
//! and implements [`minipro_core::Transport`] over its bulk endpoints.
//! There is no vendor/product matching: the caller says where the
//! programmer is plugged in.
//!
//! # Example
//!
//! ```no_run
//! use minipro_core::{Handle, ProgrammerFamily};
//! use minipro_usb::{UsbLocation, UsbTransport};
//!
//! let location = UsbLocation::parse("1", "4.2")?;
//! let transport = UsbTransport::open(location)?;
//! let handle = Handle::open(transport, ProgrammerFamily::T48)?;
//! println!("firmware {}", handle.info().firmware_string());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod device;
mod error;
mod location;

pub use device::UsbTransport;
pub use error::{Result, UsbError};
pub use location::UsbLocation;
