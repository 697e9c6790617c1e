//! Transaction backends
//!
//! Every device is driven through one [`TransactionBackend`]. Most devices
//! use [`NativeProtocol`], which speaks the programmer's binary command set.
//! Devices flagged `custom_protocol` are driven by a bit-bang backend that
//! toggles the programmer's pin drivers directly; that backend lives outside
//! this crate and is registered on the [`crate::Handle`].
//!
//! The backend is chosen once when a session begins and every call in that
//! session goes to it.

use crate::block;
use crate::chip_id::{self, ChipId};
use crate::descriptor::{DeviceDescriptor, MemoryType};
use crate::erase;
use crate::error::Result;
use crate::family::ProgrammerFamily;
use crate::fuse;
use crate::jedec;
use crate::transaction;
use crate::transport::Transport;

/// Per-session device operations
///
/// Each method receives the transport of the owning handle and the device
/// the session was opened for. Implementations keep the same logical
/// contract as the native command set; only the wire encoding differs.
pub trait TransactionBackend {
    /// Short name used in log messages
    fn name(&self) -> &'static str;

    /// Power up the target and configure the programmer for `device`
    ///
    /// The overcurrent check that follows is done by the caller.
    fn begin_transaction(
        &mut self,
        transport: &mut dyn Transport,
        device: &DeviceDescriptor,
        icsp: bool,
    ) -> Result<()>;

    /// Power down the target
    fn end_transaction(
        &mut self,
        transport: &mut dyn Transport,
        device: &DeviceDescriptor,
    ) -> Result<()>;

    /// Read `buf.len()` bytes of `kind` memory at `addr`
    fn read_block(
        &mut self,
        transport: &mut dyn Transport,
        device: &DeviceDescriptor,
        kind: MemoryType,
        addr: u32,
        buf: &mut [u8],
    ) -> Result<()>;

    /// Write one block of `kind` memory at `addr`
    fn write_block(
        &mut self,
        transport: &mut dyn Transport,
        device: &DeviceDescriptor,
        kind: MemoryType,
        addr: u32,
        data: &[u8],
    ) -> Result<()>;

    /// Read `buf.len()` bytes of a fuse group
    fn read_fuses(
        &mut self,
        transport: &mut dyn Transport,
        device: &DeviceDescriptor,
        kind: MemoryType,
        items_count: u8,
        buf: &mut [u8],
    ) -> Result<()>;

    /// Write a fuse group, or send the bare command when `data` is `None`
    fn write_fuses(
        &mut self,
        transport: &mut dyn Transport,
        device: &DeviceDescriptor,
        kind: MemoryType,
        items_count: u8,
        data: Option<&[u8]>,
    ) -> Result<()>;

    /// Read the chip identity
    fn get_chip_id(
        &mut self,
        transport: &mut dyn Transport,
        device: &DeviceDescriptor,
    ) -> Result<ChipId>;

    /// Probe for a serial flash and return its 3-byte ID
    fn spi_autodetect(&mut self, transport: &mut dyn Transport, probe: u8) -> Result<u32>;

    /// Erase the whole chip
    fn erase(&mut self, transport: &mut dyn Transport, device: &DeviceDescriptor) -> Result<()>;

    /// Write one JEDEC fuse row
    fn write_jedec_row(
        &mut self,
        transport: &mut dyn Transport,
        device: &DeviceDescriptor,
        data: &[u8],
        row: u8,
        flags: u8,
        size_bits: u8,
    ) -> Result<()>;

    /// Read one JEDEC fuse row
    fn read_jedec_row(
        &mut self,
        transport: &mut dyn Transport,
        device: &DeviceDescriptor,
        buf: &mut [u8],
        row: u8,
        flags: u8,
        size_bits: u8,
    ) -> Result<()>;
}

/// The programmer's native binary command set
#[derive(Debug, Clone, Copy)]
pub struct NativeProtocol {
    family: ProgrammerFamily,
}

impl NativeProtocol {
    /// Native backend for a programmer of `family`
    pub fn new(family: ProgrammerFamily) -> Self {
        Self { family }
    }
}

impl TransactionBackend for NativeProtocol {
    fn name(&self) -> &'static str {
        "native"
    }

    fn begin_transaction(
        &mut self,
        transport: &mut dyn Transport,
        device: &DeviceDescriptor,
        icsp: bool,
    ) -> Result<()> {
        transaction::begin_transaction(transport, device, icsp)
    }

    fn end_transaction(
        &mut self,
        transport: &mut dyn Transport,
        _device: &DeviceDescriptor,
    ) -> Result<()> {
        transaction::end_transaction(transport)
    }

    fn read_block(
        &mut self,
        transport: &mut dyn Transport,
        _device: &DeviceDescriptor,
        kind: MemoryType,
        addr: u32,
        buf: &mut [u8],
    ) -> Result<()> {
        block::read_block(transport, kind, addr, buf)
    }

    fn write_block(
        &mut self,
        transport: &mut dyn Transport,
        device: &DeviceDescriptor,
        kind: MemoryType,
        addr: u32,
        data: &[u8],
    ) -> Result<()> {
        block::write_block(transport, device, kind, addr, data)
    }

    fn read_fuses(
        &mut self,
        transport: &mut dyn Transport,
        device: &DeviceDescriptor,
        kind: MemoryType,
        items_count: u8,
        buf: &mut [u8],
    ) -> Result<()> {
        fuse::read_fuses(transport, device, kind, items_count, buf)
    }

    fn write_fuses(
        &mut self,
        transport: &mut dyn Transport,
        device: &DeviceDescriptor,
        kind: MemoryType,
        items_count: u8,
        data: Option<&[u8]>,
    ) -> Result<()> {
        fuse::write_fuses(transport, device, kind, items_count, data)
    }

    fn get_chip_id(
        &mut self,
        transport: &mut dyn Transport,
        device: &DeviceDescriptor,
    ) -> Result<ChipId> {
        chip_id::get_chip_id(transport, self.family, device)
    }

    fn spi_autodetect(&mut self, transport: &mut dyn Transport, probe: u8) -> Result<u32> {
        chip_id::spi_autodetect(transport, probe)
    }

    fn erase(&mut self, transport: &mut dyn Transport, device: &DeviceDescriptor) -> Result<()> {
        erase::erase(transport, device)
    }

    fn write_jedec_row(
        &mut self,
        transport: &mut dyn Transport,
        device: &DeviceDescriptor,
        data: &[u8],
        row: u8,
        flags: u8,
        size_bits: u8,
    ) -> Result<()> {
        jedec::write_jedec_row(transport, device, data, row, flags, size_bits)
    }

    fn read_jedec_row(
        &mut self,
        transport: &mut dyn Transport,
        device: &DeviceDescriptor,
        buf: &mut [u8],
        row: u8,
        flags: u8,
        size_bits: u8,
    ) -> Result<()> {
        jedec::read_jedec_row(transport, device, buf, row, flags, size_bits)
    }
}
