//! Open device sessions

use crate::backend::TransactionBackend;
use crate::chip_id::ChipId;
use crate::descriptor::{DeviceDescriptor, MemoryType};
use crate::erase;
use crate::error::Result;
use crate::logic::{self, TestResult};
use crate::status::{self, Status};
use crate::transport::Transport;

/// A device powered up between a begin and an end frame
///
/// Created by [`crate::Handle::begin`]. Dropping an open session sends the
/// end frame on a best-effort basis; call [`Session::end`] or
/// [`Session::finish`] to observe the outcome.
pub struct Session<'a> {
    transport: &'a mut dyn Transport,
    backend: &'a mut dyn TransactionBackend,
    device: &'a DeviceDescriptor,
    open: bool,
}

impl<'a> Session<'a> {
    pub(crate) fn new(
        transport: &'a mut dyn Transport,
        backend: &'a mut dyn TransactionBackend,
        device: &'a DeviceDescriptor,
    ) -> Self {
        Self {
            transport,
            backend,
            device,
            open: true,
        }
    }

    /// Device this session was opened for
    pub fn device(&self) -> &DeviceDescriptor {
        self.device
    }

    /// Name of the backend driving this session
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn read_block(&mut self, kind: MemoryType, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.backend
            .read_block(self.transport, self.device, kind, addr, buf)
    }

    pub fn write_block(&mut self, kind: MemoryType, addr: u32, data: &[u8]) -> Result<()> {
        self.backend
            .write_block(self.transport, self.device, kind, addr, data)
    }

    pub fn read_fuses(&mut self, kind: MemoryType, items_count: u8, buf: &mut [u8]) -> Result<()> {
        self.backend
            .read_fuses(self.transport, self.device, kind, items_count, buf)
    }

    pub fn write_fuses(
        &mut self,
        kind: MemoryType,
        items_count: u8,
        data: Option<&[u8]>,
    ) -> Result<()> {
        self.backend
            .write_fuses(self.transport, self.device, kind, items_count, data)
    }

    pub fn get_chip_id(&mut self) -> Result<ChipId> {
        self.backend.get_chip_id(self.transport, self.device)
    }

    pub fn spi_autodetect(&mut self, probe: u8) -> Result<u32> {
        self.backend.spi_autodetect(self.transport, probe)
    }

    pub fn erase(&mut self) -> Result<()> {
        self.backend.erase(self.transport, self.device)
    }

    pub fn write_jedec_row(&mut self, data: &[u8], row: u8, flags: u8, size_bits: u8) -> Result<()> {
        self.backend
            .write_jedec_row(self.transport, self.device, data, row, flags, size_bits)
    }

    pub fn read_jedec_row(
        &mut self,
        buf: &mut [u8],
        row: u8,
        flags: u8,
        size_bits: u8,
    ) -> Result<()> {
        self.backend
            .read_jedec_row(self.transport, self.device, buf, row, flags, size_bits)
    }

    /// Verify-while-writing status and overcurrent state
    ///
    /// Bit-bang devices only report overcurrent; the verify fields stay zero.
    pub fn status(&mut self) -> Result<Status> {
        let status = status::get_status(self.transport)?;
        if self.device.flags.custom_protocol {
            return Ok(Status {
                overcurrent: status.overcurrent,
                ..Default::default()
            });
        }
        Ok(status)
    }

    pub fn protect_off(&mut self) -> Result<()> {
        erase::protect_off(self.transport)
    }

    pub fn protect_on(&mut self) -> Result<()> {
        erase::protect_on(self.transport)
    }

    /// Run the two-pass logic IC test
    pub fn logic_test(&mut self) -> Result<TestResult> {
        logic::run_logic_test(self.transport, self.device)
    }

    /// Send the end frame
    pub fn end(mut self) -> Result<()> {
        self.close()
    }

    /// End the session and hand back `result`
    ///
    /// A failing end frame is logged but never replaces `result`.
    pub fn finish<R>(mut self, result: Result<R>) -> Result<R> {
        if let Err(e) = self.close() {
            log::warn!("Failed to end transaction: {}", e);
        }
        result
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.backend.end_transaction(self.transport, self.device)
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to end transaction: {}", e);
        }
    }
}
