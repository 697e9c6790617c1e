//! FPGA algorithm bitstreams
//!
//! T56 programmers implement each programming algorithm as an FPGA
//! configuration. The right bitstream has to be uploaded before the begin
//! frame; it stays loaded until the programmer is reset.

use crate::descriptor::DeviceDescriptor;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::{bitstream as f, Command, HEADER_LEN};
use crate::transport::{send_frame, Transport};

/// Algorithm base names, indexed by `protocol_id - 1`
///
/// Names never end in a hex digit pair, so `base + variant` is unambiguous.
pub const ALGORITHM_NAMES: &[&str] = &[
    "IIC24S", "MW93ALG", "SPI25FLASH", "AT45DATAFLASH", "F29EEP", "W29F32P", "ROM28P", "ROM32P",
    "ROM40P", "R28TO32P", "ROM24P", "ROM44P", "EE28C32P", "RAM32P", "SPI25QIO", "SPI25NOR",
    "SPI25DTR", "SPI25OPI", "PIC16CX", "PIC18FX", "AT89CX", "AT89P20P", "AVRISP", "AVR28P",
    "AVR40P", "ATTINYISP", "GAL16V", "GAL20V", "GAL22V", "LOGIC", "NANDFLASH", "EMMC", "VGA",
    "CPLDJTAG",
];

/// Supplies algorithm bitstreams by name
pub trait AlgorithmSource {
    /// Return the bitstream for `name`
    fn algorithm(&self, name: &str) -> Result<Vec<u8>>;
}

impl<F> AlgorithmSource for F
where
    F: Fn(&str) -> Result<Vec<u8>>,
{
    fn algorithm(&self, name: &str) -> Result<Vec<u8>> {
        self(name)
    }
}

/// Name of the algorithm `device` needs, e.g. `SPI25FLASH` + `11`
pub fn algorithm_name(device: &DeviceDescriptor) -> Result<String> {
    let base = (device.protocol_id as usize)
        .checked_sub(1)
        .and_then(|i| ALGORITHM_NAMES.get(i))
        .ok_or_else(|| {
            Error::Bitstream(format!(
                "no algorithm for protocol id 0x{:02X}",
                device.protocol_id
            ))
        })?;
    Ok(format!("{}{:02X}", base, (device.variant >> 8) & 0xFF))
}

/// Upload a bitstream: 8-byte header on the message channel, raw bytes on
/// the payload channel
pub fn upload(transport: &mut dyn Transport, bitstream: &[u8]) -> Result<()> {
    let len = u32::try_from(bitstream.len())
        .map_err(|_| Error::Bitstream(format!("bitstream too large ({} bytes)", bitstream.len())))?;
    let msg = Message::<HEADER_LEN>::new(Command::WriteBitstream as u8).with(f::LENGTH, len.into());
    send_frame(transport, msg.as_bytes())?;
    transport.write_payload(bitstream)
}

/// Resolve and upload the algorithm for `device` unless already loaded
///
/// `loaded` is set only after a successful upload.
pub fn ensure_loaded(
    transport: &mut dyn Transport,
    source: Option<&dyn AlgorithmSource>,
    device: &DeviceDescriptor,
    loaded: &mut bool,
) -> Result<()> {
    if *loaded {
        log::debug!("Algorithm bitstream already loaded");
        return Ok(());
    }

    let name = algorithm_name(device)?;
    let source = source
        .ok_or_else(|| Error::Bitstream(format!("no algorithm source for {}", name)))?;
    let bits = source
        .algorithm(&name)
        .map_err(|e| Error::Bitstream(format!("{}: {}", name, e)))?;

    log::info!("Uploading algorithm {} ({} bytes)", name, bits.len());
    upload(transport, &bits).map_err(|e| Error::Bitstream(format!("{}: {}", name, e)))?;
    *loaded = true;
    Ok(())
}
