//! Native begin/end transaction frames

use crate::descriptor::DeviceDescriptor;
use crate::error::Result;
use crate::message::Message;
use crate::protocol::{begin as f, Command, FRAME_LEN, HEADER_LEN};
use crate::transport::{send_frame, Transport};

/// Voltage bytes 20..=22 of the begin frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoltageEncoding {
    /// Byte 20: third byte of the raw word
    pub select: u8,
    /// Byte 21: low nibble of the raw word (zero for the special family)
    pub low: u8,
    /// Byte 22: high nibble, full low byte, or override
    pub high: u8,
}

/// Re-encode the packed voltage word for the begin frame
///
/// When the high nibble of the low byte is 0xF the device belongs to the
/// "special" voltage family and the whole low byte goes into byte 22.
/// Otherwise the low byte is split into its two nibbles. If bit 31 is set,
/// byte 22 is overridden with bits 16..20.
pub fn encode_voltages(raw: u32) -> VoltageEncoding {
    let mut enc = VoltageEncoding {
        select: (raw >> 16) as u8,
        ..Default::default()
    };

    if raw & 0xF0 == 0xF0 {
        enc.high = raw as u8;
    } else {
        enc.low = (raw as u8) & 0x0F;
        enc.high = (raw as u8) & 0xF0;
    }
    if raw & 0x8000_0000 != 0 {
        enc.high = ((raw >> 16) & 0x0F) as u8;
    }
    enc
}

/// Build the 64-byte begin-transaction frame
pub fn begin_frame(device: &DeviceDescriptor, icsp: bool) -> Message<FRAME_LEN> {
    let raw = device.voltages.raw;
    let volts = encode_voltages(raw);

    let mut msg = Message::<FRAME_LEN>::new(Command::BeginTrans as u8);
    msg.set(f::PROTOCOL_ID, device.protocol_id.into())
        .set(f::VARIANT, device.variant.into())
        .set(f::ICSP, icsp.into())
        .set(f::VOLTAGES, raw.into())
        .set(f::CHIP_INFO, device.chip_info.into())
        .set(f::PIN_MAP, device.pin_map.into())
        .set(f::DATA_MEMORY_SIZE, device.data_memory_size.into())
        .set(f::PAGE_SIZE, device.page_size.into())
        .set(f::PULSE_DELAY, device.pulse_delay.into())
        .set(f::DATA_MEMORY2_SIZE, device.data_memory2_size.into())
        .set(f::CODE_MEMORY_SIZE, device.code_memory_size.into())
        .set(f::VOLTAGE_SELECT, volts.select.into())
        .set(f::VOLTAGE_LOW, volts.low.into())
        .set(f::VOLTAGE_HIGH, volts.high.into())
        .set(f::PACKED_PACKAGE, device.package.packed_package.into())
        .set(f::READ_BUFFER_SIZE, device.read_buffer_size.into())
        .set(f::FLAGS, device.flags.raw.into());
    msg
}

/// Send the begin-transaction frame
pub fn begin_transaction(
    transport: &mut dyn Transport,
    device: &DeviceDescriptor,
    icsp: bool,
) -> Result<()> {
    log::debug!(
        "Begin transaction: protocol 0x{:02X}, variant 0x{:04X}, icsp={}",
        device.protocol_id,
        device.variant,
        icsp
    );
    send_frame(transport, begin_frame(device, icsp).as_bytes())
}

/// Send the end-of-transaction frame
pub fn end_transaction(transport: &mut dyn Transport) -> Result<()> {
    let msg = Message::<HEADER_LEN>::new(Command::EndTrans as u8);
    send_frame(transport, msg.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DeviceFlags, Package, Voltages};

    fn device() -> DeviceDescriptor {
        DeviceDescriptor {
            name: "AT28C256".into(),
            protocol_id: 0x21,
            variant: 0x1234,
            voltages: Voltages {
                raw: 0x0004_0035,
                vcc: 3,
                vpp: 5,
            },
            chip_info: 0x41,
            pin_map: 0x7A,
            code_memory_size: 0x8000,
            data_memory_size: 0x0100,
            data_memory2_size: 0x0020,
            page_size: 0x40,
            pulse_delay: 0x00C8,
            package: Package {
                pin_count: 28,
                packed_package: 0xFF00_1C00,
            },
            read_buffer_size: 0x200,
            write_buffer_size: 0x40,
            flags: DeviceFlags {
                raw: 0x0000_A001,
                custom_protocol: false,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_begin_frame_layout() {
        let msg = begin_frame(&device(), true);
        let b = msg.as_bytes();
        assert_eq!(b.len(), 64);
        assert_eq!(&b[0..8], &[0x03, 0x21, 0x34, 0x01, 0x35, 0x00, 0x41, 0x7A]);
        assert_eq!(&b[8..16], &[0x00, 0x01, 0x40, 0x00, 0xC8, 0x00, 0x20, 0x00]);
        assert_eq!(&b[16..20], &[0x00, 0x80, 0x00, 0x00]);
        assert_eq!(&b[20..23], &[0x04, 0x05, 0x30]);
        assert_eq!(&b[40..44], &[0x00, 0x1C, 0x00, 0xFF]);
        assert_eq!(&b[44..46], &[0x00, 0x02]);
        assert_eq!(&b[56..60], &[0x01, 0xA0, 0x00, 0x00]);
        assert!(b[23..40].iter().all(|&x| x == 0));
    }

    #[test]
    fn test_voltage_special_family_uses_low_byte() {
        let enc = encode_voltages(0x0000_00F5);
        assert_eq!(enc.high, 0xF5);
        assert_eq!(enc.low, 0);

        let enc = encode_voltages(0x0003_00FF);
        assert_eq!(enc.select, 0x03);
        assert_eq!(enc.high, 0xFF);
    }

    #[test]
    fn test_voltage_nibble_split() {
        let enc = encode_voltages(0x0002_0063);
        assert_eq!(enc.select, 0x02);
        assert_eq!(enc.low, 0x03);
        assert_eq!(enc.high, 0x60);
    }

    #[test]
    fn test_voltage_top_bit_override() {
        let enc = encode_voltages(0x8007_0063);
        assert_eq!(enc.low, 0x03);
        assert_eq!(enc.high, 0x07);

        let enc = encode_voltages(0x800A_00F1);
        assert_eq!(enc.high, 0x0A);
    }

    #[test]
    fn test_end_frame() {
        let mut t = crate::mock::MockTransport::new();
        end_transaction(&mut t).unwrap();
        assert_eq!(t.sent(), vec![&[0x04, 0, 0, 0, 0, 0, 0, 0][..]]);
    }
}
