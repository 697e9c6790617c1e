//! Chip identity commands

use minipro_core::{DeviceDescriptor, Handle, Transport};

/// Run the chip-id command
pub fn run_chip_id<T: Transport>(
    handle: &mut Handle<T>,
    device: &DeviceDescriptor,
    icsp: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = handle.begin(device, icsp)?;
    let result = session.get_chip_id();
    let chip = session.finish(result)?;

    println!("Chip ID type {}: 0x{:08X}", chip.id_type, chip.id);
    if device.chip_id_bytes_count == 0 {
        println!("{} declares no chip ID", device.name);
    } else if chip.id == device.chip_id {
        println!("Chip ID matches {}", device.name);
    } else {
        return Err(format!(
            "Chip ID mismatch: expected 0x{:08X}, got 0x{:08X}",
            device.chip_id, chip.id
        )
        .into());
    }
    Ok(())
}

/// Run the autodetect command
pub fn run_autodetect<T: Transport>(
    handle: &mut Handle<T>,
    probe: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    let id = handle.spi_autodetect(probe)?;
    if id == 0 || id == 0xFF_FFFF {
        return Err("No serial flash detected".into());
    }
    println!("JEDEC ID: {:02X} {:04X}", id >> 16, id & 0xFFFF);
    Ok(())
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use minipro_core::ProgrammerFamily;
    use minipro_dummy::{DummyConfig, DummyProgrammer};

    fn handle(config: DummyConfig) -> Handle<DummyProgrammer> {
        Handle::open(DummyProgrammer::new(config), ProgrammerFamily::T48).unwrap()
    }

    #[test]
    fn test_chip_id_match_and_mismatch() {
        let mut dev = DeviceDescriptor {
            name: "ATmega328P".to_string(),
            protocol_id: 0x17,
            chip_id_bytes_count: 3,
            chip_id: 0x1E950F,
            ..Default::default()
        };
        let mut h = handle(DummyConfig::default());
        run_chip_id(&mut h, &dev, false).unwrap();

        dev.chip_id = 0x1E9514;
        assert!(run_chip_id(&mut h, &dev, false).is_err());
    }

    #[test]
    fn test_autodetect() {
        let mut h = handle(DummyConfig::default());
        run_autodetect(&mut h, 0).unwrap();

        let mut h = handle(DummyConfig {
            autodetect_id: 0,
            ..Default::default()
        });
        assert!(run_autodetect(&mut h, 0).is_err());
    }
}
