//! Programmer information

use minipro_core::{DeviceMode, Handle, Transport};

/// Run the info command
pub fn run_info<T: Transport>(handle: &Handle<T>) -> Result<(), Box<dyn std::error::Error>> {
    let info = handle.info();

    println!("Programmer Information");
    println!("======================");
    println!();
    println!("Family:          {}", handle.family());
    println!("Mode:            {}", info.mode);
    println!("Firmware:        {}", info.firmware_string());
    println!("Model:           {}", info.model);
    println!("Device code:     {}", info.device_code);
    println!("Serial:          {}", info.serial);

    if info.mode == DeviceMode::Bootloader {
        println!();
        println!("The programmer is in bootloader mode; run update-firmware to recover it.");
    }
    if let Some((expected, name)) = handle.family().expected_firmware() {
        if info.firmware != expected {
            println!();
            println!("Expected firmware {} for this programmer.", name);
        }
    }
    Ok(())
}
