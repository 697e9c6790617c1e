//! Fuse group commands

use minipro_core::{DeviceDescriptor, Handle, MemoryType, Transport};

use super::hex_string;

/// Parse a hex byte string such as "ff7f" or "FF 7F"
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(format!("Odd number of hex digits in '{}'", s));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let text: String = pair.iter().collect();
            u8::from_str_radix(&text, 16).map_err(|e| format!("Invalid hex byte '{}': {}", text, e))
        })
        .collect()
}

/// Run the read-fuses command
pub fn run_read_fuses<T: Transport>(
    handle: &mut Handle<T>,
    device: &DeviceDescriptor,
    icsp: bool,
    kind: MemoryType,
    count: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut buf = vec![0u8; count as usize];

    let mut session = handle.begin(device, icsp)?;
    let result = session.read_fuses(kind, count, &mut buf);
    session.finish(result)?;

    println!("{}: {}", kind, hex_string(&buf));
    Ok(())
}

/// Run the write-fuses command
///
/// Without `data` only the bare opcode frame is sent.
pub fn run_write_fuses<T: Transport>(
    handle: &mut Handle<T>,
    device: &DeviceDescriptor,
    icsp: bool,
    kind: MemoryType,
    count: u8,
    data: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = data.map(parse_hex_bytes).transpose()?;

    let mut session = handle.begin(device, icsp)?;
    let result = session.write_fuses(kind, count, bytes.as_deref());
    session.finish(result)?;

    match bytes {
        Some(bytes) => println!("Wrote {}: {}", kind, hex_string(&bytes)),
        None => println!("Sent empty {} frame", kind),
    }
    Ok(())
}
