//! Read, write and erase commands

use std::fs;
use std::path::Path;

use minipro_core::{DeviceDescriptor, Handle, MemoryType, Session, Status, Transport};

use super::{byte_bar, spinner};
use crate::device::region_size;

/// Chunk size used when the descriptor leaves the buffer size at zero
const DEFAULT_CHUNK_SIZE: usize = 64;

fn chunk_size(declared: u16) -> usize {
    match declared {
        0 => DEFAULT_CHUNK_SIZE,
        n => n as usize,
    }
}

/// Read `len` bytes of `kind` memory starting at address 0
pub fn read_memory(
    session: &mut Session<'_>,
    kind: MemoryType,
    len: usize,
) -> minipro_core::Result<Vec<u8>> {
    let chunk = chunk_size(session.device().read_buffer_size);
    let mut data = vec![0u8; len];

    let pb = byte_bar(len as u64, "Reading");
    let mut offset = 0usize;
    while offset < len {
        let n = chunk.min(len - offset);
        session.read_block(kind, offset as u32, &mut data[offset..offset + n])?;
        offset += n;
        pb.set_position(offset as u64);
    }
    pb.finish_with_message("Read complete");
    Ok(data)
}

/// Write `data` to `kind` memory starting at address 0
///
/// Returns the programmer status taken right after the last block.
pub fn write_memory(
    session: &mut Session<'_>,
    kind: MemoryType,
    data: &[u8],
) -> minipro_core::Result<Status> {
    let chunk = chunk_size(session.device().write_buffer_size);

    let pb = byte_bar(data.len() as u64, "Writing");
    for (i, block) in data.chunks(chunk).enumerate() {
        session.write_block(kind, (i * chunk) as u32, block)?;
        pb.set_position((i * chunk + block.len()) as u64);
    }
    pb.finish_with_message("Write complete");
    session.status()
}

/// Unprotect, optionally erase, write, reprotect and read back
fn program(
    session: &mut Session<'_>,
    kind: MemoryType,
    data: &[u8],
    verify: bool,
    erase: bool,
) -> minipro_core::Result<(Status, Option<Vec<u8>>)> {
    session.protect_off()?;
    if erase && kind == MemoryType::Code {
        session.erase()?;
    }
    let status = write_memory(session, kind, data)?;
    session.protect_on()?;
    let readback = if verify {
        Some(read_memory(session, kind, data.len())?)
    } else {
        None
    };
    Ok((status, readback))
}

fn memory_len(
    device: &DeviceDescriptor,
    kind: MemoryType,
    length: Option<u32>,
) -> Result<usize, Box<dyn std::error::Error>> {
    match (length, region_size(device, kind)) {
        (Some(len), Some(size)) if len as usize > size => Err(format!(
            "Requested {} bytes but {} memory of {} is {} bytes",
            len, kind, device.name, size
        )
        .into()),
        (Some(len), _) => Ok(len as usize),
        (None, Some(size)) if size > 0 => Ok(size),
        (None, _) => Err(format!("{} has no {} memory size; use --length", device.name, kind).into()),
    }
}

/// Run the read command
pub fn run_read<T: Transport>(
    handle: &mut Handle<T>,
    device: &DeviceDescriptor,
    icsp: bool,
    kind: MemoryType,
    length: Option<u32>,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let len = memory_len(device, kind, length)?;

    let mut session = handle.begin(device, icsp)?;
    let result = read_memory(&mut session, kind, len);
    let data = session.finish(result)?;

    fs::write(output, &data)?;
    println!("Wrote {} bytes to {:?}", data.len(), output);
    Ok(())
}

/// Run the write command
pub fn run_write<T: Transport>(
    handle: &mut Handle<T>,
    device: &DeviceDescriptor,
    icsp: bool,
    kind: MemoryType,
    input: &Path,
    verify: bool,
    erase: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    if data.is_empty() {
        return Err(format!("{:?} is empty", input).into());
    }
    memory_len(device, kind, Some(data.len() as u32))?;

    let mut session = handle.begin(device, icsp)?;
    let result = program(&mut session, kind, &data, verify, erase);
    let (status, readback) = session.finish(result)?;

    if status.error != 0 {
        return Err(format!(
            "Verify-while-writing failed at 0x{:08X}: expected 0x{:04X}, got 0x{:04X}",
            status.address, status.c1, status.c2
        )
        .into());
    }
    if let Some(readback) = readback {
        if let Some(pos) = first_mismatch(&data, &readback) {
            return Err(format!(
                "Verification failed at 0x{:08X}: expected 0x{:02X}, got 0x{:02X}",
                pos, data[pos], readback[pos]
            )
            .into());
        }
        println!("Verified {} bytes", data.len());
    }
    println!("Wrote {} bytes from {:?}", data.len(), input);
    Ok(())
}

/// Run the erase command
pub fn run_erase<T: Transport>(
    handle: &mut Handle<T>,
    device: &DeviceDescriptor,
    icsp: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = handle.begin(device, icsp)?;
    let pb = spinner(format!("Erasing {}...", device.name));
    let result = session.erase();
    session.finish(result)?;
    pb.finish_with_message(format!("Erased {}", device.name));
    Ok(())
}

fn first_mismatch(expected: &[u8], actual: &[u8]) -> Option<usize> {
    expected.iter().zip(actual).position(|(a, b)| a != b)
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::test_util::create_temp_dir;
    use minipro_core::ProgrammerFamily;
    use minipro_dummy::DummyProgrammer;

    fn device() -> DeviceDescriptor {
        DeviceDescriptor {
            name: "AT28C64".to_string(),
            protocol_id: 0x0D,
            code_memory_size: 0x200,
            data_memory_size: 0,
            read_buffer_size: 0x80,
            write_buffer_size: 0x40,
            ..Default::default()
        }
    }

    fn handle() -> Handle<DummyProgrammer> {
        Handle::open(DummyProgrammer::new_default(), ProgrammerFamily::T48).unwrap()
    }

    #[test]
    fn test_memory_len() {
        let dev = device();
        assert_eq!(memory_len(&dev, MemoryType::Code, None).unwrap(), 0x200);
        assert_eq!(memory_len(&dev, MemoryType::Code, Some(0x10)).unwrap(), 0x10);
        assert!(memory_len(&dev, MemoryType::Code, Some(0x201)).is_err());
        assert!(memory_len(&dev, MemoryType::Data, None).is_err());
        assert!(memory_len(&dev, MemoryType::User, None).is_err());
        assert_eq!(memory_len(&dev, MemoryType::User, Some(8)).unwrap(), 8);
    }

    #[test]
    fn test_write_then_read_file() {
        let dir = create_temp_dir("memory-1");
        let input = dir.join("in.bin");
        let output = dir.join("out.bin");
        let data: Vec<u8> = (0..0x150).map(|i| (i * 3) as u8).collect();
        fs::write(&input, &data).unwrap();

        let mut handle = handle();
        let dev = device();
        run_write(&mut handle, &dev, false, MemoryType::Code, &input, true, true).unwrap();
        run_read(&mut handle, &dev, false, MemoryType::Code, None, &output).unwrap();

        let read = fs::read(&output).unwrap();
        assert_eq!(read.len(), 0x200);
        assert_eq!(&read[..0x150], &data[..]);
        assert!(read[0x150..].iter().all(|&b| b == 0xFF));
        let programmer = handle.into_transport();
        assert!(!programmer.in_transaction());
        assert!(programmer.is_protected());
    }

    #[test]
    fn test_write_rejects_oversized_file() {
        let dir = create_temp_dir("memory-2");
        let input = dir.join("big.bin");
        fs::write(&input, vec![0u8; 0x201]).unwrap();

        let mut handle = handle();
        let result = run_write(&mut handle, &device(), false, MemoryType::Code, &input, true, true);
        assert!(result.is_err());
        // Rejected before any session was opened
        assert!(!handle.into_transport().commands().contains(&0x03));
    }

    #[test]
    fn test_erase_closes_session() {
        let mut handle = handle();
        handle.transport_mut().code_mut()[0] = 0;
        run_erase(&mut handle, &device(), false).unwrap();
        let programmer = handle.into_transport();
        assert_eq!(programmer.code()[0], 0xFF);
        assert_eq!(programmer.commands().last(), Some(&0x04));
    }

    #[test]
    fn test_first_mismatch() {
        assert_eq!(first_mismatch(&[1, 2, 3], &[1, 2, 3]), None);
        assert_eq!(first_mismatch(&[1, 2, 3], &[1, 9, 3]), Some(1));
    }
}
