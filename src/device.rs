//! Device descriptor files

use std::fs;
use std::path::Path;

use minipro_core::{DeviceDescriptor, MemoryType};

/// Load a single descriptor from a RON file
pub fn load_device(path: &Path) -> Result<DeviceDescriptor, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read device file {}: {}", path.display(), e))?;
    let device: DeviceDescriptor = ron::from_str(&text)
        .map_err(|e| format!("Invalid device file {}: {}", path.display(), e))?;
    if device.is_logic_ic() {
        device.validate_vectors()?;
    }
    log::debug!("Loaded device {} from {}", device.name, path.display());
    Ok(device)
}

/// Size of a memory region as declared by the descriptor
///
/// The user area has no declared size.
pub fn region_size(device: &DeviceDescriptor, kind: MemoryType) -> Option<usize> {
    match kind {
        MemoryType::Code => Some(device.code_memory_size as usize),
        MemoryType::Data => Some(device.data_memory_size as usize),
        _ => None,
    }
}
