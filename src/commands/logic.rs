//! Logic IC test command

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use minipro_core::{DeviceDescriptor, Handle, TestResult, Transport};

/// Render both raw captures, one line per vector row
///
/// Each line is the row number followed by the pull-up and pull-down
/// readings, one digit per pin.
pub fn format_captures(result: &TestResult) -> String {
    let mut out = String::new();
    for (n, (up, down)) in result.pull_up.iter().zip(&result.pull_down).enumerate() {
        let up: String = up.iter().map(|v| char::from(b'0' + (*v).min(9))).collect();
        let down: String = down.iter().map(|v| char::from(b'0' + (*v).min(9))).collect();
        let _ = writeln!(out, "{:04}: {} {}", n, up, down);
    }
    out
}

/// Run the logic-test command
pub fn run_logic_test<T: Transport>(
    handle: &mut Handle<T>,
    device: &DeviceDescriptor,
    icsp: bool,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    if !device.is_logic_ic() {
        return Err(format!("{} is not a logic IC", device.name).into());
    }

    let mut session = handle.begin(device, icsp)?;
    let result = session.logic_test();
    let result = session.finish(result)?;

    print!("{}", result);
    if let Some(path) = output {
        fs::write(path, format_captures(&result))?;
        println!("Raw captures saved to {:?}", path);
    }

    if result.passed() {
        println!("Logic test successful.");
        Ok(())
    } else {
        Err(format!("Logic test failed: {} errors", result.errors).into())
    }
}
