//! Programmer registration and dispatch
//!
//! A programmer string is `name[:key=value,...]`. The name selects the
//! transport, the parameters locate the device and pick the family.

use std::collections::HashMap;
use std::path::Path;

use minipro_core::{Handle, ProgrammerFamily, Transport};

use crate::algorithms::AlgorithmDir;

/// Handle type used by every command
pub type ProgrammerHandle = Handle<Box<dyn Transport>>;

/// Information about a programmer
pub struct ProgrammerInfo {
    /// Name used in the programmer string
    pub name: &'static str,
    /// Short description
    pub description: &'static str,
}

/// Programmers enabled at compile time
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_programmers() -> Vec<ProgrammerInfo> {
    let mut programmers = Vec::new();

    #[cfg(feature = "usb")]
    programmers.push(ProgrammerInfo {
        name: "usb",
        description: "T48/T56 over USB (bus=<id>,port=<a.b.c>[,family=t48|t56])",
    });

    #[cfg(feature = "dummy")]
    programmers.push(ProgrammerInfo {
        name: "dummy",
        description: "Emulated programmer for testing ([family=t48|t56])",
    });

    programmers
}

/// Help text listing all available programmers
pub fn programmer_help() -> String {
    let programmers = available_programmers();

    if programmers.is_empty() {
        return "No programmers available (recompile with programmer features enabled)".to_string();
    }

    let mut help = String::from("Available programmers:\n");
    for p in &programmers {
        help.push_str(&format!("  {:8} - {}\n", p.name, p.description));
    }
    help
}

/// Parsed programmer string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgrammerParams {
    pub name: String,
    pub params: HashMap<String, String>,
}

impl ProgrammerParams {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// `family=` parameter, T48 when absent
    pub fn family(&self) -> Result<ProgrammerFamily, Box<dyn std::error::Error>> {
        match self.get("family") {
            Some(family) => Ok(family.parse::<ProgrammerFamily>()?),
            None => Ok(ProgrammerFamily::T48),
        }
    }

    fn require(&self, key: &str) -> Result<&str, Box<dyn std::error::Error>> {
        self.get(key).ok_or_else(|| {
            format!("{} programmer requires the '{}' parameter", self.name, key).into()
        })
    }
}

/// Parse a programmer string into name and parameters
///
/// Format: "name" or "name:key1=value1,key2=value2"
pub fn parse_programmer_params(s: &str) -> Result<ProgrammerParams, Box<dyn std::error::Error>> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));

    let mut params = HashMap::new();
    if !opts_str.is_empty() {
        for opt in opts_str.split(',') {
            if let Some((key, value)) = opt.split_once('=') {
                params.insert(key.to_string(), value.to_string());
            } else {
                return Err(
                    format!("Invalid parameter format: '{}' (expected key=value)", opt).into(),
                );
            }
        }
    }

    Ok(ProgrammerParams {
        name: name.to_string(),
        params,
    })
}

/// Open the programmer named by `programmer`
///
/// `algorithms` is registered as the bitstream source; it only matters for
/// FPGA based families.
pub fn open_programmer(
    programmer: &str,
    algorithms: Option<&Path>,
) -> Result<ProgrammerHandle, Box<dyn std::error::Error>> {
    let params = parse_programmer_params(programmer)?;
    let family = params.family()?;
    let transport = open_transport(&params, family)?;

    let mut handle = Handle::open(transport, family)?;
    if let Some(dir) = algorithms {
        handle = handle.with_algorithms(Box::new(AlgorithmDir::new(dir)));
    } else if family.requires_bitstream() {
        log::debug!("No algorithm directory given; device sessions will fail on {}", family);
    }
    Ok(handle)
}

#[allow(unused_variables)]
fn open_transport(
    params: &ProgrammerParams,
    family: ProgrammerFamily,
) -> Result<Box<dyn Transport>, Box<dyn std::error::Error>> {
    match params.name.as_str() {
        #[cfg(feature = "usb")]
        "usb" => {
            use minipro_usb::{UsbLocation, UsbTransport};

            let location = UsbLocation::parse(params.require("bus")?, params.require("port")?)?;
            log::info!("Opening {} at {}...", family, location);
            let transport = UsbTransport::open(location).map_err(|e| {
                format!(
                    "Failed to open programmer: {}\n\
                     Make sure the device is connected and you have permissions.",
                    e
                )
            })?;
            Ok(Box::new(transport))
        }

        #[cfg(feature = "dummy")]
        "dummy" => {
            use minipro_dummy::{DummyConfig, DummyProgrammer};

            let firmware = family
                .expected_firmware()
                .map(|(version, _)| version)
                .unwrap_or(0x0100);
            let config = DummyConfig {
                family,
                firmware,
                updated_firmware: firmware,
                ..Default::default()
            };
            Ok(Box::new(DummyProgrammer::new(config)))
        }

        name => Err(unknown_programmer_error(name)),
    }
}

fn unknown_programmer_error(name: &str) -> Box<dyn std::error::Error> {
    let mut msg = format!("Unknown programmer: {}\n\n", name);
    msg.push_str(&programmer_help());
    msg.into()
}
