//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a string as a hex or decimal u8
fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let value = parse_hex_u32(s)?;
    u8::try_from(value).map_err(|_| format!("Value out of range: {}", s))
}

const PROGRAMMER_HELP: &str = "Programmer to use: usb:bus=<id>,port=<a.b.c>[,family=t48|t56] \
                               or dummy[:family=t48|t56]";

#[derive(Parser)]
#[command(name = "minipro")]
#[command(author, version, about = "T48/T56 universal chip programmer", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Programmer selection shared across commands
#[derive(clap::Args, Debug, Clone)]
pub struct ProgrammerArgs {
    #[arg(short, long, help = PROGRAMMER_HELP)]
    pub programmer: String,

    /// Directory holding FPGA algorithm bitstreams (<NAME>.alg), T56 only
    #[arg(long)]
    pub algorithms: Option<PathBuf>,
}

/// Target device options shared across commands
#[derive(clap::Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Device descriptor file (RON format)
    #[arg(short, long)]
    pub device: PathBuf,

    /// Program in-circuit through the ICSP header
    #[arg(long)]
    pub icsp: bool,
}

/// Memory region selectable from the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Memory {
    Code,
    Data,
    User,
}

/// Fuse group selectable from the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuseGroup {
    User,
    Config,
    Lock,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show programmer identity and firmware version
    Info {
        #[command(flatten)]
        programmer: ProgrammerArgs,
    },

    /// Read chip memory to file
    Read {
        #[command(flatten)]
        programmer: ProgrammerArgs,

        #[command(flatten)]
        device: DeviceArgs,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Memory region to read
        #[arg(short, long, value_enum, default_value = "code")]
        memory: Memory,

        /// Number of bytes to read (defaults to the region size)
        #[arg(long, value_parser = parse_hex_u32)]
        length: Option<u32>,
    },

    /// Write file to chip memory
    Write {
        #[command(flatten)]
        programmer: ProgrammerArgs,

        #[command(flatten)]
        device: DeviceArgs,

        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Memory region to write
        #[arg(short, long, value_enum, default_value = "code")]
        memory: Memory,

        /// Verify after writing
        #[arg(long, default_value = "true")]
        verify: bool,

        /// Don't erase before writing
        #[arg(long)]
        no_erase: bool,
    },

    /// Erase the chip
    Erase {
        #[command(flatten)]
        programmer: ProgrammerArgs,

        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Read a fuse group
    ReadFuses {
        #[command(flatten)]
        programmer: ProgrammerArgs,

        #[command(flatten)]
        device: DeviceArgs,

        /// Fuse group to read
        #[arg(short, long, value_enum)]
        group: FuseGroup,

        /// Number of fuse items
        #[arg(short, long, value_parser = parse_hex_u8)]
        count: u8,
    },

    /// Write a fuse group
    WriteFuses {
        #[command(flatten)]
        programmer: ProgrammerArgs,

        #[command(flatten)]
        device: DeviceArgs,

        /// Fuse group to write
        #[arg(short, long, value_enum)]
        group: FuseGroup,

        /// Number of fuse items
        #[arg(short, long, value_parser = parse_hex_u8)]
        count: u8,

        /// Fuse bytes as hex (e.g. "ff7f"); omit to send an empty frame
        #[arg(long)]
        data: Option<String>,
    },

    /// Read the chip identity and compare it with the descriptor
    ChipId {
        #[command(flatten)]
        programmer: ProgrammerArgs,

        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Probe for a serial flash and print its JEDEC ID
    Autodetect {
        #[command(flatten)]
        programmer: ProgrammerArgs,

        /// Probe type sent to the firmware
        #[arg(long, value_parser = parse_hex_u8, default_value = "0")]
        probe: u8,
    },

    /// Run the logic IC test vectors
    LogicTest {
        #[command(flatten)]
        programmer: ProgrammerArgs,

        #[command(flatten)]
        device: DeviceArgs,

        /// Save the raw pull-up/pull-down captures to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Reflash the programmer firmware
    UpdateFirmware {
        #[command(flatten)]
        programmer: ProgrammerArgs,

        /// Firmware image file
        #[arg(short, long)]
        file: PathBuf,

        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}
