//! minipro - T48/T56 universal chip programmer
//!
//! Thin command line front end over `minipro-core`. Each command opens the
//! programmer named by `--programmer`, loads the target descriptor from a
//! RON file where one is needed, and runs one core operation inside a
//! single device session.

mod algorithms;
mod cli;
mod commands;
mod device;
mod programmers;

#[cfg(test)]
mod test_util;

use clap::Parser;
use cli::{Cli, Commands, DeviceArgs, FuseGroup, Memory, ProgrammerArgs};
use minipro_core::{DeviceDescriptor, MemoryType};
use programmers::{open_programmer, ProgrammerHandle};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::Info { programmer } => {
            let handle = open(&programmer)?;
            commands::run_info(&handle)
        }
        Commands::Read {
            programmer,
            device,
            output,
            memory,
            length,
        } => {
            let (mut handle, dev) = open_with_device(&programmer, &device)?;
            commands::run_read(
                &mut handle,
                &dev,
                device.icsp,
                memory_type(memory),
                length,
                &output,
            )
        }
        Commands::Write {
            programmer,
            device,
            input,
            memory,
            verify,
            no_erase,
        } => {
            let (mut handle, dev) = open_with_device(&programmer, &device)?;
            commands::run_write(
                &mut handle,
                &dev,
                device.icsp,
                memory_type(memory),
                &input,
                verify,
                !no_erase,
            )
        }
        Commands::Erase { programmer, device } => {
            let (mut handle, dev) = open_with_device(&programmer, &device)?;
            commands::run_erase(&mut handle, &dev, device.icsp)
        }
        Commands::ReadFuses {
            programmer,
            device,
            group,
            count,
        } => {
            let (mut handle, dev) = open_with_device(&programmer, &device)?;
            commands::run_read_fuses(&mut handle, &dev, device.icsp, fuse_type(group), count)
        }
        Commands::WriteFuses {
            programmer,
            device,
            group,
            count,
            data,
        } => {
            let (mut handle, dev) = open_with_device(&programmer, &device)?;
            commands::run_write_fuses(
                &mut handle,
                &dev,
                device.icsp,
                fuse_type(group),
                count,
                data.as_deref(),
            )
        }
        Commands::ChipId { programmer, device } => {
            let (mut handle, dev) = open_with_device(&programmer, &device)?;
            commands::run_chip_id(&mut handle, &dev, device.icsp)
        }
        Commands::Autodetect { programmer, probe } => {
            let mut handle = open(&programmer)?;
            commands::run_autodetect(&mut handle, probe)
        }
        Commands::LogicTest {
            programmer,
            device,
            output,
        } => {
            let (mut handle, dev) = open_with_device(&programmer, &device)?;
            commands::run_logic_test(&mut handle, &dev, device.icsp, output.as_deref())
        }
        Commands::UpdateFirmware {
            programmer,
            file,
            yes,
        } => {
            let mut handle = open(&programmer)?;
            commands::run_update_firmware(&mut handle, &file, yes)
        }
    }
}

fn open(args: &ProgrammerArgs) -> Result<ProgrammerHandle, Box<dyn std::error::Error>> {
    open_programmer(&args.programmer, args.algorithms.as_deref())
}

fn open_with_device(
    programmer: &ProgrammerArgs,
    device: &DeviceArgs,
) -> Result<(ProgrammerHandle, DeviceDescriptor), Box<dyn std::error::Error>> {
    // Load the descriptor first so a bad file never touches the programmer
    let dev = device::load_device(&device.device)?;
    log::info!("Device: {}", dev.name);
    let handle = open(programmer)?;
    Ok((handle, dev))
}

fn memory_type(memory: Memory) -> MemoryType {
    match memory {
        Memory::Code => MemoryType::Code,
        Memory::Data => MemoryType::Data,
        Memory::User => MemoryType::User,
    }
}

fn fuse_type(group: FuseGroup) -> MemoryType {
    match group {
        FuseGroup::User => MemoryType::FuseUser,
        FuseGroup::Config => MemoryType::FuseConfig,
        FuseGroup::Lock => MemoryType::FuseLock,
    }
}
