//! Firmware update command

use std::io::{self, BufRead, Write};
use std::path::Path;

use indicatif::ProgressBar;
use minipro_core::{Error, FirmwareUpdater, Handle, Transport, UpdateProgress, UpdateStage, UpdateSummary};

use super::spinner;

/// Progress display for the reflash sequence
struct IndicatifUpdate {
    current: Option<ProgressBar>,
}

impl IndicatifUpdate {
    fn new() -> Self {
        Self { current: None }
    }

    fn finish(&mut self) {
        if let Some(pb) = self.current.take() {
            pb.finish_and_clear();
        }
    }
}

impl UpdateProgress for IndicatifUpdate {
    fn stage(&mut self, stage: UpdateStage) {
        match stage {
            UpdateStage::BootloaderSwitch | UpdateStage::Erase | UpdateStage::ResetVerify => {
                self.finish();
                self.current = Some(spinner(format!("{}...", stage)));
            }
            UpdateStage::ReflashBlocks => {
                self.finish();
                let pb = ProgressBar::new(100);
                pb.set_style(
                    indicatif::ProgressStyle::default_bar()
                        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% Reflashing")
                        .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                self.current = Some(pb);
            }
            UpdateStage::Done => self.finish(),
            _ => {}
        }
    }

    fn reflash(&mut self, percent: u32) {
        if let Some(pb) = &self.current {
            pb.set_position(percent.into());
        }
    }

    fn failed(&mut self, stage: UpdateStage, error: &Error) {
        if let Some(pb) = self.current.take() {
            pb.abandon_with_message(format!("{} failed: {}", stage, error));
        }
    }
}

/// Ask on stdin whether to go ahead
fn ask(summary: &UpdateSummary) -> bool {
    print!("{}\nReflash the programmer? [y/N] ", summary);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => is_yes(&line),
        Err(_) => false,
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Run the update-firmware command
pub fn run_update_firmware<T: Transport>(
    handle: &mut Handle<T>,
    file: &Path,
    yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut confirm = |summary: &UpdateSummary| {
        if yes {
            println!("{}", summary);
            true
        } else {
            ask(summary)
        }
    };
    let mut progress = IndicatifUpdate::new();

    FirmwareUpdater::new(handle).update_from_file(file, &mut confirm, &mut progress)?;
    println!("Firmware is now {}", handle.info().firmware_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::create_temp_dir;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("n"));
        assert!(!is_yes(""));
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_update_from_file() {
        use minipro_core::{DeviceMode, ProgrammerFamily};
        use minipro_dummy::{DummyConfig, DummyProgrammer};

        let payload = vec![0x5Au8; 2 * 0x114];
        let mut image = Vec::new();
        image.extend_from_slice(&0xF048_0160u32.to_le_bytes());
        image.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        image.extend_from_slice(&[0; 4]);
        image.extend_from_slice(&2u32.to_le_bytes());
        image.extend_from_slice(&payload);

        let dir = create_temp_dir("firmware-1");
        let path = dir.join("update.dat");
        std::fs::write(&path, &image).unwrap();

        let config = DummyConfig {
            updated_firmware: 0x0160,
            ..Default::default()
        };
        let mut handle = Handle::open(DummyProgrammer::new(config), ProgrammerFamily::T48).unwrap();
        run_update_firmware(&mut handle, &path, true).unwrap();
        assert_eq!(handle.info().mode, DeviceMode::Normal);
        assert_eq!(handle.info().firmware, 0x0160);
    }
}
