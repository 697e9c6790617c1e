//! CLI command implementations
//!
//! Every command that touches the target opens one session and ends it on
//! all exit paths through `Session::finish`. Comparisons and reporting that
//! need no device access happen after the session is closed.

mod firmware;
mod fuses;
mod identify;
mod info;
mod logic;
mod memory;

pub use firmware::run_update_firmware;
pub use fuses::{run_read_fuses, run_write_fuses};
pub use identify::{run_autodetect, run_chip_id};
pub use info::run_info;
pub use logic::run_logic_test;
pub use memory::{run_erase, run_read, run_write};

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Byte progress bar with a phase label
fn byte_bar(total: u64, phase: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                phase
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Spinner for steps without a measurable size
fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Hex rendering used for fuse and ID output
fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}
