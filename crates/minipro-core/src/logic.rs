//! Logic IC functional test
//!
//! The test runs every vector row twice: once with weak pull-ups on all
//! outputs and once with weak pull-downs. Comparing the two captures tells a
//! driven low output (0 in both), a driven high output (1 in both) and a
//! high-impedance output (1 with pull-up, 0 with pull-down) apart.
//!
//! Clock pins are pulsed by the firmware before the pins are sampled; `X`
//! pins are left unconnected and `V`/`G` mark the supply pins. None of those
//! are checked by the comparator.

use std::fmt;

use crate::descriptor::{DeviceDescriptor, LogicState};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::{logic as f, Command, REPLY_LEN};
use crate::transport::{recv_frame, send_frame, Transport};

/// Most pins a 32-byte vector frame can carry
pub const MAX_PINS: usize = (REPLY_LEN - f::PINS) * 2;

/// Output bias applied during a capture pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    /// Weak pull-up on every output
    PullUp,
    /// Weak pull-down on every output
    PullDown,
}

impl Bias {
    fn vcc_bit(self) -> u8 {
        match self {
            Bias::PullUp => 0,
            Bias::PullDown => f::PULL_DOWN_BIT,
        }
    }
}

/// Raw per-pin readings, one row per vector
pub type Capture = Vec<Vec<u8>>;

/// Pack one vector row two pins per byte, even pin in the low nibble
fn pack_row(msg: &mut Message<REPLY_LEN>, row: &[LogicState]) {
    let pins = &mut msg.as_mut_bytes()[f::PINS..];
    for (i, state) in row.iter().enumerate() {
        let code = *state as u8;
        if i & 1 == 1 {
            pins[i / 2] |= code << 4;
        } else {
            pins[i / 2] = code;
        }
    }
}

fn unpack_row(reply: &Message<REPLY_LEN>, pins: usize) -> Vec<u8> {
    (0..pins)
        .map(|i| (reply.byte(f::PINS + i / 2) >> (4 * (i & 1))) & 0x0F)
        .collect()
}

/// Run one capture pass over every vector row
pub fn capture(
    transport: &mut dyn Transport,
    device: &DeviceDescriptor,
    bias: Bias,
) -> Result<Capture> {
    let pins = device.pin_count();
    let mut rows = Vec::with_capacity(device.vectors.len());

    for (n, row) in device.vectors.iter().enumerate() {
        let mut msg = Message::<REPLY_LEN>::filled(Command::LogicIcTestVector as u8, 0xFF);
        msg.set(f::VCC, (device.voltages.vcc | bias.vcc_bit()).into())
            .set(f::PIN_COUNT, pins as u64)
            .set(f::ROW, n as u64);
        pack_row(&mut msg, row.pins());

        send_frame(transport, msg.as_bytes())?;
        let mut reply = Message::<REPLY_LEN>::zeroed();
        recv_frame(transport, reply.as_mut_bytes())?;
        rows.push(unpack_row(&reply, pins));
    }
    Ok(rows)
}

/// Whether a pin reading matches its expected symbol
pub fn pin_passes(expected: LogicState, pull_up: u8, pull_down: u8) -> bool {
    match expected {
        LogicState::Low => pull_up == 0 && pull_down == 0,
        LogicState::High => pull_up != 0 && pull_down != 0,
        LogicState::HighZ => pull_up != 0 && pull_down == 0,
        _ => true,
    }
}

/// Result of a single pin at a single vector row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinResult {
    /// Symbol from the vector table
    pub expected: LogicState,
    /// Reading with pull-ups active
    pub pull_up: u8,
    /// Reading with pull-downs active
    pub pull_down: u8,
    /// Comparator verdict
    pub passed: bool,
}

/// Outcome of a full logic test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    /// Pull-up pass readings
    pub pull_up: Capture,
    /// Pull-down pass readings
    pub pull_down: Capture,
    /// Per-row, per-pin verdicts
    pub grid: Vec<Vec<PinResult>>,
    /// Number of failing pins over all rows
    pub errors: usize,
}

impl TestResult {
    /// Compare both captures against the device's vector table
    pub fn evaluate(device: &DeviceDescriptor, pull_up: Capture, pull_down: Capture) -> Self {
        let grid: Vec<Vec<PinResult>> = device
            .vectors
            .iter()
            .zip(pull_up.iter().zip(pull_down.iter()))
            .map(|(row, (up, down))| {
                row.pins()
                    .iter()
                    .zip(up.iter().zip(down.iter()))
                    .map(|(&expected, (&u, &d))| PinResult {
                        expected,
                        pull_up: u,
                        pull_down: d,
                        passed: pin_passes(expected, u, d),
                    })
                    .collect()
            })
            .collect();

        let errors = grid.iter().flatten().filter(|p| !p.passed).count();
        Self {
            pull_up,
            pull_down,
            grid,
            errors,
        }
    }

    /// True iff no pin failed
    pub fn passed(&self) -> bool {
        self.errors == 0
    }
}

impl fmt::Display for TestResult {
    /// Grid with one column per pin; failing pins are followed by `-`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pins = self.grid.first().map_or(0, |r| r.len());
        write!(f, "      ")?;
        for pin in 1..=pins {
            write!(f, "{:<3}", pin)?;
        }
        writeln!(f)?;
        for (n, row) in self.grid.iter().enumerate() {
            write!(f, "{:04}: ", n)?;
            for pin in row {
                let mark = if pin.passed { ' ' } else { '-' };
                write!(f, "{}{} ", pin.expected.symbol(), mark)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Run both capture passes and compare them against the vector table
pub fn run_logic_test(
    transport: &mut dyn Transport,
    device: &DeviceDescriptor,
) -> Result<TestResult> {
    if !device.is_logic_ic() {
        return Err(Error::Unsupported(format!("{} has no test vectors", device.name)));
    }
    if device.pin_count() > MAX_PINS {
        return Err(Error::Protocol(format!(
            "{} pins do not fit a vector frame",
            device.pin_count()
        )));
    }
    device.validate_vectors()?;

    log::info!(
        "Running logic test on {} ({} vectors)",
        device.name,
        device.vectors.len()
    );
    let pull_up = capture(transport, device, Bias::PullUp)?;
    let pull_down = capture(transport, device, Bias::PullDown)?;

    let result = TestResult::evaluate(device, pull_up, pull_down);
    if result.passed() {
        log::info!("Logic test successful");
    } else {
        log::warn!("Logic test failed: {} errors encountered", result.errors);
    }
    Ok(result)
}
