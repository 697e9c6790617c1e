//! Programmer firmware update
//!
//! Update image layout (all fields little-endian):
//!
//! ```text
//! offset 0   u32  version (family magic in the high half)
//! offset 4   u32  CRC-32 of everything after the header
//! offset 8   u32  reserved
//! offset 12  u32  block count
//! offset 16  block count * 276 bytes of encrypted firmware blocks
//! ```
//!
//! The update is not atomic and cannot be resumed. Once the bootloader has
//! erased the old firmware, any failure leaves the programmer without a
//! working application; only the bootloader remains and the update has to be
//! repeated.

use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{Error, ImageError, Result};
use crate::handle::Handle;
use crate::message::{load, Field, Message};
use crate::protocol::{bootloader as f, Command, REPLY_LEN};
use crate::status::{format_version, DeviceMode};
use crate::transport::{recv_frame, send_frame, Transport};

/// Image header length
pub const IMAGE_HEADER_LEN: usize = 16;
/// Length of one firmware block
pub const IMAGE_BLOCK_LEN: usize = f::BLOCK_SIZE;
/// Largest image accepted
pub const MAX_IMAGE_LEN: u64 = 1_048_576;

const VERSION: Field = Field::le(0, 4);
const CRC: Field = Field::le(4, 4);
const BLOCK_COUNT: Field = Field::le(12, 4);

/// A validated firmware update image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    version: u16,
    crc: u32,
    payload: Vec<u8>,
}

impl FirmwareImage {
    /// Validate `bytes` as an image for the family whose magic is `magic`
    pub fn parse(bytes: &[u8], magic: u32) -> Result<Self> {
        let size = bytes.len() as u64;
        if !(IMAGE_HEADER_LEN as u64..=MAX_IMAGE_LEN).contains(&size) {
            return Err(ImageError::FileSize(size).into());
        }

        let version = load(bytes, VERSION) as u32;
        if version & 0xFFFF_0000 != magic {
            return Err(ImageError::Version {
                expected: magic,
                found: version,
            }
            .into());
        }

        let blocks = load(bytes, BLOCK_COUNT) as u32;
        let expected = u64::from(blocks) * IMAGE_BLOCK_LEN as u64 + IMAGE_HEADER_LEN as u64;
        if expected != size {
            return Err(ImageError::BlockCount { blocks, size }.into());
        }

        let payload = &bytes[IMAGE_HEADER_LEN..];
        let crc = load(bytes, CRC) as u32;
        let actual = crc32fast::hash(payload);
        if actual != crc {
            return Err(ImageError::Crc {
                expected: crc,
                actual,
            }
            .into());
        }

        Ok(Self {
            version: version as u16,
            crc,
            payload: payload.to_vec(),
        })
    }

    /// Read and validate an image file
    ///
    /// The size is checked before the file is read.
    pub fn load(path: &Path, magic: u32) -> Result<Self> {
        let size = fs::metadata(path)?.len();
        if !(IMAGE_HEADER_LEN as u64..=MAX_IMAGE_LEN).contains(&size) {
            return Err(ImageError::FileSize(size).into());
        }
        Self::parse(&fs::read(path)?, magic)
    }

    /// Firmware version carried by the image
    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn crc(&self) -> u32 {
        self.crc
    }

    pub fn block_count(&self) -> usize {
        self.payload.len() / IMAGE_BLOCK_LEN
    }

    /// Firmware blocks in flashing order
    pub fn blocks(&self) -> impl Iterator<Item = &[u8]> {
        self.payload.chunks_exact(IMAGE_BLOCK_LEN)
    }
}

/// How an image's version relates to the running firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionRelation {
    Older,
    Same,
    Newer,
}

impl VersionRelation {
    /// Relation of `image` to `running`
    pub fn of(image: u16, running: u16) -> Self {
        match image.cmp(&running) {
            std::cmp::Ordering::Less => VersionRelation::Older,
            std::cmp::Ordering::Equal => VersionRelation::Same,
            std::cmp::Ordering::Greater => VersionRelation::Newer,
        }
    }
}

impl fmt::Display for VersionRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRelation::Older => write!(f, "older"),
            VersionRelation::Same => write!(f, "same"),
            VersionRelation::Newer => write!(f, "newer"),
        }
    }
}

/// What is about to be flashed, shown before confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateSummary {
    pub image_version: u16,
    pub running_version: u16,
    pub relation: VersionRelation,
    pub blocks: usize,
}

impl fmt::Display for UpdateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "image contains firmware version {} ({} than running {})",
            format_version(self.image_version.into()),
            self.relation,
            format_version(self.running_version.into())
        )
    }
}

/// Steps of a firmware update
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UpdateStage {
    Idle,
    Validated,
    Confirmed,
    BootloaderSwitch,
    Erase,
    ReflashBlocks,
    FinalizeBlock,
    ResetVerify,
    Done,
    Failed,
}

impl UpdateStage {
    /// Whether a failure in this stage can leave the programmer without
    /// valid firmware
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            UpdateStage::Erase
                | UpdateStage::ReflashBlocks
                | UpdateStage::FinalizeBlock
                | UpdateStage::ResetVerify
        )
    }
}

impl fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpdateStage::Idle => "idle",
            UpdateStage::Validated => "validate image",
            UpdateStage::Confirmed => "confirm",
            UpdateStage::BootloaderSwitch => "bootloader switch",
            UpdateStage::Erase => "erase",
            UpdateStage::ReflashBlocks => "reflash",
            UpdateStage::FinalizeBlock => "finalize",
            UpdateStage::ResetVerify => "reset and verify",
            UpdateStage::Done => "done",
            UpdateStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Yes/no gate before anything is sent to the programmer
pub trait Confirm {
    fn confirm(&mut self, summary: &UpdateSummary) -> bool;
}

impl<F> Confirm for F
where
    F: FnMut(&UpdateSummary) -> bool,
{
    fn confirm(&mut self, summary: &UpdateSummary) -> bool {
        self(summary)
    }
}

/// Progress callbacks; every method defaults to doing nothing
pub trait UpdateProgress {
    /// A new stage started
    fn stage(&mut self, _stage: UpdateStage) {}

    /// Reflash progress in percent
    fn reflash(&mut self, _percent: u32) {}

    /// The update stopped in `stage`
    fn failed(&mut self, _stage: UpdateStage, _error: &Error) {}
}

impl UpdateProgress for () {}

/// Drives one firmware update on a handle
pub struct FirmwareUpdater<'h, T: Transport> {
    handle: &'h mut Handle<T>,
    stage: UpdateStage,
}

impl<'h, T: Transport> FirmwareUpdater<'h, T> {
    pub fn new(handle: &'h mut Handle<T>) -> Self {
        Self {
            handle,
            stage: UpdateStage::Idle,
        }
    }

    /// Stage reached so far
    pub fn stage(&self) -> UpdateStage {
        self.stage
    }

    /// Read, validate and flash the image at `path`
    pub fn update_from_file(
        &mut self,
        path: &Path,
        confirm: &mut dyn Confirm,
        progress: &mut dyn UpdateProgress,
    ) -> Result<()> {
        let magic = self.family_magic()?;
        let image = FirmwareImage::load(path, magic);
        self.run(image, confirm, progress)
    }

    /// Validate `bytes` and flash them
    pub fn update(
        &mut self,
        bytes: &[u8],
        confirm: &mut dyn Confirm,
        progress: &mut dyn UpdateProgress,
    ) -> Result<()> {
        let magic = self.family_magic()?;
        let image = FirmwareImage::parse(bytes, magic);
        self.run(image, confirm, progress)
    }

    fn family_magic(&self) -> Result<u32> {
        let family = self.handle.family();
        family
            .firmware_magic()
            .ok_or_else(|| Error::Unsupported(format!("firmware update on {}", family)))
    }

    fn run(
        &mut self,
        image: Result<FirmwareImage>,
        confirm: &mut dyn Confirm,
        progress: &mut dyn UpdateProgress,
    ) -> Result<()> {
        let result = self.sequence(image, confirm, progress);
        if let Err(e) = &result {
            let failed_in = self.stage;
            if failed_in.is_destructive() {
                log::error!(
                    "Firmware update failed during {}: {}. The programmer may be left \
                     without valid firmware; repeat the update from bootloader mode",
                    failed_in,
                    e
                );
            }
            progress.failed(failed_in, e);
            self.stage = UpdateStage::Failed;
        }
        result
    }

    fn enter(&mut self, stage: UpdateStage, progress: &mut dyn UpdateProgress) {
        log::debug!("Firmware update: {}", stage);
        self.stage = stage;
        progress.stage(stage);
    }

    fn sequence(
        &mut self,
        image: Result<FirmwareImage>,
        confirm: &mut dyn Confirm,
        progress: &mut dyn UpdateProgress,
    ) -> Result<()> {
        let image = image?;
        self.enter(UpdateStage::Validated, progress);

        let running = self.handle.info().firmware;
        let summary = UpdateSummary {
            image_version: image.version(),
            running_version: running,
            relation: VersionRelation::of(image.version(), running),
            blocks: image.block_count(),
        };
        log::info!("{}", summary);
        if !confirm.confirm(&summary) {
            log::info!("Firmware update aborted");
            return Err(Error::Aborted);
        }
        self.enter(UpdateStage::Confirmed, progress);

        if self.handle.info().mode != DeviceMode::Bootloader {
            self.enter(UpdateStage::BootloaderSwitch, progress);
            switch_to_bootloader(self.handle.transport_mut())?;
            self.handle.reconnect()?;
            self.handle.expect_mode(DeviceMode::Bootloader)?;
        }

        self.enter(UpdateStage::Erase, progress);
        bootloader_erase(self.handle.transport_mut())?;

        self.enter(UpdateStage::ReflashBlocks, progress);
        let transport = self.handle.transport_mut();
        send_control(transport, Command::BootloaderWrite, f::WRITE_MODE_START)?;
        let count = image.block_count();
        for (i, block) in image.blocks().enumerate() {
            write_block(transport, block)?;
            progress.reflash((i * 100 / count) as u32);
        }

        self.enter(UpdateStage::FinalizeBlock, progress);
        let transport = self.handle.transport_mut();
        write_final_block(transport)?;
        // The bootloader never acks the completion frame; ResetVerify checks the result
        send_control(transport, Command::BootloaderWrite, f::WRITE_MODE_COMPLETE)?;
        progress.reflash(100);

        self.enter(UpdateStage::ResetVerify, progress);
        self.handle.reconnect()?;
        self.handle.expect_mode(DeviceMode::Normal)?;

        self.enter(UpdateStage::Done, progress);
        log::info!(
            "Firmware updated to {}",
            self.handle.info().firmware_string()
        );
        Ok(())
    }
}

type BootMessage = Message<{ f::BUFFER_LEN }>;

fn control_frame(opcode: Command, mode: u64) -> BootMessage {
    BootMessage::new(opcode as u8)
        .with(f::WRITE_MODE, mode)
        .with(f::MAGIC_FIELD, f::MAGIC)
}

fn send_control(transport: &mut dyn Transport, opcode: Command, mode: u64) -> Result<()> {
    send_frame(transport, control_frame(opcode, mode).frame(f::CONTROL_FRAME_LEN))
}

fn recv_ack(transport: &mut dyn Transport, ack: Field, step: &'static str) -> Result<()> {
    let mut reply = Message::<REPLY_LEN>::zeroed();
    recv_frame(transport, reply.as_mut_bytes())?;
    match reply.get(ack) as u8 {
        0 => Ok(()),
        code => Err(Error::DeviceAck { step, code }),
    }
}

fn switch_to_bootloader(transport: &mut dyn Transport) -> Result<()> {
    log::info!("Switching to bootloader");
    send_control(transport, Command::Switch, 0)?;
    recv_ack(transport, f::SWITCH_ACK, "bootloader switch")
}

fn bootloader_erase(transport: &mut dyn Transport) -> Result<()> {
    log::info!("Erasing firmware");
    send_control(transport, Command::BootloaderErase, 0)?;
    recv_ack(transport, f::ACK, "erase")
}

fn write_block(transport: &mut dyn Transport, block: &[u8]) -> Result<()> {
    let mut msg = BootMessage::new(Command::BootloaderWrite as u8);
    msg.set(f::WRITE_MODE, f::WRITE_MODE_BLOCK)
        .set(f::BLOCK_LENGTH, f::BLOCK_SIZE as u64)
        .put_bytes(f::BLOCK_PAYLOAD, block);
    send_frame(transport, msg.frame(f::BLOCK_FRAME_LEN))?;
    recv_ack(transport, f::ACK, "reflash block")
}

fn write_final_block(transport: &mut dyn Transport) -> Result<()> {
    let mut msg = BootMessage::new(Command::BootloaderWrite as u8);
    msg.set(f::WRITE_MODE, f::WRITE_MODE_FINAL)
        .set(f::BLOCK_LENGTH, f::FINAL_LENGTH)
        .set(f::FINAL_MARKER, f::FINAL_MARKER_VALUE)
        .set(f::FINAL_MAGIC, f::FINAL_MAGIC_VALUE);
    send_frame(transport, msg.frame(f::FINAL_FRAME_LEN))?;
    recv_ack(transport, f::ACK, "final block")
}
