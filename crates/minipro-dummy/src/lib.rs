//! minipro-dummy - Emulated T48/T56 programmer
//!
//! [`DummyProgrammer`] implements [`Transport`] by decoding the native
//! command frames and answering them from in-memory state. It is useful for
//! development without hardware and for end-to-end tests of the protocol
//! core. Failures can be injected into the bootloader steps and a stuck pin
//! can be simulated for the logic test.

use std::collections::{HashMap, VecDeque};

use minipro_core::error::{Error, Result};
use minipro_core::message::{hex_dump, Field, Message};
use minipro_core::protocol::{self, Command, FRAME_LEN, REPLY_LEN};
use minipro_core::{DeviceMode, LogicState, ProgrammerFamily, Transport};

/// A pin that always reads the same level in the logic test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StuckPin {
    /// Zero-based pin index
    pub pin: usize,
    /// Level the pin reads
    pub level: u8,
}

/// Configuration for the emulated programmer
#[derive(Debug, Clone)]
pub struct DummyConfig {
    pub family: ProgrammerFamily,
    /// Firmware version reported in normal mode
    pub firmware: u16,
    /// Firmware version reported after a completed update
    pub updated_firmware: u16,
    pub model: u8,
    pub device_code: String,
    pub serial: String,
    /// Start in bootloader mode
    pub bootloader: bool,
    /// Code memory size in bytes
    pub code_size: usize,
    /// Data memory size in bytes
    pub data_size: usize,
    /// User area size in bytes
    pub user_size: usize,
    /// Chip ID type tag returned by read-ID
    pub chip_id_type: u8,
    /// Chip ID value
    pub chip_id: u32,
    /// Number of significant chip ID bytes
    pub chip_id_len: usize,
    /// ID returned by the serial flash autodetect probe
    pub autodetect_id: u32,
    /// Report overcurrent after every begin frame
    pub overcurrent: bool,
    /// Logic test fault
    pub stuck_pin: Option<StuckPin>,
    /// Ack code for the bootloader switch
    pub fail_switch: Option<u8>,
    /// Ack code for the bootloader erase
    pub fail_erase: Option<u8>,
    /// Block index and ack code of a failing firmware block
    pub fail_block: Option<(usize, u8)>,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            family: ProgrammerFamily::T48,
            firmware: 0x0100,
            updated_firmware: 0x0100,
            model: 7,
            device_code: "DUMMY48".to_string(),
            serial: "0000000000000000".to_string(),
            bootloader: false,
            code_size: 64 * 1024,
            data_size: 512,
            user_size: 64,
            chip_id_type: 1,
            chip_id: 0x1E95_0F,
            chip_id_len: 3,
            autodetect_id: 0xEF_4018,
            overcurrent: false,
            stuck_pin: None,
            fail_switch: None,
            fail_erase: None,
            fail_block: None,
        }
    }
}

/// Payload expected next on the payload OUT channel
#[derive(Debug, Clone, Copy)]
enum PendingWrite {
    Block { region: Region, addr: usize, len: usize },
    Bitstream { len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Region {
    Code,
    Data,
    User,
}

/// Emulated programmer
pub struct DummyProgrammer {
    config: DummyConfig,
    mode: DeviceMode,
    /// Mode the device comes back in after the next reset
    next_mode: Option<DeviceMode>,
    code: Vec<u8>,
    data: Vec<u8>,
    user: Vec<u8>,
    fuses: HashMap<u8, Vec<u8>>,
    jedec: HashMap<u8, Vec<u8>>,
    protected: bool,
    in_transaction: bool,
    bitstream: Option<Vec<u8>>,
    replies: VecDeque<Vec<u8>>,
    payload_in: VecDeque<u8>,
    pending_write: Option<PendingWrite>,
    firmware_erased: bool,
    blocks_written: usize,
    update_complete: bool,
    commands: Vec<u8>,
}

impl DummyProgrammer {
    pub fn new(config: DummyConfig) -> Self {
        let mode = if config.bootloader {
            DeviceMode::Bootloader
        } else {
            DeviceMode::Normal
        };
        Self {
            code: vec![0xFF; config.code_size],
            data: vec![0xFF; config.data_size],
            user: vec![0xFF; config.user_size],
            config,
            mode,
            next_mode: None,
            fuses: HashMap::new(),
            jedec: HashMap::new(),
            protected: true,
            in_transaction: false,
            bitstream: None,
            replies: VecDeque::new(),
            payload_in: VecDeque::new(),
            pending_write: None,
            firmware_erased: false,
            blocks_written: 0,
            update_complete: false,
            commands: Vec::new(),
        }
    }

    /// T48 with default settings
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut DummyConfig {
        &mut self.config
    }

    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    /// Code memory contents
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn code_mut(&mut self) -> &mut [u8] {
        &mut self.code
    }

    /// Whether the target is powered (between begin and end)
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }

    /// Currently loaded FPGA bitstream
    pub fn bitstream(&self) -> Option<&[u8]> {
        self.bitstream.as_deref()
    }

    /// Firmware blocks accepted by the bootloader since the last erase
    pub fn blocks_written(&self) -> usize {
        self.blocks_written
    }

    /// Opcodes of every frame received, in order
    pub fn commands(&self) -> &[u8] {
        &self.commands
    }

    fn region(&mut self, region: Region) -> &mut Vec<u8> {
        match region {
            Region::Code => &mut self.code,
            Region::Data => &mut self.data,
            Region::User => &mut self.user,
        }
    }

    fn reply(&mut self, bytes: &[u8]) {
        self.replies.push_back(bytes.to_vec());
    }

    fn require_mode(&self, mode: DeviceMode, what: &str) -> Result<()> {
        if self.mode != mode {
            return Err(Error::Transport(format!(
                "dummy: {} not accepted in {} mode",
                what, self.mode
            )));
        }
        Ok(())
    }

    fn handle(&mut self, frame: &[u8]) -> Result<()> {
        let opcode = *frame
            .first()
            .ok_or_else(|| Error::Transport("dummy: empty frame".to_string()))?;
        let cmd = Command::from_u8(opcode)
            .ok_or_else(|| Error::Transport(format!("dummy: unknown opcode 0x{:02X}", opcode)))?;
        self.commands.push(opcode);

        // Fixed-size view of the frame; missing bytes read as zero
        let mut msg = Message::<{ protocol::bootloader::BUFFER_LEN }>::zeroed();
        let n = frame.len().min(protocol::bootloader::BUFFER_LEN);
        msg.put_bytes(0, &frame[..n]);

        match cmd {
            Command::GetSystemInfo => self.system_info(),
            Command::BeginTrans => self.begin(&msg)?,
            Command::EndTrans => self.in_transaction = false,
            Command::RequestStatus => {
                let mut reply = Message::<REPLY_LEN>::zeroed();
                let ovc = self.in_transaction && self.config.overcurrent;
                reply.set(protocol::status::OVERCURRENT, ovc.into());
                self.reply(reply.as_bytes());
            }
            Command::ReadCode | Command::ReadData | Command::ReadUserData => {
                self.read_block(cmd, &msg)?
            }
            Command::WriteCode | Command::WriteData | Command::WriteUserData => {
                let region = match cmd {
                    Command::WriteCode => Region::Code,
                    Command::WriteData => Region::Data,
                    _ => Region::User,
                };
                let addr = msg.get(protocol::block::ADDRESS) as usize;
                let len = msg.get(protocol::block::LENGTH) as usize;
                self.pending_write = Some(PendingWrite::Block { region, addr, len });
            }
            Command::ReadUser | Command::ReadCfg | Command::ReadLock => {
                let stored = self.fuses.get(&fuse_group(cmd)).cloned().unwrap_or_default();
                let mut reply = Message::<FRAME_LEN>::zeroed();
                reply.put_bytes(protocol::fuse::PAYLOAD, &stored);
                self.reply(reply.as_bytes());
            }
            Command::WriteUser | Command::WriteCfg | Command::WriteLock => {
                // The opcode-only form writes nothing
                if frame[1..].iter().any(|&b| b != 0) {
                    let payload = msg.bytes(protocol::fuse::PAYLOAD, FRAME_LEN - 8).to_vec();
                    self.fuses.insert(fuse_group(cmd), payload);
                }
            }
            Command::ReadId => {
                let mut reply = Message::<REPLY_LEN>::zeroed();
                let len = self.config.chip_id_len.clamp(1, 4);
                let field = if matches!(self.config.chip_id_type, 3 | 4) {
                    Field::le(2, len)
                } else {
                    Field::be(2, len)
                };
                reply
                    .set(protocol::chip_id::ID_TYPE, self.config.chip_id_type.into())
                    .set(field, self.config.chip_id.into());
                self.reply(reply.as_bytes());
            }
            Command::Autodetect => {
                let mut reply = Message::<REPLY_LEN>::zeroed();
                reply.set(protocol::chip_id::AUTODETECT_ID, self.config.autodetect_id.into());
                self.reply(reply.as_bytes());
            }
            Command::Erase => {
                self.code.fill(0xFF);
                self.data.fill(0xFF);
                self.user.fill(0xFF);
                self.reply(&[0u8; FRAME_LEN]);
            }
            Command::ProtectOff => self.protected = false,
            Command::ProtectOn => self.protected = true,
            Command::WriteJedec => {
                let bits = msg.get(protocol::jedec::SIZE_BITS) as usize;
                let row = msg.get(protocol::jedec::ROW) as u8;
                let bytes = msg.bytes(protocol::jedec::PAYLOAD, bits.div_ceil(8)).to_vec();
                self.jedec.insert(row, bytes);
            }
            Command::ReadJedec => {
                let row = msg.get(protocol::jedec::ROW) as u8;
                let stored = self.jedec.get(&row).cloned().unwrap_or_default();
                let mut reply = Message::<REPLY_LEN>::zeroed();
                reply.put_bytes(0, &stored);
                self.reply(reply.as_bytes());
            }
            Command::LogicIcTestVector => self.logic_vector(&msg),
            Command::WriteBitstream => {
                let len = msg.get(protocol::bitstream::LENGTH) as usize;
                self.pending_write = Some(PendingWrite::Bitstream { len });
            }
            Command::Switch => self.switch(&msg)?,
            Command::BootloaderErase => self.bootloader_erase(&msg)?,
            Command::BootloaderWrite => self.bootloader_write(&msg)?,
            other => {
                return Err(Error::Transport(format!("dummy: {:?} not emulated", other)));
            }
        }
        Ok(())
    }

    fn system_info(&mut self) {
        use protocol::system_info as f;

        let status = match self.mode {
            DeviceMode::Normal => 1,
            DeviceMode::Bootloader => 2,
            DeviceMode::Unknown(s) => s,
        };
        let mut reply = Message::<FRAME_LEN>::zeroed();
        reply
            .set(f::STATUS, status.into())
            .set(f::FIRMWARE, self.config.firmware.into())
            .set(f::MODEL, self.config.model.into());
        put_ascii(&mut reply, f::DEVICE_CODE, f::DEVICE_CODE_LEN, &self.config.device_code);
        put_ascii(&mut reply, f::SERIAL, f::SERIAL_LEN, &self.config.serial);
        self.reply(reply.as_bytes());
    }

    fn begin(&mut self, msg: &Message<{ protocol::bootloader::BUFFER_LEN }>) -> Result<()> {
        self.require_mode(DeviceMode::Normal, "begin transaction")?;
        if self.config.family.requires_bitstream() && self.bitstream.is_none() {
            return Err(Error::Transport(
                "dummy: begin without an algorithm bitstream".to_string(),
            ));
        }
        log::debug!(
            "dummy: begin protocol 0x{:02X}",
            msg.get(protocol::begin::PROTOCOL_ID)
        );
        self.in_transaction = true;
        Ok(())
    }

    fn read_block(
        &mut self,
        cmd: Command,
        msg: &Message<{ protocol::bootloader::BUFFER_LEN }>,
    ) -> Result<()> {
        let region = match cmd {
            Command::ReadCode => Region::Code,
            Command::ReadData => Region::Data,
            _ => Region::User,
        };
        let addr = msg.get(protocol::block::ADDRESS) as usize;
        let len = msg.get(protocol::block::LENGTH) as usize;
        let mem = self.region(region);
        let end = addr + len;
        if end > mem.len() {
            return Err(Error::Transport(format!(
                "dummy: read past end of {:?} memory (0x{:X})",
                region, end
            )));
        }
        let bytes = mem[addr..end].to_vec();
        self.payload_in.extend(bytes);
        Ok(())
    }

    /// Emulate a healthy chip: every output reads as its expected level,
    /// high-Z and unconnected pins follow the bias resistor
    fn logic_vector(&mut self, msg: &Message<{ protocol::bootloader::BUFFER_LEN }>) {
        use protocol::logic as f;

        let pull_down = msg.get(f::VCC) as u8 & f::PULL_DOWN_BIT != 0;
        let pins = (msg.get(f::PIN_COUNT) as usize).min((REPLY_LEN - f::PINS) * 2);
        let bias = u8::from(!pull_down);

        let mut reply = Message::<REPLY_LEN>::zeroed();
        reply.put_bytes(0, msg.bytes(0, f::PINS));
        for i in 0..pins {
            let code = (msg.byte(f::PINS + i / 2) >> (4 * (i & 1))) & 0x0F;
            let mut level = match LogicState::from_code(code) {
                Some(LogicState::Zero | LogicState::Low | LogicState::Ground) => 0,
                Some(LogicState::One | LogicState::High | LogicState::Vcc) => 1,
                Some(LogicState::Clock) => 0,
                _ => bias,
            };
            if let Some(stuck) = self.config.stuck_pin {
                if stuck.pin == i {
                    level = stuck.level;
                }
            }
            let slot = &mut reply.as_mut_bytes()[f::PINS + i / 2];
            if i & 1 == 1 {
                *slot |= level << 4;
            } else {
                *slot = level;
            }
        }
        self.reply(reply.as_bytes());
    }

    fn ack(&mut self, field: Field, code: Option<u8>) {
        let mut reply = Message::<REPLY_LEN>::zeroed();
        reply.set(field, code.unwrap_or(0).into());
        self.reply(reply.as_bytes());
    }

    fn check_magic(&self, msg: &Message<{ protocol::bootloader::BUFFER_LEN }>) -> Result<()> {
        if msg.get(protocol::bootloader::MAGIC_FIELD) != protocol::bootloader::MAGIC {
            return Err(Error::Transport("dummy: bad bootloader magic".to_string()));
        }
        Ok(())
    }

    fn switch(&mut self, msg: &Message<{ protocol::bootloader::BUFFER_LEN }>) -> Result<()> {
        self.require_mode(DeviceMode::Normal, "bootloader switch")?;
        self.check_magic(msg)?;
        let code = self.config.fail_switch;
        if code.is_none() {
            self.next_mode = Some(DeviceMode::Bootloader);
        }
        self.ack(protocol::bootloader::SWITCH_ACK, code);
        Ok(())
    }

    fn bootloader_erase(
        &mut self,
        msg: &Message<{ protocol::bootloader::BUFFER_LEN }>,
    ) -> Result<()> {
        self.require_mode(DeviceMode::Bootloader, "bootloader erase")?;
        self.check_magic(msg)?;
        let code = self.config.fail_erase;
        if code.is_none() {
            self.firmware_erased = true;
            self.blocks_written = 0;
            self.update_complete = false;
        }
        self.ack(protocol::bootloader::ACK, code);
        Ok(())
    }

    fn bootloader_write(
        &mut self,
        msg: &Message<{ protocol::bootloader::BUFFER_LEN }>,
    ) -> Result<()> {
        use protocol::bootloader as f;

        self.require_mode(DeviceMode::Bootloader, "bootloader write")?;
        match msg.get(f::WRITE_MODE) {
            f::WRITE_MODE_START => self.check_magic(msg),
            f::WRITE_MODE_BLOCK => {
                if !self.firmware_erased {
                    return Err(Error::Transport("dummy: write before erase".to_string()));
                }
                let code = match self.config.fail_block {
                    Some((index, code)) if index == self.blocks_written => Some(code),
                    _ => None,
                };
                if code.is_none() {
                    self.blocks_written += 1;
                }
                self.ack(f::ACK, code);
                Ok(())
            }
            f::WRITE_MODE_FINAL => {
                if msg.get(f::FINAL_MAGIC) != f::FINAL_MAGIC_VALUE {
                    return Err(Error::Transport("dummy: bad final block magic".to_string()));
                }
                self.ack(f::ACK, None);
                Ok(())
            }
            f::WRITE_MODE_COMPLETE => {
                self.check_magic(msg)?;
                self.update_complete = true;
                self.next_mode = Some(DeviceMode::Normal);
                Ok(())
            }
            other => Err(Error::Transport(format!(
                "dummy: unknown bootloader write mode {}",
                other
            ))),
        }
    }
}

fn fuse_group(cmd: Command) -> u8 {
    match cmd {
        Command::ReadUser | Command::WriteUser => 0,
        Command::ReadCfg | Command::WriteCfg => 1,
        _ => 2,
    }
}

fn put_ascii<const N: usize>(msg: &mut Message<N>, offset: usize, len: usize, text: &str) {
    let bytes = text.as_bytes();
    msg.put_bytes(offset, &bytes[..bytes.len().min(len)]);
}

impl Transport for DummyProgrammer {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        log::trace!("dummy: recv frame {}", hex_dump(data));
        self.handle(data)
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<()> {
        let reply = self
            .replies
            .pop_front()
            .ok_or_else(|| Error::Transport("dummy: no reply pending".to_string()))?;
        buf.fill(0);
        let n = reply.len().min(buf.len());
        buf[..n].copy_from_slice(&reply[..n]);
        Ok(())
    }

    fn write_payload(&mut self, data: &[u8]) -> Result<()> {
        match self.pending_write.take() {
            // Only the header length is committed; the rest is padding
            Some(PendingWrite::Block { region, addr, len }) => {
                let mem = self.region(region);
                let end = (addr + len.min(data.len())).min(mem.len());
                if addr < end {
                    mem[addr..end].copy_from_slice(&data[..end - addr]);
                }
                Ok(())
            }
            Some(PendingWrite::Bitstream { len }) => {
                if data.len() != len {
                    return Err(Error::Transport(format!(
                        "dummy: bitstream header says {} bytes, got {}",
                        len,
                        data.len()
                    )));
                }
                self.bitstream = Some(data.to_vec());
                Ok(())
            }
            None => Err(Error::Transport("dummy: unexpected payload".to_string())),
        }
    }

    fn read_payload(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.payload_in.len() < buf.len() {
            return Err(Error::Transport(format!(
                "dummy: {} payload bytes requested, {} pending",
                buf.len(),
                self.payload_in.len()
            )));
        }
        for b in buf.iter_mut() {
            *b = self.payload_in.pop_front().unwrap_or(0);
        }
        Ok(())
    }

    fn reset_and_reopen(&mut self) -> Result<()> {
        if let Some(mode) = self.next_mode.take() {
            self.mode = mode;
        }
        if self.update_complete {
            self.config.firmware = self.config.updated_firmware;
            self.update_complete = false;
            self.firmware_erased = false;
        }
        self.in_transaction = false;
        self.bitstream = None;
        self.replies.clear();
        self.payload_in.clear();
        self.pending_write = None;
        log::debug!("dummy: reset, now in {} mode", self.mode);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minipro_core::descriptor::{DeviceFlags, Package};
    use minipro_core::{DeviceDescriptor, Handle, MemoryType, UpdateStage};
    use minipro_core::{FirmwareUpdater, TestVector};

    fn eeprom() -> DeviceDescriptor {
        DeviceDescriptor {
            name: "AT28C256".to_string(),
            protocol_id: 0x0D,
            code_memory_size: 0x8000,
            read_buffer_size: 0x40,
            write_buffer_size: 0x40,
            chip_id_bytes_count: 3,
            fuse_count: Some(0),
            ..Default::default()
        }
    }

    fn gate() -> DeviceDescriptor {
        let rows = ["00L00LGL00L00LV", "10L10LGL10L10LV", "11H11HGH11H11HV"];
        DeviceDescriptor {
            name: "74HC08".to_string(),
            protocol_id: 0x1F,
            package: Package {
                pin_count: 15,
                packed_package: 0,
            },
            vectors: rows
                .iter()
                .map(|r| r.parse::<TestVector>().unwrap())
                .collect(),
            ..Default::default()
        }
    }

    fn open(config: DummyConfig) -> Handle<DummyProgrammer> {
        let family = config.family;
        Handle::open(DummyProgrammer::new(config), family).unwrap()
    }

    fn image(version: u16, blocks: usize) -> Vec<u8> {
        let payload: Vec<u8> = (0..blocks * 0x114).map(|i| (i * 7) as u8).collect();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(0xF048_0000u32 | u32::from(version)).to_le_bytes());
        bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        bytes.extend_from_slice(&[0; 4]);
        bytes.extend_from_slice(&(blocks as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);
        bytes
    }

    #[derive(Default)]
    struct Stages(Vec<UpdateStage>, Option<UpdateStage>);

    impl minipro_core::UpdateProgress for Stages {
        fn stage(&mut self, stage: UpdateStage) {
            self.0.push(stage);
        }
        fn reflash(&mut self, _percent: u32) {}
        fn failed(&mut self, stage: UpdateStage, _error: &Error) {
            self.1 = Some(stage);
        }
    }

    #[test]
    fn test_system_info() {
        let handle = open(DummyConfig {
            firmware: 0x0125,
            device_code: "T48".to_string(),
            ..Default::default()
        });
        let info = handle.info();
        assert_eq!(info.mode, DeviceMode::Normal);
        assert_eq!(info.firmware_string(), "00.01.37");
        assert_eq!(info.device_code, "T48");
        assert_eq!(info.model, 7);
    }

    #[test]
    fn test_write_then_read_back() {
        let mut handle = open(DummyConfig::default());
        let dev = eeprom();
        let data: Vec<u8> = (0..0x40).map(|i| i as u8).collect();

        let mut session = handle.begin(&dev, false).unwrap();
        session.write_block(MemoryType::Code, 0x100, &data).unwrap();
        let mut buf = vec![0u8; 0x40];
        session.read_block(MemoryType::Code, 0x100, &mut buf).unwrap();
        session.end().unwrap();

        assert_eq!(buf, data);
        let programmer = handle.into_transport();
        assert!(!programmer.in_transaction());
        assert_eq!(programmer.code()[0xFF], 0xFF);
        assert_eq!(programmer.code()[0x140], 0xFF);
    }

    #[test]
    fn test_short_write_commits_header_length() {
        let mut handle = open(DummyConfig::default());
        let dev = eeprom();
        let mut session = handle.begin(&dev, false).unwrap();
        session.write_block(MemoryType::Data, 0, &[1, 2, 3]).unwrap();
        let mut buf = [0u8; 5];
        session.read_block(MemoryType::Data, 0, &mut buf).unwrap();
        session.end().unwrap();
        assert_eq!(buf, [1, 2, 3, 0xFF, 0xFF]);
    }

    #[test]
    fn test_read_past_end_fails() {
        let mut handle = open(DummyConfig {
            user_size: 16,
            ..Default::default()
        });
        let dev = eeprom();
        let mut session = handle.begin(&dev, false).unwrap();
        let mut buf = [0u8; 32];
        let result = session.read_block(MemoryType::User, 0, &mut buf);
        assert!(matches!(session.finish(result), Err(Error::Transport(_))));
    }

    #[test]
    fn test_fuse_round_trip() {
        let mut handle = open(DummyConfig::default());
        let dev = eeprom();
        let mut session = handle.begin(&dev, false).unwrap();
        session
            .write_fuses(MemoryType::FuseConfig, 2, Some(&[0xAA, 0x55]))
            .unwrap();
        // Opcode-only write leaves the stored value alone
        session.write_fuses(MemoryType::FuseConfig, 2, None).unwrap();
        let mut buf = [0u8; 2];
        session.read_fuses(MemoryType::FuseConfig, 2, &mut buf).unwrap();
        let mut lock = [0xEEu8; 2];
        session.read_fuses(MemoryType::FuseLock, 2, &mut lock).unwrap();
        session.end().unwrap();

        assert_eq!(buf, [0xAA, 0x55]);
        assert_eq!(lock, [0, 0]);
    }

    #[test]
    fn test_chip_id_byte_order() {
        let mut handle = open(DummyConfig::default());
        let dev = eeprom();
        let mut session = handle.begin(&dev, false).unwrap();
        let id = session.get_chip_id().unwrap();
        session.end().unwrap();
        assert_eq!(id.id_type, 1);
        assert_eq!(id.id, 0x1E950F);

        let mut handle = open(DummyConfig {
            chip_id_type: 3,
            chip_id: 0x3412,
            chip_id_len: 2,
            ..Default::default()
        });
        let dev = DeviceDescriptor {
            chip_id_bytes_count: 2,
            ..eeprom()
        };
        let mut session = handle.begin(&dev, false).unwrap();
        let id = session.get_chip_id().unwrap();
        session.end().unwrap();
        assert_eq!(id.id, 0x3412);
    }

    #[test]
    fn test_spi_autodetect() {
        let mut handle = open(DummyConfig::default());
        assert_eq!(handle.spi_autodetect(0).unwrap(), 0xEF4018);
    }

    #[test]
    fn test_erase_and_protect() {
        let mut programmer = DummyProgrammer::new_default();
        programmer.code_mut()[..4].copy_from_slice(&[1, 2, 3, 4]);
        let mut handle = Handle::open(programmer, ProgrammerFamily::T48).unwrap();
        let dev = eeprom();

        let mut session = handle.begin(&dev, false).unwrap();
        session.protect_off().unwrap();
        session.erase().unwrap();
        session.protect_on().unwrap();
        session.end().unwrap();

        let programmer = handle.into_transport();
        assert!(programmer.is_protected());
        assert!(programmer.code()[..4].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_jedec_rows() {
        let mut handle = open(DummyConfig::default());
        let dev = eeprom();
        let mut session = handle.begin(&dev, false).unwrap();
        session.write_jedec_row(&[0xA5, 0x5A, 0x01], 4, 0, 20).unwrap();
        let mut row = [0u8; 3];
        session.read_jedec_row(&mut row, 4, 0, 20).unwrap();
        session.end().unwrap();
        assert_eq!(row, [0xA5, 0x5A, 0x01]);
    }

    #[test]
    fn test_logic_gate_passes() {
        let mut handle = open(DummyConfig::default());
        let dev = gate();
        let mut session = handle.begin(&dev, false).unwrap();
        let result = session.logic_test().unwrap();
        session.end().unwrap();
        assert!(result.passed(), "{}", result);
        assert_eq!(result.grid.len(), 3);
    }

    #[test]
    fn test_logic_stuck_output_fails() {
        let mut handle = open(DummyConfig {
            stuck_pin: Some(StuckPin { pin: 2, level: 1 }),
            ..Default::default()
        });
        let dev = gate();
        let mut session = handle.begin(&dev, false).unwrap();
        let result = session.logic_test().unwrap();
        session.end().unwrap();
        assert!(!result.passed());
        // Pin 2 is L in the first two rows and H in the last
        assert_eq!(result.errors, 2);
        assert!(!result.grid[0][2].passed);
        assert!(result.grid[2][2].passed);
    }

    #[test]
    fn test_overcurrent_refuses_session() {
        let mut handle = open(DummyConfig {
            overcurrent: true,
            ..Default::default()
        });
        let dev = eeprom();
        assert!(matches!(handle.begin(&dev, false), Err(Error::Overcurrent)));
        let programmer = handle.into_transport();
        assert_eq!(programmer.commands(), &[0x00, 0x03, 0x39]);
    }

    #[test]
    fn test_t56_uploads_bitstream_once() {
        let config = DummyConfig {
            family: ProgrammerFamily::T56,
            firmware: 0x0147,
            ..Default::default()
        };
        let source = |name: &str| -> Result<Vec<u8>> { Ok(name.as_bytes().to_vec()) };
        let mut handle = open(config).with_algorithms(Box::new(source));
        let dev = eeprom();

        for _ in 0..2 {
            let session = handle.begin(&dev, false).unwrap();
            session.end().unwrap();
        }
        assert!(handle.bitstream_loaded());
        let uploads = handle
            .transport_mut()
            .commands()
            .iter()
            .filter(|&&c| c == 0x26)
            .count();
        assert_eq!(uploads, 1);
        assert_eq!(handle.transport_mut().bitstream(), Some(&b"EE28C32P00"[..]));
    }

    #[test]
    fn test_t56_without_algorithms_is_refused() {
        let config = DummyConfig {
            family: ProgrammerFamily::T56,
            firmware: 0x0147,
            ..Default::default()
        };
        let mut handle = open(config);
        let dev = eeprom();
        assert!(matches!(handle.begin(&dev, false), Err(Error::Bitstream(_))));
        assert!(!handle.bitstream_loaded());
    }

    #[test]
    fn test_firmware_update() {
        let mut handle = open(DummyConfig {
            firmware: 0x0100,
            updated_firmware: 0x0150,
            ..Default::default()
        });
        let mut progress = Stages::default();
        let mut confirm = |_: &minipro_core::UpdateSummary| true;

        FirmwareUpdater::new(&mut handle)
            .update(&image(0x0150, 3), &mut confirm, &mut progress)
            .unwrap();

        assert_eq!(handle.info().mode, DeviceMode::Normal);
        assert_eq!(handle.info().firmware, 0x0150);
        assert_eq!(handle.transport_mut().blocks_written(), 3);
        assert_eq!(progress.0.last(), Some(&UpdateStage::Done));
        assert!(progress.0.contains(&UpdateStage::BootloaderSwitch));
        assert_eq!(progress.1, None);
    }

    #[test]
    fn test_firmware_update_from_bootloader_skips_switch() {
        let mut handle = open(DummyConfig {
            bootloader: true,
            ..Default::default()
        });
        let mut progress = Stages::default();
        let mut confirm = |_: &minipro_core::UpdateSummary| true;

        FirmwareUpdater::new(&mut handle)
            .update(&image(0x0150, 1), &mut confirm, &mut progress)
            .unwrap();

        assert!(!progress.0.contains(&UpdateStage::BootloaderSwitch));
        assert!(!handle.transport_mut().commands().contains(&0x3D));
        assert_eq!(handle.info().mode, DeviceMode::Normal);
    }

    #[test]
    fn test_firmware_erase_nack() {
        let mut handle = open(DummyConfig {
            fail_erase: Some(3),
            ..Default::default()
        });
        let mut progress = Stages::default();
        let mut confirm = |_: &minipro_core::UpdateSummary| true;

        let err = FirmwareUpdater::new(&mut handle)
            .update(&image(0x0150, 2), &mut confirm, &mut progress)
            .unwrap_err();
        assert!(matches!(err, Error::DeviceAck { code: 3, .. }));
        assert_eq!(progress.1, Some(UpdateStage::Erase));
        assert_eq!(handle.transport_mut().mode(), DeviceMode::Bootloader);
    }

    #[test]
    fn test_firmware_block_nack() {
        let mut handle = open(DummyConfig {
            fail_block: Some((1, 9)),
            ..Default::default()
        });
        let mut progress = Stages::default();
        let mut confirm = |_: &minipro_core::UpdateSummary| true;

        let err = FirmwareUpdater::new(&mut handle)
            .update(&image(0x0150, 4), &mut confirm, &mut progress)
            .unwrap_err();
        assert!(matches!(err, Error::DeviceAck { code: 9, .. }));
        assert_eq!(progress.1, Some(UpdateStage::ReflashBlocks));
        assert_eq!(handle.transport_mut().blocks_written(), 1);
    }

    #[test]
    fn test_firmware_switch_nack_leaves_normal_mode() {
        let mut handle = open(DummyConfig {
            fail_switch: Some(1),
            ..Default::default()
        });
        let mut progress = Stages::default();
        let mut confirm = |_: &minipro_core::UpdateSummary| true;

        let result =
            FirmwareUpdater::new(&mut handle).update(&image(0x0150, 1), &mut confirm, &mut progress);
        assert!(matches!(result, Err(Error::DeviceAck { code: 1, .. })));
        assert_eq!(handle.transport_mut().mode(), DeviceMode::Normal);
    }

    #[test]
    fn test_custom_protocol_without_bitbang() {
        let mut handle = open(DummyConfig::default());
        let dev = DeviceDescriptor {
            flags: DeviceFlags {
                raw: 0,
                custom_protocol: true,
            },
            ..eeprom()
        };
        assert!(matches!(handle.begin(&dev, false), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_recv_without_reply() {
        let mut programmer = DummyProgrammer::new_default();
        let mut buf = [0u8; 8];
        assert!(programmer.recv(&mut buf).is_err());
        assert!(programmer.write_payload(&[1]).is_err());
    }
}
