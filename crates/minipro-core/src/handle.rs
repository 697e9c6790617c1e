//! Programmer handle
//!
//! A [`Handle`] owns the transport to one programmer. It remembers what the
//! programmer reported about itself and which algorithm bitstream has been
//! uploaded, and it opens [`Session`]s for individual devices.

use crate::backend::{NativeProtocol, TransactionBackend};
use crate::bitstream::{self, AlgorithmSource};
use crate::chip_id;
use crate::descriptor::DeviceDescriptor;
use crate::error::{Error, Result};
use crate::family::ProgrammerFamily;
use crate::session::Session;
use crate::status::{self, format_version, DeviceMode, SystemInfo};
use crate::transport::Transport;

/// Connection to one programmer
pub struct Handle<T: Transport> {
    transport: T,
    family: ProgrammerFamily,
    info: SystemInfo,
    native: NativeProtocol,
    bitbang: Option<Box<dyn TransactionBackend>>,
    algorithms: Option<Box<dyn AlgorithmSource>>,
    bitstream_loaded: bool,
}

impl<T: Transport> Handle<T> {
    /// Query the programmer behind `transport` and wrap it
    pub fn open(mut transport: T, family: ProgrammerFamily) -> Result<Self> {
        let info = status::get_system_info(&mut transport)?;
        log::info!(
            "{} programmer: firmware {}, {} mode, code {:?}",
            family,
            info.firmware_string(),
            info.mode,
            info.device_code
        );
        check_firmware(family, &info);

        Ok(Self {
            transport,
            family,
            info,
            native: NativeProtocol::new(family),
            bitbang: None,
            algorithms: None,
            bitstream_loaded: false,
        })
    }

    /// Register the backend used for `custom_protocol` devices
    pub fn with_bitbang(mut self, backend: Box<dyn TransactionBackend>) -> Self {
        self.bitbang = Some(backend);
        self
    }

    /// Register where FPGA algorithm bitstreams come from
    pub fn with_algorithms(mut self, source: Box<dyn AlgorithmSource>) -> Self {
        self.algorithms = Some(source);
        self
    }

    pub fn family(&self) -> ProgrammerFamily {
        self.family
    }

    /// System information captured at open or the last reconnect
    pub fn info(&self) -> &SystemInfo {
        &self.info
    }

    /// Whether an algorithm bitstream has been uploaded since the last reset
    pub fn bitstream_loaded(&self) -> bool {
        self.bitstream_loaded
    }

    /// Direct access to the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Query system information again
    pub fn refresh_info(&mut self) -> Result<&SystemInfo> {
        self.info = status::get_system_info(&mut self.transport)?;
        Ok(&self.info)
    }

    /// Reset the programmer, reopen it and query it again
    ///
    /// The programmer forgets its FPGA configuration on reset, so the
    /// bitstream flag is cleared.
    pub fn reconnect(&mut self) -> Result<&SystemInfo> {
        log::debug!("Resetting programmer");
        self.bitstream_loaded = false;
        self.transport.reset_and_reopen()?;
        self.refresh_info()
    }

    /// Fail unless the programmer currently reports `mode`
    pub fn expect_mode(&self, mode: DeviceMode) -> Result<()> {
        if self.info.mode != mode {
            return Err(Error::UnexpectedMode {
                expected: mode,
                actual: self.info.mode,
            });
        }
        Ok(())
    }

    /// Probe for a serial flash without a device session
    pub fn spi_autodetect(&mut self, probe: u8) -> Result<u32> {
        chip_id::spi_autodetect(&mut self.transport, probe)
    }

    /// Power up `device` and open a session on it
    ///
    /// The backend is selected here from the device's `custom_protocol`
    /// flag. On T56 the algorithm bitstream is uploaded first. If the
    /// programmer reports overcurrent after the begin frame, no session is
    /// created and nothing else is sent.
    pub fn begin<'a>(
        &'a mut self,
        device: &'a DeviceDescriptor,
        icsp: bool,
    ) -> Result<Session<'a>> {
        let backend: &mut dyn TransactionBackend = if device.flags.custom_protocol {
            self.bitbang.as_deref_mut().ok_or_else(|| {
                Error::Unsupported(format!("{} needs a bit-bang backend", device.name))
            })?
        } else {
            if self.family.requires_bitstream() {
                bitstream::ensure_loaded(
                    &mut self.transport,
                    self.algorithms.as_deref(),
                    device,
                    &mut self.bitstream_loaded,
                )?;
            }
            &mut self.native
        };
        log::debug!("Opening {} session on {} backend", device.name, backend.name());

        backend.begin_transaction(&mut self.transport, device, icsp)?;
        let status = status::get_status(&mut self.transport)?;
        if status.is_overcurrent() {
            log::error!("Overcurrent protection!");
            return Err(Error::Overcurrent);
        }

        Ok(Session::new(&mut self.transport, backend, device))
    }
}

fn check_firmware(family: ProgrammerFamily, info: &SystemInfo) {
    if info.mode == DeviceMode::Bootloader {
        log::warn!("{} is in bootloader mode, update the firmware", family);
        return;
    }
    if let Some((expected, name)) = family.expected_firmware() {
        if info.firmware < expected {
            log::warn!(
                "{} firmware {} is older than {} ({}), please update",
                family,
                info.firmware_string(),
                format_version(expected.into()),
                name
            );
        } else if info.firmware > expected {
            log::warn!(
                "{} firmware {} is newer than the last tested version {}",
                family,
                info.firmware_string(),
                name
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip_id::ChipId;
    use crate::descriptor::{DeviceFlags, MemoryType};
    use crate::mock::{Channel, MockTransport};
    use crate::status::Status;

    fn open(family: ProgrammerFamily) -> Handle<MockTransport> {
        let mut t = MockTransport::new();
        t.info_reply(1, 0x0147);
        Handle::open(t, family).unwrap()
    }

    fn device() -> DeviceDescriptor {
        DeviceDescriptor {
            name: "W25Q32".into(),
            protocol_id: 3,
            variant: 0x1100,
            ..Default::default()
        }
    }

    /// Records calls so backend selection can be observed
    #[derive(Default)]
    struct RecordingBackend {
        calls: std::rc::Rc<std::cell::RefCell<Vec<&'static str>>>,
    }

    impl TransactionBackend for RecordingBackend {
        fn name(&self) -> &'static str {
            "recording"
        }
        fn begin_transaction(&mut self, _: &mut dyn Transport, _: &DeviceDescriptor, _: bool) -> Result<()> {
            self.calls.borrow_mut().push("begin");
            Ok(())
        }
        fn end_transaction(&mut self, _: &mut dyn Transport, _: &DeviceDescriptor) -> Result<()> {
            self.calls.borrow_mut().push("end");
            Ok(())
        }
        fn read_block(&mut self, _: &mut dyn Transport, _: &DeviceDescriptor, _: MemoryType, _: u32, buf: &mut [u8]) -> Result<()> {
            self.calls.borrow_mut().push("read_block");
            buf.fill(0x42);
            Ok(())
        }
        fn write_block(&mut self, _: &mut dyn Transport, _: &DeviceDescriptor, _: MemoryType, _: u32, _: &[u8]) -> Result<()> {
            Ok(())
        }
        fn read_fuses(&mut self, _: &mut dyn Transport, _: &DeviceDescriptor, _: MemoryType, _: u8, _: &mut [u8]) -> Result<()> {
            Ok(())
        }
        fn write_fuses(&mut self, _: &mut dyn Transport, _: &DeviceDescriptor, _: MemoryType, _: u8, _: Option<&[u8]>) -> Result<()> {
            Ok(())
        }
        fn get_chip_id(&mut self, _: &mut dyn Transport, _: &DeviceDescriptor) -> Result<ChipId> {
            Ok(ChipId { id_type: 1, id: 0 })
        }
        fn spi_autodetect(&mut self, _: &mut dyn Transport, _: u8) -> Result<u32> {
            Ok(0)
        }
        fn erase(&mut self, _: &mut dyn Transport, _: &DeviceDescriptor) -> Result<()> {
            Ok(())
        }
        fn write_jedec_row(&mut self, _: &mut dyn Transport, _: &DeviceDescriptor, _: &[u8], _: u8, _: u8, _: u8) -> Result<()> {
            Ok(())
        }
        fn read_jedec_row(&mut self, _: &mut dyn Transport, _: &DeviceDescriptor, _: &mut [u8], _: u8, _: u8, _: u8) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_begin_and_end_frames() {
        let mut handle = open(ProgrammerFamily::T48);
        handle.transport_mut().status_reply(0);
        let dev = device();

        let session = handle.begin(&dev, false).unwrap();
        session.end().unwrap();

        let sent = handle.transport_mut().sent().iter().map(|f| f[0]).collect::<Vec<_>>();
        assert_eq!(sent, vec![0x00, 0x03, 0x39, 0x04]);
    }

    #[test]
    fn test_overcurrent_aborts_begin() {
        let mut handle = open(ProgrammerFamily::T48);
        handle.transport_mut().status_reply(1);
        let dev = device();

        let err = handle.begin(&dev, false).err().unwrap();
        assert!(matches!(err, Error::Overcurrent));

        let t = handle.transport_mut();
        let sent = t.sent().iter().map(|f| f[0]).collect::<Vec<_>>();
        assert_eq!(sent, vec![0x00, 0x03, 0x39]);
        assert_eq!(t.pending_replies(), 0);
    }

    #[test]
    fn test_dropped_session_sends_end() {
        let mut handle = open(ProgrammerFamily::T48);
        handle.transport_mut().status_reply(0);
        let dev = device();
        {
            let _session = handle.begin(&dev, false).unwrap();
        }
        assert_eq!(handle.transport_mut().sent().last().unwrap()[0], 0x04);
    }

    #[test]
    fn test_finish_keeps_operation_error() {
        let mut handle = open(ProgrammerFamily::T48);
        handle.transport_mut().status_reply(0);
        let dev = device();
        let mut session = handle.begin(&dev, false).unwrap();
        let result = session.read_fuses(MemoryType::Code, 1, &mut [0u8; 1]);
        let result = session.finish(result);
        assert!(matches!(result, Err(Error::Protocol(_))));
        assert_eq!(handle.transport_mut().sent().last().unwrap()[0], 0x04);
    }

    #[test]
    fn test_custom_protocol_uses_bitbang_backend() {
        let backend = RecordingBackend::default();
        let calls = backend.calls.clone();
        let mut handle = open(ProgrammerFamily::T48).with_bitbang(Box::new(backend));
        handle.transport_mut().status_reply(0);

        let dev = DeviceDescriptor {
            flags: DeviceFlags {
                raw: 0,
                custom_protocol: true,
            },
            ..device()
        };
        let mut session = handle.begin(&dev, false).unwrap();
        assert_eq!(session.backend_name(), "recording");
        let mut buf = [0u8; 2];
        session.read_block(MemoryType::Code, 0, &mut buf).unwrap();
        session.end().unwrap();

        assert_eq!(buf, [0x42, 0x42]);
        assert_eq!(*calls.borrow(), vec!["begin", "read_block", "end"]);
        // only system info and the overcurrent check went over the native channel
        let sent = handle.transport_mut().sent().iter().map(|f| f[0]).collect::<Vec<_>>();
        assert_eq!(sent, vec![0x00, 0x39]);
    }

    #[test]
    fn test_custom_protocol_status_reports_overcurrent_only() {
        let mut handle =
            open(ProgrammerFamily::T48).with_bitbang(Box::new(RecordingBackend::default()));
        handle.transport_mut().status_reply(0);
        let mut reply = [0u8; 32];
        reply[0] = 1;
        reply[2..4].copy_from_slice(&0x1234u16.to_le_bytes());
        reply[4..6].copy_from_slice(&0x5678u16.to_le_bytes());
        reply[8..12].copy_from_slice(&0x0000_0100u32.to_le_bytes());
        reply[12] = 1;
        handle.transport_mut().reply(&reply);

        let dev = DeviceDescriptor {
            flags: DeviceFlags {
                raw: 0,
                custom_protocol: true,
            },
            ..device()
        };
        let mut session = handle.begin(&dev, false).unwrap();
        let status = session.status().unwrap();
        session.end().unwrap();

        assert_eq!(
            status,
            Status {
                overcurrent: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_native_status_keeps_verify_fields() {
        let mut handle = open(ProgrammerFamily::T48);
        handle.transport_mut().status_reply(0);
        let mut reply = [0u8; 32];
        reply[0] = 1;
        reply[2..4].copy_from_slice(&0x1234u16.to_le_bytes());
        reply[4..6].copy_from_slice(&0x5678u16.to_le_bytes());
        reply[8..12].copy_from_slice(&0x0000_0100u32.to_le_bytes());
        handle.transport_mut().reply(&reply);

        let dev = device();
        let mut session = handle.begin(&dev, false).unwrap();
        let status = session.status().unwrap();
        session.end().unwrap();

        assert_eq!(status.error, 1);
        assert_eq!(status.c1, 0x1234);
        assert_eq!(status.c2, 0x5678);
        assert_eq!(status.address, 0x100);
    }

    #[test]
    fn test_custom_protocol_without_backend_is_unsupported() {
        let mut handle = open(ProgrammerFamily::T48);
        let dev = DeviceDescriptor {
            flags: DeviceFlags {
                raw: 0,
                custom_protocol: true,
            },
            ..device()
        };
        assert!(matches!(handle.begin(&dev, false), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_t56_uploads_bitstream_once_per_reset() {
        let source = |name: &str| -> Result<Vec<u8>> {
            assert_eq!(name, "SPI25FLASH11");
            Ok(vec![1, 2, 3])
        };
        let mut handle = open(ProgrammerFamily::T56).with_algorithms(Box::new(source));
        let dev = device();

        for _ in 0..2 {
            handle.transport_mut().status_reply(0);
            handle.begin(&dev, false).unwrap().end().unwrap();
        }
        assert!(handle.bitstream_loaded());
        assert_eq!(handle.transport_mut().count(Channel::PayloadOut), 1);

        handle.transport_mut().info_reply(1, 0x0147);
        handle.reconnect().unwrap();
        assert!(!handle.bitstream_loaded());

        handle.transport_mut().status_reply(0);
        handle.begin(&dev, false).unwrap().end().unwrap();
        assert_eq!(handle.transport_mut().count(Channel::PayloadOut), 2);
    }

    #[test]
    fn test_t56_missing_bitstream_aborts_before_begin() {
        let mut handle = open(ProgrammerFamily::T56);
        let dev = device();
        assert!(matches!(handle.begin(&dev, false), Err(Error::Bitstream(_))));
        let sent = handle.transport_mut().sent().iter().map(|f| f[0]).collect::<Vec<_>>();
        assert_eq!(sent, vec![0x00]);
    }

    #[test]
    fn test_expect_mode() {
        let handle = open(ProgrammerFamily::T48);
        assert!(handle.expect_mode(DeviceMode::Normal).is_ok());
        assert!(matches!(
            handle.expect_mode(DeviceMode::Bootloader),
            Err(Error::UnexpectedMode { .. })
        ));
    }
}
