//! Bulk-endpoint transport
//!
//! The programmer uses two bulk endpoint pairs on interface 0: endpoint 1
//! carries command frames and their replies, endpoint 2 carries block
//! payloads.

use std::thread;
use std::time::Duration;

use minipro_core::transport::Transport;
use nusb::transfer::{Buffer, Bulk, In, Out};
use nusb::{Device, Endpoint, Interface, MaybeFuture};

use crate::error::{Result, UsbError};
use crate::location::UsbLocation;

/// Message channel OUT endpoint
const MSG_OUT_EP: u8 = 0x01;
/// Message channel IN endpoint
const MSG_IN_EP: u8 = 0x81;
/// Payload channel OUT endpoint
const PAYLOAD_OUT_EP: u8 = 0x02;
/// Payload channel IN endpoint
const PAYLOAD_IN_EP: u8 = 0x82;

/// Timeout for command frames
const MSG_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for block payloads
const PAYLOAD_TIMEOUT: Duration = Duration::from_secs(20);

/// How long to wait for the device after a reset
const REOPEN_ATTEMPTS: u32 = 50;
const REOPEN_DELAY: Duration = Duration::from_millis(100);

/// USB link to one programmer
pub struct UsbTransport {
    location: UsbLocation,
    device: Device,
    interface: Interface,
}

impl UsbTransport {
    /// Open the device attached at `location`
    pub fn open(location: UsbLocation) -> Result<Self> {
        let info = find(&location)?.ok_or_else(|| UsbError::NotFound(location.clone()))?;
        log::info!(
            "Opening programmer at {} ({:04x}:{:04x})",
            location,
            info.vendor_id(),
            info.product_id()
        );
        let (device, interface) = open_info(&info)?;
        Ok(Self {
            location,
            device,
            interface,
        })
    }

    /// Where this transport is attached
    pub fn location(&self) -> &UsbLocation {
        &self.location
    }

    fn bulk_write(&mut self, ep: u8, data: &[u8], timeout: Duration) -> Result<()> {
        let mut out_ep: Endpoint<Bulk, Out> = self.interface.endpoint(ep)?;

        let mut out_buf = Buffer::new(data.len());
        out_buf.extend_from_slice(data);

        out_ep
            .transfer_blocking(out_buf, timeout)
            .into_result()
            .map_err(|e| UsbError::TransferFailed(e.to_string()))?;
        Ok(())
    }

    fn bulk_read(&mut self, ep: u8, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let mut in_ep: Endpoint<Bulk, In> = self.interface.endpoint(ep)?;

        let max_packet_size = in_ep.max_packet_size();
        let request_len = buf.len().div_ceil(max_packet_size) * max_packet_size;
        let mut in_buf = Buffer::new(request_len);
        in_buf.set_requested_len(request_len);

        let data = in_ep
            .transfer_blocking(in_buf, timeout)
            .into_result()
            .map_err(|e| UsbError::TransferFailed(e.to_string()))?;

        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn reopen(&mut self) -> Result<()> {
        for _ in 0..REOPEN_ATTEMPTS {
            thread::sleep(REOPEN_DELAY);
            if let Some(info) = find(&self.location)? {
                match open_info(&info) {
                    Ok((device, interface)) => {
                        self.device = device;
                        self.interface = interface;
                        log::debug!("Reopened programmer at {}", self.location);
                        return Ok(());
                    }
                    Err(e) => log::trace!("Reopen attempt failed: {}", e),
                }
            }
        }
        Err(UsbError::ReopenTimeout(self.location.clone()))
    }
}

fn find(location: &UsbLocation) -> Result<Option<nusb::DeviceInfo>> {
    let mut devices = nusb::list_devices()
        .wait()
        .map_err(|e| UsbError::OpenFailed(e.to_string()))?;
    Ok(devices.find(|d| location.matches(d)))
}

fn open_info(info: &nusb::DeviceInfo) -> Result<(Device, Interface)> {
    let device = info
        .open()
        .wait()
        .map_err(|e| UsbError::OpenFailed(e.to_string()))?;
    let interface = device
        .claim_interface(0)
        .wait()
        .map_err(|e| UsbError::ClaimFailed(e.to_string()))?;
    Ok((device, interface))
}

impl Transport for UsbTransport {
    fn send(&mut self, data: &[u8]) -> minipro_core::Result<()> {
        Ok(self.bulk_write(MSG_OUT_EP, data, MSG_TIMEOUT)?)
    }

    /// Short replies are zero-filled; the firmware pads most replies itself
    fn recv(&mut self, buf: &mut [u8]) -> minipro_core::Result<()> {
        let len = self.bulk_read(MSG_IN_EP, buf, MSG_TIMEOUT)?;
        if len < buf.len() {
            log::trace!("Short reply: {} of {} bytes", len, buf.len());
            buf[len..].fill(0);
        }
        Ok(())
    }

    fn write_payload(&mut self, data: &[u8]) -> minipro_core::Result<()> {
        Ok(self.bulk_write(PAYLOAD_OUT_EP, data, PAYLOAD_TIMEOUT)?)
    }

    fn read_payload(&mut self, buf: &mut [u8]) -> minipro_core::Result<()> {
        let len = self.bulk_read(PAYLOAD_IN_EP, buf, PAYLOAD_TIMEOUT)?;
        if len != buf.len() {
            return Err(UsbError::ShortRead {
                expected: buf.len(),
                actual: len,
            }
            .into());
        }
        Ok(())
    }

    fn reset_and_reopen(&mut self) -> minipro_core::Result<()> {
        log::debug!("Resetting programmer at {}", self.location);
        // The device drops off the bus during reset, so errors here are expected
        if let Err(e) = self.device.reset().wait() {
            log::debug!("Reset returned: {}", e);
        }
        Ok(self.reopen()?)
    }
}
