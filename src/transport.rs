//! Byte-level transport under the transaction engine.
//!
//! `Transport` is the seam between the engine and the physical device:
//! synchronous bulk read/write plus an optional interrupt read for
//! asynchronous event containers. `UsbTransport` is the production
//! implementation over a rusb handle; tests substitute scripted fakes.

use crate::{PtpError, Result};
use std::time::Duration;

/// Synchronous byte transport to one physical camera.
pub trait Transport: Send {
    /// Write the whole buffer to the bulk-out endpoint.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Read one bulk-in transfer into `buf`, returning the byte count.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Read one interrupt-in transfer, returning 0 when nothing is pending.
    /// Generic PTP delivers event containers here; vendor extensions that
    /// poll instead never call it.
    fn read_event(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }
}

/// USB Still Imaging class code (PTP).
const STILL_IMAGING_CLASS: u8 = 6;

/// PTP over a rusb bulk interface.
pub struct UsbTransport {
    handle: rusb::DeviceHandle<rusb::Context>,
    interface: u8,
    ep_in: u8,
    ep_out: u8,
    ep_event: Option<u8>,
    timeout: Duration,
}

impl UsbTransport {
    /// Open the still-imaging interface of a camera and claim it.
    pub fn open(device: &rusb::Device<rusb::Context>) -> Result<UsbTransport> {
        let config = device.active_config_descriptor()?;
        for interface in config.interfaces() {
            for descriptor in interface.descriptors() {
                if descriptor.class_code() != STILL_IMAGING_CLASS {
                    continue;
                }
                let mut ep_in = None;
                let mut ep_out = None;
                let mut ep_event = None;
                for endpoint in descriptor.endpoint_descriptors() {
                    match (endpoint.transfer_type(), endpoint.direction()) {
                        (rusb::TransferType::Bulk, rusb::Direction::In) => {
                            ep_in = Some(endpoint.address())
                        }
                        (rusb::TransferType::Bulk, rusb::Direction::Out) => {
                            ep_out = Some(endpoint.address())
                        }
                        (rusb::TransferType::Interrupt, rusb::Direction::In) => {
                            ep_event = Some(endpoint.address())
                        }
                        _ => {}
                    }
                }
                let (Some(ep_in), Some(ep_out)) = (ep_in, ep_out) else {
                    continue;
                };

                let handle = device.open()?;
                let iface = descriptor.interface_number();
                match handle.detach_kernel_driver(iface) {
                    Ok(_) => log::debug!("detached kernel driver from interface {}", iface),
                    Err(rusb::Error::NotFound) | Err(rusb::Error::NotSupported) => {}
                    Err(e) => log::warn!("detach kernel driver: {} (continuing)", e),
                }
                handle.claim_interface(iface)?;
                log::info!(
                    "claimed still-imaging interface {} (in=0x{:02x} out=0x{:02x})",
                    iface,
                    ep_in,
                    ep_out
                );
                return Ok(UsbTransport {
                    handle,
                    interface: iface,
                    ep_in,
                    ep_out,
                    ep_event,
                    timeout: Duration::from_secs(5),
                });
            }
        }
        Err(PtpError::DeviceNotFound)
    }
}

impl Transport for UsbTransport {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let mut sent = 0;
        while sent < buf.len() {
            sent += self.handle.write_bulk(self.ep_out, &buf[sent..], self.timeout)?;
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.handle.read_bulk(self.ep_in, buf, self.timeout)?)
    }

    fn read_event(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(ep) = self.ep_event else {
            return Ok(0);
        };
        match self
            .handle
            .read_interrupt(ep, buf, Duration::from_millis(10))
        {
            Ok(n) => Ok(n),
            Err(rusb::Error::Timeout) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(self.interface) {
            log::debug!("release interface {}: {}", self.interface, e);
        }
    }
}
