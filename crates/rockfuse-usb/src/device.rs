//! RockUSB device implementation
//!
//! Owns the claimed USB interface and implements the four protocol
//! operations: read-flash-id, read-flash-info, read-lba and write-lba.
//! Each operation is one blocking command/data/status cycle on the
//! bulk endpoint pair; the device has no command multiplexing, so
//! callers serialize access.

use std::time::Duration;

use nusb::transfer::{Buffer, Bulk, In, Out};
use nusb::{Endpoint, Interface, MaybeFuture};

use rockfuse_core::error::{Error, Result};
use rockfuse_core::{FlashGeometry, SectorDevice, SECTOR_SIZE};

use crate::protocol::*;

/// A Rockchip device in recovery mode.
///
/// One session per process: opened at startup, torn down at exit, no
/// reconnect logic.
pub struct Rockusb {
    interface: Interface,
    in_endpoint: u8,
    out_endpoint: u8,
    timeout: Duration,
}

impl Rockusb {
    /// Open the first attached device in recovery mode and claim its
    /// interface.
    pub fn open() -> Result<Self> {
        let device_info = nusb::list_devices()
            .wait()
            .map_err(|e| Error::OpenFailed(e.to_string()))?
            .find(|d| {
                d.vendor_id() == ROCKCHIP_USB_VENDOR && d.product_id() == ROCKCHIP_USB_PRODUCT
            })
            .ok_or(Error::DeviceNotFound {
                vid: ROCKCHIP_USB_VENDOR,
                pid: ROCKCHIP_USB_PRODUCT,
            })?;

        log::info!(
            "opening device at bus {} address {}",
            device_info.busnum(),
            device_info.device_address()
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| Error::OpenFailed(e.to_string()))?;

        let interface = device
            .claim_interface(0)
            .wait()
            .map_err(|e| Error::ClaimFailed(e.to_string()))?;

        Ok(Self {
            interface,
            in_endpoint: BULK_IN_EP,
            out_endpoint: BULK_OUT_EP,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        })
    }

    /// Blocking bulk OUT transfer. A short transfer is an error, never
    /// a partial success to be retried.
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut out_ep: Endpoint<Bulk, Out> = self
            .interface
            .endpoint(self.out_endpoint)
            .map_err(|e| Error::TransferFailed(e.to_string()))?;

        let mut buf = Buffer::new(data.len());
        buf.extend_from_slice(data);

        let completion = out_ep.transfer_blocking(buf, self.timeout);
        match completion.status {
            Ok(()) if completion.actual_len == data.len() => Ok(()),
            Ok(()) => Err(Error::TransferFailed(format!(
                "short bulk write: requested {}, sent {}",
                data.len(),
                completion.actual_len
            ))),
            Err(e) => Err(Error::TransferFailed(e.to_string())),
        }
    }

    /// Blocking bulk IN transfer filling `buf` exactly. The request is
    /// rounded up to the endpoint packet size; the device must still
    /// deliver exactly the expected byte count.
    fn receive(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut in_ep: Endpoint<Bulk, In> = self
            .interface
            .endpoint(self.in_endpoint)
            .map_err(|e| Error::TransferFailed(e.to_string()))?;

        let max_packet_size = in_ep.max_packet_size();
        let request_len = buf.len().div_ceil(max_packet_size) * max_packet_size;
        let mut in_buf = Buffer::new(request_len);
        in_buf.set_requested_len(request_len);

        let completion = in_ep.transfer_blocking(in_buf, self.timeout);
        let data = completion
            .into_result()
            .map_err(|e| Error::TransferFailed(e.to_string()))?;

        if data.len() != buf.len() {
            return Err(Error::TransferFailed(format!(
                "short bulk read: requested {}, got {}",
                buf.len(),
                data.len()
            )));
        }
        buf.copy_from_slice(&data[..buf.len()]);
        Ok(())
    }

    fn receive_csw(&mut self, cbw: &Cbw) -> Result<Csw> {
        let mut raw = [0u8; CSW_SIZE];
        self.receive(&mut raw)?;
        let csw = Csw::from_bytes(&raw);
        csw.check(cbw.tag)?;
        Ok(csw)
    }

    /// Read the 5-byte flash identifier.
    pub fn read_flash_id(&mut self) -> Result<[u8; FLASH_ID_SIZE]> {
        let cbw = Cbw::read_flash_id();
        self.send(&cbw.to_bytes())?;
        let mut id = [0u8; FLASH_ID_SIZE];
        self.receive(&mut id)?;
        self.receive_csw(&cbw)?;
        Ok(id)
    }

    /// Query flash geometry.
    pub fn read_flash_info(&mut self) -> Result<FlashGeometry> {
        let cbw = Cbw::read_flash_info();
        self.send(&cbw.to_bytes())?;
        let mut raw = [0u8; FLASH_INFO_SIZE];
        self.receive(&mut raw)?;
        self.receive_csw(&cbw)?;
        Ok(parse_flash_info(&raw))
    }

    /// Read `count` sectors starting at `start` into `buf`.
    pub fn read_lba(&mut self, start: u32, count: u16, buf: &mut [u8]) -> Result<()> {
        log::trace!("read_lba: start={:#010x} count={}", start, count);
        debug_assert_eq!(buf.len(), count as usize * SECTOR_SIZE);

        let cbw = Cbw::read_lba(start, count);
        self.send(&cbw.to_bytes())?;
        self.receive(buf)?;
        let csw = self.receive_csw(&cbw)?;
        if csw.status != 0 {
            return Err(Error::DeviceFailure(csw.status));
        }
        Ok(())
    }

    /// Write `count` sectors starting at `start` from `buf`.
    pub fn write_lba(&mut self, start: u32, count: u16, buf: &[u8]) -> Result<()> {
        log::trace!("write_lba: start={:#010x} count={}", start, count);
        debug_assert_eq!(buf.len(), count as usize * SECTOR_SIZE);

        let cbw = Cbw::write_lba(start, count);
        self.send(&cbw.to_bytes())?;
        self.send(buf)?;
        let csw = self.receive_csw(&cbw)?;
        if csw.status != 0 {
            return Err(Error::DeviceFailure(csw.status));
        }
        Ok(())
    }
}

impl SectorDevice for Rockusb {
    fn read_sectors(&mut self, lba: u32, count: u16, buf: &mut [u8]) -> Result<()> {
        self.read_lba(lba, count, buf)
    }

    fn write_sectors(&mut self, lba: u32, count: u16, buf: &[u8]) -> Result<()> {
        self.write_lba(lba, count, buf)
    }
}
