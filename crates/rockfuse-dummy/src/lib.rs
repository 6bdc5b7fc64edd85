//! rockfuse-dummy - in-memory sector device for testing
//!
//! Emulates the flash of a recovery-mode device in memory. Every LBA
//! operation is recorded so tests can assert on the exact transfer
//! sequence the translator produces. Also mountable from the CLI for
//! development without hardware.

use rockfuse_core::error::{Error, Result};
use rockfuse_core::{FlashGeometry, SectorDevice, SECTOR_SIZE};

/// One recorded LBA operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Read { lba: u32, count: u16 },
    Write { lba: u32, count: u16 },
}

impl Op {
    pub fn lba(&self) -> u32 {
        match *self {
            Op::Read { lba, .. } | Op::Write { lba, .. } => lba,
        }
    }

    pub fn count(&self) -> u16 {
        match *self {
            Op::Read { count, .. } | Op::Write { count, .. } => count,
        }
    }
}

/// In-memory flash emulator.
pub struct DummySectorDevice {
    data: Vec<u8>,
    ops: Vec<Op>,
    fail_after: Option<usize>,
}

impl DummySectorDevice {
    /// Create an emulator of `sectors` 512-byte sectors, erased to 0xFF.
    pub fn new(sectors: u32) -> Self {
        Self {
            data: vec![0xFF; sectors as usize * SECTOR_SIZE],
            ops: Vec::new(),
            fail_after: None,
        }
    }

    /// Geometry as a real device would report it.
    pub fn geometry(&self) -> FlashGeometry {
        FlashGeometry {
            flash_size: (self.data.len() / SECTOR_SIZE) as u32,
            block_size: 1024,
            page_size: 4,
            ecc_bits: 40,
            access_time: 40,
            mfg_code: 0,
            flash_cs: 1,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Recorded operations, oldest first.
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Make every operation after the first `n` report a device failure.
    pub fn fail_after(&mut self, n: usize) {
        self.fail_after = Some(n);
    }

    fn record(&mut self, op: Op) -> Result<()> {
        if let Some(limit) = self.fail_after {
            if self.ops.len() >= limit {
                return Err(Error::DeviceFailure(0x01));
            }
        }
        self.ops.push(op);
        Ok(())
    }

    fn byte_range(&self, lba: u32, count: u16, buf_len: usize) -> Result<std::ops::Range<usize>> {
        let start = lba as usize * SECTOR_SIZE;
        let len = count as usize * SECTOR_SIZE;
        assert_eq!(buf_len, len, "buffer must cover exactly {count} sectors");
        if start + len > self.data.len() {
            log::warn!("dummy: access past end of flash (lba={lba} count={count})");
            return Err(Error::DeviceFailure(0x01));
        }
        Ok(start..start + len)
    }
}

impl SectorDevice for DummySectorDevice {
    fn read_sectors(&mut self, lba: u32, count: u16, buf: &mut [u8]) -> Result<()> {
        self.record(Op::Read { lba, count })?;
        let range = self.byte_range(lba, count, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_sectors(&mut self, lba: u32, count: u16, buf: &[u8]) -> Result<()> {
        self.record(Op::Write { lba, count })?;
        let range = self.byte_range(lba, count, buf.len())?;
        self.data[range].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_roundtrip() {
        let mut dev = DummySectorDevice::new(16);
        let data = vec![0xA5; SECTOR_SIZE * 2];
        dev.write_sectors(3, 2, &data).unwrap();

        let mut buf = vec![0u8; SECTOR_SIZE * 2];
        dev.read_sectors(3, 2, &mut buf).unwrap();
        assert_eq!(buf, data);
        assert_eq!(
            dev.ops(),
            [Op::Write { lba: 3, count: 2 }, Op::Read { lba: 3, count: 2 }]
        );
    }

    #[test]
    fn access_past_end_fails() {
        let mut dev = DummySectorDevice::new(4);
        let mut buf = vec![0u8; SECTOR_SIZE];
        assert!(matches!(
            dev.read_sectors(4, 1, &mut buf),
            Err(Error::DeviceFailure(_))
        ));
    }

    #[test]
    fn fail_after_injects_errors() {
        let mut dev = DummySectorDevice::new(4);
        dev.fail_after(1);
        let mut buf = vec![0u8; SECTOR_SIZE];
        assert!(dev.read_sectors(0, 1, &mut buf).is_ok());
        assert!(dev.read_sectors(1, 1, &mut buf).is_err());
    }
}
