//! The sector-device seam between the translator and a transport

use crate::error::Result;

/// Fixed addressable unit of the LBA protocol, in bytes.
pub const SECTOR_SIZE: usize = 512;

/// Flash geometry as reported by the device, queried once at startup
/// and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashGeometry {
    /// Total flash size in sectors
    pub flash_size: u32,
    /// Erase block size
    pub block_size: u16,
    /// Program page size
    pub page_size: u32,
    /// ECC strength in bits
    pub ecc_bits: u8,
    /// Access timing class
    pub access_time: u8,
    /// Flash manufacturer code
    pub mfg_code: u8,
    /// Chip-select index
    pub flash_cs: u8,
}

/// A device addressable in whole 512-byte sectors.
///
/// Implementations block for the full duration of a transfer and must
/// not be called concurrently; callers serialize access (the filesystem
/// layer holds one lock across an entire translated request).
pub trait SectorDevice {
    /// Read `count` sectors starting at `lba` into `buf`.
    /// `buf` must be exactly `count * SECTOR_SIZE` bytes long.
    fn read_sectors(&mut self, lba: u32, count: u16, buf: &mut [u8]) -> Result<()>;

    /// Write `count` sectors starting at `lba` from `buf`.
    /// `buf` must be exactly `count * SECTOR_SIZE` bytes long.
    fn write_sectors(&mut self, lba: u32, count: u16, buf: &[u8]) -> Result<()>;
}
