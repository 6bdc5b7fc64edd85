//! Byte-range to sector-range translation
//!
//! Decomposes an arbitrary (offset, length) request against a virtual
//! file into a sequence of sector-aligned device transfers: an optional
//! unaligned leading fragment, an aligned body streamed directly
//! to/from the caller's buffer in capped chunks, and an optional
//! trailing partial sector. Writes use read-modify-write for the
//! fragments. Any device error aborts the whole request; no partial
//! byte count is reported.

use crate::device::{SectorDevice, SECTOR_SIZE};
use crate::error::Result;
use crate::table::VfileEntry;

/// Largest sector count issued in a single LBA transfer.
pub const MAX_SECTORS: u64 = 128;

/// Clamp a request against the file size. Returns the effective length
/// in bytes, or 0 when the offset is at or past end of file.
fn clamp(entry: &VfileEntry, offset: u64, len: usize) -> usize {
    let file_size = entry.size_bytes();
    if offset >= file_size {
        return 0;
    }
    (len as u64).min(file_size - offset) as usize
}

/// Read up to `buf.len()` bytes at `offset` into `buf`. Returns the
/// number of bytes read after clamping to the file size.
pub fn read_range<D: SectorDevice + ?Sized>(
    dev: &mut D,
    entry: &VfileEntry,
    offset: u64,
    buf: &mut [u8],
) -> Result<usize> {
    let len = clamp(entry, offset, buf.len());
    if len == 0 {
        return Ok(0);
    }
    let buf = &mut buf[..len];
    let sector = SECTOR_SIZE as u64;
    let mut scratch = [0u8; SECTOR_SIZE];
    let mut pos = 0usize;

    // Unaligned leading fragment: one sector into scratch, partial copy.
    // A request contained in a single sector is fully served here.
    let frag = (offset % sector) as usize;
    if frag != 0 {
        let lba = (entry.sector_start + offset / sector) as u32;
        dev.read_sectors(lba, 1, &mut scratch)?;
        let take = (SECTOR_SIZE - frag).min(len);
        buf[..take].copy_from_slice(&scratch[frag..frag + take]);
        pos += take;
    }

    // Aligned body, streamed straight into the caller's buffer.
    while len - pos >= SECTOR_SIZE {
        let count = (((len - pos) / SECTOR_SIZE) as u64).min(MAX_SECTORS);
        let lba = (entry.sector_start + (offset + pos as u64) / sector) as u32;
        let bytes = count as usize * SECTOR_SIZE;
        dev.read_sectors(lba, count as u16, &mut buf[pos..pos + bytes])?;
        pos += bytes;
    }

    // Trailing partial sector.
    if pos < len {
        let lba = (entry.sector_start + (offset + pos as u64) / sector) as u32;
        dev.read_sectors(lba, 1, &mut scratch)?;
        let tail = len - pos;
        buf[pos..].copy_from_slice(&scratch[..tail]);
        pos += tail;
    }

    log::trace!("read_range: {} offset={} len={}", entry.path, offset, pos);
    Ok(pos)
}

/// Write up to `data.len()` bytes at `offset` from `data`. Returns the
/// number of bytes written after clamping to the file size. Partial
/// sectors are handled read-modify-write.
pub fn write_range<D: SectorDevice + ?Sized>(
    dev: &mut D,
    entry: &VfileEntry,
    offset: u64,
    data: &[u8],
) -> Result<usize> {
    let len = clamp(entry, offset, data.len());
    if len == 0 {
        return Ok(0);
    }
    let data = &data[..len];
    let sector = SECTOR_SIZE as u64;
    let mut scratch = [0u8; SECTOR_SIZE];
    let mut pos = 0usize;

    // Unaligned leading fragment: read the containing sector, splice in
    // the affected bytes, write the whole sector back. A request
    // contained in a single sector is fully served here.
    let frag = (offset % sector) as usize;
    if frag != 0 {
        let lba = (entry.sector_start + offset / sector) as u32;
        dev.read_sectors(lba, 1, &mut scratch)?;
        let take = (SECTOR_SIZE - frag).min(len);
        scratch[frag..frag + take].copy_from_slice(&data[..take]);
        dev.write_sectors(lba, 1, &scratch)?;
        pos += take;
    }

    // Aligned body, written directly from the caller's buffer. The
    // cursor advances by bytes transferred, not sectors.
    while len - pos >= SECTOR_SIZE {
        let count = (((len - pos) / SECTOR_SIZE) as u64).min(MAX_SECTORS);
        let lba = (entry.sector_start + (offset + pos as u64) / sector) as u32;
        let bytes = count as usize * SECTOR_SIZE;
        dev.write_sectors(lba, count as u16, &data[pos..pos + bytes])?;
        pos += bytes;
    }

    // Trailing partial sector, read-modify-write again.
    if pos < len {
        let lba = (entry.sector_start + (offset + pos as u64) / sector) as u32;
        dev.read_sectors(lba, 1, &mut scratch)?;
        let tail = len - pos;
        scratch[..tail].copy_from_slice(&data[pos..]);
        dev.write_sectors(lba, 1, &scratch)?;
        pos += tail;
    }

    log::trace!("write_range: {} offset={} len={}", entry.path, offset, pos);
    Ok(pos)
}
