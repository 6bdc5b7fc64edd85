//! Virtual file table mapping flat filenames to sector ranges
//!
//! The ranges follow the published Rockchip bootflow layout, not a
//! partition header read from the device. Two entries (the full image
//! and the root partition) can only be sized once the flash geometry
//! is known; until then their sector count is a placeholder zero.

use crate::device::{FlashGeometry, SECTOR_SIZE};

pub const LOADER1_START_SECTOR: u64 = 0x40;
pub const LOADER2_START_SECTOR: u64 = 0x4000;
pub const TRUST_START_SECTOR: u64 = 0x6000;
pub const BOOT_START_SECTOR: u64 = 0x8000;
pub const ROOT_START_SECTOR: u64 = 0x40000;

/// One virtual file backed by a contiguous sector range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VfileEntry {
    /// Path of the file at the filesystem root, with leading slash
    pub path: &'static str,
    /// First sector of the backing range
    pub sector_start: u64,
    /// Number of sectors in the backing range
    pub sector_count: u64,
}

impl VfileEntry {
    /// Size of the virtual file in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.sector_count * SECTOR_SIZE as u64
    }
}

// Indices of the two entries sized from device geometry.
const FILE_ID_FULL: usize = 0;
const FILE_ID_ROOT: usize = 5;

/// The six virtual files exposed at the filesystem root.
///
/// Read-only after `resolve_sizes` has run.
pub struct PartitionTable {
    entries: [VfileEntry; 6],
    resolved: bool,
}

impl PartitionTable {
    pub fn new() -> Self {
        let entry = |path, start, end| VfileEntry {
            path,
            sector_start: start,
            sector_count: end - start,
        };
        Self {
            entries: [
                entry("/full.img", 0, 0),
                entry("/loader1.img", LOADER1_START_SECTOR, LOADER2_START_SECTOR),
                entry("/loader2.img", LOADER2_START_SECTOR, TRUST_START_SECTOR),
                entry("/trust.img", TRUST_START_SECTOR, BOOT_START_SECTOR),
                entry("/boot.img", BOOT_START_SECTOR, ROOT_START_SECTOR),
                entry("/root.img", ROOT_START_SECTOR, ROOT_START_SECTOR),
            ],
            resolved: false,
        }
    }

    /// Backpatch the full-image and root-partition sizes from the
    /// device-reported geometry. Must run exactly once, before any
    /// lookup.
    pub fn resolve_sizes(&mut self, geometry: &FlashGeometry) {
        assert!(!self.resolved, "partition table already resolved");
        let flash_size = geometry.flash_size as u64;
        self.entries[FILE_ID_FULL].sector_count = flash_size;
        self.entries[FILE_ID_ROOT].sector_count =
            flash_size.saturating_sub(ROOT_START_SECTOR);
        self.resolved = true;
    }

    /// Find the entry whose path matches exactly.
    pub fn lookup(&self, path: &str) -> Option<&VfileEntry> {
        debug_assert!(self.resolved, "lookup before resolve_sizes");
        self.entries.iter().find(|e| e.path == path)
    }

    /// Root directory names in table-definition order, leading slash
    /// stripped.
    pub fn list(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| &e.path[1..])
    }

    pub fn entries(&self) -> &[VfileEntry] {
        debug_assert!(self.resolved, "entries before resolve_sizes");
        &self.entries
    }
}

impl Default for PartitionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(flash_size: u32) -> FlashGeometry {
        FlashGeometry {
            flash_size,
            block_size: 1024,
            page_size: 4,
            ecc_bits: 40,
            access_time: 40,
            mfg_code: 0,
            flash_cs: 1,
        }
    }

    #[test]
    fn fixed_ranges_follow_bootflow_layout() {
        let mut table = PartitionTable::new();
        table.resolve_sizes(&geometry(0x80000));

        let loader1 = table.lookup("/loader1.img").unwrap();
        assert_eq!(loader1.sector_start, 0x40);
        assert_eq!(loader1.sector_count, 0x4000 - 0x40);

        let boot = table.lookup("/boot.img").unwrap();
        assert_eq!(boot.sector_start, 0x8000);
        assert_eq!(boot.sector_count, 0x40000 - 0x8000);
    }

    #[test]
    fn resolve_sizes_backpatches_full_and_root() {
        let mut table = PartitionTable::new();
        table.resolve_sizes(&geometry(0x747_0000));

        assert_eq!(table.lookup("/full.img").unwrap().sector_count, 0x747_0000);
        assert_eq!(
            table.lookup("/root.img").unwrap().sector_count,
            0x747_0000 - 0x40000
        );
    }

    #[test]
    fn lookup_requires_exact_match() {
        let mut table = PartitionTable::new();
        table.resolve_sizes(&geometry(0x80000));

        assert!(table.lookup("/boot.img").is_some());
        assert!(table.lookup("boot.img").is_none());
        assert!(table.lookup("/missing.img").is_none());
    }

    #[test]
    fn list_strips_leading_slash_in_definition_order() {
        let mut table = PartitionTable::new();
        table.resolve_sizes(&geometry(0x80000));

        let names: Vec<_> = table.list().collect();
        assert_eq!(
            names,
            [
                "full.img",
                "loader1.img",
                "loader2.img",
                "trust.img",
                "boot.img",
                "root.img"
            ]
        );
    }

    #[test]
    #[should_panic(expected = "already resolved")]
    fn resolve_sizes_twice_panics() {
        let mut table = PartitionTable::new();
        table.resolve_sizes(&geometry(0x80000));
        table.resolve_sizes(&geometry(0x80000));
    }
}
