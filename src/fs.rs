//! FUSE adapter exposing the partition table as a flat filesystem
//!
//! The kernel may dispatch filesystem calls from several threads, but
//! the device protocol supports exactly one outstanding command/status
//! cycle. The device mutex is therefore held across an entire
//! translated request, not per sector operation, so the transfers of
//! two concurrent requests never interleave. The guard releases on
//! every exit path, including errors.

use std::ffi::OsStr;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry,
    ReplyOpen, ReplyWrite, Request,
};

use rockfuse_core::{read_range, write_range, PartitionTable, SectorDevice, VfileEntry};

const TTL: Duration = Duration::from_secs(1);
const ROOT_INODE: u64 = 1;
// File inodes follow the table in definition order.
const FIRST_FILE_INODE: u64 = 2;

pub struct RockFs<D: SectorDevice> {
    dev: Mutex<D>,
    table: PartitionTable,
    read_only: bool,
}

impl<D: SectorDevice> RockFs<D> {
    /// `table` must already have its sizes resolved.
    pub fn new(dev: D, table: PartitionTable, read_only: bool) -> Self {
        Self {
            dev: Mutex::new(dev),
            table,
            read_only,
        }
    }

    fn entry_for_inode(&self, inode: u64) -> Option<&VfileEntry> {
        inode
            .checked_sub(FIRST_FILE_INODE)
            .and_then(|i| self.table.entries().get(i as usize))
    }

    fn attr_for(&self, inode: u64, entry: Option<&VfileEntry>) -> FileAttr {
        let now = SystemTime::now();
        let (kind, size, perm) = match entry {
            None => (FileType::Directory, 0, 0o755),
            Some(e) => {
                let perm = if self.read_only { 0o444 } else { 0o644 };
                (FileType::RegularFile, e.size_bytes(), perm)
            }
        };
        FileAttr {
            ino: inode,
            size,
            blocks: size.div_ceil(512),
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            kind,
            perm,
            nlink: 1,
            uid: 0,
            gid: 0,
            rdev: 0,
            flags: 0,
            blksize: 512,
        }
    }

    /// Read `size` bytes at `offset`, holding the device lock for the
    /// whole translated request.
    fn read_at(&self, entry: &VfileEntry, offset: u64, size: usize) -> rockfuse_core::Result<Vec<u8>> {
        let mut buf = vec![0u8; size];
        let mut dev = self.dev.lock().expect("device lock");
        let n = read_range(&mut *dev, entry, offset, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Write `data` at `offset`, holding the device lock for the whole
    /// translated request.
    fn write_at(&self, entry: &VfileEntry, offset: u64, data: &[u8]) -> rockfuse_core::Result<usize> {
        let mut dev = self.dev.lock().expect("device lock");
        write_range(&mut *dev, entry, offset, data)
    }
}

impl<D: SectorDevice> Filesystem for RockFs<D> {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        if parent != ROOT_INODE {
            reply.error(libc::ENOENT);
            return;
        }
        let name = name.to_string_lossy();
        let path = format!("/{name}");
        match self.table.lookup(&path) {
            Some(entry) => {
                let index = self
                    .table
                    .entries()
                    .iter()
                    .position(|e| e.path == entry.path)
                    .unwrap_or(0);
                let entry = *entry;
                let attr = self.attr_for(FIRST_FILE_INODE + index as u64, Some(&entry));
                reply.entry(&TTL, &attr, 0);
            }
            None => reply.error(libc::ENOENT),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, inode: u64, _fh: Option<u64>, reply: ReplyAttr) {
        if inode == ROOT_INODE {
            reply.attr(&TTL, &self.attr_for(ROOT_INODE, None));
            return;
        }
        match self.entry_for_inode(inode).copied() {
            Some(entry) => reply.attr(&TTL, &self.attr_for(inode, Some(&entry))),
            None => reply.error(libc::ENOENT),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        inode: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        if inode != ROOT_INODE {
            reply.error(libc::ENOENT);
            return;
        }
        let mut listing: Vec<(u64, FileType, &str)> = vec![
            (ROOT_INODE, FileType::Directory, "."),
            (ROOT_INODE, FileType::Directory, ".."),
        ];
        for (i, name) in self.table.list().enumerate() {
            listing.push((FIRST_FILE_INODE + i as u64, FileType::RegularFile, name));
        }
        let start = offset.max(0) as usize;
        for (idx, (ino, kind, name)) in listing.into_iter().enumerate().skip(start) {
            if reply.add(ino, (idx + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, inode: u64, flags: i32, reply: ReplyOpen) {
        if self.entry_for_inode(inode).is_none() {
            reply.error(libc::ENOENT);
            return;
        }
        let wants_write = flags & libc::O_ACCMODE != libc::O_RDONLY;
        if wants_write && self.read_only {
            reply.error(libc::EROFS);
            return;
        }
        reply.opened(0, 0);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        inode: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let entry = match self.entry_for_inode(inode).copied() {
            Some(entry) => entry,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        match self.read_at(&entry, offset as u64, size as usize) {
            Ok(data) => reply.data(&data),
            Err(e) => {
                log::error!("read {} failed: {}", entry.path, e);
                reply.error(libc::EIO);
            }
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        inode: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        if self.read_only {
            reply.error(libc::EROFS);
            return;
        }
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let entry = match self.entry_for_inode(inode).copied() {
            Some(entry) => entry,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        match self.write_at(&entry, offset as u64, data) {
            Ok(n) => reply.written(n as u32),
            Err(e) => {
                log::error!("write {} failed: {}", entry.path, e);
                reply.error(libc::EIO);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rockfuse_core::{Result, SECTOR_SIZE};
    use rockfuse_dummy::DummySectorDevice;
    use std::sync::Arc;

    /// Shares one dummy device between a mounted filesystem and the
    /// test, locking per sector operation only; the serialization under
    /// test is the one `RockFs` adds around whole requests.
    #[derive(Clone)]
    struct SharedDummy(Arc<Mutex<DummySectorDevice>>);

    impl SectorDevice for SharedDummy {
        fn read_sectors(&mut self, lba: u32, count: u16, buf: &mut [u8]) -> Result<()> {
            self.0.lock().unwrap().read_sectors(lba, count, buf)
        }

        fn write_sectors(&mut self, lba: u32, count: u16, buf: &[u8]) -> Result<()> {
            self.0.lock().unwrap().write_sectors(lba, count, buf)
        }
    }

    fn resolved_table(dev: &DummySectorDevice) -> PartitionTable {
        let mut table = PartitionTable::new();
        table.resolve_sizes(&dev.geometry());
        table
    }

    #[test]
    fn inode_mapping_is_stable() {
        let dev = DummySectorDevice::new(0x41000);
        let table = resolved_table(&dev);
        let fs = RockFs::new(dev, table, false);

        assert_eq!(fs.entry_for_inode(1), None);
        assert_eq!(fs.entry_for_inode(2).unwrap().path, "/full.img");
        assert_eq!(fs.entry_for_inode(7).unwrap().path, "/root.img");
        assert_eq!(fs.entry_for_inode(8), None);
    }

    #[test]
    fn attr_reports_resolved_sizes() {
        let dev = DummySectorDevice::new(0x41000);
        let table = resolved_table(&dev);
        let fs = RockFs::new(dev, table, true);

        let entry = *fs.entry_for_inode(2).unwrap();
        let attr = fs.attr_for(2, Some(&entry));
        assert_eq!(attr.size, 0x41000 * SECTOR_SIZE as u64);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o444);

        let root = fs.attr_for(ROOT_INODE, None);
        assert_eq!(root.kind, FileType::Directory);
    }

    #[test]
    fn concurrent_requests_do_not_interleave_device_transfers() {
        let inner = Arc::new(Mutex::new(DummySectorDevice::new(0x41000)));
        let table = resolved_table(&inner.lock().unwrap());
        let fs = Arc::new(RockFs::new(SharedDummy(inner.clone()), table, false));

        // Two multi-chunk reads against disjoint sector ranges.
        let loader1 = *fs.entry_for_inode(3).unwrap();
        let loader2 = *fs.entry_for_inode(4).unwrap();
        let len = 600 * SECTOR_SIZE;

        let threads: Vec<_> = [loader1, loader2]
            .into_iter()
            .map(|entry| {
                let fs = Arc::clone(&fs);
                std::thread::spawn(move || {
                    fs.read_at(&entry, 0, len).unwrap();
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        // All operations of one request must come before any operation
        // of the other.
        let inner = inner.lock().unwrap();
        let ops = inner.ops();
        assert_eq!(ops.len(), 10);
        let boundary = loader2.sector_start as u32;
        let switches = ops
            .windows(2)
            .filter(|w| (w[0].lba() >= boundary) != (w[1].lba() >= boundary))
            .count();
        assert_eq!(switches, 1, "transfers interleaved: {ops:?}");
        // Each request is itself in order.
        for w in ops.windows(2) {
            if (w[0].lba() >= boundary) == (w[1].lba() >= boundary) {
                assert!(w[0].lba() < w[1].lba());
            }
        }
    }
}
