//! rockfuse-core - sector translation engine for rockfuse
//!
//! This crate contains everything that does not need a USB stack: the
//! error taxonomy, the `SectorDevice` trait that transports implement,
//! the virtual file table mapping flat filenames to sector ranges, and
//! the translator that turns arbitrary byte-range requests into
//! sector-aligned device transfers.

pub mod device;
pub mod error;
pub mod table;
pub mod xfer;

pub use device::{FlashGeometry, SectorDevice, SECTOR_SIZE};
pub use error::{Error, Result};
pub use table::{PartitionTable, VfileEntry};
pub use xfer::{read_range, write_range, MAX_SECTORS};
