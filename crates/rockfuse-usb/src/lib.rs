//! rockfuse-usb - Rockchip recovery-mode protocol over nusb
//!
//! Talks the RockUSB command protocol to a device booted into recovery
//! (maskrom/loader) mode: a 31-byte command envelope, an optional bulk
//! data phase, and a 13-byte status envelope per operation. Four
//! operations are implemented: read-flash-id, read-flash-info,
//! read-lba and write-lba.
//!
//! # Example
//!
//! ```no_run
//! use rockfuse_usb::Rockusb;
//!
//! let mut dev = Rockusb::open()?;
//! let id = dev.read_flash_id()?;
//! println!("flash id: {:02x?}", id);
//!
//! let info = dev.read_flash_info()?;
//! println!("flash size: {} sectors", info.flash_size);
//! # Ok::<(), rockfuse_core::Error>(())
//! ```

mod device;
pub mod protocol;

pub use device::Rockusb;
