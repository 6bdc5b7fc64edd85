//! rockfuse - mount recovery-mode Rockchip flash as a filesystem
//!
//! Talks the RockUSB command protocol to a device in recovery mode and
//! exposes fixed regions of its raw flash (full image, loader stages,
//! trust, boot, root) as files under a FUSE mountpoint, so standard
//! tools can read and flash them without block-device support on the
//! host.

mod cli;
mod fs;

use clap::Parser;

use cli::Cli;
use fs::RockFs;
use rockfuse_core::{FlashGeometry, PartitionTable, SectorDevice};
use rockfuse_usb::Rockusb;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    #[cfg(feature = "dummy")]
    if let Some(size_mib) = cli.dummy {
        let sectors = size_mib * 2048;
        log::info!("using in-memory flash emulator ({} MiB)", size_mib);
        let dev = rockfuse_dummy::DummySectorDevice::new(sectors);
        let geometry = dev.geometry();
        return mount(dev, geometry, &cli);
    }

    let mut dev = Rockusb::open()?;

    let id = dev.read_flash_id()?;
    log::info!(
        "flash id: {:02x} {:02x} {:02x} {:02x} {:02x} ('{}')",
        id[0],
        id[1],
        id[2],
        id[3],
        id[4],
        String::from_utf8_lossy(&id)
    );

    let geometry = dev.read_flash_info()?;
    log::debug!("flash size: {:#010x} sectors", geometry.flash_size);
    log::debug!("page size : {:#06x}", geometry.page_size);
    log::debug!("block size: {:#06x}", geometry.block_size);
    log::debug!("mfg code  : {:#04x}", geometry.mfg_code);

    mount(dev, geometry, &cli)
}

/// Resolve the partition table from device geometry and run the FUSE
/// session until unmount. The filesystem is only exposed once device
/// identification has succeeded.
fn mount<D: SectorDevice + 'static>(
    dev: D,
    geometry: FlashGeometry,
    cli: &Cli,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut table = PartitionTable::new();
    table.resolve_sizes(&geometry);

    let filesystem = RockFs::new(dev, table, cli.read_only);

    let mut options = vec![
        fuser::MountOption::FSName("rockfuse".to_owned()),
        fuser::MountOption::AutoUnmount,
    ];
    if cli.read_only {
        options.push(fuser::MountOption::RO);
    }

    log::info!("mounting at {}", cli.mountpoint.display());
    fuser::mount2(filesystem, &cli.mountpoint, &options)?;
    Ok(())
}
