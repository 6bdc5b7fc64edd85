//! CLI argument parsing

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rockfuse")]
#[command(author, version, about = "Mount recovery-mode Rockchip flash as a filesystem", long_about = None)]
pub struct Cli {
    /// Directory to mount the filesystem at
    pub mountpoint: PathBuf,

    /// Mount read-only (never issue write-lba commands)
    #[arg(long)]
    pub read_only: bool,

    /// Mount an in-memory flash emulator of the given size in MiB
    /// instead of real hardware
    #[cfg(feature = "dummy")]
    #[arg(long, value_name = "MIB")]
    pub dummy: Option<u32>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
