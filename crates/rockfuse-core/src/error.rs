//! Error types shared across the rockfuse crates

use thiserror::Error;

/// Result type for rockfuse operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the transport, the protocol engine, and the
/// sector translator. The filesystem layer maps all of these to a
/// generic I/O failure; none are retried.
#[derive(Debug, Error)]
pub enum Error {
    /// No device with the expected VID/PID is attached
    #[error("device not found (VID:{vid:04x} PID:{pid:04x})")]
    DeviceNotFound { vid: u16, pid: u16 },

    /// Failed to open the USB device
    #[error("failed to open device: {0}")]
    OpenFailed(String),

    /// Failed to claim the device interface
    #[error("failed to claim interface: {0}")]
    ClaimFailed(String),

    /// Bulk transfer failed, or moved fewer bytes than requested
    #[error("USB transfer failed: {0}")]
    TransferFailed(String),

    /// Status envelope carried the wrong signature
    #[error("bad CSW signature: expected {expected:#010x}, found {found:#010x}")]
    BadSignature { expected: u32, found: u32 },

    /// Status envelope answered a different command than the one sent
    #[error("CSW tag mismatch: sent {sent:#010x}, received {received:#010x}")]
    TagMismatch { sent: u32, received: u32 },

    /// The device understood the command but declined it
    #[error("device reported failure (status {0:#04x})")]
    DeviceFailure(u8),
}
