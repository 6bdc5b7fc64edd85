//! RockUSB protocol constants and wire framing
//!
//! The recovery-mode device speaks a mass-storage style protocol over a
//! bulk endpoint pair: a 31-byte command block wrapper (CBW), an
//! optional data phase, then a 13-byte command status wrapper (CSW).
//! Envelope fields are little-endian, but the LBA address and sector
//! count inside the embedded command block are big-endian. Both orders
//! are fixed by the firmware and must be reproduced exactly.

use rockfuse_core::error::{Error, Result};
use rockfuse_core::{FlashGeometry, SECTOR_SIZE};

// USB device identifiers (RK3399 recovery mode)
pub const ROCKCHIP_USB_VENDOR: u16 = 0x2207;
pub const ROCKCHIP_USB_PRODUCT: u16 = 0x330C;

// Bulk endpoints
pub const BULK_IN_EP: u8 = 0x81;
pub const BULK_OUT_EP: u8 = 0x02;

// Envelope signatures: "USBC" / "USBS"
pub const CBW_SIG: u32 = 0x4342_5355;
pub const CSW_SIG: u32 = 0x5342_5355;

// Command opcodes
pub const CBW_READ_FLASH_ID: u8 = 0x01;
pub const CBW_READ_LBA: u8 = 0x14;
pub const CBW_WRITE_LBA: u8 = 0x15;
pub const CBW_READ_FLASH_INFO: u8 = 0x1A;

// Direction flag in the CBW
pub const DIRECTION_OUT: u8 = 0x00;
pub const DIRECTION_IN: u8 = 0x80;

// Wire sizes
pub const CBW_SIZE: usize = 31;
pub const CSW_SIZE: usize = 13;
pub const FLASH_ID_SIZE: usize = 5;
pub const FLASH_INFO_SIZE: usize = 512;

pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Command block wrapper: the 31-byte envelope sent ahead of every
/// command.
#[derive(Debug, Clone, Copy)]
pub struct Cbw {
    /// Correlation tag, randomized per command. Only correlates the
    /// status response with its command; no security property.
    pub tag: u32,
    /// Declared length of the data phase in bytes
    pub transfer_length: u32,
    /// Direction flag
    pub flags: u8,
    /// Logical unit number
    pub lun: u8,
    /// Declared length of the embedded command block
    pub cb_length: u8,
    /// Operation code
    pub opcode: u8,
    /// LBA address (big-endian on the wire)
    pub address: u32,
    /// Sector count (big-endian on the wire)
    pub length: u16,
}

impl Cbw {
    fn new(opcode: u8, flags: u8, cb_length: u8, transfer_length: u32) -> Self {
        Self {
            tag: rand::random(),
            transfer_length,
            flags,
            lun: 0,
            cb_length,
            opcode,
            address: 0,
            length: 0,
        }
    }

    pub fn read_flash_id() -> Self {
        Self::new(CBW_READ_FLASH_ID, DIRECTION_IN, 6, FLASH_ID_SIZE as u32)
    }

    pub fn read_flash_info() -> Self {
        Self::new(CBW_READ_FLASH_INFO, DIRECTION_IN, 6, FLASH_INFO_SIZE as u32)
    }

    pub fn read_lba(start: u32, count: u16) -> Self {
        let mut cbw = Self::new(
            CBW_READ_LBA,
            DIRECTION_IN,
            0x0A,
            count as u32 * SECTOR_SIZE as u32,
        );
        cbw.address = start;
        cbw.length = count;
        cbw
    }

    pub fn write_lba(start: u32, count: u16) -> Self {
        let mut cbw = Self::new(
            CBW_WRITE_LBA,
            DIRECTION_OUT,
            0x0A,
            count as u32 * SECTOR_SIZE as u32,
        );
        cbw.address = start;
        cbw.length = count;
        cbw
    }

    /// Encode to wire form, field by field. Envelope fields are
    /// little-endian; the embedded address and count are big-endian.
    pub fn to_bytes(&self) -> [u8; CBW_SIZE] {
        let mut b = [0u8; CBW_SIZE];
        b[0..4].copy_from_slice(&CBW_SIG.to_le_bytes());
        b[4..8].copy_from_slice(&self.tag.to_le_bytes());
        b[8..12].copy_from_slice(&self.transfer_length.to_le_bytes());
        b[12] = self.flags;
        b[13] = self.lun;
        b[14] = self.cb_length;
        b[15] = self.opcode;
        // b[16] reserved
        b[17..21].copy_from_slice(&self.address.to_be_bytes());
        // b[21] reserved
        b[22..24].copy_from_slice(&self.length.to_be_bytes());
        // b[24..31] reserved
        b
    }
}

/// Command status wrapper: the 13-byte envelope closing every command.
#[derive(Debug, Clone, Copy)]
pub struct Csw {
    pub sig: u32,
    pub tag: u32,
    pub data_residue: u32,
    pub status: u8,
}

impl Csw {
    pub fn from_bytes(b: &[u8; CSW_SIZE]) -> Self {
        Self {
            sig: u32::from_le_bytes(b[0..4].try_into().unwrap()),
            tag: u32::from_le_bytes(b[4..8].try_into().unwrap()),
            data_residue: u32::from_le_bytes(b[8..12].try_into().unwrap()),
            status: b[12],
        }
    }

    /// Validate framing against the tag of the command this status
    /// answers. A wrong signature or tag is fatal for the operation;
    /// no retry happens at this layer.
    pub fn check(&self, cbw_tag: u32) -> Result<()> {
        if self.sig != CSW_SIG {
            return Err(Error::BadSignature {
                expected: CSW_SIG,
                found: self.sig,
            });
        }
        if self.tag != cbw_tag {
            return Err(Error::TagMismatch {
                sent: cbw_tag,
                received: self.tag,
            });
        }
        Ok(())
    }
}

/// Decode the READ_FLASH_INFO payload (512 bytes on the wire, mostly
/// reserved padding after the first 14).
pub fn parse_flash_info(b: &[u8]) -> FlashGeometry {
    debug_assert!(b.len() >= 14);
    FlashGeometry {
        flash_size: u32::from_le_bytes(b[0..4].try_into().unwrap()),
        block_size: u16::from_le_bytes(b[4..6].try_into().unwrap()),
        page_size: u32::from_le_bytes(b[6..10].try_into().unwrap()),
        ecc_bits: b[10],
        access_time: b[11],
        mfg_code: b[12],
        flash_cs: b[13],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cbw_read_lba_wire_layout() {
        let mut cbw = Cbw::read_lba(0x0001_0203, 0x0080);
        cbw.tag = 0xDEAD_BEEF;
        let b = cbw.to_bytes();

        assert_eq!(&b[0..4], b"USBC");
        // Tag and transfer length are little-endian.
        assert_eq!(&b[4..8], &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(&b[8..12], &(0x80u32 * 512).to_le_bytes());
        assert_eq!(b[12], DIRECTION_IN);
        assert_eq!(b[13], 0); // lun
        assert_eq!(b[14], 0x0A); // cb_length
        assert_eq!(b[15], CBW_READ_LBA);
        assert_eq!(b[16], 0);
        // Address and count are big-endian, unlike the envelope fields.
        assert_eq!(&b[17..21], &[0x00, 0x01, 0x02, 0x03]);
        assert_eq!(b[21], 0);
        assert_eq!(&b[22..24], &[0x00, 0x80]);
        assert_eq!(&b[24..31], &[0u8; 7]);
    }

    #[test]
    fn cbw_write_lba_direction_and_opcode() {
        let b = Cbw::write_lba(0x40, 1).to_bytes();
        assert_eq!(b[12], DIRECTION_OUT);
        assert_eq!(b[15], CBW_WRITE_LBA);
        assert_eq!(&b[17..21], &[0x00, 0x00, 0x00, 0x40]);
        assert_eq!(&b[22..24], &[0x00, 0x01]);
    }

    #[test]
    fn cbw_id_and_info_declare_fixed_lengths() {
        let id = Cbw::read_flash_id().to_bytes();
        assert_eq!(id[14], 6);
        assert_eq!(id[15], CBW_READ_FLASH_ID);
        assert_eq!(&id[8..12], &5u32.to_le_bytes());

        let info = Cbw::read_flash_info().to_bytes();
        assert_eq!(info[14], 6);
        assert_eq!(info[15], CBW_READ_FLASH_INFO);
        assert_eq!(&info[8..12], &512u32.to_le_bytes());
    }

    #[test]
    fn tags_differ_between_commands() {
        let a = Cbw::read_flash_id();
        let b = Cbw::read_flash_id();
        // Random u32s; a collision here is a one-in-four-billion fluke.
        assert_ne!(a.tag, b.tag);
    }

    fn csw_bytes(sig: u32, tag: u32, status: u8) -> [u8; CSW_SIZE] {
        let mut b = [0u8; CSW_SIZE];
        b[0..4].copy_from_slice(&sig.to_le_bytes());
        b[4..8].copy_from_slice(&tag.to_le_bytes());
        b[12] = status;
        b
    }

    #[test]
    fn csw_check_accepts_matching_envelope() {
        let csw = Csw::from_bytes(&csw_bytes(CSW_SIG, 0x1234_5678, 0));
        assert!(csw.check(0x1234_5678).is_ok());
        assert_eq!(csw.status, 0);
    }

    #[test]
    fn csw_check_rejects_bad_signature() {
        let csw = Csw::from_bytes(&csw_bytes(CBW_SIG, 0x1234_5678, 0));
        assert!(matches!(
            csw.check(0x1234_5678),
            Err(Error::BadSignature { .. })
        ));
    }

    #[test]
    fn csw_check_rejects_tag_mismatch() {
        let csw = Csw::from_bytes(&csw_bytes(CSW_SIG, 0x1111_1111, 0));
        assert!(matches!(
            csw.check(0x2222_2222),
            Err(Error::TagMismatch { .. })
        ));
    }

    #[test]
    fn parse_flash_info_decodes_leading_fields() {
        let mut b = [0u8; FLASH_INFO_SIZE];
        b[0..4].copy_from_slice(&0x0074_7000u32.to_le_bytes());
        b[4..6].copy_from_slice(&1024u16.to_le_bytes());
        b[6..10].copy_from_slice(&4u32.to_le_bytes());
        b[10] = 40;
        b[11] = 40;
        b[12] = 0xEC;
        b[13] = 1;

        let info = parse_flash_info(&b);
        assert_eq!(info.flash_size, 0x0074_7000);
        assert_eq!(info.block_size, 1024);
        assert_eq!(info.page_size, 4);
        assert_eq!(info.ecc_bits, 40);
        assert_eq!(info.mfg_code, 0xEC);
        assert_eq!(info.flash_cs, 1);
    }
}
