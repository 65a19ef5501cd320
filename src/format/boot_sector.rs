//! The SFAT boot sector (sector 0), exactly as laid out in spec.md §6.
//!
//! Offset-macro decoding is grounded in the teacher's
//! `fat::boot_sector::BiosParameterBlock::read` (which built up a FAT32 BPB
//! the same way, field by field, from fixed byte offsets); this module
//! builds the much smaller SFAT boot sector instead, and — unlike the
//! teacher's `BootSector::write`, which was a `todo!()` — implements
//! `encode` fully, since both the formatter and the round-trip property
//! tests (P1) need it.

use crate::error::{Result, SfatError};

/// Identifies an SFAT volume; stored in the `media` field.
pub const SFAT_MEDIA: u8 = 0x25;

/// Fixed, packed size of the boot sector record (spec.md §6: the last field,
/// `freelist`, is a `u32` starting at offset 38, so the record spans bytes
/// `0..42`); the rest of sector 0 out to `sector_size` is zero padding.
pub const BOOT_SECTOR_LEN: usize = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootSector {
    pub ignored: [u8; 3],
    pub system_id: [u8; 8],
    pub media: u8,
    pub sector_size: u16,
    pub sec_per_clus: u8,
    pub reserved: u16,
    pub fat_length: u32,
    pub fats: u8,
    pub sectors: u32,
    pub clusters: u32,
    pub root_start: u32,
    pub root_size: u32,
    pub freelist: u32,
}

impl BootSector {
    /// Decodes a boot sector from the first `BOOT_SECTOR_LEN` bytes of
    /// `sector`. Rejects a bad `media` byte or a `sector_size` that is not
    /// one of 512/1024/2048/4096, per spec.md §4.2.
    pub fn decode(sector: &[u8]) -> Result<Self> {
        if sector.len() < BOOT_SECTOR_LEN {
            return Err(SfatError::invalid(format!(
                "boot sector buffer too short ({} < {})",
                sector.len(),
                BOOT_SECTOR_LEN
            )));
        }

        macro_rules! e {
            ($ty:ty, $offset:expr) => {{
                const N: usize = core::mem::size_of::<$ty>();
                <$ty>::from_le_bytes(sector[$offset..$offset + N].try_into().unwrap())
            }};
        }

        let media = sector[11];
        if media != SFAT_MEDIA {
            return Err(SfatError::invalid(format!(
                "bogus media byte 0x{:02x}, expected 0x{:02x}",
                media, SFAT_MEDIA
            )));
        }

        let sector_size: u16 = e!(u16, 12);
        if !matches!(sector_size, 512 | 1024 | 2048 | 4096) {
            return Err(SfatError::invalid(format!(
                "bogus logical sector size {}",
                sector_size
            )));
        }

        Ok(Self {
            ignored: sector[0..3].try_into().unwrap(),
            system_id: sector[3..11].try_into().unwrap(),
            media,
            sector_size,
            sec_per_clus: sector[14],
            reserved: e!(u16, 15),
            fat_length: e!(u32, 17),
            fats: sector[21],
            sectors: e!(u32, 22),
            clusters: e!(u32, 26),
            root_start: e!(u32, 30),
            root_size: e!(u32, 34),
            freelist: e!(u32, 38),
        })
    }

    /// Encodes this boot sector into the first `BOOT_SECTOR_LEN` bytes of
    /// `out`; the rest of `out` (up to `sector_size`) is left untouched —
    /// callers should zero-fill the sector buffer first.
    pub fn encode(&self, out: &mut [u8]) -> Result<()> {
        if out.len() < BOOT_SECTOR_LEN {
            return Err(SfatError::invalid(format!(
                "boot sector output buffer too short ({} < {})",
                out.len(),
                BOOT_SECTOR_LEN
            )));
        }

        out[0..3].copy_from_slice(&self.ignored);
        out[3..11].copy_from_slice(&self.system_id);
        out[11] = self.media;
        out[12..14].copy_from_slice(&self.sector_size.to_le_bytes());
        out[14] = self.sec_per_clus;
        out[15..17].copy_from_slice(&self.reserved.to_le_bytes());
        out[17..21].copy_from_slice(&self.fat_length.to_le_bytes());
        out[21] = self.fats;
        out[22..26].copy_from_slice(&self.sectors.to_le_bytes());
        out[26..30].copy_from_slice(&self.clusters.to_le_bytes());
        out[30..34].copy_from_slice(&self.root_start.to_le_bytes());
        out[34..38].copy_from_slice(&self.root_size.to_le_bytes());
        out[38..42].copy_from_slice(&self.freelist.to_le_bytes());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BootSector {
        BootSector {
            ignored: [0, 0, 0],
            system_id: *b"SFAT0001",
            media: SFAT_MEDIA,
            sector_size: 512,
            sec_per_clus: 4,
            reserved: 10,
            fat_length: 16,
            fats: 2,
            sectors: 2048,
            clusters: 500,
            root_start: 0,
            root_size: 1,
            freelist: 0,
        }
    }

    #[test]
    fn round_trip() {
        let bs = sample();
        let mut buf = vec![0u8; 512];
        bs.encode(&mut buf).unwrap();
        let decoded = BootSector::decode(&buf).unwrap();
        assert_eq!(bs, decoded);
    }

    #[test]
    fn rejects_bad_media() {
        let mut buf = vec![0u8; 512];
        sample().encode(&mut buf).unwrap();
        buf[11] = 0x00;
        assert!(BootSector::decode(&buf).is_err());
    }

    #[test]
    fn rejects_bad_sector_size() {
        let mut buf = vec![0u8; 512];
        sample().encode(&mut buf).unwrap();
        buf[12..14].copy_from_slice(&700u16.to_le_bytes());
        assert!(BootSector::decode(&buf).is_err());
    }
}
