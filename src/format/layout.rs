//! Deriving a valid initial layout and writing it out (spec.md §6's
//! formatter collaborator).
//!
//! Grounded in `original_source/myfat/app/format.cpp`'s derivation of
//! `clusters`/`fat_length` from a device's raw sector count, rather than
//! requiring the caller to hand-pick them (see SPEC_FULL.md §3).

use crate::block::BlockDevice;
use crate::error::{Result, SfatError};
use crate::fat::Fat;
use crate::format::boot_sector::{BootSector, SFAT_MEDIA};
use crate::format::dir_entry::DirEntry;
use crate::format::fat_entry;
use crate::geometry::Geometry;

/// Cluster indices `>= this` are sentinels, never real data (spec.md §3).
const SFAT_ENTRY_MAX: u32 = fat_entry::MAX_VALID;

/// A fully-derived, ready-to-write boot sector plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub sector_size: u16,
    pub sec_per_clus: u8,
    pub reserved: u16,
    pub fats: u8,
    pub fat_length: u32,
    pub sectors: u32,
    pub clusters: u32,
}

/// Derives `clusters` and `fat_length` from a device's total sector count,
/// following `myfat/app/format.cpp`'s two-pass sizing: first size `clusters`
/// as if the FAT were free, size the FAT from that, then shrink `clusters`
/// by however many of those clusters the FAT copies themselves occupy.
pub fn plan_layout(
    sectors: u32,
    sector_size: u16,
    sec_per_clus: u8,
    reserved: u16,
    fats: u8,
) -> Result<Layout> {
    if sec_per_clus == 0 {
        return Err(SfatError::invalid("sec_per_clus must be nonzero"));
    }
    if fats == 0 {
        return Err(SfatError::invalid("fats must be nonzero"));
    }

    let header_sectors = 1u32 + reserved as u32;
    let avail_sectors = sectors
        .checked_sub(header_sectors)
        .ok_or_else(|| SfatError::invalid("device too small to hold boot sector + reserved area"))?;

    let mut clusters = (avail_sectors / sec_per_clus as u32).min(SFAT_ENTRY_MAX);
    if clusters == 0 {
        return Err(SfatError::invalid("device too small to hold a single cluster"));
    }

    let fat_length = fat_sectors_for(clusters, sector_size);
    let fat_total_sectors = fat_length * fats as u32;
    let fat_clusters = (fat_total_sectors + sec_per_clus as u32 - 1) / sec_per_clus as u32;

    clusters = clusters
        .checked_sub(fat_clusters)
        .ok_or_else(|| SfatError::invalid("device too small: FAT copies consume all clusters"))?;
    if clusters == 0 {
        return Err(SfatError::invalid("device too small to hold any data clusters"));
    }

    Ok(Layout {
        sector_size,
        sec_per_clus,
        reserved,
        fats,
        fat_length,
        sectors,
        clusters,
    })
}

fn fat_sectors_for(clusters: u32, sector_size: u16) -> u32 {
    let bytes = clusters as u64 * 4;
    let sector_size = sector_size as u64;
    ((bytes + sector_size - 1) / sector_size) as u32
}

/// Writes a fresh SFAT image matching `layout`: the boot sector, an
/// all-free FAT except for the root's `EOC` entry, and a root directory
/// whose first cluster's first slot is `EMPTY_END` (spec.md §6).
pub fn format_volume<D: BlockDevice>(device: &mut D, layout: Layout) -> Result<()> {
    let bs = BootSector {
        ignored: [0, 0, 0],
        system_id: *b"SFAT0001",
        media: SFAT_MEDIA,
        sector_size: layout.sector_size,
        sec_per_clus: layout.sec_per_clus,
        reserved: layout.reserved,
        fat_length: layout.fat_length,
        fats: layout.fats,
        sectors: layout.sectors,
        clusters: layout.clusters,
        root_start: 0,
        root_size: 1,
        freelist: 0,
    };

    let block_size = device.block_size();
    let mut sector0 = vec![0u8; block_size as usize];
    bs.encode(&mut sector0)?;
    device.write_block(0, &sector0)?;

    let geo = Geometry::derive(&bs, block_size)?;

    {
        let mut fat = Fat::new(device, geo);
        for c in 0..geo.clusters {
            let value = if c == geo.root_cluster {
                fat_entry::END_OF_CHAIN
            } else {
                fat_entry::FREE
            };
            fat.modify(c, value)?;
        }
    }

    let root_block_no = geo.cls_to_blk(geo.root_cluster);
    let mut root_block = device.read_block(root_block_no)?;
    DirEntry::empty_end().encode(&mut root_block[0..32])?;
    device.write_block(root_block_no, &root_block)?;

    Ok(())
}
