//! The FAT chain allocator (spec.md §4.4): scan, allocate, free, follow, and
//! modify cluster chains.
//!
//! Grounded in the teacher's `FatEntryTracer`/`cluster_idx_to_fat_sector_and_offset`
//! (`fat/table.rs`), which located an entry's owning block and in-block
//! offset the same way; that module's on-disk entry width and cache layer
//! don't survive here (see DESIGN.md), but the block-locating arithmetic
//! and the "linear scan for the first matching entry" allocation strategy
//! do.

use crate::block::BlockDevice;
use crate::error::{Result, SfatError};
use crate::format::fat_entry;
use crate::geometry::Geometry;

/// One entry's location: the FAT block it lives in, and its byte offset
/// within that block.
struct EntryLoc {
    block: u64,
    offset: usize,
}

/// The FAT allocator for one mounted volume. Operates directly on a
/// [`BlockDevice`] — entries are never cached across calls (spec.md §4.1).
pub struct Fat<'d, D: BlockDevice> {
    device: &'d mut D,
    geo: Geometry,
}

impl<'d, D: BlockDevice> Fat<'d, D> {
    pub fn new(device: &'d mut D, geo: Geometry) -> Self {
        Self { device, geo }
    }

    /// Direct access to the underlying device, for callers (the directory
    /// engine) that need to read raw blocks this layer doesn't interpret.
    pub(crate) fn device_mut(&mut self) -> &mut D {
        self.device
    }

    fn check_index(&self, c: u32) -> Result<()> {
        if c as u64 >= self.geo.clusters as u64 {
            return Err(SfatError::invalid(format!(
                "cluster index {} out of range (have {})",
                c, self.geo.clusters
            )));
        }
        Ok(())
    }

    fn locate(&self, c: u32) -> EntryLoc {
        let byte_pos = c as u64 * 4;
        let block = self.geo.fat_start_blk + byte_pos / self.geo.block_size as u64;
        let offset = (byte_pos % self.geo.block_size as u64) as usize;
        EntryLoc { block, offset }
    }

    fn read_raw(&mut self, c: u32) -> Result<u32> {
        let loc = self.locate(c);
        let block = self.device.read_block(loc.block)?;
        Ok(fat_entry::decode(&block[loc.offset..loc.offset + 4]))
    }

    fn write_raw(&mut self, c: u32, value: u32) -> Result<()> {
        let loc = self.locate(c);
        let mut block = self.device.read_block(loc.block)?;
        block[loc.offset..loc.offset + 4].copy_from_slice(&fat_entry::encode(value));
        self.device.write_block(loc.block, &block)
    }

    /// `next(c) -> c'`. Fails `Invalid` if `c >= clusters`.
    pub fn next(&mut self, c: u32) -> Result<u32> {
        self.check_index(c)?;
        self.read_raw(c)
    }

    /// `acquire() -> c`: returns the lowest-index free cluster, having
    /// already marked it `EOC`. Fails `NotFound` if none are free.
    pub fn acquire(&mut self) -> Result<u32> {
        let mut c = 0u32;
        while c < self.geo.clusters {
            if self.read_raw(c)? == fat_entry::FREE {
                self.write_raw(c, fat_entry::END_OF_CHAIN)?;
                return Ok(c);
            }
            c += 1;
        }
        Err(SfatError::not_found("no free cluster"))
    }

    /// `modify(c, v)`: overwrites entry `c` with the raw value `v`.
    pub fn modify(&mut self, c: u32, value: u32) -> Result<()> {
        self.check_index(c)?;
        self.write_raw(c, value)
    }

    /// `append(start, tail)`: walks the chain from `start` to its current
    /// `EOC` entry and replaces it with `tail`.
    pub fn append(&mut self, start: u32, tail: u32) -> Result<()> {
        let mut cur = start;
        for _ in 0..self.geo.clusters {
            let next = self.next(cur)?;
            if next == fat_entry::END_OF_CHAIN {
                self.write_raw(cur, tail)?;
                return Ok(());
            }
            if !fat_entry::is_cluster_index(next) {
                return Err(SfatError::invalid(format!(
                    "chain from {} hit sentinel 0x{:08x} before EOC",
                    start, next
                )));
            }
            cur = next;
        }
        Err(SfatError::invalid(format!(
            "chain from {} exceeded {} hops without reaching EOC",
            start, self.geo.clusters
        )))
    }

    /// `seek(start, byte_pos) -> (cluster, offset_in_cluster)`.
    pub fn seek(&mut self, start: u32, byte_pos: u64) -> Result<(u32, u32)> {
        let hops = byte_pos / self.geo.cluster_size as u64;
        let offset = (byte_pos % self.geo.cluster_size as u64) as u32;

        let mut cur = start;
        for _ in 0..hops {
            let next = self.next(cur)?;
            if !fat_entry::is_cluster_index(next) {
                return Err(SfatError::invalid(format!(
                    "seek past end of chain from {} at offset {}",
                    start, byte_pos
                )));
            }
            cur = next;
        }
        Ok((cur, offset))
    }

    /// Counts the clusters in the chain starting at `start` (used by
    /// property tests and `stat`-style queries). `start` may be a sentinel
    /// only if `allow_empty` permits it.
    pub fn chain_len(&mut self, start: u32) -> Result<u32> {
        if !fat_entry::is_cluster_index(start) {
            return Ok(0);
        }
        let mut len = 1u32;
        let mut cur = start;
        loop {
            let next = self.next(cur)?;
            if next == fat_entry::END_OF_CHAIN {
                return Ok(len);
            }
            if !fat_entry::is_cluster_index(next) {
                return Err(SfatError::invalid(format!(
                    "chain from {} hit sentinel 0x{:08x}",
                    start, next
                )));
            }
            cur = next;
            len += 1;
            if len > self.geo.clusters {
                return Err(SfatError::invalid(format!(
                    "chain from {} did not terminate within {} clusters",
                    start, self.geo.clusters
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemDevice;
    use crate::format::BootSector;

    fn geo() -> Geometry {
        let bs = BootSector {
            ignored: [0, 0, 0],
            system_id: *b"SFAT0001",
            media: crate::format::boot_sector::SFAT_MEDIA,
            sector_size: 512,
            sec_per_clus: 4,
            reserved: 10,
            fat_length: 16,
            fats: 2,
            sectors: 4096,
            clusters: 8,
            root_start: 0,
            root_size: 1,
            freelist: 0,
        };
        Geometry::derive(&bs, 512).unwrap()
    }

    fn fresh_device(geo: &Geometry) -> MemDevice {
        let mut dev = MemDevice::new(512, 4096);
        for c in 0..geo.clusters {
            let value = if c == geo.root_cluster {
                fat_entry::END_OF_CHAIN
            } else {
                fat_entry::FREE
            };
            let byte_pos = c as u64 * 4;
            let block_no = geo.fat_start_blk + byte_pos / geo.block_size as u64;
            let offset = (byte_pos % geo.block_size as u64) as usize;
            let mut block = dev.read_block(block_no).unwrap();
            block[offset..offset + 4].copy_from_slice(&fat_entry::encode(value));
            dev.write_block(block_no, &block).unwrap();
        }
        dev
    }

    #[test]
    fn acquire_returns_lowest_free_index() {
        let geo = geo();
        let mut dev = fresh_device(&geo);
        let mut fat = Fat::new(&mut dev, geo);

        assert_eq!(fat.acquire().unwrap(), 1);
        assert_eq!(fat.acquire().unwrap(), 2);
        assert_eq!(fat.next(1).unwrap(), fat_entry::END_OF_CHAIN);
    }

    #[test]
    fn acquire_then_free_restores_fat() {
        let geo = geo();
        let mut dev = fresh_device(&geo);
        let before = dev.as_bytes().to_vec();

        let mut fat = Fat::new(&mut dev, geo);
        let c = fat.acquire().unwrap();
        fat.modify(c, fat_entry::FREE).unwrap();

        assert_eq!(dev.as_bytes(), before.as_slice());
    }

    #[test]
    fn append_splices_onto_tail() {
        let geo = geo();
        let mut dev = fresh_device(&geo);
        let mut fat = Fat::new(&mut dev, geo);

        let a = fat.acquire().unwrap();
        let b = fat.acquire().unwrap();
        fat.append(a, b).unwrap();

        assert_eq!(fat.next(a).unwrap(), b);
        assert_eq!(fat.chain_len(a).unwrap(), 2);
    }

    #[test]
    fn seek_walks_chain() {
        let geo = geo();
        let mut dev = fresh_device(&geo);
        let mut fat = Fat::new(&mut dev, geo);

        let a = fat.acquire().unwrap();
        let b = fat.acquire().unwrap();
        fat.append(a, b).unwrap();

        let (cluster, offset) = fat.seek(a, geo.cluster_size as u64 + 10).unwrap();
        assert_eq!(cluster, b);
        assert_eq!(offset, 10);
    }

    #[test]
    fn exhausting_fat_yields_not_found() {
        let geo = geo();
        let mut dev = fresh_device(&geo);
        let mut fat = Fat::new(&mut dev, geo);

        for _ in 0..(geo.clusters - 1) {
            fat.acquire().unwrap();
        }
        assert!(fat.acquire().is_err());
    }
}
