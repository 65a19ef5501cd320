//! The directory engine (spec.md §4.5): walk, search, and insert 32-byte
//! directory entries.
//!
//! Grounded in the teacher's `DirIter`/`Dir::find_entry` (`fat/dir.rs`),
//! which drove the same cluster-by-cluster, block-by-block scan over
//! packed entries; the free-slot/`EMPTY_END`-propagation logic in
//! [`DirEngine::create_file`] is new (the teacher's FAT32 never tombstones
//! slots this way) and is original design, built directly from spec.md
//! §4.5 step 2a/2b — no source-side `sfat_add_entry` or equivalent exists
//! in the retrieved `original_source/` to port from.

use crate::block::BlockDevice;
use crate::fat::Fat;
use crate::format::dir_entry::{Attr, DIR_ENTRY_LEN};
use crate::format::DirEntry;
use crate::error::{Result, SfatError};
use crate::geometry::Geometry;

/// The location of a directory entry within its directory's chain:
/// cluster index, block-within-cluster, and byte offset within that block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLoc {
    pub cluster: u32,
    pub blk_in_cluster: u32,
    pub offset: u32,
}

impl EntryLoc {
    /// Absolute block number on the device.
    fn block_no(&self, geo: &Geometry) -> u64 {
        geo.cls_to_blk(self.cluster) + self.blk_in_cluster as u64
    }

    /// The inode's `i_pos`: absolute byte offset in the volume.
    pub fn entry_pos(&self, geo: &Geometry) -> u64 {
        geo.entry_pos(self.cluster, self.blk_in_cluster, self.offset)
    }
}

pub struct DirEngine<'d, D: BlockDevice> {
    device: &'d mut D,
    geo: Geometry,
}

impl<'d, D: BlockDevice> DirEngine<'d, D> {
    pub fn new(device: &'d mut D, geo: Geometry) -> Self {
        Self { device, geo }
    }

    fn read_entry(&mut self, loc: EntryLoc) -> Result<DirEntry> {
        let block = self.device.read_block(loc.block_no(&self.geo))?;
        let start = loc.offset as usize;
        DirEntry::decode(&block[start..start + DIR_ENTRY_LEN])
    }

    fn write_entry(&mut self, loc: EntryLoc, entry: &DirEntry) -> Result<()> {
        let block_no = loc.block_no(&self.geo);
        let mut block = self.device.read_block(block_no)?;
        let start = loc.offset as usize;
        entry.encode(&mut block[start..start + DIR_ENTRY_LEN])?;
        self.device.write_block(block_no, &block)
    }

    /// Calls `f` for every `(loc, entry)` in the directory chain starting
    /// at `dir_start`, walking cluster-by-cluster then block-by-block then
    /// entry-by-entry, stopping at `EMPTY_END` or when `f` returns `Some`.
    fn scan<R>(
        &mut self,
        dir_start: u32,
        mut f: impl FnMut(EntryLoc, &DirEntry) -> Option<R>,
    ) -> Result<Option<R>> {
        let mut fat = Fat::new(self.device, self.geo);
        let mut cluster = dir_start;
        loop {
            for blk_in_cluster in 0..self.geo.blk_per_clus {
                for i in 0..self.geo.dirent_per_blk {
                    let loc = EntryLoc {
                        cluster,
                        blk_in_cluster,
                        offset: i * DIR_ENTRY_LEN as u32,
                    };
                    let entry = {
                        let block = fat
                            .device_mut()
                            .read_block(loc.block_no(&self.geo))?;
                        let start = loc.offset as usize;
                        DirEntry::decode(&block[start..start + DIR_ENTRY_LEN])?
                    };
                    if entry.attr.contains(Attr::EMPTY_END) {
                        return Ok(None);
                    }
                    if let Some(r) = f(loc, &entry) {
                        return Ok(Some(r));
                    }
                }
            }

            let next = fat.next(cluster)?;
            if !crate::format::fat_entry::is_cluster_index(next) {
                return Ok(None);
            }
            cluster = next;
        }
    }

    /// `locate(dir_start, name) -> (entry, loc)`.
    pub fn locate(&mut self, dir_start: u32, name: &str) -> Result<(DirEntry, EntryLoc)> {
        let found = self.scan(dir_start, |loc, entry| {
            if !entry.attr.contains(Attr::EMPTY) && entry.name_matches(name) {
                Some((*entry, loc))
            } else {
                None
            }
        })?;
        found.ok_or_else(|| SfatError::not_found(format!("no such file: {:?}", name)))
    }

    /// `locate_free(dir_start) -> loc` — the first entry with `EMPTY` or
    /// `EMPTY_END` set.
    fn locate_free(&mut self, dir_start: u32) -> Result<EntryLoc> {
        let mut fat = Fat::new(self.device, self.geo);
        let mut cluster = dir_start;
        loop {
            for blk_in_cluster in 0..self.geo.blk_per_clus {
                for i in 0..self.geo.dirent_per_blk {
                    let loc = EntryLoc {
                        cluster,
                        blk_in_cluster,
                        offset: i * DIR_ENTRY_LEN as u32,
                    };
                    let block = fat.device_mut().read_block(loc.block_no(&self.geo))?;
                    let start = loc.offset as usize;
                    let entry = DirEntry::decode(&block[start..start + DIR_ENTRY_LEN])?;
                    if entry.attr.contains(Attr::EMPTY) || entry.attr.contains(Attr::EMPTY_END) {
                        return Ok(loc);
                    }
                }
            }

            let next = fat.next(cluster)?;
            if !crate::format::fat_entry::is_cluster_index(next) {
                return Err(SfatError::not_found("directory chain is full"));
            }
            cluster = next;
        }
    }

    /// The next slot after `loc` — `None` if `loc` was the last slot of its
    /// cluster's last block (spec.md §4.5 step 2a).
    fn successor_in_block(&self, loc: EntryLoc) -> Option<EntryLoc> {
        let next_offset = loc.offset + DIR_ENTRY_LEN as u32;
        if next_offset < self.geo.dirent_per_blk * DIR_ENTRY_LEN as u32 {
            Some(EntryLoc { offset: next_offset, ..loc })
        } else {
            None
        }
    }

    /// Implements spec.md §4.5 `create_file`. Returns the new entry's
    /// location (whose `entry_pos` becomes the new inode's `i_pos`), and the
    /// `(size, i_blocks)` growth applied to the parent that the caller must
    /// flush onto the parent inode.
    pub fn create_file(
        &mut self,
        dir_start: u32,
        name: &str,
        now: u32,
    ) -> Result<(EntryLoc, u32, u32)> {
        if self.locate(dir_start, name).is_ok() {
            return Err(SfatError::exists(format!("{:?} already exists", name)));
        }

        let packed_name = DirEntry::pack_name(name)?;
        let new_entry = DirEntry {
            name: packed_name,
            attr: Attr::empty(),
            crt_time: now,
            lst_acc_time: now,
            wrt_time: now,
            size: 0,
            fst_cls_no: crate::format::fat_entry::FREE,
        };

        match self.locate_free(dir_start) {
            Ok(loc) => {
                let prior = self.read_entry(loc)?;
                self.write_entry(loc, &new_entry)?;

                if prior.attr.contains(Attr::EMPTY_END) {
                    self.propagate_terminator(loc)?;
                }

                Ok((loc, 0, 0))
            }
            Err(SfatError::NotFound(_)) => {
                let cluster = {
                    let mut fat = Fat::new(self.device, self.geo);
                    let c = fat.acquire()?;
                    fat.append(dir_start, c)?;
                    c
                };

                let block_no = self.geo.cls_to_blk(cluster);
                let mut block = self.device.read_block(block_no)?;
                new_entry.encode(&mut block[0..DIR_ENTRY_LEN])?;
                DirEntry::empty_end().encode(
                    &mut block[DIR_ENTRY_LEN..2 * DIR_ENTRY_LEN],
                )?;
                self.device.write_block(block_no, &block)?;

                let loc = EntryLoc { cluster, blk_in_cluster: 0, offset: 0 };
                Ok((loc, self.geo.cluster_size, self.geo.blk_per_clus))
            }
            Err(e) => Err(e),
        }
    }

    /// Moves an `EMPTY_END` terminator from `loc` to the next slot, which
    /// may be in the same block, the next block in the cluster, or the
    /// first block of the next cluster in the chain. If the chain has no
    /// next cluster, no terminator is written — end-of-chain implicitly
    /// terminates the scan (spec.md §4.5 step 2a).
    fn propagate_terminator(&mut self, loc: EntryLoc) -> Result<()> {
        if let Some(succ) = self.successor_in_block(loc) {
            return self.write_entry(succ, &DirEntry::empty_end());
        }

        if loc.blk_in_cluster + 1 < self.geo.blk_per_clus {
            let succ = EntryLoc { blk_in_cluster: loc.blk_in_cluster + 1, offset: 0, ..loc };
            return self.write_entry(succ, &DirEntry::empty_end());
        }

        let next_cluster = {
            let mut fat = Fat::new(self.device, self.geo);
            fat.next(loc.cluster)?
        };
        if !crate::format::fat_entry::is_cluster_index(next_cluster) {
            return Ok(());
        }

        let succ = EntryLoc { cluster: next_cluster, blk_in_cluster: 0, offset: 0 };
        self.write_entry(succ, &DirEntry::empty_end())
    }

    /// Enumerates every live entry in the directory starting at `dir_start`,
    /// invoking `visit(f_pos, entry)` in order. `f_pos` is the 32-byte
    /// aligned cursor described in spec.md §4.5; resuming from an arbitrary
    /// `start_pos` (itself 32-byte aligned) yields the same tail sequence
    /// (B4).
    pub fn read_dir(
        &mut self,
        dir_start: u32,
        start_pos: u32,
        mut visit: impl FnMut(u32, &DirEntry) -> bool,
    ) -> Result<()> {
        let entries_per_cluster = self.geo.entries_per_cluster();
        let mut f_pos = start_pos;
        let mut fat = Fat::new(self.device, self.geo);

        let mut cluster = dir_start;
        let mut skip = f_pos / DIR_ENTRY_LEN as u32;
        while skip >= entries_per_cluster {
            let next = fat.next(cluster)?;
            if !crate::format::fat_entry::is_cluster_index(next) {
                return Ok(());
            }
            cluster = next;
            skip -= entries_per_cluster;
        }

        'outer: loop {
            for i in skip..entries_per_cluster {
                let blk_in_cluster = i / self.geo.dirent_per_blk;
                let offset = (i % self.geo.dirent_per_blk) * DIR_ENTRY_LEN as u32;
                let loc = EntryLoc { cluster, blk_in_cluster, offset };

                let block = fat.device_mut().read_block(loc.block_no(&self.geo))?;
                let start = offset as usize;
                let entry = DirEntry::decode(&block[start..start + DIR_ENTRY_LEN])?;

                if entry.attr.contains(Attr::EMPTY_END) {
                    break 'outer;
                }
                if !entry.attr.contains(Attr::EMPTY) {
                    let keep_going = visit(f_pos, &entry);
                    if !keep_going {
                        break 'outer;
                    }
                }
                f_pos += DIR_ENTRY_LEN as u32;
            }

            skip = 0;
            let next = fat.next(cluster)?;
            if !crate::format::fat_entry::is_cluster_index(next) {
                break;
            }
            cluster = next;
        }

        Ok(())
    }
}
