//! Block I/O: read/write a single logical block, little-endian, synchronous.
//!
//! This is the Rust rendering of spec.md §4.1. It generalizes the teacher
//! crate's `Storage` trait (`storage.rs`), which fixed the sector size at
//! compile time via `typenum::consts::U512`; SFAT volumes carry their block
//! size (512/1024/2048/4096) in the boot sector, so here it's a runtime
//! property of the device instead.

use crate::error::{Result, SfatError};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

/// An owned, block-sized buffer.
///
/// Stands in for spec.md's "buffer handle": released on drop, never cached
/// across calls by this layer. Callers that need a block twice must
/// re-read it.
pub type BlockBuf = Vec<u8>;

/// Implementors provide synchronous access to a block-addressable device.
///
/// A call transfers exactly one logical block; partial transfers are
/// reported as [`SfatError::Io`] rather than silently truncated.
pub trait BlockDevice {
    /// The logical block size in bytes. Fixed for the lifetime of the
    /// device.
    fn block_size(&self) -> u32;

    /// Total number of addressable blocks.
    fn block_count(&self) -> u64;

    /// Reads block `block_no` in full.
    fn read_block(&mut self, block_no: u64) -> Result<BlockBuf>;

    /// Writes `buf` (must be exactly `block_size()` bytes) to block
    /// `block_no`.
    fn write_block(&mut self, block_no: u64, buf: &[u8]) -> Result<()>;
}

/// A [`BlockDevice`] backed by a real file or block special device.
#[derive(Debug)]
pub struct FileDevice {
    file: File,
    block_size: u32,
    block_count: u64,
}

impl FileDevice {
    /// Opens `path` read/write, treating it as `block_size`-byte blocks.
    /// `block_count` is derived from the file's length; callers formatting
    /// a fresh image should pre-size the file (e.g. with `set_len`) first.
    pub fn open(path: impl AsRef<std::path::Path>, block_size: u32) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;

        let len = file.metadata()?.len();
        let block_count = len / (block_size as u64);

        Ok(Self { file, block_size, block_count })
    }

    /// Creates (or truncates) `path` to exactly `block_count` blocks of
    /// `block_size` bytes, zero-filled, and opens it.
    pub fn create(
        path: impl AsRef<std::path::Path>,
        block_size: u32,
        block_count: u64,
    ) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        file.set_len(block_count * block_size as u64)?;

        Ok(Self { file, block_size, block_count })
    }
}

impl BlockDevice for FileDevice {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn read_block(&mut self, block_no: u64) -> Result<BlockBuf> {
        if block_no >= self.block_count {
            return Err(SfatError::invalid(format!(
                "read_block: block {} out of range (have {})",
                block_no, self.block_count
            )));
        }

        let mut buf = vec![0u8; self.block_size as usize];
        self.file
            .seek(SeekFrom::Start(block_no * self.block_size as u64))
            .map_err(|e| SfatError::io(block_no, e))?;

        self.file
            .read_exact(&mut buf)
            .map_err(|e| SfatError::io(block_no, e))?;

        Ok(buf)
    }

    fn write_block(&mut self, block_no: u64, buf: &[u8]) -> Result<()> {
        if block_no >= self.block_count {
            return Err(SfatError::invalid(format!(
                "write_block: block {} out of range (have {})",
                block_no, self.block_count
            )));
        }
        if buf.len() != self.block_size as usize {
            return Err(SfatError::invalid(format!(
                "write_block: buffer is {} bytes, block size is {}",
                buf.len(),
                self.block_size
            )));
        }

        self.file
            .seek(SeekFrom::Start(block_no * self.block_size as u64))
            .map_err(|e| SfatError::io(block_no, e))?;

        self.file
            .write_all(buf)
            .map_err(|e| SfatError::io(block_no, e))?;

        Ok(())
    }
}

/// An in-memory [`BlockDevice`], used by tests and by the property tests
/// in §8. Grounded in the teacher's `FileBackedStorage`, used the same way
/// from `tests/file_backed.rs`.
#[derive(Debug, Clone)]
pub struct MemDevice {
    block_size: u32,
    blocks: Vec<u8>,
}

impl MemDevice {
    pub fn new(block_size: u32, block_count: u64) -> Self {
        Self {
            block_size,
            blocks: vec![0u8; (block_size as u64 * block_count) as usize],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.blocks
    }
}

impl BlockDevice for MemDevice {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        self.blocks.len() as u64 / self.block_size as u64
    }

    fn read_block(&mut self, block_no: u64) -> Result<BlockBuf> {
        let bs = self.block_size as usize;
        let start = block_no as usize * bs;
        let end = start + bs;
        if end > self.blocks.len() {
            return Err(SfatError::invalid(format!(
                "read_block: block {} out of range",
                block_no
            )));
        }
        Ok(self.blocks[start..end].to_vec())
    }

    fn write_block(&mut self, block_no: u64, buf: &[u8]) -> Result<()> {
        let bs = self.block_size as usize;
        if buf.len() != bs {
            return Err(SfatError::invalid(format!(
                "write_block: buffer is {} bytes, block size is {}",
                buf.len(),
                bs
            )));
        }
        let start = block_no as usize * bs;
        let end = start + bs;
        if end > self.blocks.len() {
            return Err(SfatError::invalid(format!(
                "write_block: block {} out of range",
                block_no
            )));
        }
        self.blocks[start..end].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_device_round_trip() {
        let mut dev = MemDevice::new(512, 4);
        let mut block = vec![0xABu8; 512];
        block[0] = 0x25;

        dev.write_block(2, &block).unwrap();
        let read_back = dev.read_block(2).unwrap();
        assert_eq!(read_back, block);

        // Untouched blocks stay zeroed.
        assert_eq!(dev.read_block(0).unwrap(), vec![0u8; 512]);
    }

    #[test]
    fn out_of_range_is_invalid() {
        let mut dev = MemDevice::new(512, 2);
        assert!(dev.read_block(2).is_err());
        assert!(dev.write_block(5, &[0u8; 512]).is_err());
    }
}
