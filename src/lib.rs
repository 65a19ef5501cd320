//! SimpleFAT (SFAT): a compact FAT-style filesystem driver.
//!
//! This crate implements the on-disk layout and the read/write/traversal
//! logic that turns a raw block device into a hierarchical file store:
//! boot sector parsing ([`format::BootSector`]), the FAT chain allocator
//! ([`fat::Fat`]), directory-entry lookup/insertion ([`dir::DirEngine`]),
//! the in-memory inode binding ([`inode::Inode`]), and sequential file I/O
//! ([`file::FileIo`]) — tied together behind the single mutex-guarded entry
//! point [`volume::Volume`].
//!
//! Host VFS glue (inode/dentry caches, permission checks, character-set
//! conversion) and block-buffer memory pools are out of scope: this crate
//! takes a [`block::BlockDevice`] and hands back plain [`Vec<u8>`] buffers.

pub mod error;

pub mod block;
pub mod format;
pub mod geometry;

pub mod fat;
pub mod dir;
pub mod inode;
pub mod file;

pub mod mutex;
pub mod volume;

pub use error::{Result, SfatError};
pub use volume::{DirListing, Volume};
