//! The 32-byte directory entry record (spec.md §3/§6).
//!
//! The attribute byte is modeled with `bitflags`, generalizing the
//! teacher's hand-rolled `AttributeSet` (`fat/dir.rs`), which only ever
//! recognized FAT32's `Directory` bit; SFAT additionally uses the
//! attribute byte to carry the `EMPTY`/`EMPTY_END` tombstone markers that
//! `locate`/`locate_free` scan for.

use crate::error::{Result, SfatError};

bitflags::bitflags! {
    pub struct Attr: u8 {
        const DIR       = 0x10;
        const EMPTY     = 0x40;
        const EMPTY_END = 0x80;
    }
}

/// The length, in bytes, of one packed directory entry.
pub const DIR_ENTRY_LEN: usize = 32;
/// The length, in bytes, of the fixed `name` field.
pub const NAME_LEN: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; NAME_LEN],
    pub attr: Attr,
    pub crt_time: u32,
    pub lst_acc_time: u32,
    pub wrt_time: u32,
    pub size: u32,
    pub fst_cls_no: u32,
}

/// Whether a directory slot is a live child, a tombstone, or the
/// end-of-scan marker (spec.md §3/§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Neither `EMPTY` nor `EMPTY_END` is set: a live child entry.
    Live,
    /// `EMPTY` is set (and `EMPTY_END` is not): a tombstoned slot, skipped
    /// during scans but scanned *through*.
    Tombstoned,
    /// `EMPTY_END` is set: this slot and every subsequent slot in the
    /// directory are unused. Terminates a scan.
    End,
}

impl DirEntry {
    pub fn state(&self) -> State {
        if self.attr.contains(Attr::EMPTY_END) {
            State::End
        } else if self.attr.contains(Attr::EMPTY) {
            State::Tombstoned
        } else {
            State::Live
        }
    }

    pub fn is_dir(&self) -> bool {
        self.attr.contains(Attr::DIR)
    }

    /// An entry marking "end of directory", used to terminate a fresh
    /// cluster or to relocate an `EMPTY_END` terminator.
    pub fn empty_end() -> Self {
        Self {
            name: [0u8; NAME_LEN],
            attr: Attr::EMPTY_END,
            crt_time: 0,
            lst_acc_time: 0,
            wrt_time: 0,
            size: 0,
            fst_cls_no: 0,
        }
    }

    /// Builds the 11-byte, NUL-padded name field from a `&str`. Names
    /// longer than 11 bytes are rejected — SFAT has no long-filename
    /// support (spec.md §1 Non-goals).
    pub fn pack_name(name: &str) -> Result<[u8; NAME_LEN]> {
        let bytes = name.as_bytes();
        if bytes.len() > NAME_LEN {
            return Err(SfatError::invalid(format!(
                "name {:?} is longer than {} bytes",
                name, NAME_LEN
            )));
        }
        let mut out = [0u8; NAME_LEN];
        out[..bytes.len()].copy_from_slice(bytes);
        Ok(out)
    }

    pub fn name_matches(&self, name: &str) -> bool {
        match Self::pack_name(name) {
            Ok(packed) => packed == self.name,
            Err(_) => false,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DIR_ENTRY_LEN {
            return Err(SfatError::invalid("directory entry buffer too short"));
        }

        macro_rules! e {
            ($ty:ty, $offset:expr) => {{
                const N: usize = core::mem::size_of::<$ty>();
                <$ty>::from_le_bytes(bytes[$offset..$offset + N].try_into().unwrap())
            }};
        }

        Ok(Self {
            name: bytes[0..11].try_into().unwrap(),
            attr: Attr::from_bits_truncate(bytes[11]),
            crt_time: e!(u32, 12),
            lst_acc_time: e!(u32, 16),
            wrt_time: e!(u32, 20),
            size: e!(u32, 24),
            fst_cls_no: e!(u32, 28),
        })
    }

    pub fn encode(&self, out: &mut [u8]) -> Result<()> {
        if out.len() < DIR_ENTRY_LEN {
            return Err(SfatError::invalid("directory entry output buffer too short"));
        }

        out[0..11].copy_from_slice(&self.name);
        out[11] = self.attr.bits();
        out[12..16].copy_from_slice(&self.crt_time.to_le_bytes());
        out[16..20].copy_from_slice(&self.lst_acc_time.to_le_bytes());
        out[20..24].copy_from_slice(&self.wrt_time.to_le_bytes());
        out[24..28].copy_from_slice(&self.size.to_le_bytes());
        out[28..32].copy_from_slice(&self.fst_cls_no.to_le_bytes());

        Ok(())
    }
}
