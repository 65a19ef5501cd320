//! The error kinds from spec.md §7, as a single propagated type.

use std::fmt;

/// Everything a SimpleFAT operation can fail with.
///
/// Errors are never swallowed internally (§7's policy); the one exception —
/// `count_subdirs` tolerating a negative/unreadable result during root
/// init — is handled locally in [`crate::volume::Volume::mount`] rather than
/// by hiding an error variant here.
#[derive(thiserror::Error, Debug)]
pub enum SfatError {
    /// A block read or write did not complete (short transfer or device
    /// error).
    #[error("block I/O failed at block {block}: {reason}")]
    Io { block: u64, reason: String },

    /// Malformed on-disk data, a bad argument, a truncated/circular chain,
    /// or a gap write.
    #[error("invalid: {0}")]
    Invalid(String),

    /// A name was not found, or a directory has no free slot.
    #[error("not found: {0}")]
    NotFound(String),

    /// A name already exists in the directory.
    #[error("already exists: {0}")]
    Exists(String),

    /// A buffer allocation failed.
    #[error("out of memory: {0}")]
    NoMem(String),

    /// The FAT has no free cluster left.
    #[error("no space left on device")]
    NoSpace,
}

impl From<std::io::Error> for SfatError {
    fn from(e: std::io::Error) -> Self {
        SfatError::Io { block: 0, reason: e.to_string() }
    }
}

impl SfatError {
    pub(crate) fn io(block: u64, reason: impl fmt::Display) -> Self {
        SfatError::Io { block, reason: reason.to_string() }
    }

    pub(crate) fn invalid(msg: impl fmt::Display) -> Self {
        SfatError::Invalid(msg.to_string())
    }

    pub(crate) fn not_found(msg: impl fmt::Display) -> Self {
        SfatError::NotFound(msg.to_string())
    }

    pub(crate) fn exists(msg: impl fmt::Display) -> Self {
        SfatError::Exists(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SfatError>;
