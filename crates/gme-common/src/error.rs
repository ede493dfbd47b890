//! Error taxonomy shared by every loader and driver.

use thiserror::Error;

/// Convenient result alias.
pub type Result<T> = std::result::Result<T, GmeError>;

/// Failures surfaced to the playback controller.
///
/// Format errors separate "not this format" ([`WrongFileType`](Self::WrongFileType))
/// from "this format but damaged" ([`FileCorrupt`](Self::FileCorrupt)).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GmeError {
    /// Magic tag did not match.
    #[error("wrong file type")]
    WrongFileType,
    /// Right format, but the header or an offset table is unusable.
    #[error("corrupt file: {0}")]
    FileCorrupt(String),
    /// Image larger than the machine can hold.
    #[error("out of memory")]
    OutOfMemory,
    /// Track index outside `0..count`.
    #[error("track {index} out of range ({count} tracks)")]
    BadTrack {
        /// Requested zero-based track.
        index: usize,
        /// Number of tracks in the file.
        count: usize,
    },
    /// Recognised file using a feature this player does not emulate.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Configuration could not be parsed or is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GmeError {
    /// Shorthand for [`GmeError::FileCorrupt`].
    pub fn corrupt(msg: impl Into<String>) -> Self {
        GmeError::FileCorrupt(msg.into())
    }
}
