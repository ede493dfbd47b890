//! Error handling for AY parsing and playback.

use thiserror::Error;

pub use gme_common::{GmeError, Result};

/// Structural problems found while parsing an AY container.
///
/// Converted to [`GmeError`] at the crate boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AyError {
    /// File does not start with the `ZXAY` marker.
    #[error("AY file must start with ZXAY header")]
    InvalidFileId,
    /// Container type other than `EMUL`.
    #[error("unsupported AY type '{typ}'")]
    UnsupportedType {
        /// Type identifier encountered inside the header.
        typ: String,
    },
    /// Buffer too small to contain the requested structure.
    #[error("unexpected end of file at offset 0x{offset:04x}")]
    UnexpectedEof {
        /// Offset of the structure that ran past the end.
        offset: usize,
    },
    /// A required relative pointer is zero.
    #[error("missing pointer at offset 0x{offset:04x}")]
    MissingPointer {
        /// Offset of the pointer field inside the file.
        offset: usize,
    },
    /// Relative pointer points outside of the file.
    #[error("pointer at offset 0x{offset:04x} points outside AY file")]
    PointerOutOfRange {
        /// Offset of the pointer field inside the file.
        offset: usize,
    },
    /// Song has neither a points table nor blocks to infer one from.
    #[error("song {song} has no init address")]
    NoInitAddress {
        /// Zero-based song index.
        song: usize,
    },
}

impl From<AyError> for GmeError {
    fn from(err: AyError) -> Self {
        match err {
            AyError::InvalidFileId => GmeError::WrongFileType,
            AyError::UnsupportedType { typ } => {
                GmeError::Unsupported(format!("AY container type '{typ}'"))
            }
            other => GmeError::FileCorrupt(other.to_string()),
        }
    }
}
