//! Error types for SAP loading.

use thiserror::Error;

pub use gme_common::{GmeError, Result};

/// Problems found while reading a SAP file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SapError {
    /// Missing `SAP` signature line.
    #[error("not a SAP file")]
    InvalidSignature,
    /// A header line could not be read.
    #[error("malformed header line at byte {offset}")]
    MalformedLine {
        /// Byte offset of the line.
        offset: usize,
    },
    /// A header value did not parse.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Header keyword.
        key: String,
        /// Raw value text.
        value: String,
    },
    /// A player type this crate does not run.
    #[error("SAP type {0} not supported")]
    UnsupportedType(char),
    /// The type requires an address the header does not give.
    #[error("TYPE {typ} needs {key}")]
    MissingAddress {
        /// Player type.
        typ: char,
        /// Missing keyword.
        key: &'static str,
    },
    /// No binary data after the header.
    #[error("no binary blocks after header")]
    NoData,
    /// A block whose end address precedes its start.
    #[error("block 0x{start:04X}-0x{end:04X} is inverted")]
    InvertedBlock {
        /// Start address.
        start: u16,
        /// End address.
        end: u16,
    },
}

impl From<SapError> for GmeError {
    fn from(err: SapError) -> Self {
        match err {
            SapError::InvalidSignature => GmeError::WrongFileType,
            SapError::UnsupportedType(_) => GmeError::Unsupported(err.to_string()),
            other => GmeError::FileCorrupt(other.to_string()),
        }
    }
}
