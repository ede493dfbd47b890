//! Error handling for NSF loading and playback.

pub use gme_common::{GmeError, Result};
