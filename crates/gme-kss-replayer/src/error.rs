//! Error handling for KSS loading and playback.

pub use gme_common::{GmeError, Result};
