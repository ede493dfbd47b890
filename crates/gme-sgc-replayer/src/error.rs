//! Error handling for SGC loading and playback.

pub use gme_common::{GmeError, Result};
