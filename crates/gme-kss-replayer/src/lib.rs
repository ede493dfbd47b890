//! KSS (MSX and Sega Master System) parser and player.
//!
//! KSS files carry Z80 music drivers ripped from MSX cartridges or Sega
//! 8-bit games. [`KssMachine`] runs them with:
//! - 64 KiB of RAM holding a tiny BIOS (`WRTPSG`/`RDPSG` at `0x93`/`0x96`)
//! - 8 KiB or 16 KiB ROM banks switched in at `0x8000`
//! - an AY-3-8910 plus Konami SCC on MSX, or an SN76489 on Sega hardware
//!
//! FM-PAC and MSX-AUDIO flags are reported but the FM chips are not emulated.

#![warn(missing_docs)]

pub mod error;
pub mod format;
mod machine;
mod parser;
pub mod player;

pub use crate::error::{GmeError, Result};
pub use crate::format::{DeviceFlags, KssFile, KssHeader, KssVariant};
pub use crate::machine::{KssMachine, IDLE_ADDR};
pub use crate::parser::load_kss;
pub use crate::player::{open, KssPlayer};
