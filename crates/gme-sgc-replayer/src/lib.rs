//! SGC (Sega Master System / Game Gear) parser and player.
//!
//! [`SgcMachine`] runs the ripped Z80 sound driver behind the Sega mapper:
//! three 16 KiB ROM slots controlled through `0xFFFC-0xFFFF`, 8 KiB of RAM
//! at `0xC000` and the SN76489 PSG on ports `0x7E`/`0x7F`.
//!
//! ColecoVision SGC files need the Coleco BIOS and are rejected.

#![warn(missing_docs)]

pub mod error;
pub mod format;
mod machine;
mod parser;
pub mod player;

pub use crate::error::{GmeError, Result};
pub use crate::format::{SgcFile, SgcHeader, SgcSystem};
pub use crate::machine::{SgcMachine, IDLE_ADDR};
pub use crate::parser::load_sgc;
pub use crate::player::{open, SgcPlayer};
