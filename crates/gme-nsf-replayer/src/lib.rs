//! NSF (NES Sound Format) parser and player.
//!
//! An NSF file carries a 6502 music driver for the NES with init and play
//! entry points. [`NsfMachine`] runs it on an emulated 2A03:
//! - 2 KiB work RAM, 8 KiB SRAM at `0x6000`, ROM at `0x8000-0xFFFF`
//! - optional 4 KiB bank switching through `0x5FF8-0x5FFF`
//! - the APU at `0x4000-0x4017`, with DMC samples fetched from ROM
//!
//! Expansion audio (VRC6, FDS, N163, ...) is reported but not emulated.

#![warn(missing_docs)]

pub mod error;
pub mod format;
mod machine;
mod parser;
pub mod player;

pub use crate::error::{GmeError, Result};
pub use crate::format::{NsfFile, NsfHeader};
pub use crate::machine::{NsfMachine, IDLE_ADDR};
pub use crate::parser::load_nsf;
pub use crate::player::{open, NsfPlayer};
