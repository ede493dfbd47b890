//! SAP (Slight Atari Player) parser and player.
//!
//! A SAP file is a text header followed by Atari binary load blocks. The
//! header names the player type and its entry points; [`SapMachine`] runs
//! the code on a 6502 with 64 KiB of RAM and one or two POKEY chips.
//!
//! Types `B` and `C` are played. Types `D` and `S` need a full Atari
//! interrupt model and are rejected as unsupported.

#![warn(missing_docs)]

pub mod error;
pub mod format;
mod machine;
mod parser;
pub mod player;

pub use crate::error::{GmeError, Result, SapError};
pub use crate::format::{SapFile, SapHeader, SapType};
pub use crate::machine::{SapMachine, IDLE_ADDR};
pub use crate::parser::load_sap;
pub use crate::player::{open, SapPlayer};
