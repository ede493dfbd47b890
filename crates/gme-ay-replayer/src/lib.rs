//! AY file parser and replayer.
//!
//! This crate provides building blocks for Project AY (`.ay`) files:
//! - a parser that understands the ZXAY/EMUL container format
//! - structured metadata, song entries and memory blocks
//! - [`AyMachine`], a Z80 with 64 KiB RAM, an AY-3-8910 and the Spectrum
//!   beeper, which works out from the guest's port traffic whether it is
//!   a Spectrum or a CPC tune

#![warn(missing_docs)]

pub mod error;
pub mod format;
mod machine;
mod parser;
pub mod player;

pub use crate::error::{AyError, GmeError, Result};
pub use crate::format::{AyBlock, AyFile, AyHeader, AyPoints, AySong, AySongData};
pub use crate::machine::{AyMachine, AySystem};
pub use crate::parser::load_ay;
pub use crate::player::{open, AyPlayer};
