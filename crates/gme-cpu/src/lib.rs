//! CPU cores for game music emulation.
//!
//! Two instruction-level interpreters share one timing contract:
//!
//! - [`mos6502::Mos6502`] - NMOS 6502 (NES/NSF, Atari/SAP), including the
//!   stable undocumented opcodes
//! - [`z80::Z80`] - Zilog Z80 (Spectrum/CPC AY, MSX KSS, Sega SGC)
//!
//! Both cores count cycles in [`Time`] units relative to the start of the
//! current frame. [`Mos6502::run`](mos6502::Mos6502::run) and
//! [`Z80::run`](z80::Z80::run) execute whole instructions until the clock
//! reaches the end time, or until the CPU fetches its idle opcode, which
//! machine drivers use to detect the end of a guest subroutine call.
//!
//! Memory is supplied by the caller through the [`mos6502::Bus`] and
//! [`z80::Bus`] traits, usually backed by a [`MemoryMap`].

#![warn(missing_docs)]

pub mod mos6502;
pub mod paging;
pub mod z80;

pub use paging::{MemoryMap, Region, MEM_SIZE};

/// Clock count relative to the start of the current frame.
pub type Time = i32;
