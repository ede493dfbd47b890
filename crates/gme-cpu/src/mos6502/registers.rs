//! 6502 register file and status flags.

use bitflags::bitflags;

bitflags! {
    /// Processor status register (P).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Status: u8 {
        /// Carry.
        const C = 0x01;
        /// Zero.
        const Z = 0x02;
        /// IRQ disable.
        const I = 0x04;
        /// Decimal mode.
        const D = 0x08;
        /// Break (only exists on the stack copy).
        const B = 0x10;
        /// Unused, always reads as set.
        const R = 0x20;
        /// Overflow.
        const V = 0x40;
        /// Negative.
        const N = 0x80;
    }
}

/// 6502 register set.
///
/// Plain `Copy` data so drivers can snapshot and restore it around
/// nested guest calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    /// Program counter.
    pub pc: u16,
    /// Accumulator.
    pub a: u8,
    /// X index.
    pub x: u8,
    /// Y index.
    pub y: u8,
    /// Stack pointer (stack lives at $0100-$01FF).
    pub sp: u8,
    /// Status flags.
    pub status: Status,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            pc: 0,
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFF,
            status: Status::I | Status::R,
        }
    }
}

impl Registers {
    /// Set Z and N from `value`.
    #[inline]
    pub fn set_nz(&mut self, value: u8) {
        self.status.set(Status::Z, value == 0);
        self.status.set(Status::N, value & 0x80 != 0);
    }

    /// Carry as 0 or 1.
    #[inline]
    pub fn carry(&self) -> u8 {
        self.status.contains(Status::C) as u8
    }
}
