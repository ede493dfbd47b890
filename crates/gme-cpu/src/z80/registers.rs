//! Z80 register file.
//!
//! Register pairs are stored as 16-bit words; byte halves are reached
//! through accessor methods.

/// Carry flag.
pub const CF: u8 = 0x01;
/// Add/subtract flag.
pub const NF: u8 = 0x02;
/// Parity/overflow flag.
pub const PF: u8 = 0x04;
/// Undocumented bit 3 copy.
pub const XF: u8 = 0x08;
/// Half-carry flag.
pub const HF: u8 = 0x10;
/// Undocumented bit 5 copy.
pub const YF: u8 = 0x20;
/// Zero flag.
pub const ZF: u8 = 0x40;
/// Sign flag.
pub const SF: u8 = 0x80;

macro_rules! pair_bytes {
    ($pair:ident, $hi:ident, $set_hi:ident, $lo:ident, $set_lo:ident) => {
        #[doc = concat!("High byte of `", stringify!($pair), "`.")]
        #[inline]
        pub fn $hi(&self) -> u8 {
            (self.$pair >> 8) as u8
        }

        #[doc = concat!("Set the high byte of `", stringify!($pair), "`.")]
        #[inline]
        pub fn $set_hi(&mut self, v: u8) {
            self.$pair = (self.$pair & 0x00FF) | (v as u16) << 8;
        }

        #[doc = concat!("Low byte of `", stringify!($pair), "`.")]
        #[inline]
        pub fn $lo(&self) -> u8 {
            self.$pair as u8
        }

        #[doc = concat!("Set the low byte of `", stringify!($pair), "`.")]
        #[inline]
        pub fn $set_lo(&mut self, v: u8) {
            self.$pair = (self.$pair & 0xFF00) | v as u16;
        }
    };
}

/// Z80 register set, `Copy` so drivers can snapshot it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Registers {
    /// Accumulator and flags.
    pub af: u16,
    /// BC pair.
    pub bc: u16,
    /// DE pair.
    pub de: u16,
    /// HL pair.
    pub hl: u16,
    /// Alternate AF'.
    pub af_alt: u16,
    /// Alternate BC'.
    pub bc_alt: u16,
    /// Alternate DE'.
    pub de_alt: u16,
    /// Alternate HL'.
    pub hl_alt: u16,
    /// IX index register.
    pub ix: u16,
    /// IY index register.
    pub iy: u16,
    /// Stack pointer.
    pub sp: u16,
    /// Program counter.
    pub pc: u16,
    /// Interrupt vector base.
    pub i: u8,
    /// Memory refresh counter.
    pub r: u8,
    /// Interrupt enable flip-flop 1.
    pub iff1: bool,
    /// Interrupt enable flip-flop 2.
    pub iff2: bool,
    /// Interrupt mode (0, 1 or 2).
    pub im: u8,
}

impl Registers {
    pair_bytes!(af, a, set_a, f, set_f);
    pair_bytes!(bc, b, set_b, c, set_c);
    pair_bytes!(de, d, set_d, e, set_e);
    pair_bytes!(hl, h, set_h, l, set_l);
    pair_bytes!(ix, ixh, set_ixh, ixl, set_ixl);
    pair_bytes!(iy, iyh, set_iyh, iyl, set_iyl);

    /// Set every general pair (AF BC DE HL and alternates, IX, IY) to `value`.
    pub fn fill_pairs(&mut self, value: u16) {
        self.af = value;
        self.bc = value;
        self.de = value;
        self.hl = value;
        self.af_alt = value;
        self.bc_alt = value;
        self.de_alt = value;
        self.hl_alt = value;
        self.ix = value;
        self.iy = value;
    }
}
