//! Flag lookup tables and T-state costs.

use super::registers::{PF, SF, XF, YF, ZF};

const fn build_sz() -> [u8; 256] {
    let mut t = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let v = i as u8;
        t[i] = (v & (SF | YF | XF)) | if v == 0 { ZF } else { 0 };
        i += 1;
    }
    t
}

const fn build_szp() -> [u8; 256] {
    let sz = build_sz();
    let mut t = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let parity = (i as u8).count_ones() % 2 == 0;
        t[i] = sz[i] | if parity { PF } else { 0 };
        i += 1;
    }
    t
}

/// Sign, zero and undocumented bits for each result byte.
pub(crate) const SZ: [u8; 256] = build_sz();
/// [`SZ`] plus even parity.
pub(crate) const SZP: [u8; 256] = build_szp();

/// Unprefixed opcodes; conditional extras and prefix costs are added by
/// the interpreter. Prefix bytes (CB, DD, ED, FD) cost nothing here.
#[rustfmt::skip]
pub(crate) const MAIN_CYCLES: [u8; 256] = [
//  0   1   2   3   4   5   6   7   8   9   A   B   C   D   E   F
    4, 10,  7,  6,  4,  4,  7,  4,  4, 11,  7,  6,  4,  4,  7,  4, // 0
    8, 10,  7,  6,  4,  4,  7,  4, 12, 11,  7,  6,  4,  4,  7,  4, // 1
    7, 10, 16,  6,  4,  4,  7,  4,  7, 11, 16,  6,  4,  4,  7,  4, // 2
    7, 10, 13,  6, 11, 11, 10,  4,  7, 11, 13,  6,  4,  4,  7,  4, // 3
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // 4
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // 5
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // 6
    7,  7,  7,  7,  7,  7,  4,  7,  4,  4,  4,  4,  4,  4,  7,  4, // 7
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // 8
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // 9
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // A
    4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // B
    5, 10, 10, 10, 10, 11,  7, 11,  5, 10, 10,  0, 10, 17,  7, 11, // C
    5, 10, 10, 11, 10, 11,  7, 11,  5,  4, 10, 11, 10,  0,  7, 11, // D
    5, 10, 10, 19, 10, 11,  7, 11,  5,  4, 10,  4, 10,  0,  7, 11, // E
    5, 10, 10,  4, 10, 11,  7, 11,  5,  6, 10,  4, 10,  0,  7, 11, // F
];

const fn build_ed() -> [u8; 256] {
    let mut t = [8u8; 256];
    let mut op = 0x40;
    while op < 0x80 {
        let y = (op >> 3) & 7;
        t[op] = match op & 7 {
            0 | 1 => 12,
            2 => 15,
            3 => 20,
            4 | 6 => 8,
            5 => 14,
            _ => match y {
                0..=3 => 9,
                4 | 5 => 18,
                _ => 8,
            },
        };
        op += 1;
    }
    let mut y = 4;
    while y < 8 {
        let mut z = 0;
        while z < 4 {
            t[0x80 | (y << 3) | z] = 16;
            z += 1;
        }
        y += 1;
    }
    t
}

/// ED-prefixed opcodes, including the ED prefix itself. Repeating block
/// instructions add 5 per iteration that loops.
pub(crate) const ED_CYCLES: [u8; 256] = build_ed();
