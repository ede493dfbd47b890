//! 2A03 lookup tables (NTSC and PAL).

/// Length counter reload values indexed by bits 3-7 of register 3.
#[rustfmt::skip]
pub(crate) const LENGTH_TABLE: [u8; 32] = [
    0x0A, 0xFE, 0x14, 0x02, 0x28, 0x04, 0x50, 0x06,
    0xA0, 0x08, 0x3C, 0x0A, 0x0E, 0x0C, 0x1A, 0x0E,
    0x0C, 0x10, 0x18, 0x12, 0x30, 0x14, 0x60, 0x16,
    0xC0, 0x18, 0x48, 0x1A, 0x10, 0x1C, 0x20, 0x1E,
];

/// Noise timer periods in CPU clocks.
#[rustfmt::skip]
pub(crate) const NOISE_PERIODS: [[i32; 16]; 2] = [
    [
        0x004, 0x008, 0x010, 0x020, 0x040, 0x060, 0x080, 0x0A0,
        0x0CA, 0x0FE, 0x17C, 0x1FC, 0x2FA, 0x3F8, 0x7F2, 0xFE4,
    ],
    [
        0x004, 0x008, 0x00E, 0x01E, 0x03C, 0x058, 0x076, 0x094,
        0x0BC, 0x0EC, 0x162, 0x1D8, 0x2C4, 0x3B0, 0x762, 0xEC2,
    ],
];

/// DMC output bit periods in CPU clocks.
#[rustfmt::skip]
pub(crate) const DMC_PERIODS: [[i32; 16]; 2] = [
    [428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54],
    [398, 354, 316, 298, 276, 236, 210, 198, 176, 148, 132, 118, 98, 78, 66, 50],
];

/// Frame sequencer step length in CPU clocks.
pub(crate) const FRAME_PERIOD: [i32; 2] = [7458, 8314];
