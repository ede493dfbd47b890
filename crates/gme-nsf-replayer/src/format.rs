//! NSF data structures.

/// NTSC 2A03 clock in Hz.
pub const CLOCK_NTSC: u32 = 1_789_773;
/// PAL 2A07 clock in Hz.
pub const CLOCK_PAL: u32 = 1_662_607;

/// Play period in CPU clocks at the standard NTSC rate.
const STANDARD_PERIOD_NTSC: i32 = 29_780;
/// Play period in CPU clocks at the standard PAL rate.
const STANDARD_PERIOD_PAL: i32 = 33_247;
const STANDARD_SPEED_NTSC: u16 = 16_666;
const STANDARD_SPEED_PAL: u16 = 20_000;

/// Size of the fixed header preceding the ROM image.
pub const HEADER_SIZE: usize = 0x80;

/// Expansion chip flag bits.
pub mod chips {
    /// Konami VRC6.
    pub const VRC6: u8 = 0x01;
    /// Konami VRC7.
    pub const VRC7: u8 = 0x02;
    /// Famicom Disk System.
    pub const FDS: u8 = 0x04;
    /// Nintendo MMC5.
    pub const MMC5: u8 = 0x08;
    /// Namco 163.
    pub const N163: u8 = 0x10;
    /// Sunsoft 5B.
    pub const FME7: u8 = 0x20;
}

/// Fixed 128-byte NSF header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsfHeader {
    /// Format revision.
    pub version: u8,
    /// Number of tracks.
    pub track_count: u8,
    /// Default track, 1-based.
    pub first_track: u8,
    /// Address the image is loaded at.
    pub load_addr: u16,
    /// Init routine entry.
    pub init_addr: u16,
    /// Play routine entry.
    pub play_addr: u16,
    /// Game name.
    pub game: String,
    /// Composer.
    pub author: String,
    /// Copyright line.
    pub copyright: String,
    /// NTSC play period in microseconds.
    pub ntsc_speed: u16,
    /// Initial bank of each 4 KiB slot at `0x8000-0xFFFF`.
    pub banks: [u8; 8],
    /// PAL play period in microseconds.
    pub pal_speed: u16,
    /// Bit 0: PAL, bit 1: dual PAL/NTSC.
    pub speed_flags: u8,
    /// Expansion sound chips, see [`chips`].
    pub chip_flags: u8,
}

impl NsfHeader {
    /// True when the tune only supports PAL timing.
    ///
    /// Dual-standard tunes play at NTSC.
    pub fn pal_only(&self) -> bool {
        self.speed_flags & 3 == 1
    }

    /// True when any initial bank is non-zero.
    pub fn uses_bank_switching(&self) -> bool {
        self.banks.iter().any(|&b| b != 0)
    }

    /// CPU clock rate for this tune.
    pub fn clock_rate(&self) -> u32 {
        if self.pal_only() {
            CLOCK_PAL
        } else {
            CLOCK_NTSC
        }
    }

    /// Clocks between play calls.
    pub fn play_period(&self) -> i32 {
        let (standard_speed, standard_period, speed) = if self.pal_only() {
            (STANDARD_SPEED_PAL, STANDARD_PERIOD_PAL, self.pal_speed)
        } else {
            (STANDARD_SPEED_NTSC, STANDARD_PERIOD_NTSC, self.ntsc_speed)
        };
        let speed = if speed == 0 { standard_speed } else { speed };
        if speed == standard_speed {
            return standard_period;
        }
        (speed as f64 * self.clock_rate() as f64 / 1_000_000.0) as i32
    }

    /// Names of the expansion chips the tune asks for.
    pub fn expansion_chips(&self) -> Vec<&'static str> {
        [
            (chips::VRC6, "VRC6"),
            (chips::VRC7, "VRC7"),
            (chips::FDS, "FDS"),
            (chips::MMC5, "MMC5"),
            (chips::N163, "N163"),
            (chips::FME7, "Sunsoft 5B"),
        ]
        .into_iter()
        .filter(|(bit, _)| self.chip_flags & bit != 0)
        .map(|(_, name)| name)
        .collect()
    }

    /// Play routine rate in Hz.
    pub fn play_rate(&self) -> u32 {
        (self.clock_rate() as f64 / self.play_period().max(1) as f64).round() as u32
    }
}

/// Parsed NSF file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsfFile {
    /// Header fields.
    pub header: NsfHeader,
    /// ROM image following the header.
    pub rom: Vec<u8>,
}
