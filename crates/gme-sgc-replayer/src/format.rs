//! SGC data structures.

/// NTSC Z80 clock in Hz.
pub const CLOCK_NTSC: u32 = 3_579_545;
/// PAL Z80 clock in Hz.
pub const CLOCK_PAL: u32 = 3_546_893;

/// Size of the fixed header preceding the ROM image.
pub const HEADER_SIZE: usize = 0xA0;

/// Target hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SgcSystem {
    /// Sega Master System.
    MasterSystem,
    /// Sega Game Gear.
    GameGear,
}

impl SgcSystem {
    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            SgcSystem::MasterSystem => "Sega Master System",
            SgcSystem::GameGear => "Sega Game Gear",
        }
    }
}

/// Fixed 160-byte SGC header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SgcHeader {
    /// Format revision.
    pub version: u8,
    /// 50 Hz timing.
    pub pal: bool,
    /// Address the image is loaded at.
    pub load_addr: u16,
    /// Init routine entry.
    pub init_addr: u16,
    /// Play routine entry.
    pub play_addr: u16,
    /// Initial stack pointer.
    pub stack_ptr: u16,
    /// Targets of `RST 08` through `RST 38`.
    pub rst_addrs: [u16; 7],
    /// Initial values of the mapper registers at `0xFFFC-0xFFFF`.
    pub mapping: [u8; 4],
    /// Default song, 0-based.
    pub first_song: u8,
    /// Number of songs.
    pub song_count: u8,
    /// First sound effect number.
    pub first_effect: u8,
    /// Last sound effect number.
    pub last_effect: u8,
    /// Target hardware.
    pub system: SgcSystem,
    /// Game name.
    pub game: String,
    /// Composer.
    pub author: String,
    /// Copyright line.
    pub copyright: String,
}

impl SgcHeader {
    /// CPU clock rate for this tune.
    pub fn clock_rate(&self) -> u32 {
        if self.pal {
            CLOCK_PAL
        } else {
            CLOCK_NTSC
        }
    }

    /// Play routine rate in Hz.
    pub fn play_rate(&self) -> u32 {
        if self.pal {
            50
        } else {
            60
        }
    }

    /// Clocks between play calls.
    pub fn play_period(&self) -> i32 {
        (self.clock_rate() / self.play_rate()) as i32
    }
}

/// Parsed SGC file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SgcFile {
    /// Header fields.
    pub header: SgcHeader,
    /// ROM image following the header, loaded at `load_addr`.
    pub rom: Vec<u8>,
}
