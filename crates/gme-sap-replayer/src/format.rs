//! SAP data structures.

/// Atari PAL CPU clock in Hz; NTSC tunes are played at the same clock.
pub const CLOCK_RATE: u32 = 1_773_447;
/// CPU clocks per scanline.
pub const SCANLINE_PERIOD: i32 = 114;
/// Scanlines per PAL frame.
pub const PAL_LINES: u32 = 312;
/// Scanlines per NTSC frame.
pub const NTSC_LINES: u32 = 262;

/// How the player routine is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SapType {
    /// `INIT` gets the song in A; `PLAYER` is called every frame.
    B,
    /// `PLAYER+3` sets up the music at `MUSIC`, then starts the song;
    /// `PLAYER+6` is called every frame.
    C,
}

impl SapType {
    /// Header letter.
    pub fn letter(self) -> char {
        match self {
            SapType::B => 'B',
            SapType::C => 'C',
        }
    }
}

/// Header fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SapHeader {
    /// `AUTHOR`.
    pub author: String,
    /// `NAME`.
    pub name: String,
    /// `DATE`.
    pub date: String,
    /// `SONGS`.
    pub song_count: usize,
    /// `DEFSONG`, 0-based.
    pub default_song: usize,
    /// `STEREO`: a second POKEY at `0xD210`.
    pub stereo: bool,
    /// `NTSC`: 262 scanlines per frame.
    pub ntsc: bool,
    /// `TYPE`.
    pub typ: SapType,
    /// `FASTPLAY`: scanlines between play calls.
    pub fastplay: u32,
    /// `INIT`.
    pub init_addr: Option<u16>,
    /// `MUSIC`.
    pub music_addr: Option<u16>,
    /// `PLAYER`.
    pub player_addr: u16,
    /// `TIME` of each song in seconds, `None` when not given.
    pub durations: Vec<Option<f32>>,
    /// `LOOP` suffix of each `TIME`.
    pub loops: Vec<bool>,
}

impl SapHeader {
    /// Scanlines per video frame.
    pub fn lines_per_frame(&self) -> u32 {
        if self.ntsc {
            NTSC_LINES
        } else {
            PAL_LINES
        }
    }

    /// Clocks between play calls.
    pub fn play_period(&self) -> i32 {
        self.fastplay.max(1) as i32 * SCANLINE_PERIOD
    }

    /// Play routine rate in Hz.
    pub fn play_rate(&self) -> u32 {
        (CLOCK_RATE as f64 / self.play_period() as f64).round() as u32
    }

    /// Declared length of `song`.
    pub fn duration(&self, song: usize) -> Option<f32> {
        self.durations.get(song).copied().flatten()
    }

    /// Address called every frame.
    pub fn play_entry(&self) -> u16 {
        match self.typ {
            SapType::B => self.player_addr,
            SapType::C => self.player_addr.wrapping_add(6),
        }
    }
}

/// One binary load block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SapBlock {
    /// First address.
    pub start: u16,
    /// Bytes loaded from `start`.
    pub data: Vec<u8>,
}

/// Parsed SAP file.
#[derive(Debug, Clone, PartialEq)]
pub struct SapFile {
    /// Header fields.
    pub header: SapHeader,
    /// Binary blocks in file order.
    pub blocks: Vec<SapBlock>,
    /// Non-fatal problems met while parsing.
    pub warnings: Vec<String>,
}
