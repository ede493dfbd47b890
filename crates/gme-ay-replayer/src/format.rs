//! Data structures describing parsed AY files.

/// Parsed AY file with header information and available songs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AyFile {
    /// Header metadata.
    pub header: AyHeader,
    /// All song entries contained in the file.
    pub songs: Vec<AySong>,
    /// Non-fatal problems met while parsing (truncated blocks).
    pub warnings: Vec<String>,
}

/// AY file header metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AyHeader {
    /// Container format version.
    pub file_version: u16,
    /// Requested player version.
    pub player_version: u8,
    /// Author string.
    pub author: String,
    /// Misc/notes string.
    pub misc: String,
    /// Total number of songs.
    pub song_count: usize,
    /// Zero-based index of the default song.
    pub first_song: usize,
}

/// AY song entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AySong {
    /// Song title.
    pub name: String,
    /// Data required for playback.
    pub data: AySongData,
}

/// Register presets, entry points and memory layout of one song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AySongData {
    /// Channel routing (A/B/C/noise); informational for mono output.
    pub channel_map: [u8; 4],
    /// Declared length in 1/50 s units (0 when unknown).
    pub song_length_50hz: u16,
    /// Declared fade length in 1/50 s units.
    pub fade_length_50hz: u16,
    /// High byte loaded into every register pair.
    pub hi_reg: u8,
    /// Low byte loaded into every register pair.
    pub lo_reg: u8,
    /// Stack, init and interrupt addresses.
    pub points: Option<AyPoints>,
    /// Memory blocks to copy into the Z80 address space.
    pub blocks: Vec<AyBlock>,
}

impl AySongData {
    /// Declared length in seconds, `None` when zero.
    pub fn length_secs(&self) -> Option<f32> {
        (self.song_length_50hz != 0).then(|| self.song_length_50hz as f32 / 50.0)
    }

    /// Value of every register pair at init.
    pub fn register_preset(&self) -> u16 {
        (self.hi_reg as u16) << 8 | self.lo_reg as u16
    }
}

/// Z80 setup taken from the points table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AyPoints {
    /// Initial stack pointer.
    pub stack: u16,
    /// Init routine entry (0: use the first block's address).
    pub init: u16,
    /// Interrupt routine entry (0: the init routine installs its own).
    pub interrupt: u16,
}

/// Memory block to load at a fixed address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AyBlock {
    /// Load address inside the Z80 memory map.
    pub address: u16,
    /// Bytes to copy, already clamped to the file and to 64 KiB.
    pub data: Vec<u8>,
}
