//! KSS data structures.

use bitflags::bitflags;

/// Z80 clock of both the MSX and the Master System (NTSC colour burst).
pub const CLOCK_RATE: u32 = 3_579_545;

/// Size of the header common to both variants.
pub const HEADER_SIZE: usize = 0x10;
/// Size of the KSSX extension block.
pub const EXTRA_HEADER_SIZE: usize = 0x10;

/// Tracks addressable in a KSCC file, which has no track table.
pub const KSCC_TRACK_COUNT: usize = 256;

bitflags! {
    /// Sound hardware bits of the header's device byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DeviceFlags: u8 {
        /// FM-PAC (MSX-MUSIC), or the FM unit on Sega hardware.
        const FM_UNIT = 0x01;
        /// SN76489 instead of AY + SCC.
        const SN76489 = 0x02;
        /// Game Gear stereo register on port 0x06.
        const GAME_GEAR = 0x04;
        /// Y8950 (MSX-AUDIO).
        const MSX_AUDIO = 0x08;
        /// 50 Hz play rate.
        const PAL = 0x40;
    }
}

/// Header magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KssVariant {
    /// Original `KSCC` layout.
    Kscc,
    /// Extended `KSSX` layout with a track range.
    Kssx,
}

/// KSS header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KssHeader {
    /// Which magic the file starts with.
    pub variant: KssVariant,
    /// RAM address of the non-banked image.
    pub load_addr: u16,
    /// Length of the non-banked image as declared.
    pub load_size: u16,
    /// Init routine entry.
    pub init_addr: u16,
    /// Play routine entry.
    pub play_addr: u16,
    /// Bank number the bank data starts at.
    pub first_bank: u8,
    /// Bit 7: 8 KiB banks. Bits 0-6: bank count.
    pub bank_mode: u8,
    /// Length of the KSSX extension block.
    pub extra_header: u8,
    /// Sound hardware.
    pub device_flags: DeviceFlags,
    /// First playable track (KSSX).
    pub first_track_index: u16,
    /// Last playable track (KSSX).
    pub last_track_index: u16,
}

impl KssHeader {
    /// Bytes per ROM bank.
    pub fn bank_size(&self) -> usize {
        if self.bank_mode & 0x80 != 0 {
            0x2000
        } else {
            0x4000
        }
    }

    /// Bank count the header declares.
    pub fn declared_banks(&self) -> usize {
        (self.bank_mode & 0x7F) as usize
    }

    /// True for Sega hardware.
    pub fn uses_sn76489(&self) -> bool {
        self.device_flags.contains(DeviceFlags::SN76489)
    }

    /// Number of selectable tracks.
    pub fn track_count(&self) -> usize {
        match self.variant {
            KssVariant::Kscc => KSCC_TRACK_COUNT,
            KssVariant::Kssx => self.last_track_index as usize + 1,
        }
    }

    /// Default track, 0-based.
    pub fn first_track(&self) -> usize {
        match self.variant {
            KssVariant::Kssx if (self.first_track_index as usize) < self.track_count() => {
                self.first_track_index as usize
            }
            _ => 0,
        }
    }

    /// Play routine rate in Hz.
    pub fn play_rate(&self) -> u32 {
        if self.device_flags.contains(DeviceFlags::PAL) {
            50
        } else {
            60
        }
    }

    /// Clocks between play calls.
    pub fn play_period(&self) -> i32 {
        (CLOCK_RATE / self.play_rate()) as i32
    }

    /// Names of the FM chips the tune asks for; none are emulated.
    pub fn fm_chips(&self) -> Vec<&'static str> {
        let mut chips = Vec::new();
        if self.device_flags.contains(DeviceFlags::FM_UNIT) {
            chips.push(if self.uses_sn76489() { "YM2413" } else { "FM-PAC" });
        }
        if !self.uses_sn76489() && self.device_flags.contains(DeviceFlags::MSX_AUDIO) {
            chips.push("MSX-AUDIO");
        }
        chips
    }

    /// Host computer or console.
    pub fn system(&self) -> &'static str {
        if self.uses_sn76489() {
            if self.device_flags.contains(DeviceFlags::GAME_GEAR) {
                "Sega Game Gear"
            } else {
                "Sega Master System"
            }
        } else {
            "MSX"
        }
    }
}

/// Parsed KSS file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KssFile {
    /// Header fields.
    pub header: KssHeader,
    /// Image copied to RAM at `load_addr`, clamped to the file and to 64 KiB.
    pub load_data: Vec<u8>,
    /// Bank data following the image.
    pub bank_data: Vec<u8>,
    /// Banks actually present in `bank_data`.
    pub bank_count: usize,
    /// Non-fatal problems met while parsing.
    pub warnings: Vec<String>,
}
