//! Game music emulation.
//!
//! Plays chiptune rips by re-running the original 6502 or Z80 sound driver
//! against emulated memory and sound chips:
//!
//! | Format | System | Chips |
//! |---|---|---|
//! | NSF | NES / Famicom | 2A03 APU |
//! | AY | ZX Spectrum, Amstrad CPC | AY-3-8910, beeper |
//! | KSS | MSX, Sega Master System | AY-3-8910, SCC, SN76489 |
//! | SAP | Atari XL/XE | POKEY |
//! | SGC | Sega Master System, Game Gear | SN76489 |
//!
//! # Quick start
//!
//! ```no_run
//! use gme::{open, PlayerConfig};
//!
//! let data = std::fs::read("song.nsf").unwrap();
//! let mut player = open(&data, &PlayerConfig::default()).unwrap();
//! player.play();
//! let samples = player.generate_samples(44_100);
//! ```
//!
//! Each format also has its own crate (`gme-nsf-replayer` and friends)
//! exposing the machine for register-level inspection.

#![warn(missing_docs)]

pub mod export;

pub use gme_common::{
    BasicMetadata, ChiptunePlayer, ChiptunePlayerBase, GmeError, PlaybackState, PlayerConfig,
    Result,
};

/// File formats recognised by [`identify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MusicType {
    /// NES Sound Format.
    Nsf,
    /// ZX Spectrum / Amstrad CPC AY.
    Ay,
    /// MSX / Master System KSS.
    Kss,
    /// Atari Slight Atari Player.
    Sap,
    /// Sega Master System / Game Gear SGC.
    Sgc,
    /// Not a recognised format.
    Unknown,
}

impl MusicType {
    /// Short format name.
    pub fn name(self) -> &'static str {
        match self {
            MusicType::Nsf => "NSF",
            MusicType::Ay => "AY",
            MusicType::Kss => "KSS",
            MusicType::Sap => "SAP",
            MusicType::Sgc => "SGC",
            MusicType::Unknown => "unknown",
        }
    }

    /// Usual file extension, lower case.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            MusicType::Nsf => Some("nsf"),
            MusicType::Ay => Some("ay"),
            MusicType::Kss => Some("kss"),
            MusicType::Sap => Some("sap"),
            MusicType::Sgc => Some("sgc"),
            MusicType::Unknown => None,
        }
    }
}

/// Guess the format from the first four bytes of a file.
pub fn identify(header: &[u8]) -> MusicType {
    let Some(magic) = header.get(..4) else {
        return MusicType::Unknown;
    };
    match magic {
        b"NESM" => MusicType::Nsf,
        b"ZXAY" => MusicType::Ay,
        b"KSCC" | b"KSSX" => MusicType::Kss,
        b"SAP\r" | b"SAP\n" => MusicType::Sap,
        b"SGC\x1A" => MusicType::Sgc,
        _ => MusicType::Unknown,
    }
}

/// Open any supported file and start its default track.
///
/// Returns [`GmeError::WrongFileType`] when the data is not a known format.
pub fn open(data: &[u8], config: &PlayerConfig) -> Result<Box<dyn ChiptunePlayerBase>> {
    let kind = identify(data);
    log::debug!("opening {} bytes as {}", data.len(), kind.name());
    Ok(match kind {
        MusicType::Nsf => Box::new(gme_nsf_replayer::open(data, config)?),
        MusicType::Ay => Box::new(gme_ay_replayer::open(data, config)?),
        MusicType::Kss => Box::new(gme_kss_replayer::open(data, config)?),
        MusicType::Sap => Box::new(gme_sap_replayer::open(data, config)?),
        MusicType::Sgc => Box::new(gme_sgc_replayer::open(data, config)?),
        MusicType::Unknown => return Err(GmeError::WrongFileType),
    })
}
