//! KSS player built on the generic chip player.

use gme_common::{ChipPlayer, PlayerConfig};

use crate::error::Result;
use crate::machine::KssMachine;
use crate::parser::load_kss;

/// Player for KSS files.
pub type KssPlayer = ChipPlayer<KssMachine>;

/// Parse `data` and start its first track.
pub fn open(data: &[u8], config: &PlayerConfig) -> Result<KssPlayer> {
    let file = load_kss(data)?;
    let first = file.header.first_track();
    let machine = KssMachine::new(file, config);
    ChipPlayer::with_track(machine, config, first)
}
