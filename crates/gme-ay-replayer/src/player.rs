//! AY player built on the generic chip player.

use gme_common::{ChipPlayer, PlayerConfig};

use crate::error::Result;
use crate::machine::AyMachine;
use crate::parser::load_ay;

/// Player for Project AY files.
pub type AyPlayer = ChipPlayer<AyMachine>;

/// Parse `data` and start the song the header marks as first.
pub fn open(data: &[u8], config: &PlayerConfig) -> Result<AyPlayer> {
    let file = load_ay(data)?;
    let first = file.header.first_song;
    let machine = AyMachine::new(file, config);
    ChipPlayer::with_track(machine, config, first)
}
