//! SGC player built on the generic chip player.

use gme_common::{ChipPlayer, PlayerConfig};

use crate::error::Result;
use crate::machine::SgcMachine;
use crate::parser::load_sgc;

/// Player for SGC files.
pub type SgcPlayer = ChipPlayer<SgcMachine>;

/// Parse `data` and start its first song.
pub fn open(data: &[u8], config: &PlayerConfig) -> Result<SgcPlayer> {
    let file = load_sgc(data)?;
    let first = file.header.first_song as usize;
    let machine = SgcMachine::new(file, config);
    ChipPlayer::with_track(machine, config, first)
}
