//! NSF player built on the generic chip player.

use gme_common::{ChipPlayer, PlayerConfig};

use crate::error::Result;
use crate::machine::NsfMachine;
use crate::parser::load_nsf;

/// Player for NSF files.
pub type NsfPlayer = ChipPlayer<NsfMachine>;

/// Parse `data` and start its default track.
pub fn open(data: &[u8], config: &PlayerConfig) -> Result<NsfPlayer> {
    let file = load_nsf(data)?;
    let first = file.header.first_track.saturating_sub(1) as usize;
    let machine = NsfMachine::new(file, config);
    ChipPlayer::with_track(machine, config, first)
}
