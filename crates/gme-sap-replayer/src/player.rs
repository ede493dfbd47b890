//! SAP player built on the generic chip player.

use gme_common::{ChipPlayer, PlayerConfig};

use crate::error::Result;
use crate::machine::SapMachine;
use crate::parser::load_sap;

/// Player for SAP files.
pub type SapPlayer = ChipPlayer<SapMachine>;

/// Parse `data` and start its `DEFSONG`.
pub fn open(data: &[u8], config: &PlayerConfig) -> Result<SapPlayer> {
    let file = load_sap(data)?;
    let first = file.header.default_song;
    let machine = SapMachine::new(file, config);
    ChipPlayer::with_track(machine, config, first)
}
