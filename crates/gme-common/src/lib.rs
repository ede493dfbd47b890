//! Common traits and types for game music replayers.
//!
//! This crate provides the pieces every format crate (NSF, AY, KSS, SAP,
//! SGC) shares:
//!
//! - [`GmeError`] - load-time failure taxonomy, and [`WarningSlot`] for
//!   playback anomalies that never stop the frame loop
//! - [`ChiptunePlayerBase`] / [`ChiptunePlayer`] - the player surface
//! - [`MachineDriver`] and [`ChipPlayer`] - a generic player over any
//!   emulated machine
//! - [`PlayScheduler`] - the init/play call scheduler for guest code
//! - [`PlayerConfig`] - rendering configuration, loadable from JSON
//!
//! # Example
//!
//! ```ignore
//! use gme_common::{ChiptunePlayerBase, PlaybackState};
//!
//! fn render(player: &mut dyn ChiptunePlayerBase) -> Vec<f32> {
//!     player.play();
//!     let mut out = Vec::new();
//!     let mut buffer = vec![0.0; 4096];
//!     while player.state() == PlaybackState::Playing {
//!         player.generate_samples_into(&mut buffer);
//!         out.extend_from_slice(&buffer);
//!     }
//!     out
//! }
//! ```

#![warn(missing_docs)]

mod chip_player;
mod config;
mod driver;
mod error;
mod metadata;
mod player;
pub mod scheduler;
mod warning;

pub use chip_player::ChipPlayer;
pub use config::PlayerConfig;
pub use driver::{check_track, new_mixer, MachineDriver};
pub use error::{GmeError, Result};
pub use metadata::{BasicMetadata, MetadataFields, PlaybackMetadata};
pub use player::{ChiptunePlayer, ChiptunePlayerBase, PlaybackState};
pub use scheduler::{GuestMachine, PlayScheduler};
pub use warning::WarningSlot;

pub use gme_chips::Time;

/// Standard audio sample rate (44.1 kHz CD quality).
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// PAL frame rate (50 Hz).
pub const FRAME_RATE_PAL: u32 = 50;

/// NTSC frame rate (60 Hz).
pub const FRAME_RATE_NTSC: u32 = 60;
