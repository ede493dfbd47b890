//! Sound chip emulators for game music playback.
//!
//! Every chip follows the same contract:
//!
//! - register writes carry the CPU clock time at which they happen
//! - each voice remembers the amplitude it last emitted and only reports
//!   changes, as `(voice, time, delta)` events into a [`DeltaSink`]
//! - `end_frame(time)` runs the chip up to `time` and rebases internal
//!   clocks so the next frame starts at zero
//!
//! [`BlipBuffer`] turns those deltas into PCM; [`VoiceMixer`] applies
//! per-voice gains in front of it.
//!
//! # Chips
//!
//! - [`NesApu`] - Ricoh 2A03 (two squares, triangle, noise, DMC)
//! - [`AyApu`] - General Instrument AY-3-8910, plus the Spectrum [`Beeper`]
//! - [`SapApu`] - Atari POKEY
//! - [`SmsApu`] - Texas Instruments SN76489
//! - [`SccApu`] - Konami SCC wavetable chip

#![warn(missing_docs)]

pub mod ay_apu;
pub mod blip;
pub mod nes_apu;
pub mod sap_apu;
pub mod scc_apu;
pub mod sms_apu;

pub use ay_apu::{AyApu, Beeper};
pub use blip::{BlipBuffer, DeltaRecorder, DeltaSink, VoiceMixer};
pub use nes_apu::{DmcReader, NesApu};
pub use sap_apu::{PolyTables, SapApu};
pub use scc_apu::SccApu;
pub use sms_apu::SmsApu;

/// Clock count relative to the start of the current frame.
pub type Time = i32;
