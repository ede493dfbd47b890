//! Unified chiptune player trait.
//!
//! # Trait Hierarchy
//!
//! - [`ChiptunePlayerBase`] - Object-safe base trait for dynamic dispatch
//! - [`ChiptunePlayer`] - Full trait with associated `Metadata` type
//!
//! Use `ChiptunePlayerBase` when you need trait objects (`Box<dyn ChiptunePlayerBase>`).
//! Use `ChiptunePlayer` when you need access to the specific metadata type.

use crate::{BasicMetadata, PlaybackMetadata};

/// Playback state for chiptune players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Player is stopped (at beginning or end).
    #[default]
    Stopped,
    /// Player is actively playing.
    Playing,
    /// Player is paused (can resume).
    Paused,
}

/// Object-safe base trait for chiptune players.
///
/// All types implementing [`ChiptunePlayer`] also implement this trait.
///
/// # Example
///
/// ```ignore
/// use gme_common::{ChiptunePlayerBase, PlaybackState};
///
/// fn play_any(player: &mut dyn ChiptunePlayerBase) {
///     player.play();
///     while player.state() == PlaybackState::Playing {
///         let mut buffer = vec![0.0; 1024];
///         player.generate_samples_into(&mut buffer);
///         // ... write buffer somewhere
///     }
/// }
/// ```
pub trait ChiptunePlayerBase: Send {
    /// Start or resume playback.
    fn play(&mut self);

    /// Pause playback (keeps position).
    fn pause(&mut self);

    /// Stop playback and rewind the current track.
    fn stop(&mut self);

    /// Get current playback state.
    fn state(&self) -> PlaybackState;

    /// Check if currently playing.
    fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    /// Generate samples into an existing buffer.
    ///
    /// Fills the entire buffer. If playback is stopped or paused, or the
    /// track ends part way, the remainder is silence.
    fn generate_samples_into(&mut self, buffer: &mut [f32]);

    /// Generate samples into a new buffer.
    fn generate_samples(&mut self, count: usize) -> Vec<f32> {
        let mut buffer = vec![0.0; count];
        self.generate_samples_into(&mut buffer);
        buffer
    }

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32 {
        crate::DEFAULT_SAMPLE_RATE
    }

    /// Number of independently mutable voices.
    fn voice_count(&self) -> usize {
        0
    }

    /// Display names of the voices, in voice index order.
    fn voice_names(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Mute or unmute one voice.
    ///
    /// Default implementation does nothing.
    fn set_voice_mute(&mut self, _voice: usize, _mute: bool) {}

    /// Check if a voice is muted.
    fn is_voice_muted(&self, _voice: usize) -> bool {
        false
    }

    /// Replace the whole mute mask (bit `n` mutes voice `n`).
    fn set_mute_mask(&mut self, mask: u32) {
        for voice in 0..self.voice_count().min(32) {
            self.set_voice_mute(voice, mask & (1 << voice) != 0);
        }
    }

    /// Scale the play routine rate; 1.0 is normal speed.
    fn set_tempo(&mut self, _tempo: f64) {}

    /// Latest emulation anomaly, cleared by reading.
    fn take_warning(&mut self) -> Option<String> {
        None
    }

    /// Metadata of the loaded file and current track.
    fn basic_metadata(&self) -> BasicMetadata {
        BasicMetadata::default()
    }

    /// Playback position as a fraction of the track length (0.0 to 1.0).
    fn playback_position(&self) -> f32 {
        0.0
    }

    /// Total duration in seconds, 0.0 if unknown.
    fn duration_seconds(&self) -> f32 {
        0.0
    }

    /// Elapsed time in seconds based on playback position.
    fn elapsed_seconds(&self) -> f32 {
        self.playback_position() * self.duration_seconds()
    }

    /// Number of tracks in this file.
    fn subsong_count(&self) -> usize {
        1
    }

    /// Current track (1-based).
    fn current_subsong(&self) -> usize {
        1
    }

    /// Switch to a different track by 1-based index.
    ///
    /// Returns `true` if successful. Default returns `false`.
    fn set_subsong(&mut self, _index: usize) -> bool {
        false
    }

    /// Check if this file has more than one track.
    fn has_subsongs(&self) -> bool {
        self.subsong_count() > 1
    }
}

/// Player interface with access to the format's metadata type.
///
/// This trait is **not** object-safe due to the associated `Metadata` type.
/// Use [`ChiptunePlayerBase`] when you need trait objects.
pub trait ChiptunePlayer: ChiptunePlayerBase {
    /// The metadata type for this player.
    type Metadata: PlaybackMetadata;

    /// Get song metadata.
    fn metadata(&self) -> &Self::Metadata;
}
