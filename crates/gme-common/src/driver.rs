//! Contract between a format's machine and the generic player.

use gme_chips::{BlipBuffer, VoiceMixer};

use crate::{BasicMetadata, PlayerConfig, Result, Time};

/// One emulated machine with a loaded music file.
///
/// The machine owns its CPU, memory, chips and the mixer the chips feed.
/// [`ChipPlayer`](crate::ChipPlayer) drives it one frame at a time and
/// pulls samples from [`mixer_mut`](Self::mixer_mut).
pub trait MachineDriver: Send {
    /// CPU clock rate in Hz; frame durations are in these clocks.
    fn clock_rate(&self) -> u32;

    /// Number of tracks in the loaded file.
    fn track_count(&self) -> usize;

    /// Reset the machine and enter the init routine of track `index`.
    ///
    /// Fails with [`GmeError::BadTrack`](crate::GmeError::BadTrack) when
    /// `index` is out of range.
    fn start_track(&mut self, index: usize) -> Result<()>;

    /// Emulate `duration` clocks, close the mixer frame and return the
    /// clocks actually emulated.
    fn end_frame(&mut self, duration: Time) -> Time;

    /// Scale the play routine rate.
    fn set_tempo(&mut self, tempo: f64);

    /// Mute voices by mask (bit `n` mutes voice `n`).
    fn set_voice_mute(&mut self, mask: u32);

    /// Voice names in global voice index order.
    fn voice_names(&self) -> Vec<&'static str>;

    /// Number of voices.
    fn voice_count(&self) -> usize {
        self.voice_names().len()
    }

    /// Mixer holding emulated output.
    fn mixer(&self) -> &VoiceMixer;

    /// Mutable mixer access for reading samples.
    fn mixer_mut(&mut self) -> &mut VoiceMixer;

    /// Latest emulation anomaly, cleared by reading.
    fn take_warning(&mut self) -> Option<String>;

    /// File metadata, with the duration of the current track.
    fn metadata(&self) -> &BasicMetadata;

    /// Declared length of track `index`, if the file has one.
    fn track_length_secs(&self, _index: usize) -> Option<f32> {
        None
    }
}

/// Mixer for `voices` voices clocked at `clock_rate`, sized from `config`.
pub fn new_mixer(config: &PlayerConfig, clock_rate: u32, voices: usize) -> VoiceMixer {
    let mut buffer = BlipBuffer::new(clock_rate, config.sample_rate, config.buffer_ms);
    buffer.set_bass_shift(config.bass_shift);
    VoiceMixer::new(buffer, voices)
}

/// Check `index` against `count` for [`MachineDriver::start_track`].
pub fn check_track(index: usize, count: usize) -> Result<()> {
    if index >= count {
        return Err(crate::GmeError::BadTrack { index, count });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GmeError;

    #[test]
    fn track_range_is_checked() {
        assert!(check_track(0, 1).is_ok());
        assert_eq!(
            check_track(3, 3),
            Err(GmeError::BadTrack { index: 3, count: 3 })
        );
    }

    #[test]
    fn mixer_uses_config_rates() {
        let config = PlayerConfig {
            sample_rate: 48_000,
            ..PlayerConfig::default()
        };
        let mixer = new_mixer(&config, 1_789_773, 5);
        assert_eq!(mixer.buffer().sample_rate(), 48_000);
        assert_eq!(mixer.buffer().clock_rate(), 1_789_773);
    }
}
