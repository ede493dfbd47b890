//! Generic player over any [`MachineDriver`].

use crate::{
    BasicMetadata, ChiptunePlayer, ChiptunePlayerBase, MachineDriver, PlaybackState,
    PlayerConfig, Result, Time,
};

const SCRATCH_LEN: usize = 1024;

/// Runs a machine in fixed slices and converts its output to `f32`.
pub struct ChipPlayer<M: MachineDriver> {
    machine: M,
    state: PlaybackState,
    track: usize,
    sample_rate: u32,
    frame_ms: u32,
    gain: f32,
    tempo: f64,
    mute_mask: u32,
    default_length_secs: f32,
    length_samples: u64,
    played: u64,
    rewind_on_play: bool,
    metadata: BasicMetadata,
    scratch: Vec<i16>,
}

impl<M: MachineDriver> ChipPlayer<M> {
    /// Wrap `machine` and start its first track.
    pub fn new(machine: M, config: &PlayerConfig) -> Result<Self> {
        Self::with_track(machine, config, 0)
    }

    /// Wrap `machine` and start track `index` (zero-based).
    pub fn with_track(machine: M, config: &PlayerConfig, index: usize) -> Result<Self> {
        config.validate()?;
        let metadata = machine.metadata().clone();
        let mut player = Self {
            machine,
            state: PlaybackState::Stopped,
            track: index,
            sample_rate: config.sample_rate,
            frame_ms: config.frame_ms,
            gain: config.gain,
            tempo: config.tempo,
            mute_mask: config.mute_mask,
            default_length_secs: config.default_length_secs,
            length_samples: 0,
            played: 0,
            rewind_on_play: false,
            metadata,
            scratch: vec![0; SCRATCH_LEN],
        };
        player.start_track(index)?;
        Ok(player)
    }

    /// Restart playback at track `index` (zero-based).
    pub fn start_track(&mut self, index: usize) -> Result<()> {
        self.machine.start_track(index)?;
        self.track = index;
        self.machine.set_tempo(self.tempo);
        self.machine.set_voice_mute(self.mute_mask);
        self.machine.mixer_mut().buffer_mut().clear();
        let secs = self
            .machine
            .track_length_secs(index)
            .unwrap_or(self.default_length_secs)
            .max(0.0);
        self.length_samples = (secs as f64 * self.sample_rate as f64) as u64;
        self.played = 0;
        self.rewind_on_play = false;
        self.metadata = self.machine.metadata().clone();
        self.metadata.duration_seconds = Some(secs);
        log::debug!("track {} started, length {secs:.1}s", index + 1);
        Ok(())
    }

    /// Current zero-based track.
    pub fn track(&self) -> usize {
        self.track
    }

    /// Samples emitted since the track started.
    pub fn samples_played(&self) -> u64 {
        self.played
    }

    /// Borrow the machine.
    pub fn machine(&self) -> &M {
        &self.machine
    }

    /// Mutably borrow the machine.
    pub fn machine_mut(&mut self) -> &mut M {
        &mut self.machine
    }

    /// Slice length in machine clocks; machines may change clock rate
    /// mid-track.
    fn frame_clocks(&self) -> Time {
        (self.machine.clock_rate() as u64 * self.frame_ms as u64 / 1000).max(1) as Time
    }

    fn rewind(&mut self) {
        if let Err(e) = self.start_track(self.track) {
            log::warn!("could not restart track {}: {e}", self.track + 1);
        }
    }

    fn fill(&mut self, buffer: &mut [f32]) -> usize {
        let mut filled = 0;
        while filled < buffer.len() {
            let left = self.length_samples.saturating_sub(self.played);
            if left == 0 {
                self.state = PlaybackState::Stopped;
                self.rewind_on_play = true;
                break;
            }
            if self.machine.mixer().buffer().samples_avail() == 0 {
                let ran = self.machine.end_frame(self.frame_clocks());
                if ran <= 0 {
                    log::warn!("machine emulated no time, output stops");
                    break;
                }
                continue;
            }
            let want = (buffer.len() - filled)
                .min(left.min(usize::MAX as u64) as usize)
                .min(self.scratch.len());
            let n = self
                .machine
                .mixer_mut()
                .buffer_mut()
                .read_samples(&mut self.scratch[..want]);
            let out = &mut buffer[filled..filled + n];
            for (dst, &s) in out.iter_mut().zip(&self.scratch[..n]) {
                *dst = (s as f32 / 32768.0 * self.gain).clamp(-1.0, 1.0);
            }
            filled += n;
            self.played += n as u64;
        }
        filled
    }
}

impl<M: MachineDriver> ChiptunePlayerBase for ChipPlayer<M> {
    fn play(&mut self) {
        if self.rewind_on_play {
            self.rewind();
        }
        self.state = PlaybackState::Playing;
    }

    fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.rewind();
    }

    fn state(&self) -> PlaybackState {
        self.state
    }

    fn generate_samples_into(&mut self, buffer: &mut [f32]) {
        let filled = if self.state == PlaybackState::Playing {
            self.fill(buffer)
        } else {
            0
        };
        buffer[filled..].fill(0.0);
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn voice_count(&self) -> usize {
        self.machine.voice_count()
    }

    fn voice_names(&self) -> Vec<&'static str> {
        self.machine.voice_names()
    }

    fn set_voice_mute(&mut self, voice: usize, mute: bool) {
        if voice >= 32 {
            return;
        }
        if mute {
            self.mute_mask |= 1 << voice;
        } else {
            self.mute_mask &= !(1 << voice);
        }
        self.machine.set_voice_mute(self.mute_mask);
    }

    fn is_voice_muted(&self, voice: usize) -> bool {
        voice < 32 && self.mute_mask & (1 << voice) != 0
    }

    fn set_mute_mask(&mut self, mask: u32) {
        self.mute_mask = mask;
        self.machine.set_voice_mute(mask);
    }

    fn set_tempo(&mut self, tempo: f64) {
        self.tempo = tempo;
        self.machine.set_tempo(tempo);
    }

    fn take_warning(&mut self) -> Option<String> {
        self.machine.take_warning()
    }

    fn basic_metadata(&self) -> BasicMetadata {
        self.metadata.clone()
    }

    fn playback_position(&self) -> f32 {
        if self.length_samples == 0 {
            return 0.0;
        }
        (self.played as f64 / self.length_samples as f64) as f32
    }

    fn duration_seconds(&self) -> f32 {
        self.length_samples as f32 / self.sample_rate as f32
    }

    fn subsong_count(&self) -> usize {
        self.machine.track_count()
    }

    fn current_subsong(&self) -> usize {
        self.track + 1
    }

    fn set_subsong(&mut self, index: usize) -> bool {
        if index == 0 {
            return false;
        }
        match self.start_track(index - 1) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("cannot switch to track {index}: {e}");
                false
            }
        }
    }
}

impl<M: MachineDriver> ChiptunePlayer for ChipPlayer<M> {
    type Metadata = BasicMetadata;

    fn metadata(&self) -> &BasicMetadata {
        &self.metadata
    }
}
