//! ChipPlayer behaviour over a scripted machine.

use approx::assert_abs_diff_eq;
use gme_chips::{DeltaSink, VoiceMixer};
use gme_common::{
    check_track, new_mixer, BasicMetadata, ChipPlayer, ChiptunePlayer, ChiptunePlayerBase,
    GmeError, MachineDriver, PlaybackState, PlayerConfig, Time,
};

const CLOCK: u32 = 100_000;

/// Two voices holding a constant level; voice 1 is louder.
struct Steady {
    mixer: VoiceMixer,
    meta: BasicMetadata,
    mute: u32,
    levels: [i32; 2],
    started: Vec<usize>,
    frames: u32,
    tempo: f64,
}

impl Steady {
    fn new(config: &PlayerConfig) -> Self {
        let mut mixer = new_mixer(config, CLOCK, 2);
        mixer.set_voice_gain(0, 0.25);
        mixer.set_voice_gain(1, 0.5);
        let mut meta = BasicMetadata::new("TEST", "Bench");
        meta.track_count = 3;
        Self {
            mixer,
            meta,
            mute: 0,
            levels: [0; 2],
            started: Vec::new(),
            frames: 0,
            tempo: 1.0,
        }
    }
}

impl MachineDriver for Steady {
    fn clock_rate(&self) -> u32 {
        CLOCK
    }
    fn track_count(&self) -> usize {
        3
    }
    fn start_track(&mut self, index: usize) -> gme_common::Result<()> {
        check_track(index, 3)?;
        self.started.push(index);
        Ok(())
    }
    fn end_frame(&mut self, duration: Time) -> Time {
        for voice in 0..2 {
            let target = if self.mute & (1 << voice) != 0 { 0 } else { 1 };
            let delta = target - self.levels[voice];
            if delta != 0 {
                self.mixer.offset(voice, 0, delta);
                self.levels[voice] = target;
            }
        }
        self.mixer.end_frame(duration);
        self.frames += 1;
        duration
    }
    fn set_tempo(&mut self, tempo: f64) {
        self.tempo = tempo;
    }
    fn set_voice_mute(&mut self, mask: u32) {
        self.mute = mask;
    }
    fn voice_names(&self) -> Vec<&'static str> {
        vec!["Quiet", "Loud"]
    }
    fn mixer(&self) -> &VoiceMixer {
        &self.mixer
    }
    fn mixer_mut(&mut self) -> &mut VoiceMixer {
        &mut self.mixer
    }
    fn take_warning(&mut self) -> Option<String> {
        None
    }
    fn metadata(&self) -> &BasicMetadata {
        &self.meta
    }
    fn track_length_secs(&self, index: usize) -> Option<f32> {
        (index == 1).then_some(0.25)
    }
}

fn config() -> PlayerConfig {
    PlayerConfig {
        sample_rate: 8_000,
        bass_shift: 24,
        default_length_secs: 1.0,
        ..PlayerConfig::default()
    }
}

fn player() -> ChipPlayer<Steady> {
    let config = config();
    ChipPlayer::new(Steady::new(&config), &config).unwrap()
}

#[test]
fn stopped_player_outputs_silence() {
    let mut p = player();
    let out = p.generate_samples(100);
    assert!(out.iter().all(|&s| s == 0.0));
    assert_eq!(p.machine().frames, 0);
}

#[test]
fn output_follows_voice_gains() {
    let mut p = player();
    p.play();
    let out = p.generate_samples(400);
    assert_abs_diff_eq!(out[399], 0.75, epsilon = 0.01);
    p.set_voice_mute(1, true);
    assert!(p.is_voice_muted(1));
    // Samples of the frame already rendered drain first.
    let out = p.generate_samples(800);
    assert_abs_diff_eq!(out[799], 0.25, epsilon = 0.01);
}

#[test]
fn default_length_stops_playback() {
    let mut p = player();
    p.play();
    let out = p.generate_samples(9_000);
    assert_eq!(p.state(), PlaybackState::Stopped);
    assert_eq!(p.samples_played(), 8_000);
    assert!(out[8_000..].iter().all(|&s| s == 0.0));
    assert_abs_diff_eq!(p.duration_seconds(), 1.0);
    assert_abs_diff_eq!(p.playback_position(), 1.0);
}

#[test]
fn declared_track_length_wins() {
    let mut p = player();
    assert!(p.set_subsong(2));
    assert_eq!(p.current_subsong(), 2);
    assert_abs_diff_eq!(p.duration_seconds(), 0.25);
    assert_eq!(p.metadata().duration_seconds, Some(0.25));
    p.play();
    p.generate_samples(4_000);
    assert_eq!(p.samples_played(), 2_000);

    // Playing again after the end rewinds the track.
    p.play();
    assert_eq!(p.samples_played(), 0);
    assert_eq!(p.machine().started, vec![0, 1, 1]);
}

#[test]
fn bad_subsong_is_rejected() {
    let mut p = player();
    assert!(!p.set_subsong(0));
    assert!(!p.set_subsong(4));
    assert_eq!(p.current_subsong(), 1);
    assert_eq!(p.subsong_count(), 3);
}

#[test]
fn bad_initial_track_fails() {
    let config = config();
    let err = ChipPlayer::with_track(Steady::new(&config), &config, 7)
        .err()
        .unwrap();
    assert_eq!(err, GmeError::BadTrack { index: 7, count: 3 });
}

#[test]
fn tempo_and_voice_names_reach_machine() {
    let mut p = player();
    p.set_tempo(1.5);
    assert_abs_diff_eq!(p.machine().tempo, 1.5);
    assert_eq!(p.voice_names(), vec!["Quiet", "Loud"]);
    assert_eq!(p.voice_count(), 2);
}

#[test]
fn pause_keeps_position() {
    let mut p = player();
    p.play();
    p.generate_samples(100);
    p.pause();
    assert_eq!(p.state(), PlaybackState::Paused);
    let out = p.generate_samples(100);
    assert!(out.iter().all(|&s| s == 0.0));
    p.play();
    assert_eq!(p.samples_played(), 100);
}
