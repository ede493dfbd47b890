//! End-to-end SAP playback on synthetic files.

use gme_common::{ChiptunePlayerBase, GmeError, MachineDriver, PlayerConfig, PlaybackState};
use gme_sap_replayer::{load_sap, open, SapMachine, IDLE_ADDR};

/// init: AUDF1=$40, AUDC1=$AF (pure tone, volume 15), AUDCTL=0
const TONE_INIT: [u8; 16] = [
    0xA9, 0x40, 0x8D, 0x00, 0xD2, 0xA9, 0xAF, 0x8D, 0x01, 0xD2, 0xA9, 0x00, 0x8D, 0x08, 0xD2,
    0x60,
];
/// play: INC $3000; RTS
const COUNTING_PLAY: [u8; 4] = [0xEE, 0x00, 0x30, 0x60];

fn sap(extra_header: &str) -> Vec<u8> {
    let header = format!("SAP\nNAME \"Test\"\nTYPE B\nINIT 2000\nPLAYER 2010\n{extra_header}");
    let mut code = vec![0xEA; 0x14];
    code[..TONE_INIT.len()].copy_from_slice(&TONE_INIT);
    code[0x10..].copy_from_slice(&COUNTING_PLAY);

    let mut data = header.replace('\n', "\r\n").into_bytes();
    data.extend_from_slice(&[0xFF, 0xFF]);
    data.extend_from_slice(&0x2000u16.to_le_bytes());
    data.extend_from_slice(&(0x2000 + code.len() as u16 - 1).to_le_bytes());
    data.extend_from_slice(&code);
    data
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0f32, |m, s| m.max(s.abs()))
}

#[test]
fn play_routine_runs_once_per_frame() {
    let mut machine = SapMachine::new(load_sap(&sap("")).unwrap(), &PlayerConfig::default());
    machine.start_track(0).unwrap();
    let period = machine.play_period();
    assert_eq!(period, 312 * 114);
    for frame in 1..=60u64 {
        machine.end_frame(period);
        machine
            .mixer_mut()
            .buffer_mut()
            .read_samples(&mut vec![0i16; 4096]);
        assert_eq!(machine.play_calls(), frame);
        assert_eq!(machine.pc(), IDLE_ADDR);
    }
    assert_eq!(machine.peek(0x3000), 60);
}

#[test]
fn fastplay_shortens_period() {
    let machine = SapMachine::new(
        load_sap(&sap("FASTPLAY 156\n")).unwrap(),
        &PlayerConfig::default(),
    );
    assert_eq!(machine.play_period(), 156 * 114);
}

#[test]
fn pokey_tone_reaches_output() {
    let mut player = open(&sap(""), &PlayerConfig::default()).unwrap();
    player.play();
    let samples = player.generate_samples(4410);
    assert!(peak(&samples) > 0.05, "peak {}", peak(&samples));
    assert_eq!(player.basic_metadata().title, "Test");
    assert!(player.take_warning().is_none());
}

#[test]
fn time_tag_ends_playback() {
    let config = PlayerConfig {
        sample_rate: 8_000,
        ..PlayerConfig::default()
    };
    let mut player = open(&sap("TIME 00:01\n"), &config).unwrap();
    player.play();
    player.generate_samples(7_990);
    assert!(player.is_playing());
    player.generate_samples(100);
    assert_eq!(player.state(), PlaybackState::Stopped);
}

#[test]
fn stereo_file_mixes_eight_voices() {
    let player = open(&sap("STEREO\n"), &PlayerConfig::default()).unwrap();
    assert_eq!(player.voice_count(), 8);
}

#[test]
fn foreign_data_is_wrong_file_type() {
    assert!(matches!(
        open(b"KSCC\0\0\0\0", &PlayerConfig::default()),
        Err(GmeError::WrongFileType)
    ));
}
