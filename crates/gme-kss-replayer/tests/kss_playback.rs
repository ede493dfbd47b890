//! End-to-end KSS playback on synthetic images.

use gme_common::{ChiptunePlayerBase, GmeError, MachineDriver, PlayerConfig};
use gme_kss_replayer::{load_kss, open, KssMachine, IDLE_ADDR};

const LOAD_ADDR: u16 = 0x4000;
const PLAY_OFFSET: usize = 0x40;

/// KSCC image with init at 0x4000 and play at 0x4040.
fn kss_image(init: &[u8], play: &[u8], flags: u8) -> Vec<u8> {
    let mut image = vec![0u8; 0x80];
    image[..init.len()].copy_from_slice(init);
    image[PLAY_OFFSET..PLAY_OFFSET + play.len()].copy_from_slice(play);

    let mut data = vec![0u8; 0x10];
    data[..4].copy_from_slice(b"KSCC");
    data[0x04..0x06].copy_from_slice(&LOAD_ADDR.to_le_bytes());
    data[0x06..0x08].copy_from_slice(&(image.len() as u16).to_le_bytes());
    data[0x08..0x0A].copy_from_slice(&LOAD_ADDR.to_le_bytes());
    data[0x0A..0x0C].copy_from_slice(&(LOAD_ADDR + PLAY_OFFSET as u16).to_le_bytes());
    data[0x0F] = flags;
    data.extend_from_slice(&image);
    data
}

/// LD A,reg; LD E,val; CALL WRTPSG
fn wrtpsg(reg: u8, val: u8) -> [u8; 7] {
    [0x3E, reg, 0x1E, val, 0xCD, 0x93, 0x00]
}

/// play: LD HL,0xC000; INC (HL); RET
const COUNTING_PLAY: [u8; 5] = [0x21, 0x00, 0xC0, 0x34, 0xC9];

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0f32, |m, s| m.max(s.abs()))
}

#[test]
fn returning_routines_get_one_play_call_per_frame() {
    let data = kss_image(&[0xC9], &COUNTING_PLAY, 0);
    let mut machine = KssMachine::new(load_kss(&data).unwrap(), &PlayerConfig::default());
    machine.start_track(0).unwrap();
    let period = machine.play_period();
    for frame in 1..=60u64 {
        machine.end_frame(period);
        machine
            .mixer_mut()
            .buffer_mut()
            .read_samples(&mut vec![0i16; 4096]);
        assert_eq!(machine.play_calls(), frame);
        assert_eq!(machine.pc(), IDLE_ADDR);
    }
    assert_eq!(machine.peek(0xC000), 60);
    assert!(machine.take_warning().is_none());
}

#[test]
fn bios_psg_writes_make_a_tone() {
    let mut init = Vec::new();
    init.extend(wrtpsg(0, 0x80));
    init.extend(wrtpsg(1, 0x00));
    init.extend(wrtpsg(7, 0x3E));
    init.extend(wrtpsg(8, 0x0F));
    init.push(0xC9);
    let data = kss_image(&init, &[0xC9], 0);
    let mut player = open(&data, &PlayerConfig::default()).unwrap();
    player.play();
    let samples = player.generate_samples(4410);
    assert!(peak(&samples) > 0.05, "peak {}", peak(&samples));
    assert_eq!(player.basic_metadata().system, "MSX");
}

#[test]
fn scc_wave_reaches_output() {
    let init = [
        0x21, 0x00, 0x98, // LD HL,0x9800
        0x06, 0x10, 0x36, 0x7F, 0x23, 0x10, 0xFB, // 16 x high
        0x06, 0x10, 0x36, 0x80, 0x23, 0x10, 0xFB, // 16 x low
        0x3E, 0x40, 0x32, 0x80, 0x98, // period low
        0xAF, 0x32, 0x81, 0x98, // period high
        0x3E, 0x0F, 0x32, 0x8A, 0x98, // volume
        0x3E, 0x01, 0x32, 0x8F, 0x98, // enable voice 1
        0xC9,
    ];
    let data = kss_image(&init, &[0xC9], 0);
    let mut player = open(&data, &PlayerConfig::default()).unwrap();
    player.play();
    let samples = player.generate_samples(4410);
    assert!(player.machine().scc_accessed());
    assert!(peak(&samples) > 0.02, "peak {}", peak(&samples));

    // Muting the SCC voice silences the tune.
    player.set_voice_mute(3, true);
    player.generate_samples(8000);
    assert!(peak(&player.generate_samples(1000)) < 0.01);
}

#[test]
fn sms_tune_has_four_voices() {
    let data = kss_image(&[0xC9], &[0xC9], 0x02);
    let player = open(&data, &PlayerConfig::default()).unwrap();
    assert_eq!(player.voice_count(), 4);
    assert_eq!(player.basic_metadata().system, "Sega Master System");
    assert_eq!(player.subsong_count(), 256);
}

#[test]
fn foreign_data_is_wrong_file_type() {
    assert!(matches!(
        open(b"ZXAYEMUL", &PlayerConfig::default()),
        Err(GmeError::WrongFileType)
    ));
}
