//! Behaviour shared by every chip: deltas rebuild levels, frames rebase.

use gme_chips::{
    AyApu, BlipBuffer, DeltaRecorder, DeltaSink, NesApu, SapApu, SccApu, SmsApu, Time, VoiceMixer,
};

/// Checks that each voice's events arrive in time order within a frame.
#[derive(Default)]
struct OrderedSink {
    inner: DeltaRecorder,
    last_times: Vec<Time>,
    out_of_order: usize,
}

impl DeltaSink for OrderedSink {
    fn offset(&mut self, voice: usize, time: Time, delta: i32) {
        if voice >= self.last_times.len() {
            self.last_times.resize(voice + 1, 0);
        }
        if time < self.last_times[voice] {
            self.out_of_order += 1;
        }
        self.last_times[voice] = time;
        self.inner.offset(voice, time, delta);
    }

    fn end_frame(&mut self, time: Time) {
        self.last_times.fill(0);
        self.inner.end_frame(time);
    }
}

fn no_dmc(_: u16) -> u8 {
    0x55
}

#[test]
fn nes_levels_stay_in_voice_ranges_over_many_frames() {
    let mut apu = NesApu::new();
    let mut sink = OrderedSink::default();
    let writes: &[(u16, u8)] = &[
        (0x4015, 0x1F),
        (0x4000, 0x7F),
        (0x4002, 0x40),
        (0x4003, 0x01),
        (0x4004, 0xBC),
        (0x4006, 0x20),
        (0x4007, 0x02),
        (0x4008, 0xC0),
        (0x400A, 0x70),
        (0x400B, 0x00),
        (0x400C, 0x3A),
        (0x400E, 0x05),
        (0x4010, 0x4F),
        (0x4012, 0x10),
        (0x4013, 0x04),
        (0x4015, 0x1F),
    ];
    for (i, &(addr, data)) in writes.iter().enumerate() {
        apu.write_register(i as Time * 10, addr, data, &mut sink, &mut no_dmc);
    }
    for frame in 0..30 {
        // the play routine retriggers square 1 each frame
        apu.write_register(100, 0x4003, (frame & 7) as u8, &mut sink, &mut no_dmc);
        apu.end_frame(29_780, &mut sink, &mut no_dmc);
        sink.end_frame(29_780);
    }
    assert_eq!(sink.out_of_order, 0);

    let ranges = [(0, 15), (0, 15), (0, 15), (0, 15), (0, 127)];
    let mut levels = [0i32; 5];
    for &(voice, _, delta) in &sink.inner.events {
        levels[voice] += delta;
        let (lo, hi) = ranges[voice];
        assert!((lo..=hi).contains(&levels[voice]), "voice {voice} at {}", levels[voice]);
    }
}

#[test]
fn ay_frames_rebase_without_losing_tone_period() {
    let mut ay = AyApu::new(3_546_900, 2);
    let mut sink = OrderedSink::default();
    ay.write_register(0, 0, 0x40, &mut sink);
    ay.write_register(0, 7, 0x3E, &mut sink);
    ay.write_register(0, 8, 0x0F, &mut sink);

    // toggles keep a 1024-clock spacing across frame boundaries
    let frame = 5_000;
    let mut absolute = Vec::new();
    for n in 0..8 {
        let start = sink.inner.events.len();
        ay.end_frame(frame, &mut sink);
        sink.end_frame(frame);
        absolute.extend(
            sink.inner.events[start..]
                .iter()
                .map(|e| n * frame + e.1),
        );
    }
    for pair in absolute.windows(2).skip(1) {
        assert_eq!(pair[1] - pair[0], 0x40 * 16);
    }
    assert_eq!(sink.out_of_order, 0);
}

#[test]
fn chips_share_one_mixer_through_voice_bases() {
    let mut mixer = VoiceMixer::new(BlipBuffer::new(3_579_545, 44_100, 100), 12);
    let mut ay = AyApu::new(3_579_545, 2);
    let mut scc = SccApu::new(3_579_545);
    let mut sn = SmsApu::new();
    scc.set_voice_base(3);
    sn.set_voice_base(8);
    for v in 0..3 {
        mixer.set_voice_gain(v, AyApu::VOICE_GAIN);
    }
    for v in 3..8 {
        mixer.set_voice_gain(v, SccApu::VOICE_GAIN);
    }
    for v in 8..12 {
        mixer.set_voice_gain(v, SmsApu::VOICE_GAIN);
    }

    ay.write_register(0, 8, 15, &mut mixer);
    sn.write_data(0, 0x9F, &mut mixer);
    let frame = 71_590;
    ay.end_frame(frame, &mut mixer);
    scc.end_frame(frame, &mut mixer);
    sn.end_frame(frame, &mut mixer);
    mixer.end_frame(frame);

    let avail = mixer.buffer().samples_avail();
    assert!((881..=882).contains(&avail));
    let mut out = vec![0i16; avail];
    mixer.buffer_mut().read_samples(&mut out);
    assert!(out[0] > 0);
}

#[test]
fn pokey_pair_rebases_each_frame() {
    let mut left = SapApu::new();
    let mut right = SapApu::new();
    right.set_voice_base(4);
    let mut sink = OrderedSink::default();
    left.write_register(0, 0, 50, &mut sink);
    left.write_register(0, 1, 0xAA, &mut sink);
    right.write_register(0, 2, 70, &mut sink);
    right.write_register(0, 3, 0xA4, &mut sink);
    for _ in 0..20 {
        left.end_frame(35_568, &mut sink);
        right.end_frame(35_568, &mut sink);
        sink.end_frame(35_568);
    }
    assert!(sink.inner.events.iter().any(|e| e.0 == 0));
    assert!(sink.inner.events.iter().any(|e| e.0 == 5));
    assert!(sink.inner.events.iter().all(|e| e.1 >= 0 && e.1 < 35_568));
    assert_eq!(sink.out_of_order, 0);
    let level = sink.inner.level(0);
    assert!(level == 0 || level == 20);
}
