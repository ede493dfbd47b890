//! AY-3-8910 PSG and the ZX Spectrum beeper.
//!
//! Times are CPU clocks. The CPU:AY clock ratio (2 on the Spectrum, 4 on the
//! CPC when the CPU runs at 4 MHz) scales every period.

use crate::{DeltaSink, Time};

const TONE_OFF: u32 = 0x01;
const NOISE_OFF: u32 = 0x08;

/// Logarithmic DAC levels, full scale 255.
const AMP_TABLE: [u8; 16] = [0, 2, 3, 4, 6, 8, 11, 16, 23, 32, 45, 64, 90, 128, 180, 255];

/// Frequencies above this are played at half volume without the square.
const INAUDIBLE_FREQ: u32 = 16_384;

#[derive(Clone, Copy)]
enum Segment {
    Fall,
    Rise,
    Low,
    High,
}

/// Envelope shapes 8 to 15 as three 16-step segments; the last two repeat.
const ENV_SHAPES: [[Segment; 3]; 8] = {
    use Segment::*;
    [
        [Fall, Fall, Fall],
        [Fall, Low, Low],
        [Fall, Rise, Fall],
        [Fall, High, High],
        [Rise, Rise, Rise],
        [Rise, High, High],
        [Rise, Fall, Rise],
        [Rise, Low, Low],
    ]
};

const fn build_env_waves() -> [[u8; 48]; 8] {
    let mut waves = [[0u8; 48]; 8];
    let mut m = 0;
    while m < 8 {
        let mut s = 0;
        while s < 3 {
            let (start, step): (i32, i32) = match ENV_SHAPES[m][s] {
                Segment::Fall => (15, -1),
                Segment::Rise => (0, 1),
                Segment::Low => (0, 0),
                Segment::High => (15, 0),
            };
            let mut y = 0;
            while y < 16 {
                waves[m][s * 16 + y] = AMP_TABLE[(start + step * y as i32) as usize];
                y += 1;
            }
            s += 1;
        }
        m += 1;
    }
    waves
}

static ENV_WAVES: [[u8; 48]; 8] = build_env_waves();

#[derive(Debug, Clone, Copy, Default)]
struct Tone {
    period: Time,
    delay: Time,
    last_amp: i32,
    phase: u32,
    voice: usize,
    muted: bool,
}

/// Three square voices mixed with shared noise and envelope.
#[derive(Debug, Clone)]
pub struct AyApu {
    regs: [u8; 16],
    latch: u8,
    tones: [Tone; 3],
    noise_delay: Time,
    noise_lfsr: u32,
    env_shape: usize,
    env_pos: i32,
    env_delay: Time,
    last_time: Time,
    period_factor: Time,
    inaudible_period: Time,
}

impl AyApu {
    /// Voice count.
    pub const VOICE_COUNT: usize = 3;
    /// Voice labels.
    pub const VOICE_NAMES: [&'static str; 3] = ["Square 1", "Square 2", "Square 3"];
    /// Fraction of full scale for one amplitude step.
    pub const VOICE_GAIN: f32 = 0.7 / 3.0 / 255.0;

    /// Chip clocked at `cpu_clock / clock_ratio`.
    pub fn new(cpu_clock: u32, clock_ratio: u32) -> Self {
        let mut apu = Self {
            regs: [0; 16],
            latch: 0,
            tones: [Tone::default(); 3],
            noise_delay: 0,
            noise_lfsr: 1,
            env_shape: 0,
            env_pos: -48,
            env_delay: 0,
            last_time: 0,
            period_factor: 16,
            inaudible_period: 0,
        };
        apu.set_voice_base(0);
        apu.set_clock(cpu_clock, clock_ratio);
        apu.reset();
        apu
    }

    /// Change clocking and rescale the current tone periods.
    ///
    /// Run the chip up to the switch time first.
    pub fn set_clock(&mut self, cpu_clock: u32, clock_ratio: u32) {
        self.period_factor = (clock_ratio.max(1) * 8) as Time;
        self.inaudible_period = ((cpu_clock + INAUDIBLE_FREQ) / (INAUDIBLE_FREQ * 2)) as Time;
        for i in 0..3 {
            self.update_tone_period(i);
        }
    }

    /// Route voice `i` to sink voice `base + i`.
    pub fn set_voice_base(&mut self, base: usize) {
        for (i, tone) in self.tones.iter_mut().enumerate() {
            tone.voice = base + i;
        }
    }

    /// Silence voices whose bit is set.
    pub fn set_mute_mask(&mut self, mask: u32) {
        for (i, tone) in self.tones.iter_mut().enumerate() {
            tone.muted = mask & (1 << i) != 0;
        }
    }

    /// Power-up state: all registers zero, envelope shape 0.
    pub fn reset(&mut self) {
        self.last_time = 0;
        self.noise_delay = 0;
        self.noise_lfsr = 1;
        self.latch = 0;
        for tone in &mut self.tones {
            tone.period = self.period_factor;
            tone.delay = 0;
            tone.last_amp = 0;
            tone.phase = 0;
        }
        self.regs = [0; 16];
        self.regs[7] = 0xFF;
        self.write_data_(13, 0);
    }

    /// Select the register targeted by [`write_data`](Self::write_data).
    pub fn select(&mut self, reg: u8) {
        self.latch = reg;
    }

    /// Currently selected register.
    pub fn latch(&self) -> u8 {
        self.latch
    }

    /// Write to the selected register.
    pub fn write_data(&mut self, time: Time, data: u8, sink: &mut dyn DeltaSink) {
        self.write_register(time, self.latch, data, sink);
    }

    /// Value of the selected register.
    pub fn read_data(&self) -> u8 {
        self.regs.get(self.latch as usize).copied().unwrap_or(0xFF)
    }

    /// Write register `reg` at `time`; indexes past 15 are ignored.
    pub fn write_register(&mut self, time: Time, reg: u8, data: u8, sink: &mut dyn DeltaSink) {
        if reg >= 16 {
            log::debug!("ignored AY write to register {reg}");
            return;
        }
        self.run_until(time, sink);
        self.write_data_(reg as usize, data);
    }

    fn write_data_(&mut self, addr: usize, mut data: u8) {
        if addr == 13 {
            if data & 8 == 0 {
                // shapes 0-7 behave like 9 or 15
                data = if data & 4 != 0 { 15 } else { 9 };
            }
            self.env_shape = (data - 8) as usize;
            self.env_pos = -48;
            // reloaded from the period registers on the next run
            self.env_delay = 0;
        }
        self.regs[addr] = data;

        let i = addr >> 1;
        if i < 3 {
            self.update_tone_period(i);
        }
    }

    fn update_tone_period(&mut self, i: usize) {
        let pf = self.period_factor;
        let mut period =
            (self.regs[i * 2 + 1] & 0x0F) as Time * 0x100 * pf + self.regs[i * 2] as Time * pf;
        if period == 0 {
            period = pf;
        }
        let tone = &mut self.tones[i];
        tone.delay -= tone.period - period;
        if tone.delay < 0 {
            tone.delay = 0;
        }
        tone.period = period;
    }

    fn env_level(&self, pos: i32) -> i32 {
        ENV_WAVES[self.env_shape][(pos + 48) as usize] as i32
    }

    /// Run all voices up to `final_end_time`.
    pub fn run_until(&mut self, final_end_time: Time, sink: &mut dyn DeltaSink) {
        if final_end_time <= self.last_time {
            if final_end_time < self.last_time {
                log::warn!(
                    "AY asked to run backwards from {} to {final_end_time}",
                    self.last_time
                );
            }
            return;
        }

        let noise_period_factor = self.period_factor * 2;
        let mut noise_period = (self.regs[6] & 0x1F) as Time * noise_period_factor;
        if noise_period == 0 {
            noise_period = noise_period_factor;
        }
        let old_noise_delay = self.noise_delay;
        let old_noise_lfsr = self.noise_lfsr;

        let env_period_factor = self.period_factor * 2;
        let mut env_period =
            (self.regs[12] as Time * 0x100 + self.regs[11] as Time) * env_period_factor;
        if env_period == 0 {
            env_period = env_period_factor;
        }
        if self.env_delay == 0 {
            self.env_delay = env_period;
        }

        for index in 0..3 {
            let mut osc = self.tones[index];
            let mut osc_mode = (self.regs[7] >> index) as u32;

            let mut half_vol = 0;
            if osc.period <= self.inaudible_period && osc_mode & TONE_OFF == 0 {
                half_vol = 1;
                osc_mode |= TONE_OFF;
            }

            let mut start_time = self.last_time;
            let mut end_time = final_end_time;
            let vol_mode = self.regs[8 + index];
            let mut volume = AMP_TABLE[(vol_mode & 0x0F) as usize] as i32 >> half_vol;
            let mut osc_env_pos = self.env_pos;
            if vol_mode & 0x10 != 0 {
                volume = self.env_level(osc_env_pos) >> half_vol;
                // envelope matters while it repeats or its first ramp runs
                if self.regs[13] & 1 == 0 || osc_env_pos < -32 {
                    end_time = (start_time + self.env_delay).min(final_end_time);
                } else if volume == 0 {
                    osc_mode = NOISE_OFF | TONE_OFF;
                }
            } else if volume == 0 {
                osc_mode = NOISE_OFF | TONE_OFF;
            }
            if osc.muted {
                volume = 0;
                osc_mode = NOISE_OFF | TONE_OFF;
                end_time = final_end_time;
            }

            let period = osc.period;
            let mut time = start_time + osc.delay;
            if osc_mode & TONE_OFF != 0 {
                // keep the square's phase while it is gated off
                let count = (final_end_time - time + period - 1) / period;
                time += count * period;
                osc.phase ^= (count & 1) as u32;
            }

            let mut ntime = final_end_time;
            let mut noise_lfsr = 1u32;
            if osc_mode & NOISE_OFF == 0 {
                ntime = start_time + old_noise_delay;
                noise_lfsr = old_noise_lfsr;
            }

            loop {
                let mut amp = 0;
                if (osc_mode | osc.phase) & 1 & ((osc_mode >> 3) | noise_lfsr) != 0 {
                    amp = volume;
                }
                let delta = amp - osc.last_amp;
                if delta != 0 {
                    osc.last_amp = amp;
                    sink.offset(osc.voice, start_time, delta);
                }

                // tone and noise each catch up to the other in turn
                if ntime < end_time || time < end_time {
                    let mut delta = amp * 2 - volume;
                    let delta_non_zero = (delta != 0) as u32;
                    let mut phase = osc.phase | (osc_mode & TONE_OFF);
                    loop {
                        let end = end_time.min(time);
                        if phase & delta_non_zero != 0 {
                            while ntime <= end {
                                let changed = noise_lfsr + 1;
                                noise_lfsr =
                                    ((noise_lfsr & 1).wrapping_neg() & 0x12000) ^ (noise_lfsr >> 1);
                                if changed & 2 != 0 {
                                    delta = -delta;
                                    sink.offset(osc.voice, ntime, delta);
                                }
                                ntime += noise_period;
                            }
                        } else {
                            let remain = end - ntime;
                            if remain >= 0 {
                                ntime += noise_period + remain / noise_period * noise_period;
                            }
                        }

                        let end = end_time.min(ntime);
                        if noise_lfsr & delta_non_zero != 0 {
                            while time < end {
                                delta = -delta;
                                sink.offset(osc.voice, time, delta);
                                time += period;
                            }
                            phase = (delta > 0) as u32;
                        } else {
                            while time < end {
                                time += period;
                                phase ^= 1;
                            }
                        }
                        if time >= end_time && ntime >= end_time {
                            break;
                        }
                    }
                    osc.last_amp = (delta + volume) >> 1;
                    if osc_mode & TONE_OFF == 0 {
                        osc.phase = phase;
                    }
                }

                if end_time >= final_end_time {
                    break;
                }

                osc_env_pos += 1;
                if osc_env_pos >= 0 {
                    osc_env_pos -= 32;
                }
                volume = self.env_level(osc_env_pos) >> half_vol;
                start_time = end_time;
                end_time = (end_time + env_period).min(final_end_time);
            }

            osc.delay = time - final_end_time;
            if osc_mode & NOISE_OFF == 0 {
                self.noise_delay = ntime - final_end_time;
                self.noise_lfsr = noise_lfsr;
            }
            self.tones[index] = osc;
        }

        let mut remain = final_end_time - self.last_time - self.env_delay;
        if remain >= 0 {
            let count = (remain + env_period) / env_period;
            self.env_pos += count;
            if self.env_pos >= 0 {
                self.env_pos = (self.env_pos & 31) - 32;
            }
            remain -= count * env_period;
        }
        self.env_delay = -remain;
        self.last_time = final_end_time;
    }

    /// Finish the frame at `time`; the next frame starts at zero.
    pub fn end_frame(&mut self, time: Time, sink: &mut dyn DeltaSink) {
        if time > self.last_time {
            self.run_until(time, sink);
        }
        self.last_time -= time;
        if self.last_time < 0 {
            log::warn!("AY clock fell behind frame end, resynchronising");
            self.last_time = 0;
        }
    }
}

/// One-bit speaker driven by bit 4 of port 0xFE.
#[derive(Debug, Clone, Default)]
pub struct Beeper {
    voice: usize,
    level: bool,
    last_amp: i32,
    muted: bool,
}

impl Beeper {
    /// Fraction of full scale for the raised speaker.
    pub const GAIN: f32 = 0.65 * 0.7 / 3.0;
    /// Voice label.
    pub const VOICE_NAME: &'static str = "Beeper";

    /// Speaker at rest on sink voice `voice`.
    pub fn new(voice: usize) -> Self {
        Self {
            voice,
            ..Self::default()
        }
    }

    /// Install the port value written at `time`.
    pub fn write(&mut self, time: Time, data: u8, sink: &mut dyn DeltaSink) {
        self.level = data & 0x10 != 0;
        self.update(time, sink);
    }

    /// Mute or unmute at `time`.
    pub fn set_muted(&mut self, time: Time, muted: bool, sink: &mut dyn DeltaSink) {
        self.muted = muted;
        self.update(time, sink);
    }

    /// Raised speaker state.
    pub fn level(&self) -> bool {
        self.level
    }

    fn update(&mut self, time: Time, sink: &mut dyn DeltaSink) {
        let amp = (self.level && !self.muted) as i32;
        let delta = amp - self.last_amp;
        if delta != 0 {
            self.last_amp = amp;
            sink.offset(self.voice, time, delta);
        }
    }

    /// Return to rest without emitting.
    pub fn reset(&mut self) {
        self.level = false;
        self.last_amp = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeltaRecorder;

    const CLOCK: u32 = 3_546_900;

    fn apu() -> AyApu {
        AyApu::new(CLOCK, 2)
    }

    #[test]
    fn envelope_tables_have_expected_shapes() {
        // shape 8 falls from full scale
        assert_eq!(ENV_WAVES[0][0], 255);
        assert_eq!(ENV_WAVES[0][15], 0);
        // shape 13 rises then holds high
        assert_eq!(ENV_WAVES[5][15], 255);
        assert!(ENV_WAVES[5][16..].iter().all(|&v| v == 255));
        // shape 9 falls and holds low
        assert!(ENV_WAVES[1][16..].iter().all(|&v| v == 0));
    }

    #[test]
    fn clock_change_rescales_running_tones() {
        let mut ay = apu();
        let mut rec = DeltaRecorder::new();
        ay.write_register(0, 0, 100, &mut rec);
        ay.write_register(0, 3, 0x01, &mut rec);
        assert_eq!(ay.tones[0].period, 100 * 16);
        assert_eq!(ay.tones[1].period, 0x100 * 16);
        ay.set_clock(4_000_000, 4);
        assert_eq!(ay.tones[0].period, 100 * 32);
        assert_eq!(ay.tones[1].period, 0x100 * 32);
        // zero period stays one step
        assert_eq!(ay.tones[2].period, 32);
    }

    #[test]
    fn tone_toggles_at_half_period() {
        let mut ay = apu();
        let mut rec = DeltaRecorder::new();
        ay.write_register(0, 0, 100, &mut rec);
        ay.write_register(0, 7, 0b0011_1110, &mut rec);
        ay.write_register(0, 8, 15, &mut rec);
        ay.end_frame(16_000, &mut rec);

        let times: Vec<_> = rec.events.iter().map(|e| e.1).collect();
        assert!(times.len() > 2);
        // 100 * 16 CPU clocks between toggles
        for pair in times.windows(2).skip(1) {
            assert_eq!(pair[1] - pair[0], 1600);
        }
        let level = rec.level(0);
        assert!(level == 0 || level == 255);
    }

    #[test]
    fn fixed_volume_without_tone_acts_as_dac() {
        let mut ay = apu();
        let mut rec = DeltaRecorder::new();
        ay.write_register(0, 8, 13, &mut rec);
        ay.write_register(100, 8, 5, &mut rec);
        ay.end_frame(200, &mut rec);
        assert_eq!(rec.level_at(0, 99), 128);
        assert_eq!(rec.level(0), 8);
    }

    #[test]
    fn inaudible_tone_plays_half_volume_dc() {
        let mut ay = apu();
        let mut rec = DeltaRecorder::new();
        ay.write_register(0, 0, 1, &mut rec);
        ay.write_register(0, 7, 0b0011_1110, &mut rec);
        ay.write_register(0, 8, 15, &mut rec);
        ay.end_frame(10_000, &mut rec);
        assert_eq!(rec.events.len(), 1);
        assert_eq!(rec.level(0), 127);
    }

    #[test]
    fn envelope_ramp_steps_down_and_holds() {
        let mut ay = apu();
        let mut rec = DeltaRecorder::new();
        ay.write_register(0, 8, 0x10, &mut rec);
        ay.write_register(0, 11, 1, &mut rec);
        ay.write_register(0, 13, 0, &mut rec);
        // one step is 32 clocks, so the ramp ends after 512
        ay.end_frame(2_000, &mut rec);
        assert_eq!(rec.level_at(0, 0), 255);
        assert_eq!(rec.level(0), 0);
        assert_eq!(rec.events.len(), 16);
    }

    #[test]
    fn noise_output_is_bounded_by_volume() {
        let mut ay = apu();
        let mut rec = DeltaRecorder::new();
        ay.write_register(0, 6, 4, &mut rec);
        ay.write_register(0, 7, 0b0011_0111, &mut rec);
        ay.write_register(0, 8, 12, &mut rec);
        for _ in 0..4 {
            ay.end_frame(70_000, &mut rec);
        }
        let mut level = 0;
        for &(_, _, d) in &rec.events {
            level += d;
            assert!(level == 0 || level == 90);
        }
        assert!(rec.events.len() > 100);
    }

    #[test]
    fn out_of_range_register_is_ignored() {
        let mut ay = apu();
        let mut rec = DeltaRecorder::new();
        ay.select(16);
        ay.write_data(0, 0xFF, &mut rec);
        assert_eq!(ay.read_data(), 0xFF);
        ay.select(8);
        assert_eq!(ay.read_data(), 0);
    }

    #[test]
    fn muted_voice_drops_to_zero() {
        let mut ay = apu();
        let mut rec = DeltaRecorder::new();
        ay.write_register(0, 8, 15, &mut rec);
        ay.end_frame(100, &mut rec);
        assert_eq!(rec.level(0), 255);
        ay.set_mute_mask(1);
        ay.end_frame(100, &mut rec);
        assert_eq!(rec.level(0), 0);
    }

    #[test]
    fn beeper_emits_only_on_change() {
        let mut rec = DeltaRecorder::new();
        let mut beeper = Beeper::new(3);
        beeper.write(10, 0x10, &mut rec);
        beeper.write(20, 0x17, &mut rec);
        beeper.write(30, 0x00, &mut rec);
        assert_eq!(rec.events, vec![(3, 10, 1), (3, 30, -1)]);
    }
}
