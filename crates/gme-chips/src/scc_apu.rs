//! Konami SCC: five 32-sample wavetable voices.
//!
//! Register layout (offsets from the chip base, `0x9800` on MSX):
//! `0x00-0x7F` waves of voices 1-4, `0x80-0x89` 12-bit periods,
//! `0x8A-0x8E` volumes, `0x8F` enable mask. Voice 5 plays voice 4's wave.

use crate::{DeltaSink, Time};

/// Register file size.
pub const SCC_REG_COUNT: usize = 0x90;

const WAVE_SIZE: usize = 32;
const AMP_RANGE: i32 = 0x8000;
const INAUDIBLE_FREQ: u32 = 20_000;

#[derive(Debug, Clone, Copy, Default)]
struct Osc {
    delay: Time,
    phase: usize,
    last_amp: i32,
    voice: usize,
    muted: bool,
}

/// SCC wavetable chip.
#[derive(Debug, Clone)]
pub struct SccApu {
    regs: [u8; SCC_REG_COUNT],
    oscs: [Osc; 5],
    last_time: Time,
    inaudible_period: Time,
}

impl SccApu {
    /// Voice count.
    pub const VOICE_COUNT: usize = 5;
    /// Voice labels.
    pub const VOICE_NAMES: [&'static str; 5] = ["Wave 1", "Wave 2", "Wave 3", "Wave 4", "Wave 5"];
    /// Fraction of full scale for one amplitude step.
    pub const VOICE_GAIN: f32 = 0.43 / 5.0 / AMP_RANGE as f32;

    /// Chip driven by a `clock_rate` Hz clock.
    pub fn new(clock_rate: u32) -> Self {
        let mut apu = Self {
            regs: [0; SCC_REG_COUNT],
            oscs: [Osc::default(); 5],
            last_time: 0,
            inaudible_period: ((clock_rate + INAUDIBLE_FREQ * 32) / (INAUDIBLE_FREQ * 16)) as Time,
        };
        apu.set_voice_base(0);
        apu
    }

    /// Route voice `i` to sink voice `base + i`.
    pub fn set_voice_base(&mut self, base: usize) {
        for (i, osc) in self.oscs.iter_mut().enumerate() {
            osc.voice = base + i;
        }
    }

    /// Silence voices whose bit is set.
    pub fn set_mute_mask(&mut self, mask: u32) {
        for (i, osc) in self.oscs.iter_mut().enumerate() {
            osc.muted = mask & (1 << i) != 0;
        }
    }

    /// Clear registers and voice state.
    pub fn reset(&mut self) {
        self.last_time = 0;
        self.regs = [0; SCC_REG_COUNT];
        for osc in &mut self.oscs {
            osc.delay = 0;
            osc.phase = 0;
            osc.last_amp = 0;
        }
    }

    /// Write register `addr` at `time`; offsets past `0x8F` are ignored.
    pub fn write_register(&mut self, time: Time, addr: usize, data: u8, sink: &mut dyn DeltaSink) {
        if addr >= SCC_REG_COUNT {
            log::debug!("ignored SCC write to register ${addr:02X}");
            return;
        }
        self.run_until(time, sink);
        self.regs[addr] = data;
    }

    /// Register readback (waveform RAM reads back, the rest as written).
    pub fn read_register(&self, addr: usize) -> u8 {
        self.regs.get(addr).copied().unwrap_or(0xFF)
    }

    fn wave_sample(&self, index: usize, phase: usize) -> i32 {
        let wave = index.min(3) * WAVE_SIZE;
        self.regs[wave + phase] as i8 as i32
    }

    /// Run all voices up to `end_time`.
    pub fn run_until(&mut self, end_time: Time, sink: &mut dyn DeltaSink) {
        if end_time <= self.last_time {
            if end_time < self.last_time {
                log::warn!(
                    "SCC asked to run backwards from {} to {end_time}",
                    self.last_time
                );
            }
            return;
        }
        for index in 0..5 {
            let mut osc = self.oscs[index];
            let period = (self.regs[0x80 + index * 2 + 1] & 0x0F) as Time * 0x100
                + self.regs[0x80 + index * 2] as Time
                + 1;
            let mut volume = 0;
            if self.regs[0x8F] & (1 << index) != 0
                && period > self.inaudible_period
                && !osc.muted
            {
                volume = (self.regs[0x8A + index] & 0x0F) as i32 * (AMP_RANGE / 256 / 15);
            }

            let amp = self.wave_sample(index, osc.phase) * volume;
            let delta = amp - osc.last_amp;
            if delta != 0 {
                osc.last_amp = amp;
                sink.offset(osc.voice, self.last_time, delta);
            }

            let mut time = self.last_time + osc.delay;
            if time < end_time {
                if volume == 0 {
                    // silent: advance the phase only
                    let count = (end_time - time + period - 1) / period;
                    osc.phase = (osc.phase + count as usize) & (WAVE_SIZE - 1);
                    time += count * period;
                } else {
                    let mut phase = osc.phase;
                    let mut last_wave = self.wave_sample(index, phase);
                    phase = (phase + 1) & (WAVE_SIZE - 1);
                    while time < end_time {
                        let amp = self.wave_sample(index, phase);
                        phase = (phase + 1) & (WAVE_SIZE - 1);
                        let delta = amp - last_wave;
                        if delta != 0 {
                            last_wave = amp;
                            sink.offset(osc.voice, time, delta * volume);
                        }
                        time += period;
                    }
                    phase = phase.wrapping_sub(1) & (WAVE_SIZE - 1);
                    osc.phase = phase;
                    osc.last_amp = self.wave_sample(index, phase) * volume;
                }
            }
            osc.delay = time - end_time;
            self.oscs[index] = osc;
        }
        self.last_time = end_time;
    }

    /// Finish the frame at `end_time`; the next frame starts at zero.
    pub fn end_frame(&mut self, end_time: Time, sink: &mut dyn DeltaSink) {
        self.run_until(end_time, sink);
        self.last_time -= end_time;
        if self.last_time < 0 {
            log::warn!("SCC clock fell behind frame end, resynchronising");
            self.last_time = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeltaRecorder;

    const CLOCK: u32 = 3_579_545;

    fn load_square_wave(scc: &mut SccApu, rec: &mut DeltaRecorder, voice: usize) {
        for i in 0..32 {
            let sample = if i < 16 { 0x40 } else { 0xC0 };
            scc.write_register(0, voice * 32 + i, sample, rec);
        }
    }

    #[test]
    fn wave_steps_once_per_period() {
        let mut scc = SccApu::new(CLOCK);
        let mut rec = DeltaRecorder::new();
        load_square_wave(&mut scc, &mut rec, 0);
        scc.write_register(0, 0x80, 99, &mut rec);
        scc.write_register(0, 0x8A, 15, &mut rec);
        scc.write_register(0, 0x8F, 0x01, &mut rec);
        scc.end_frame(100 * 64, &mut rec);

        // +64 at start, then a -128 step every 16 samples
        assert_eq!(rec.events[0], (0, 0, 64 * 120));
        assert_eq!(rec.events[1], (0, 15 * 100, -128 * 120));
        assert_eq!(rec.events[2], (0, 31 * 100, 128 * 120));
        assert_eq!(rec.level(0), 64 * 120);
    }

    #[test]
    fn fifth_voice_shares_fourth_wave() {
        let mut scc = SccApu::new(CLOCK);
        let mut rec = DeltaRecorder::new();
        load_square_wave(&mut scc, &mut rec, 3);
        scc.write_register(0, 0x88, 50, &mut rec);
        scc.write_register(0, 0x8E, 1, &mut rec);
        scc.write_register(0, 0x8F, 0x10, &mut rec);
        scc.end_frame(1_000, &mut rec);
        assert_eq!(rec.events[0], (4, 0, 64 * 8));
    }

    #[test]
    fn disabled_or_inaudible_voices_are_silent() {
        let mut scc = SccApu::new(CLOCK);
        let mut rec = DeltaRecorder::new();
        load_square_wave(&mut scc, &mut rec, 1);
        scc.write_register(0, 0x82, 100, &mut rec);
        scc.write_register(0, 0x8B, 15, &mut rec);
        scc.end_frame(5_000, &mut rec);
        assert!(rec.events.is_empty());

        scc.write_register(0, 0x82, 5, &mut rec);
        scc.write_register(0, 0x8F, 0x02, &mut rec);
        scc.end_frame(5_000, &mut rec);
        assert!(rec.events.is_empty());
    }

    #[test]
    fn phase_advances_while_silent() {
        let mut scc = SccApu::new(CLOCK);
        let mut rec = DeltaRecorder::new();
        scc.write_register(0, 0x80, 9, &mut rec);
        scc.end_frame(10 * 5, &mut rec);
        assert_eq!(scc.oscs[0].phase, 5);
    }

    #[test]
    fn out_of_range_register_is_ignored() {
        let mut scc = SccApu::new(CLOCK);
        let mut rec = DeltaRecorder::new();
        scc.write_register(0, 0x90, 1, &mut rec);
        assert_eq!(scc.read_register(0x90), 0xFF);
        scc.write_register(0, 0x10, 0x7F, &mut rec);
        assert_eq!(scc.read_register(0x10), 0x7F);
    }
}
