//! The five 2A03 voices.

use super::tables::{DMC_PERIODS, NOISE_PERIODS};
use super::DmcReader;
use crate::{DeltaSink, Time};

/// State every voice carries: registers, length counter and output level.
#[derive(Debug, Clone, Default)]
pub(crate) struct OscCore {
    pub regs: [u8; 4],
    pub reg_written: [bool; 4],
    pub voice: usize,
    pub length_counter: i32,
    /// Clocks from the end of the last run to the next timer tick.
    pub delay: Time,
    pub last_amp: i32,
    pub muted: bool,
}

impl OscCore {
    fn reset(&mut self) {
        self.regs = [0; 4];
        self.reg_written = [false; 4];
        self.length_counter = 0;
        self.delay = 0;
        self.last_amp = 0;
    }

    /// 11-bit timer period from registers 2 and 3.
    pub fn period(&self) -> i32 {
        ((self.regs[3] as i32 & 7) << 8) | self.regs[2] as i32
    }

    pub fn clock_length(&mut self, halt_mask: u8) {
        if self.length_counter != 0 && self.regs[0] & halt_mask == 0 {
            self.length_counter -= 1;
        }
    }

    /// Record `amp` as the new level and return the change.
    fn update_amp(&mut self, amp: i32) -> i32 {
        let delta = amp - self.last_amp;
        self.last_amp = amp;
        delta
    }

    fn emit_level(&mut self, time: Time, amp: i32, sink: &mut dyn DeltaSink) {
        let delta = self.update_amp(amp);
        if delta != 0 {
            sink.offset(self.voice, time, delta);
        }
    }
}

/// Square and noise volume unit.
#[derive(Debug, Clone, Default)]
pub(crate) struct Envelope {
    pub core: OscCore,
    envelope: i32,
    env_delay: i32,
}

impl Envelope {
    fn reset(&mut self) {
        self.core.reset();
        self.envelope = 0;
        self.env_delay = 0;
    }

    pub fn clock_envelope(&mut self) {
        let period = (self.core.regs[0] & 15) as i32;
        if self.core.reg_written[3] {
            self.core.reg_written[3] = false;
            self.env_delay = period;
            self.envelope = 15;
        } else {
            self.env_delay -= 1;
            if self.env_delay < 0 {
                self.env_delay = period;
                if self.envelope != 0 || self.core.regs[0] & 0x20 != 0 {
                    self.envelope = (self.envelope - 1) & 15;
                }
            }
        }
    }

    /// Current 4-bit volume, zero once the length counter ran out.
    pub fn volume(&self) -> i32 {
        if self.core.length_counter == 0 {
            0
        } else if self.core.regs[0] & 0x10 != 0 {
            (self.core.regs[0] & 15) as i32
        } else {
            self.envelope
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Square {
    pub env: Envelope,
    pub phase: i32,
    sweep_delay: i32,
}

impl Square {
    pub const PHASE_RANGE: i32 = 8;

    pub fn reset(&mut self) {
        self.env.reset();
        self.phase = 0;
        self.sweep_delay = 0;
    }

    /// Sweep unit; square 1 negates with one's complement (`-1`), square 2 with two's (`0`).
    pub fn clock_sweep(&mut self, negative_adjust: i32) {
        let core = &mut self.env.core;
        let sweep = core.regs[1];
        self.sweep_delay -= 1;
        if self.sweep_delay < 0 {
            core.reg_written[1] = true;
            let mut period = core.period();
            let shift = (sweep & 7) as u32;
            if shift != 0 && sweep & 0x80 != 0 && period >= 8 {
                let mut offset = period >> shift;
                if sweep & 0x08 != 0 {
                    offset = negative_adjust - offset;
                }
                if period + offset < 0x800 {
                    period += offset;
                    core.regs[2] = period as u8;
                    core.regs[3] = (core.regs[3] & !7) | ((period >> 8) & 7) as u8;
                }
            }
        }
        if core.reg_written[1] {
            core.reg_written[1] = false;
            self.sweep_delay = ((sweep >> 4) & 7) as i32;
        }
    }

    fn maintain_phase(&mut self, time: Time, end_time: Time, timer_period: i32) -> Time {
        let remain = end_time - time;
        if remain <= 0 {
            return time;
        }
        let count = (remain + timer_period - 1) / timer_period;
        self.phase = (self.phase + count) & (Self::PHASE_RANGE - 1);
        time + count * timer_period
    }

    pub fn run(&mut self, mut time: Time, end_time: Time, sink: &mut dyn DeltaSink) {
        let period = self.env.core.period();
        let timer_period = (period + 1) * 2;
        let sweep = self.env.core.regs[1];
        let offset = if sweep & 0x08 != 0 {
            0
        } else {
            period >> (sweep & 7)
        };
        let volume = self.env.volume();
        let muted = self.env.core.muted;

        if volume == 0 || period < 8 || period + offset >= 0x800 {
            self.env.core.emit_level(time, 0, sink);
            time += self.env.core.delay;
            time = self.maintain_phase(time, end_time, timer_period);
        } else {
            let duty_select = (self.env.core.regs[0] >> 6) & 3;
            let mut duty = 1 << duty_select;
            let mut amp = 0;
            if duty_select == 3 {
                // 75% duty is the inverted 25% waveform
                duty = 2;
                amp = volume;
            }
            if self.phase < duty {
                amp ^= volume;
            }
            self.env
                .core
                .emit_level(time, if muted { 0 } else { amp }, sink);

            time += self.env.core.delay;
            if time < end_time {
                let voice = self.env.core.voice;
                let mut delta = amp * 2 - volume;
                let mut phase = self.phase;
                loop {
                    phase = (phase + 1) & (Self::PHASE_RANGE - 1);
                    if phase == 0 || phase == duty {
                        delta = -delta;
                        if !muted {
                            sink.offset(voice, time, delta);
                        }
                    }
                    time += timer_period;
                    if time >= end_time {
                        break;
                    }
                }
                self.env.core.last_amp = if muted { 0 } else { (delta + volume) >> 1 };
                self.phase = phase;
            }
        }
        self.env.core.delay = time - end_time;
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Triangle {
    pub core: OscCore,
    phase: i32,
    linear_counter: i32,
}

impl Triangle {
    const PHASE_RANGE: i32 = 16;

    pub fn reset(&mut self) {
        self.core.reset();
        self.linear_counter = 0;
        self.phase = 1;
    }

    pub fn clock_linear_counter(&mut self) {
        if self.core.reg_written[3] {
            self.linear_counter = (self.core.regs[0] & 0x7F) as i32;
        } else if self.linear_counter != 0 {
            self.linear_counter -= 1;
        }
        if self.core.regs[0] & 0x80 == 0 {
            self.core.reg_written[3] = false;
        }
    }

    /// Level for the current phase; phases above the range run the falling half.
    fn calc_amp(&self) -> i32 {
        let amp = Self::PHASE_RANGE - self.phase;
        if amp < 0 {
            self.phase - (Self::PHASE_RANGE + 1)
        } else {
            amp
        }
    }

    pub fn run(&mut self, mut time: Time, end_time: Time, sink: &mut dyn DeltaSink) {
        let timer_period = self.core.period() + 1;
        let muted = self.core.muted;
        let level = if muted { 0 } else { self.calc_amp() };
        self.core.emit_level(time, level, sink);

        time += self.core.delay;
        if self.core.length_counter == 0 || self.linear_counter == 0 || timer_period < 3 {
            time = end_time;
        } else if time < end_time {
            let voice = self.core.voice;
            let mut volume = 1;
            let mut phase = self.phase;
            if phase > Self::PHASE_RANGE {
                phase -= Self::PHASE_RANGE;
                volume = -volume;
            }
            loop {
                phase -= 1;
                if phase == 0 {
                    phase = Self::PHASE_RANGE;
                    volume = -volume;
                } else if !muted {
                    sink.offset(voice, time, volume);
                }
                time += timer_period;
                if time >= end_time {
                    break;
                }
            }
            if volume < 0 {
                phase += Self::PHASE_RANGE;
            }
            self.phase = phase;
            self.core.last_amp = if muted { 0 } else { self.calc_amp() };
        }
        self.core.delay = time - end_time;
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Noise {
    pub env: Envelope,
    noise: i32,
    pal: usize,
}

impl Default for Noise {
    fn default() -> Self {
        Self {
            env: Envelope::default(),
            noise: 1,
            pal: 0,
        }
    }
}

impl Noise {
    pub fn reset(&mut self, pal: bool) {
        self.env.reset();
        self.noise = 1;
        self.pal = pal as usize;
    }

    pub fn run(&mut self, mut time: Time, end_time: Time, sink: &mut dyn DeltaSink) {
        let period = NOISE_PERIODS[self.pal][(self.env.core.regs[2] & 15) as usize];
        let volume = self.env.volume();
        let muted = self.env.core.muted;
        let amp = if self.noise & 1 != 0 { volume } else { 0 };
        self.env
            .core
            .emit_level(time, if muted { 0 } else { amp }, sink);

        time += self.env.core.delay;
        if time < end_time {
            if volume == 0 {
                // silent: skip to the next tick at or past the end
                time += (end_time - time + period - 1) / period * period;
            } else {
                let voice = self.env.core.voice;
                let tap = if self.env.core.regs[2] & 0x80 != 0 { 8 } else { 13 };
                let mut noise = self.noise;
                let mut delta = amp * 2 - volume;
                loop {
                    let feedback = (noise << tap) ^ (noise << 14);
                    if (noise + 1) & 2 != 0 {
                        // bits 0 and 1 differ, so the output flips on this shift
                        delta = -delta;
                        if !muted {
                            sink.offset(voice, time, delta);
                        }
                    }
                    time += period;
                    noise = (feedback & 0x4000) | (noise >> 1);
                    if time >= end_time {
                        break;
                    }
                }
                self.noise = noise;
                self.env.core.last_amp = if muted { 0 } else { (delta + volume) >> 1 };
            }
        }
        self.env.core.delay = time - end_time;
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Dmc {
    pub core: OscCore,
    address: u16,
    pub dac: i32,
    buf: u8,
    buf_full: bool,
    bits_remain: i32,
    bits: i32,
    silence: bool,
    period: i32,
    pal: usize,
    pub irq_enabled: bool,
    pub irq_flag: bool,
    /// Set when a non-looping sample plays out; the APU clears its enable bit.
    pub ended: bool,
}

impl Dmc {
    pub fn reset(&mut self, pal: bool, dac: u8) {
        self.core.reset();
        self.address = 0;
        self.dac = (dac & 0x7F) as i32;
        self.buf = 0;
        self.buf_full = false;
        self.bits_remain = 1;
        self.bits = 0;
        self.silence = true;
        self.pal = pal as usize;
        self.period = DMC_PERIODS[self.pal][0];
        self.irq_enabled = false;
        self.irq_flag = false;
        self.ended = false;
    }

    pub fn write_register(&mut self, reg: usize, data: u8) {
        match reg {
            0 => {
                self.period = DMC_PERIODS[self.pal][(data & 15) as usize];
                self.irq_enabled = data & 0xC0 == 0x80;
                self.irq_flag &= self.irq_enabled;
            }
            1 => self.dac = (data & 0x7F) as i32,
            _ => {}
        }
    }

    fn reload_sample(&mut self) {
        self.address = 0x4000 + self.core.regs[2] as u16 * 0x40;
        self.core.length_counter = self.core.regs[3] as i32 * 0x10 + 1;
    }

    pub fn start(&mut self, reader: &mut dyn DmcReader) {
        self.reload_sample();
        self.fill_buffer(reader);
    }

    fn fill_buffer(&mut self, reader: &mut dyn DmcReader) {
        if self.buf_full || self.core.length_counter == 0 {
            return;
        }
        self.buf = reader.read_dmc(0x8000 + self.address);
        self.address = (self.address + 1) & 0x7FFF;
        self.buf_full = true;
        self.core.length_counter -= 1;
        if self.core.length_counter == 0 {
            if self.core.regs[0] & 0x40 != 0 {
                self.reload_sample();
            } else {
                self.ended = true;
                self.irq_flag = self.irq_enabled;
            }
        }
    }

    pub fn run(
        &mut self,
        mut time: Time,
        end_time: Time,
        sink: &mut dyn DeltaSink,
        reader: &mut dyn DmcReader,
    ) {
        let muted = self.core.muted;
        self.core
            .emit_level(time, if muted { 0 } else { self.dac }, sink);

        time += self.core.delay;
        if time < end_time {
            let mut bits_remain = self.bits_remain;
            if self.silence && !self.buf_full {
                let count = (end_time - time + self.period - 1) / self.period;
                bits_remain = (bits_remain - 1 + 8 - (count % 8)) % 8 + 1;
                time += count * self.period;
            } else {
                let voice = self.core.voice;
                let mut bits = self.bits;
                let mut dac = self.dac;
                loop {
                    if !self.silence {
                        let step = (bits & 1) * 4 - 2;
                        bits >>= 1;
                        if (0..=0x7F).contains(&(dac + step)) {
                            dac += step;
                            if !muted {
                                sink.offset(voice, time, step);
                            }
                        }
                    }
                    time += self.period;
                    bits_remain -= 1;
                    if bits_remain == 0 {
                        bits_remain = 8;
                        if self.buf_full {
                            self.silence = false;
                            bits = self.buf as i32;
                            self.buf_full = false;
                            self.fill_buffer(reader);
                        } else {
                            self.silence = true;
                        }
                    }
                    if time >= end_time {
                        break;
                    }
                }
                self.dac = dac;
                self.core.last_amp = if muted { 0 } else { dac };
                self.bits = bits;
            }
            self.bits_remain = bits_remain;
        }
        self.core.delay = time - end_time;
    }
}
