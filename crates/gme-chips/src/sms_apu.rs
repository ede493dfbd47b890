//! Texas Instruments SN76489 PSG (Sega Master System, Game Gear, MSX add-ons).

use crate::{DeltaSink, Time};

/// Attenuation steps of roughly 2 dB.
const VOLUMES: [i32; 16] = [64, 50, 39, 31, 24, 19, 15, 12, 9, 7, 5, 4, 3, 2, 1, 0];

/// Fixed noise shift periods in clocks, before doubling.
const NOISE_PERIODS: [Time; 3] = [0x100, 0x200, 0x400];

/// Pure tones at or below this period (16 kHz and up) are dropped.
const MIN_AUDIBLE_PERIOD: Time = 128;

#[derive(Debug, Clone, Copy, Default)]
struct Square {
    /// Half-wave length in clocks (register value times 16).
    period: Time,
    phase: bool,
    volume: i32,
    delay: Time,
    last_amp: i32,
    voice: usize,
    muted: bool,
}

impl Square {
    fn run(&mut self, mut time: Time, end_time: Time, sink: &mut dyn DeltaSink) {
        let volume = if self.muted { 0 } else { self.volume };
        if volume == 0 || self.period <= MIN_AUDIBLE_PERIOD {
            if self.last_amp != 0 {
                sink.offset(self.voice, time, -self.last_amp);
                self.last_amp = 0;
            }
            time += self.delay;
            if self.period == 0 {
                time = end_time;
            } else if time < end_time {
                // keep the phase running while silent
                let count = (end_time - time + self.period - 1) / self.period;
                self.phase ^= count & 1 != 0;
                time += count * self.period;
            }
        } else {
            let amp = if self.phase { volume } else { -volume };
            let delta = amp - self.last_amp;
            if delta != 0 {
                self.last_amp = amp;
                sink.offset(self.voice, time, delta);
            }
            time += self.delay;
            if time < end_time {
                let mut delta = amp * 2;
                while time < end_time {
                    delta = -delta;
                    sink.offset(self.voice, time, delta);
                    time += self.period;
                    self.phase = !self.phase;
                }
                self.last_amp = if self.phase { volume } else { -volume };
            }
        }
        self.delay = time - end_time;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoiseRate {
    Fixed(usize),
    /// Clocked by the third square's period.
    Square3,
}

#[derive(Debug, Clone, Copy)]
struct Noise {
    rate: NoiseRate,
    shifter: u32,
    feedback: u32,
    volume: i32,
    delay: Time,
    last_amp: i32,
    voice: usize,
    muted: bool,
}

impl Noise {
    fn run(&mut self, mut time: Time, end_time: Time, square3_period: Time, sink: &mut dyn DeltaSink) {
        let volume = if self.muted { 0 } else { self.volume };
        let amp = if self.shifter & 1 != 0 { -volume } else { volume };
        let delta = amp - self.last_amp;
        if delta != 0 {
            self.last_amp = amp;
            sink.offset(self.voice, time, delta);
        }

        time += self.delay;
        if volume == 0 {
            time = end_time;
        }
        if time < end_time {
            let mut shifter = self.shifter;
            let mut delta = amp * 2;
            let mut period = match self.rate {
                NoiseRate::Fixed(i) => NOISE_PERIODS[i],
                NoiseRate::Square3 => square3_period,
            } * 2;
            if period == 0 {
                period = 16;
            }
            while time < end_time {
                let changed = shifter + 1;
                shifter = (self.feedback & (shifter & 1).wrapping_neg()) ^ (shifter >> 1);
                if changed & 2 != 0 {
                    // bits 0 and 1 differed
                    delta = -delta;
                    sink.offset(self.voice, time, delta);
                }
                time += period;
            }
            self.shifter = shifter;
            self.last_amp = delta >> 1;
        }
        self.delay = time - end_time;
    }
}

/// SN76489 with three squares and a noise voice.
#[derive(Debug, Clone)]
pub struct SmsApu {
    squares: [Square; 3],
    noise: Noise,
    latch: u8,
    last_time: Time,
    white_feedback: u32,
    looped_feedback: u32,
}

impl Default for SmsApu {
    fn default() -> Self {
        Self::new()
    }
}

impl SmsApu {
    /// Voice count.
    pub const VOICE_COUNT: usize = 4;
    /// Voice labels.
    pub const VOICE_NAMES: [&'static str; 4] = ["Square 1", "Square 2", "Square 3", "Noise"];
    /// Fraction of full scale for one amplitude step.
    pub const VOICE_GAIN: f32 = 0.85 / 4.0 / 64.0 * 2.0;

    /// Sega variant: 16-bit shifter, white noise taps 0 and 3.
    pub fn new() -> Self {
        let mut apu = Self {
            squares: [Square::default(); 3],
            noise: Noise {
                rate: NoiseRate::Fixed(0),
                shifter: 0x8000,
                feedback: 0,
                volume: 0,
                delay: 0,
                last_amp: 0,
                voice: 3,
                muted: false,
            },
            latch: 0,
            last_time: 0,
            white_feedback: 0,
            looped_feedback: 0,
        };
        apu.set_voice_base(0);
        apu.reset(0x0009, 16);
        apu
    }

    /// Route voice `i` to sink voice `base + i`.
    pub fn set_voice_base(&mut self, base: usize) {
        for (i, sq) in self.squares.iter_mut().enumerate() {
            sq.voice = base + i;
        }
        self.noise.voice = base + 3;
    }

    /// Silence voices whose bit is set.
    pub fn set_mute_mask(&mut self, mask: u32) {
        for (i, sq) in self.squares.iter_mut().enumerate() {
            sq.muted = mask & (1 << i) != 0;
        }
        self.noise.muted = mask & 8 != 0;
    }

    /// Power-up state. `feedback` lists the tapped bits, `width` the shifter length.
    pub fn reset(&mut self, feedback: u32, width: u32) {
        let (mut feedback, width) = if feedback == 0 || width == 0 {
            (0x0009, 16)
        } else {
            (feedback, width.min(32))
        };
        // reverse the tap mask for a right-shifting register
        self.looped_feedback = 1 << (width - 1);
        self.white_feedback = 0;
        for _ in 0..width {
            self.white_feedback = (self.white_feedback << 1) | (feedback & 1);
            feedback >>= 1;
        }

        self.last_time = 0;
        self.latch = 0;
        for sq in &mut self.squares {
            *sq = Square {
                voice: sq.voice,
                muted: sq.muted,
                ..Square::default()
            };
        }
        self.noise.rate = NoiseRate::Fixed(0);
        self.noise.shifter = 0x8000;
        self.noise.feedback = self.white_feedback;
        self.noise.volume = 0;
        self.noise.delay = 0;
        self.noise.last_amp = 0;
    }

    /// Latch/data byte written at `time`.
    pub fn write_data(&mut self, time: Time, data: u8, sink: &mut dyn DeltaSink) {
        self.run_until(time, sink);
        if data & 0x80 != 0 {
            self.latch = data;
        }
        let index = ((self.latch >> 5) & 3) as usize;
        if self.latch & 0x10 != 0 {
            let volume = VOLUMES[(data & 15) as usize];
            if index < 3 {
                self.squares[index].volume = volume;
            } else {
                self.noise.volume = volume;
            }
        } else if index < 3 {
            let sq = &mut self.squares[index];
            if data & 0x80 != 0 {
                sq.period = (sq.period & 0xFF00) | ((data as Time) << 4 & 0x00FF);
            } else {
                sq.period = (sq.period & 0x00FF) | ((data as Time) << 8 & 0x3F00);
            }
        } else {
            let select = (data & 3) as usize;
            self.noise.rate = if select < 3 {
                NoiseRate::Fixed(select)
            } else {
                NoiseRate::Square3
            };
            self.noise.feedback = if data & 0x04 != 0 {
                self.white_feedback
            } else {
                self.looped_feedback
            };
            self.noise.shifter = 0x8000;
        }
    }

    /// Game Gear stereo routing byte; output is mono, so it only runs the chip.
    pub fn write_stereo(&mut self, time: Time, data: u8, sink: &mut dyn DeltaSink) {
        self.run_until(time, sink);
        log::trace!("Game Gear stereo flags ${data:02X} ignored");
    }

    /// Run all voices up to `end_time`.
    pub fn run_until(&mut self, end_time: Time, sink: &mut dyn DeltaSink) {
        if end_time <= self.last_time {
            if end_time < self.last_time {
                log::warn!(
                    "SN76489 asked to run backwards from {} to {end_time}",
                    self.last_time
                );
            }
            return;
        }
        for sq in &mut self.squares {
            sq.run(self.last_time, end_time, sink);
        }
        let square3_period = self.squares[2].period;
        self.noise.run(self.last_time, end_time, square3_period, sink);
        self.last_time = end_time;
    }

    /// Finish the frame at `end_time`; the next frame starts at zero.
    pub fn end_frame(&mut self, end_time: Time, sink: &mut dyn DeltaSink) {
        self.run_until(end_time, sink);
        self.last_time -= end_time;
        if self.last_time < 0 {
            log::warn!("SN76489 clock fell behind frame end, resynchronising");
            self.last_time = 0;
        }
    }
}
