//! Atari POKEY: four voices over shared polynomial counters.

use std::sync::OnceLock;

use crate::{DeltaSink, Time};

/// Pure tones above this frequency are replaced by half-volume DC.
const MAX_FREQUENCY: i32 = 12_000;

const POLY4_LEN: i32 = (1 << 4) - 1;
const POLY9_LEN: i32 = (1 << 9) - 1;
const POLY17_LEN: i32 = (1 << 17) - 1;

const POLY5_LEN: u32 = (1 << 5) - 1;
const POLY5_MASK: u32 = (1 << POLY5_LEN) - 1;
/// The 31-bit poly5 sequence; bit 0 is set so pure waves always pass.
const POLY5: u32 = 0x167C_6EA1;

/// Square wave used when the poly counters are bypassed.
const POLY1: [u8; 2] = [0x55, 0x55];

/// AUDCTL bits selecting 1.79 MHz clocking (voices 1, 3) or joining (2, 4).
const FAST_BITS: [u8; 4] = [1 << 6, 1 << 4, 1 << 5, 1 << 3];
/// AUDCTL bits enabling the high-pass filter on voices 1 and 2.
const HIPASS_BITS: [u8; 4] = [1 << 2, 1 << 1, 0, 0];

/// Precomputed polynomial counter outputs, eight bits per byte.
#[derive(Debug)]
pub struct PolyTables {
    poly4: Vec<u8>,
    poly9: Vec<u8>,
    poly17: Vec<u8>,
}

static POLY_TABLES: OnceLock<PolyTables> = OnceLock::new();

const fn poly_mask(width: u32, tap1: u32, tap2: u32) -> u32 {
    (1 << (width - 1 - tap1)) | (1 << (width - 1 - tap2))
}

fn gen_poly(mask: u32, len: i32) -> Vec<u8> {
    let mut n: u32 = 1;
    (0..len / 8 + 1)
        .map(|_| {
            let mut bits = 0u8;
            for b in 0..8 {
                bits |= ((n & 1) as u8) << b;
                n = (n >> 1) ^ (mask & (n & 1).wrapping_neg());
            }
            bits
        })
        .collect()
}

impl PolyTables {
    fn build() -> Self {
        Self {
            poly4: gen_poly(poly_mask(4, 1, 0), POLY4_LEN),
            poly9: gen_poly(poly_mask(9, 5, 0), POLY9_LEN),
            poly17: gen_poly(poly_mask(17, 5, 0), POLY17_LEN),
        }
    }

    /// Tables shared by every POKEY instance, built on first use.
    pub fn shared() -> &'static PolyTables {
        POLY_TABLES.get_or_init(PolyTables::build)
    }

    /// Bit `pos` of a table.
    #[inline]
    fn bit(table: &[u8], pos: i32) -> bool {
        (table[(pos >> 3) as usize] >> (pos & 7)) & 1 != 0
    }
}

fn run_poly5(wave: u32, shift: i32) -> u32 {
    let shift = shift as u32;
    ((wave << shift) & POLY5_MASK) | (wave >> (POLY5_LEN - shift))
}

#[derive(Debug, Clone, Copy, Default)]
struct Osc {
    /// AUDF and AUDC.
    regs: [u8; 2],
    /// Square phase in bit 0, or the poly position while running.
    phase: i32,
    invert: bool,
    last_amp: i32,
    delay: Time,
    period: Time,
    voice: usize,
    muted: bool,
}

/// One POKEY chip.
#[derive(Debug, Clone)]
pub struct SapApu {
    oscs: [Osc; 4],
    last_time: Time,
    poly5_pos: i32,
    poly4_pos: i32,
    polym_pos: i32,
    control: u8,
    polys: &'static PolyTables,
}

impl Default for SapApu {
    fn default() -> Self {
        Self::new()
    }
}

impl SapApu {
    /// Voice count.
    pub const VOICE_COUNT: usize = 4;
    /// Voice labels.
    pub const VOICE_NAMES: [&'static str; 4] = ["Wave 1", "Wave 2", "Wave 3", "Wave 4"];
    /// Fraction of full scale for one amplitude step.
    pub const VOICE_GAIN: f32 = 1.0 / 4.0 / 30.0;
    /// Clock the inaudible-frequency threshold is defined against.
    const REFERENCE_CLOCK: i32 = 1_789_773;

    /// Chip in its power-up state.
    pub fn new() -> Self {
        let mut apu = Self {
            oscs: [Osc::default(); 4],
            last_time: 0,
            poly5_pos: 0,
            poly4_pos: 0,
            polym_pos: 0,
            control: 0,
            polys: PolyTables::shared(),
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

    /// Clear registers, counters and voice levels.
    pub fn reset(&mut self) {
        self.last_time = 0;
        self.poly5_pos = 0;
        self.poly4_pos = 0;
        self.polym_pos = 0;
        self.control = 0;
        for osc in &mut self.oscs {
            *osc = Osc {
                voice: osc.voice,
                muted: osc.muted,
                ..Osc::default()
            };
        }
    }

    /// Write POKEY register `reg` (0-15) at `time`.
    ///
    /// Only AUDF1-4, AUDC1-4, AUDCTL and STIMER affect sound.
    pub fn write_register(&mut self, time: Time, reg: u8, data: u8, sink: &mut dyn DeltaSink) {
        if reg > 0x0F {
            log::debug!("ignored POKEY write to register {reg}");
            return;
        }
        self.run_until(time, sink);
        match reg {
            0..=7 => self.oscs[(reg >> 1) as usize].regs[(reg & 1) as usize] = data,
            8 => self.control = data,
            9 => {
                for osc in &mut self.oscs {
                    osc.delay = 0;
                }
            }
            _ => {}
        }
    }

    fn calc_periods(&mut self) {
        // 64 kHz or 15 kHz base clock
        let divider = if self.control & 1 != 0 { 114 } else { 28 };
        for i in 0..4 {
            let reload = self.oscs[i].regs[0] as Time;
            let mut period = (reload + 1) * divider;
            if self.control & FAST_BITS[i] != 0 {
                period = reload + 4;
                if i & 1 != 0 {
                    period = reload * 0x100 + self.oscs[i - 1].regs[0] as Time + 7;
                    if self.control & FAST_BITS[i - 1] == 0 {
                        period = (period - 6) * divider;
                    }
                    if self.oscs[i - 1].regs[1] & 0x1F > 0x10 {
                        log::debug!("POKEY voice {i} used as 16-bit low half with sound");
                    }
                }
            }
            self.oscs[i].period = period;
        }
    }

    /// Run all voices up to `end_time`.
    pub fn run_until(&mut self, end_time: Time, sink: &mut dyn DeltaSink) {
        if end_time < self.last_time {
            log::warn!(
                "POKEY asked to run backwards from {} to {end_time}",
                self.last_time
            );
            return;
        }
        self.calc_periods();
        let polys = self.polys;

        let (polym, polym_len): (&[u8], i32) = if self.control & 0x80 != 0 {
            (&polys.poly9, POLY9_LEN)
        } else {
            (&polys.poly17, POLY17_LEN)
        };
        self.polym_pos %= polym_len;

        let last_time = self.last_time;
        for i in 0..4 {
            let period2_source = self.oscs[(i + 2) % 4];
            let osc = &mut self.oscs[i];
            let mut time = last_time + osc.delay;
            let period = osc.period;

            let osc_control = osc.regs[1];
            let mut volume = (osc_control & 0x0F) as i32 * 2;
            let inaudible = osc_control & 0xA0 == 0xA0
                && period < Self::REFERENCE_CLOCK / 2 / MAX_FREQUENCY;
            if osc.muted || volume == 0 || osc_control & 0x10 != 0 || inaudible {
                // silent, volume-only DAC mode, or a pure tone too high to hear
                if osc.muted {
                    volume = 0;
                } else if osc_control & 0x10 == 0 {
                    volume >>= 1;
                }
                let delta = volume - osc.last_amp;
                if delta != 0 {
                    osc.last_amp = volume;
                    sink.offset(osc.voice, last_time, delta);
                }
            } else {
                let mut period2 = 0;
                let mut time2 = end_time;
                if self.control & HIPASS_BITS[i] != 0 {
                    period2 = period2_source.period;
                    time2 = last_time + period2_source.delay;
                    if osc.invert {
                        // run the wave loop with an inverted output
                        osc.last_amp -= volume;
                        volume = -volume;
                    }
                }

                if time < end_time || time2 < end_time {
                    let (poly, poly_len, mut poly_pos, mut poly_inc): (&[u8], i32, i32, i32) =
                        if osc_control & 0x20 != 0 {
                            (&POLY1, 16, osc.phase & 1, 1)
                        } else if osc_control & 0x40 != 0 {
                            let pos = (self.poly4_pos + osc.delay) % POLY4_LEN;
                            (&polys.poly4, POLY4_LEN, pos, period % POLY4_LEN)
                        } else {
                            let pos = (self.polym_pos + osc.delay) % polym_len;
                            (polym, polym_len, pos, period % polym_len)
                        };
                    poly_inc -= poly_len;

                    let mut wave = POLY5;
                    let mut poly5_inc = 0;
                    if osc_control & 0x80 == 0 {
                        wave = run_poly5(wave, (osc.delay + self.poly5_pos) % POLY5_LEN as i32);
                        poly5_inc = period % POLY5_LEN as i32;
                    }

                    let mut osc_last_amp = osc.last_amp;
                    loop {
                        // high-pass flip-flop clocked by the voice two up
                        if time2 < time {
                            let mut delta = -osc_last_amp;
                            if volume < 0 {
                                delta += volume;
                            }
                            if delta != 0 {
                                osc_last_amp += delta - volume;
                                volume = -volume;
                                sink.offset(osc.voice, time2, delta);
                            }
                        }
                        while time2 <= time {
                            time2 += period2;
                        }

                        let end = end_time.min(time2);
                        while time < end {
                            if wave & 1 != 0 {
                                let amp = if PolyTables::bit(poly, poly_pos) {
                                    volume
                                } else {
                                    0
                                };
                                poly_pos += poly_inc;
                                if poly_pos < 0 {
                                    poly_pos += poly_len;
                                }
                                let delta = amp - osc_last_amp;
                                if delta != 0 {
                                    osc_last_amp = amp;
                                    sink.offset(osc.voice, time, delta);
                                }
                            }
                            wave = run_poly5(wave, poly5_inc);
                            time += period;
                        }
                        if time >= end_time && time2 >= end_time {
                            break;
                        }
                    }
                    osc.phase = poly_pos;
                    osc.last_amp = osc_last_amp;
                }

                osc.invert = false;
                if volume < 0 {
                    osc.last_amp -= volume;
                    osc.invert = true;
                }
            }

            // maintain the divider
            let remain = end_time - time;
            if remain > 0 {
                let count = (remain + period - 1) / period;
                osc.phase ^= count;
                time += count * period;
            }
            osc.delay = time - end_time;
        }

        let duration = end_time - last_time;
        self.last_time = end_time;
        self.poly4_pos = (self.poly4_pos + duration) % POLY4_LEN;
        self.poly5_pos = (self.poly5_pos + duration) % POLY5_LEN as i32;
        // reduced on the next run
        self.polym_pos += duration;
    }

    /// Finish the frame at `end_time`; the next frame starts at zero.
    pub fn end_frame(&mut self, end_time: Time, sink: &mut dyn DeltaSink) {
        if end_time > self.last_time {
            self.run_until(end_time, sink);
        }
        self.last_time -= end_time;
        if self.last_time < 0 {
            log::warn!("POKEY clock fell behind frame end, resynchronising");
            self.last_time = 0;
        }
    }
}
