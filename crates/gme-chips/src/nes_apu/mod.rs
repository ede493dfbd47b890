//! Ricoh 2A03 sound: two squares, triangle, noise and delta modulation.
//!
//! Register writes are applied at their CPU clock. Before any write the
//! voices are run up to that clock, so every level change reaches the sink
//! in time order.

mod oscs;
mod tables;

use oscs::{Dmc, Noise, Square, Triangle};
use tables::{FRAME_PERIOD, LENGTH_TABLE};

use crate::{DeltaSink, Time};

/// Source of DMC sample bytes (the CPU address space, usually).
pub trait DmcReader {
    /// Byte at CPU address `addr` (always `0x8000..=0xFFFF`).
    fn read_dmc(&mut self, addr: u16) -> u8;
}

impl<F: FnMut(u16) -> u8> DmcReader for F {
    fn read_dmc(&mut self, addr: u16) -> u8 {
        self(addr)
    }
}

/// NES APU with delta output.
#[derive(Debug, Clone)]
pub struct NesApu {
    square1: Square,
    square2: Square,
    triangle: Triangle,
    noise: Noise,
    dmc: Dmc,
    last_time: Time,
    last_dmc_time: Time,
    frame_period: i32,
    frame_delay: i32,
    frame: u8,
    frame_mode: u8,
    osc_enables: u8,
    irq_flag: bool,
    pal: bool,
}

impl Default for NesApu {
    fn default() -> Self {
        Self::new()
    }
}

impl NesApu {
    /// First register address.
    pub const START_ADDR: u16 = 0x4000;
    /// Last register address (frame counter).
    pub const END_ADDR: u16 = 0x4017;
    /// Channel enable / status register.
    pub const STATUS_ADDR: u16 = 0x4015;
    /// Voice count.
    pub const VOICE_COUNT: usize = 5;
    /// Voice labels in voice order.
    pub const VOICE_NAMES: [&'static str; 5] = ["Square 1", "Square 2", "Triangle", "Noise", "DMC"];
    /// Fraction of full scale for one amplitude step of each voice.
    pub const VOICE_GAINS: [f32; 5] = [
        0.1128 / 15.0,
        0.1128 / 15.0,
        0.12765 / 15.0,
        0.0741 / 15.0,
        0.42545 / 127.0,
    ];

    /// NTSC chip after power-up.
    pub fn new() -> Self {
        let mut apu = Self {
            square1: Square::default(),
            square2: Square::default(),
            triangle: Triangle::default(),
            noise: Noise::default(),
            dmc: Dmc::default(),
            last_time: 0,
            last_dmc_time: 0,
            frame_period: FRAME_PERIOD[0],
            frame_delay: 1,
            frame: 0,
            frame_mode: 0,
            osc_enables: 0,
            irq_flag: false,
            pal: false,
        };
        apu.set_voice_base(0);
        apu.reset(false, 0);
        apu
    }

    /// Route voice `i` to sink voice `base + i`.
    pub fn set_voice_base(&mut self, base: usize) {
        self.square1.env.core.voice = base;
        self.square2.env.core.voice = base + 1;
        self.triangle.core.voice = base + 2;
        self.noise.env.core.voice = base + 3;
        self.dmc.core.voice = base + 4;
    }

    /// Silence voices whose bit is set; muted voices keep running silently.
    pub fn set_mute_mask(&mut self, mask: u32) {
        self.square1.env.core.muted = mask & 1 != 0;
        self.square2.env.core.muted = mask & 2 != 0;
        self.triangle.core.muted = mask & 4 != 0;
        self.noise.env.core.muted = mask & 8 != 0;
        self.dmc.core.muted = mask & 16 != 0;
    }

    /// Power-up state for the given video standard and initial DAC level.
    ///
    /// Output levels restart from zero, so the sink should be cleared too.
    pub fn reset(&mut self, pal: bool, initial_dmc_dac: u8) {
        self.pal = pal;
        self.frame_period = FRAME_PERIOD[pal as usize];
        self.square1.reset();
        self.square2.reset();
        self.triangle.reset();
        self.noise.reset(pal);
        self.dmc.reset(pal, initial_dmc_dac);
        self.last_time = 0;
        self.last_dmc_time = 0;
        self.osc_enables = 0;
        self.irq_flag = false;
        self.frame_delay = 1;
        self.frame = 0;
        self.frame_mode = 0;
    }

    /// True when running PAL timing.
    pub fn is_pal(&self) -> bool {
        self.pal
    }

    /// Frame or DMC interrupt pending.
    pub fn irq_pending(&self) -> bool {
        self.irq_flag || self.dmc.irq_flag
    }

    /// Write `data` to APU register `addr` at CPU clock `time`.
    ///
    /// Addresses outside `0x4000..=0x4017` and the non-APU `0x4014`/`0x4016`
    /// are ignored.
    pub fn write_register(
        &mut self,
        time: Time,
        addr: u16,
        data: u8,
        sink: &mut dyn DeltaSink,
        reader: &mut dyn DmcReader,
    ) {
        if !(Self::START_ADDR..=Self::END_ADDR).contains(&addr) || addr == 0x4014 || addr == 0x4016
        {
            log::debug!("ignored APU write ${addr:04X} = ${data:02X}");
            return;
        }
        self.run_until(time, sink, reader);

        if addr < 0x4014 {
            let index = ((addr - Self::START_ADDR) >> 2) as usize;
            let reg = (addr & 3) as usize;
            if index == 4 {
                let core = &mut self.dmc.core;
                core.regs[reg] = data;
                core.reg_written[reg] = true;
                self.dmc.write_register(reg, data);
                return;
            }
            let enabled = (self.osc_enables >> index) & 1 != 0;
            let core = match index {
                0 => &mut self.square1.env.core,
                1 => &mut self.square2.env.core,
                2 => &mut self.triangle.core,
                _ => &mut self.noise.env.core,
            };
            core.regs[reg] = data;
            core.reg_written[reg] = true;
            if reg == 3 {
                if enabled {
                    core.length_counter = LENGTH_TABLE[(data >> 3) as usize] as i32;
                }
                match index {
                    0 => self.square1.phase = Square::PHASE_RANGE - 1,
                    1 => self.square2.phase = Square::PHASE_RANGE - 1,
                    _ => {}
                }
            }
        } else if addr == Self::STATUS_ADDR {
            for (bit, core) in [
                &mut self.square1.env.core,
                &mut self.square2.env.core,
                &mut self.triangle.core,
                &mut self.noise.env.core,
                &mut self.dmc.core,
            ]
            .into_iter()
            .enumerate()
            {
                if (data >> bit) & 1 == 0 {
                    core.length_counter = 0;
                }
            }
            self.dmc.irq_flag = false;
            let old_enables = self.osc_enables;
            self.osc_enables = data;
            if data & 0x10 != 0 && old_enables & 0x10 == 0 {
                self.dmc.start(reader);
            }
        } else {
            self.frame_mode = data;
            let irq_enabled = data & 0x40 == 0;
            self.irq_flag &= irq_enabled;
            // 5-step mode starts at step 0, 4-step mode one step in
            self.frame_delay &= 1;
            self.frame = 0;
            if data & 0x80 == 0 {
                self.frame = 1;
                self.frame_delay += self.frame_period;
            }
        }
    }

    /// Read `$4015` at `time`; clears the frame interrupt flag.
    pub fn read_status(
        &mut self,
        time: Time,
        sink: &mut dyn DeltaSink,
        reader: &mut dyn DmcReader,
    ) -> u8 {
        self.run_until(time, sink, reader);
        let mut result = 0;
        for (bit, length) in [
            self.square1.env.core.length_counter,
            self.square2.env.core.length_counter,
            self.triangle.core.length_counter,
            self.noise.env.core.length_counter,
            self.dmc.core.length_counter,
        ]
        .into_iter()
        .enumerate()
        {
            if length != 0 {
                result |= 1 << bit;
            }
        }
        if self.irq_flag {
            result |= 0x40;
        }
        if self.dmc.irq_flag {
            result |= 0x80;
        }
        self.irq_flag = false;
        result
    }

    /// Run all voices up to `end_time`.
    pub fn run_until(&mut self, end_time: Time, sink: &mut dyn DeltaSink, reader: &mut dyn DmcReader) {
        if end_time < self.last_time {
            log::warn!(
                "APU asked to run backwards from {} to {end_time}",
                self.last_time
            );
            return;
        }
        if self.last_dmc_time < end_time {
            let start = self.last_dmc_time;
            self.last_dmc_time = end_time;
            self.dmc.run(start, end_time, sink, reader);
            if self.dmc.ended {
                self.dmc.ended = false;
                self.osc_enables &= !0x10;
            }
        }

        while self.last_time < end_time {
            let time = (self.last_time + self.frame_delay).min(end_time);
            self.frame_delay -= time - self.last_time;

            self.square1.run(self.last_time, time, sink);
            self.square2.run(self.last_time, time, sink);
            self.triangle.run(self.last_time, time, sink);
            self.noise.run(self.last_time, time, sink);
            self.last_time = time;

            if time == end_time && self.frame_delay > 0 {
                break;
            }
            self.clock_frame();
        }
    }

    fn clock_frame(&mut self) {
        self.frame_delay = self.frame_period;
        let step = self.frame;
        self.frame += 1;
        match step {
            0 | 2 => {
                if step == 0 && self.frame_mode & 0xC0 == 0 {
                    self.irq_flag = true;
                }
                self.square1.env.core.clock_length(0x20);
                self.square2.env.core.clock_length(0x20);
                self.noise.env.core.clock_length(0x20);
                self.triangle.core.clock_length(0x80);

                self.square1.clock_sweep(-1);
                self.square2.clock_sweep(0);

                if self.pal && self.frame == 3 {
                    self.frame_delay -= 2;
                }
            }
            1 => {
                if !self.pal {
                    self.frame_delay -= 2;
                }
            }
            _ => {
                self.frame = 0;
                if self.frame_mode & 0x80 != 0 {
                    self.frame_delay += self.frame_period - if self.pal { 2 } else { 6 };
                }
            }
        }

        // envelopes and the linear counter tick on every step
        self.triangle.clock_linear_counter();
        self.square1.env.clock_envelope();
        self.square2.env.clock_envelope();
        self.noise.env.clock_envelope();
    }

    /// Finish the frame at `end_time` and make the next frame start at zero.
    pub fn end_frame(&mut self, end_time: Time, sink: &mut dyn DeltaSink, reader: &mut dyn DmcReader) {
        self.run_until(end_time, sink, reader);
        self.last_time -= end_time;
        self.last_dmc_time -= end_time;
        if self.last_time < 0 || self.last_dmc_time < 0 {
            log::warn!("APU clock fell behind frame end, resynchronising");
            self.last_time = self.last_time.max(0);
            self.last_dmc_time = self.last_dmc_time.max(0);
        }
    }
}
