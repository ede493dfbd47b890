//! Z80 machine with AY-3-8910 and beeper, for Spectrum and CPC tunes.

use gme_chips::{AyApu, Beeper, DeltaSink, VoiceMixer};
use gme_common::{
    check_track, new_mixer, BasicMetadata, MachineDriver, PlayerConfig, Result, Time, WarningSlot,
};
use gme_cpu::z80::{self, Z80};
use gme_cpu::{MemoryMap, Region};

use crate::error::AyError;
use crate::format::{AyFile, AySong};

const SPECTRUM_CLOCK: u32 = 3_546_900;
const CPC_CLOCK: u32 = 4_000_000;
const SPECTRUM_AY_RATIO: u32 = 2;
const CPC_AY_RATIO: u32 = 4;
const INTERRUPT_RATE: u32 = 50;

const BEEPER_VOICE: usize = AyApu::VOICE_COUNT;
const VOICE_NAMES: [&str; 4] = ["Square 1", "Square 2", "Square 3", Beeper::VOICE_NAME];

const ZX_PORT_MASK: u16 = 0xFEFF;
const ZX_REG_PORT: u16 = 0xFEFD;
const ZX_DATA_PORT: u16 = 0xBEFD;
const CPC_DATA_PORT: u8 = 0xF4;
const CPC_CONTROL_PORT: u8 = 0xF6;

/// Driver loop used when the song has an interrupt routine.
const ACTIVE_DRIVER: [u8; 13] = [
    0xF3, // DI
    0xCD, 0x00, 0x00, // CALL init
    0xED, 0x56, // loop: IM 1
    0xFB, // EI
    0x76, // HALT
    0xCD, 0x00, 0x00, // CALL interrupt
    0x18, 0xF7, // JR loop
];

/// Driver loop for songs whose init installs its own IM 2 handler.
const PASSIVE_DRIVER: [u8; 10] = [
    0xF3, // DI
    0xCD, 0x00, 0x00, // CALL init
    0xED, 0x5E, // loop: IM 2
    0xFB, // EI
    0x76, // HALT
    0x18, 0xFA, // JR loop
];

/// Host machine, inferred from the first sound port the guest touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AySystem {
    /// No sound port written yet.
    #[default]
    Unknown,
    /// ZX Spectrum 128: AY on 0xFFFD/0xBFFD, beeper on 0xFE.
    Spectrum,
    /// Amstrad CPC: AY behind the PPI on 0xF4xx/0xF6xx.
    Cpc,
}

impl AySystem {
    fn name(self) -> &'static str {
        match self {
            AySystem::Unknown => "ZX Spectrum/Amstrad CPC",
            AySystem::Spectrum => "ZX Spectrum",
            AySystem::Cpc => "Amstrad CPC",
        }
    }
}

struct AyBus {
    mem: MemoryMap,
    ram: Region,
    apu: AyApu,
    beeper: Beeper,
    mixer: VoiceMixer,
    system: AySystem,
    cpc_latch: u8,
    beeper_muted: bool,
}

impl AyBus {
    fn enter(&mut self, time: Time, system: AySystem) {
        if self.system == system {
            return;
        }
        log::debug!("{} port traffic detected", system.name());
        self.system = system;
        if system == AySystem::Cpc {
            self.beeper_muted = true;
            self.beeper.set_muted(time, true, &mut self.mixer);
            // everything before `time` was clocked at the Spectrum rate
            self.apu.run_until(time, &mut self.mixer);
            self.apu.set_clock(CPC_CLOCK, CPC_AY_RATIO);
            self.mixer.buffer_mut().change_clock_rate(time, CPC_CLOCK);
        }
    }

    fn clock_rate(&self) -> u32 {
        if self.system == AySystem::Cpc {
            CPC_CLOCK
        } else {
            SPECTRUM_CLOCK
        }
    }
}

impl z80::Bus for AyBus {
    fn read(&mut self, _time: Time, addr: u16) -> u8 {
        self.mem.read(addr)
    }

    fn write(&mut self, _time: Time, addr: u16, data: u8) {
        self.mem.write(addr, data);
    }

    fn code(&self, addr: u16) -> u8 {
        self.mem.read(addr)
    }

    fn port_in(&mut self, _time: Time, port: u16) -> u8 {
        if self.system != AySystem::Cpc && port & ZX_PORT_MASK == ZX_REG_PORT {
            return self.apu.read_data();
        }
        0xFF
    }

    fn port_out(&mut self, time: Time, port: u16, data: u8) {
        if self.system != AySystem::Cpc {
            if port & 0xFF == 0xFE {
                self.enter(time, AySystem::Spectrum);
                self.beeper.write(time, data, &mut self.mixer);
                return;
            }
            match port & ZX_PORT_MASK {
                ZX_REG_PORT => {
                    self.enter(time, AySystem::Spectrum);
                    self.apu.select(data);
                    return;
                }
                ZX_DATA_PORT => {
                    self.enter(time, AySystem::Spectrum);
                    self.apu.write_data(time, data, &mut self.mixer);
                    return;
                }
                _ => {}
            }
        }
        if self.system != AySystem::Spectrum {
            match (port >> 8) as u8 {
                CPC_DATA_PORT => {
                    self.enter(time, AySystem::Cpc);
                    self.cpc_latch = data;
                    return;
                }
                CPC_CONTROL_PORT => {
                    self.enter(time, AySystem::Cpc);
                    // BDIR/BC1 in bits 7/6: 11 latch address, 10 write
                    match data & 0xC0 {
                        0xC0 => self.apu.select(self.cpc_latch),
                        0x80 => self.apu.write_data(time, self.cpc_latch, &mut self.mixer),
                        _ => {}
                    }
                    return;
                }
                _ => {}
            }
        }
        log::trace!("unmapped OUT 0x{port:04X} <- 0x{data:02X}");
    }
}

/// Spectrum/CPC with a loaded AY file.
pub struct AyMachine {
    cpu: Z80,
    bus: AyBus,
    file: AyFile,
    metadata: BasicMetadata,
    warning: WarningSlot,
    track: usize,
    tempo: f64,
    next_play: Time,
    reported_errors: u32,
}

impl AyMachine {
    /// Build the machine for `file`; call [`MachineDriver::start_track`]
    /// before running it.
    pub fn new(file: AyFile, config: &PlayerConfig) -> Self {
        let mut mem = MemoryMap::new(14);
        let ram = mem.alloc(0x10000, 0);
        mem.reset(z80::HALT_OPCODE);
        mem.map_mem(0, 0x10000, Some(ram), Some(ram));

        let mut mixer = new_mixer(config, SPECTRUM_CLOCK, VOICE_NAMES.len());
        for voice in 0..AyApu::VOICE_COUNT {
            mixer.set_voice_gain(voice, AyApu::VOICE_GAIN);
        }
        mixer.set_voice_gain(BEEPER_VOICE, Beeper::GAIN);

        let mut warning = WarningSlot::new();
        if let Some(last) = file.warnings.last() {
            warning.forward(last.clone());
        }

        let mut metadata = BasicMetadata::new("AY", AySystem::Unknown.name());
        metadata.author = file.header.author.clone();
        metadata.comments = file.header.misc.clone();
        metadata.track_count = file.songs.len();
        metadata.frame_rate = INTERRUPT_RATE;

        Self {
            cpu: Z80::new(),
            bus: AyBus {
                mem,
                ram,
                apu: AyApu::new(SPECTRUM_CLOCK, SPECTRUM_AY_RATIO),
                beeper: Beeper::new(BEEPER_VOICE),
                mixer,
                system: AySystem::Unknown,
                cpc_latch: 0,
                beeper_muted: false,
            },
            file,
            metadata,
            warning,
            track: 0,
            tempo: 1.0,
            next_play: 0,
            reported_errors: 0,
        }
    }

    /// Parsed file this machine plays.
    pub fn file(&self) -> &AyFile {
        &self.file
    }

    /// Host machine detected so far for the current track.
    pub fn system(&self) -> AySystem {
        self.bus.system
    }

    /// Byte at `addr`.
    pub fn peek(&self, addr: u16) -> u8 {
        self.bus.mem.read(addr)
    }

    /// Current program counter.
    pub fn pc(&self) -> u16 {
        self.cpu.regs.pc
    }

    /// Clocks between interrupts, after tempo.
    pub fn play_period(&self) -> Time {
        let base = self.bus.clock_rate() as f64 / INTERRUPT_RATE as f64;
        ((base / self.tempo) as Time).max(1)
    }

    fn load_song(&mut self, index: usize, song: &AySong) -> Result<u16> {
        let ram = self.bus.ram;
        let mem = self.bus.mem.region_mut(ram);
        mem[..0x100].fill(0xC9);
        mem[0x100..0x4000].fill(0xFF);
        mem[0x4000..].fill(0x00);

        for block in &song.data.blocks {
            self.bus.mem.load(ram, block.address as usize, &block.data);
        }

        let missing = || AyError::NoInitAddress { song: index + 1 };
        let points = song.data.points.ok_or_else(missing)?;
        let init = if points.init != 0 {
            points.init
        } else {
            song.data.blocks.first().ok_or_else(missing)?.address
        };

        let mem = self.bus.mem.region_mut(ram);
        if points.interrupt != 0 {
            mem[..ACTIVE_DRIVER.len()].copy_from_slice(&ACTIVE_DRIVER);
            mem[9..11].copy_from_slice(&points.interrupt.to_le_bytes());
        } else {
            mem[..PASSIVE_DRIVER.len()].copy_from_slice(&PASSIVE_DRIVER);
        }
        mem[2..4].copy_from_slice(&init.to_le_bytes());
        // EI followed by the RET filler
        mem[0x38] = 0xFB;
        Ok(points.stack)
    }

    fn update_mute(&mut self, mask: u32) {
        self.bus.apu.set_mute_mask(mask);
        let beeper_muted = mask & (1 << BEEPER_VOICE) != 0 || self.bus.system == AySystem::Cpc;
        if beeper_muted != self.bus.beeper_muted {
            self.bus.beeper_muted = beeper_muted;
            let time = self.cpu.time();
            self.bus
                .beeper
                .set_muted(time, beeper_muted, &mut self.bus.mixer);
        }
    }
}

impl MachineDriver for AyMachine {
    fn clock_rate(&self) -> u32 {
        self.bus.clock_rate()
    }

    fn track_count(&self) -> usize {
        self.file.songs.len()
    }

    fn start_track(&mut self, index: usize) -> Result<()> {
        check_track(index, self.track_count())?;
        self.track = index;
        let song = self.file.songs[index].clone();

        let bus = &mut self.bus;
        bus.system = AySystem::Unknown;
        bus.cpc_latch = 0;
        bus.apu.set_clock(SPECTRUM_CLOCK, SPECTRUM_AY_RATIO);
        bus.apu.reset();
        bus.beeper.reset();
        bus.beeper.set_muted(0, false, &mut bus.mixer);
        bus.beeper_muted = false;
        bus.mixer.buffer_mut().set_clock_rate(SPECTRUM_CLOCK);
        bus.mixer.buffer_mut().clear();

        self.cpu.reset();
        let regs = &mut self.cpu.regs;
        regs.fill_pairs(song.data.register_preset());
        regs.i = 3;
        regs.pc = 0;
        self.cpu.regs.sp = self.load_song(index, &song)?;

        self.metadata.title = song.name.clone();
        self.metadata.system = AySystem::Unknown.name().to_string();
        self.metadata.duration_seconds = song.data.length_secs();
        self.next_play = self.play_period();
        self.reported_errors = 0;
        log::debug!("AY song {} '{}'", index + 1, song.name);
        Ok(())
    }

    fn end_frame(&mut self, duration: Time) -> Time {
        let was = self.bus.system;
        while self.cpu.time() < duration {
            let target = duration.min(self.next_play);
            if self.cpu.run(target, &mut self.bus) {
                // Halted until the next interrupt.
                self.cpu.set_time(target);
            }
            if self.cpu.time() >= self.next_play {
                self.next_play += self.play_period();
                if !self.cpu.interrupt(&mut self.bus) {
                    log::trace!("interrupt ignored, interrupts disabled");
                }
            }
        }
        self.next_play -= duration;
        if self.next_play < 0 {
            log::warn!("interrupt deadline {} behind frame start", self.next_play);
            self.next_play = 0;
        }
        self.cpu.adjust_time(-duration);
        self.bus.apu.end_frame(duration, &mut self.bus.mixer);
        self.bus.mixer.end_frame(duration);

        if self.bus.system != was {
            self.metadata.system = self.bus.system.name().to_string();
        }
        let errors = self.cpu.error_count();
        if errors > self.reported_errors {
            self.reported_errors = errors;
            self.warning
                .set(format!("{errors} undefined Z80 instructions executed"));
        }
        duration
    }

    fn set_tempo(&mut self, tempo: f64) {
        self.tempo = if tempo.is_finite() && tempo > 0.0 { tempo } else { 1.0 };
    }

    fn set_voice_mute(&mut self, mask: u32) {
        self.update_mute(mask);
    }

    fn voice_names(&self) -> Vec<&'static str> {
        VOICE_NAMES.to_vec()
    }

    fn mixer(&self) -> &VoiceMixer {
        &self.bus.mixer
    }

    fn mixer_mut(&mut self) -> &mut VoiceMixer {
        &mut self.bus.mixer
    }

    fn take_warning(&mut self) -> Option<String> {
        self.warning.take()
    }

    fn metadata(&self) -> &BasicMetadata {
        &self.metadata
    }

    fn track_length_secs(&self, index: usize) -> Option<f32> {
        self.file.songs.get(index)?.data.length_secs()
    }
}
