//! Atari 8-bit model hosting a SAP player routine.

use gme_chips::{DeltaSink, SapApu, VoiceMixer};
use gme_common::{
    check_track, new_mixer, BasicMetadata, GuestMachine, MachineDriver, PlayScheduler,
    PlayerConfig, Result, Time, WarningSlot,
};
use gme_cpu::mos6502::{self, Mos6502, Registers};
use gme_cpu::{MemoryMap, Region};

use crate::format::{SapFile, SapType, CLOCK_RATE, SCANLINE_PERIOD};

/// Return address of every guest call; holds the halt opcode.
pub const IDLE_ADDR: u16 = 0xD2D2;

const PAGE_BITS: u32 = 11;
const IO_PAGE: u16 = 0xD200;
/// Type C start-up sequence, inside the I/O page.
const STUB_ADDR: u16 = 0xD280;
const VCOUNT_ADDR: u16 = 0xD40B;
const SECOND_POKEY: u16 = 0x10;

const VOICE_NAMES: [&str; 8] = [
    "Wave 1", "Wave 2", "Wave 3", "Wave 4", "Wave 5", "Wave 6", "Wave 7", "Wave 8",
];

struct SapBus {
    mem: MemoryMap,
    ram: Region,
    apu: SapApu,
    apu2: SapApu,
    stereo: bool,
    mixer: VoiceMixer,
    /// Clock of the current frame's start within the TV frame.
    frame_phase: Time,
    frame_clocks: Time,
}

impl SapBus {
    fn mixer_voices(&self) -> usize {
        if self.stereo {
            VOICE_NAMES.len()
        } else {
            SapApu::VOICE_COUNT
        }
    }

    fn vcount(&self, time: Time) -> u8 {
        let line = (self.frame_phase + time).rem_euclid(self.frame_clocks) / SCANLINE_PERIOD;
        (line / 2) as u8
    }

    fn end_frame(&mut self, end: Time) {
        self.apu.end_frame(end, &mut self.mixer);
        if self.stereo {
            self.apu2.end_frame(end, &mut self.mixer);
        }
        self.mixer.end_frame(end);
        self.frame_phase = (self.frame_phase + end).rem_euclid(self.frame_clocks);
    }
}

impl mos6502::Bus for SapBus {
    fn read(&mut self, time: Time, addr: u16) -> u8 {
        if addr == VCOUNT_ADDR {
            return self.vcount(time);
        }
        self.mem.read(addr)
    }

    fn write(&mut self, time: Time, addr: u16, data: u8) {
        if addr & 0xFF00 != IO_PAGE {
            self.mem.write(addr, data);
            return;
        }
        // I/O page writes never reach RAM; the idle byte and stub live there.
        let reg = addr & 0x1F;
        if reg < SECOND_POKEY {
            self.apu.write_register(time, reg as u8, data, &mut self.mixer);
        } else if self.stereo {
            self.apu2
                .write_register(time, (reg - SECOND_POKEY) as u8, data, &mut self.mixer);
        }
    }

    fn code(&self, addr: u16) -> u8 {
        self.mem.read(addr)
    }
}

struct SapCore {
    cpu: Mos6502,
    bus: SapBus,
    play_addr: u16,
}

impl GuestMachine for SapCore {
    type Snapshot = Registers;

    fn cpu_time(&self) -> Time {
        self.cpu.time()
    }

    fn set_cpu_time(&mut self, time: Time) {
        self.cpu.set_time(time);
    }

    fn adjust_cpu_time(&mut self, delta: Time) {
        self.cpu.adjust_time(delta);
    }

    fn run_cpu(&mut self, end: Time) -> bool {
        self.cpu.run(end, &mut self.bus)
    }

    fn pc(&self) -> u16 {
        self.cpu.regs.pc
    }

    fn idle_addr(&self) -> u16 {
        IDLE_ADDR
    }

    fn snapshot(&self) -> Registers {
        self.cpu.regs
    }

    fn restore(&mut self, regs: Registers) {
        self.cpu.regs = regs;
    }

    fn call_play(&mut self) {
        self.cpu.call(&mut self.bus, self.play_addr, IDLE_ADDR);
    }
}

/// Atari XL with a loaded SAP file.
pub struct SapMachine {
    core: SapCore,
    scheduler: PlayScheduler<Registers>,
    file: SapFile,
    metadata: BasicMetadata,
    warning: WarningSlot,
    reported_errors: u32,
}

impl SapMachine {
    /// Build the machine for `file`; call [`MachineDriver::start_track`]
    /// before running it.
    pub fn new(file: SapFile, config: &PlayerConfig) -> Self {
        let header = &file.header;
        let mut mem = MemoryMap::new(PAGE_BITS);
        let ram = mem.alloc(0x10000, 0);
        mem.reset(mos6502::HALT_OPCODE);
        mem.map_mem(0, 0x10000, Some(ram), Some(ram));

        let stereo = header.stereo;
        let voices = if stereo { VOICE_NAMES.len() } else { SapApu::VOICE_COUNT };
        let mut mixer = new_mixer(config, CLOCK_RATE, voices);
        for voice in 0..voices {
            mixer.set_voice_gain(voice, SapApu::VOICE_GAIN);
        }
        if stereo {
            // both chips share the mono mix
            mixer.scale_gains(0.5);
        }
        let apu = SapApu::new();
        let mut apu2 = SapApu::new();
        apu2.set_voice_base(SapApu::VOICE_COUNT);

        let mut warning = WarningSlot::new();
        if let Some(w) = file.warnings.last() {
            warning.forward(w.clone());
        }

        let mut metadata = BasicMetadata::new("SAP", "Atari XL");
        metadata.title = header.name.clone();
        metadata.author = header.author.clone();
        metadata.copyright = header.date.clone();
        metadata.track_count = header.song_count;
        metadata.frame_rate = header.play_rate();

        let frame_clocks = header.lines_per_frame() as Time * SCANLINE_PERIOD;
        let scheduler = PlayScheduler::new(header.play_period());
        let play_addr = header.play_entry();
        Self {
            core: SapCore {
                cpu: Mos6502::new(),
                bus: SapBus {
                    mem,
                    ram,
                    apu,
                    apu2,
                    stereo,
                    mixer,
                    frame_phase: 0,
                    frame_clocks,
                },
                play_addr,
            },
            scheduler,
            file,
            metadata,
            warning,
            reported_errors: 0,
        }
    }

    /// Parsed file this machine plays.
    pub fn file(&self) -> &SapFile {
        &self.file
    }

    /// Clocks between play calls, after tempo.
    pub fn play_period(&self) -> Time {
        self.scheduler.play_period()
    }

    /// Play routine calls since the current track started.
    pub fn play_calls(&self) -> u64 {
        self.scheduler.play_calls()
    }

    /// Current program counter.
    pub fn pc(&self) -> u16 {
        self.core.cpu.regs.pc
    }

    /// Byte visible to the CPU at `addr`.
    pub fn peek(&self, addr: u16) -> u8 {
        self.core.bus.mem.read(addr)
    }

    fn load_ram(&mut self) {
        let bus = &mut self.core.bus;
        bus.mem.region_mut(bus.ram).fill(0);
        for block in &self.file.blocks {
            let copied = bus.mem.load(bus.ram, block.start as usize, &block.data);
            if copied < block.data.len() {
                log::debug!("block at 0x{:04X} clipped at 64K", block.start);
            }
        }
        let ram = bus.mem.region_mut(bus.ram);
        let io = IO_PAGE as usize;
        ram[io..io + 0x100].fill(0);
        ram[IDLE_ADDR as usize] = mos6502::HALT_OPCODE;
    }

    /// `LDA #$70; LDX #<music; LDY #>music; JSR player+3;
    /// LDA #0; LDX #song; JMP player+3`
    fn write_type_c_stub(&mut self, song: u8) {
        let header = &self.file.header;
        let music = header.music_addr.unwrap_or(0).to_le_bytes();
        let entry = header.player_addr.wrapping_add(3).to_le_bytes();
        let stub = [
            0xA9, 0x70, 0xA2, music[0], 0xA0, music[1], 0x20, entry[0], entry[1], 0xA9, 0x00,
            0xA2, song, 0x4C, entry[0], entry[1],
        ];
        let bus = &mut self.core.bus;
        bus.mem.load(bus.ram, STUB_ADDR as usize, &stub);
    }
}

impl MachineDriver for SapMachine {
    fn clock_rate(&self) -> u32 {
        CLOCK_RATE
    }

    fn track_count(&self) -> usize {
        self.file.header.song_count
    }

    fn start_track(&mut self, index: usize) -> Result<()> {
        check_track(index, self.track_count())?;
        let typ = self.file.header.typ;
        log::debug!("SAP song {} (type {})", index, typ.letter());
        self.load_ram();
        let entry = match typ {
            SapType::B => self.file.header.init_addr.unwrap_or(self.file.header.player_addr),
            SapType::C => {
                self.write_type_c_stub(index as u8);
                STUB_ADDR
            }
        };

        let bus = &mut self.core.bus;
        bus.mixer.buffer_mut().clear();
        bus.apu.reset();
        bus.apu2.reset();
        bus.frame_phase = 0;

        let cpu = &mut self.core.cpu;
        cpu.reset();
        cpu.regs.a = index as u8;
        cpu.call(bus, entry, IDLE_ADDR);
        self.reported_errors = 0;
        self.scheduler.start();
        Ok(())
    }

    fn end_frame(&mut self, duration: Time) -> Time {
        self.scheduler.end_frame(&mut self.core, duration);
        self.core.bus.end_frame(duration);
        if let Some(w) = self.scheduler.take_warning() {
            self.warning.forward(w);
        }
        let errors = self.core.cpu.error_count();
        if errors > self.reported_errors {
            self.reported_errors = errors;
            self.warning
                .set(format!("{errors} unsupported instructions executed"));
        }
        duration
    }

    fn set_tempo(&mut self, tempo: f64) {
        self.scheduler.set_tempo(tempo);
    }

    fn set_voice_mute(&mut self, mask: u32) {
        let bus = &mut self.core.bus;
        bus.apu.set_mute_mask(mask);
        bus.apu2.set_mute_mask(mask >> SapApu::VOICE_COUNT);
    }

    fn voice_names(&self) -> Vec<&'static str> {
        VOICE_NAMES[..self.core.bus.mixer_voices()].to_vec()
    }

    fn mixer(&self) -> &VoiceMixer {
        &self.core.bus.mixer
    }

    fn mixer_mut(&mut self) -> &mut VoiceMixer {
        &mut self.core.bus.mixer
    }

    fn take_warning(&mut self) -> Option<String> {
        self.warning.take()
    }

    fn metadata(&self) -> &BasicMetadata {
        &self.metadata
    }

    fn track_length_secs(&self, index: usize) -> Option<f32> {
        self.file.header.duration(index)
    }
}
