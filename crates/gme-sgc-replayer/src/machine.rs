//! Sega Master System / Game Gear model hosting an SGC sound driver.

use gme_chips::{DeltaSink, SmsApu, VoiceMixer};
use gme_common::{
    check_track, new_mixer, BasicMetadata, GuestMachine, MachineDriver, PlayScheduler,
    PlayerConfig, Result, Time, WarningSlot,
};
use gme_cpu::z80::{self, Registers, Z80};
use gme_cpu::{MemoryMap, Region};

use crate::format::{SgcFile, SgcSystem};

/// Return address of every guest call; holds the halt opcode.
pub const IDLE_ADDR: u16 = 0x0000;

const PAGE_BITS: u32 = 10;
const BANK_SIZE: usize = 0x4000;
const VECTORS_SIZE: usize = 0x400;
const RAM_ADDR: u16 = 0xC000;
const RAM_SIZE: usize = 0x2000;
const MAPPER_ADDR: u16 = 0xFFFC;
/// Control register bit mapping cartridge RAM into slot 2.
const CART_RAM_ENABLE: u8 = 0x08;
const GG_STEREO_PORT: u8 = 0x06;

struct SgcBus {
    mem: MemoryMap,
    ram: Region,
    cart_ram: Region,
    vectors: Region,
    rom: Region,
    bank_count: usize,
    /// `0xFFFC`, then the three slot registers.
    mapper: [u8; 4],
    game_gear: bool,
    psg: SmsApu,
    mixer: VoiceMixer,
}

impl SgcBus {
    fn map_slot(&mut self, slot: usize) {
        let addr = (slot * BANK_SIZE) as u16;
        if slot == 2 && self.mapper[0] & CART_RAM_ENABLE != 0 {
            log::trace!("slot 2 <- cartridge RAM");
            self.mem
                .map_mem(addr, BANK_SIZE, Some(self.cart_ram), Some(self.cart_ram));
            return;
        }
        let bank = self.mapper[slot + 1] as usize % self.bank_count;
        log::trace!("slot {slot} <- bank {bank}");
        let region = self.rom.sub(bank * BANK_SIZE, BANK_SIZE);
        self.mem.map_code(addr, BANK_SIZE, region);
        if slot == 0 {
            // the first KiB always shows the RST vectors
            self.mem.map_code(0, VECTORS_SIZE, self.vectors);
        }
    }

    fn write_mapper(&mut self, reg: usize, data: u8) {
        self.mapper[reg] = data;
        match reg {
            0 => self.map_slot(2),
            slot => self.map_slot(slot - 1),
        }
    }
}

impl z80::Bus for SgcBus {
    fn read(&mut self, _time: Time, addr: u16) -> u8 {
        self.mem.read(addr)
    }

    fn write(&mut self, _time: Time, addr: u16, data: u8) {
        self.mem.write(addr, data);
        if addr >= MAPPER_ADDR {
            self.write_mapper((addr - MAPPER_ADDR) as usize, data);
        }
    }

    fn code(&self, addr: u16) -> u8 {
        self.mem.read(addr)
    }

    fn port_in(&mut self, _time: Time, port: u16) -> u8 {
        log::trace!("unmapped IN 0x{:02X}", port as u8);
        0xFF
    }

    fn port_out(&mut self, time: Time, port: u16, data: u8) {
        let port = port as u8;
        if port & 0xC0 == 0x40 {
            self.psg.write_data(time, data, &mut self.mixer);
        } else if port == GG_STEREO_PORT && self.game_gear {
            self.psg.write_stereo(time, data, &mut self.mixer);
        } else {
            log::trace!("unmapped OUT 0x{port:02X} <- 0x{data:02X}");
        }
    }
}

struct SgcCore {
    cpu: Z80,
    bus: SgcBus,
    play_addr: u16,
}

impl GuestMachine for SgcCore {
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

/// Master System or Game Gear with a loaded SGC file.
pub struct SgcMachine {
    core: SgcCore,
    scheduler: PlayScheduler<Registers>,
    file: SgcFile,
    metadata: BasicMetadata,
    warning: WarningSlot,
    reported_errors: u32,
}

impl SgcMachine {
    /// Build the machine for `file`; call [`MachineDriver::start_track`]
    /// before running it.
    pub fn new(file: SgcFile, config: &PlayerConfig) -> Self {
        let header = &file.header;
        let mut mem = MemoryMap::new(PAGE_BITS);
        let ram = mem.alloc(RAM_SIZE, 0);
        let cart_ram = mem.alloc(BANK_SIZE, 0);
        let vectors = mem.alloc(VECTORS_SIZE, 0xFF);

        let load_addr = header.load_addr as usize;
        let bank_count = (load_addr + file.rom.len()).div_ceil(BANK_SIZE).max(1);
        let rom = mem.alloc(bank_count * BANK_SIZE, 0xFF);
        mem.load(rom, load_addr, &file.rom);
        mem.reset(0xFF);

        let mut mixer = new_mixer(config, header.clock_rate(), SmsApu::VOICE_COUNT);
        for voice in 0..SmsApu::VOICE_COUNT {
            mixer.set_voice_gain(voice, SmsApu::VOICE_GAIN);
        }

        let mut metadata = BasicMetadata::new("SGC", header.system.name());
        metadata.title = header.game.clone();
        metadata.author = header.author.clone();
        metadata.copyright = header.copyright.clone();
        metadata.track_count = header.song_count as usize;
        metadata.frame_rate = header.play_rate();

        let scheduler = PlayScheduler::new(header.play_period());
        let play_addr = header.play_addr;
        let game_gear = header.system == SgcSystem::GameGear;
        Self {
            core: SgcCore {
                cpu: Z80::new(),
                bus: SgcBus {
                    mem,
                    ram,
                    cart_ram,
                    vectors,
                    rom,
                    bank_count,
                    mapper: [0; 4],
                    game_gear,
                    psg: SmsApu::new(),
                    mixer,
                },
                play_addr,
            },
            scheduler,
            file,
            metadata,
            warning: WarningSlot::new(),
            reported_errors: 0,
        }
    }

    /// Parsed file this machine plays.
    pub fn file(&self) -> &SgcFile {
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

    fn reset_memory(&mut self) {
        let header = &self.file.header;
        let bus = &mut self.core.bus;
        bus.mem.region_mut(bus.ram).fill(0);
        bus.mem.region_mut(bus.cart_ram).fill(0);

        let vectors = bus.mem.region_mut(bus.vectors);
        vectors.fill(0xFF);
        vectors[IDLE_ADDR as usize] = z80::HALT_OPCODE;
        for (i, target) in header.rst_addrs.iter().enumerate() {
            let at = (i + 1) * 8;
            vectors[at] = 0xC3;
            vectors[at + 1..at + 3].copy_from_slice(&target.to_le_bytes());
        }

        bus.mem.reset(0xFF);
        bus.mem.map_mem(RAM_ADDR, RAM_SIZE, Some(bus.ram), Some(bus.ram));
        bus.mem
            .map_mem(RAM_ADDR + RAM_SIZE as u16, RAM_SIZE, Some(bus.ram), Some(bus.ram));
        bus.mapper = header.mapping;
        for slot in 0..3 {
            bus.map_slot(slot);
        }
    }
}

impl MachineDriver for SgcMachine {
    fn clock_rate(&self) -> u32 {
        self.file.header.clock_rate()
    }

    fn track_count(&self) -> usize {
        self.file.header.song_count as usize
    }

    fn start_track(&mut self, index: usize) -> Result<()> {
        check_track(index, self.track_count())?;
        log::debug!("SGC song {index} on {}", self.file.header.system.name());
        self.reset_memory();

        let bus = &mut self.core.bus;
        bus.mixer.buffer_mut().clear();
        bus.psg.reset(0, 0);

        let cpu = &mut self.core.cpu;
        cpu.reset();
        cpu.regs.sp = self.file.header.stack_ptr;
        cpu.regs.af = (index as u16) << 8 | (cpu.regs.af & 0x00FF);
        let init = self.file.header.init_addr;
        cpu.call(bus, init, IDLE_ADDR);
        self.reported_errors = 0;
        self.scheduler.start();
        Ok(())
    }

    fn end_frame(&mut self, duration: Time) -> Time {
        self.scheduler.end_frame(&mut self.core, duration);
        let bus = &mut self.core.bus;
        bus.psg.end_frame(duration, &mut bus.mixer);
        bus.mixer.end_frame(duration);
        if let Some(w) = self.scheduler.take_warning() {
            self.warning.forward(w);
        }
        let errors = self.core.cpu.error_count();
        if errors > self.reported_errors {
            self.reported_errors = errors;
            self.warning
                .set(format!("{errors} undefined Z80 instructions executed"));
        }
        duration
    }

    fn set_tempo(&mut self, tempo: f64) {
        self.scheduler.set_tempo(tempo);
    }

    fn set_voice_mute(&mut self, mask: u32) {
        self.core.bus.psg.set_mute_mask(mask);
    }

    fn voice_names(&self) -> Vec<&'static str> {
        SmsApu::VOICE_NAMES.to_vec()
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
}
