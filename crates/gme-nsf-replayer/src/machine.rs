//! NES hardware model hosting an NSF music driver.

use gme_chips::{DeltaSink, NesApu, VoiceMixer};
use gme_common::{
    check_track, new_mixer, BasicMetadata, GuestMachine, MachineDriver, PlayScheduler,
    PlayerConfig, Result, Time, WarningSlot,
};
use gme_cpu::mos6502::{self, Mos6502, Registers};
use gme_cpu::{MemoryMap, Region};

use crate::format::NsfFile;

/// Return address of every guest call; holds the halt opcode.
pub const IDLE_ADDR: u16 = 0x5FF6;

const PAGE_BITS: u32 = 11;
const BANK_SIZE: usize = 0x1000;
const RAM_SIZE: usize = 0x800;
const SRAM_ADDR: u16 = 0x6000;
const SRAM_SIZE: usize = 0x2000;
const ROM_ADDR: u16 = 0x8000;
const BANK_SELECT_ADDR: u16 = 0x5FF8;
/// Page holding the idle byte, read-only to the guest.
const HIGH_PAGE_ADDR: u16 = 0x5800;

/// Everything the CPU sees on its bus.
struct NesBus {
    mem: MemoryMap,
    apu: NesApu,
    mixer: VoiceMixer,
    ram: Region,
    sram: Region,
    rom: Region,
    bank_count: usize,
}

impl NesBus {
    fn bank(&self, index: u8) -> Region {
        let wrapped = index as usize % self.bank_count;
        if wrapped != index as usize {
            log::debug!("bank {index} past end of ROM, using bank {wrapped}");
        }
        self.rom.sub(wrapped * BANK_SIZE, BANK_SIZE)
    }

    fn select_bank(&mut self, slot: usize, index: u8) {
        let region = self.bank(index);
        log::trace!("bank slot {slot} <- {index}");
        self.mem
            .map_code(ROM_ADDR + (slot * BANK_SIZE) as u16, BANK_SIZE, region);
    }

    fn end_frame(&mut self, end: Time) {
        let mem = &self.mem;
        self.apu
            .end_frame(end, &mut self.mixer, &mut |addr: u16| mem.read(addr));
        self.mixer.end_frame(end);
    }
}

impl mos6502::Bus for NesBus {
    fn read(&mut self, time: Time, addr: u16) -> u8 {
        if addr == NesApu::STATUS_ADDR {
            let mem = &self.mem;
            return self
                .apu
                .read_status(time, &mut self.mixer, &mut |a: u16| mem.read(a));
        }
        if (0x2000..HIGH_PAGE_ADDR).contains(&addr) {
            // Open bus
            return (addr >> 8) as u8;
        }
        self.mem.read(addr)
    }

    fn write(&mut self, time: Time, addr: u16, data: u8) {
        match addr {
            NesApu::START_ADDR..=NesApu::END_ADDR => {
                let mem = &self.mem;
                self.apu
                    .write_register(time, addr, data, &mut self.mixer, &mut |a: u16| mem.read(a));
            }
            BANK_SELECT_ADDR..=0x5FFF => {
                self.select_bank((addr - BANK_SELECT_ADDR) as usize, data);
            }
            _ => self.mem.write(addr, data),
        }
    }

    fn code(&self, addr: u16) -> u8 {
        self.mem.read(addr)
    }
}

/// CPU and bus together; the part the scheduler drives.
struct NesCore {
    cpu: Mos6502,
    bus: NesBus,
    play_addr: u16,
}

impl GuestMachine for NesCore {
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

/// NES with a loaded NSF file.
pub struct NsfMachine {
    core: NesCore,
    scheduler: PlayScheduler<Registers>,
    file: NsfFile,
    metadata: BasicMetadata,
    warning: WarningSlot,
    reported_errors: u32,
    track: usize,
}

impl NsfMachine {
    /// Build the machine for `file`; call [`MachineDriver::start_track`]
    /// before running it.
    pub fn new(file: NsfFile, config: &PlayerConfig) -> Self {
        let header = &file.header;
        let mut mem = MemoryMap::new(PAGE_BITS);
        let ram = mem.alloc(RAM_SIZE, 0);
        let sram = mem.alloc(SRAM_SIZE, 0);
        let high = mem.alloc(RAM_SIZE, 0);
        mem.region_mut(high)[(IDLE_ADDR - HIGH_PAGE_ADDR) as usize] = mos6502::HALT_OPCODE;

        let pad = header.load_addr as usize % BANK_SIZE;
        let bank_count = (pad + file.rom.len()).div_ceil(BANK_SIZE).max(1);
        let rom = mem.alloc(bank_count * BANK_SIZE, 0);
        mem.load(rom, pad, &file.rom);

        mem.reset(mos6502::HALT_OPCODE);
        for mirror in 0..4 {
            mem.map_mem((mirror * RAM_SIZE) as u16, RAM_SIZE, Some(ram), Some(ram));
        }
        mem.map_code(HIGH_PAGE_ADDR, RAM_SIZE, high);
        mem.map_mem(SRAM_ADDR, SRAM_SIZE, Some(sram), Some(sram));

        let mut mixer = new_mixer(config, header.clock_rate(), NesApu::VOICE_COUNT);
        for (voice, gain) in NesApu::VOICE_GAINS.iter().enumerate() {
            mixer.set_voice_gain(voice, *gain);
        }

        let mut warning = WarningSlot::new();
        let expansion = header.expansion_chips();
        if !expansion.is_empty() {
            warning.set(format!(
                "expansion audio not emulated: {}",
                expansion.join(", ")
            ));
        }
        if header.load_addr < ROM_ADDR {
            warning.set(format!("load address 0x{:04X} is too low", header.load_addr));
        }

        let mut metadata = BasicMetadata::new("NSF", "Nintendo NES");
        metadata.title = header.game.clone();
        metadata.author = header.author.clone();
        metadata.copyright = header.copyright.clone();
        metadata.track_count = header.track_count as usize;
        metadata.frame_rate = header.play_rate();

        let scheduler = PlayScheduler::new(header.play_period());
        let play_addr = header.play_addr;
        Self {
            core: NesCore {
                cpu: Mos6502::new(),
                bus: NesBus {
                    mem,
                    apu: NesApu::new(),
                    mixer,
                    ram,
                    sram,
                    rom,
                    bank_count,
                },
                play_addr,
            },
            scheduler,
            file,
            metadata,
            warning,
            reported_errors: 0,
            track: 0,
        }
    }

    /// Parsed file this machine plays.
    pub fn file(&self) -> &NsfFile {
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

    /// CPU clock within the current frame.
    pub fn cpu_time(&self) -> Time {
        self.core.cpu.time()
    }

    /// Byte visible to the CPU at `addr`.
    pub fn peek(&self, addr: u16) -> u8 {
        self.core.bus.mem.read(addr)
    }

    fn map_initial_banks(&mut self) {
        let header = &self.file.header;
        let banks = if header.uses_bank_switching() {
            header.banks
        } else {
            let first = (header.load_addr.max(ROM_ADDR) - ROM_ADDR) as usize / BANK_SIZE;
            let mut banks = [0u8; 8];
            for (slot, bank) in banks.iter_mut().enumerate() {
                *bank = slot.checked_sub(first).unwrap_or(0) as u8;
            }
            banks
        };
        for (slot, bank) in banks.into_iter().enumerate() {
            self.core.bus.select_bank(slot, bank);
        }
    }
}

impl MachineDriver for NsfMachine {
    fn clock_rate(&self) -> u32 {
        self.file.header.clock_rate()
    }

    fn track_count(&self) -> usize {
        self.file.header.track_count as usize
    }

    fn start_track(&mut self, index: usize) -> Result<()> {
        check_track(index, self.track_count())?;
        self.track = index;
        let pal = self.file.header.pal_only();
        log::debug!("NSF track {} ({})", index + 1, if pal { "PAL" } else { "NTSC" });

        let bus = &mut self.core.bus;
        bus.mem.region_mut(bus.ram).fill(0);
        bus.mem.region_mut(bus.sram).fill(0);
        self.map_initial_banks();

        let bus = &mut self.core.bus;
        bus.mixer.buffer_mut().clear();
        bus.apu.reset(pal, 0);
        let mem = &bus.mem;
        let mut dmc = |a: u16| mem.read(a);
        bus.apu.write_register(0, NesApu::STATUS_ADDR, 0x0F, &mut bus.mixer, &mut dmc);
        bus.apu.write_register(0, 0x4017, 0x00, &mut bus.mixer, &mut dmc);

        let cpu = &mut self.core.cpu;
        cpu.reset();
        cpu.regs.a = index as u8;
        cpu.regs.x = pal as u8;
        let init = self.file.header.init_addr;
        cpu.call(bus, init, IDLE_ADDR);
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
        self.core.bus.apu.set_mute_mask(mask);
    }

    fn voice_names(&self) -> Vec<&'static str> {
        NesApu::VOICE_NAMES.to_vec()
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{chips, NsfHeader};

    fn file(rom: Vec<u8>, banks: [u8; 8], load_addr: u16) -> NsfFile {
        NsfFile {
            header: NsfHeader {
                version: 1,
                track_count: 2,
                first_track: 1,
                load_addr,
                init_addr: load_addr,
                play_addr: load_addr.wrapping_add(3),
                game: "Test".into(),
                author: String::new(),
                copyright: String::new(),
                ntsc_speed: 16_666,
                banks,
                pal_speed: 0,
                speed_flags: 0,
                chip_flags: 0,
            },
            rom,
        }
    }

    #[test]
    fn implicit_banks_follow_load_address() {
        let mut rom = vec![0xEA; 0x2000];
        rom[0] = 0x60;
        rom[0x1000] = 0x42;
        let mut m = NsfMachine::new(file(rom, [0; 8], 0xA000), &PlayerConfig::default());
        m.start_track(0).unwrap();
        assert_eq!(m.peek(0xA000), 0x60);
        assert_eq!(m.peek(0xB000), 0x42);
    }

    #[test]
    fn bank_registers_switch_rom() {
        let mut rom = vec![0u8; 0x3000];
        rom[0x2000] = 0x33;
        rom[0] = 0x60;
        let banks = [0, 1, 2, 0, 0, 0, 0, 0];
        let mut m = NsfMachine::new(file(rom, banks, 0x8000), &PlayerConfig::default());
        m.start_track(0).unwrap();
        assert_eq!(m.peek(0xA000), 0x33);
        mos6502::Bus::write(&mut m.core.bus, 0, 0x5FF8, 2);
        assert_eq!(m.peek(0x8000), 0x33);
        mos6502::Bus::write(&mut m.core.bus, 0, 0x5FF8, 2);
        assert_eq!(m.peek(0x8000), 0x33);
    }

    #[test]
    fn bank_past_end_wraps_modulo_rom_size() {
        let mut rom = vec![0u8; 0x3000];
        rom[0x1000] = 0x22;
        rom[0x2000] = 0x33;
        let mut m = NsfMachine::new(file(rom, [0, 1, 2, 0, 0, 0, 0, 0], 0x8000), &PlayerConfig::default());
        m.start_track(0).unwrap();
        mos6502::Bus::write(&mut m.core.bus, 0, 0x5FF8, 4);
        assert_eq!(m.peek(0x8000), 0x22);
        mos6502::Bus::write(&mut m.core.bus, 0, 0x5FF8, 0xFE);
        assert_eq!(m.peek(0x8000), 0x33);
    }

    #[test]
    fn idle_byte_is_halt_and_read_only() {
        let mut m = NsfMachine::new(file(vec![0x60], [0; 8], 0x8000), &PlayerConfig::default());
        m.start_track(0).unwrap();
        assert_eq!(m.peek(IDLE_ADDR), mos6502::HALT_OPCODE);
        mos6502::Bus::write(&mut m.core.bus, 0, IDLE_ADDR, 0xEA);
        assert_eq!(m.peek(IDLE_ADDR), mos6502::HALT_OPCODE);
    }

    #[test]
    fn ram_is_mirrored() {
        let mut m = NsfMachine::new(file(vec![0x60], [0; 8], 0x8000), &PlayerConfig::default());
        m.start_track(0).unwrap();
        mos6502::Bus::write(&mut m.core.bus, 0, 0x0012, 0x77);
        assert_eq!(m.peek(0x0812), 0x77);
        assert_eq!(m.peek(0x1812), 0x77);
    }

    #[test]
    fn init_receives_track_and_region() {
        let mut m = NsfMachine::new(file(vec![0x60], [0; 8], 0x8000), &PlayerConfig::default());
        m.start_track(1).unwrap();
        assert_eq!(m.core.cpu.regs.a, 1);
        assert_eq!(m.core.cpu.regs.x, 0);
        assert_eq!(m.pc(), 0x8000);
        assert!(m.start_track(2).is_err());
    }

    #[test]
    fn expansion_chips_produce_warning() {
        let mut f = file(vec![0x60], [0; 8], 0x8000);
        f.header.chip_flags = chips::VRC6;
        let mut m = NsfMachine::new(f, &PlayerConfig::default());
        assert!(m.take_warning().unwrap().contains("expansion"));
    }
}
