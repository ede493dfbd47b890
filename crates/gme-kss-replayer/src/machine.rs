//! MSX / Master System model hosting a KSS music driver.

use gme_chips::{AyApu, DeltaSink, SccApu, SmsApu, VoiceMixer};
use gme_common::{
    check_track, new_mixer, BasicMetadata, GuestMachine, MachineDriver, PlayScheduler,
    PlayerConfig, Result, Time, WarningSlot,
};
use gme_cpu::z80::{self, Registers, Z80};
use gme_cpu::{MemoryMap, Region};

use crate::format::{KssFile, CLOCK_RATE};

/// Return address of every guest call; holds the halt opcode.
pub const IDLE_ADDR: u16 = 0xFFFF;

const PAGE_BITS: u32 = 13;
const BANK_ADDR: u16 = 0x8000;
const STACK_TOP: u16 = 0xF380;
const AY_CLOCK_RATIO: u32 = 2;

/// `WRTPSG` at 0x0001 and `RDPSG` at 0x0009.
const BIOS: [u8; 13] = [
    0xD3, 0xA0, 0xF5, 0x7B, 0xD3, 0xA1, 0xF1, 0xC9, // OUT (A0),A; PUSH AF; LD A,E; OUT (A1),A; POP AF; RET
    0xD3, 0xA0, 0xDB, 0xA2, 0xC9, // OUT (A0),A; IN A,(A2); RET
];
/// Jump table entries at 0x0093.
const BIOS_VECTORS: [u8; 6] = [0xC3, 0x01, 0x00, 0xC3, 0x09, 0x00];
const BIOS_VECTOR_ADDR: usize = 0x93;

const MSX_VOICE_NAMES: [&str; 8] = [
    "Square 1", "Square 2", "Square 3", "Wave 1", "Wave 2", "Wave 3", "Wave 4", "Wave 5",
];

mod port {
    pub const AY_LATCH: u8 = 0xA0;
    pub const AY_DATA: u8 = 0xA1;
    pub const AY_READ: u8 = 0xA2;
    pub const SMS_PSG: u8 = 0x7E;
    pub const SMS_PSG_MIRROR: u8 = 0x7F;
    pub const GG_STEREO: u8 = 0x06;
    pub const BANK: u8 = 0xFE;
}

struct KssBus {
    mem: MemoryMap,
    ram: Region,
    rom: Region,
    bank_size: usize,
    bank_count: usize,
    first_bank: u8,
    sms: bool,
    ay: AyApu,
    scc: SccApu,
    psg: SmsApu,
    mixer: VoiceMixer,
    scc_accessed: bool,
}

impl KssBus {
    /// Map bank `physical` into slot `logical`; unknown banks expose RAM.
    fn set_bank(&mut self, logical: usize, physical: u8) {
        let mut addr = BANK_ADDR;
        if logical != 0 && self.bank_size == 0x2000 {
            addr = 0xA000;
        }
        let index = physical.wrapping_sub(self.first_bank) as usize;
        if index >= self.bank_count {
            log::trace!("bank slot {logical} <- {physical} (RAM)");
            let ram = self.ram.sub(addr as usize, self.bank_size);
            self.mem.map_mem(addr, self.bank_size, Some(ram), Some(ram));
        } else {
            log::trace!("bank slot {logical} <- {physical}");
            let bank = self.rom.sub(index * self.bank_size, self.bank_size);
            self.mem.map_mem(addr, self.bank_size, None, Some(bank));
        }
    }

    fn end_frame(&mut self, end: Time) {
        if self.sms {
            self.psg.end_frame(end, &mut self.mixer);
        } else {
            self.ay.end_frame(end, &mut self.mixer);
            self.scc.end_frame(end, &mut self.mixer);
        }
        self.mixer.end_frame(end);
    }
}

impl z80::Bus for KssBus {
    fn read(&mut self, _time: Time, addr: u16) -> u8 {
        self.mem.read(addr)
    }

    fn write(&mut self, time: Time, addr: u16, data: u8) {
        self.mem.write(addr, data);
        if self.sms || addr & 0xC000 != 0x8000 {
            return;
        }
        match addr {
            0x9000 => return self.set_bank(0, data),
            0xB000 => return self.set_bank(1, data),
            // SCC/SCC+ mode select; both areas always answer
            0xBFFE => return,
            _ => {}
        }
        let offset = (addr & 0xDFFF) as usize;
        if !(0x9800..0x98B0).contains(&offset) {
            return;
        }
        let mut reg = offset - 0x9800;
        if reg >= 0xA0 {
            reg -= 0x20;
        }
        self.scc_accessed = true;
        self.scc.write_register(time, reg, data, &mut self.mixer);
    }

    fn code(&self, addr: u16) -> u8 {
        self.mem.read(addr)
    }

    fn port_in(&mut self, _time: Time, port: u16) -> u8 {
        match port as u8 {
            port::AY_READ if !self.sms => self.ay.read_data(),
            p => {
                log::trace!("unmapped IN 0x{p:02X}");
                0xFF
            }
        }
    }

    fn port_out(&mut self, time: Time, port: u16, data: u8) {
        match port as u8 {
            port::AY_LATCH if !self.sms => self.ay.select(data),
            port::AY_DATA if !self.sms => self.ay.write_data(time, data, &mut self.mixer),
            port::SMS_PSG | port::SMS_PSG_MIRROR if self.sms => {
                self.psg.write_data(time, data, &mut self.mixer)
            }
            port::GG_STEREO if self.sms => self.psg.write_stereo(time, data, &mut self.mixer),
            port::BANK => self.set_bank(0, data),
            p => log::trace!("unmapped OUT 0x{p:02X} <- 0x{data:02X}"),
        }
    }
}

struct KssCore {
    cpu: Z80,
    bus: KssBus,
    play_addr: u16,
}

impl GuestMachine for KssCore {
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

/// MSX or Master System with a loaded KSS file.
pub struct KssMachine {
    core: KssCore,
    scheduler: PlayScheduler<Registers>,
    file: KssFile,
    metadata: BasicMetadata,
    warning: WarningSlot,
    reported_errors: u32,
}

impl KssMachine {
    /// Build the machine for `file`; call [`MachineDriver::start_track`]
    /// before running it.
    pub fn new(file: KssFile, config: &PlayerConfig) -> Self {
        let header = &file.header;
        let bank_size = header.bank_size();
        let sms = header.uses_sn76489();

        let mut mem = MemoryMap::new(PAGE_BITS);
        let ram = mem.alloc(0x10000, 0);
        let rom = mem.alloc(file.bank_count.max(1) * bank_size, 0xFF);
        mem.load(rom, 0, &file.bank_data);
        mem.reset(0xFF);

        let mut ay = AyApu::new(CLOCK_RATE, AY_CLOCK_RATIO);
        let mut scc = SccApu::new(CLOCK_RATE);
        scc.set_voice_base(AyApu::VOICE_COUNT);
        let psg = SmsApu::new();

        let voices = if sms {
            SmsApu::VOICE_COUNT
        } else {
            MSX_VOICE_NAMES.len()
        };
        let mut mixer = new_mixer(config, CLOCK_RATE, voices);
        if sms {
            for voice in 0..SmsApu::VOICE_COUNT {
                mixer.set_voice_gain(voice, SmsApu::VOICE_GAIN);
            }
        } else {
            for voice in 0..AyApu::VOICE_COUNT {
                mixer.set_voice_gain(voice, AyApu::VOICE_GAIN);
            }
            for voice in 0..SccApu::VOICE_COUNT {
                mixer.set_voice_gain(AyApu::VOICE_COUNT + voice, SccApu::VOICE_GAIN);
            }
        }
        ay.set_voice_base(0);

        let mut warning = WarningSlot::new();
        if let Some(w) = file.warnings.last() {
            warning.forward(w.clone());
        }
        let fm = header.fm_chips();
        if !fm.is_empty() {
            warning.set(format!("FM sound not emulated: {}", fm.join(", ")));
        }

        let mut metadata = BasicMetadata::new("KSS", header.system());
        metadata.track_count = header.track_count();
        metadata.frame_rate = header.play_rate();

        let scheduler = PlayScheduler::new(header.play_period());
        let play_addr = header.play_addr;
        let first_bank = header.first_bank;
        let bank_count = file.bank_count;
        Self {
            core: KssCore {
                cpu: Z80::new(),
                bus: KssBus {
                    mem,
                    ram,
                    rom,
                    bank_size,
                    bank_count,
                    first_bank,
                    sms,
                    ay,
                    scc,
                    psg,
                    mixer,
                    scc_accessed: false,
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
    pub fn file(&self) -> &KssFile {
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

    /// True once the guest has written an SCC register this track.
    pub fn scc_accessed(&self) -> bool {
        self.core.bus.scc_accessed
    }

    fn load_ram(&mut self) {
        let bus = &mut self.core.bus;
        let ram = bus.mem.region_mut(bus.ram);
        ram[..0x4000].fill(0xC9);
        ram[0x4000..].fill(0);
        ram[1..1 + BIOS.len()].copy_from_slice(&BIOS);
        ram[BIOS_VECTOR_ADDR..BIOS_VECTOR_ADDR + BIOS_VECTORS.len()]
            .copy_from_slice(&BIOS_VECTORS);

        let load_addr = self.file.header.load_addr as usize;
        bus.mem.load(bus.ram, load_addr, &self.file.load_data);
        bus.mem.region_mut(bus.ram)[IDLE_ADDR as usize] = z80::HALT_OPCODE;
        bus.mem.map_mem(0, 0x10000, Some(bus.ram), Some(bus.ram));
    }
}

impl MachineDriver for KssMachine {
    fn clock_rate(&self) -> u32 {
        CLOCK_RATE
    }

    fn track_count(&self) -> usize {
        self.file.header.track_count()
    }

    fn start_track(&mut self, index: usize) -> Result<()> {
        check_track(index, self.track_count())?;
        log::debug!("KSS track {} on {}", index, self.file.header.system());
        self.load_ram();

        let bus = &mut self.core.bus;
        bus.mixer.buffer_mut().clear();
        bus.ay.reset();
        bus.scc.reset();
        bus.psg.reset(0, 0);
        bus.scc_accessed = false;

        let cpu = &mut self.core.cpu;
        cpu.reset();
        cpu.regs.sp = STACK_TOP;
        cpu.regs.af = (index as u16) << 8 | (cpu.regs.af & 0x00FF);
        cpu.regs.hl &= 0x00FF;
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
                .set(format!("{errors} undefined Z80 instructions executed"));
        }
        duration
    }

    fn set_tempo(&mut self, tempo: f64) {
        self.scheduler.set_tempo(tempo);
    }

    fn set_voice_mute(&mut self, mask: u32) {
        let bus = &mut self.core.bus;
        if bus.sms {
            bus.psg.set_mute_mask(mask);
        } else {
            bus.ay.set_mute_mask(mask & 0x07);
            bus.scc.set_mute_mask(mask >> AyApu::VOICE_COUNT);
        }
    }

    fn voice_names(&self) -> Vec<&'static str> {
        if self.core.bus.sms {
            SmsApu::VOICE_NAMES.to_vec()
        } else {
            MSX_VOICE_NAMES.to_vec()
        }
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
    use crate::format::{DeviceFlags, KssHeader, KssVariant};
    use gme_cpu::z80::Bus;

    fn file(load: Vec<u8>, banks: Vec<u8>, bank_mode: u8, flags: DeviceFlags) -> KssFile {
        let header = KssHeader {
            variant: KssVariant::Kscc,
            load_addr: 0x4000,
            load_size: load.len() as u16,
            init_addr: 0x4000,
            play_addr: 0x4001,
            first_bank: 2,
            bank_mode,
            extra_header: 0,
            device_flags: flags,
            first_track_index: 0,
            last_track_index: 0,
        };
        let bank_count = banks.len().div_ceil(header.bank_size());
        KssFile {
            header,
            load_data: load,
            bank_data: banks,
            bank_count,
            warnings: Vec::new(),
        }
    }

    fn machine(bank_mode: u8, flags: DeviceFlags) -> KssMachine {
        let mut banks = vec![0u8; 0x4000];
        banks[0] = 0x11;
        banks[0x2000] = 0x22;
        let mut m = KssMachine::new(
            file(vec![0xC9, 0xC9], banks, bank_mode, flags),
            &PlayerConfig::default(),
        );
        m.start_track(3).unwrap();
        m
    }

    #[test]
    fn bios_and_idle_are_installed() {
        let m = machine(0x82, DeviceFlags::empty());
        assert_eq!(m.peek(0x0001), 0xD3);
        assert_eq!(m.peek(0x0093), 0xC3);
        assert_eq!(m.peek(0x0094), 0x01);
        assert_eq!(m.peek(0x0097), 0x09);
        assert_eq!(m.peek(0x3000), 0xC9);
        assert_eq!(m.peek(0x4000), 0xC9);
        assert_eq!(m.peek(IDLE_ADDR), z80::HALT_OPCODE);
        assert_eq!(m.core.cpu.regs.af >> 8, 3);
        assert_eq!(m.core.cpu.regs.sp, STACK_TOP - 2);
        assert_eq!(m.pc(), 0x4000);
    }

    #[test]
    fn eight_k_banks_switch_through_scc_registers() {
        let mut m = machine(0x82, DeviceFlags::empty());
        m.core.bus.write(0, 0x9000, 3);
        assert_eq!(m.peek(0x8000), 0x22);
        m.core.bus.write(0, 0xB000, 2);
        assert_eq!(m.peek(0xA000), 0x11);
        // Bank outside the file falls back to RAM.
        m.core.bus.write(0, 0xB000, 9);
        m.core.bus.write(0, 0xA123, 0x5A);
        assert_eq!(m.peek(0xA123), 0x5A);
    }

    #[test]
    fn sixteen_k_bank_through_port() {
        let mut m = machine(0x01, DeviceFlags::empty());
        m.core.bus.port_out(0, 0x00FE, 2);
        assert_eq!(m.peek(0x8000), 0x11);
        assert_eq!(m.peek(0xA000), 0x22);
        // ROM ignores writes.
        m.core.bus.write(0, 0x8000, 0x00);
        assert_eq!(m.peek(0x8000), 0x11);
    }

    #[test]
    fn scc_writes_are_routed() {
        let mut m = machine(0x82, DeviceFlags::empty());
        assert!(!m.scc_accessed());
        m.core.bus.write(0, 0x988F, 0x1F);
        assert!(m.scc_accessed());
        assert_eq!(m.core.bus.scc.read_register(0x8F), 0x1F);
        m.core.bus.write(0, 0xB8AA, 0x0F);
        assert_eq!(m.core.bus.scc.read_register(0x8A), 0x0F);
    }

    #[test]
    fn sms_mode_uses_psg_ports_and_voices() {
        let mut m = machine(0x82, DeviceFlags::SN76489);
        assert_eq!(m.voice_names().len(), 4);
        m.core.bus.port_out(0, 0x00A0, 7);
        assert_eq!(m.core.bus.ay.latch(), 0);
        m.core.bus.write(0, 0x988F, 0x1F);
        assert!(!m.scc_accessed());
        assert_eq!(m.metadata().system, "Sega Master System");
    }

    #[test]
    fn fm_flags_warn() {
        let mut m = machine(0x82, DeviceFlags::FM_UNIT);
        assert!(m.take_warning().unwrap().contains("FM-PAC"));
    }
}
