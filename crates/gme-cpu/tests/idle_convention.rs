//! Guest subroutine calls through a paged memory map.

use gme_cpu::{mos6502, z80, MemoryMap, Time};

struct PagedBus {
    map: MemoryMap,
}

impl mos6502::Bus for PagedBus {
    fn read(&mut self, _time: Time, addr: u16) -> u8 {
        self.map.read(addr)
    }
    fn write(&mut self, _time: Time, addr: u16, data: u8) {
        self.map.write(addr, data);
    }
    fn code(&self, addr: u16) -> u8 {
        self.map.read(addr)
    }
}

impl z80::Bus for PagedBus {
    fn read(&mut self, _time: Time, addr: u16) -> u8 {
        self.map.read(addr)
    }
    fn write(&mut self, _time: Time, addr: u16, data: u8) {
        self.map.write(addr, data);
    }
    fn code(&self, addr: u16) -> u8 {
        self.map.read(addr)
    }
    fn port_in(&mut self, _time: Time, _port: u16) -> u8 {
        0xFF
    }
    fn port_out(&mut self, _time: Time, _port: u16, _data: u8) {}
}

/// 6502 layout: 2 KiB RAM at 0, code page at 0x8000, everything else
/// unmapped and reading as the halt opcode.
fn nes_like(code: &[u8]) -> PagedBus {
    let mut map = MemoryMap::new(11);
    let ram = map.alloc(0x800, 0);
    let rom = map.alloc(0x1000, 0);
    map.load(rom, 0, code);
    map.reset(mos6502::HALT_OPCODE);
    map.map_mem(0x0000, 0x800, Some(ram), Some(ram));
    map.map_code(0x8000, 0x1000, rom);
    PagedBus { map }
}

const IDLE_6502: u16 = 0x5FF6;

#[test]
fn returning_6502_routine_stops_on_idle() {
    let mut bus = nes_like(&[0xA9, 0x01, 0x60]);
    let mut cpu = mos6502::Mos6502::new();
    cpu.regs.sp = 0xFF;
    cpu.call(&mut bus, 0x8000, IDLE_6502);
    assert!(cpu.run(100_000, &mut bus));
    assert_eq!(cpu.regs.pc, IDLE_6502);
    assert_eq!(cpu.regs.a, 1);
}

#[test]
fn endless_6502_routine_never_reaches_idle() {
    // JMP $8000
    let mut bus = nes_like(&[0x4C, 0x00, 0x80]);
    let mut cpu = mos6502::Mos6502::new();
    cpu.call(&mut bus, 0x8000, IDLE_6502);
    assert!(!cpu.run(100_000, &mut bus));
    assert_ne!(cpu.regs.pc, IDLE_6502);
    assert!(cpu.time() >= 100_000);
}

#[test]
fn returning_z80_routine_stops_on_idle() {
    let mut map = MemoryMap::new(10);
    let ram = map.alloc(0x10000, 0);
    map.reset(0xFF);
    map.map_mem(0x0000, 0x10000, Some(ram), Some(ram));
    map.write(0x4000, 0xC9);
    map.write(0xFFFF, z80::HALT_OPCODE);
    let mut bus = PagedBus { map };

    let mut cpu = z80::Z80::new();
    cpu.regs.sp = 0xF380;
    cpu.call(&mut bus, 0x4000, 0xFFFF);
    assert!(cpu.run(100_000, &mut bus));
    assert_eq!(cpu.regs.pc, 0xFFFF);
    assert_eq!(cpu.regs.sp, 0xF380);
}

#[test]
fn z80_stack_wraps_at_top_of_memory() {
    let mut map = MemoryMap::new(10);
    let ram = map.alloc(0x10000, 0);
    map.reset(0xFF);
    map.map_mem(0x0000, 0x10000, Some(ram), Some(ram));
    map.write(0x1000, 0xC9);
    map.write(0x2000, z80::HALT_OPCODE);
    let mut bus = PagedBus { map };

    let mut cpu = z80::Z80::new();
    cpu.regs.sp = 0x0001;
    cpu.call(&mut bus, 0x1000, 0x2000);
    assert_eq!(cpu.regs.sp, 0xFFFF);
    assert!(cpu.run(1000, &mut bus));
    assert_eq!(cpu.regs.pc, 0x2000);
    assert_eq!(cpu.regs.sp, 0x0001);
}
