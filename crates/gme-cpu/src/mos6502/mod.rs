//! NMOS 6502 interpreter.
//!
//! One call to [`Mos6502::run`] executes whole instructions until the clock
//! reaches the end time or the CPU is about to fetch [`HALT_OPCODE`]. The
//! opcode's base cost is charged before it executes, so memory and I/O
//! accesses see the time at the end of their instruction.
//!
//! Decimal mode is only honoured when enabled (the NES 2A03 has no BCD unit).

mod registers;
mod timing;

pub use registers::{Registers, Status};

use crate::Time;
use timing::{unsupported_len, CYCLES};

/// Opcode that stops [`Mos6502::run`].
///
/// `0x22` is a JAM on real hardware, so guest code never executes it on
/// purpose. Machine drivers fill their idle address with it.
pub const HALT_OPCODE: u8 = 0x22;

/// Memory and I/O seen by the 6502.
pub trait Bus {
    /// Data read at `addr` (may hit I/O registers).
    fn read(&mut self, time: Time, addr: u16) -> u8;
    /// Data write at `addr` (may hit I/O registers).
    fn write(&mut self, time: Time, addr: u16, data: u8);
    /// Opcode and operand fetch, never routed to I/O.
    fn code(&self, addr: u16) -> u8;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Imm,
    Zp,
    ZpX,
    ZpY,
    Abs,
    AbsX,
    AbsY,
    IndX,
    IndY,
}

/// Addressing mode by opcode column (bits 2-4) for the ALU and RMW groups.
const COLUMN_MODES: [Mode; 8] = [
    Mode::IndX,
    Mode::Zp,
    Mode::Imm,
    Mode::Abs,
    Mode::IndY,
    Mode::ZpX,
    Mode::AbsY,
    Mode::AbsX,
];

fn column_mode(opcode: u8) -> Mode {
    COLUMN_MODES[((opcode >> 2) & 7) as usize]
}

/// 6502 CPU state and clock.
#[derive(Debug, Clone)]
pub struct Mos6502 {
    /// Register file.
    pub regs: Registers,
    time: Time,
    end_time: Time,
    error_count: u32,
    decimal_enabled: bool,
}

impl Default for Mos6502 {
    fn default() -> Self {
        Self::new()
    }
}

impl Mos6502 {
    /// A CPU in reset state without BCD arithmetic.
    pub fn new() -> Self {
        Self {
            regs: Registers::default(),
            time: 0,
            end_time: 0,
            error_count: 0,
            decimal_enabled: false,
        }
    }

    /// Enable or disable decimal-mode ADC/SBC.
    pub fn set_decimal_enabled(&mut self, enabled: bool) {
        self.decimal_enabled = enabled;
    }

    /// Clear registers, clocks and the error counter.
    pub fn reset(&mut self) {
        self.regs = Registers::default();
        self.time = 0;
        self.end_time = 0;
        self.error_count = 0;
    }

    /// Elapsed clocks in the current frame.
    pub fn time(&self) -> Time {
        self.time
    }

    /// Move the clock to `time`.
    pub fn set_time(&mut self, time: Time) {
        self.time = time;
    }

    /// Shift the clock by `delta`, used for frame rebasing.
    pub fn adjust_time(&mut self, delta: Time) {
        self.time += delta;
        self.end_time += delta;
    }

    /// Current slice bound.
    pub fn end_time(&self) -> Time {
        self.end_time
    }

    /// Change the slice bound.
    pub fn set_end_time(&mut self, end_time: Time) {
        self.end_time = end_time;
    }

    /// Number of unsupported opcodes executed since reset.
    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    /// Push `value` on the hardware stack.
    pub fn push<B: Bus>(&mut self, bus: &mut B, value: u8) {
        bus.write(self.time, 0x100 | self.regs.sp as u16, value);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
    }

    /// Pull a byte from the hardware stack.
    pub fn pull<B: Bus>(&mut self, bus: &mut B) -> u8 {
        self.regs.sp = self.regs.sp.wrapping_add(1);
        bus.read(self.time, 0x100 | self.regs.sp as u16)
    }

    /// Set up a subroutine call to `entry` that returns to `return_to`.
    ///
    /// Pushes `return_to - 1` the way JSR does, so RTS lands exactly on it.
    pub fn call<B: Bus>(&mut self, bus: &mut B, entry: u16, return_to: u16) {
        let ret = return_to.wrapping_sub(1);
        self.push(bus, (ret >> 8) as u8);
        self.push(bus, ret as u8);
        self.regs.pc = entry;
    }

    /// Run until `time >= end_time` or the next opcode is [`HALT_OPCODE`].
    ///
    /// Returns `true` when stopped on the halt opcode. PC is left pointing
    /// at it and the clock is not advanced.
    pub fn run<B: Bus>(&mut self, end_time: Time, bus: &mut B) -> bool {
        self.end_time = end_time;
        while self.time < self.end_time {
            let opcode = bus.code(self.regs.pc);
            if opcode == HALT_OPCODE {
                return true;
            }
            self.step(bus, opcode);
        }
        false
    }

    fn step<B: Bus>(&mut self, bus: &mut B, opcode: u8) {
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.time += CYCLES[opcode as usize] as Time;

        if let Some(len) = unsupported_len(opcode) {
            self.error_count += 1;
            log::trace!(
                "unsupported 6502 opcode 0x{opcode:02X} at 0x{:04X}",
                self.regs.pc.wrapping_sub(1)
            );
            self.regs.pc = self.regs.pc.wrapping_add(len - 1);
            return;
        }

        match opcode {
            // Flow control
            0x00 => {
                let ret = self.regs.pc.wrapping_add(1);
                self.push(bus, (ret >> 8) as u8);
                self.push(bus, ret as u8);
                let p = (self.regs.status | Status::B | Status::R).bits();
                self.push(bus, p);
                self.regs.status.insert(Status::I);
                self.regs.pc = self.read16(bus, 0xFFFE);
            }
            0x20 => {
                let target = self.fetch16(bus);
                let ret = self.regs.pc.wrapping_sub(1);
                self.push(bus, (ret >> 8) as u8);
                self.push(bus, ret as u8);
                self.regs.pc = target;
            }
            0x40 => {
                let p = self.pull(bus);
                self.regs.status = Status::from_bits_retain(p & !Status::B.bits()) | Status::R;
                let lo = self.pull(bus) as u16;
                let hi = self.pull(bus) as u16;
                self.regs.pc = hi << 8 | lo;
            }
            0x60 => {
                let lo = self.pull(bus) as u16;
                let hi = self.pull(bus) as u16;
                self.regs.pc = (hi << 8 | lo).wrapping_add(1);
            }
            0x4C => self.regs.pc = self.fetch16(bus),
            0x6C => {
                let ptr = self.fetch16(bus);
                let lo = bus.read(self.time, ptr) as u16;
                let hi = bus.read(self.time, (ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF)) as u16;
                self.regs.pc = hi << 8 | lo;
            }

            // Branches
            0x10 => self.branch(bus, !self.regs.status.contains(Status::N)),
            0x30 => self.branch(bus, self.regs.status.contains(Status::N)),
            0x50 => self.branch(bus, !self.regs.status.contains(Status::V)),
            0x70 => self.branch(bus, self.regs.status.contains(Status::V)),
            0x90 => self.branch(bus, !self.regs.status.contains(Status::C)),
            0xB0 => self.branch(bus, self.regs.status.contains(Status::C)),
            0xD0 => self.branch(bus, !self.regs.status.contains(Status::Z)),
            0xF0 => self.branch(bus, self.regs.status.contains(Status::Z)),

            // Stack
            0x08 => {
                let p = (self.regs.status | Status::B | Status::R).bits();
                self.push(bus, p);
            }
            0x28 => {
                let p = self.pull(bus);
                self.regs.status = Status::from_bits_retain(p & !Status::B.bits()) | Status::R;
            }
            0x48 => self.push(bus, self.regs.a),
            0x68 => {
                self.regs.a = self.pull(bus);
                self.regs.set_nz(self.regs.a);
            }

            // Flags
            0x18 => self.regs.status.remove(Status::C),
            0x38 => self.regs.status.insert(Status::C),
            0x58 => self.regs.status.remove(Status::I),
            0x78 => self.regs.status.insert(Status::I),
            0xB8 => self.regs.status.remove(Status::V),
            0xD8 => self.regs.status.remove(Status::D),
            0xF8 => self.regs.status.insert(Status::D),

            // Register transfers and counters
            0x88 => {
                self.regs.y = self.regs.y.wrapping_sub(1);
                self.regs.set_nz(self.regs.y);
            }
            0xC8 => {
                self.regs.y = self.regs.y.wrapping_add(1);
                self.regs.set_nz(self.regs.y);
            }
            0xCA => {
                self.regs.x = self.regs.x.wrapping_sub(1);
                self.regs.set_nz(self.regs.x);
            }
            0xE8 => {
                self.regs.x = self.regs.x.wrapping_add(1);
                self.regs.set_nz(self.regs.x);
            }
            0xA8 => {
                self.regs.y = self.regs.a;
                self.regs.set_nz(self.regs.y);
            }
            0x98 => {
                self.regs.a = self.regs.y;
                self.regs.set_nz(self.regs.a);
            }
            0xAA => {
                self.regs.x = self.regs.a;
                self.regs.set_nz(self.regs.x);
            }
            0x8A => {
                self.regs.a = self.regs.x;
                self.regs.set_nz(self.regs.a);
            }
            0xBA => {
                self.regs.x = self.regs.sp;
                self.regs.set_nz(self.regs.x);
            }
            0x9A => self.regs.sp = self.regs.x,

            // BIT
            0x24 | 0x2C => {
                let mode = if opcode == 0x24 { Mode::Zp } else { Mode::Abs };
                let v = self.operand(bus, mode);
                self.regs.status.set(Status::Z, self.regs.a & v == 0);
                self.regs.status.set(Status::N, v & 0x80 != 0);
                self.regs.status.set(Status::V, v & 0x40 != 0);
            }

            // Y register
            0x84 | 0x8C | 0x94 => {
                let mode = column_mode(opcode);
                let addr = self.ea(bus, mode, false);
                bus.write(self.time, addr, self.regs.y);
            }
            0xA0 | 0xA4 | 0xAC | 0xB4 | 0xBC => {
                let mode = if opcode == 0xA0 { Mode::Imm } else { column_mode(opcode) };
                self.regs.y = self.operand(bus, mode);
                self.regs.set_nz(self.regs.y);
            }
            0xC0 | 0xC4 | 0xCC => {
                let mode = if opcode == 0xC0 { Mode::Imm } else { column_mode(opcode) };
                let v = self.operand(bus, mode);
                self.compare(self.regs.y, v);
            }
            0xE0 | 0xE4 | 0xEC => {
                let mode = if opcode == 0xE0 { Mode::Imm } else { column_mode(opcode) };
                let v = self.operand(bus, mode);
                self.compare(self.regs.x, v);
            }

            // X register
            0x86 | 0x8E => {
                let addr = self.ea(bus, column_mode(opcode), false);
                bus.write(self.time, addr, self.regs.x);
            }
            0x96 => {
                let addr = self.ea(bus, Mode::ZpY, false);
                bus.write(self.time, addr, self.regs.x);
            }
            0xA2 | 0xA6 | 0xAE | 0xB6 | 0xBE => {
                let mode = match opcode {
                    0xA2 => Mode::Imm,
                    0xB6 => Mode::ZpY,
                    0xBE => Mode::AbsY,
                    _ => column_mode(opcode),
                };
                self.regs.x = self.operand(bus, mode);
                self.regs.set_nz(self.regs.x);
            }

            // Shifts on the accumulator
            0x0A => self.regs.a = self.asl(self.regs.a),
            0x2A => self.regs.a = self.rol(self.regs.a),
            0x4A => self.regs.a = self.lsr(self.regs.a),
            0x6A => self.regs.a = self.ror(self.regs.a),

            // Read-modify-write on memory
            0x06 | 0x0E | 0x16 | 0x1E => {
                self.modify(bus, column_mode(opcode), Self::asl);
            }
            0x26 | 0x2E | 0x36 | 0x3E => {
                self.modify(bus, column_mode(opcode), Self::rol);
            }
            0x46 | 0x4E | 0x56 | 0x5E => {
                self.modify(bus, column_mode(opcode), Self::lsr);
            }
            0x66 | 0x6E | 0x76 | 0x7E => {
                self.modify(bus, column_mode(opcode), Self::ror);
            }
            0xC6 | 0xCE | 0xD6 | 0xDE => {
                self.modify(bus, column_mode(opcode), Self::dec);
            }
            0xE6 | 0xEE | 0xF6 | 0xFE => {
                self.modify(bus, column_mode(opcode), Self::inc);
            }

            // NOP variants
            0xEA | 0x1A | 0x3A | 0x5A | 0x7A | 0xDA | 0xFA => {}
            0x80 | 0x82 | 0x89 | 0xC2 | 0xE2 => {
                self.fetch(bus);
            }
            0x04 | 0x44 | 0x64 | 0x0C | 0x14 | 0x34 | 0x54 | 0x74 | 0xD4 | 0xF4 | 0x1C | 0x3C
            | 0x5C | 0x7C | 0xDC | 0xFC => {
                let mode = match opcode {
                    0x04 | 0x44 | 0x64 => Mode::Zp,
                    0x0C => Mode::Abs,
                    0x14 | 0x34 | 0x54 | 0x74 | 0xD4 | 0xF4 => Mode::ZpX,
                    _ => Mode::AbsX,
                };
                self.ea(bus, mode, true);
            }

            _ if opcode & 3 == 1 => self.alu_group(bus, opcode),
            _ => self.undocumented_group(bus, opcode),
        }
    }

    /// Column 1/5/9/D style opcodes: ORA AND EOR ADC STA LDA CMP SBC.
    fn alu_group<B: Bus>(&mut self, bus: &mut B, opcode: u8) {
        let mode = column_mode(opcode);
        match opcode >> 5 {
            0 => {
                self.regs.a |= self.operand(bus, mode);
                self.regs.set_nz(self.regs.a);
            }
            1 => {
                self.regs.a &= self.operand(bus, mode);
                self.regs.set_nz(self.regs.a);
            }
            2 => {
                self.regs.a ^= self.operand(bus, mode);
                self.regs.set_nz(self.regs.a);
            }
            3 => {
                let v = self.operand(bus, mode);
                self.adc(v);
            }
            4 => {
                let addr = self.ea(bus, mode, false);
                bus.write(self.time, addr, self.regs.a);
            }
            5 => {
                self.regs.a = self.operand(bus, mode);
                self.regs.set_nz(self.regs.a);
            }
            6 => {
                let v = self.operand(bus, mode);
                self.compare(self.regs.a, v);
            }
            _ => {
                let v = self.operand(bus, mode);
                self.sbc(v);
            }
        }
    }

    /// Column 3/7/B/F opcodes (stable undocumented combinations).
    fn undocumented_group<B: Bus>(&mut self, bus: &mut B, opcode: u8) {
        match opcode {
            0x0B | 0x2B => {
                self.regs.a &= self.fetch(bus);
                self.regs.set_nz(self.regs.a);
                let n = self.regs.status.contains(Status::N);
                self.regs.status.set(Status::C, n);
            }
            0x4B => {
                self.regs.a &= self.fetch(bus);
                self.regs.a = self.lsr(self.regs.a);
            }
            0x6B => {
                let v = self.regs.a & self.fetch(bus);
                let r = (v >> 1) | (self.regs.carry() << 7);
                self.regs.a = r;
                self.regs.set_nz(r);
                self.regs.status.set(Status::C, r & 0x40 != 0);
                self.regs.status.set(Status::V, ((r >> 6) ^ (r >> 5)) & 1 != 0);
            }
            0xCB => {
                let v = self.fetch(bus);
                let ax = self.regs.a & self.regs.x;
                self.regs.status.set(Status::C, ax >= v);
                self.regs.x = ax.wrapping_sub(v);
                self.regs.set_nz(self.regs.x);
            }
            0xEB => {
                let v = self.fetch(bus);
                self.sbc(v);
            }
            0x87 | 0x8F | 0x83 | 0x97 => {
                let mode = if opcode == 0x97 { Mode::ZpY } else { column_mode(opcode) };
                let addr = self.ea(bus, mode, false);
                bus.write(self.time, addr, self.regs.a & self.regs.x);
            }
            0xA3 | 0xA7 | 0xAF | 0xB3 | 0xB7 | 0xBF => {
                let mode = match opcode {
                    0xB7 => Mode::ZpY,
                    0xBF => Mode::AbsY,
                    _ => column_mode(opcode),
                };
                let v = self.operand(bus, mode);
                self.regs.a = v;
                self.regs.x = v;
                self.regs.set_nz(v);
            }
            _ => {
                let mode = column_mode(opcode);
                match opcode >> 5 {
                    0 => {
                        let r = self.modify(bus, mode, Self::asl);
                        self.regs.a |= r;
                        self.regs.set_nz(self.regs.a);
                    }
                    1 => {
                        let r = self.modify(bus, mode, Self::rol);
                        self.regs.a &= r;
                        self.regs.set_nz(self.regs.a);
                    }
                    2 => {
                        let r = self.modify(bus, mode, Self::lsr);
                        self.regs.a ^= r;
                        self.regs.set_nz(self.regs.a);
                    }
                    3 => {
                        let r = self.modify(bus, mode, Self::ror);
                        self.adc(r);
                    }
                    6 => {
                        let r = self.modify(bus, mode, Self::dec);
                        self.compare(self.regs.a, r);
                    }
                    _ => {
                        let r = self.modify(bus, mode, Self::inc);
                        self.sbc(r);
                    }
                }
            }
        }
    }

    fn fetch<B: Bus>(&mut self, bus: &B) -> u8 {
        let v = bus.code(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        v
    }

    fn fetch16<B: Bus>(&mut self, bus: &B) -> u16 {
        let lo = self.fetch(bus) as u16;
        let hi = self.fetch(bus) as u16;
        hi << 8 | lo
    }

    fn read16<B: Bus>(&mut self, bus: &mut B, addr: u16) -> u16 {
        let lo = bus.read(self.time, addr) as u16;
        let hi = bus.read(self.time, addr.wrapping_add(1)) as u16;
        hi << 8 | lo
    }

    fn read16_zp<B: Bus>(&mut self, bus: &mut B, ptr: u8) -> u16 {
        let lo = bus.read(self.time, ptr as u16) as u16;
        let hi = bus.read(self.time, ptr.wrapping_add(1) as u16) as u16;
        hi << 8 | lo
    }

    /// Effective address for `mode`; `penalty` charges a cycle on page cross.
    fn ea<B: Bus>(&mut self, bus: &mut B, mode: Mode, penalty: bool) -> u16 {
        match mode {
            Mode::Imm => {
                let addr = self.regs.pc;
                self.regs.pc = self.regs.pc.wrapping_add(1);
                addr
            }
            Mode::Zp => self.fetch(bus) as u16,
            Mode::ZpX => self.fetch(bus).wrapping_add(self.regs.x) as u16,
            Mode::ZpY => self.fetch(bus).wrapping_add(self.regs.y) as u16,
            Mode::Abs => self.fetch16(bus),
            Mode::AbsX => {
                let base = self.fetch16(bus);
                self.indexed(base, self.regs.x, penalty)
            }
            Mode::AbsY => {
                let base = self.fetch16(bus);
                self.indexed(base, self.regs.y, penalty)
            }
            Mode::IndX => {
                let ptr = self.fetch(bus).wrapping_add(self.regs.x);
                self.read16_zp(bus, ptr)
            }
            Mode::IndY => {
                let ptr = self.fetch(bus);
                let base = self.read16_zp(bus, ptr);
                self.indexed(base, self.regs.y, penalty)
            }
        }
    }

    fn indexed(&mut self, base: u16, index: u8, penalty: bool) -> u16 {
        let addr = base.wrapping_add(index as u16);
        if penalty && (addr ^ base) & 0xFF00 != 0 {
            self.time += 1;
        }
        addr
    }

    /// Load an operand, charging the page-cross cycle for indexed reads.
    fn operand<B: Bus>(&mut self, bus: &mut B, mode: Mode) -> u8 {
        if mode == Mode::Imm {
            return self.fetch(bus);
        }
        let addr = self.ea(bus, mode, true);
        bus.read(self.time, addr)
    }

    fn modify<B: Bus>(&mut self, bus: &mut B, mode: Mode, op: fn(&mut Self, u8) -> u8) -> u8 {
        let addr = self.ea(bus, mode, false);
        let v = bus.read(self.time, addr);
        let r = op(self, v);
        bus.write(self.time, addr, r);
        r
    }

    fn branch<B: Bus>(&mut self, bus: &B, taken: bool) {
        let offset = self.fetch(bus) as i8;
        if taken {
            let pc = self.regs.pc;
            let target = pc.wrapping_add(offset as u16);
            self.time += if (target ^ pc) & 0xFF00 != 0 { 2 } else { 1 };
            self.regs.pc = target;
        }
    }

    fn compare(&mut self, reg: u8, v: u8) {
        self.regs.status.set(Status::C, reg >= v);
        self.regs.set_nz(reg.wrapping_sub(v));
    }

    fn asl(&mut self, v: u8) -> u8 {
        self.regs.status.set(Status::C, v & 0x80 != 0);
        let r = v << 1;
        self.regs.set_nz(r);
        r
    }

    fn lsr(&mut self, v: u8) -> u8 {
        self.regs.status.set(Status::C, v & 1 != 0);
        let r = v >> 1;
        self.regs.set_nz(r);
        r
    }

    fn rol(&mut self, v: u8) -> u8 {
        let r = (v << 1) | self.regs.carry();
        self.regs.status.set(Status::C, v & 0x80 != 0);
        self.regs.set_nz(r);
        r
    }

    fn ror(&mut self, v: u8) -> u8 {
        let r = (v >> 1) | (self.regs.carry() << 7);
        self.regs.status.set(Status::C, v & 1 != 0);
        self.regs.set_nz(r);
        r
    }

    fn inc(&mut self, v: u8) -> u8 {
        let r = v.wrapping_add(1);
        self.regs.set_nz(r);
        r
    }

    fn dec(&mut self, v: u8) -> u8 {
        let r = v.wrapping_sub(1);
        self.regs.set_nz(r);
        r
    }

    fn decimal(&self) -> bool {
        self.decimal_enabled && self.regs.status.contains(Status::D)
    }

    fn adc(&mut self, v: u8) {
        let a = self.regs.a as u16;
        let b = v as u16;
        let c = self.regs.carry() as u16;
        let bin = a + b + c;
        if !self.decimal() {
            self.regs.status.set(Status::C, bin > 0xFF);
            self.regs
                .status
                .set(Status::V, (!(a ^ b) & (a ^ bin) & 0x80) != 0);
            self.regs.a = bin as u8;
            self.regs.set_nz(self.regs.a);
            return;
        }
        let mut lo = (a & 0x0F) + (b & 0x0F) + c;
        let mut hi = (a & 0xF0) + (b & 0xF0);
        if lo > 9 {
            lo += 6;
        }
        if lo > 0x0F {
            hi += 0x10;
        }
        self.regs.status.set(Status::Z, bin & 0xFF == 0);
        self.regs.status.set(Status::N, hi & 0x80 != 0);
        self.regs
            .status
            .set(Status::V, (!(a ^ b) & (a ^ hi) & 0x80) != 0);
        if hi > 0x90 {
            hi += 0x60;
        }
        self.regs.status.set(Status::C, hi > 0xFF);
        self.regs.a = ((hi & 0xF0) | (lo & 0x0F)) as u8;
    }

    fn sbc(&mut self, v: u8) {
        if !self.decimal() {
            self.adc(!v);
            return;
        }
        let a = self.regs.a as u32;
        let b = v as u32;
        let borrow = 1 - self.regs.carry() as u32;
        let bin = a.wrapping_sub(b).wrapping_sub(borrow);
        self.regs.status.set(Status::C, bin < 0x100);
        self.regs
            .status
            .set(Status::V, ((a ^ bin) & (a ^ b) & 0x80) != 0);
        self.regs.set_nz(bin as u8);
        let lo = (a & 0x0F).wrapping_sub(b & 0x0F).wrapping_sub(borrow);
        let mut r = if lo & 0x10 != 0 {
            (lo.wrapping_sub(6) & 0x0F) | (a & 0xF0).wrapping_sub(b & 0xF0).wrapping_sub(0x10)
        } else {
            (lo & 0x0F) | (a & 0xF0).wrapping_sub(b & 0xF0)
        };
        if r & 0x100 != 0 {
            r = r.wrapping_sub(0x60);
        }
        self.regs.a = r as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestBus {
        mem: Vec<u8>,
        writes: Vec<(Time, u16, u8)>,
    }

    impl TestBus {
        fn with_program(at: u16, code: &[u8]) -> Self {
            let mut mem = vec![0u8; 0x10000];
            mem[at as usize..at as usize + code.len()].copy_from_slice(code);
            Self {
                mem,
                writes: Vec::new(),
            }
        }
    }

    impl Bus for TestBus {
        fn read(&mut self, _time: Time, addr: u16) -> u8 {
            self.mem[addr as usize]
        }
        fn write(&mut self, time: Time, addr: u16, data: u8) {
            self.writes.push((time, addr, data));
            self.mem[addr as usize] = data;
        }
        fn code(&self, addr: u16) -> u8 {
            self.mem[addr as usize]
        }
    }

    fn cpu_at(pc: u16) -> Mos6502 {
        let mut cpu = Mos6502::new();
        cpu.regs.pc = pc;
        cpu
    }

    #[test]
    fn lda_sta_round_trip_with_cycle_counts() {
        // LDA #$42; STA $0200; HALT
        let mut bus = TestBus::with_program(0x8000, &[0xA9, 0x42, 0x8D, 0x00, 0x02, HALT_OPCODE]);
        let mut cpu = cpu_at(0x8000);
        assert!(cpu.run(1000, &mut bus));
        assert_eq!(bus.mem[0x0200], 0x42);
        assert_eq!(cpu.time(), 6);
        assert_eq!(cpu.regs.pc, 0x8005);
        assert_eq!(bus.writes, vec![(6, 0x0200, 0x42)]);
    }

    #[test]
    fn run_stops_at_instruction_boundary_after_end_time() {
        // NOP loop: JMP $8000
        let mut bus = TestBus::with_program(0x8000, &[0xEA, 0x4C, 0x00, 0x80]);
        let mut cpu = cpu_at(0x8000);
        assert!(!cpu.run(10, &mut bus));
        assert!(cpu.time() >= 10);
        assert!(cpu.time() < 10 + 7);
    }

    #[test]
    fn jsr_rts_and_call_return_to_idle() {
        let mut bus = TestBus::with_program(0x8000, &[0x60]);
        bus.mem[0x5FF6] = HALT_OPCODE;
        let mut cpu = cpu_at(0);
        cpu.call(&mut bus, 0x8000, 0x5FF6);
        assert!(cpu.run(1000, &mut bus));
        assert_eq!(cpu.regs.pc, 0x5FF6);
        assert_eq!(cpu.regs.sp, 0xFF);
        assert_eq!(cpu.time(), 6);
    }

    #[test]
    fn taken_branch_costs_extra_cycle_and_page_cross_costs_two() {
        // SEC; BCS +0
        let mut bus = TestBus::with_program(0x8000, &[0x38, 0xB0, 0x00, HALT_OPCODE]);
        let mut cpu = cpu_at(0x8000);
        cpu.run(100, &mut bus);
        assert_eq!(cpu.time(), 2 + 3);

        // BNE (Z clear after reset) landing in the page after the operand
        let mut bus = TestBus::with_program(0x80FE, &[0xD0, 0x7E]);
        bus.mem[0x817E] = HALT_OPCODE;
        let mut cpu = cpu_at(0x80FE);
        cpu.run(100, &mut bus);
        assert_eq!(cpu.regs.pc, 0x817E);
        assert_eq!(cpu.time(), 3);

        let mut bus = TestBus::with_program(0x80F0, &[0xD0, 0x20]);
        bus.mem[0x8112] = HALT_OPCODE;
        let mut cpu = cpu_at(0x80F0);
        cpu.run(100, &mut bus);
        assert_eq!(cpu.time(), 4);
    }

    #[test]
    fn indexed_read_page_cross_penalty() {
        // LDX #$01; LDA $80FF,X
        let mut bus = TestBus::with_program(0x8000, &[0xA2, 0x01, 0xBD, 0xFF, 0x80, HALT_OPCODE]);
        let mut cpu = cpu_at(0x8000);
        cpu.run(100, &mut bus);
        assert_eq!(cpu.time(), 2 + 5);
    }

    #[test]
    fn adc_sets_overflow_and_carry() {
        // CLC; LDA #$7F; ADC #$01
        let mut bus = TestBus::with_program(0x8000, &[0x18, 0xA9, 0x7F, 0x69, 0x01, HALT_OPCODE]);
        let mut cpu = cpu_at(0x8000);
        cpu.run(100, &mut bus);
        assert_eq!(cpu.regs.a, 0x80);
        assert!(cpu.regs.status.contains(Status::V | Status::N));
        assert!(!cpu.regs.status.contains(Status::C));
    }

    #[test]
    fn decimal_mode_only_when_enabled() {
        // SED; CLC; LDA #$09; ADC #$01
        let program = [0xF8, 0x18, 0xA9, 0x09, 0x69, 0x01, HALT_OPCODE];
        let mut bus = TestBus::with_program(0x8000, &program);
        let mut cpu = cpu_at(0x8000);
        cpu.run(100, &mut bus);
        assert_eq!(cpu.regs.a, 0x0A);

        let mut bus = TestBus::with_program(0x8000, &program);
        let mut cpu = cpu_at(0x8000);
        cpu.set_decimal_enabled(true);
        cpu.run(100, &mut bus);
        assert_eq!(cpu.regs.a, 0x10);
    }

    #[test]
    fn decimal_subtract_borrows() {
        // SED; SEC; LDA #$10; SBC #$01
        let mut bus = TestBus::with_program(0x8000, &[0xF8, 0x38, 0xA9, 0x10, 0xE9, 0x01, HALT_OPCODE]);
        let mut cpu = cpu_at(0x8000);
        cpu.set_decimal_enabled(true);
        cpu.run(100, &mut bus);
        assert_eq!(cpu.regs.a, 0x09);
        assert!(cpu.regs.status.contains(Status::C));
    }

    #[test]
    fn compare_and_rotate_through_carry() {
        // LDA #$80; CMP #$80; ROL A
        let mut bus = TestBus::with_program(0x8000, &[0xA9, 0x80, 0xC9, 0x80, 0x2A, HALT_OPCODE]);
        let mut cpu = cpu_at(0x8000);
        cpu.run(100, &mut bus);
        assert_eq!(cpu.regs.a, 0x01);
        assert!(cpu.regs.status.contains(Status::C));
    }

    #[test]
    fn undocumented_lax_and_dcp() {
        // LAX $10; DCP $11
        let mut bus = TestBus::with_program(0x8000, &[0xA7, 0x10, 0xC7, 0x11, HALT_OPCODE]);
        bus.mem[0x10] = 0x5A;
        bus.mem[0x11] = 0x5B;
        let mut cpu = cpu_at(0x8000);
        cpu.run(100, &mut bus);
        assert_eq!(cpu.regs.a, 0x5A);
        assert_eq!(cpu.regs.x, 0x5A);
        assert_eq!(bus.mem[0x11], 0x5A);
        assert!(cpu.regs.status.contains(Status::Z | Status::C));
        assert_eq!(cpu.error_count(), 0);
    }

    #[test]
    fn unsupported_opcodes_are_skipped_and_counted() {
        // JAM; XAA #imm; SHY abs,X; LDA #1
        let mut bus = TestBus::with_program(
            0x8000,
            &[0x02, 0x8B, 0xFF, 0x9C, 0x00, 0x02, 0xA9, 0x01, HALT_OPCODE],
        );
        let mut cpu = cpu_at(0x8000);
        assert!(cpu.run(1000, &mut bus));
        assert_eq!(cpu.error_count(), 3);
        assert_eq!(cpu.regs.a, 1);
        assert_eq!(cpu.regs.pc, 0x8008);
        assert!(bus.writes.is_empty());
    }

    #[test]
    fn jmp_indirect_wraps_within_page() {
        let mut bus = TestBus::with_program(0x8000, &[0x6C, 0xFF, 0x02]);
        bus.mem[0x02FF] = 0x34;
        bus.mem[0x0200] = 0x12;
        bus.mem[0x1234] = HALT_OPCODE;
        let mut cpu = cpu_at(0x8000);
        assert!(cpu.run(100, &mut bus));
        assert_eq!(cpu.regs.pc, 0x1234);
    }

    #[test]
    fn halted_cpu_does_not_advance_time() {
        let mut bus = TestBus::with_program(0x8000, &[HALT_OPCODE]);
        let mut cpu = cpu_at(0x8000);
        assert!(cpu.run(100, &mut bus));
        assert!(cpu.run(200, &mut bus));
        assert_eq!(cpu.time(), 0);
    }

    #[test]
    fn adjust_time_rebases_clock() {
        let mut cpu = Mos6502::new();
        cpu.set_time(120);
        cpu.set_end_time(100);
        cpu.adjust_time(-100);
        assert_eq!(cpu.time(), 20);
        assert_eq!(cpu.end_time(), 0);
    }
}
