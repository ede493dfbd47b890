//! Zilog Z80 interpreter.
//!
//! Decodes the unprefixed, CB, ED, DD/FD and DDCB/FDCB opcode spaces and
//! charges documented T-state costs. [`Z80::run`] stops before executing a
//! HALT instruction and leaves PC on it; the machine driver decides whether
//! that was a guest routine returning to the idle address or a real HALT
//! waiting for an interrupt ([`Z80::interrupt`]).
//!
//! Undefined ED opcodes are counted as errors and execute as 8-cycle NOPs.

mod registers;
mod tables;

pub use registers::{Registers, CF, HF, NF, PF, SF, XF, YF, ZF};

use crate::Time;
use tables::{ED_CYCLES, MAIN_CYCLES, SZ, SZP};

/// The HALT opcode, also used to fill idle addresses.
pub const HALT_OPCODE: u8 = 0x76;

/// Memory and port I/O seen by the Z80.
pub trait Bus {
    /// Data read at `addr` (may hit memory-mapped chips).
    fn read(&mut self, time: Time, addr: u16) -> u8;
    /// Data write at `addr` (may hit memory-mapped chips or mappers).
    fn write(&mut self, time: Time, addr: u16, data: u8);
    /// Opcode and operand fetch, never routed to I/O.
    fn code(&self, addr: u16) -> u8;
    /// `IN` from a 16-bit port address.
    fn port_in(&mut self, time: Time, port: u16) -> u8;
    /// `OUT` to a 16-bit port address.
    fn port_out(&mut self, time: Time, port: u16, data: u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Index {
    Hl,
    Ix,
    Iy,
}

/// Z80 CPU state and clock.
#[derive(Debug, Clone, Default)]
pub struct Z80 {
    /// Register file.
    pub regs: Registers,
    time: Time,
    end_time: Time,
    error_count: u32,
    halted: bool,
    wz: u16,
}

impl Z80 {
    /// A CPU with cleared registers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear registers, clocks and the error counter.
    pub fn reset(&mut self) {
        *self = Self::default();
        self.regs.sp = 0xFFFF;
        self.regs.af = 0xFFFF;
    }

    /// Elapsed T-states in the current frame.
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

    /// Number of undefined opcodes executed since reset.
    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    /// True when the last [`run`](Self::run) stopped on a HALT.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Push a word on the stack.
    pub fn push<B: Bus>(&mut self, bus: &mut B, value: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(self.time, self.regs.sp, (value >> 8) as u8);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write(self.time, self.regs.sp, value as u8);
    }

    /// Pop a word from the stack.
    pub fn pop<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = bus.read(self.time, self.regs.sp) as u16;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let hi = bus.read(self.time, self.regs.sp) as u16;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        hi << 8 | lo
    }

    /// Set up a subroutine call to `entry` whose RET lands on `return_to`.
    pub fn call<B: Bus>(&mut self, bus: &mut B, entry: u16, return_to: u16) {
        self.push(bus, return_to);
        self.regs.pc = entry;
        self.halted = false;
    }

    /// Run until `time >= end_time` or the next opcode is HALT.
    ///
    /// Returns `true` when stopped on HALT, with PC pointing at it and the
    /// clock not advanced.
    pub fn run<B: Bus>(&mut self, end_time: Time, bus: &mut B) -> bool {
        self.end_time = end_time;
        while self.time < self.end_time {
            if bus.code(self.regs.pc) == HALT_OPCODE {
                self.halted = true;
                return true;
            }
            self.halted = false;
            self.step(bus);
        }
        false
    }

    /// Accept a maskable interrupt if enabled.
    ///
    /// A CPU stopped on HALT resumes after it. Mode 2 reads the vector from
    /// `I * 256 + 0xFF`; modes 0 and 1 both restart at 0x0038.
    pub fn interrupt<B: Bus>(&mut self, bus: &mut B) -> bool {
        if !self.regs.iff1 {
            return false;
        }
        if self.halted || bus.code(self.regs.pc) == HALT_OPCODE {
            self.regs.pc = self.regs.pc.wrapping_add(1);
            self.halted = false;
        }
        self.regs.iff1 = false;
        self.regs.iff2 = false;
        self.inc_r();
        let ret = self.regs.pc;
        self.push(bus, ret);
        if self.regs.im == 2 {
            let vector = (self.regs.i as u16) << 8 | 0xFF;
            self.regs.pc = self.read16(bus, vector);
            self.time += 19;
        } else {
            self.regs.pc = 0x0038;
            self.time += 13;
        }
        true
    }

    fn step<B: Bus>(&mut self, bus: &mut B) {
        let mut index = Index::Hl;
        let mut op = self.fetch_opcode(bus);
        loop {
            index = match op {
                0xDD => Index::Ix,
                0xFD => Index::Iy,
                _ => break,
            };
            self.time += 4;
            op = self.fetch_opcode(bus);
        }
        self.time += MAIN_CYCLES[op as usize] as Time;
        match op {
            0xCB => self.execute_cb(bus, index),
            0xED => self.execute_ed(bus),
            _ => self.execute_main(bus, op, index),
        }
    }

    fn inc_r(&mut self) {
        let r = self.regs.r;
        self.regs.r = (r & 0x80) | (r.wrapping_add(1) & 0x7F);
    }

    fn fetch_opcode<B: Bus>(&mut self, bus: &B) -> u8 {
        self.inc_r();
        self.fetch(bus)
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

    fn write16<B: Bus>(&mut self, bus: &mut B, addr: u16, value: u16) {
        bus.write(self.time, addr, value as u8);
        bus.write(self.time, addr.wrapping_add(1), (value >> 8) as u8);
    }

    fn pair(&self, index: Index) -> u16 {
        match index {
            Index::Hl => self.regs.hl,
            Index::Ix => self.regs.ix,
            Index::Iy => self.regs.iy,
        }
    }

    fn set_pair(&mut self, index: Index, value: u16) {
        match index {
            Index::Hl => self.regs.hl = value,
            Index::Ix => self.regs.ix = value,
            Index::Iy => self.regs.iy = value,
        }
    }

    /// `rp` table: BC DE HL SP.
    fn rp(&self, p: u8, index: Index) -> u16 {
        match p {
            0 => self.regs.bc,
            1 => self.regs.de,
            2 => self.pair(index),
            _ => self.regs.sp,
        }
    }

    fn set_rp(&mut self, p: u8, index: Index, value: u16) {
        match p {
            0 => self.regs.bc = value,
            1 => self.regs.de = value,
            2 => self.set_pair(index, value),
            _ => self.regs.sp = value,
        }
    }

    /// `rp2` table: BC DE HL AF.
    fn rp2(&self, p: u8, index: Index) -> u16 {
        if p == 3 {
            self.regs.af
        } else {
            self.rp(p, index)
        }
    }

    fn set_rp2(&mut self, p: u8, index: Index, value: u16) {
        if p == 3 {
            self.regs.af = value;
        } else {
            self.set_rp(p, index, value);
        }
    }

    /// 8-bit register by encoding (`6` is not a register and reads as A).
    fn reg8(&self, r: u8, index: Index) -> u8 {
        match (r, index) {
            (0, _) => self.regs.b(),
            (1, _) => self.regs.c(),
            (2, _) => self.regs.d(),
            (3, _) => self.regs.e(),
            (4, Index::Hl) => self.regs.h(),
            (4, Index::Ix) => self.regs.ixh(),
            (4, Index::Iy) => self.regs.iyh(),
            (5, Index::Hl) => self.regs.l(),
            (5, Index::Ix) => self.regs.ixl(),
            (5, Index::Iy) => self.regs.iyl(),
            _ => self.regs.a(),
        }
    }

    fn set_reg8(&mut self, r: u8, index: Index, v: u8) {
        match (r, index) {
            (0, _) => self.regs.set_b(v),
            (1, _) => self.regs.set_c(v),
            (2, _) => self.regs.set_d(v),
            (3, _) => self.regs.set_e(v),
            (4, Index::Hl) => self.regs.set_h(v),
            (4, Index::Ix) => self.regs.set_ixh(v),
            (4, Index::Iy) => self.regs.set_iyh(v),
            (5, Index::Hl) => self.regs.set_l(v),
            (5, Index::Ix) => self.regs.set_ixl(v),
            (5, Index::Iy) => self.regs.set_iyl(v),
            _ => self.regs.set_a(v),
        }
    }

    /// Address of the `(HL)` operand, or `(IX+d)`/`(IY+d)` with its extra cost.
    fn mem_operand<B: Bus>(&mut self, bus: &B, index: Index) -> u16 {
        if index == Index::Hl {
            return self.regs.hl;
        }
        let d = self.fetch(bus) as i8;
        self.time += 8;
        let addr = self.pair(index).wrapping_add(d as u16);
        self.wz = addr;
        addr
    }

    fn condition(&self, cc: u8) -> bool {
        let f = self.regs.f();
        match cc {
            0 => f & ZF == 0,
            1 => f & ZF != 0,
            2 => f & CF == 0,
            3 => f & CF != 0,
            4 => f & PF == 0,
            5 => f & PF != 0,
            6 => f & SF == 0,
            _ => f & SF != 0,
        }
    }

    fn jump_relative(&mut self, d: i8) {
        self.regs.pc = self.regs.pc.wrapping_add(d as u16);
        self.wz = self.regs.pc;
    }

    fn execute_main<B: Bus>(&mut self, bus: &mut B, op: u8, index: Index) {
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let p = y >> 1;
        let q = y & 1;

        match (x, z) {
            (0, 0) => match y {
                0 => {}
                1 => std::mem::swap(&mut self.regs.af, &mut self.regs.af_alt),
                2 => {
                    let d = self.fetch(bus) as i8;
                    let b = self.regs.b().wrapping_sub(1);
                    self.regs.set_b(b);
                    if b != 0 {
                        self.time += 5;
                        self.jump_relative(d);
                    }
                }
                3 => {
                    let d = self.fetch(bus) as i8;
                    self.jump_relative(d);
                }
                _ => {
                    let d = self.fetch(bus) as i8;
                    if self.condition(y - 4) {
                        self.time += 5;
                        self.jump_relative(d);
                    }
                }
            },
            (0, 1) => {
                if q == 0 {
                    let nn = self.fetch16(bus);
                    self.set_rp(p, index, nn);
                } else {
                    let hl = self.pair(index);
                    let r = self.add16(hl, self.rp(p, index));
                    self.set_pair(index, r);
                }
            }
            (0, 2) => match (q, p) {
                (0, 0) => bus.write(self.time, self.regs.bc, self.regs.a()),
                (0, 1) => bus.write(self.time, self.regs.de, self.regs.a()),
                (0, 2) => {
                    let nn = self.fetch16(bus);
                    let v = self.pair(index);
                    self.write16(bus, nn, v);
                }
                (0, _) => {
                    let nn = self.fetch16(bus);
                    bus.write(self.time, nn, self.regs.a());
                }
                (_, 0) => {
                    let v = bus.read(self.time, self.regs.bc);
                    self.regs.set_a(v);
                }
                (_, 1) => {
                    let v = bus.read(self.time, self.regs.de);
                    self.regs.set_a(v);
                }
                (_, 2) => {
                    let nn = self.fetch16(bus);
                    let v = self.read16(bus, nn);
                    self.set_pair(index, v);
                }
                _ => {
                    let nn = self.fetch16(bus);
                    let v = bus.read(self.time, nn);
                    self.regs.set_a(v);
                }
            },
            (0, 3) => {
                let v = self.rp(p, index);
                let v = if q == 0 {
                    v.wrapping_add(1)
                } else {
                    v.wrapping_sub(1)
                };
                self.set_rp(p, index, v);
            }
            (0, 4) | (0, 5) => {
                let inc = z == 4;
                if y == 6 {
                    let addr = self.mem_operand(bus, index);
                    let v = bus.read(self.time, addr);
                    let r = if inc { self.inc8(v) } else { self.dec8(v) };
                    bus.write(self.time, addr, r);
                } else {
                    let v = self.reg8(y, index);
                    let r = if inc { self.inc8(v) } else { self.dec8(v) };
                    self.set_reg8(y, index, r);
                }
            }
            (0, 6) => {
                if y == 6 {
                    let addr = self.mem_operand(bus, index);
                    if index != Index::Hl {
                        self.time -= 3;
                    }
                    let n = self.fetch(bus);
                    bus.write(self.time, addr, n);
                } else {
                    let n = self.fetch(bus);
                    self.set_reg8(y, index, n);
                }
            }
            (0, _) => self.accumulator_op(y),
            (1, _) => {
                if y == 6 && z == 6 {
                    // HALT: rewind onto the opcode so `run` stops on it.
                    self.regs.pc = self.regs.pc.wrapping_sub(1);
                } else if y == 6 {
                    let addr = self.mem_operand(bus, index);
                    bus.write(self.time, addr, self.reg8(z, Index::Hl));
                } else if z == 6 {
                    let addr = self.mem_operand(bus, index);
                    let v = bus.read(self.time, addr);
                    self.set_reg8(y, Index::Hl, v);
                } else {
                    let v = self.reg8(z, index);
                    self.set_reg8(y, index, v);
                }
            }
            (2, _) => {
                let v = if z == 6 {
                    let addr = self.mem_operand(bus, index);
                    bus.read(self.time, addr)
                } else {
                    self.reg8(z, index)
                };
                self.alu(y, v);
            }
            (_, 0) => {
                if self.condition(y) {
                    self.time += 6;
                    self.regs.pc = self.pop(bus);
                    self.wz = self.regs.pc;
                }
            }
            (_, 1) => match (q, p) {
                (0, _) => {
                    let v = self.pop(bus);
                    self.set_rp2(p, index, v);
                }
                (_, 0) => {
                    self.regs.pc = self.pop(bus);
                    self.wz = self.regs.pc;
                }
                (_, 1) => {
                    std::mem::swap(&mut self.regs.bc, &mut self.regs.bc_alt);
                    std::mem::swap(&mut self.regs.de, &mut self.regs.de_alt);
                    std::mem::swap(&mut self.regs.hl, &mut self.regs.hl_alt);
                }
                (_, 2) => self.regs.pc = self.pair(index),
                _ => self.regs.sp = self.pair(index),
            },
            (_, 2) => {
                let nn = self.fetch16(bus);
                self.wz = nn;
                if self.condition(y) {
                    self.regs.pc = nn;
                }
            }
            (_, 3) => match y {
                0 => {
                    let nn = self.fetch16(bus);
                    self.wz = nn;
                    self.regs.pc = nn;
                }
                2 => {
                    let n = self.fetch(bus);
                    let a = self.regs.a();
                    bus.port_out(self.time, (a as u16) << 8 | n as u16, a);
                }
                3 => {
                    let n = self.fetch(bus);
                    let port = (self.regs.a() as u16) << 8 | n as u16;
                    let v = bus.port_in(self.time, port);
                    self.regs.set_a(v);
                }
                4 => {
                    let sp = self.regs.sp;
                    let v = self.read16(bus, sp);
                    let pair = self.pair(index);
                    self.write16(bus, sp, pair);
                    self.set_pair(index, v);
                    self.wz = v;
                }
                5 => std::mem::swap(&mut self.regs.de, &mut self.regs.hl),
                6 => {
                    self.regs.iff1 = false;
                    self.regs.iff2 = false;
                }
                _ => {
                    self.regs.iff1 = true;
                    self.regs.iff2 = true;
                }
            },
            (_, 4) => {
                let nn = self.fetch16(bus);
                self.wz = nn;
                if self.condition(y) {
                    self.time += 7;
                    let ret = self.regs.pc;
                    self.push(bus, ret);
                    self.regs.pc = nn;
                }
            }
            (_, 5) => {
                if q == 0 {
                    let v = self.rp2(p, index);
                    self.push(bus, v);
                } else {
                    let nn = self.fetch16(bus);
                    self.wz = nn;
                    let ret = self.regs.pc;
                    self.push(bus, ret);
                    self.regs.pc = nn;
                }
            }
            (_, 6) => {
                let n = self.fetch(bus);
                self.alu(y, n);
            }
            _ => {
                let ret = self.regs.pc;
                self.push(bus, ret);
                self.regs.pc = (y as u16) * 8;
                self.wz = self.regs.pc;
            }
        }
    }

    fn execute_cb<B: Bus>(&mut self, bus: &mut B, index: Index) {
        let (op, addr) = if index == Index::Hl {
            let op = self.fetch_opcode(bus);
            (op, self.regs.hl)
        } else {
            let d = self.fetch(bus) as i8;
            let op = self.fetch(bus);
            let addr = self.pair(index).wrapping_add(d as u16);
            self.wz = addr;
            (op, addr)
        };
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let memory = index != Index::Hl || z == 6;

        self.time += match (index, memory, x) {
            (Index::Hl, false, _) => 8,
            (Index::Hl, true, 1) => 12,
            (Index::Hl, true, _) => 15,
            (_, _, 1) => 16,
            _ => 19,
        };

        let v = if memory {
            bus.read(self.time, addr)
        } else {
            self.reg8(z, Index::Hl)
        };

        let result = match x {
            0 => self.rotate(y, v),
            1 => {
                let bit = v & (1 << y);
                let xy_source = if memory { (self.wz >> 8) as u8 } else { v };
                let mut f = (self.regs.f() & CF) | HF | (xy_source & (XF | YF)) | (bit & SF);
                if bit == 0 {
                    f |= ZF | PF;
                }
                self.regs.set_f(f);
                return;
            }
            2 => v & !(1 << y),
            _ => v | (1 << y),
        };

        if memory {
            bus.write(self.time, addr, result);
            if index != Index::Hl && z != 6 {
                self.set_reg8(z, Index::Hl, result);
            }
        } else {
            self.set_reg8(z, Index::Hl, result);
        }
    }

    fn execute_ed<B: Bus>(&mut self, bus: &mut B) {
        let op = self.fetch_opcode(bus);
        self.time += ED_CYCLES[op as usize] as Time;
        let x = op >> 6;
        let y = (op >> 3) & 7;
        let z = op & 7;
        let p = y >> 1;
        let q = y & 1;

        match (x, z) {
            (1, 0) => {
                let v = bus.port_in(self.time, self.regs.bc);
                if y != 6 {
                    self.set_reg8(y, Index::Hl, v);
                }
                let f = (self.regs.f() & CF) | SZP[v as usize];
                self.regs.set_f(f);
            }
            (1, 1) => {
                let v = if y == 6 { 0 } else { self.reg8(y, Index::Hl) };
                bus.port_out(self.time, self.regs.bc, v);
            }
            (1, 2) => {
                let hl = self.regs.hl;
                let rr = self.rp(p, Index::Hl);
                self.regs.hl = if q == 0 {
                    self.sbc16(hl, rr)
                } else {
                    self.adc16(hl, rr)
                };
            }
            (1, 3) => {
                let nn = self.fetch16(bus);
                if q == 0 {
                    let v = self.rp(p, Index::Hl);
                    self.write16(bus, nn, v);
                } else {
                    let v = self.read16(bus, nn);
                    self.set_rp(p, Index::Hl, v);
                }
                self.wz = nn.wrapping_add(1);
            }
            (1, 4) => {
                let a = self.regs.a();
                self.regs.set_a(0);
                self.alu(2, a);
            }
            (1, 5) => {
                self.regs.pc = self.pop(bus);
                self.regs.iff1 = self.regs.iff2;
            }
            (1, 6) => self.regs.im = [0, 0, 1, 2, 0, 0, 1, 2][y as usize],
            (1, 7) => match y {
                0 => self.regs.i = self.regs.a(),
                1 => self.regs.r = self.regs.a(),
                2 | 3 => {
                    let v = if y == 2 { self.regs.i } else { self.regs.r };
                    self.regs.set_a(v);
                    let mut f = (self.regs.f() & CF) | SZ[v as usize];
                    if self.regs.iff2 {
                        f |= PF;
                    }
                    self.regs.set_f(f);
                }
                4 | 5 => {
                    let hl = self.regs.hl;
                    let v = bus.read(self.time, hl);
                    let a = self.regs.a();
                    let (mem, acc) = if y == 4 {
                        ((a << 4) | (v >> 4), (a & 0xF0) | (v & 0x0F))
                    } else {
                        ((v << 4) | (a & 0x0F), (a & 0xF0) | (v >> 4))
                    };
                    bus.write(self.time, hl, mem);
                    self.regs.set_a(acc);
                    let f = (self.regs.f() & CF) | SZP[acc as usize];
                    self.regs.set_f(f);
                    self.wz = hl.wrapping_add(1);
                }
                _ => self.undefined_ed(op),
            },
            (2, 0..=3) if y >= 4 => self.block_op(bus, y, z),
            _ => self.undefined_ed(op),
        }
    }

    fn undefined_ed(&mut self, op: u8) {
        self.error_count += 1;
        log::trace!(
            "undefined Z80 opcode ED {op:02X} at 0x{:04X}",
            self.regs.pc.wrapping_sub(2)
        );
    }

    /// LDI/CPI/INI/OUTI and their decrementing and repeating forms.
    fn block_op<B: Bus>(&mut self, bus: &mut B, y: u8, z: u8) {
        let step: u16 = if y & 1 == 0 { 1 } else { 0xFFFF };
        let repeat = y >= 6;
        let hl = self.regs.hl;

        let again = match z {
            0 => {
                let v = bus.read(self.time, hl);
                bus.write(self.time, self.regs.de, v);
                self.regs.hl = hl.wrapping_add(step);
                self.regs.de = self.regs.de.wrapping_add(step);
                self.regs.bc = self.regs.bc.wrapping_sub(1);
                let n = v.wrapping_add(self.regs.a());
                let mut f = (self.regs.f() & (SF | ZF | CF)) | (n & XF) | ((n << 4) & YF);
                if self.regs.bc != 0 {
                    f |= PF;
                }
                self.regs.set_f(f);
                self.regs.bc != 0
            }
            1 => {
                let v = bus.read(self.time, hl);
                let a = self.regs.a();
                let res = a.wrapping_sub(v);
                self.regs.hl = hl.wrapping_add(step);
                self.regs.bc = self.regs.bc.wrapping_sub(1);
                let h = (a ^ v ^ res) & HF;
                let n = res.wrapping_sub((h != 0) as u8);
                let mut f = (self.regs.f() & CF)
                    | NF
                    | (SZ[res as usize] & !(XF | YF))
                    | h
                    | (n & XF)
                    | ((n << 4) & YF);
                if self.regs.bc != 0 {
                    f |= PF;
                }
                self.regs.set_f(f);
                self.regs.bc != 0 && res != 0
            }
            2 => {
                let v = bus.port_in(self.time, self.regs.bc);
                bus.write(self.time, hl, v);
                self.regs.hl = hl.wrapping_add(step);
                let b = self.regs.b().wrapping_sub(1);
                self.regs.set_b(b);
                self.regs.set_f(SZ[b as usize] | NF);
                b != 0
            }
            _ => {
                let v = bus.read(self.time, hl);
                let b = self.regs.b().wrapping_sub(1);
                self.regs.set_b(b);
                bus.port_out(self.time, self.regs.bc, v);
                self.regs.hl = hl.wrapping_add(step);
                self.regs.set_f(SZ[b as usize] | NF);
                b != 0
            }
        };

        if repeat && again {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            self.time += 5;
        }
    }

    fn accumulator_op(&mut self, y: u8) {
        let a = self.regs.a();
        let f = self.regs.f();
        let keep = f & (SF | ZF | PF);
        match y {
            0 => {
                let r = a.rotate_left(1);
                self.regs.set_a(r);
                self.regs.set_f(keep | (r & (XF | YF | CF)));
            }
            1 => {
                let r = a.rotate_right(1);
                self.regs.set_a(r);
                self.regs.set_f(keep | (r & (XF | YF)) | (a & CF));
            }
            2 => {
                let r = (a << 1) | (f & CF);
                self.regs.set_a(r);
                self.regs.set_f(keep | (r & (XF | YF)) | (a >> 7));
            }
            3 => {
                let r = (a >> 1) | ((f & CF) << 7);
                self.regs.set_a(r);
                self.regs.set_f(keep | (r & (XF | YF)) | (a & CF));
            }
            4 => {
                let mut diff = 0u8;
                let mut carry = f & CF;
                if f & HF != 0 || a & 0x0F > 9 {
                    diff |= 0x06;
                }
                if carry != 0 || a > 0x99 {
                    diff |= 0x60;
                    carry = CF;
                }
                let r = if f & NF != 0 {
                    a.wrapping_sub(diff)
                } else {
                    a.wrapping_add(diff)
                };
                self.regs.set_a(r);
                self.regs
                    .set_f(SZP[r as usize] | (f & NF) | carry | ((a ^ r) & HF));
            }
            5 => {
                let r = !a;
                self.regs.set_a(r);
                self.regs
                    .set_f((f & (SF | ZF | PF | CF)) | HF | NF | (r & (XF | YF)));
            }
            6 => self.regs.set_f(keep | CF | (a & (XF | YF))),
            _ => {
                let h = (f & CF) << 4;
                self.regs
                    .set_f((keep | h | (a & (XF | YF)) | (f & CF)) ^ CF);
            }
        }
    }

    fn alu(&mut self, op: u8, v: u8) {
        let a = self.regs.a();
        let carry = self.regs.f() & CF;
        match op {
            0 | 1 => {
                let c = if op == 1 { carry } else { 0 };
                let sum = a as u16 + v as u16 + c as u16;
                let r = sum as u8;
                let overflow = ((!(a ^ v) & (a ^ r)) & 0x80) >> 5;
                self.regs.set_a(r);
                self.regs.set_f(
                    SZ[r as usize] | (sum >> 8) as u8 | ((a ^ v ^ r) & HF) | overflow,
                );
            }
            2 | 3 | 7 => {
                let c = if op == 3 { carry } else { 0 };
                let diff = (a as u16).wrapping_sub(v as u16).wrapping_sub(c as u16);
                let r = diff as u8;
                let overflow = (((a ^ v) & (a ^ r)) & 0x80) >> 5;
                let borrow = ((diff >> 8) as u8) & CF;
                let f = SZ[r as usize] | NF | borrow | ((a ^ v ^ r) & HF) | overflow;
                if op == 7 {
                    self.regs.set_f((f & !(XF | YF)) | (v & (XF | YF)));
                } else {
                    self.regs.set_a(r);
                    self.regs.set_f(f);
                }
            }
            4 => {
                let r = a & v;
                self.regs.set_a(r);
                self.regs.set_f(SZP[r as usize] | HF);
            }
            5 => {
                let r = a ^ v;
                self.regs.set_a(r);
                self.regs.set_f(SZP[r as usize]);
            }
            _ => {
                let r = a | v;
                self.regs.set_a(r);
                self.regs.set_f(SZP[r as usize]);
            }
        }
    }

    /// CB rotate/shift group: RLC RRC RL RR SLA SRA SLL SRL.
    fn rotate(&mut self, y: u8, v: u8) -> u8 {
        let carry_in = self.regs.f() & CF;
        let (r, carry) = match y {
            0 => (v.rotate_left(1), v >> 7),
            1 => (v.rotate_right(1), v & 1),
            2 => ((v << 1) | carry_in, v >> 7),
            3 => ((v >> 1) | (carry_in << 7), v & 1),
            4 => (v << 1, v >> 7),
            5 => ((v >> 1) | (v & 0x80), v & 1),
            6 => ((v << 1) | 1, v >> 7),
            _ => (v >> 1, v & 1),
        };
        self.regs.set_f(SZP[r as usize] | carry);
        r
    }

    fn inc8(&mut self, v: u8) -> u8 {
        let r = v.wrapping_add(1);
        let mut f = (self.regs.f() & CF) | SZ[r as usize];
        if r == 0x80 {
            f |= PF;
        }
        if r & 0x0F == 0 {
            f |= HF;
        }
        self.regs.set_f(f);
        r
    }

    fn dec8(&mut self, v: u8) -> u8 {
        let r = v.wrapping_sub(1);
        let mut f = (self.regs.f() & CF) | NF | SZ[r as usize];
        if r == 0x7F {
            f |= PF;
        }
        if r & 0x0F == 0x0F {
            f |= HF;
        }
        self.regs.set_f(f);
        r
    }

    fn add16(&mut self, a: u16, b: u16) -> u16 {
        let sum = a as u32 + b as u32;
        let r = sum as u16;
        let f = (self.regs.f() & (SF | ZF | PF))
            | ((sum >> 16) as u8 & CF)
            | (((a ^ b ^ r) >> 8) as u8 & HF)
            | ((r >> 8) as u8 & (XF | YF));
        self.regs.set_f(f);
        self.wz = a.wrapping_add(1);
        r
    }

    fn adc16(&mut self, a: u16, b: u16) -> u16 {
        let c = (self.regs.f() & CF) as u32;
        let sum = a as u32 + b as u32 + c;
        let r = sum as u16;
        let overflow = ((!(a ^ b) & (a ^ r)) & 0x8000) >> 13;
        let mut f = ((sum >> 16) as u8 & CF)
            | (((a ^ b ^ r) >> 8) as u8 & HF)
            | ((r >> 8) as u8 & (SF | XF | YF))
            | overflow as u8;
        if r == 0 {
            f |= ZF;
        }
        self.regs.set_f(f);
        self.wz = a.wrapping_add(1);
        r
    }

    fn sbc16(&mut self, a: u16, b: u16) -> u16 {
        let c = (self.regs.f() & CF) as u32;
        let diff = (a as u32).wrapping_sub(b as u32).wrapping_sub(c);
        let r = diff as u16;
        let overflow = (((a ^ b) & (a ^ r)) & 0x8000) >> 13;
        let mut f = NF
            | ((diff >> 16) as u8 & CF)
            | (((a ^ b ^ r) >> 8) as u8 & HF)
            | ((r >> 8) as u8 & (SF | XF | YF))
            | overflow as u8;
        if r == 0 {
            f |= ZF;
        }
        self.regs.set_f(f);
        self.wz = a.wrapping_add(1);
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestBus {
        mem: Vec<u8>,
        out: Vec<(Time, u16, u8)>,
        in_value: u8,
    }

    impl TestBus {
        fn with_program(at: u16, code: &[u8]) -> Self {
            let mut mem = vec![0u8; 0x10000];
            mem[at as usize..at as usize + code.len()].copy_from_slice(code);
            Self {
                mem,
                out: Vec::new(),
                in_value: 0xFF,
            }
        }
    }

    impl Bus for TestBus {
        fn read(&mut self, _time: Time, addr: u16) -> u8 {
            self.mem[addr as usize]
        }
        fn write(&mut self, _time: Time, addr: u16, data: u8) {
            self.mem[addr as usize] = data;
        }
        fn code(&self, addr: u16) -> u8 {
            self.mem[addr as usize]
        }
        fn port_in(&mut self, _time: Time, _port: u16) -> u8 {
            self.in_value
        }
        fn port_out(&mut self, time: Time, port: u16, data: u8) {
            self.out.push((time, port, data));
        }
    }

    fn cpu_at(pc: u16) -> Z80 {
        let mut cpu = Z80::new();
        cpu.regs.pc = pc;
        cpu.regs.sp = 0xF000;
        cpu
    }

    #[test]
    fn call_ret_returns_to_idle_halt() {
        let mut bus = TestBus::with_program(0x8000, &[0x3E, 0x07, 0xC9]);
        bus.mem[0xFFFF] = HALT_OPCODE;
        let mut cpu = cpu_at(0);
        cpu.call(&mut bus, 0x8000, 0xFFFF);
        assert!(cpu.run(1000, &mut bus));
        assert_eq!(cpu.regs.pc, 0xFFFF);
        assert_eq!(cpu.regs.a(), 7);
        assert_eq!(cpu.regs.sp, 0xF000);
        assert_eq!(cpu.time(), 7 + 10);
    }

    #[test]
    fn out_uses_accumulator_as_port_high_byte() {
        // LD A,$FF; OUT ($FD),A; LD BC,$BFFD; OUT (C),A; HALT
        let mut bus = TestBus::with_program(
            0x8000,
            &[0x3E, 0xFF, 0xD3, 0xFD, 0x01, 0xFD, 0xBF, 0xED, 0x79, HALT_OPCODE],
        );
        let mut cpu = cpu_at(0x8000);
        cpu.run(1000, &mut bus);
        assert_eq!(bus.out, vec![(7 + 11, 0xFFFD, 0xFF), (7 + 11 + 10 + 12, 0xBFFD, 0xFF)]);
    }

    #[test]
    fn djnz_loop_timing() {
        // LD B,3; DJNZ -2; HALT
        let mut bus = TestBus::with_program(0x8000, &[0x06, 0x03, 0x10, 0xFE, HALT_OPCODE]);
        let mut cpu = cpu_at(0x8000);
        cpu.run(1000, &mut bus);
        assert_eq!(cpu.regs.b(), 0);
        assert_eq!(cpu.time(), 7 + 13 + 13 + 8);
    }

    #[test]
    fn indexed_load_and_store() {
        // LD IX,$9000; LD (IX+5),$42; LD A,(IX+5); LD H,(IX+5); HALT
        let mut bus = TestBus::with_program(
            0x8000,
            &[
                0xDD, 0x21, 0x00, 0x90, 0xDD, 0x36, 0x05, 0x42, 0xDD, 0x7E, 0x05, 0xDD, 0x66,
                0x05, HALT_OPCODE,
            ],
        );
        let mut cpu = cpu_at(0x8000);
        cpu.run(1000, &mut bus);
        assert_eq!(bus.mem[0x9005], 0x42);
        assert_eq!(cpu.regs.a(), 0x42);
        assert_eq!(cpu.regs.h(), 0x42);
        assert_eq!(cpu.regs.ix, 0x9000);
        assert_eq!(cpu.time(), 14 + 19 + 19 + 19);
    }

    #[test]
    fn undocumented_index_halves() {
        // LD IX,$1234; LD A,IXH; ADD A,IXL; HALT
        let mut bus = TestBus::with_program(
            0x8000,
            &[0xDD, 0x21, 0x34, 0x12, 0xDD, 0x7C, 0xDD, 0x85, HALT_OPCODE],
        );
        let mut cpu = cpu_at(0x8000);
        cpu.run(1000, &mut bus);
        assert_eq!(cpu.regs.a(), 0x46);
        assert_eq!(cpu.time(), 14 + 8 + 8);
    }

    #[test]
    fn ddcb_set_bit_and_copy() {
        // LD IY,$9000; SET 3,(IY+1); BIT 3,(IY+1); HALT
        let mut bus = TestBus::with_program(
            0x8000,
            &[0xFD, 0x21, 0x00, 0x90, 0xFD, 0xCB, 0x01, 0xDE, 0xFD, 0xCB, 0x01, 0x5E, HALT_OPCODE],
        );
        let mut cpu = cpu_at(0x8000);
        cpu.run(1000, &mut bus);
        assert_eq!(bus.mem[0x9001], 0x08);
        assert_eq!(cpu.regs.f() & ZF, 0);
        assert_eq!(cpu.time(), 14 + 23 + 20);
    }

    #[test]
    fn alu_flags_match_reference() {
        // LD A,$7F; ADD A,1  -> 0x80, S V H set
        let mut bus = TestBus::with_program(0x8000, &[0x3E, 0x7F, 0xC6, 0x01, HALT_OPCODE]);
        let mut cpu = cpu_at(0x8000);
        cpu.run(1000, &mut bus);
        assert_eq!(cpu.regs.a(), 0x80);
        assert_eq!(cpu.regs.f(), SF | HF | PF);

        // LD A,$10; SUB $20 -> 0xF0, borrow
        let mut bus = TestBus::with_program(0x8000, &[0x3E, 0x10, 0xD6, 0x20, HALT_OPCODE]);
        let mut cpu = cpu_at(0x8000);
        cpu.run(1000, &mut bus);
        assert_eq!(cpu.regs.a(), 0xF0);
        assert_eq!(cpu.regs.f(), SF | YF | NF | CF);

        // LD A,$15; ADD A,$27; DAA -> 0x42
        let mut bus = TestBus::with_program(0x8000, &[0x3E, 0x15, 0xC6, 0x27, 0x27, HALT_OPCODE]);
        let mut cpu = cpu_at(0x8000);
        cpu.run(1000, &mut bus);
        assert_eq!(cpu.regs.a(), 0x42);
    }

    #[test]
    fn ldir_copies_block_with_repeat_cost() {
        // LD HL,$9000; LD DE,$A000; LD BC,3; LDIR; HALT
        let mut bus = TestBus::with_program(
            0x8000,
            &[
                0x21, 0x00, 0x90, 0x11, 0x00, 0xA0, 0x01, 0x03, 0x00, 0xED, 0xB0, HALT_OPCODE,
            ],
        );
        bus.mem[0x9000..0x9003].copy_from_slice(&[1, 2, 3]);
        let mut cpu = cpu_at(0x8000);
        cpu.run(1000, &mut bus);
        assert_eq!(&bus.mem[0xA000..0xA003], &[1, 2, 3]);
        assert_eq!(cpu.regs.bc, 0);
        assert_eq!(cpu.time(), 30 + 21 + 21 + 16);
    }

    #[test]
    fn sbc_hl_sets_zero_and_carry() {
        // LD HL,$1000; LD DE,$1000; SCF; CCF; SBC HL,DE
        let mut bus = TestBus::with_program(
            0x8000,
            &[0x21, 0x00, 0x10, 0x11, 0x00, 0x10, 0x37, 0x3F, 0xED, 0x52, HALT_OPCODE],
        );
        let mut cpu = cpu_at(0x8000);
        cpu.run(1000, &mut bus);
        assert_eq!(cpu.regs.hl, 0);
        assert_eq!(cpu.regs.f() & (ZF | CF | NF), ZF | NF);
    }

    #[test]
    fn undefined_ed_opcode_is_counted_and_skipped() {
        // ED 00; LD A,1; HALT
        let mut bus = TestBus::with_program(0x8000, &[0xED, 0x00, 0x3E, 0x01, HALT_OPCODE]);
        let mut cpu = cpu_at(0x8000);
        assert!(cpu.run(1000, &mut bus));
        assert_eq!(cpu.error_count(), 1);
        assert_eq!(cpu.regs.a(), 1);
        assert_eq!(cpu.regs.pc, 0x8004);
        assert_eq!(cpu.time(), 8 + 7);
    }

    #[test]
    fn halt_then_interrupt_mode1_resumes_after_halt() {
        // EI; HALT; LD A,9; HALT    and an ISR at 0x38 that does RET... EI; RET
        let mut bus = TestBus::with_program(0x8000, &[0xFB, HALT_OPCODE, 0x3E, 0x09, HALT_OPCODE]);
        bus.mem[0x38] = 0xFB;
        bus.mem[0x39] = 0xC9;
        let mut cpu = cpu_at(0x8000);
        cpu.regs.im = 1;
        assert!(cpu.run(1000, &mut bus));
        assert_eq!(cpu.regs.pc, 0x8001);
        assert!(cpu.interrupt(&mut bus));
        assert_eq!(cpu.regs.pc, 0x0038);
        assert!(cpu.run(1000, &mut bus));
        assert_eq!(cpu.regs.pc, 0x8004);
        assert_eq!(cpu.regs.a(), 9);
    }

    #[test]
    fn interrupt_refused_when_disabled() {
        let mut bus = TestBus::with_program(0x8000, &[HALT_OPCODE]);
        let mut cpu = cpu_at(0x8000);
        assert!(!cpu.interrupt(&mut bus));
        assert_eq!(cpu.regs.pc, 0x8000);
    }

    #[test]
    fn in_r_c_sets_parity() {
        // LD BC,$00FE; IN A,(C)
        let mut bus = TestBus::with_program(0x8000, &[0x01, 0xFE, 0x00, 0xED, 0x78, HALT_OPCODE]);
        bus.in_value = 0x03;
        let mut cpu = cpu_at(0x8000);
        cpu.run(1000, &mut bus);
        assert_eq!(cpu.regs.a(), 0x03);
        assert_ne!(cpu.regs.f() & PF, 0);
    }

    #[test]
    fn register_pairs_expose_bytes() {
        let mut regs = Registers::default();
        regs.set_b(0x12);
        regs.set_c(0x34);
        assert_eq!(regs.bc, 0x1234);
        regs.hl = 0xABCD;
        assert_eq!((regs.h(), regs.l()), (0xAB, 0xCD));
        regs.fill_pairs(0x0101);
        assert_eq!(regs.iy, 0x0101);
    }
}
