//! Executes compiled blocks.

use crate::psx::bus::{to_physical, Bus, BusWidth};
use crate::psx::cpu::cop0::Exception;
use crate::psx::cpu::{PendingWrite, R3000A};
use crate::psx::memctl::CACHE_CONTROL_RANGE;
use crate::psx::scheduler::Scheduler;

use super::arena::Arena;
use super::cache::BlockCache;
use super::op::{Alu, AluImm, Cond, MulDiv, Op, Shift, Side, Trap, Write};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The block ran; `executed` guest instructions were fetched.
    Exited { executed: u32 },
    /// The slot pointed at the stub.
    Stub,
}

enum Flow {
    Next,
    Exit,
}

pub struct Context<'a> {
    pub cpu: &'a mut R3000A,
    pub bus: &'a mut Bus,
    pub scheduler: &'a mut Scheduler,
    pub cache: &'a mut BlockCache,
    pub arena: &'a Arena,
}

impl<'a> Context<'a> {
    pub fn execute(&mut self, entry: usize) -> Outcome {
        let arena = self.arena;
        let ops = arena.ops();

        let mut ip = entry;
        let mut executed = 0;

        loop {
            let op = ops[ip];
            ip += 1;

            match op {
                Op::Stub => return Outcome::Stub,
                Op::Enter { .. } | Op::Fetch { .. } | Op::FetchDelaySlot { .. } => executed += 1,
                _ => (),
            }

            match self.run(op) {
                Ok(Flow::Next) => (),
                Ok(Flow::Exit) => return Outcome::Exited { executed: executed },
                Err(exception) => {
                    self.cpu.regs.transfer();
                    self.cpu.enter_exception(exception);

                    return Outcome::Exited { executed: executed };
                }
            }
        }
    }

    fn reg(&self, index: usize) -> u32 {
        self.cpu.regs.gpr[index]
    }

    fn write(&mut self, reg: usize, value: u32, write: Write) {
        let regs = &mut self.cpu.regs;

        match write {
            Write::Now => regs.set_reg(reg, value),
            Write::Direct => regs.direct = PendingWrite::new(reg, value),
            Write::Delayed => regs.delayed = PendingWrite::new(reg, value),
        }
    }

    fn run(&mut self, op: Op) -> Result<Flow, Exception> {
        match op {
            Op::Stub => unreachable!(),
            Op::Enter { pc } | Op::FetchDelaySlot { pc } => {
                let regs = &mut self.cpu.regs;

                regs.current_pc = pc;
                regs.pc = regs.next_pc;
                regs.next_pc = regs.pc.wrapping_add(4);
                regs.delay_slot = regs.branch;
                regs.branch = false;
            }
            Op::Fetch { pc } => {
                let regs = &mut self.cpu.regs;

                regs.current_pc = pc;
                regs.pc = pc.wrapping_add(4);
                regs.next_pc = pc.wrapping_add(8);
                regs.delay_slot = false;
            }
            Op::LeaveIfDelaySlot => {
                if self.cpu.regs.delay_slot {
                    return Ok(Flow::Exit);
                }
            }
            Op::Epilogue => self.cpu.regs.transfer(),
            Op::Exit => return Ok(Flow::Exit),

            Op::Shift { kind, rd, rt, sa, write } => {
                let v = shift(kind, self.reg(rt), sa);
                self.write(rd, v, write);
            }
            Op::ShiftVariable { kind, rd, rt, rs, write } => {
                let v = shift(kind, self.reg(rt), self.reg(rs) & 0x1f);
                self.write(rd, v, write);
            }
            Op::Alu { kind, rd, rs, rt, write } => {
                let v = alu(kind, self.reg(rs), self.reg(rt));
                self.write(rd, v, write);
            }
            Op::AluTrap { kind, rd, rs, rt, write } => {
                let (a, b) = (self.reg(rs) as i32, self.reg(rt) as i32);

                let v = match kind {
                    Trap::Add => a.checked_add(b),
                    Trap::Sub => a.checked_sub(b),
                };

                match v {
                    Some(v) => self.write(rd, v as u32, write),
                    None => return Err(Exception::Overflow),
                }
            }
            Op::AluImm { kind, rt, rs, imm, write } => {
                let v = alu_imm(kind, self.reg(rs), imm);
                self.write(rt, v, write);
            }
            Op::AddiTrap { rt, rs, imm, write } => {
                match (self.reg(rs) as i32).checked_add(imm as i32) {
                    Some(v) => self.write(rt, v as u32, write),
                    None => return Err(Exception::Overflow),
                }
            }
            Op::Lui { rt, value, write } => self.write(rt, value, write),

            Op::MulDiv { kind, rs, rt } => {
                let (hi, lo) = mul_div(kind, self.reg(rs), self.reg(rt));

                self.cpu.regs.hi = hi;
                self.cpu.regs.lo = lo;
            }
            Op::Mfhi { rd, write } => {
                let v = self.cpu.regs.hi;
                self.write(rd, v, write);
            }
            Op::Mflo { rd, write } => {
                let v = self.cpu.regs.lo;
                self.write(rd, v, write);
            }
            Op::Mthi { rs } => self.cpu.regs.hi = self.reg(rs),
            Op::Mtlo { rs } => self.cpu.regs.lo = self.reg(rs),

            Op::Jump { target } => {
                self.cpu.regs.next_pc = target;
                self.cpu.regs.branch = true;
            }
            Op::JumpReg { rs } => {
                self.cpu.regs.next_pc = self.reg(rs);
                self.cpu.regs.branch = true;
            }
            Op::Link { rd, value, write } => self.write(rd, value, write),
            Op::Branch { cond, rs, rt, target } => {
                let (a, b) = (self.reg(rs) as i32, self.reg(rt) as i32);

                let taken = match cond {
                    Cond::Eq => a == b,
                    Cond::Ne => a != b,
                    Cond::Lez => a <= 0,
                    Cond::Gtz => a > 0,
                    Cond::Ltz => a < 0,
                    Cond::Gez => a >= 0,
                };

                if taken {
                    self.cpu.regs.next_pc = target;
                }

                self.cpu.regs.branch = true;
            }

            Op::Load { width, signed, rt, rs, offset, write } => {
                let address = self.reg(rs).wrapping_add(offset);
                let v = self.load(width, address)?;

                let v = match (width, signed) {
                    (BusWidth::Byte, true) => v as u8 as i8 as u32,
                    (BusWidth::Half, true) => v as u16 as i16 as u32,
                    _ => v,
                };

                self.write(rt, v, write);
            }
            Op::LoadMerge { side, rt, rs, offset, write } => {
                let address = self.reg(rs).wrapping_add(offset);
                let word = self.load(BusWidth::Word, address & !0x3)?;
                let current = self.cpu.regs.merge_base(rt);

                let v = match (side, address & 0x3) {
                    (Side::Left, 0) => (current & 0x00ff_ffff) | (word << 24),
                    (Side::Left, 1) => (current & 0x0000_ffff) | (word << 16),
                    (Side::Left, 2) => (current & 0x0000_00ff) | (word << 8),
                    (Side::Left, _) => word,
                    (Side::Right, 0) => word,
                    (Side::Right, 1) => (current & 0xff00_0000) | (word >> 8),
                    (Side::Right, 2) => (current & 0xffff_0000) | (word >> 16),
                    (Side::Right, _) => (current & 0xffff_ff00) | (word >> 24),
                };

                self.write(rt, v, write);
            }
            Op::Store { width, rt, rs, offset } => {
                let address = self.reg(rs).wrapping_add(offset);
                let v = self.reg(rt);

                self.store(width, address, v)?;
            }
            Op::StoreMerge { side, rt, rs, offset } => {
                let address = self.reg(rs).wrapping_add(offset);
                let aligned = address & !0x3;
                let v = self.reg(rt);
                let current = self.load(BusWidth::Word, aligned)?;

                let merged = match (side, address & 0x3) {
                    (Side::Left, 0) => (current & 0xffff_ff00) | (v >> 24),
                    (Side::Left, 1) => (current & 0xffff_0000) | (v >> 16),
                    (Side::Left, 2) => (current & 0xff00_0000) | (v >> 8),
                    (Side::Left, _) => v,
                    (Side::Right, 0) => v,
                    (Side::Right, 1) => (current & 0x0000_00ff) | (v << 8),
                    (Side::Right, 2) => (current & 0x0000_ffff) | (v << 16),
                    (Side::Right, _) => (current & 0x00ff_ffff) | (v << 24),
                };

                self.store(BusWidth::Word, aligned, merged)?;
            }

            Op::Mfc0 { rt, rd, write } => {
                self.require_cop0()?;

                let v = self.cpu.cop0.read(rd);
                self.write(rt, v, write);
            }
            Op::Mtc0 { rt, rd } => {
                self.require_cop0()?;

                let v = self.reg(rt);
                let isolated = self.cpu.cop0.isolate_cache();

                self.cpu.cop0.write(rd, v);

                if self.cpu.cop0.isolate_cache() != isolated {
                    self.cache.invalidate_ram();
                }
            }
            Op::Rfe => {
                self.require_cop0()?;
                self.cpu.cop0.leave_exception();
            }

            Op::Mfc2 { rt, rd, write } => {
                self.require_cop2()?;

                let v = self.cpu.gte.read_data(rd);
                self.write(rt, v, write);
            }
            Op::Cfc2 { rt, rd, write } => {
                self.require_cop2()?;

                let v = self.cpu.gte.read_control(rd);
                self.write(rt, v, write);
            }
            Op::Mtc2 { rt, rd } => {
                self.require_cop2()?;

                let v = self.reg(rt);
                self.cpu.gte.write_data(rd, v);
            }
            Op::Ctc2 { rt, rd } => {
                self.require_cop2()?;

                let v = self.reg(rt);
                self.cpu.gte.write_control(rd, v);
            }
            Op::Lwc2 { rt, rs, offset } => {
                self.require_cop2()?;

                let address = self.reg(rs).wrapping_add(offset);
                let v = self.load(BusWidth::Word, address)?;

                self.cpu.gte.write_data(rt, v);
            }
            Op::Swc2 { rt, rs, offset } => {
                self.require_cop2()?;

                let address = self.reg(rs).wrapping_add(offset);
                let v = self.cpu.gte.read_data(rt);

                self.store(BusWidth::Word, address, v)?;
            }
            Op::Cop2 { command } => {
                self.require_cop2()?;
                self.cpu.gte.command(command);
            }

            Op::Raise { exception } => return Err(exception),
        }

        Ok(Flow::Next)
    }

    fn require_cop0(&self) -> Result<(), Exception> {
        if self.cpu.cop0.cop0_usable() {
            Ok(())
        } else {
            Err(Exception::CopUnusable(0))
        }
    }

    fn require_cop2(&self) -> Result<(), Exception> {
        if self.cpu.cop0.cop2_usable() {
            Ok(())
        } else {
            Err(Exception::CopUnusable(2))
        }
    }

    fn load(&mut self, width: BusWidth, address: u32) -> Result<u32, Exception> {
        if (address & width.alignment_mask()) != 0 {
            return Err(Exception::AddrLoad(address));
        }

        if self.cpu.cop0.isolate_cache() {
            return Ok(0);
        }

        let scheduler = &mut *self.scheduler;

        Ok(match width {
            BusWidth::Byte => self.bus.read8(address, scheduler) as u32,
            BusWidth::Half => self.bus.read16(address, scheduler) as u32,
            BusWidth::Word => self.bus.read32(address, scheduler),
        })
    }

    fn store(&mut self, width: BusWidth, address: u32, value: u32) -> Result<(), Exception> {
        if (address & width.alignment_mask()) != 0 {
            return Err(Exception::AddrStore(address));
        }

        if self.cpu.cop0.isolate_cache() {
            return Ok(());
        }

        let scheduler = &mut *self.scheduler;

        match width {
            BusWidth::Byte => self.bus.write8(address, value as u8, scheduler),
            BusWidth::Half => self.bus.write16(address, value as u16, scheduler),
            BusWidth::Word => self.bus.write32(address, value, scheduler),
        }

        let physical = to_physical(address);

        if CACHE_CONTROL_RANGE.contains(physical) {
            self.cache.invalidate_ram();
        } else {
            self.cache.invalidate(physical, self.arena);
        }

        Ok(())
    }
}

fn shift(kind: Shift, v: u32, amount: u32) -> u32 {
    match kind {
        Shift::Sll => v << amount,
        Shift::Srl => v >> amount,
        Shift::Sra => ((v as i32) >> amount) as u32,
    }
}

fn alu(kind: Alu, a: u32, b: u32) -> u32 {
    match kind {
        Alu::Addu => a.wrapping_add(b),
        Alu::Subu => a.wrapping_sub(b),
        Alu::And => a & b,
        Alu::Or => a | b,
        Alu::Xor => a ^ b,
        Alu::Nor => !(a | b),
        Alu::Slt => ((a as i32) < (b as i32)) as u32,
        Alu::Sltu => (a < b) as u32,
    }
}

fn alu_imm(kind: AluImm, a: u32, imm: u32) -> u32 {
    match kind {
        AluImm::Addiu => a.wrapping_add(imm),
        AluImm::Slti => ((a as i32) < (imm as i32)) as u32,
        AluImm::Sltiu => (a < imm) as u32,
        AluImm::Andi => a & imm,
        AluImm::Ori => a | imm,
        AluImm::Xori => a ^ imm,
    }
}

/// Returns (HI, LO). Division by zero and the single overflowing signed
/// division produce the fixed results the hardware does.
fn mul_div(kind: MulDiv, a: u32, b: u32) -> (u32, u32) {
    match kind {
        MulDiv::Mult => {
            let r = (a as i32 as i64) * (b as i32 as i64);
            ((r >> 32) as u32, r as u32)
        }
        MulDiv::Multu => {
            let r = (a as u64) * (b as u64);
            ((r >> 32) as u32, r as u32)
        }
        MulDiv::Div => {
            let (n, d) = (a as i32, b as i32);

            if d == 0 {
                (n as u32, if n >= 0 { 0xffff_ffff } else { 0x0000_0001 })
            } else if n as u32 == 0x8000_0000 && d == -1 {
                (0, 0x8000_0000)
            } else {
                ((n % d) as u32, (n / d) as u32)
            }
        }
        MulDiv::Divu => {
            if b == 0 {
                (a, 0xffff_ffff)
            } else {
                (a % b, a / b)
            }
        }
    }
}
