//! Per-opcode code generation into the micro-op format.

use crate::psx::bus::BusWidth;
use crate::psx::cpu::cop0::Exception;
use crate::psx::cpu::hazard::RegisterHazards;
use crate::psx::cpu::instruction::Instruction;

use super::op::{Alu, AluImm, Cond, MulDiv, Op, Shift, Side, Trap, Write};

/// What the translator knows about the ready-load slot at an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadySlot {
    /// Block entry: a load from the previous block may still be in flight.
    Unknown,
    Known(Option<usize>),
}

/// Position of the instruction being emitted within its block.
#[derive(Clone, Copy, Debug)]
pub struct Window {
    pub first: bool,
    pub last: bool,
    /// Hazards of the following instruction in the same block.
    pub next: Option<RegisterHazards>,
}

pub struct Emitter {
    code: Vec<Op>,

    ready: ReadySlot,
    delayed: Option<usize>,
    slot_used: bool,
}

impl Emitter {
    pub fn new() -> Emitter {
        Emitter {
            code: Vec::new(),

            ready: ReadySlot::Unknown,
            delayed: None,
            slot_used: false,
        }
    }

    pub fn push(&mut self, op: Op) {
        self.code.push(op);
    }

    pub fn finish(self) -> Vec<Op> {
        self.code
    }

    fn alu_write(&mut self, reg: usize) -> Write {
        let write = match self.ready {
            ReadySlot::Known(None) => Write::Now,
            ReadySlot::Known(Some(r)) if r != reg => Write::Now,
            _ => Write::Direct,
        };

        if write == Write::Direct {
            self.slot_used = true;
        }

        write
    }

    fn delayed_write(&mut self, reg: usize, window: &Window) -> Write {
        let exposed = match window.next {
            Some(hazards) => hazards.touches(reg),
            None => true,
        };

        if window.first || window.last || exposed {
            self.slot_used = true;
            self.delayed = if reg != 0 { Some(reg) } else { None };
            return Write::Delayed;
        }

        self.alu_write(reg)
    }

    /// Emits the register transfer unless it is statically a no-op, and
    /// advances the ready-slot tracking to the next instruction.
    pub fn end_instruction(&mut self) {
        let needed = match self.ready {
            ReadySlot::Known(None) => self.slot_used,
            _ => true,
        };

        if needed {
            self.push(Op::Epilogue);
            self.ready = ReadySlot::Known(self.delayed);
        } else {
            self.ready = ReadySlot::Known(None);
        }

        self.delayed = None;
        self.slot_used = false;
    }

    /// Emits the effect of `i`, fetched from `pc`. Returns true when the
    /// instruction unconditionally raises an exception.
    pub fn instruction(&mut self, i: Instruction, pc: u32, window: &Window) -> bool {
        let (rs, rt) = (i.rs(), i.rt());

        match i.op() {
            0x00 => return self.special(i, pc),
            0x01 => {
                let cond = if (rt & 0x01) != 0 { Cond::Gez } else { Cond::Ltz };
                self.push(Op::Branch { cond: cond, rs: rs, rt: 0, target: branch_target(i, pc) });

                if (rt & 0x1e) == 0x10 {
                    self.link(31, pc);
                }
            }
            0x02 => self.push(Op::Jump { target: jump_target(i, pc) }),
            0x03 => {
                self.push(Op::Jump { target: jump_target(i, pc) });
                self.link(31, pc);
            }
            0x04 => self.branch(Cond::Eq, i, pc),
            0x05 => self.branch(Cond::Ne, i, pc),
            0x06 => self.branch(Cond::Lez, i, pc),
            0x07 => self.branch(Cond::Gtz, i, pc),
            0x08 => {
                let write = self.alu_write(rt);
                self.push(Op::AddiTrap { rt: rt, rs: rs, imm: i.imm_se(), write: write });
            }
            0x09 => self.alu_imm(AluImm::Addiu, i.imm_se(), i),
            0x0a => self.alu_imm(AluImm::Slti, i.imm_se(), i),
            0x0b => self.alu_imm(AluImm::Sltiu, i.imm_se(), i),
            0x0c => self.alu_imm(AluImm::Andi, i.imm16(), i),
            0x0d => self.alu_imm(AluImm::Ori, i.imm16(), i),
            0x0e => self.alu_imm(AluImm::Xori, i.imm16(), i),
            0x0f => {
                let write = self.alu_write(rt);
                self.push(Op::Lui { rt: rt, value: i.imm16() << 16, write: write });
            }
            0x10 => return self.cop0(i, window),
            0x11 => return self.raise(Exception::CopUnusable(1)),
            0x12 => return self.cop2(i, window),
            0x13 => return self.raise(Exception::CopUnusable(3)),
            0x20 => self.load(BusWidth::Byte, true, i, window),
            0x21 => self.load(BusWidth::Half, true, i, window),
            0x22 => self.load_merge(Side::Left, i, window),
            0x23 => self.load(BusWidth::Word, false, i, window),
            0x24 => self.load(BusWidth::Byte, false, i, window),
            0x25 => self.load(BusWidth::Half, false, i, window),
            0x26 => self.load_merge(Side::Right, i, window),
            0x28 => self.push(Op::Store { width: BusWidth::Byte, rt: rt, rs: rs, offset: i.imm_se() }),
            0x29 => self.push(Op::Store { width: BusWidth::Half, rt: rt, rs: rs, offset: i.imm_se() }),
            0x2a => self.push(Op::StoreMerge { side: Side::Left, rt: rt, rs: rs, offset: i.imm_se() }),
            0x2b => self.push(Op::Store { width: BusWidth::Word, rt: rt, rs: rs, offset: i.imm_se() }),
            0x2e => self.push(Op::StoreMerge { side: Side::Right, rt: rt, rs: rs, offset: i.imm_se() }),
            0x30 | 0x38 => return self.raise(Exception::CopUnusable(0)),
            0x31 | 0x39 => return self.raise(Exception::CopUnusable(1)),
            0x33 | 0x3b => return self.raise(Exception::CopUnusable(3)),
            0x32 => self.push(Op::Lwc2 { rt: rt, rs: rs, offset: i.imm_se() }),
            0x3a => self.push(Op::Swc2 { rt: rt, rs: rs, offset: i.imm_se() }),
            _ => return self.raise(Exception::Reserved),
        }

        false
    }

    fn special(&mut self, i: Instruction, pc: u32) -> bool {
        let (rs, rt, rd) = (i.rs(), i.rt(), i.rd());

        match i.funct() {
            0x00 => self.shift(Shift::Sll, i),
            0x02 => self.shift(Shift::Srl, i),
            0x03 => self.shift(Shift::Sra, i),
            0x04 => self.shift_variable(Shift::Sll, i),
            0x06 => self.shift_variable(Shift::Srl, i),
            0x07 => self.shift_variable(Shift::Sra, i),
            0x08 => self.push(Op::JumpReg { rs: rs }),
            0x09 => {
                self.push(Op::JumpReg { rs: rs });
                self.link(rd, pc);
            }
            0x0c => return self.raise(Exception::Syscall),
            0x0d => return self.raise(Exception::Breakpoint),
            0x10 => {
                let write = self.alu_write(rd);
                self.push(Op::Mfhi { rd: rd, write: write });
            }
            0x11 => self.push(Op::Mthi { rs: rs }),
            0x12 => {
                let write = self.alu_write(rd);
                self.push(Op::Mflo { rd: rd, write: write });
            }
            0x13 => self.push(Op::Mtlo { rs: rs }),
            0x18 => self.push(Op::MulDiv { kind: MulDiv::Mult, rs: rs, rt: rt }),
            0x19 => self.push(Op::MulDiv { kind: MulDiv::Multu, rs: rs, rt: rt }),
            0x1a => self.push(Op::MulDiv { kind: MulDiv::Div, rs: rs, rt: rt }),
            0x1b => self.push(Op::MulDiv { kind: MulDiv::Divu, rs: rs, rt: rt }),
            0x20 => self.alu_trap(Trap::Add, i),
            0x21 => self.alu(Alu::Addu, i),
            0x22 => self.alu_trap(Trap::Sub, i),
            0x23 => self.alu(Alu::Subu, i),
            0x24 => self.alu(Alu::And, i),
            0x25 => self.alu(Alu::Or, i),
            0x26 => self.alu(Alu::Xor, i),
            0x27 => self.alu(Alu::Nor, i),
            0x2a => self.alu(Alu::Slt, i),
            0x2b => self.alu(Alu::Sltu, i),
            _ => return self.raise(Exception::Reserved),
        }

        false
    }

    fn cop0(&mut self, i: Instruction, window: &Window) -> bool {
        let (rt, rd) = (i.rt(), i.rd());

        match i.cop_op() {
            0x00 => {
                let write = self.delayed_write(rt, window);
                self.push(Op::Mfc0 { rt: rt, rd: rd, write: write });
            }
            0x04 => self.push(Op::Mtc0 { rt: rt, rd: rd }),
            0x10 if i.funct() == 0x10 => self.push(Op::Rfe),
            _ => return self.raise(Exception::Reserved),
        }

        false
    }

    fn cop2(&mut self, i: Instruction, window: &Window) -> bool {
        let (rt, rd) = (i.rt(), i.rd());

        if i.is_gte_command() {
            self.push(Op::Cop2 { command: i.0 & 0x1ff_ffff });
            return false;
        }

        match i.cop_op() {
            0x00 => {
                let write = self.delayed_write(rt, window);
                self.push(Op::Mfc2 { rt: rt, rd: rd, write: write });
            }
            0x02 => {
                let write = self.delayed_write(rt, window);
                self.push(Op::Cfc2 { rt: rt, rd: rd, write: write });
            }
            0x04 => self.push(Op::Mtc2 { rt: rt, rd: rd }),
            0x06 => self.push(Op::Ctc2 { rt: rt, rd: rd }),
            _ => return self.raise(Exception::Reserved),
        }

        false
    }

    fn raise(&mut self, exception: Exception) -> bool {
        self.push(Op::Raise { exception: exception });
        true
    }

    fn shift(&mut self, kind: Shift, i: Instruction) {
        let write = self.alu_write(i.rd());
        self.push(Op::Shift { kind: kind, rd: i.rd(), rt: i.rt(), sa: i.sa(), write: write });
    }

    fn shift_variable(&mut self, kind: Shift, i: Instruction) {
        let write = self.alu_write(i.rd());
        self.push(Op::ShiftVariable { kind: kind, rd: i.rd(), rt: i.rt(), rs: i.rs(), write: write });
    }

    fn alu(&mut self, kind: Alu, i: Instruction) {
        let write = self.alu_write(i.rd());
        self.push(Op::Alu { kind: kind, rd: i.rd(), rs: i.rs(), rt: i.rt(), write: write });
    }

    fn alu_trap(&mut self, kind: Trap, i: Instruction) {
        let write = self.alu_write(i.rd());
        self.push(Op::AluTrap { kind: kind, rd: i.rd(), rs: i.rs(), rt: i.rt(), write: write });
    }

    fn alu_imm(&mut self, kind: AluImm, imm: u32, i: Instruction) {
        let write = self.alu_write(i.rt());
        self.push(Op::AluImm { kind: kind, rt: i.rt(), rs: i.rs(), imm: imm, write: write });
    }

    fn branch(&mut self, cond: Cond, i: Instruction, pc: u32) {
        self.push(Op::Branch { cond: cond, rs: i.rs(), rt: i.rt(), target: branch_target(i, pc) });
    }

    fn link(&mut self, rd: usize, pc: u32) {
        let write = self.alu_write(rd);
        self.push(Op::Link { rd: rd, value: pc.wrapping_add(8), write: write });
    }

    fn load(&mut self, width: BusWidth, signed: bool, i: Instruction, window: &Window) {
        let write = self.delayed_write(i.rt(), window);
        self.push(Op::Load { width: width, signed: signed, rt: i.rt(), rs: i.rs(), offset: i.imm_se(), write: write });
    }

    fn load_merge(&mut self, side: Side, i: Instruction, window: &Window) {
        let write = self.delayed_write(i.rt(), window);
        self.push(Op::LoadMerge { side: side, rt: i.rt(), rs: i.rs(), offset: i.imm_se(), write: write });
    }
}

fn branch_target(i: Instruction, pc: u32) -> u32 {
    pc.wrapping_add(4).wrapping_add(i.imm_se() << 2)
}

fn jump_target(i: Instruction, pc: u32) -> u32 {
    (pc.wrapping_add(4) & 0xf000_0000) | (i.target() << 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psx::cpu::hazard;

    fn window(first: bool, last: bool, next: u32) -> Window {
        Window {
            first: first,
            last: last,
            next: Some(hazard::analyze(Instruction(next))),
        }
    }

    // lw $5, 0($1)
    const LW_R5: u32 = 0x8c25_0000;
    // add $6, $5, $5
    const ADD_R6_R5_R5: u32 = 0x00a5_3020;
    // addiu $7, $7, 1
    const ADDIU_R7: u32 = 0x24e7_0001;

    #[test]
    fn load_before_consumer_is_delayed() {
        let mut e = Emitter::new();
        e.ready = ReadySlot::Known(None);

        e.instruction(Instruction(LW_R5), 0x8001_0000, &window(false, false, ADD_R6_R5_R5));

        match e.code[0] {
            Op::Load { write: Write::Delayed, rt: 5, .. } => (),
            op => panic!("unexpected {:?}", op),
        }
    }

    #[test]
    fn load_without_consumer_writes_now() {
        let mut e = Emitter::new();
        e.ready = ReadySlot::Known(None);

        e.instruction(Instruction(LW_R5), 0x8001_0000, &window(false, false, ADDIU_R7));
        e.end_instruction();

        match e.code[0] {
            Op::Load { write: Write::Now, .. } => (),
            op => panic!("unexpected {:?}", op),
        }
        assert_eq!(e.code.len(), 1);
    }

    #[test]
    fn load_at_block_edges_is_delayed() {
        for &(first, last) in &[(true, false), (false, true)] {
            let mut e = Emitter::new();
            e.ready = ReadySlot::Known(None);

            e.instruction(Instruction(LW_R5), 0x8001_0000, &window(first, last, ADDIU_R7));

            assert_eq!(e.delayed, Some(5));
        }
    }

    #[test]
    fn write_over_landing_load_goes_through_direct_slot() {
        let mut e = Emitter::new();
        e.ready = ReadySlot::Known(Some(5));

        // addiu $5, $5, 1
        e.instruction(Instruction(0x24a5_0001), 0x8001_0000, &window(false, false, 0));
        e.end_instruction();

        match e.code[0] {
            Op::AluImm { write: Write::Direct, .. } => (),
            op => panic!("unexpected {:?}", op),
        }
        assert_eq!(e.code[1], Op::Epilogue);
        assert_eq!(e.ready, ReadySlot::Known(None));
    }

    #[test]
    fn unknown_ready_slot_always_gets_an_epilogue() {
        let mut e = Emitter::new();

        e.instruction(Instruction(ADDIU_R7), 0xbfc0_0000, &window(true, false, 0));
        e.end_instruction();

        assert_eq!(e.code.last(), Some(&Op::Epilogue));
    }

    #[test]
    fn targets_are_resolved_statically() {
        let mut e = Emitter::new();
        e.ready = ReadySlot::Known(None);

        // beq $0, $0, -1
        e.instruction(Instruction(0x1000_ffff), 0x8001_0010, &window(false, false, 0));
        // jal 0x0004_0000
        e.instruction(Instruction(0x0c01_0000), 0x8001_0010, &window(false, false, 0));

        assert_eq!(e.code[0], Op::Branch { cond: Cond::Eq, rs: 0, rt: 0, target: 0x8001_0010 });
        assert_eq!(e.code[1], Op::Jump { target: 0x8004_0000 });
        assert_eq!(e.code[2], Op::Link { rd: 31, value: 0x8001_0018, write: Write::Now });
    }

    #[test]
    fn regimm_link_forms_always_link() {
        let mut e = Emitter::new();
        e.ready = ReadySlot::Known(None);

        // bltzal $4, 4
        e.instruction(Instruction(0x0490_0004), 0x8001_0000, &window(false, false, 0));

        assert_eq!(e.code[0], Op::Branch { cond: Cond::Ltz, rs: 4, rt: 0, target: 0x8001_0014 });
        assert_eq!(e.code[1], Op::Link { rd: 31, value: 0x8001_0008, write: Write::Now });
    }

    #[test]
    fn traps_raise_unconditionally() {
        let mut e = Emitter::new();

        assert!(e.instruction(Instruction(0x0000_000c), 0, &window(true, true, 0)));
        assert!(e.instruction(Instruction(0x4400_0000), 0, &window(true, true, 0)));
        assert_eq!(e.code[0], Op::Raise { exception: Exception::Syscall });
        assert_eq!(e.code[1], Op::Raise { exception: Exception::CopUnusable(1) });
    }
}
