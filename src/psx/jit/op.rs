use crate::psx::bus::BusWidth;
use crate::psx::cpu::cop0::Exception;

/// Where a result lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Write {
    /// Straight into the register file.
    Now,
    /// Into the direct-write slot, applied by the epilogue.
    Direct,
    /// Into the delayed-load slot, visible two epilogues later.
    Delayed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shift {
    Sll,
    Srl,
    Sra,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Alu {
    Addu,
    Subu,
    And,
    Or,
    Xor,
    Nor,
    Slt,
    Sltu,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trap {
    Add,
    Sub,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluImm {
    Addiu,
    Slti,
    Sltiu,
    Andi,
    Ori,
    Xori,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MulDiv {
    Mult,
    Multu,
    Div,
    Divu,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Lez,
    Gtz,
    Ltz,
    Gez,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// One pre-decoded micro-operation. Register operands are GPR indices;
/// addresses and immediates are already sign-extended and relocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    /// Shared trampoline for slots with no live block.
    Stub,

    /// First instruction of a block: takes the PC transition at run time.
    Enter { pc: u32 },
    /// Fetch with a statically known PC and no pending branch.
    Fetch { pc: u32 },
    /// Fetch of a delay slot inside the block.
    FetchDelaySlot { pc: u32 },
    /// Ends the block when the first instruction turned out to be a delay slot.
    LeaveIfDelaySlot,
    /// Register transfer after an instruction.
    Epilogue,
    Exit,

    Shift { kind: Shift, rd: usize, rt: usize, sa: u32, write: Write },
    ShiftVariable { kind: Shift, rd: usize, rt: usize, rs: usize, write: Write },
    Alu { kind: Alu, rd: usize, rs: usize, rt: usize, write: Write },
    AluTrap { kind: Trap, rd: usize, rs: usize, rt: usize, write: Write },
    AluImm { kind: AluImm, rt: usize, rs: usize, imm: u32, write: Write },
    AddiTrap { rt: usize, rs: usize, imm: u32, write: Write },
    Lui { rt: usize, value: u32, write: Write },

    MulDiv { kind: MulDiv, rs: usize, rt: usize },
    Mfhi { rd: usize, write: Write },
    Mflo { rd: usize, write: Write },
    Mthi { rs: usize },
    Mtlo { rs: usize },

    Jump { target: u32 },
    JumpReg { rs: usize },
    Link { rd: usize, value: u32, write: Write },
    Branch { cond: Cond, rs: usize, rt: usize, target: u32 },

    Load { width: BusWidth, signed: bool, rt: usize, rs: usize, offset: u32, write: Write },
    LoadMerge { side: Side, rt: usize, rs: usize, offset: u32, write: Write },
    Store { width: BusWidth, rt: usize, rs: usize, offset: u32 },
    StoreMerge { side: Side, rt: usize, rs: usize, offset: u32 },

    Mfc0 { rt: usize, rd: usize, write: Write },
    Mtc0 { rt: usize, rd: usize },
    Rfe,

    Mfc2 { rt: usize, rd: usize, write: Write },
    Cfc2 { rt: usize, rd: usize, write: Write },
    Mtc2 { rt: usize, rd: usize },
    Ctc2 { rt: usize, rd: usize },
    Lwc2 { rt: usize, rs: usize, offset: u32 },
    Swc2 { rt: usize, rs: usize, offset: u32 },
    Cop2 { command: u32 },

    /// Unconditional exception (SYSCALL, BREAK, reserved or unusable opcodes).
    Raise { exception: Exception },
}

impl Op {
    /// Marks the start of a guest instruction.
    pub fn is_fetch(&self) -> bool {
        match self {
            Op::Enter { .. } | Op::Fetch { .. } | Op::FetchDelaySlot { .. } => true,
            _ => false,
        }
    }
}
