pub mod cop0;
pub mod gte;
pub mod hazard;
pub mod instruction;

use serde::{Deserialize, Serialize};

use self::cop0::{Cop0, Exception};
use self::gte::Gte;

pub const RESET_VECTOR: u32 = 0xbfc0_0000;
pub const BOOT_EXCEPTION_VECTOR: u32 = 0xbfc0_0180;
pub const EXCEPTION_VECTOR: u32 = 0x8000_0080;

/// A register write waiting in one of the transfer slots. Register 0 means
/// the slot is empty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PendingWrite {
    pub reg: usize,
    pub value: u32,
}

impl PendingWrite {
    pub const NONE: PendingWrite = PendingWrite { reg: 0, value: 0 };

    pub fn new(reg: usize, value: u32) -> PendingWrite {
        PendingWrite {
            reg: reg,
            value: value,
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct RegisterFile {
    pub gpr: [u32; 32],

    pub hi: u32,
    pub lo: u32,

    pub pc: u32,
    pub next_pc: u32,
    pub current_pc: u32,

    /// A branch executed and the next fetch is its delay slot.
    pub branch: bool,
    /// The instruction being executed sits in a delay slot.
    pub delay_slot: bool,

    pub direct: PendingWrite,
    pub delayed: PendingWrite,
    pub ready: PendingWrite,
}

impl RegisterFile {
    pub fn new() -> RegisterFile {
        RegisterFile {
            gpr: [0; 32],

            hi: 0,
            lo: 0,

            pc: RESET_VECTOR,
            next_pc: RESET_VECTOR.wrapping_add(4),
            current_pc: RESET_VECTOR,

            branch: false,
            delay_slot: false,

            direct: PendingWrite::NONE,
            delayed: PendingWrite::NONE,
            ready: PendingWrite::NONE,
        }
    }

    pub fn reg(&self, index: usize) -> u32 {
        self.gpr[index]
    }

    pub fn set_reg(&mut self, index: usize, value: u32) {
        self.gpr[index] = value;
        self.gpr[0] = 0;
    }

    /// Value a merging load (LWL/LWR) combines with: an in-flight load to
    /// the same register is forwarded.
    pub fn merge_base(&self, index: usize) -> u32 {
        if self.ready.reg == index && index != 0 {
            self.ready.value
        } else {
            self.gpr[index]
        }
    }

    /// Register transfer run after every instruction. The order is fixed:
    /// the older load is dropped when a newer one targets the same register,
    /// and a same-cycle ALU result beats both.
    pub fn transfer(&mut self) {
        let ready = self.ready;

        if ready.reg != self.delayed.reg {
            self.gpr[ready.reg] = ready.value;
        }

        self.ready = self.delayed;
        self.delayed = PendingWrite::NONE;

        self.gpr[self.direct.reg] = self.direct.value;
        self.direct = PendingWrite::NONE;

        self.gpr[0] = 0;
    }

    /// Moves PC to `address` with no delay slot, dropping any pending branch.
    pub fn jump_to(&mut self, address: u32) {
        self.pc = address;
        self.next_pc = address.wrapping_add(4);
        self.branch = false;
        self.delay_slot = false;
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct R3000A {
    pub regs: RegisterFile,
    pub cop0: Cop0,
    pub gte: Gte,
}

impl R3000A {
    pub fn new() -> R3000A {
        R3000A {
            regs: RegisterFile::new(),
            cop0: Cop0::new(),
            gte: Gte::new(),
        }
    }

    pub fn reset(&mut self) {
        self.cop0.reset(self.regs.current_pc);
        self.regs = RegisterFile::new();
    }

    pub fn pc(&self) -> u32 {
        self.regs.pc
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.regs.jump_to(pc);
        self.regs.current_pc = pc;
    }

    pub fn reg(&self, index: usize) -> u32 {
        self.regs.reg(index)
    }

    pub fn set_reg(&mut self, index: usize, value: u32) {
        self.regs.set_reg(index, value);
    }

    /// Shared entry for every exception, synchronous or not.
    ///
    /// Interrupts are taken between blocks, so EPC is the instruction that
    /// has not run yet; when a branch is still pending that instruction is a
    /// delay slot and EPC backs up to the branch.
    pub fn enter_exception(&mut self, exception: Exception) {
        let regs = &self.regs;

        let (epc, bd) = match exception {
            Exception::Interrupt => {
                if regs.branch {
                    (regs.current_pc, true)
                } else {
                    (regs.pc, false)
                }
            }
            _ => {
                if regs.delay_slot {
                    (regs.current_pc.wrapping_sub(4), true)
                } else {
                    (regs.current_pc, false)
                }
            }
        };

        self.cop0.enter_exception(epc, exception, bd);

        let vector = if self.cop0.exception_vectors() {
            BOOT_EXCEPTION_VECTOR
        } else {
            EXCEPTION_VECTOR
        };

        self.regs.jump_to(vector);
    }

    /// Raised at dispatch when PC is not word aligned.
    pub fn fetch_error(&mut self) {
        let pc = self.regs.pc;

        self.regs.current_pc = pc;
        self.regs.delay_slot = self.regs.branch;
        self.enter_exception(Exception::AddrLoad(pc));
    }

    pub fn interrupt_pending(&self) -> bool {
        self.cop0.interrupt_pending()
    }
}
