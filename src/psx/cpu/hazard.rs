//! Register hazard analysis, used only while translating a block.

use super::instruction::Instruction;

/// The GPR an instruction writes (0 = none) and the GPRs it reads.
///
/// Coprocessor-side moves (MTC0, MTC2, CTC2, LWC2) write no GPR. Register 0
/// is never reported since it cannot carry a hazard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegisterHazards {
    pub write: usize,
    pub reads: [usize; 2],
}

impl RegisterHazards {
    fn new(write: usize, a: usize, b: usize) -> RegisterHazards {
        RegisterHazards {
            write: write,
            reads: [a, b],
        }
    }

    pub fn reads(&self, reg: usize) -> bool {
        reg != 0 && (self.reads[0] == reg || self.reads[1] == reg)
    }

    pub fn writes(&self, reg: usize) -> bool {
        reg != 0 && self.write == reg
    }

    pub fn touches(&self, reg: usize) -> bool {
        self.reads(reg) || self.writes(reg)
    }
}

pub fn analyze(i: Instruction) -> RegisterHazards {
    let (rs, rt, rd) = (i.rs(), i.rt(), i.rd());

    match i.op() {
        0x00 => match i.funct() {
            0x00 | 0x02 | 0x03 => RegisterHazards::new(rd, rt, 0),
            0x04 | 0x06 | 0x07 => RegisterHazards::new(rd, rt, rs),
            0x08 => RegisterHazards::new(0, rs, 0),
            0x09 => RegisterHazards::new(rd, rs, 0),
            0x10 | 0x12 => RegisterHazards::new(rd, 0, 0),
            0x11 | 0x13 => RegisterHazards::new(0, rs, 0),
            0x18..=0x1b => RegisterHazards::new(0, rs, rt),
            0x20..=0x27 | 0x2a | 0x2b => RegisterHazards::new(rd, rs, rt),
            _ => RegisterHazards::default(),
        },
        0x01 => {
            let link = if (rt & 0x1e) == 0x10 { 31 } else { 0 };
            RegisterHazards::new(link, rs, 0)
        }
        0x02 => RegisterHazards::default(),
        0x03 => RegisterHazards::new(31, 0, 0),
        0x04 | 0x05 => RegisterHazards::new(0, rs, rt),
        0x06 | 0x07 => RegisterHazards::new(0, rs, 0),
        0x08..=0x0e => RegisterHazards::new(rt, rs, 0),
        0x0f => RegisterHazards::new(rt, 0, 0),
        0x10 => match i.cop_op() {
            0x00 => RegisterHazards::new(rt, 0, 0),
            0x04 => RegisterHazards::new(0, rt, 0),
            _ => RegisterHazards::default(),
        },
        0x12 => match i.cop_op() {
            0x00 | 0x02 => RegisterHazards::new(rt, 0, 0),
            0x04 | 0x06 => RegisterHazards::new(0, rt, 0),
            _ => RegisterHazards::default(),
        },
        0x22 | 0x26 => RegisterHazards::new(rt, rs, rt),
        0x20 | 0x21 | 0x23 | 0x24 | 0x25 => RegisterHazards::new(rt, rs, 0),
        0x28..=0x2b | 0x2e => RegisterHazards::new(0, rs, rt),
        0x32 | 0x3a => RegisterHazards::new(0, rs, 0),
        _ => RegisterHazards::default(),
    }
}
