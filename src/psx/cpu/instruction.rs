use std::fmt;

/// One guest instruction word. Fields are extracted with fixed masks and
/// never validated; whether a combination is legal is decided at codegen.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Instruction(pub u32);

impl Instruction {
    pub fn op(self) -> u32 {
        self.0 >> 26
    }

    pub fn rs(self) -> usize {
        ((self.0 >> 21) & 0x1f) as usize
    }

    pub fn rt(self) -> usize {
        ((self.0 >> 16) & 0x1f) as usize
    }

    pub fn rd(self) -> usize {
        ((self.0 >> 11) & 0x1f) as usize
    }

    pub fn sa(self) -> u32 {
        (self.0 >> 6) & 0x1f
    }

    pub fn funct(self) -> u32 {
        self.0 & 0x3f
    }

    pub fn imm16(self) -> u32 {
        self.0 & 0xffff
    }

    pub fn imm_se(self) -> u32 {
        (self.0 & 0xffff) as i16 as u32
    }

    pub fn target(self) -> u32 {
        self.0 & 0x3ff_ffff
    }

    /// Coprocessor sub-opcode (the `rs` field of COPn instructions).
    pub fn cop_op(self) -> u32 {
        (self.0 >> 21) & 0x1f
    }

    pub fn is_nop(self) -> bool {
        self.0 == 0
    }

    /// Anything that redirects NextPC and therefore owns a delay slot.
    pub fn is_branch(self) -> bool {
        match self.op() {
            0x00 => match self.funct() {
                0x08 | 0x09 => true,
                _ => false,
            },
            0x01..=0x07 => true,
            _ => false,
        }
    }

    /// SYSCALL and BREAK raise their exception without a delay slot.
    pub fn is_trap(self) -> bool {
        self.op() == 0x00 && (self.funct() == 0x0c || self.funct() == 0x0d)
    }

    /// Geometry transformation engine command (COP2 with bit 25 set).
    pub fn is_gte_command(self) -> bool {
        self.op() == 0x12 && (self.0 & (1 << 25)) != 0
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Instruction(0x{:08x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::Instruction;

    #[test]
    fn fields_reconstruct_the_word() {
        for word in (0..=u32::max_value()).step_by(40_503) {
            let i = Instruction(word);

            let rtype = (i.op() << 26)
                | ((i.rs() as u32) << 21)
                | ((i.rt() as u32) << 16)
                | ((i.rd() as u32) << 11)
                | (i.sa() << 6)
                | i.funct();
            let itype = (i.op() << 26) | ((i.rs() as u32) << 21) | ((i.rt() as u32) << 16) | i.imm16();
            let jtype = (i.op() << 26) | i.target();

            assert_eq!(rtype, word);
            assert_eq!(itype, word);
            assert_eq!(jtype, word);
            assert_eq!(i.imm_se() as u16 as u32, i.imm16());
        }
    }

    #[test]
    fn sign_extension() {
        assert_eq!(Instruction(0x2401_fffc).imm_se(), 0xffff_fffc);
        assert_eq!(Instruction(0x2401_7ffc).imm_se(), 0x0000_7ffc);
    }

    #[test]
    fn classification() {
        // jr $ra
        assert!(Instruction(0x03e0_0008).is_branch());
        // bgezal $zero, ...
        assert!(Instruction(0x0411_0004).is_branch());
        // addiu $at, $zero, 1
        assert!(!Instruction(0x2401_0001).is_branch());
        // syscall / break
        assert!(Instruction(0x0000_000c).is_trap());
        assert!(Instruction(0x0000_000d).is_trap());
        // cop2 0x0180001 (RTPS)
        assert!(Instruction(0x4a18_0001).is_gte_command());
        // mfc2 is a move, not a command
        assert!(!Instruction(0x4802_0000).is_gte_command());
    }
}
