//! Walks guest code and drives the emitter over one block.

use crate::psx::bus::{to_physical, Bus};
use crate::psx::cpu::hazard;
use crate::psx::cpu::instruction::Instruction;

use super::cache::{checksum, region, Region};
use super::emitter::{Emitter, Window};
use super::op::Op;

/// Cached fetches from RAM.
pub const RAM_CYCLES: u32 = 2;
/// Uncached fetches from the BIOS ROM.
pub const BIOS_CYCLES: u32 = 20;

/// Most ops one guest instruction can expand to: fetch, two effect ops,
/// epilogue and the delay-slot exit check.
pub const MAX_OPS_PER_INSTRUCTION: usize = 5;

pub struct Translation {
    pub code: Vec<Op>,
    pub cycles: u32,
    pub instructions: u32,
    pub checksum: Option<u64>,
}

impl Translation {
    /// Upper bound on the ops a block of `max_instructions` can need. A
    /// branch at the cap still takes its delay slot.
    pub fn max_ops(max_instructions: u32) -> usize {
        (max_instructions as usize + 1) * MAX_OPS_PER_INSTRUCTION + 1
    }
}

pub fn fetch_cost(pc: u32) -> u32 {
    match region(to_physical(pc)) {
        Some((Region::Bios, _)) => BIOS_CYCLES,
        Some((Region::Ram, _)) => RAM_CYCLES,
        None => panic!("[JIT] [ERROR] Execution outside RAM and BIOS at 0x{:08x}", pc),
    }
}

fn fetch(bus: &Bus, address: u32) -> Instruction {
    match bus.peek32(address) {
        Some(word) => Instruction(word),
        None => panic!("[JIT] [ERROR] Instruction fetch from unmapped address 0x{:08x}", address),
    }
}

/// Translates the block starting at `pc`.
///
/// The block ends after a SYSCALL/BREAK or any instruction that always
/// raises, after the delay slot of the first branch, or at the instruction
/// cap. The cap never splits a branch from its delay slot.
pub fn translate(bus: &Bus, pc: u32, max_instructions: u32, with_checksum: bool) -> Translation {
    let cost = fetch_cost(pc);

    let mut emitter = Emitter::new();
    let mut words = Vec::new();

    let mut address = pc;
    let mut current = fetch(bus, pc);
    let mut delay_slot = false;
    let mut count = 0;

    loop {
        let first = count == 0;
        let is_branch = current.is_branch();

        let ends_here = delay_slot
            || current.is_trap()
            || (count + 1 >= max_instructions && !is_branch);

        // the next word may lie past the end of RAM or the BIOS
        let next = if ends_here {
            None
        } else {
            bus.peek32(address.wrapping_add(4)).map(Instruction)
        };

        let ends_here = ends_here || next.is_none();

        if first {
            emitter.push(Op::Enter { pc: address });
        } else if delay_slot {
            emitter.push(Op::FetchDelaySlot { pc: address });
        } else {
            emitter.push(Op::Fetch { pc: address });
        }

        words.push(current.0);

        let window = Window {
            first: first,
            last: ends_here,
            next: next.map(hazard::analyze),
        };

        let raises = if current.is_nop() {
            false
        } else {
            emitter.instruction(current, address, &window)
        };

        emitter.end_instruction();
        count += 1;

        if ends_here || raises {
            break;
        }

        if first {
            emitter.push(Op::LeaveIfDelaySlot);
        }

        match next {
            Some(i) => current = i,
            None => break,
        }

        delay_slot = is_branch;
        address = address.wrapping_add(4);
    }

    emitter.push(Op::Exit);

    Translation {
        code: emitter.finish(),
        cycles: count * cost,
        instructions: count,
        checksum: if with_checksum { Some(checksum(words)) } else { None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psx::jit::op::Write;

    fn bus_with(words: &[u32]) -> Bus {
        let mut bus = Bus::new(vec![0; 0x8_0000].into_boxed_slice());

        for (n, word) in words.iter().enumerate() {
            bus.poke32(0x0001_0000 + (n as u32) * 4, *word);
        }

        bus
    }

    fn fetches(code: &[Op]) -> usize {
        code.iter().filter(|op| op.is_fetch()).count()
    }

    #[test]
    fn block_ends_after_delay_slot() {
        // addiu $1,$0,1 ; j 0x80020000 ; addiu $2,$0,2 ; addiu $3,$0,3
        let bus = bus_with(&[0x2401_0001, 0x0800_8000, 0x2402_0002, 0x2403_0003]);
        let t = translate(&bus, 0x8001_0000, 64, false);

        assert_eq!(t.instructions, 3);
        assert_eq!(fetches(&t.code), 3);
        assert_eq!(t.cycles, 3 * RAM_CYCLES);
        assert!(t.code.contains(&Op::FetchDelaySlot { pc: 0x8001_0008 }));
        assert_eq!(t.code.last(), Some(&Op::Exit));
    }

    #[test]
    fn syscall_ends_block_without_delay_slot() {
        let bus = bus_with(&[0x2401_0001, 0x0000_000c, 0x2402_0002]);
        let t = translate(&bus, 0x8001_0000, 64, false);

        assert_eq!(t.instructions, 2);
    }

    #[test]
    fn cap_never_splits_a_branch() {
        // nop ; beq $0,$0,1 ; nop ; nop
        let bus = bus_with(&[0, 0x1000_0001, 0, 0]);

        assert_eq!(translate(&bus, 0x8001_0000, 1, false).instructions, 1);
        assert_eq!(translate(&bus, 0x8001_0000, 2, false).instructions, 3);
        assert_eq!(translate(&bus, 0x8001_0000, 3, false).instructions, 3);
    }

    #[test]
    fn first_instruction_checks_for_delay_slot_entry() {
        let bus = bus_with(&[0x2401_0001, 0x2402_0002]);
        let t = translate(&bus, 0x8001_0000, 64, false);

        assert_eq!(t.code[0], Op::Enter { pc: 0x8001_0000 });
        assert!(t.code.contains(&Op::LeaveIfDelaySlot));
    }

    #[test]
    fn load_feeding_the_next_instruction_is_delayed() {
        // lw $5,0($1) ; add $6,$5,$5 ; nop
        let bus = bus_with(&[0x2401_0001, 0x8c25_0000, 0x00a5_3020, 0]);
        let t = translate(&bus, 0x8001_0000, 64, false);

        let load = t.code.iter().find_map(|op| match op {
            Op::Load { write, .. } => Some(*write),
            _ => None,
        });

        assert_eq!(load, Some(Write::Delayed));
    }

    #[test]
    fn bios_fetches_cost_more() {
        let mut bios = vec![0; 0x8_0000];
        bios[0..4].copy_from_slice(&0x0000_000cu32.to_le_bytes());

        let bus = Bus::new(bios.into_boxed_slice());
        let t = translate(&bus, 0xbfc0_0000, 64, true);

        assert_eq!(t.cycles, BIOS_CYCLES);
        assert!(t.checksum.is_some());
    }

    #[test]
    fn block_at_the_end_of_the_bios_stops_there() {
        let mut bios = vec![0; 0x8_0000];
        // reserved opcode in the last word
        bios[0x7_fffc..].copy_from_slice(&0xfc00_0000u32.to_le_bytes());

        let bus = Bus::new(bios.into_boxed_slice());
        let t = translate(&bus, 0xbfc7_fffc, 64, false);

        assert_eq!(t.instructions, 1);
        assert_eq!(fetches(&t.code), 1);
        assert_eq!(t.code.last(), Some(&Op::Exit));
    }

    #[test]
    fn op_bound_holds() {
        // bltzal $4,1 ; jalr $31,$4
        let bus = bus_with(&[0x0490_0001, 0x0080_f809]);
        let t = translate(&bus, 0x8001_0000, 1, false);

        assert!(t.code.len() <= Translation::max_ops(1));
    }
}
