//! Bump allocator for compiled code.
//!
//! All blocks share one op buffer. When a block does not fit the buffer is
//! truncated back to the stub and the generation advances, which makes every
//! cache slot recorded under the old generation stale at once.

use std::mem;

use log::debug;

use super::op::Op;

pub const STUB: u32 = 0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheBlock {
    /// Index of the first op in the arena.
    pub entry: usize,
    /// Guest virtual address of the first instruction.
    pub source: u32,
    pub cycles: u32,
    pub instructions: u32,
    /// Emitted size in bytes.
    pub size: usize,
    pub checksum: Option<u64>,
}

impl CacheBlock {
    fn stub() -> CacheBlock {
        CacheBlock {
            entry: 0,
            source: 0xffff_ffff,
            cycles: 0,
            instructions: 0,
            size: mem::size_of::<Op>(),
            checksum: None,
        }
    }

    pub fn cycles_per_instruction(&self) -> u32 {
        if self.instructions == 0 {
            0
        } else {
            self.cycles / self.instructions
        }
    }
}

pub struct Arena {
    ops: Vec<Op>,
    blocks: Vec<CacheBlock>,

    capacity: usize,
    generation: u32,
}

impl Arena {
    pub fn new(bytes: usize) -> Arena {
        let capacity = Arena::ops_for(bytes);

        let mut ops = Vec::with_capacity(capacity);
        ops.push(Op::Stub);

        Arena {
            ops: ops,
            blocks: vec![CacheBlock::stub()],

            capacity: capacity,
            generation: 1,
        }
    }

    pub fn ops_for(bytes: usize) -> usize {
        bytes / mem::size_of::<Op>()
    }

    pub fn bytes_for(ops: usize) -> usize {
        ops * mem::size_of::<Op>()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn block(&self, id: u32) -> &CacheBlock {
        &self.blocks[id as usize]
    }

    pub fn blocks(&self) -> usize {
        self.blocks.len() - 1
    }

    pub fn used_bytes(&self) -> usize {
        Arena::bytes_for(self.ops.len())
    }

    pub fn capacity_bytes(&self) -> usize {
        Arena::bytes_for(self.capacity)
    }

    fn fits(&self, len: usize) -> bool {
        self.ops.len() + len <= self.capacity
    }

    /// Drops every block and starts over behind the stub.
    pub fn reset(&mut self) {
        debug!("[JIT] arena reset after {} blocks ({} of {} bytes)",
               self.blocks(), self.used_bytes(), self.capacity_bytes());

        self.ops.truncate(1);
        self.blocks.truncate(1);
        self.generation = self.generation.wrapping_add(1).max(1);
    }

    /// Copies `code` into the arena and returns the new block id, plus
    /// whether the arena had to be reset to make room.
    pub fn allocate(&mut self, code: &[Op], source: u32, cycles: u32, instructions: u32, checksum: Option<u64>) -> (u32, bool) {
        let mut recycled = false;

        if !self.fits(code.len()) {
            self.reset();
            recycled = true;

            if !self.fits(code.len()) {
                panic!("[JIT] [ERROR] Block at 0x{:08x} ({} ops) is larger than the arena", source, code.len());
            }
        }

        let entry = self.ops.len();
        self.ops.extend_from_slice(code);

        let id = self.blocks.len() as u32;

        self.blocks.push(CacheBlock {
            entry: entry,
            source: source,
            cycles: cycles,
            instructions: instructions,
            size: Arena::bytes_for(code.len()),
            checksum: checksum,
        });

        (id, recycled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(n: usize) -> Vec<Op> {
        let mut code = vec![Op::Fetch { pc: 0 }; n - 1];
        code.push(Op::Exit);
        code
    }

    #[test]
    fn stub_is_op_zero() {
        let arena = Arena::new(Arena::bytes_for(16));

        assert_eq!(arena.ops()[0], Op::Stub);
        assert_eq!(arena.block(STUB).entry, 0);
        assert_eq!(arena.blocks(), 0);
    }

    #[test]
    fn blocks_are_bump_allocated() {
        let mut arena = Arena::new(Arena::bytes_for(16));

        let (a, reset_a) = arena.allocate(&code(4), 0x8000_0000, 8, 4, None);
        let (b, reset_b) = arena.allocate(&code(3), 0x8000_0100, 6, 3, None);

        assert!(!reset_a && !reset_b);
        assert_eq!(arena.block(a).entry, 1);
        assert_eq!(arena.block(b).entry, 5);
        assert_eq!(arena.block(b).size, Arena::bytes_for(3));
        assert_eq!(arena.ops()[arena.block(b).entry + 2], Op::Exit);
    }

    #[test]
    fn exhaustion_resets_and_bumps_generation() {
        let mut arena = Arena::new(Arena::bytes_for(10));
        let generation = arena.generation();

        arena.allocate(&code(6), 0x8000_0000, 12, 6, None);
        let (id, reset) = arena.allocate(&code(6), 0x8000_0100, 12, 6, None);

        assert!(reset);
        assert_eq!(id, 1);
        assert_eq!(arena.block(id).source, 0x8000_0100);
        assert_eq!(arena.generation(), generation + 1);
        assert_eq!(arena.blocks(), 1);
    }

    #[test]
    #[should_panic]
    fn oversized_block_is_fatal() {
        let mut arena = Arena::new(Arena::bytes_for(4));

        arena.allocate(&code(8), 0x8000_0000, 16, 8, None);
    }
}
